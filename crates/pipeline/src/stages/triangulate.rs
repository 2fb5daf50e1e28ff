//! 3D triangulation stage.
//!
//! Groups a session's 2D pose tables by camera (the basename prefix ahead of
//! the configured separator), loads the session's calibration, and
//! DLT-triangulates each bodypart per frame across all confident views. The
//! linear algebra is nalgebra's; this module only sets up the system.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result, bail};
use nalgebra::{DMatrix, Matrix3x4, Vector2, Vector3, Vector4};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    calibration::CalibrationSet,
    data::{Point3d, PoseTable3d, read_pose_table, write_json},
    session::{basename, list_files, natural_cmp, process_all},
    stages::POSE_EXT,
};

/// Triangulate every session in the project.
pub fn triangulate_all(config: &Config) -> Result<()> {
    process_all(config, process_session)
}

/// Triangulate each camera group in the session without an existing 3D
/// table. Reads filtered poses when filtering is enabled.
pub fn process_session(config: &Config, session: &Path) -> Result<()> {
    let pose_dir = if config.filter.enabled {
        &config.pipeline.pose_2d_filter
    } else {
        &config.pipeline.pose_2d
    };
    let indir = session.join(pose_dir);
    let files = list_files(&indir, POSE_EXT)?;
    let groups = group_by_trial(config, &files);
    if groups.is_empty() {
        return Ok(());
    }

    let calib_path = CalibrationSet::path(session, &config.pipeline.calibration_results);
    let calibration = CalibrationSet::load(&calib_path)
        .with_context(|| format!("session {} has pose data but no calibration", session.display()))?;

    let outdir = session.join(&config.pipeline.pose_3d);
    for (trial, cams) in groups {
        let out = outdir.join(format!("{trial}.{POSE_EXT}"));
        if out.exists() {
            debug!("{} already triangulated, skipping", trial);
            continue;
        }
        if cams.len() < 2 {
            warn!("trial {trial} has a single camera view, skipping");
            continue;
        }

        info!("triangulating {trial} from {} views", cams.len());
        let table = triangulate_trial(config, &calibration, &cams)?;
        write_json(&out, &table)?;
    }
    Ok(())
}

/// Map of trial name -> `(camera name, pose path)` in natural camera order.
fn group_by_trial<'a>(
    config: &Config,
    files: &'a [std::path::PathBuf],
) -> BTreeMap<String, Vec<(String, &'a Path)>> {
    let sep = &config.calibration.cam_separator;
    let mut groups: BTreeMap<String, Vec<(String, &Path)>> = BTreeMap::new();
    for file in files {
        let base = basename(file);
        let Some((cam, trial)) = base.split_once(sep.as_str()) else {
            warn!("{} has no camera prefix, skipping", file.display());
            continue;
        };
        groups
            .entry(trial.to_string())
            .or_default()
            .push((cam.to_string(), file.as_path()));
    }
    for views in groups.values_mut() {
        views.sort_by(|a, b| natural_cmp(&a.0, &b.0));
    }
    groups
}

fn triangulate_trial(
    config: &Config,
    calibration: &CalibrationSet,
    cams: &[(String, &Path)],
) -> Result<PoseTable3d> {
    let mut views = Vec::with_capacity(cams.len());
    for (cam, path) in cams {
        let table = read_pose_table(path)?;
        let camera = calibration.camera(cam)?.clone();
        views.push((camera, table));
    }

    let bodyparts = views[0].1.bodyparts.clone();
    for (_, table) in &views[1..] {
        if table.bodyparts != bodyparts {
            bail!("camera views disagree on bodyparts");
        }
    }

    let n_frames = views.iter().map(|(_, t)| t.n_frames()).min().unwrap_or(0);
    let threshold = config.filter.score_threshold;

    let mut frames = Vec::with_capacity(n_frames);
    for frame in 0..n_frames {
        let mut row = Vec::with_capacity(bodyparts.len());
        for part in 0..bodyparts.len() {
            let mut projections = Vec::new();
            let mut pixels = Vec::new();
            for (camera, table) in &views {
                let point = table.frames[frame][part];
                if point.score >= threshold {
                    projections.push(camera.projection());
                    pixels.push(Vector2::new(point.x, point.y));
                }
            }
            row.push(triangulate_point(&projections, &pixels).map(|world| {
                let homogeneous = Vector4::new(world.x, world.y, world.z, 1.0);
                let error = projections
                    .iter()
                    .zip(&pixels)
                    .map(|(p, px)| {
                        let reprojected = p * homogeneous;
                        let reprojected =
                            Vector2::new(reprojected.x / reprojected.z, reprojected.y / reprojected.z);
                        (reprojected - px).norm()
                    })
                    .sum::<f64>()
                    / projections.len() as f64;
                Point3d { x: world.x, y: world.y, z: world.z, error }
            }));
        }
        frames.push(row);
    }

    Ok(PoseTable3d { bodyparts, frames })
}

/// Linear DLT triangulation across two or more views; `None` when fewer than
/// two confident views are available or the system is degenerate.
pub fn triangulate_point(
    projections: &[Matrix3x4<f64>],
    pixels: &[Vector2<f64>],
) -> Option<Vector3<f64>> {
    if projections.len() < 2 || projections.len() != pixels.len() {
        return None;
    }

    let mut a = DMatrix::<f64>::zeros(2 * projections.len(), 4);
    for (i, (px, p)) in pixels.iter().zip(projections.iter()).enumerate() {
        let row0 = px.x * p.row(2) - p.row(0);
        let row1 = px.y * p.row(2) - p.row(1);
        a.row_mut(2 * i).copy_from(&row0);
        a.row_mut(2 * i + 1).copy_from(&row1);
    }

    let svd = a.svd(true, true);
    let v_t = svd.v_t?;
    let solution = v_t.row(v_t.nrows() - 1);

    let w = solution[3];
    if w.abs() <= f64::EPSILON {
        return None;
    }
    Some(Vector3::new(
        solution[0] / w,
        solution[1] / w,
        solution[2] / w,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CameraCalibration;
    use crate::data::{Keypoint, PoseTable, read_json};
    use std::fs;

    fn camera(name: &str, tx: f64) -> CameraCalibration {
        CameraCalibration {
            name: name.to_string(),
            matrix: [
                [1.0, 0.0, 0.0, tx],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            width: 640,
            height: 480,
        }
    }

    fn project(cam: &CameraCalibration, world: Vector3<f64>) -> Vector2<f64> {
        cam.project(&Vector4::new(world.x, world.y, world.z, 1.0))
    }

    #[test]
    fn two_views_recover_a_point() {
        let cam1 = camera("cam1", 0.0);
        let cam2 = camera("cam2", -0.2);
        let world = Vector3::new(0.1, -0.05, 2.0);

        let est = triangulate_point(
            &[cam1.projection(), cam2.projection()],
            &[project(&cam1, world), project(&cam2, world)],
        )
        .unwrap();
        assert!((est - world).norm() < 1e-9, "error {}", (est - world).norm());
    }

    #[test]
    fn single_view_yields_none() {
        let cam1 = camera("cam1", 0.0);
        assert!(triangulate_point(&[cam1.projection()], &[Vector2::new(0.0, 0.0)]).is_none());
    }

    #[test]
    fn session_triangulates_grouped_views() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("s1");
        fs::create_dir_all(session.join("videos-raw")).unwrap();

        let mut config = Config::default();
        config.path = dir.path().to_path_buf();

        let cam1 = camera("cam1", 0.0);
        let cam2 = camera("cam2", -0.2);
        write_json(
            &session.join("calibration/calibration.json"),
            &CalibrationSet {
                cameras: vec![cam1.clone(), cam2.clone()],
            },
        )
        .unwrap();

        let world = Vector3::new(0.1, -0.05, 2.0);
        for (cam, name) in [(&cam1, "cam1-trial1.json"), (&cam2, "cam2-trial1.json")] {
            let px = project(cam, world);
            write_json(
                &session.join("pose-2d").join(name),
                &PoseTable {
                    bodyparts: vec!["snout".to_string()],
                    frames: vec![vec![Keypoint { x: px.x, y: px.y, score: 0.99 }]],
                },
            )
            .unwrap();
        }

        process_session(&config, &session).unwrap();

        let table: PoseTable3d = read_json(&session.join("pose-3d/trial1.json")).unwrap();
        let point = table.frames[0][0].unwrap();
        assert!((point.x - world.x).abs() < 1e-9);
        assert!((point.z - world.z).abs() < 1e-9);
        assert!(point.error < 1e-9);
    }

    #[test]
    fn low_score_views_leave_the_point_untriangulated() {
        let config = Config::default();
        let cam1 = camera("cam1", 0.0);
        let cam2 = camera("cam2", -0.2);
        let calibration = CalibrationSet {
            cameras: vec![cam1.clone(), cam2.clone()],
        };

        let dir = tempfile::tempdir().unwrap();
        let world = Vector3::new(0.1, -0.05, 2.0);
        let mut paths = Vec::new();
        for (cam, name, score) in [(&cam1, "cam1.json", 0.99), (&cam2, "cam2.json", 0.1)] {
            let px = project(cam, world);
            let path = dir.path().join(name);
            write_json(
                &path,
                &PoseTable {
                    bodyparts: vec!["snout".to_string()],
                    frames: vec![vec![Keypoint { x: px.x, y: px.y, score }]],
                },
            )
            .unwrap();
            paths.push(path);
        }

        let cams = vec![
            ("cam1".to_string(), paths[0].as_path()),
            ("cam2".to_string(), paths[1].as_path()),
        ];
        let table = triangulate_trial(&config, &calibration, &cams).unwrap();
        assert!(table.frames[0][0].is_none());
    }
}
