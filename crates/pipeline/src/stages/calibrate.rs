//! Calibration stages: intrinsics, extrinsics, error aggregation, and board
//! rendering.
//!
//! The intrinsic and extrinsic solves run in the external calibrator; this
//! module only decides whether a session needs them and assembles the video
//! lists. Error aggregation reads the reprojection errors the triangulation
//! stage stored alongside each 3D point.

use std::path::Path;

use anyhow::{Context, Result, bail};
use ingest::Calibrator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    calibration::{EXTRINSICS_FILE, INTRINSICS_FILE},
    config::Config,
    data::{PoseTable3d, read_json, write_json},
    session::{list_files, process_all},
    stages::POSE_EXT,
};

pub const ERRORS_FILE: &str = "errors.json";

/// Calibrate intrinsics for every session with calibration videos.
pub fn intrinsics_all(config: &Config) -> Result<()> {
    process_all(config, intrinsics_session)
}

/// Calibrate extrinsics for every session with calibration videos.
pub fn extrinsics_all(config: &Config) -> Result<()> {
    process_all(config, extrinsics_session)
}

/// Aggregate reprojection errors for every session.
pub fn errors_all(config: &Config) -> Result<()> {
    process_all(config, errors_session)
}

pub fn intrinsics_session(config: &Config, session: &Path) -> Result<()> {
    let videos = calibration_videos(config, session)?;
    if videos.is_empty() {
        return Ok(());
    }

    let outdir = session.join(&config.pipeline.calibration_results);
    let out = outdir.join(INTRINSICS_FILE);
    if out.exists() {
        debug!("{} already has intrinsics, skipping", session.display());
        return Ok(());
    }
    std::fs::create_dir_all(&outdir)
        .with_context(|| format!("failed to create {}", outdir.display()))?;

    info!("calibrating intrinsics for {}", session.display());
    let refs: Vec<&Path> = videos.iter().map(|v| v.as_path()).collect();
    Calibrator::new(&config.model.calibrate_cmd, config.board())
        .calibrate_intrinsics(&refs, &out)
        .with_context(|| format!("intrinsics calibration failed for {}", session.display()))
}

pub fn extrinsics_session(config: &Config, session: &Path) -> Result<()> {
    let videos = calibration_videos(config, session)?;
    if videos.is_empty() {
        return Ok(());
    }

    let outdir = session.join(&config.pipeline.calibration_results);
    let out = outdir.join(EXTRINSICS_FILE);
    if out.exists() {
        debug!("{} already has extrinsics, skipping", session.display());
        return Ok(());
    }

    let intrinsics = outdir.join(INTRINSICS_FILE);
    if !intrinsics.exists() {
        bail!(
            "session {} needs intrinsics before extrinsics",
            session.display()
        );
    }

    info!("calibrating extrinsics for {}", session.display());
    let refs: Vec<&Path> = videos.iter().map(|v| v.as_path()).collect();
    Calibrator::new(&config.model.calibrate_cmd, config.board())
        .calibrate_extrinsics(
            &refs,
            &intrinsics,
            &out,
            config.calibration.animal_calibration,
        )
        .with_context(|| format!("extrinsics calibration failed for {}", session.display()))
}

/// Reprojection-error statistics for one session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorStats {
    pub points: usize,
    pub mean: f64,
    pub max: f64,
}

pub fn errors_session(config: &Config, session: &Path) -> Result<()> {
    let indir = session.join(&config.pipeline.pose_3d);
    let files = list_files(&indir, POSE_EXT)?;
    if files.is_empty() {
        return Ok(());
    }

    let mut stats = ErrorStats::default();
    let mut sum = 0.0;
    for file in &files {
        let table: PoseTable3d = read_json(file)?;
        for frame in &table.frames {
            for point in frame.iter().flatten() {
                stats.points += 1;
                sum += point.error;
                stats.max = stats.max.max(point.error);
            }
        }
    }
    if stats.points > 0 {
        stats.mean = sum / stats.points as f64;
    }

    let out = session
        .join(&config.pipeline.calibration_results)
        .join(ERRORS_FILE);
    info!(
        "{}: {} point(s), mean reprojection error {:.3}px",
        session.display(),
        stats.points,
        stats.mean
    );
    write_json(&out, &stats)
}

/// Render the calibration board image into the project root.
pub fn draw_board(config: &Config) -> Result<()> {
    let out = config.path.join("calibration.png");
    Calibrator::new(&config.model.calibrate_cmd, config.board())
        .draw_board(&out)
        .context("failed to render the calibration board")
}

fn calibration_videos(config: &Config, session: &Path) -> Result<Vec<std::path::PathBuf>> {
    list_files(
        &session.join(&config.pipeline.calibration_videos),
        &config.pipeline.video_ext,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Point3d;
    use std::fs;

    fn session_with_calibration_video(root: &Path) -> std::path::PathBuf {
        let session = root.join("s1");
        fs::create_dir_all(session.join("videos-raw")).unwrap();
        fs::create_dir_all(session.join("calibration")).unwrap();
        fs::File::create(session.join("calibration/calib-cam1.avi")).unwrap();
        session
    }

    #[test]
    fn existing_intrinsics_skip_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_calibration_video(dir.path());
        fs::write(session.join("calibration").join(INTRINSICS_FILE), "{}").unwrap();

        let mut config = Config::default();
        config.path = dir.path().to_path_buf();
        config.model.calibrate_cmd = "/nonexistent/calibrator".to_string();

        intrinsics_session(&config, &session).unwrap();
    }

    #[test]
    fn extrinsics_require_intrinsics_first() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_calibration_video(dir.path());

        let mut config = Config::default();
        config.path = dir.path().to_path_buf();

        let err = extrinsics_session(&config, &session).unwrap_err();
        assert!(err.to_string().contains("intrinsics"), "{err}");
    }

    #[test]
    fn error_stats_aggregate_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("s1");
        fs::create_dir_all(session.join("videos-raw")).unwrap();

        let mut config = Config::default();
        config.path = dir.path().to_path_buf();

        let table = PoseTable3d {
            bodyparts: vec!["snout".to_string()],
            frames: vec![
                vec![Some(Point3d { x: 0.0, y: 0.0, z: 0.0, error: 1.0 })],
                vec![None],
                vec![Some(Point3d { x: 0.0, y: 0.0, z: 0.0, error: 3.0 })],
            ],
        };
        write_json(&session.join("pose-3d/trial1.json"), &table).unwrap();

        errors_session(&config, &session).unwrap();

        let stats: ErrorStats =
            read_json(&session.join("calibration").join(ERRORS_FILE)).unwrap();
        assert_eq!(stats.points, 2);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.max, 3.0);
    }
}
