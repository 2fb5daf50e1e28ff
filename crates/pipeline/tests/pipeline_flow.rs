//! End-to-end flow over the in-crate stages: filter -> triangulate ->
//! angles -> summaries -> progress, against a synthetic two-camera project.
//! External-tool stages (inference, calibration solves, rendering) are
//! exercised by seeding the artifacts they would have produced.

use std::fs;
use std::path::{Path, PathBuf};

use pipeline::calibration::{CalibrationSet, CameraCalibration};
use pipeline::config::Config;
use pipeline::data::{AngleTable, Keypoint, PoseTable, PoseTable3d, read_json, write_json};
use pipeline::stages::{angles, filter, progress, summarize, triangulate};

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

fn project(cam: &CameraCalibration, world: [f64; 3]) -> (f64, f64) {
    let px = cam.project(&nalgebra_vector(world));
    (px.x, px.y)
}

fn nalgebra_vector(world: [f64; 3]) -> nalgebra::Vector4<f64> {
    nalgebra::Vector4::new(world[0], world[1], world[2], 1.0)
}

/// A session with two camera views of three bodyparts forming a right angle.
fn seed_project(root: &Path) -> (Config, PathBuf) {
    let mut config = Config::default();
    config.path = root.to_path_buf();
    config.project = "flow".to_string();
    config.filter.enabled = true;
    config.angles.insert(
        "knee".to_string(),
        ["hip".to_string(), "knee".to_string(), "ankle".to_string()],
    );

    let session = root.join("session1");
    let raw = session.join("videos-raw");
    fs::create_dir_all(&raw).unwrap();
    for name in ["cam1-trial1.avi", "cam2-trial1.avi"] {
        fs::File::create(raw.join(name)).unwrap();
    }

    let cams = [camera("cam1", 0.0), camera("cam2", -0.2)];
    write_json(
        &CalibrationSet::path(&session, &config.pipeline.calibration_results),
        &CalibrationSet {
            cameras: cams.to_vec(),
        },
    )
    .unwrap();

    let world = [
        [0.0, 1.0, 4.0], // hip
        [0.0, 0.0, 4.0], // knee
        [1.0, 0.0, 4.0], // ankle
    ];
    for (cam, file) in cams.iter().zip(["cam1-trial1.json", "cam2-trial1.json"]) {
        let frame: Vec<Keypoint> = world
            .iter()
            .map(|&point| {
                let (x, y) = project(cam, point);
                Keypoint { x, y, score: 0.95 }
            })
            .collect();
        write_json(
            &session.join("pose-2d").join(file),
            &PoseTable {
                bodyparts: vec!["hip".to_string(), "knee".to_string(), "ankle".to_string()],
                frames: vec![frame.clone(), frame],
            },
        )
        .unwrap();
    }

    (config, session)
}

#[test]
fn filter_triangulate_angles_summarize() {
    let dir = tempfile::tempdir().unwrap();
    let (config, session) = seed_project(dir.path());

    filter::filter_all(&config).unwrap();
    assert!(session.join("pose-2d-filtered/cam1-trial1.json").exists());

    triangulate::triangulate_all(&config).unwrap();
    let table3d: PoseTable3d = read_json(&session.join("pose-3d/trial1.json")).unwrap();
    let knee = table3d.frames[0][1].unwrap();
    assert!((knee.x - 0.0).abs() < 1e-6);
    assert!((knee.z - 4.0).abs() < 1e-6);
    assert!(knee.error < 1e-6);

    angles::angles_all(&config).unwrap();
    let angle_table: AngleTable = read_json(&session.join("angles/trial1.json")).unwrap();
    let knee_angle = angle_table.frames[0][0].unwrap();
    assert!((knee_angle - 90.0).abs() < 1e-6, "knee angle {knee_angle}");

    summarize::summarize_pose2d(&config).unwrap();
    summarize::summarize_pose3d(&config).unwrap();
    summarize::summarize_angles(&config).unwrap();
    for name in ["pose_2d", "pose_3d", "angles"] {
        assert!(dir.path().join(format!("summaries/{name}.json")).exists());
    }

    let counts = progress::session_progress(&config, &session).unwrap();
    assert_eq!(counts.videos, 2);
    assert_eq!(counts.analyzed, 2);
}

#[test]
fn stages_are_idempotent_at_the_file_level() {
    let dir = tempfile::tempdir().unwrap();
    let (config, session) = seed_project(dir.path());

    filter::filter_all(&config).unwrap();
    triangulate::triangulate_all(&config).unwrap();

    let filtered = session.join("pose-2d-filtered/cam1-trial1.json");
    let pose3d = session.join("pose-3d/trial1.json");
    let mtime_filtered = fs::metadata(&filtered).unwrap().modified().unwrap();
    let mtime_3d = fs::metadata(&pose3d).unwrap().modified().unwrap();

    filter::filter_all(&config).unwrap();
    triangulate::triangulate_all(&config).unwrap();

    assert_eq!(fs::metadata(&filtered).unwrap().modified().unwrap(), mtime_filtered);
    assert_eq!(fs::metadata(&pose3d).unwrap().modified().unwrap(), mtime_3d);
}
