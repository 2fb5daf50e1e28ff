//! Project-level summaries.
//!
//! Unlike the per-session stages, summaries always recompute: they are cheap
//! scans that collapse every session's artifacts into one JSON file under
//! the project's summaries directory.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::Config,
    data::{AngleTable, PoseTable, PoseTable3d, read_json, write_json},
    session::{basename, list_files, sessions},
    stages::{POSE_EXT, calibrate::ErrorStats},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose2dRow {
    pub session: String,
    pub file: String,
    pub frames: usize,
    pub mean_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose3dRow {
    pub session: String,
    pub file: String,
    pub frames: usize,
    pub mean_error: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleRow {
    pub session: String,
    pub file: String,
    pub angle: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRow {
    pub session: String,
    #[serde(flatten)]
    pub stats: ErrorStats,
}

/// Session path relative to the project root, for readable summary rows.
fn session_label(config: &Config, session: &Path) -> String {
    session
        .strip_prefix(&config.path)
        .unwrap_or(session)
        .to_string_lossy()
        .into_owned()
}

fn summary_path(config: &Config, name: &str) -> PathBuf {
    config
        .path
        .join(&config.pipeline.summaries)
        .join(format!("{name}.{POSE_EXT}"))
}

fn collect_pose2d(config: &Config, dir_name: &str, out_name: &str) -> Result<()> {
    let mut rows = Vec::new();
    for session in sessions(config)? {
        for file in list_files(&session.join(dir_name), POSE_EXT)? {
            let table: PoseTable = read_json(&file)?;
            rows.push(Pose2dRow {
                session: session_label(config, &session),
                file: basename(&file),
                frames: table.n_frames(),
                mean_score: table.mean_score(),
            });
        }
    }
    let out = summary_path(config, out_name);
    info!("writing {} row(s) to {}", rows.len(), out.display());
    write_json(&out, &rows)
}

/// Summarize raw 2D pose tables.
pub fn summarize_pose2d(config: &Config) -> Result<()> {
    collect_pose2d(config, &config.pipeline.pose_2d, "pose_2d")
}

/// Summarize filtered 2D pose tables.
pub fn summarize_pose2d_filtered(config: &Config) -> Result<()> {
    collect_pose2d(config, &config.pipeline.pose_2d_filter, "pose_2d_filtered")
}

/// Summarize triangulated 3D pose tables.
pub fn summarize_pose3d(config: &Config) -> Result<()> {
    let mut rows = Vec::new();
    for session in sessions(config)? {
        for file in list_files(&session.join(&config.pipeline.pose_3d), POSE_EXT)? {
            let table: PoseTable3d = read_json(&file)?;
            rows.push(Pose3dRow {
                session: session_label(config, &session),
                file: basename(&file),
                frames: table.n_frames(),
                mean_error: table.mean_error(),
            });
        }
    }
    let out = summary_path(config, "pose_3d");
    info!("writing {} row(s) to {}", rows.len(), out.display());
    write_json(&out, &rows)
}

/// Summarize joint-angle tables with per-angle statistics.
pub fn summarize_angles(config: &Config) -> Result<()> {
    let mut rows = Vec::new();
    for session in sessions(config)? {
        for file in list_files(&session.join(&config.pipeline.angles), POSE_EXT)? {
            let table: AngleTable = read_json(&file)?;
            for (idx, name) in table.names.iter().enumerate() {
                let values: Vec<f64> = table
                    .frames
                    .iter()
                    .filter_map(|frame| frame.get(idx).copied().flatten())
                    .collect();
                if values.is_empty() {
                    continue;
                }
                rows.push(AngleRow {
                    session: session_label(config, &session),
                    file: basename(&file),
                    angle: name.clone(),
                    mean: values.iter().sum::<f64>() / values.len() as f64,
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                });
            }
        }
    }
    let out = summary_path(config, "angles");
    info!("writing {} row(s) to {}", rows.len(), out.display());
    write_json(&out, &rows)
}

/// Summarize per-session reprojection-error statistics.
pub fn summarize_errors(config: &Config) -> Result<()> {
    let mut rows = Vec::new();
    for session in sessions(config)? {
        let stats_path = session
            .join(&config.pipeline.calibration_results)
            .join(super::calibrate::ERRORS_FILE);
        if !stats_path.exists() {
            continue;
        }
        rows.push(ErrorRow {
            session: session_label(config, &session),
            stats: read_json(&stats_path)?,
        });
    }
    let out = summary_path(config, "errors");
    info!("writing {} row(s) to {}", rows.len(), out.display());
    write_json(&out, &rows)
}
