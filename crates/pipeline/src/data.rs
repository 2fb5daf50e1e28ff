//! Pose and angle artifacts exchanged between stages.
//!
//! Artifacts are JSON tables written and read with serde. The 2D table is
//! what the pose estimator's outputs are normalized into; the 3D and angle
//! tables are produced by the triangulation and angle stages.

use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// One tracked 2D point with the estimator's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub score: f64,
}

/// Per-video 2D pose table: one row of keypoints per frame, one column per
/// bodypart.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseTable {
    pub bodyparts: Vec<String>,
    pub frames: Vec<Vec<Keypoint>>,
}

impl PoseTable {
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// Column index of a bodypart, if tracked.
    pub fn bodypart_index(&self, name: &str) -> Option<usize> {
        self.bodyparts.iter().position(|part| part == name)
    }

    /// Every frame row must have one keypoint per bodypart.
    pub fn validate(&self) -> Result<()> {
        for (i, frame) in self.frames.iter().enumerate() {
            if frame.len() != self.bodyparts.len() {
                bail!(
                    "frame {i} has {} keypoint(s) for {} bodypart(s)",
                    frame.len(),
                    self.bodyparts.len()
                );
            }
        }
        Ok(())
    }

    /// Mean confidence across all frames and bodyparts, 0.0 when empty.
    pub fn mean_score(&self) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for frame in &self.frames {
            for point in frame {
                sum += point.score;
                count += 1;
            }
        }
        if count == 0 { 0.0 } else { sum / count as f64 }
    }
}

/// A triangulated 3D point with its mean reprojection error in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub error: f64,
}

/// Per-trial 3D pose table. A `None` entry means the point could not be
/// triangulated for that frame (too few confident views).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseTable3d {
    pub bodyparts: Vec<String>,
    pub frames: Vec<Vec<Option<Point3d>>>,
}

impl PoseTable3d {
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// Every frame row must have one entry per bodypart.
    pub fn validate(&self) -> Result<()> {
        for (i, frame) in self.frames.iter().enumerate() {
            if frame.len() != self.bodyparts.len() {
                bail!(
                    "frame {i} has {} point(s) for {} bodypart(s)",
                    frame.len(),
                    self.bodyparts.len()
                );
            }
        }
        Ok(())
    }

    /// Mean reprojection error over all triangulated points, `None` when no
    /// point was triangulated at all.
    pub fn mean_error(&self) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for frame in &self.frames {
            for point in frame.iter().flatten() {
                sum += point.error;
                count += 1;
            }
        }
        (count > 0).then(|| sum / count as f64)
    }
}

/// Per-trial joint-angle table, in degrees. `None` where a constituent point
/// was missing for that frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AngleTable {
    pub names: Vec<String>,
    pub frames: Vec<Vec<Option<f64>>>,
}

/// Read a JSON artifact, with the path in the error chain.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("malformed artifact {}", path.display()))
}

/// Read a 2D pose table and reject ragged frame rows before any stage
/// indexes into them.
pub fn read_pose_table(path: &Path) -> Result<PoseTable> {
    let table: PoseTable = read_json(path)?;
    table
        .validate()
        .with_context(|| format!("malformed artifact {}", path.display()))?;
    Ok(table)
}

/// Read a 3D pose table, rejecting ragged frame rows.
pub fn read_pose_table_3d(path: &Path) -> Result<PoseTable3d> {
    let table: PoseTable3d = read_json(path)?;
    table
        .validate()
        .with_context(|| format!("malformed artifact {}", path.display()))?;
    Ok(table)
}

/// Write a JSON artifact, creating the parent directory on demand.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}
