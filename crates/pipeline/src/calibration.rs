//! Calibration results consumed by the triangulation stage.
//!
//! The external calibrator writes per-session intrinsics and extrinsics;
//! their product is a `calibration.json` holding one 3x4 projection matrix
//! per camera. Reading and reprojecting those matrices is all this module
//! does; solving them is the external tool's job.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use nalgebra::{Matrix3x4, Vector2, Vector4};
use serde::{Deserialize, Serialize};

pub const CALIBRATION_FILE: &str = "calibration.json";
pub const INTRINSICS_FILE: &str = "intrinsics.json";
pub const EXTRINSICS_FILE: &str = "extrinsics.json";

/// One calibrated camera: its name (as used in video basenames) and the
/// projection matrix `P = K [R|t]`, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub name: String,
    pub matrix: [[f64; 4]; 3],
    pub width: u32,
    pub height: u32,
}

impl CameraCalibration {
    pub fn projection(&self) -> Matrix3x4<f64> {
        Matrix3x4::from_fn(|r, c| self.matrix[r][c])
    }

    /// Project a world point to pixel coordinates.
    pub fn project(&self, point: &Vector4<f64>) -> Vector2<f64> {
        let p = self.projection() * point;
        Vector2::new(p.x / p.z, p.y / p.z)
    }
}

/// The set of calibrated cameras for one session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationSet {
    pub cameras: Vec<CameraCalibration>,
}

impl CalibrationSet {
    /// Path of the session's calibration file under the configured results
    /// directory.
    pub fn path(session: &Path, results_dir: &str) -> PathBuf {
        session.join(results_dir).join(CALIBRATION_FILE)
    }

    pub fn load(path: &Path) -> Result<Self> {
        crate::data::read_json(path)
            .with_context(|| format!("failed to load calibration {}", path.display()))
    }

    pub fn camera(&self, name: &str) -> Result<&CameraCalibration> {
        match self.cameras.iter().find(|cam| cam.name == name) {
            Some(cam) => Ok(cam),
            None => bail!("camera {name:?} not present in calibration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_matches_matrix_layout() {
        let cam = CameraCalibration {
            name: "cam1".to_string(),
            matrix: [
                [800.0, 0.0, 320.0, 0.0],
                [0.0, 800.0, 240.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            width: 640,
            height: 480,
        };
        let px = cam.project(&Vector4::new(0.0, 0.0, 2.0, 1.0));
        assert!((px.x - 320.0).abs() < 1e-12);
        assert!((px.y - 240.0).abs() < 1e-12);
    }

    #[test]
    fn camera_lookup_by_name() {
        let set = CalibrationSet {
            cameras: vec![CameraCalibration {
                name: "camA".to_string(),
                matrix: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]],
                width: 640,
                height: 480,
            }],
        };
        assert!(set.camera("camA").is_ok());
        assert!(set.camera("camB").is_err());
    }
}
