//! Invocation of the external camera-calibration tool.
//!
//! Board detection and the intrinsic/extrinsic solves live in the external
//! tool; this module only assembles its command line from the configured
//! board geometry and collects files by convention.

use std::{path::Path, process::Command};

use crate::{ToolError, run_tool};

/// Calibration-board geometry forwarded to the external tool.
#[derive(Debug, Clone)]
pub struct BoardSpec {
    pub dictionary: String,
    pub squares_x: u32,
    pub squares_y: u32,
    pub square_length: f64,
    pub marker_length: f64,
}

/// Handle on the configured calibrator command.
pub struct Calibrator {
    program: String,
    board: BoardSpec,
}

impl Calibrator {
    pub fn new(program: &str, board: BoardSpec) -> Self {
        Self {
            program: program.to_string(),
            board,
        }
    }

    fn base_cmd(&self, mode: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(mode)
            .arg("--dictionary")
            .arg(&self.board.dictionary)
            .arg("--squares-x")
            .arg(self.board.squares_x.to_string())
            .arg("--squares-y")
            .arg(self.board.squares_y.to_string())
            .arg("--square-length")
            .arg(self.board.square_length.to_string())
            .arg("--marker-length")
            .arg(self.board.marker_length.to_string());
        cmd
    }

    /// Solve per-camera intrinsics from the calibration videos.
    pub fn calibrate_intrinsics(&self, videos: &[&Path], out: &Path) -> Result<(), ToolError> {
        let mut cmd = self.base_cmd("intrinsics");
        cmd.arg("--output").arg(out);
        for video in videos {
            cmd.arg(video);
        }
        run_tool(cmd)
    }

    /// Solve camera extrinsics given previously solved intrinsics. `animal`
    /// selects the tool's animal-specific (sparse, moving-board) solve.
    pub fn calibrate_extrinsics(
        &self,
        videos: &[&Path],
        intrinsics: &Path,
        out: &Path,
        animal: bool,
    ) -> Result<(), ToolError> {
        run_tool(self.extrinsics_cmd(videos, intrinsics, out, animal))
    }

    fn extrinsics_cmd(&self, videos: &[&Path], intrinsics: &Path, out: &Path, animal: bool) -> Command {
        let mut cmd = self.base_cmd("extrinsics");
        if animal {
            cmd.arg("--animal");
        }
        cmd.arg("--intrinsics").arg(intrinsics).arg("--output").arg(out);
        for video in videos {
            cmd.arg(video);
        }
        cmd
    }

    /// Render the calibration board itself to an image file.
    pub fn draw_board(&self, out: &Path) -> Result<(), ToolError> {
        let mut cmd = self.base_cmd("draw");
        cmd.arg("--output").arg(out);
        run_tool(cmd)
    }
}
