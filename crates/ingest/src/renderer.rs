//! Invocation of the external labeled-video renderer.
//!
//! Rendering dots and skeletons onto video frames means decoding and
//! re-encoding video, which stays outside this codebase. The renderer command
//! receives the source video, the pose (or angle) artifact, the output path,
//! and the configured dot size.

use std::{path::Path, process::Command};

use crate::{ToolError, run_tool};

/// Handle on the configured renderer command.
pub struct LabelRenderer {
    program: String,
    dot_size: u32,
}

impl LabelRenderer {
    pub fn new(program: &str, dot_size: u32) -> Self {
        Self {
            program: program.to_string(),
            dot_size,
        }
    }

    /// Overlay a 2D pose table onto its source video.
    pub fn render_2d(&self, video: &Path, pose: &Path, out: &Path) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("2d")
            .arg("--video")
            .arg(video)
            .arg("--pose")
            .arg(pose)
            .arg("--dot-size")
            .arg(self.dot_size.to_string())
            .arg("--output")
            .arg(out);
        run_tool(cmd)
    }

    /// Render a 3D pose table as a rotating scene video.
    pub fn render_3d(&self, pose3d: &Path, out: &Path) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("3d")
            .arg("--pose")
            .arg(pose3d)
            .arg("--dot-size")
            .arg(self.dot_size.to_string())
            .arg("--output")
            .arg(out);
        run_tool(cmd)
    }

    /// Stack a labeled 2D video and a 3D scene video side by side.
    pub fn render_combined(&self, labeled: &Path, scene: &Path, out: &Path) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("combine")
            .arg("--left")
            .arg(labeled)
            .arg("--right")
            .arg(scene)
            .arg("--output")
            .arg(out);
        run_tool(cmd)
    }
}
