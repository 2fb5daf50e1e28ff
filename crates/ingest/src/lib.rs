//! Subprocess boundary for the heavy external tools the pipeline delegates to:
//! the pose estimator, the labeled-video renderer, and the camera calibrator.
//!
//! The pipeline never links against pose-estimation or video-codec libraries.
//! Each tool is an external command configured by name, invoked with a small
//! argument contract, and judged solely by its exit status and the files it
//! leaves behind.

use std::process::{Command, ExitStatus, Output};

use thiserror::Error;
use tracing::debug;

mod calibrator;
mod estimator;
mod renderer;

pub use calibrator::{BoardSpec, Calibrator};
pub use estimator::{PoseEstimator, rename_outputs};
pub use renderer::LabelRenderer;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Run a fully-assembled tool command, capturing output.
///
/// Stdout is discarded (the tools are chatty); stderr is kept so a failing
/// invocation can surface the tool's own diagnostics in the error chain.
pub(crate) fn run_tool(mut cmd: Command) -> Result<(), ToolError> {
    let tool = cmd.get_program().to_string_lossy().into_owned();
    debug!("running {:?}", cmd);

    let Output { status, stderr, .. } = cmd.output().map_err(|source| ToolError::Launch {
        tool: tool.clone(),
        source,
    })?;

    if !status.success() {
        return Err(ToolError::Failed {
            tool,
            status,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }
    Ok(())
}
