//! Invocation of the external 2D pose-estimation tool.
//!
//! The tool is called once per video with the model config, a destination
//! folder, the video extension, and an optional GPU index. It may write its
//! outputs under tool-specific suffixed names; [`rename_outputs`] folds those
//! back onto the `<basename>.<ext>` convention the rest of the pipeline
//! expects.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result};
use tracing::debug;

use crate::{ToolError, run_tool};

/// Handle on the configured pose-estimation command and its model.
pub struct PoseEstimator {
    program: String,
    model_config: PathBuf,
}

impl PoseEstimator {
    /// `model_folder` is the directory holding the tool's own model config.
    pub fn new(program: &str, model_folder: &Path) -> Self {
        Self {
            program: program.to_string(),
            model_config: model_folder.join("config.yaml"),
        }
    }

    /// Run 2D pose inference for a single video, writing into `dest`.
    ///
    /// `gpu` selects the device index the tool should use; `None` leaves the
    /// choice to the tool (CPU or its own default).
    pub fn analyze(
        &self,
        video: &Path,
        dest: &Path,
        videotype: &str,
        gpu: Option<u32>,
    ) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--config")
            .arg(&self.model_config)
            .arg("--dest")
            .arg(dest)
            .arg("--videotype")
            .arg(videotype);
        if let Some(index) = gpu {
            cmd.arg("--gpu").arg(index.to_string());
        }
        cmd.arg(video);
        run_tool(cmd)
    }
}

/// Rename every file in `dir` whose name starts with `base` to the plain
/// `base.<ext>` convention, dropping any tool-specific suffix.
///
/// Pose estimators tend to tag outputs with model metadata
/// (`vid1ModelXshuffle0.json`); downstream stages only ever look for
/// `vid1.json`, so the suffix is stripped here, immediately after the tool
/// runs.
pub fn rename_outputs(dir: &Path, base: &str) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = name.rsplit_once('.').map(|(stem, _)| stem) else {
            continue;
        };
        if !stem.starts_with(base) || stem == base {
            continue;
        }
        let ext = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
        let target = dir.join(format!("{base}.{ext}"));
        debug!("renaming {} -> {}", name, target.display());
        fs::rename(entry.path(), &target)
            .with_context(|| format!("failed to rename {} to {}", name, target.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn rename_strips_tool_suffix() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("vid1ModelXshuffle0.json")).unwrap();
        File::create(dir.path().join("vid1ModelXshuffle0.csv")).unwrap();

        rename_outputs(dir.path(), "vid1").unwrap();

        assert!(dir.path().join("vid1.json").exists());
        assert!(dir.path().join("vid1.csv").exists());
        assert!(!dir.path().join("vid1ModelXshuffle0.json").exists());
    }

    #[test]
    fn rename_leaves_canonical_names_alone() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("vid1.json")).unwrap();
        File::create(dir.path().join("unrelated.json")).unwrap();

        rename_outputs(dir.path(), "vid1").unwrap();

        assert!(dir.path().join("vid1.json").exists());
        assert!(dir.path().join("unrelated.json").exists());
    }
}
