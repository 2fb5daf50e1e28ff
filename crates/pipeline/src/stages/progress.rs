//! Progress report: how much of each session has been analyzed and labeled.
//!
//! This is a report for the operator, so it prints rather than logs.

use std::path::Path;

use anyhow::Result;

use crate::{
    config::Config,
    session::{basename, list_files, sessions},
    stages::POSE_EXT,
};

/// Per-session progress counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionProgress {
    pub videos: usize,
    pub analyzed: usize,
    pub labeled: usize,
}

/// Count a session's raw videos against its produced artifacts.
pub fn session_progress(config: &Config, session: &Path) -> Result<SessionProgress> {
    let ext = &config.pipeline.video_ext;
    let raw = session.join(&config.pipeline.videos_raw);
    let pose_dir = session.join(&config.pipeline.pose_2d);
    let labeled_dir = session.join(&config.pipeline.videos_labeled_2d_filter);

    let mut progress = SessionProgress::default();
    for video in list_files(&raw, ext)? {
        progress.videos += 1;
        let base = basename(&video);
        if pose_dir.join(format!("{base}.{POSE_EXT}")).exists() {
            progress.analyzed += 1;
        }
        if labeled_dir.join(format!("{base}.{ext}")).exists() {
            progress.labeled += 1;
        }
    }
    Ok(progress)
}

/// Print the project-wide progress report.
pub fn check_progress(config: &Config) -> Result<()> {
    println!();
    println!("Project: {}", config.project);
    println!();

    for session in sessions(config)? {
        let progress = session_progress(config, &session)?;
        if progress.videos == 0 {
            continue;
        }
        let name = session
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| session.display().to_string());
        println!("{name}");
        println!(
            "    Analyzed: {} out of {} videos.",
            progress.analyzed, progress.videos
        );
        println!(
            "    Labeled:  {} out of {} videos.",
            progress.labeled, progress.videos
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PoseTable, write_json};
    use std::fs;

    #[test]
    fn counts_analyzed_out_of_total() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("s1");
        let raw = session.join("videos-raw");
        fs::create_dir_all(&raw).unwrap();
        for name in ["v1.avi", "v2.avi", "v3.avi"] {
            fs::File::create(raw.join(name)).unwrap();
        }
        write_json(&session.join("pose-2d/v1.json"), &PoseTable::default()).unwrap();
        write_json(&session.join("pose-2d/v3.json"), &PoseTable::default()).unwrap();

        let mut config = Config::default();
        config.path = dir.path().to_path_buf();

        let progress = session_progress(&config, &session).unwrap();
        assert_eq!(progress.videos, 3);
        assert_eq!(progress.analyzed, 2);
        assert_eq!(progress.labeled, 0);
    }

    #[test]
    fn labeled_counts_require_the_output_video() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("s1");
        fs::create_dir_all(session.join("videos-raw")).unwrap();
        fs::File::create(session.join("videos-raw/v1.avi")).unwrap();
        fs::create_dir_all(session.join("videos-labeled-filtered")).unwrap();
        fs::File::create(session.join("videos-labeled-filtered/v1.avi")).unwrap();

        let mut config = Config::default();
        config.path = dir.path().to_path_buf();

        let progress = session_progress(&config, &session).unwrap();
        assert_eq!(progress.videos, 1);
        assert_eq!(progress.labeled, 1);
    }
}
