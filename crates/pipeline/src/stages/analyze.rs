//! 2D pose-inference stage.
//!
//! The only parallel stage: videos are statically partitioned across the
//! configured GPU set and each worker thread drives the external estimator
//! sequentially over its chunk. No rebalancing happens once chunks are cut,
//! so the last worker may idle when counts do not divide evenly.

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
};

use anyhow::{Context, Result, bail};
use crossbeam_channel::unbounded;
use ingest::{PoseEstimator, rename_outputs};
use tracing::{debug, info};

use crate::{
    config::Config,
    session::{basename, list_files, process_all, split_chunks},
    stages::POSE_EXT,
};

/// Run pose inference for every session in the project.
pub fn analyze_all(config: &Config) -> Result<()> {
    process_all(config, process_session)
}

/// Run pose inference for a single session, fanning out across the GPU set.
pub fn process_session(config: &Config, session: &Path) -> Result<()> {
    let source = session.join(&config.pipeline.videos_raw);
    let videos = list_files(&source, &config.pipeline.video_ext)?;
    if videos.is_empty() {
        return Ok(());
    }

    let outdir = session.join(&config.pipeline.pose_2d);
    fs::create_dir_all(&outdir).with_context(|| format!("failed to create {}", outdir.display()))?;

    let devices = config.pipeline.gpus.devices();
    let chunks = split_chunks(videos, devices.len());
    let (tx, rx) = unbounded::<(PathBuf, anyhow::Error)>();

    thread::scope(|scope| {
        for (chunk, device) in chunks.into_iter().zip(devices.into_iter()) {
            let tx = tx.clone();
            let outdir = outdir.clone();
            scope.spawn(move || {
                let estimator =
                    PoseEstimator::new(&config.model.pose_cmd, &config.model.model_folder);
                for video in chunk {
                    if let Err(err) = analyze_video(config, &estimator, &video, &outdir, device) {
                        let _ = tx.send((video, err));
                    }
                }
            });
        }
        drop(tx);
    });

    let failures: Vec<(PathBuf, anyhow::Error)> = rx.into_iter().collect();
    if !failures.is_empty() {
        for (video, err) in &failures {
            tracing::error!("pose inference failed for {}: {err:?}", video.display());
        }
        bail!(
            "pose inference failed for {} video(s) in {}",
            failures.len(),
            session.display()
        );
    }
    Ok(())
}

/// Analyze one video unless its pose table already exists.
fn analyze_video(
    config: &Config,
    estimator: &PoseEstimator,
    video: &Path,
    outdir: &Path,
    gpu: Option<u32>,
) -> Result<()> {
    let base = basename(video);
    let dataname = outdir.join(format!("{base}.{POSE_EXT}"));
    if dataname.exists() {
        debug!("{} already analyzed, skipping", base);
        return Ok(());
    }

    info!("analyzing {}", video.display());
    estimator
        .analyze(video, outdir, &config.pipeline.video_ext, gpu)
        .with_context(|| format!("estimator failed on {}", video.display()))?;
    rename_outputs(outdir, &base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Keypoint, PoseTable, write_json};
    use std::time::UNIX_EPOCH;

    fn session_with_videos(root: &Path, names: &[&str]) -> PathBuf {
        let session = root.join("session1");
        let raw = session.join("videos-raw");
        fs::create_dir_all(&raw).unwrap();
        for name in names {
            fs::File::create(raw.join(name)).unwrap();
        }
        session
    }

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.path = root.to_path_buf();
        // `true` exits successfully without touching the filesystem, so any
        // missing-output case would be caught by the rename step's listing.
        config.model.pose_cmd = "true".to_string();
        config
    }

    #[test]
    fn existing_outputs_are_not_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_videos(dir.path(), &["vid1.avi"]);
        let mut config = test_config(dir.path());
        // A bogus command proves the estimator is never invoked on skips.
        config.model.pose_cmd = "/nonexistent/pose-estimator".to_string();

        let pose = session.join("pose-2d").join("vid1.json");
        write_json(
            &pose,
            &PoseTable {
                bodyparts: vec!["snout".to_string()],
                frames: vec![vec![Keypoint { x: 0.0, y: 0.0, score: 1.0 }]],
            },
        )
        .unwrap();
        let mtime = fs::metadata(&pose).unwrap().modified().unwrap();

        process_session(&config, &session).unwrap();

        let after = fs::metadata(&pose).unwrap().modified().unwrap();
        assert_eq!(
            mtime.duration_since(UNIX_EPOCH).unwrap(),
            after.duration_since(UNIX_EPOCH).unwrap()
        );
    }

    #[test]
    fn failing_estimator_reports_each_video() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_videos(dir.path(), &["vid1.avi", "vid2.avi"]);
        let mut config = test_config(dir.path());
        config.model.pose_cmd = "false".to_string();

        let err = process_session(&config, &session).unwrap_err();
        assert!(err.to_string().contains("2 video(s)"), "{err}");
    }

    #[test]
    fn empty_session_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_videos(dir.path(), &[]);
        let config = test_config(dir.path());
        process_session(&config, &session).unwrap();
        assert!(!session.join("pose-2d").exists());
    }
}
