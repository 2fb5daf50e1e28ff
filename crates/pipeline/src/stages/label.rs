//! Labeled-video rendering stages.
//!
//! All four labeling flavors share one shape: pair a pose artifact with its
//! source video, skip when the labeled output exists, and hand the pair to
//! the external renderer.

use std::path::{Path, PathBuf};

use anyhow::Result;
use ingest::LabelRenderer;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    session::{basename, list_files, natural_cmp, process_all},
    stages::POSE_EXT,
};

pub fn label_2d_all(config: &Config) -> Result<()> {
    process_all(config, |config, session| {
        label_2d_session(
            config,
            session,
            &config.pipeline.pose_2d,
            &config.pipeline.videos_labeled_2d,
        )
    })
}

pub fn label_filtered_all(config: &Config) -> Result<()> {
    process_all(config, |config, session| {
        label_2d_session(
            config,
            session,
            &config.pipeline.pose_2d_filter,
            &config.pipeline.videos_labeled_2d_filter,
        )
    })
}

pub fn label_3d_all(config: &Config) -> Result<()> {
    process_all(config, label_3d_session)
}

pub fn label_combined_all(config: &Config) -> Result<()> {
    process_all(config, label_combined_session)
}

fn renderer(config: &Config) -> LabelRenderer {
    LabelRenderer::new(&config.model.render_cmd, config.labeling.dot_size)
}

/// Render dots over each raw video that has a pose table in `pose_dir` and
/// no labeled counterpart in `out_dir`.
pub fn label_2d_session(
    config: &Config,
    session: &Path,
    pose_dir: &str,
    out_dir: &str,
) -> Result<()> {
    let ext = &config.pipeline.video_ext;
    let raw = session.join(&config.pipeline.videos_raw);
    let outdir = session.join(out_dir);
    let renderer = renderer(config);

    for pose in list_files(&session.join(pose_dir), POSE_EXT)? {
        let base = basename(&pose);
        let video = raw.join(format!("{base}.{ext}"));
        if !video.exists() {
            warn!("{} has no matching raw video, skipping", pose.display());
            continue;
        }
        let out = outdir.join(format!("{base}.{ext}"));
        if out.exists() {
            debug!("{} already labeled, skipping", base);
            continue;
        }

        std::fs::create_dir_all(&outdir)?;
        info!("labeling {}", video.display());
        renderer.render_2d(&video, &pose, &out)?;
    }
    Ok(())
}

/// Render each 3D pose table as a scene video.
pub fn label_3d_session(config: &Config, session: &Path) -> Result<()> {
    let ext = &config.pipeline.video_ext;
    let outdir = session.join(&config.pipeline.videos_labeled_3d);
    let renderer = renderer(config);

    for pose in list_files(&session.join(&config.pipeline.pose_3d), POSE_EXT)? {
        let base = basename(&pose);
        let out = outdir.join(format!("{base}.{ext}"));
        if out.exists() {
            debug!("{} already rendered, skipping", base);
            continue;
        }

        std::fs::create_dir_all(&outdir)?;
        info!("rendering 3D scene for {}", pose.display());
        renderer.render_3d(&pose, &out)?;
    }
    Ok(())
}

/// Stack the first camera's filtered labeled video beside the 3D scene
/// video for each trial.
pub fn label_combined_session(config: &Config, session: &Path) -> Result<()> {
    let ext = &config.pipeline.video_ext;
    let scene_dir = session.join(&config.pipeline.videos_labeled_3d);
    let labeled_dir = session.join(&config.pipeline.videos_labeled_2d_filter);
    let outdir = session.join(&config.pipeline.videos_combined);
    let renderer = renderer(config);

    for scene in list_files(&scene_dir, ext)? {
        let trial = basename(&scene);
        let out = outdir.join(format!("{trial}.{ext}"));
        if out.exists() {
            debug!("{} already combined, skipping", trial);
            continue;
        }

        let Some(labeled) = first_camera_video(config, &labeled_dir, &trial)? else {
            warn!("no labeled 2D video for trial {trial}, skipping");
            continue;
        };

        std::fs::create_dir_all(&outdir)?;
        info!("combining {trial}");
        renderer.render_combined(&labeled, &scene, &out)?;
    }
    Ok(())
}

/// First (natural camera order) labeled video belonging to `trial`.
fn first_camera_video(config: &Config, dir: &Path, trial: &str) -> Result<Option<PathBuf>> {
    let sep = &config.calibration.cam_separator;
    let mut candidates: Vec<PathBuf> = list_files(dir, &config.pipeline.video_ext)?
        .into_iter()
        .filter(|video| {
            basename(video)
                .split_once(sep.as_str())
                .is_some_and(|(_, t)| t == trial)
        })
        .collect();
    candidates.sort_by(|a, b| natural_cmp(&basename(a), &basename(b)));
    Ok(candidates.into_iter().next())
}
