//! Subcommand definitions and dispatch.
//!
//! Each subcommand is a fixed sequence of stage calls over the loaded
//! configuration. `analyze` and `label-2d-filter` loop as unattended watch
//! commands until Ctrl+C.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use pipeline::{
    config::Config,
    stages::{analyze, angles, calibrate, filter, label, progress, summarize, triangulate},
    watch::{CancelToken, run_watch},
};

/// Command-line orchestration for a multi-camera animal-pose pipeline.
#[derive(Debug, Parser)]
#[command(name = "posepipe", version, about)]
pub struct Cli {
    /// Config file to use instead of the default "config.toml".
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Calibrate intrinsics then extrinsics for every session.
    Calibrate,
    /// Calibrate camera intrinsics only.
    CalibrateIntrinsics,
    /// Calibrate camera extrinsics only.
    CalibrateExtrinsics,
    /// Aggregate reprojection errors per session.
    CalibrationErrors,
    /// Run 2D pose inference, looping to pick up new videos.
    Analyze,
    /// Filter tracked 2D points.
    Filter,
    /// Triangulate 2D poses into 3D.
    Triangulate,
    /// Compute configured joint angles from 3D poses.
    Angles,
    /// Summarize angles and 3D pose tables.
    #[command(name = "summarize-3d")]
    Summarize3d,
    /// Summarize 2D pose tables (and filtered tables when enabled).
    #[command(name = "summarize-2d")]
    Summarize2d,
    /// Summarize per-session reprojection errors.
    SummarizeErrors,
    /// Render labeled 2D videos.
    #[command(name = "label-2d")]
    Label2d,
    /// Filter, summarize, and render filtered labeled videos, looping.
    #[command(name = "label-2d-filter")]
    Label2dFilter,
    /// Render 3D scene videos.
    #[command(name = "label-3d")]
    Label3d,
    /// Combine labeled 2D and 3D videos side by side.
    LabelCombined,
    /// Render the calibration board to calibration.png.
    DrawCalibration,
    /// Calibrate, analyze, and triangulate.
    RunData,
    /// Render every labeled-video flavor.
    RunViz,
    /// The full pipeline: data processing then visualization.
    RunAll,
    /// Report per-session analysis and labeling progress.
    CheckProgress,
}

pub fn dispatch(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Calibrate => {
            info!("Calibrating...");
            calibrate::intrinsics_all(config)?;
            calibrate::extrinsics_all(config)
        }
        Command::CalibrateIntrinsics => {
            info!("Calibrating intrinsics...");
            calibrate::intrinsics_all(config)
        }
        Command::CalibrateExtrinsics => {
            info!("Calibrating extrinsics...");
            calibrate::extrinsics_all(config)
        }
        Command::CalibrationErrors => {
            info!("Getting all the calibration errors...");
            calibrate::errors_all(config)
        }
        Command::Analyze => {
            info!("Analyzing videos...");
            watch_loop(config, |config| analyze::analyze_all(config))
        }
        Command::Filter => {
            info!("Filtering tracked points...");
            filter::filter_all(config)
        }
        Command::Triangulate => {
            info!("Triangulating points...");
            triangulate::triangulate_all(config)
        }
        Command::Angles => {
            info!("Computing angles...");
            angles::angles_all(config)
        }
        Command::Summarize3d => {
            info!("Summarizing angles...");
            summarize::summarize_angles(config)?;
            info!("Summarizing 3D pose...");
            summarize::summarize_pose3d(config)
        }
        Command::Summarize2d => {
            info!("Summarizing 2D pose...");
            summarize::summarize_pose2d(config)?;
            if config.filter.enabled {
                info!("Summarizing filtered 2D pose...");
                summarize::summarize_pose2d_filtered(config)?;
            }
            Ok(())
        }
        Command::SummarizeErrors => {
            info!("Summarizing errors...");
            summarize::summarize_errors(config)
        }
        Command::Label2d => {
            info!("Labeling videos in 2D...");
            label::label_2d_all(config)
        }
        Command::Label2dFilter => {
            info!("Labeling (and summarizing) videos in 2D...");
            watch_loop(config, |config| {
                summarize::summarize_pose2d(config)?;
                if config.filter.enabled {
                    filter::filter_all(config)?;
                    summarize::summarize_pose2d_filtered(config)?;
                }
                summarize::summarize_errors(config)?;
                label::label_filtered_all(config)
            })
        }
        Command::Label3d => {
            info!("Labeling videos in 3D...");
            label::label_3d_all(config)
        }
        Command::LabelCombined => {
            info!("Labeling combined videos...");
            label::label_combined_all(config)
        }
        Command::DrawCalibration => {
            info!("Drawing calibration board...");
            calibrate::draw_board(config)
        }
        Command::RunData => {
            run_data(config)?;
            info!("Data processing done");
            Ok(())
        }
        Command::RunViz => run_viz(config),
        Command::RunAll => {
            info!("Calibrating...");
            calibrate::intrinsics_all(config)?;
            calibrate::extrinsics_all(config)?;

            info!("Analyzing videos...");
            analyze::analyze_all(config)?;

            if config.filter.enabled {
                info!("Filtering tracked points...");
                filter::filter_all(config)?;
            }

            info!("Triangulating points...");
            triangulate::triangulate_all(config)?;

            info!("Computing angles...");
            angles::angles_all(config)?;

            run_viz(config)
        }
        Command::CheckProgress => progress::check_progress(config),
    }
}

fn run_data(config: &Config) -> Result<()> {
    info!("Calibrating...");
    calibrate::intrinsics_all(config)?;
    calibrate::extrinsics_all(config)?;

    info!("Analyzing videos...");
    analyze::analyze_all(config)?;

    info!("Triangulating points...");
    triangulate::triangulate_all(config)
}

fn run_viz(config: &Config) -> Result<()> {
    info!("Labeling videos in 2D...");
    if config.filter.enabled {
        label::label_filtered_all(config)?;
    } else {
        label::label_2d_all(config)?;
    }
    info!("Labeling videos in 3D...");
    label::label_3d_all(config)
}

/// Run `pass` in the cancellable watch loop, wiring Ctrl+C to the token.
fn watch_loop(config: &Config, pass: impl FnMut(&Config) -> Result<()>) -> Result<()> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install Ctrl+C handler")?;

    let interval = Duration::from_secs(config.pipeline.pause_seconds);
    let mut pass = pass;
    run_watch(interval, &token, || pass(config))
}
