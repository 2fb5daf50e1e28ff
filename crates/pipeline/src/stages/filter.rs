//! 2D pose filtering stage.
//!
//! Drops low-confidence points and tracking jumps (large deviation from a
//! rolling median), then fills the gaps by interpolation. This is the one
//! stage whose computation lives in this crate: it is plain per-track
//! smoothing, not pose estimation.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, info};

use crate::{
    config::{Config, FilterConfig},
    data::{PoseTable, read_pose_table, write_json},
    session::{basename, list_files, process_all},
    stages::POSE_EXT,
};

/// Filter every analyzed video in the project.
pub fn filter_all(config: &Config) -> Result<()> {
    process_all(config, process_session)
}

/// Filter each pose table in the session that has no filtered counterpart.
pub fn process_session(config: &Config, session: &Path) -> Result<()> {
    let indir = session.join(&config.pipeline.pose_2d);
    let outdir = session.join(&config.pipeline.pose_2d_filter);

    for pose_path in list_files(&indir, POSE_EXT)? {
        let base = basename(&pose_path);
        let out = outdir.join(format!("{base}.{POSE_EXT}"));
        if out.exists() {
            debug!("{} already filtered, skipping", base);
            continue;
        }

        info!("filtering {}", pose_path.display());
        let table = read_pose_table(&pose_path)?;
        let filtered = filter_table(&config.filter, &table);
        write_json(&out, &filtered)?;
    }
    Ok(())
}

/// Apply the configured filter to a whole table, one bodypart track at a
/// time. Frame rows must be one keypoint per bodypart; `read_pose_table`
/// enforces this at load.
pub fn filter_table(config: &FilterConfig, table: &PoseTable) -> PoseTable {
    let n_frames = table.frames.len();
    let n_parts = table.bodyparts.len();
    let mut out = table.clone();

    for part in 0..n_parts {
        let xs: Vec<f64> = table.frames.iter().map(|f| f[part].x).collect();
        let ys: Vec<f64> = table.frames.iter().map(|f| f[part].y).collect();
        let scores: Vec<f64> = table.frames.iter().map(|f| f[part].score).collect();

        let valid = mark_valid(config, &xs, &ys, &scores);
        let fx = fill_track(&xs, &valid, config.spline);
        let fy = fill_track(&ys, &valid, config.spline);

        for frame in 0..n_frames {
            let point = &mut out.frames[frame][part];
            point.x = fx[frame];
            point.y = fy[frame];
            if !valid[frame] {
                // Interpolated points carry zero confidence so downstream
                // stages can still gate on score.
                point.score = 0.0;
            }
        }
    }
    out
}

/// Valid = confident enough and close enough to the rolling median.
fn mark_valid(config: &FilterConfig, xs: &[f64], ys: &[f64], scores: &[f64]) -> Vec<bool> {
    let med_x = rolling_median(xs, config.medfilt);
    let med_y = rolling_median(ys, config.medfilt);

    scores
        .iter()
        .enumerate()
        .map(|(i, &score)| {
            if score < config.score_threshold {
                return false;
            }
            let offset = (xs[i] - med_x[i]).abs() + (ys[i] - med_y[i]).abs();
            offset <= config.offset_threshold
        })
        .collect()
}

/// Rolling median with a window clamped at the track edges. The window is
/// forced odd so the median sits on a sample.
fn rolling_median(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1) | 1;
    let half = window / 2;
    let len = values.len();

    (0..len)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(len);
            let mut slice = values[lo..hi].to_vec();
            slice.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            slice[slice.len() / 2]
        })
        .collect()
}

/// Replace invalid samples by interpolating between the nearest valid
/// neighbors. Leading and trailing gaps are clamped to the nearest valid
/// value. If nothing is valid, the track is returned untouched.
fn fill_track(values: &[f64], valid: &[bool], spline: bool) -> Vec<f64> {
    let anchors: Vec<usize> = valid
        .iter()
        .enumerate()
        .filter_map(|(i, &ok)| ok.then_some(i))
        .collect();
    if anchors.is_empty() {
        return values.to_vec();
    }

    let mut out = values.to_vec();
    for i in 0..values.len() {
        if valid[i] {
            continue;
        }
        let next = anchors.partition_point(|&a| a < i);
        out[i] = match (next.checked_sub(1).map(|p| anchors[p]), anchors.get(next)) {
            (None, Some(&after)) => values[after],
            (Some(before), None) => values[before],
            (Some(before), Some(&after)) => {
                let t = (i - before) as f64 / (after - before) as f64;
                if spline {
                    interpolate_smooth(values, &anchors, before, after, t)
                } else {
                    values[before] + (values[after] - values[before]) * t
                }
            }
            (None, None) => unreachable!("anchors checked non-empty"),
        };
    }
    out
}

/// Catmull-Rom segment between two anchor samples, using the surrounding
/// anchors for tangents. Falls back to the segment endpoints at the track
/// edges.
fn interpolate_smooth(values: &[f64], anchors: &[usize], before: usize, after: usize, t: f64) -> f64 {
    let pos = anchors.iter().position(|&a| a == before).unwrap_or(0);
    let p1 = values[before];
    let p2 = values[after];
    let p0 = if pos > 0 { values[anchors[pos - 1]] } else { p1 };
    let p3 = anchors.get(pos + 2).map(|&a| values[a]).unwrap_or(p2);

    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * p1 - 3.0 * p2 + p0 - p3) * t3)
}
