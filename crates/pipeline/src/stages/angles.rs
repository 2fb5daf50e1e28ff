//! Joint-angle computation stage.
//!
//! For each configured joint (three bodyparts), computes the angle at the
//! vertex point per frame, in degrees. Frames where any constituent point is
//! missing produce `None`.

use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::Vector3;
use tracing::{debug, info};

use crate::{
    config::Config,
    data::{AngleTable, PoseTable3d, read_pose_table_3d, write_json},
    session::{basename, list_files, process_all},
    stages::POSE_EXT,
};

/// Compute angles for every session in the project.
pub fn angles_all(config: &Config) -> Result<()> {
    process_all(config, process_session)
}

/// Compute angles for each 3D pose table without an existing angle table.
pub fn process_session(config: &Config, session: &Path) -> Result<()> {
    if config.angles.is_empty() {
        return Ok(());
    }

    let indir = session.join(&config.pipeline.pose_3d);
    let outdir = session.join(&config.pipeline.angles);

    for pose_path in list_files(&indir, POSE_EXT)? {
        let base = basename(&pose_path);
        let out = outdir.join(format!("{base}.{POSE_EXT}"));
        if out.exists() {
            debug!("{} already has angles, skipping", base);
            continue;
        }

        info!("computing angles for {}", pose_path.display());
        let table = read_pose_table_3d(&pose_path)?;
        let angles = compute_angles(config, &table)
            .with_context(|| format!("bad angle definition for {}", pose_path.display()))?;
        write_json(&out, &angles)?;
    }
    Ok(())
}

/// Evaluate every configured joint over the whole table.
pub fn compute_angles(config: &Config, table: &PoseTable3d) -> Result<AngleTable> {
    let mut joints = Vec::with_capacity(config.angles.len());
    let mut names = Vec::with_capacity(config.angles.len());
    for (name, [a, b, c]) in &config.angles {
        let indices = [a, b, c].map(|part| {
            table
                .bodyparts
                .iter()
                .position(|p| p == part)
                .with_context(|| format!("angle {name:?} references unknown bodypart {part:?}"))
        });
        let [ia, ib, ic] = indices;
        joints.push((ia?, ib?, ic?));
        names.push(name.clone());
    }

    let frames = table
        .frames
        .iter()
        .map(|frame| {
            joints
                .iter()
                .map(|&(ia, ib, ic)| {
                    let (a, b, c) = (frame[ia]?, frame[ib]?, frame[ic]?);
                    joint_angle(
                        Vector3::new(a.x, a.y, a.z),
                        Vector3::new(b.x, b.y, b.z),
                        Vector3::new(c.x, c.y, c.z),
                    )
                })
                .collect()
        })
        .collect();

    Ok(AngleTable { names, frames })
}

/// Angle at `b` between rays `b->a` and `b->c`, in degrees. `None` when a
/// ray has zero length.
fn joint_angle(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Option<f64> {
    let u = a - b;
    let v = c - b;
    let lengths = u.norm() * v.norm();
    if lengths <= f64::EPSILON {
        return None;
    }
    let cosine = (u.dot(&v) / lengths).clamp(-1.0, 1.0);
    Some(cosine.acos().to_degrees())
}
