//! Session discovery and the shared file-listing conventions.
//!
//! A session is any directory under the project root containing the
//! configured raw-video subdirectory as an immediate child. Sessions are
//! discovered fresh on every run and carry no identity beyond their path.

use std::{
    cmp::Ordering,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use tracing::{debug, error};
use walkdir::WalkDir;

use crate::config::Config;

/// Discover every session directory under the project root.
///
/// Ordering across sessions follows the filesystem walk and is not part of
/// the contract; callers must not depend on it.
pub fn sessions(config: &Config) -> Result<Vec<PathBuf>> {
    let root = &config.path;
    let raw_name = config.pipeline.videos_raw.as_str();

    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path().join(raw_name).is_dir() {
            found.push(entry.path().to_path_buf());
        }
    }
    debug!("discovered {} session(s) under {}", found.len(), root.display());
    Ok(found)
}

/// Apply a stage processor to every discovered session.
///
/// A failing session is logged and skipped rather than aborting the walk;
/// the error surfaces once at the end so the exit status still reflects the
/// failure.
pub fn process_all(
    config: &Config,
    mut f: impl FnMut(&Config, &Path) -> Result<()>,
) -> Result<()> {
    let mut failed = 0usize;
    for session in sessions(config)? {
        if let Err(err) = f(config, &session) {
            error!("session {} failed: {err:?}", session.display());
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} session(s) failed");
    }
    Ok(())
}

/// List `dir`'s files with the given extension (no dot), in natural order.
///
/// A missing directory is an empty listing, not an error: stages treat
/// "no inputs yet" as nothing to do.
pub fn list_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == ext) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| natural_cmp_paths(a, b));
    Ok(files)
}

/// File stem as an owned string, lossy on non-UTF-8 names.
pub fn basename(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One token of a natural sort key. Numeric runs compare as numbers and sort
/// ahead of text when a digit meets a letter at the same position.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NaturalToken {
    Number(u64),
    Text(String),
}

/// Sort key ordering embedded numeric runs numerically, so `vid2` sorts
/// before `vid10`.
pub fn natural_key(name: &str) -> Vec<NaturalToken> {
    let mut tokens = Vec::new();
    let mut chars = name.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut value: u64 = 0;
            while let Some(&d) = chars.peek() {
                if let Some(digit) = d.to_digit(10) {
                    value = value.saturating_mul(10).saturating_add(digit as u64);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(NaturalToken::Number(value));
        } else {
            let mut text = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    break;
                }
                text.push(d);
                chars.next();
            }
            tokens.push(NaturalToken::Text(text));
        }
    }
    tokens
}

fn natural_cmp_paths(a: &Path, b: &Path) -> Ordering {
    natural_key(&a.to_string_lossy()).cmp(&natural_key(&b.to_string_lossy()))
}

/// Compare two names by their natural keys.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b))
}

/// Split `items` into `n` contiguous chunks whose sizes differ by at most
/// one and whose concatenation reproduces the input order. The first
/// `len % n` chunks carry the extra element.
pub fn split_chunks<T>(items: Vec<T>, n: usize) -> Vec<Vec<T>> {
    let n = n.max(1);
    let len = items.len();
    let base = len / n;
    let extra = len % n;

    let mut chunks = Vec::with_capacity(n);
    let mut iter = items.into_iter();
    for i in 0..n {
        let size = base + usize::from(i < extra);
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}
