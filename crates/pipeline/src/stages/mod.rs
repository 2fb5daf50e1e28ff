//! Per-stage processors. Each stage exposes a `*_all` entry point that walks
//! every session, plus its per-session function for direct use in tests.

pub mod analyze;
pub mod angles;
pub mod calibrate;
pub mod filter;
pub mod label;
pub mod progress;
pub mod summarize;
pub mod triangulate;

/// Extension used by all pose, angle, and summary artifacts.
pub const POSE_EXT: &str = "json";
