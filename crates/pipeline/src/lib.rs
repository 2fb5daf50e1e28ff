//! Session discovery, configuration, and per-stage processors for the
//! multi-camera animal-pose pipeline.
//!
//! Every stage follows the same shape: derive input/output directories from
//! the configured layout, glob expected inputs in natural order, skip files
//! whose output already exists, and either delegate to an external tool (via
//! the `ingest` crate) or run a small numeric routine. Existence of the
//! output file is the only "already processed" marker.

pub mod calibration;
pub mod config;
pub mod data;
pub mod session;
pub mod stages;
pub mod watch;
