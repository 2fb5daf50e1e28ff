//! Project configuration loaded from `config.toml`.
//!
//! Every field has a default, so a missing config file yields a fully usable
//! configuration and a partial file is back-filled key by key without
//! touching anything the user supplied. The two derived fields — `path` (the
//! project root) and `project` (its basename) — are resolved once at load
//! time, as is the GPU set.

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use ingest::BoardSpec;
use serde::{Deserialize, Deserializer};

/// Canonical configuration shared by every pipeline stage.
///
/// Loaded once per CLI invocation and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project root. Defaults to the config file's directory, or the current
    /// directory when no config file exists.
    pub path: PathBuf,
    /// Project name. Defaults to the basename of `path`.
    pub project: String,
    pub calibration: CalibrationConfig,
    pub pipeline: PipelineConfig,
    pub filter: FilterConfig,
    pub labeling: LabelingConfig,
    pub model: ModelConfig,
    /// Joint angles to compute: name -> [proximal, vertex, distal] bodyparts.
    pub angles: BTreeMap<String, [String; 3]>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            project: String::new(),
            calibration: CalibrationConfig::default(),
            pipeline: PipelineConfig::default(),
            filter: FilterConfig::default(),
            labeling: LabelingConfig::default(),
            model: ModelConfig::default(),
            angles: BTreeMap::new(),
        }
    }
}

/// Devices available to the pose-inference stage, resolved at load time.
///
/// In TOML this accepts either a bare index (`gpus = 1`) or a list
/// (`gpus = [0, 1]`); absent means "no GPU configured", which still runs a
/// single worker on the tool's default device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GpuSet {
    #[default]
    None,
    Single(u32),
    List(Vec<u32>),
}

impl GpuSet {
    /// Number of pose-inference workers to run in parallel.
    pub fn worker_count(&self) -> usize {
        match self {
            GpuSet::None | GpuSet::Single(_) => 1,
            GpuSet::List(ids) => ids.len().max(1),
        }
    }

    /// One device slot per worker, in worker order.
    pub fn devices(&self) -> Vec<Option<u32>> {
        match self {
            GpuSet::None => vec![None],
            GpuSet::Single(id) => vec![Some(*id)],
            GpuSet::List(ids) if ids.is_empty() => vec![None],
            GpuSet::List(ids) => ids.iter().copied().map(Some).collect(),
        }
    }
}

impl<'de> Deserialize<'de> for GpuSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Single(u32),
            List(Vec<u32>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Single(id) => GpuSet::Single(id),
            Raw::List(ids) if ids.is_empty() => GpuSet::None,
            Raw::List(ids) => GpuSet::List(ids),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Whether the calibration board is attached to the animal itself.
    pub animal_calibration: bool,
    /// Marker dictionary understood by the external calibrator.
    pub dictionary: String,
    pub squares_x: u32,
    pub squares_y: u32,
    /// Board square edge length in meters.
    pub square_length: f64,
    /// Marker edge length in meters.
    pub marker_length: f64,
    /// Separator between the camera name and the trial name in video
    /// basenames, e.g. `camA-trial1.avi`.
    pub cam_separator: String,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            animal_calibration: false,
            dictionary: "DICT_4X4_50".to_string(),
            squares_x: 5,
            squares_y: 4,
            square_length: 0.04,
            marker_length: 0.03,
            cam_separator: "-".to_string(),
        }
    }
}

/// Directory-layout conventions, all session-relative and overridable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub videos_raw: String,
    pub pose_2d: String,
    pub pose_2d_filter: String,
    pub pose_3d: String,
    pub videos_labeled_2d: String,
    pub videos_labeled_2d_filter: String,
    pub calibration_videos: String,
    pub calibration_results: String,
    pub videos_labeled_3d: String,
    pub videos_combined: String,
    pub angles: String,
    pub summaries: String,
    /// Raw video extension, without the dot.
    pub video_ext: String,
    pub gpus: GpuSet,
    /// Delay between watch-mode passes.
    pub pause_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            videos_raw: "videos-raw".to_string(),
            pose_2d: "pose-2d".to_string(),
            pose_2d_filter: "pose-2d-filtered".to_string(),
            pose_3d: "pose-3d".to_string(),
            videos_labeled_2d: "videos-labeled".to_string(),
            videos_labeled_2d_filter: "videos-labeled-filtered".to_string(),
            calibration_videos: "calibration".to_string(),
            calibration_results: "calibration".to_string(),
            videos_labeled_3d: "videos-3d".to_string(),
            videos_combined: "videos-combined".to_string(),
            angles: "angles".to_string(),
            summaries: "summaries".to_string(),
            video_ext: "avi".to_string(),
            gpus: GpuSet::None,
            pause_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    /// Rolling-median window, in frames. Forced odd at use sites.
    pub medfilt: usize,
    /// Maximum pixel deviation from the rolling median before a point is
    /// treated as a tracking jump.
    pub offset_threshold: f64,
    /// Minimum estimator confidence for a point to be kept.
    pub score_threshold: f64,
    /// Interpolate dropped points with a smooth spline instead of linearly.
    pub spline: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            medfilt: 13,
            offset_threshold: 25.0,
            score_threshold: 0.8,
            spline: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    /// Dot radius in pixels used by the external renderer.
    pub dot_size: u32,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self { dot_size: 7 }
    }
}

/// Pose model location and the names of the external commands, overridable so
/// tests can substitute stubs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory holding the pose estimator's own model config.
    pub model_folder: PathBuf,
    pub pose_cmd: String,
    pub render_cmd: String,
    pub calibrate_cmd: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_folder: PathBuf::from("model"),
            pose_cmd: "pose-estimator".to_string(),
            render_cmd: "pose-renderer".to_string(),
            calibrate_cmd: "pose-calibrator".to_string(),
        }
    }
}

impl Config {
    /// Board geometry in the form the external calibrator expects.
    pub fn board(&self) -> BoardSpec {
        BoardSpec {
            dictionary: self.calibration.dictionary.clone(),
            squares_x: self.calibration.squares_x,
            squares_y: self.calibration.squares_y,
            square_length: self.calibration.square_length,
            marker_length: self.calibration.marker_length,
        }
    }
}

/// Load the configuration, back-filling every missing key with defaults.
///
/// A nonexistent file is not an error: it yields the default tree with
/// `path` set to the current directory. Malformed TOML is fatal.
pub fn load_config(fname: Option<&Path>) -> Result<Config> {
    let fname = fname.unwrap_or_else(|| Path::new("config.toml"));

    let mut config = if fname.exists() {
        let text = fs::read_to_string(fname)
            .with_context(|| format!("failed to read config {}", fname.display()))?;
        toml::from_str::<Config>(&text)
            .with_context(|| format!("malformed config {}", fname.display()))?
    } else {
        Config::default()
    };

    if config.path.as_os_str().is_empty() {
        config.path = match fname.parent() {
            Some(dir) if fname.exists() && !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => env::current_dir().context("failed to resolve current directory")?,
        };
    }
    config.path = full_path(&config.path)?;

    if config.project.is_empty() {
        config.project = config
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    Ok(config)
}

/// Absolute, lexically normalized form of `path`. The path need not exist.
fn full_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .context("failed to resolve current directory")?
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}
