use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crop::DEFAULT_MIN_CROP_SIZE;
use crate::geometry::{Color, RgbaColor, Size};
use crate::history::coalesce::{DEFAULT_FRAME_INTERVAL, DEFAULT_QUIET_PERIOD};
use crate::history::{DEFAULT_HISTORY_CAPACITY, MAX_HISTORY_CAPACITY};
use crate::mapping::DEFAULT_VIEWPORT_BUDGET;
use crate::mask::{MaskMode, DEFAULT_MASK_OPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigPathError {
    MissingHomeDirectory,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse crop config")]
    Parse(#[from] serde_json::Error),
}

const APP_DIR: &str = "cropdeck";
const APP_CONFIG_FILE: &str = "crop.json";

const DEFAULT_INITIAL_BOX_FRACTION: f64 = 0.8;
const DEFAULT_QUIET_PERIOD_MS: u64 = DEFAULT_QUIET_PERIOD.as_millis() as u64;
const DEFAULT_FRAME_INTERVAL_MS: u64 = DEFAULT_FRAME_INTERVAL.as_millis() as u64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinCropSize {
    pub width: f64,
    pub height: f64,
}

impl Default for MinCropSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_MIN_CROP_SIZE.width,
            height: DEFAULT_MIN_CROP_SIZE.height,
        }
    }
}

impl MinCropSize {
    pub fn as_size(self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    pub mode: MaskMode,
    pub color: Color,
    pub opacity: f64,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            mode: MaskMode::default(),
            color: Color::BLACK,
            opacity: DEFAULT_MASK_OPACITY,
        }
    }
}

impl MaskConfig {
    pub fn rgba(&self) -> RgbaColor {
        self.color.with_opacity(self.opacity)
    }
}

/// Cosmetic crop-box styling. Only `handle_size` feeds back into geometry, as the hit radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropBoxStyle {
    pub border_width: f64,
    pub border_color: Color,
    pub border_dash: Vec<f64>,
    pub handle_size: f64,
    pub handle_color: Color,
}

impl Default for CropBoxStyle {
    fn default() -> Self {
        Self {
            border_width: 2.0,
            border_color: Color::WHITE,
            border_dash: vec![6.0, 4.0],
            handle_size: 12.0,
            handle_color: Color::WHITE,
        }
    }
}

/// Settings for a crop session, read from `crop.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Minimum crop size in native pixels.
    pub min_crop_size: MinCropSize,
    pub aspect_ratio: Option<f64>,
    pub history_capacity: usize,
    pub history_quiet_period_ms: u64,
    pub frame_interval_ms: u64,
    pub viewport_budget: f64,
    pub initial_box_fraction: f64,
    /// Per-side cap on the initial box, in native pixels.
    pub initial_box_cap: Option<f64>,
    pub mask: MaskConfig,
    pub style: CropBoxStyle,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            min_crop_size: MinCropSize::default(),
            aspect_ratio: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_quiet_period_ms: DEFAULT_QUIET_PERIOD_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            viewport_budget: DEFAULT_VIEWPORT_BUDGET,
            initial_box_fraction: DEFAULT_INITIAL_BOX_FRACTION,
            initial_box_cap: None,
            mask: MaskConfig::default(),
            style: CropBoxStyle::default(),
        }
    }
}

impl CropConfig {
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)?;
        Ok(config.normalized())
    }

    /// Replaces out-of-range values with usable ones.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        let non_negative = |value: f64, fallback: f64| {
            if value.is_finite() && value >= 0.0 {
                value
            } else {
                fallback
            }
        };
        self.min_crop_size.width =
            non_negative(self.min_crop_size.width, defaults.min_crop_size.width);
        self.min_crop_size.height =
            non_negative(self.min_crop_size.height, defaults.min_crop_size.height);
        self.aspect_ratio = self.aspect_ratio.filter(|ratio| ratio.is_finite() && *ratio > 0.0);
        self.history_capacity = self.history_capacity.clamp(1, MAX_HISTORY_CAPACITY);
        if !(self.viewport_budget.is_finite() && self.viewport_budget > 0.0) {
            self.viewport_budget = defaults.viewport_budget;
        }
        self.viewport_budget = self.viewport_budget.min(1.0);
        if !(self.initial_box_fraction.is_finite() && self.initial_box_fraction > 0.0) {
            self.initial_box_fraction = defaults.initial_box_fraction;
        }
        self.initial_box_fraction = self.initial_box_fraction.min(1.0);
        self.initial_box_cap = self.initial_box_cap.filter(|cap| cap.is_finite() && *cap > 0.0);
        self.mask.opacity = non_negative(self.mask.opacity, defaults.mask.opacity).min(1.0);
        self.style.handle_size = non_negative(self.style.handle_size, defaults.style.handle_size);
        self
    }

    pub fn history_quiet_period(&self) -> Duration {
        Duration::from_millis(self.history_quiet_period_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

pub fn load_crop_config() -> CropConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_crop_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_crop_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> CropConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return CropConfig::default(),
    };
    if !path.exists() {
        return CropConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => CropConfig::from_json_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse crop.json; using defaults");
            CropConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read crop.json; using defaults");
            CropConfig::default()
        }
    }
}

pub(crate) fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = config_root(xdg_config_home, home)?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn config_root(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(".config"))
}
