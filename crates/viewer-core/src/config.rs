use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::overlay::HighlightStyle;

pub const ENV_SCALE: &str = "SLIPVIEW_SCALE";
pub const ENV_MAX_RENDERS: &str = "SLIPVIEW_MAX_RENDERS";
pub const ENV_PREFETCH_RADIUS: &str = "SLIPVIEW_PREFETCH_RADIUS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Scale a freshly created viewer starts at.
    pub default_scale: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Upper bound on rasterizations in flight at once.
    pub max_concurrent_renders: usize,
    /// Pages on each side of the visible range that are rendered ahead.
    pub prefetch_radius: u32,
    pub page_spacing_px: f64,
    pub highlight: HighlightStyle,
    /// Page background, straight-alpha RGBA.
    pub background: [u8; 4],
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_scale: 1.2,
            min_scale: 0.25,
            max_scale: 8.0,
            max_concurrent_renders: 4,
            prefetch_radius: 1,
            page_spacing_px: 16.0,
            highlight: HighlightStyle::default(),
            background: [255, 255, 255, 255],
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SLIPVIEW_*` environment overrides on top of this config.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_SCALE) {
            self.default_scale = parse_override(ENV_SCALE, &value)?;
        }

        if let Some(value) = lookup(ENV_MAX_RENDERS) {
            self.max_concurrent_renders = parse_override(ENV_MAX_RENDERS, &value)?;
        }

        if let Some(value) = lookup(ENV_PREFETCH_RADIUS) {
            self.prefetch_radius = parse_override(ENV_PREFETCH_RADIUS, &value)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_scale.is_finite() || self.min_scale <= 0.0 {
            return Err(invalid("min_scale", format!("{} is not a positive number", self.min_scale)));
        }

        if !self.max_scale.is_finite() || self.max_scale < self.min_scale {
            return Err(invalid(
                "max_scale",
                format!("{} is below min_scale {}", self.max_scale, self.min_scale),
            ));
        }

        if !(self.min_scale..=self.max_scale).contains(&self.default_scale) {
            return Err(invalid(
                "default_scale",
                format!(
                    "{} is outside [{}, {}]",
                    self.default_scale, self.min_scale, self.max_scale
                ),
            ));
        }

        if self.max_concurrent_renders == 0 {
            return Err(invalid("max_concurrent_renders", "must be at least 1".to_owned()));
        }

        if !self.page_spacing_px.is_finite() || self.page_spacing_px < 0.0 {
            return Err(invalid("page_spacing_px", format!("{} is negative", self.page_spacing_px)));
        }

        if !self.highlight.stroke_width.is_finite() || self.highlight.stroke_width < 0.0 {
            return Err(invalid(
                "highlight.stroke_width",
                format!("{} is negative", self.highlight.stroke_width),
            ));
        }

        Ok(())
    }

    pub fn clamp_scale(&self, scale: f64) -> f64 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

fn parse_override<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| invalid(key, format!("{value:?}: {err}")))
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { field, reason }
}
