use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::geometry::{Rect, Size};
use crate::placement::GridSpec;
use crate::scatter::{ScatterParams, SCATTER_MAX_ATTEMPTS_DEFAULT};
use crate::scheduler::SchedulerSettings;

pub const VIEWPORT_WIDTH_DEFAULT: f32 = 800.0;
pub const VIEWPORT_HEIGHT_DEFAULT: f32 = 600.0;
pub const PIECE_COUNT_DEFAULT: usize = 50;
pub const DURATION_MS_DEFAULT: u32 = 1200;
pub const START_DELAY_MS_DEFAULT: u32 = 50;
pub const COMMIT_EVERY_DEFAULT: u32 = 3;
pub const SCATTER_PIECE_SIZE_DEFAULT: f32 = 48.0;
pub const SCATTER_PADDING_DEFAULT: f32 = 6.0;
pub const SCATTER_MARGIN_RATIO_DEFAULT: f32 = 0.05;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Where reconstruct targets come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSource {
    /// Grid math over each piece's stable index.
    Grid,
    /// Placement reported by the reconstruction service.
    #[default]
    Service,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScatterConfig {
    #[serde(default = "default_scatter_piece_size")]
    pub piece_size: f32,
    #[serde(default = "default_scatter_padding")]
    pub padding: f32,
    #[serde(default = "default_scatter_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_scatter_margin_ratio")]
    pub margin_ratio: f32,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            piece_size: SCATTER_PIECE_SIZE_DEFAULT,
            padding: SCATTER_PADDING_DEFAULT,
            max_attempts: SCATTER_MAX_ATTEMPTS_DEFAULT,
            margin_ratio: SCATTER_MARGIN_RATIO_DEFAULT,
        }
    }
}

fn default_scatter_piece_size() -> f32 {
    SCATTER_PIECE_SIZE_DEFAULT
}

fn default_scatter_padding() -> f32 {
    SCATTER_PADDING_DEFAULT
}

fn default_scatter_max_attempts() -> u32 {
    SCATTER_MAX_ATTEMPTS_DEFAULT
}

fn default_scatter_margin_ratio() -> f32 {
    SCATTER_MARGIN_RATIO_DEFAULT
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_viewport")]
    pub viewport: Size,
    #[serde(default = "default_piece_count")]
    pub piece_count: usize,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u32,
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u32,
    #[serde(default = "default_commit_every")]
    pub commit_every: u32,
    #[serde(default)]
    pub scatter: ScatterConfig,
    #[serde(default)]
    pub target_source: TargetSource,
    #[serde(default)]
    pub grid: Option<GridSpec>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport: default_viewport(),
            piece_count: PIECE_COUNT_DEFAULT,
            duration_ms: DURATION_MS_DEFAULT,
            start_delay_ms: START_DELAY_MS_DEFAULT,
            commit_every: COMMIT_EVERY_DEFAULT,
            scatter: ScatterConfig::default(),
            target_source: TargetSource::default(),
            grid: None,
            seed: None,
        }
    }
}

fn default_viewport() -> Size {
    Size::new(VIEWPORT_WIDTH_DEFAULT, VIEWPORT_HEIGHT_DEFAULT)
}

fn default_piece_count() -> usize {
    PIECE_COUNT_DEFAULT
}

fn default_duration_ms() -> u32 {
    DURATION_MS_DEFAULT
}

fn default_start_delay_ms() -> u32 {
    START_DELAY_MS_DEFAULT
}

fn default_commit_every() -> u32 {
    COMMIT_EVERY_DEFAULT
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.viewport.is_positive() {
            return Err(invalid(
                "viewport",
                format!(
                    "must be positive, got {}x{}",
                    self.viewport.width, self.viewport.height
                ),
            ));
        }
        if self.piece_count == 0 {
            return Err(invalid("piece_count", "must be at least 1"));
        }
        if self.duration_ms == 0 {
            return Err(invalid("duration_ms", "must be at least 1"));
        }
        if self.commit_every == 0 {
            return Err(invalid("commit_every", "must be at least 1"));
        }
        let scatter = &self.scatter;
        if !scatter.piece_size.is_finite() || scatter.piece_size <= 0.0 {
            return Err(invalid(
                "scatter.piece_size",
                format!("must be positive, got {}", scatter.piece_size),
            ));
        }
        if !scatter.padding.is_finite() || scatter.padding < 0.0 {
            return Err(invalid(
                "scatter.padding",
                format!("must be non-negative, got {}", scatter.padding),
            ));
        }
        if scatter.max_attempts == 0 {
            return Err(invalid("scatter.max_attempts", "must be at least 1"));
        }
        if !scatter.margin_ratio.is_finite() || scatter.margin_ratio < 0.0 {
            return Err(invalid(
                "scatter.margin_ratio",
                format!("must be non-negative, got {}", scatter.margin_ratio),
            ));
        }
        if let Some(grid) = self.grid {
            if grid.count() != self.piece_count {
                return Err(invalid(
                    "grid",
                    format!(
                        "{}x{} grid holds {} pieces, piece_count is {}",
                        grid.cols,
                        grid.rows,
                        grid.count(),
                        self.piece_count
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            duration_ms: self.duration_ms,
            start_delay_ms: self.start_delay_ms,
            commit_every: self.commit_every,
        }
    }

    /// Scatter region in viewport space. The service strategy spreads pieces
    /// past the viewport edge by `margin_ratio` of each viewport dimension.
    pub fn scatter_region(&self) -> Rect {
        let viewport = Rect::from_size(self.viewport);
        match self.target_source {
            TargetSource::Grid => viewport,
            TargetSource::Service => viewport.expanded(
                self.viewport.width * self.scatter.margin_ratio,
                self.viewport.height * self.scatter.margin_ratio,
            ),
        }
    }

    pub fn scatter_params(&self) -> ScatterParams {
        ScatterParams {
            region: self.scatter_region(),
            piece_size: self.scatter.piece_size,
            padding: self.scatter.padding,
            max_attempts: self.scatter.max_attempts,
        }
    }

    pub fn scatter_size(&self) -> Size {
        Size::new(self.scatter.piece_size, self.scatter.piece_size)
    }

    /// Explicit grid if configured, otherwise one chosen for `count` pieces
    /// of an image of `image` size.
    pub fn grid_for(&self, count: usize, image: Size) -> Option<GridSpec> {
        match self.grid {
            Some(grid) if grid.count() == count => Some(grid),
            _ => GridSpec::for_count(count, image),
        }
    }
}
