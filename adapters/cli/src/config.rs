//! TOML configuration for the command-line adapter.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use glam::Vec3;
use queue_match_core::{Cell, ColorTag, GridConfig};
use queue_match_session::SessionConfig;
use queue_match_system_matching as matching;
use queue_match_system_pathfinding as pathfinding;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Root of the configuration file. Every section may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CliConfig {
    pub(crate) logging: LoggingConfig,
    pub(crate) grid: GridSection,
    pub(crate) queue: QueueSection,
    pub(crate) planner: pathfinding::Config,
    pub(crate) demo: DemoSection,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub(crate) level: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GridSection {
    #[serde(default)]
    pub(crate) origin: [f32; 3],
    #[serde(default = "default_cell_size")]
    pub(crate) cell_size: f32,
    #[serde(default = "default_width")]
    pub(crate) width: u32,
    #[serde(default = "default_height")]
    pub(crate) height: u32,
    /// Cells blocked before the first obstacle refresh, as `[x, z]` pairs.
    #[serde(default)]
    pub(crate) blocked: Vec<[u32; 2]>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueueSection {
    /// Slot anchors as `[x, y, z]` world positions, left to right.
    #[serde(default = "default_anchors")]
    pub(crate) anchors: Vec<[f32; 3]>,
    #[serde(default = "default_settle_delay_ms")]
    pub(crate) settle_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DemoSection {
    #[serde(default = "default_units")]
    pub(crate) units: u32,
    #[serde(default = "default_colors")]
    pub(crate) colors: Vec<ColorTag>,
    #[serde(default = "default_tick_ms")]
    pub(crate) tick_ms: u64,
    /// Frames a removal effect plays before the units disappear.
    #[serde(default = "default_removal_frames")]
    pub(crate) removal_frames: u32,
    #[serde(default = "default_max_frames")]
    pub(crate) max_frames: u32,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_cell_size() -> f32 {
    1.0
}

fn default_width() -> u32 {
    10
}

fn default_height() -> u32 {
    10
}

fn default_anchors() -> Vec<[f32; 3]> {
    SessionConfig::default()
        .anchors()
        .iter()
        .map(|anchor| anchor.to_array())
        .collect()
}

fn default_settle_delay_ms() -> u64 {
    50
}

fn default_units() -> u32 {
    30
}

fn default_colors() -> Vec<ColorTag> {
    ["K", "S", "M", "Y"]
        .into_iter()
        .filter_map(ColorTag::new)
        .collect()
}

fn default_tick_ms() -> u64 {
    16
}

fn default_removal_frames() -> u32 {
    6
}

fn default_max_frames() -> u32 {
    20_000
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for GridSection {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            cell_size: default_cell_size(),
            width: default_width(),
            height: default_height(),
            blocked: Vec::new(),
        }
    }
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            anchors: default_anchors(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl Default for DemoSection {
    fn default() -> Self {
        Self {
            units: default_units(),
            colors: default_colors(),
            tick_ms: default_tick_ms(),
            removal_frames: default_removal_frames(),
            max_frames: default_max_frames(),
        }
    }
}

/// Where the active configuration came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ConfigSource {
    /// No file was requested.
    Defaults,
    /// The requested file does not exist; defaults are in effect.
    Missing(PathBuf),
    /// Loaded from this file.
    File(PathBuf),
}

impl ConfigSource {
    /// Logs the outcome once a subscriber is installed.
    pub(crate) fn log(&self) {
        match self {
            Self::Defaults => debug!("no configuration file given, using defaults"),
            Self::Missing(path) => {
                warn!(path = %path.display(), "configuration file not found, using defaults");
            }
            Self::File(path) => info!(path = %path.display(), "configuration loaded"),
        }
    }
}

impl CliConfig {
    /// Loads the configuration file, falling back to defaults when it is
    /// absent. A file that exists but does not parse is an error.
    pub(crate) fn load(path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let Some(path) = path else {
            return Ok((Self::default(), ConfigSource::Defaults));
        };

        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Missing(path.to_path_buf())));
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    pub(crate) fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the grid and queue sections and builds a session layout.
    pub(crate) fn session_config(&self) -> Result<SessionConfig> {
        let grid = GridConfig::new(
            Vec3::from_array(self.grid.origin),
            self.grid.cell_size,
            self.grid.width,
            self.grid.height,
        )
        .context("invalid [grid] section")?;

        let anchors = self
            .queue
            .anchors
            .iter()
            .copied()
            .map(Vec3::from_array)
            .collect();
        let blocked = self
            .grid
            .blocked
            .iter()
            .map(|[x, z]| Cell::new(*x, *z))
            .collect();

        Ok(SessionConfig::new(grid, anchors)
            .context("invalid [queue] section")?
            .with_planner(self.planner)
            .with_engine(matching::Config::new(Duration::from_millis(
                self.queue.settle_delay_ms,
            )))
            .with_blocked_cells(blocked))
    }
}
