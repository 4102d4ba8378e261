// Chain configuration
//
// Loaded from JSON, optionally overridden from SCOPECHAIN_* environment
// variables. Defaults match the 16k-sample boards the chain was built for.

use crate::error::{StreamError, StreamResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Samples per line emitted by one acquisition burst
pub const DEFAULT_WIDTH: usize = 16384;

/// Bursts of history kept per channel
pub const DEFAULT_DEPTH: usize = 50;

/// Physical inputs per device
pub const DEFAULT_SELECTORS_PER_SOURCE: usize = 2;

/// Value of ring slots that were never written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FillValue {
    /// Slots read as 0.0 (history assumed pre-warmed)
    #[default]
    Zero,

    /// Slots read as NaN so aggregations can skip them
    Nan,
}

impl FillValue {
    pub fn as_f64(self) -> f64 {
        match self {
            FillValue::Zero => 0.0,
            FillValue::Nan => f64::NAN,
        }
    }
}

impl std::str::FromStr for FillValue {
    type Err = StreamError;

    fn from_str(s: &str) -> StreamResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "zero" | "0" => Ok(FillValue::Zero),
            "nan" => Ok(FillValue::Nan),
            other => Err(StreamError::InvalidConfig(format!(
                "unknown fill value '{}' (expected zero or nan)",
                other
            ))),
        }
    }
}

/// Leading metadata tokens of a protocol line
///
/// Token order is `[sequence] [sample_rate] selector samples...`; the selector
/// is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LineLayout {
    #[serde(default)]
    pub sequence: bool,

    #[serde(default)]
    pub sample_rate: bool,
}

impl LineLayout {
    pub fn metadata_tokens(&self) -> usize {
        1 + usize::from(self.sequence) + usize::from(self.sample_rate)
    }

    /// Total tokens of a valid line carrying `width` samples
    pub fn line_tokens(&self, width: usize) -> usize {
        self.metadata_tokens() + width
    }
}

/// Configuration for the connection set, the decoder and the ring bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Samples per raw vector (W)
    #[serde(default = "default_width")]
    pub width: usize,

    /// History slots per channel (D)
    #[serde(default = "default_depth")]
    pub depth: usize,

    #[serde(default = "default_selectors")]
    pub selectors_per_source: usize,

    #[serde(default)]
    pub layout: LineLayout,

    #[serde(default)]
    pub fill: FillValue,

    /// Subtract each vector's mean before storing it
    #[serde(default)]
    pub mean_removal: bool,

    /// Expected transform output width; checked against the transform
    #[serde(default)]
    pub transformed_width: Option<usize>,

    /// Complete lines buffered per source between reads
    #[serde(default = "default_queue_capacity")]
    pub line_queue_capacity: usize,

    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_width() -> usize {
    DEFAULT_WIDTH
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

fn default_selectors() -> usize {
    DEFAULT_SELECTORS_PER_SOURCE
}

fn default_queue_capacity() -> usize {
    64
}

fn default_tick_ms() -> u64 {
    10
}

fn default_poll_timeout_ms() -> u64 {
    1
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            depth: DEFAULT_DEPTH,
            selectors_per_source: DEFAULT_SELECTORS_PER_SOURCE,
            layout: LineLayout::default(),
            fill: FillValue::Zero,
            mean_removal: false,
            transformed_width: None,
            line_queue_capacity: default_queue_capacity(),
            tick_ms: default_tick_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl ChainConfig {
    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> StreamResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StreamError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: ChainConfig = serde_json::from_str(&content).map_err(|e| {
            StreamError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply SCOPECHAIN_* environment overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> StreamResult<Self> {
        if let Some(width) = env_number("SCOPECHAIN_WIDTH")? {
            self.width = width;
        }
        if let Some(depth) = env_number("SCOPECHAIN_DEPTH")? {
            self.depth = depth;
        }
        if let Some(selectors) = env_number("SCOPECHAIN_SELECTORS")? {
            self.selectors_per_source = selectors;
        }
        if let Some(tick) = env_number("SCOPECHAIN_TICK_MS")? {
            self.tick_ms = tick as u64;
        }
        if let Ok(fill) = env::var("SCOPECHAIN_FILL") {
            self.fill = fill.parse()?;
        }
        if let Ok(flag) = env::var("SCOPECHAIN_MEAN_REMOVAL") {
            self.mean_removal = flag.to_lowercase() == "true" || flag == "1";
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if self.width == 0 {
            return Err(StreamError::InvalidConfig("width must be positive".into()));
        }
        if self.depth == 0 {
            return Err(StreamError::InvalidConfig("depth must be positive".into()));
        }
        if self.selectors_per_source == 0 || self.selectors_per_source > u8::MAX as usize {
            return Err(StreamError::InvalidConfig(format!(
                "selectors_per_source must be in 1..=255, got {}",
                self.selectors_per_source
            )));
        }
        if self.line_queue_capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "line_queue_capacity must be positive".into(),
            ));
        }
        if self.tick_ms == 0 {
            return Err(StreamError::InvalidConfig("tick_ms must be positive".into()));
        }
        if self.transformed_width == Some(0) {
            return Err(StreamError::InvalidConfig(
                "transformed_width must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn env_number(key: &str) -> StreamResult<Option<usize>> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StreamError::InvalidConfig(format!("{} is not a number: {}", key, value))),
        Err(_) => Ok(None),
    }
}
