//! Board configuration persistence
//!
//! Engine settings, input selection, the initial chain and voicing
//! overrides, stored as TOML.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use pedal_audio::{PresetEntry, SmoothingTimes, Voicings, DEFAULT_QUEUE_CAPACITY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Frames per processing block
    pub block_size: usize,
    /// Depth of the control and event queues
    pub queue_capacity: usize,
    /// Microphone ring buffer length in seconds
    pub input_buffer_secs: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            block_size: 256,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            input_buffer_secs: 0.1,
        }
    }
}

/// Initial chain input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    Mic,
    Tone,
    Silence,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    pub source: InputKind,
    pub tone_frequency: f32,
    pub tone_level: f32,
    /// Audio file looped when `source = "file"`
    pub file: Option<PathBuf>,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            source: InputKind::Mic,
            tone_frequency: 440.0,
            tone_level: 0.25,
            file: None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub engine: EngineSettings,
    pub smoothing: SmoothingTimes,
    pub input: InputSettings,
    /// Pedals loaded at startup, in signal order
    pub chain: Vec<PresetEntry>,
    pub voicings: Voicings,
}

impl BoardConfig {
    /// Load config from the default location
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("No board config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize()?)?;
        tracing::info!("Wrote board config to {:?}", path);
        Ok(())
    }

    /// Default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pedalboard")
            .join("board.toml")
    }

    /// Directory presets are resolved against when given a bare name
    pub fn preset_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pedalboard")
            .join("presets")
    }

    fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn serialize(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
