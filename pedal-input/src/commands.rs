//! Command definitions

use std::fmt;
use std::path::PathBuf;

use pedal_audio::{EffectKind, NodeId};

/// Where the chain input comes from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// Default input device
    Mic,
    /// Calibration sine
    Tone,
    Silence,
    /// Decoded audio file, looped
    File(PathBuf),
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Mic => write!(f, "mic"),
            SourceKind::Tone => write!(f, "tone"),
            SourceKind::Silence => write!(f, "silence"),
            SourceKind::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// Commands that can be dispatched from the control prompt
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Board structure
    Add(EffectKind),
    Remove(NodeId),
    Move { from: usize, to: usize },
    Source(SourceKind),

    // Knobs
    Set {
        id: NodeId,
        param: String,
        value: f32,
    },
    Mix { id: NodeId, mix: f32 },
    Bypass(NodeId),

    // Presets
    Save(PathBuf),
    Load(PathBuf),

    // Application
    List,
    Help,
    Quit,
}
