//! Audio engine for the pedalboard - effect chain, DSP primitives, pedals
//!
//! This crate provides the real-time processing pipeline:
//! - DSP: smoothers, LFOs, envelope followers, waveshapers, delay networks, reverb tanks
//! - Effects: pedal models composed from the DSP primitives
//! - Node: uniform wet/dry/bypass wrapper around one pedal
//! - Chain: ordered nodes with click-free add/remove/move/source switching
//! - Engine: command queue between the control thread and the audio thread

mod chain;
mod context;
pub mod dsp;
pub mod effects;
mod engine;
mod error;
mod io;
mod node;
mod preset;

pub use chain::{Edge, EffectChain, Port, MAX_NODES};
pub use context::AudioGraphContext;
pub use dsp::SmoothingTimes;
pub use effects::{EffectKind, EffectProcessor, ParamSpec, Voicings};
pub use engine::{
    AudioCommand, AudioEngine, AudioEvent, BoardSlot, EngineState, Pedalboard,
    DEFAULT_QUEUE_CAPACITY,
};
pub use error::{ErrorClass, PedalError, Result};
pub use io::{
    BufferSource, RecorderTap, RingSource, SignalSink, SignalSource, Silence, ToneSource,
};
pub use node::{EffectNode, NodeId};
pub use preset::{Preset, PresetEntry};
