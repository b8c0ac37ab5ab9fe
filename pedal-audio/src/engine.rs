//! Command queue between the control thread and the audio thread
//!
//! The control side ([`Pedalboard`]) validates every request against a
//! mirror of the board, builds nodes and sources itself and sends them over a
//! bounded channel. The audio side ([`EngineState`]) drains the channel with
//! `try_recv` at block boundaries and never blocks. Anything it removes is
//! sent back in an [`AudioEvent`] so deallocation happens on the control
//! thread.
//!
//! Structural changes are applied inside a short output fade so the wiring
//! swap never lands on a non-zero sample.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::chain::{EffectChain, MAX_NODES};
use crate::context::AudioGraphContext;
use crate::dsp::SmoothingTimes;
use crate::effects::{EffectKind, Voicings};
use crate::error::{PedalError, Result};
use crate::io::{SignalSink, SignalSource};
use crate::node::{EffectNode, NodeId};
use crate::preset::{Preset, PresetEntry};

/// Default depth of the command and event queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Attempts to deliver `Shutdown` to a full command queue
const SHUTDOWN_RETRIES: usize = 10;
const SHUTDOWN_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Commands sent to the audio thread
pub enum AudioCommand {
    // Structure
    AddEffect(Box<EffectNode>),
    RemoveEffect(NodeId),
    MoveEffect { from: usize, to: usize },
    SetSource(Box<dyn SignalSource>),

    // Per-node control
    SetParameter {
        id: NodeId,
        name: &'static str,
        value: f32,
    },
    SetMix { id: NodeId, mix: f32 },
    ToggleBypass(NodeId),

    // Output
    SetRecorder(Option<Box<dyn SignalSink>>),

    // System
    Shutdown,
}

impl AudioCommand {
    /// Whether the command waits for the output to fade to silence
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            AudioCommand::AddEffect(_)
                | AudioCommand::RemoveEffect(_)
                | AudioCommand::MoveEffect { .. }
                | AudioCommand::SetSource(_)
                | AudioCommand::Shutdown
        )
    }
}

impl fmt::Debug for AudioCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioCommand::AddEffect(node) => write!(f, "AddEffect({:?})", node),
            AudioCommand::RemoveEffect(id) => write!(f, "RemoveEffect({})", id),
            AudioCommand::MoveEffect { from, to } => write!(f, "MoveEffect({} -> {})", from, to),
            AudioCommand::SetSource(src) => write!(f, "SetSource({})", src.label()),
            AudioCommand::SetParameter { id, name, value } => {
                write!(f, "SetParameter({}, {}, {})", id, name, value)
            }
            AudioCommand::SetMix { id, mix } => write!(f, "SetMix({}, {})", id, mix),
            AudioCommand::ToggleBypass(id) => write!(f, "ToggleBypass({})", id),
            AudioCommand::SetRecorder(sink) => write!(f, "SetRecorder({})", sink.is_some()),
            AudioCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Events sent back from the audio thread
pub enum AudioEvent {
    /// A removed node, already torn down
    RetiredNode(Box<EffectNode>),
    /// The source replaced by `SetSource`
    RetiredSource(Box<dyn SignalSource>),
    RetiredSink(Box<dyn SignalSink>),
    /// A command that could not be applied; the board is unchanged
    Rejected(PedalError),
    BypassChanged { id: NodeId, bypassed: bool },
    /// The engine processed `Shutdown` and now renders silence
    Stopped,
}

impl fmt::Debug for AudioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioEvent::RetiredNode(node) => write!(f, "RetiredNode({:?})", node),
            AudioEvent::RetiredSource(src) => write!(f, "RetiredSource({})", src.label()),
            AudioEvent::RetiredSink(_) => write!(f, "RetiredSink"),
            AudioEvent::Rejected(err) => write!(f, "Rejected({})", err),
            AudioEvent::BypassChanged { id, bypassed } => {
                write!(f, "BypassChanged({}, {})", id, bypassed)
            }
            AudioEvent::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Linear output fade wrapped around structural changes
#[derive(Debug)]
struct Declick {
    gain: f32,
    step: f32,
    phase: FadePhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadePhase {
    Idle,
    Out,
    In,
}

impl Declick {
    fn new(seconds: f32, ctx: &AudioGraphContext) -> Self {
        let samples = ctx.seconds_to_samples(seconds).max(1.0);
        Self {
            gain: 1.0,
            step: 1.0 / samples,
            phase: FadePhase::Idle,
        }
    }

    fn is_silent(&self) -> bool {
        self.phase == FadePhase::Out && self.gain <= 0.0
    }

    fn apply(&mut self, samples: &mut [f32]) {
        if self.phase == FadePhase::Idle {
            return;
        }
        for s in samples.iter_mut() {
            match self.phase {
                FadePhase::Out => self.gain = (self.gain - self.step).max(0.0),
                FadePhase::In => {
                    self.gain = (self.gain + self.step).min(1.0);
                    if self.gain >= 1.0 {
                        self.phase = FadePhase::Idle;
                    }
                }
                FadePhase::Idle => {}
            }
            *s *= self.gain;
        }
    }
}

/// Audio engine state (owned by the audio callback)
pub struct EngineState {
    ctx: AudioGraphContext,
    chain: EffectChain,
    recorder: Option<Box<dyn SignalSink>>,
    command_rx: Receiver<AudioCommand>,
    event_tx: Sender<AudioEvent>,
    /// Commands waiting for the fade-out to finish
    pending: VecDeque<AudioCommand>,
    declick: Declick,
    running: bool,
}

impl EngineState {
    pub fn new(
        ctx: AudioGraphContext,
        times: SmoothingTimes,
        command_rx: Receiver<AudioCommand>,
        event_tx: Sender<AudioEvent>,
    ) -> Self {
        let capacity = command_rx.capacity().unwrap_or(DEFAULT_QUEUE_CAPACITY);
        Self {
            chain: EffectChain::new(&ctx),
            recorder: None,
            command_rx,
            event_tx,
            pending: VecDeque::with_capacity(capacity),
            declick: Declick::new(times.fast, &ctx),
            running: true,
            ctx,
        }
    }

    pub fn context(&self) -> &AudioGraphContext {
        &self.ctx
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Attach a recorder tap directly (before the stream starts)
    pub fn set_recorder(&mut self, sink: Box<dyn SignalSink>) {
        self.recorder = Some(sink);
    }

    /// Render one buffer of mono output
    pub fn process(&mut self, output: &mut [f32]) {
        self.drain_commands();

        if !self.running {
            output.fill(0.0);
            return;
        }

        if self.declick.is_silent() {
            self.flush_pending();
            if !self.running {
                output.fill(0.0);
                return;
            }
            self.declick.phase = FadePhase::In;
        }

        self.chain.process(&self.ctx, output);
        self.declick.apply(output);

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.write(output);
        }
        self.ctx.advance(output.len());
    }

    fn drain_commands(&mut self) {
        // A disconnected control side just leaves the current board running
        while let Ok(cmd) = self.command_rx.try_recv() {
            self.handle_command(cmd);
        }
    }

    /// Process a command
    ///
    /// Structural commands wait for the fade-out; anything queued behind one
    /// waits too so commands always apply in the order they were sent.
    pub fn handle_command(&mut self, cmd: AudioCommand) {
        if !self.running {
            self.retire(cmd);
            return;
        }

        let structural = cmd.is_structural();
        if !structural && self.pending.is_empty() {
            self.apply(cmd);
            return;
        }
        if self.pending.len() < self.pending.capacity() {
            self.pending.push_back(cmd);
            if structural {
                self.declick.phase = FadePhase::Out;
            }
        } else {
            // Backlog full: apply in order without waiting for the fade
            self.flush_pending();
            self.apply(cmd);
        }
    }

    fn flush_pending(&mut self) {
        while let Some(cmd) = self.pending.pop_front() {
            self.apply(cmd);
        }
    }

    fn apply(&mut self, cmd: AudioCommand) {
        if !self.running {
            self.retire(cmd);
            return;
        }
        let ctx = self.ctx;
        let result = match cmd {
            AudioCommand::AddEffect(node) => self.chain.add_effect(node),
            AudioCommand::RemoveEffect(id) => self
                .chain
                .remove_effect(id)
                .map(|node| self.emit(AudioEvent::RetiredNode(node))),
            AudioCommand::MoveEffect { from, to } => self.chain.move_effect(from, to),
            AudioCommand::SetSource(source) => {
                let previous = self.chain.set_source(source);
                self.emit(AudioEvent::RetiredSource(previous));
                Ok(())
            }
            AudioCommand::SetParameter { id, name, value } => self
                .chain
                .update_parameter(id, name, value, &ctx)
                .map(|_| ()),
            AudioCommand::SetMix { id, mix } => self.chain.set_mix(id, mix, &ctx),
            AudioCommand::ToggleBypass(id) => self
                .chain
                .toggle_bypass(id, &ctx)
                .map(|bypassed| self.emit(AudioEvent::BypassChanged { id, bypassed })),
            AudioCommand::SetRecorder(sink) => {
                if let Some(old) = std::mem::replace(&mut self.recorder, sink) {
                    self.emit(AudioEvent::RetiredSink(old));
                }
                Ok(())
            }
            AudioCommand::Shutdown => {
                self.chain.disconnect_all();
                self.running = false;
                self.emit(AudioEvent::Stopped);
                Ok(())
            }
        };
        if let Err(err) = result {
            self.emit(AudioEvent::Rejected(err));
        }
    }

    /// Hand back whatever a command carries once the engine has stopped
    fn retire(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::AddEffect(mut node) => {
                node.disconnect();
                self.emit(AudioEvent::RetiredNode(node));
            }
            AudioCommand::SetSource(source) => self.emit(AudioEvent::RetiredSource(source)),
            AudioCommand::SetRecorder(Some(sink)) => self.emit(AudioEvent::RetiredSink(sink)),
            _ => {}
        }
    }

    fn emit(&self, event: AudioEvent) {
        // A full event queue drops the event here rather than blocking
        let _ = self.event_tx.try_send(event);
    }
}

/// Handle to communicate with the audio engine
pub struct AudioEngine {
    /// Send commands to audio thread
    pub command_tx: Sender<AudioCommand>,
    /// Receive events from audio thread
    pub event_rx: Receiver<AudioEvent>,
    shutdown: Arc<AtomicBool>,
}

impl AudioEngine {
    /// Create channels for engine communication
    pub fn create_channels(
        capacity: usize,
    ) -> (
        Sender<AudioCommand>,
        Receiver<AudioCommand>,
        Sender<AudioEvent>,
        Receiver<AudioEvent>,
    ) {
        let capacity = capacity.max(1);
        let (cmd_tx, cmd_rx) = bounded(capacity);
        let (evt_tx, evt_rx) = bounded(capacity);
        (cmd_tx, cmd_rx, evt_tx, evt_rx)
    }

    pub fn new(command_tx: Sender<AudioCommand>, event_rx: Receiver<AudioEvent>) -> Self {
        Self {
            command_tx,
            event_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a command without blocking
    pub fn send(&self, cmd: AudioCommand) -> Result<()> {
        match self.command_tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PedalError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(PedalError::Disconnected),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Request shutdown; the engine fades out before going silent
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        self.send(AudioCommand::Shutdown)
    }

    /// Flag shared with threads that should stop alongside the engine
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }
}

/// Control-side mirror of one node
#[derive(Debug, Clone)]
pub struct BoardSlot {
    pub id: NodeId,
    pub name: String,
    pub entry: PresetEntry,
}

/// Control handle for a running board
///
/// Every request is checked against the mirror first, so the audio thread
/// only sees commands that will apply.
pub struct Pedalboard {
    engine: AudioEngine,
    ctx: AudioGraphContext,
    voicings: Voicings,
    times: SmoothingTimes,
    slots: Vec<BoardSlot>,
    next_id: u32,
    source_label: &'static str,
}

impl Pedalboard {
    /// Build a control handle and the audio state it drives
    pub fn create(
        ctx: AudioGraphContext,
        voicings: Voicings,
        times: SmoothingTimes,
        queue_capacity: usize,
    ) -> (Self, EngineState) {
        let (cmd_tx, cmd_rx, evt_tx, evt_rx) = AudioEngine::create_channels(queue_capacity);
        let state = EngineState::new(ctx, times, cmd_rx, evt_tx);
        let board = Self::new(AudioEngine::new(cmd_tx, evt_rx), ctx, voicings, times);
        (board, state)
    }

    pub fn new(
        engine: AudioEngine,
        ctx: AudioGraphContext,
        voicings: Voicings,
        times: SmoothingTimes,
    ) -> Self {
        Self {
            engine,
            ctx,
            voicings,
            times,
            slots: Vec::new(),
            next_id: 1,
            source_label: "silence",
        }
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn slots(&self) -> &[BoardSlot] {
        &self.slots
    }

    pub fn source_label(&self) -> &'static str {
        self.source_label
    }

    pub fn voicings(&self) -> &Voicings {
        &self.voicings
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut BoardSlot> {
        match self.slots.iter_mut().find(|s| s.id == id) {
            Some(slot) => Ok(slot),
            None => {
                tracing::warn!("No node with id {}", id);
                Err(PedalError::UnknownNode(id))
            }
        }
    }

    /// Append a pedal with default knobs
    pub fn add_effect(&mut self, kind: EffectKind) -> Result<NodeId> {
        self.add_entry(&PresetEntry::new(kind))
    }

    /// Append a pedal with the settings of a preset entry
    pub fn add_entry(&mut self, entry: &PresetEntry) -> Result<NodeId> {
        if self.slots.len() >= MAX_NODES {
            return Err(PedalError::configuration(
                "effects",
                self.slots.len() as f32,
                "pedalboard is full",
            ));
        }
        let node = entry.build(NodeId(self.next_id), &self.voicings, self.times, &self.ctx)?;
        self.push_node(node)
    }

    fn push_node(&mut self, node: EffectNode) -> Result<NodeId> {
        let id = node.id();
        let slot = BoardSlot {
            id,
            name: node.name().to_string(),
            entry: PresetEntry::from_node(&node),
        };
        let kind = node.kind();
        self.engine.send(AudioCommand::AddEffect(Box::new(node)))?;
        self.next_id = self.next_id.max(id.0) + 1;
        tracing::info!("Added {} as node {}", kind, id);
        self.slots.push(slot);
        Ok(id)
    }

    pub fn remove_effect(&mut self, id: NodeId) -> Result<()> {
        self.slot_mut(id)?;
        self.engine.send(AudioCommand::RemoveEffect(id))?;
        self.slots.retain(|s| s.id != id);
        tracing::info!("Removed node {}", id);
        Ok(())
    }

    /// Move the pedal at position `from` to position `to`
    pub fn move_effect(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.slots.len();
        if from >= len || to >= len {
            tracing::warn!("Move {} -> {} outside a board of {}", from, to, len);
            return Err(PedalError::InvalidMove { from, to, len });
        }
        self.engine.send(AudioCommand::MoveEffect { from, to })?;
        let slot = self.slots.remove(from);
        self.slots.insert(to, slot);
        Ok(())
    }

    pub fn set_source(&mut self, source: Box<dyn SignalSource>) -> Result<()> {
        let label = source.label();
        self.engine.send(AudioCommand::SetSource(source))?;
        tracing::info!("Source switched to {}", label);
        self.source_label = label;
        Ok(())
    }

    /// Change one knob; returns false for names the pedal does not have
    pub fn update_parameter(&mut self, id: NodeId, name: &str, value: f32) -> Result<bool> {
        let slot = self.slot_mut(id)?;
        let kind = slot.entry.effect_type;
        if name == "mix" {
            self.set_mix(id, value)?;
            return Ok(true);
        }
        let Some(spec) = kind.param(name) else {
            tracing::debug!("{} has no parameter '{}'", kind, name);
            return Ok(false);
        };
        let value = spec.clamp(value);
        self.engine.send(AudioCommand::SetParameter {
            id,
            name: spec.name,
            value,
        })?;

        let slot = self.slot_mut(id)?;
        match slot.entry.params.iter_mut().find(|(n, _)| n == spec.name) {
            Some(entry) => entry.1 = value,
            None => slot.entry.params.push((spec.name.to_string(), value)),
        }
        Ok(true)
    }

    pub fn set_mix(&mut self, id: NodeId, mix: f32) -> Result<()> {
        self.slot_mut(id)?;
        let mix = if mix.is_nan() { 1.0 } else { mix.clamp(0.0, 1.0) };
        self.engine.send(AudioCommand::SetMix { id, mix })?;
        self.slot_mut(id)?.entry.mix = Some(mix);
        Ok(())
    }

    /// Returns the new bypass state
    pub fn toggle_bypass(&mut self, id: NodeId) -> Result<bool> {
        self.slot_mut(id)?;
        self.engine.send(AudioCommand::ToggleBypass(id))?;
        let slot = self.slot_mut(id)?;
        slot.entry.bypassed = !slot.entry.bypassed;
        Ok(slot.entry.bypassed)
    }

    pub fn set_recorder(&mut self, sink: Option<Box<dyn SignalSink>>) -> Result<()> {
        self.engine.send(AudioCommand::SetRecorder(sink))
    }

    /// Replace the whole board with a preset
    ///
    /// Every node is built before anything is sent, so a bad preset leaves
    /// the current board untouched.
    pub fn load_preset(&mut self, preset: &Preset) -> Result<()> {
        if preset.effects.len() > MAX_NODES {
            return Err(PedalError::configuration(
                "effects",
                preset.effects.len() as f32,
                "preset has more pedals than the board holds",
            ));
        }
        let mut nodes = Vec::with_capacity(preset.effects.len());
        for (offset, entry) in preset.effects.iter().enumerate() {
            let id = NodeId(self.next_id + offset as u32);
            nodes.push(entry.build(id, &self.voicings, self.times, &self.ctx)?);
        }

        let ids: Vec<NodeId> = self.slots.iter().map(|s| s.id).collect();
        for id in ids {
            self.remove_effect(id)?;
        }
        for node in nodes {
            self.push_node(node)?;
        }
        tracing::info!("Loaded preset '{}' ({} effects)", preset.name, self.slots.len());
        Ok(())
    }

    /// Snapshot of the board as a preset
    pub fn preset(&self, name: impl Into<String>) -> Preset {
        Preset {
            name: name.into(),
            effects: self.slots.iter().map(|s| s.entry.clone()).collect(),
        }
    }

    /// Handle everything the audio thread sent back; returns the event count
    ///
    /// Retired nodes and sources are dropped here, off the audio thread.
    pub fn drain_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.engine.event_rx.try_recv() {
            count += 1;
            match event {
                AudioEvent::RetiredNode(node) => {
                    tracing::debug!("Node {} retired", node.id());
                }
                AudioEvent::RetiredSource(source) => {
                    tracing::debug!("Source {} retired", source.label());
                }
                AudioEvent::RetiredSink(_) => tracing::debug!("Recorder detached"),
                AudioEvent::Rejected(err) => {
                    tracing::warn!("Audio thread rejected a command: {}", err);
                }
                AudioEvent::BypassChanged { id, bypassed } => {
                    tracing::debug!("Node {} bypass {}", id, bypassed);
                }
                AudioEvent::Stopped => tracing::info!("Audio engine stopped"),
            }
        }
        count
    }

    /// Stop the engine
    ///
    /// A full command queue is retried for a short while, collecting events
    /// in between.
    pub fn shutdown(&mut self) -> Result<()> {
        for _ in 0..SHUTDOWN_RETRIES {
            match self.engine.shutdown() {
                Err(PedalError::QueueFull) => {
                    self.drain_events();
                    thread::sleep(SHUTDOWN_RETRY_INTERVAL);
                }
                Err(err) => {
                    tracing::warn!("Shutdown not delivered: {}", err);
                    return Err(err);
                }
                Ok(()) => return Ok(()),
            }
        }
        tracing::warn!("Shutdown not delivered: command queue stayed full");
        Err(PedalError::QueueFull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{RecorderTap, ToneSource};
    use ringbuf::traits::Observer;

    fn board() -> (Pedalboard, EngineState) {
        Pedalboard::create(
            AudioGraphContext::new(48000, 128),
            Voicings::default(),
            SmoothingTimes::default(),
            64,
        )
    }

    fn run(state: &mut EngineState, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        for chunk in out.chunks_mut(128) {
            state.process(chunk);
        }
        out
    }

    #[test]
    fn test_commands_apply_at_block_boundary() {
        let (mut board, mut state) = board();
        let a = board.add_effect(EffectKind::Overdrive).unwrap();
        let b = board.add_effect(EffectKind::Reverb).unwrap();
        assert!(state.chain().is_empty());

        run(&mut state, 128 * 8);
        assert_eq!(state.chain().order().collect::<Vec<_>>(), vec![a, b]);

        board.move_effect(1, 0).unwrap();
        run(&mut state, 128 * 8);
        assert_eq!(state.chain().order().collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(state.chain().edges().len(), 3);
    }

    #[test]
    fn test_parameters_resolve_and_clamp() {
        let (mut board, mut state) = board();
        let id = board.add_effect(EffectKind::Delay).unwrap();
        assert!(board.update_parameter(id, "time", 5000.0).unwrap());
        assert!(!board.update_parameter(id, "wobble", 1.0).unwrap());
        assert!(board.update_parameter(id, "mix", 0.7).unwrap());
        run(&mut state, 128 * 8);

        let node = state.chain().node(id).unwrap();
        assert_eq!(node.param("time"), Some(2000.0));
        assert_eq!(node.mix(), 0.7);
        assert_eq!(board.preset("p").effects[0].params[0].1, 2000.0);
    }

    #[test]
    fn test_unknown_node_is_rejected_on_control_side() {
        let (mut board, _state) = board();
        assert!(matches!(
            board.remove_effect(NodeId(42)),
            Err(PedalError::UnknownNode(NodeId(42)))
        ));
        assert!(board.toggle_bypass(NodeId(42)).is_err());
        assert!(board.move_effect(0, 1).is_err());
        assert_eq!(board.engine().command_tx.len(), 0);
    }

    #[test]
    fn test_removed_node_retires_to_control_thread() {
        let (mut board, mut state) = board();
        let id = board.add_effect(EffectKind::AutoWah).unwrap();
        run(&mut state, 128 * 8);
        board.remove_effect(id).unwrap();
        run(&mut state, 128 * 8);
        assert!(state.chain().is_empty());

        let mut retired = false;
        while let Ok(event) = board.engine().event_rx.try_recv() {
            if let AudioEvent::RetiredNode(node) = event {
                assert_eq!(node.id(), id);
                assert!(node.is_torn_down());
                retired = true;
            }
        }
        assert!(retired);
    }

    #[test]
    fn test_structural_change_fades_output() {
        let (mut board, mut state) = board();
        board.set_source(Box::new(ToneSource::new(200.0, 0.5))).unwrap();
        let first = run(&mut state, 4800);
        // Fades in from silence after the source swap
        assert!(first[0].abs() < 0.01);
        assert!(first[4000..].iter().any(|s| s.abs() > 0.4));

        board.add_effect(EffectKind::Tremolo).unwrap();
        let out = run(&mut state, 4800);
        let max_step = out
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_step < 0.05, "step {}", max_step);
        assert_eq!(state.chain().len(), 1);
    }

    #[test]
    fn test_preset_round_trip_through_board() {
        let (mut board, mut state) = board();
        let preset = Preset {
            name: "Ambient".to_string(),
            effects: vec![
                PresetEntry::new(EffectKind::Chorus).with_param("depth", 80.0),
                PresetEntry::new(EffectKind::Reverb).with_param("decay", 90.0),
            ],
        };
        board.add_effect(EffectKind::Fuzz).unwrap();
        board.load_preset(&preset).unwrap();
        run(&mut state, 128 * 16);

        let kinds: Vec<_> = state.chain().nodes().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec![EffectKind::Chorus, EffectKind::Reverb]);
        let saved = board.preset("Ambient");
        assert_eq!(saved.effects.len(), 2);
        assert_eq!(saved.effects[1].effect_type, EffectKind::Reverb);
        assert!(saved.effects[1].params.contains(&("decay".to_string(), 90.0)));
        assert!(board.drain_events() >= 1);
    }

    #[test]
    fn test_shutdown_silences_and_tears_down() {
        let (mut board, mut state) = board();
        board.set_source(Box::new(ToneSource::default())).unwrap();
        board.add_effect(EffectKind::Delay).unwrap();
        run(&mut state, 1280);
        board.shutdown().unwrap();
        let out = run(&mut state, 1024);
        assert!(!state.is_running());
        assert!(out[512..].iter().all(|s| *s == 0.0));
        assert!(state.chain().nodes().all(|n| n.is_torn_down()));
        assert!(board.engine().is_shutdown());

        // Nodes sent after the stop come straight back
        board.add_effect(EffectKind::Chorus).unwrap();
        run(&mut state, 128);
        assert!(state.chain().nodes().all(|n| n.is_torn_down()));
        let mut stopped = false;
        let mut returned = false;
        while let Ok(event) = board.engine().event_rx.try_recv() {
            match event {
                AudioEvent::Stopped => stopped = true,
                AudioEvent::RetiredNode(node) => returned |= node.kind() == EffectKind::Chorus,
                _ => {}
            }
        }
        assert!(stopped && returned);
    }

    #[test]
    fn test_shutdown_fades_out() {
        let (mut board, mut state) = board();
        board.set_source(Box::new(ToneSource::new(200.0, 0.5))).unwrap();
        let before = run(&mut state, 128 * 100);
        assert!(before[12000..].iter().any(|s| s.abs() > 0.4));

        board.shutdown().unwrap();
        let after = run(&mut state, 1280);
        let max_step = std::iter::once(&before[before.len() - 1])
            .chain(after.iter())
            .collect::<Vec<_>>()
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        // A 200 Hz sine at 0.5 moves about 0.013 per sample
        assert!(max_step < 0.03, "step {}", max_step);
        assert!(after[..64].iter().any(|s| s.abs() > 0.01));
        assert!(after[640..].iter().all(|s| *s == 0.0));
        assert!(!state.is_running());
    }

    #[test]
    fn test_shutdown_retries_a_full_queue() {
        let (mut board, mut state) = Pedalboard::create(
            AudioGraphContext::new(48000, 128),
            Voicings::default(),
            SmoothingTimes::default(),
            1,
        );
        board.set_source(Box::new(ToneSource::default())).unwrap();
        assert!(matches!(board.shutdown(), Err(PedalError::QueueFull)));
        assert!(state.is_running());

        run(&mut state, 128);
        board.shutdown().unwrap();
        run(&mut state, 1024);
        assert!(!state.is_running());
    }

    #[test]
    fn test_recorder_tap_receives_output() {
        let (mut board, mut state) = board();
        let (tap, consumer) = RecorderTap::channel(4096);
        board.set_recorder(Some(Box::new(tap))).unwrap();
        run(&mut state, 1024);
        assert_eq!(consumer.occupied_len(), 1024);
    }
}
