//! Uniform wrapper around one pedal: ports, wet/dry, bypass, parameters
//!
//! Output of a node for input `x` and processed signal `p`:
//!
//! ```text
//! out = a * (wet * p + dry * x) + (1 - a) * x
//! ```
//!
//! where `a` is the smoothed bypass weight (1 = active, 0 = bypassed). Every
//! gain in that expression is ramped, so mix and bypass changes never click.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::AudioGraphContext;
use crate::dsp::{ParameterSmoother, SmoothingTimes};
use crate::effects::{EffectKind, EffectProcessor, Voicings};
use crate::error::Result;

/// Stable identifier of a node within a pedalboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One pedal on the board
pub struct EffectNode {
    id: NodeId,
    name: String,
    kind: EffectKind,
    processor: Box<dyn EffectProcessor>,
    times: SmoothingTimes,

    /// Knob values in declaration order
    params: Vec<(&'static str, f32)>,
    mix: f32,
    wet: ParameterSmoother,
    dry: ParameterSmoother,
    active: ParameterSmoother,
    bypassed: bool,
    torn_down: bool,

    // Ports and scratch, sized to the block length
    input_port: Vec<f32>,
    output_port: Vec<f32>,
    processed: Vec<f32>,
}

impl EffectNode {
    /// Build a node for `kind` with default knobs (control thread)
    pub fn new(
        id: NodeId,
        kind: EffectKind,
        voicings: &Voicings,
        times: SmoothingTimes,
        ctx: &AudioGraphContext,
    ) -> Result<Self> {
        let processor = kind.create(voicings, &times, ctx)?;
        Ok(Self::with_processor(id, processor, times, ctx).with_mix(kind.default_mix()))
    }

    /// Wrap an existing processor, fully wet
    pub fn with_processor(
        id: NodeId,
        processor: Box<dyn EffectProcessor>,
        times: SmoothingTimes,
        ctx: &AudioGraphContext,
    ) -> Self {
        let kind = processor.kind();
        let params = processor
            .params()
            .iter()
            .map(|p| (p.name, p.default))
            .collect();
        let block = ctx.block_size();
        Self {
            id,
            name: kind.display_name().to_string(),
            kind,
            processor,
            times,
            params,
            mix: 1.0,
            wet: ParameterSmoother::new(1.0, 0.0, 1.0),
            dry: ParameterSmoother::new(0.0, 0.0, 1.0),
            active: ParameterSmoother::new(1.0, 0.0, 1.0),
            bypassed: false,
            torn_down: false,
            input_port: vec![0.0; block],
            output_port: vec![0.0; block],
            processed: vec![0.0; block],
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    /// Knob values in declaration order
    pub fn params(&self) -> &[(&'static str, f32)] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<f32> {
        self.params.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Wet = m, dry = 1 - m (ramped)
    pub fn set_mix(&mut self, mix: f32, ctx: &AudioGraphContext) {
        let mix = if mix.is_nan() { self.mix } else { mix.clamp(0.0, 1.0) };
        self.mix = mix;
        self.wet.set_target(mix, self.times.gain, ctx);
        self.dry.set_target(1.0 - mix, self.times.gain, ctx);
    }

    /// Validate, clamp and apply one knob
    ///
    /// `"mix"` is handled here; unknown names are ignored and return false.
    pub fn update_parameter(&mut self, name: &str, value: f32, ctx: &AudioGraphContext) -> bool {
        if name == "mix" {
            self.set_mix(value, ctx);
            return true;
        }
        let Some(spec) = self.kind.param(name) else {
            return false;
        };
        let value = spec.clamp(value);
        if let Some(entry) = self.params.iter_mut().find(|(n, _)| *n == spec.name) {
            entry.1 = value;
        }
        if !self.torn_down {
            self.processor.set_param(spec.name, value, ctx);
        }
        true
    }

    /// Crossfade between processed and pass-through; returns the new state
    pub fn toggle_bypass(&mut self, ctx: &AudioGraphContext) -> bool {
        let bypassed = !self.bypassed;
        self.set_bypass(bypassed, ctx);
        bypassed
    }

    pub fn set_bypass(&mut self, bypassed: bool, ctx: &AudioGraphContext) {
        self.bypassed = bypassed;
        let target = if bypassed { 0.0 } else { 1.0 };
        self.active.set_target(target, self.times.bypass, ctx);
    }

    /// Start at `mix` with no ramp; for nodes that have not been heard yet
    pub fn with_mix(mut self, mix: f32) -> Self {
        if !mix.is_nan() {
            self.mix = mix.clamp(0.0, 1.0);
            self.wet.snap(self.mix);
            self.dry.snap(1.0 - self.mix);
        }
        self
    }

    /// Start bypassed (or active) with no crossfade
    pub fn with_bypass(mut self, bypassed: bool) -> Self {
        self.bypassed = bypassed;
        self.active.snap(if bypassed { 0.0 } else { 1.0 });
        self
    }

    /// Tear the node down: stop control loops, clear memory, go silent
    ///
    /// Safe to call any number of times; returns false when already done.
    pub fn disconnect(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.processor.teardown();
        self.processor.reset();
        self.input_port.fill(0.0);
        self.output_port.fill(0.0);
        self.torn_down = true;
        true
    }

    /// Clear processor state without tearing down
    pub fn reset(&mut self) {
        self.processor.reset();
    }

    /// Input port (the chain sums incoming edges here)
    pub(crate) fn input_port_mut(&mut self) -> &mut [f32] {
        &mut self.input_port
    }

    /// Output port of the last rendered block
    pub(crate) fn output_port(&self) -> &[f32] {
        &self.output_port
    }

    /// Render `frames` samples from the input port into the output port
    pub(crate) fn render(&mut self, frames: usize, ctx: &AudioGraphContext) {
        let frames = frames.min(self.input_port.len());
        let input = std::mem::take(&mut self.input_port);
        let mut output = std::mem::take(&mut self.output_port);
        self.process(&input[..frames], &mut output[..frames], ctx);
        self.input_port = input;
        self.output_port = output;
    }

    /// Process one block of any length
    pub fn process(&mut self, input: &[f32], output: &mut [f32], ctx: &AudioGraphContext) {
        if self.torn_down {
            output.fill(0.0);
            return;
        }

        // Fully bypassed and settled: pure pass-through
        if self.bypassed && self.active.is_settled() {
            let n = input.len().min(output.len());
            output[..n].copy_from_slice(&input[..n]);
            return;
        }

        let chunk = self.processed.len().max(1);
        for (x, y) in input.chunks(chunk).zip(output.chunks_mut(chunk)) {
            let n = x.len().min(y.len());
            let processed = &mut self.processed[..n];
            self.processor.process(&x[..n], processed, ctx);

            for i in 0..n {
                let a = self.active.next();
                let wet = self.wet.next();
                let dry = self.dry.next();
                let dry_in = x[i];
                y[i] = a * (wet * processed[i] + dry * dry_in) + (1.0 - a) * dry_in;
            }
        }
    }
}

impl fmt::Debug for EffectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("mix", &self.mix)
            .field("bypassed", &self.bypassed)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}
