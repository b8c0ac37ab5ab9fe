//! Tremolo: LFO on gain

use crate::context::AudioGraphContext;
use crate::dsp::{ModTarget, ModulationSource, ParameterSmoother, SmoothingTimes, Waveform};
use crate::effects::{default_of, EffectKind, EffectProcessor};

/// 0..100 knob to 0.5..15 Hz
fn rate_from_knob(rate: f32) -> f32 {
    0.5 + rate.clamp(0.0, 100.0) / 100.0 * 14.5
}

pub struct Tremolo {
    times: SmoothingTimes,
    lfo: ModulationSource,
    /// Unit-depth handle; the knob depth is applied per sample
    sweep: ModTarget,
    depth: ParameterSmoother,
}

impl Tremolo {
    pub fn new(times: SmoothingTimes, _ctx: &AudioGraphContext) -> Self {
        let specs = EffectKind::Tremolo.params();
        let wave = Waveform::from_index(default_of(specs, "wave"));
        let mut lfo = ModulationSource::new(rate_from_knob(default_of(specs, "rate")), wave);
        let sweep = lfo.add_target(0.5);
        Self {
            times,
            lfo,
            sweep,
            depth: ParameterSmoother::new(default_of(specs, "depth") / 100.0, 0.0, 1.0),
        }
    }
}

impl EffectProcessor for Tremolo {
    fn kind(&self) -> EffectKind {
        EffectKind::Tremolo
    }

    fn set_param(&mut self, name: &str, value: f32, ctx: &AudioGraphContext) {
        match name {
            "rate" => self.lfo.set_rate(rate_from_knob(value), self.times.eq, ctx),
            "depth" => self.depth.set_target(value / 100.0, self.times.gain, ctx),
            "wave" => self.lfo.set_waveform(Waveform::from_index(value), self.times.fast, ctx),
            _ => {}
        }
    }

    fn process(&mut self, input: &[f32], output: &mut [f32], ctx: &AudioGraphContext) {
        for (x, y) in input.iter().zip(output.iter_mut()) {
            self.lfo.tick(ctx);
            // Unipolar 0..1 from the bipolar LFO
            let swing = self.lfo.modulate(self.sweep, 0.5);
            let gain = 1.0 - self.depth.next() * swing;
            *y = *x * gain;
        }
    }

    fn reset(&mut self) {
        self.lfo.reset();
    }
}
