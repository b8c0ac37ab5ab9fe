//! Envelope-controlled wah: an envelope follower sweeps a resonant bandpass

use crate::context::AudioGraphContext;
use crate::dsp::{
    Biquad, BiquadType, Direction, EnvelopeFollower, ParameterSmoother, SmoothingTimes,
};
use crate::effects::{default_of, EffectKind, EffectProcessor};

/// 0..100 knob to detector gain 0.5..10
fn sensitivity_from_knob(value: f32) -> f32 {
    0.5 + value.clamp(0.0, 100.0) / 100.0 * 9.5
}

pub struct AutoWah {
    times: SmoothingTimes,
    envelope: EnvelopeFollower,
    filter: Biquad,
    cutoff: ParameterSmoother,
    low: f32,
    high: f32,
}

impl AutoWah {
    pub fn new(control_rate: f32, times: SmoothingTimes, ctx: &AudioGraphContext) -> Self {
        let specs = EffectKind::AutoWah.params();
        let low = default_of(specs, "low");
        let high = default_of(specs, "high");

        let mut envelope = EnvelopeFollower::new(ctx, control_rate);
        envelope.set_sensitivity(sensitivity_from_knob(default_of(specs, "sensitivity")));
        envelope.set_attack(default_of(specs, "attack") / 1000.0, ctx);
        envelope.set_release(default_of(specs, "release") / 1000.0, ctx);

        Self {
            times,
            envelope,
            filter: Biquad::new(
                BiquadType::BandPass,
                ctx.sample_rate(),
                low,
                default_of(specs, "q"),
            ),
            cutoff: ParameterSmoother::new(low, 20.0, 20000.0),
            low,
            high,
        }
    }

    pub fn envelope(&self) -> &EnvelopeFollower {
        &self.envelope
    }

    pub fn cutoff(&self) -> f32 {
        self.filter.cutoff()
    }
}

impl EffectProcessor for AutoWah {
    fn kind(&self) -> EffectKind {
        EffectKind::AutoWah
    }

    fn set_param(&mut self, name: &str, value: f32, ctx: &AudioGraphContext) {
        match name {
            "sensitivity" => self.envelope.set_sensitivity(sensitivity_from_knob(value)),
            "attack" => self.envelope.set_attack(value / 1000.0, ctx),
            "release" => self.envelope.set_release(value / 1000.0, ctx),
            "low" => self.low = value,
            "high" => self.high = value,
            "q" => self.filter.set_q(value),
            "direction" => self.envelope.set_direction(if value >= 0.5 {
                Direction::Down
            } else {
                Direction::Up
            }),
            _ => {}
        }
    }

    fn process(&mut self, input: &[f32], output: &mut [f32], ctx: &AudioGraphContext) {
        let period = self.envelope.control_period();
        for (x, y) in input.iter().zip(output.iter_mut()) {
            if self.envelope.process(*x) {
                // Control tick: retarget and glide the cutoff over one period
                let target = self.envelope.map(self.low, self.high);
                self.cutoff.set_target(target, self.times.fast, ctx);
                self.filter.set_cutoff(self.cutoff.skip(period));
            }
            *y = self.filter.process(*x);
        }
    }

    fn reset(&mut self) {
        self.filter.reset();
    }

    fn teardown(&mut self) {
        self.envelope.stop();
    }
}
