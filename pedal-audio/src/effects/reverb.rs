//! Reverb pedal around a [`ReverbTank`]

use crate::context::AudioGraphContext;
use crate::dsp::{ParameterSmoother, ReverbTank, ReverbVoicing, SmoothingTimes};
use crate::effects::{default_of, EffectKind, EffectProcessor};
use crate::error::Result;

pub struct Reverb {
    times: SmoothingTimes,
    /// Clock the tank was built for (teardown has no caller context)
    ctx: AudioGraphContext,
    tank: ReverbTank,
    /// Knob positions normalized to 0 - 1, applied once per block
    damping: ParameterSmoother,
    tone: ParameterSmoother,
}

impl Reverb {
    pub fn new(
        voicing: &ReverbVoicing,
        times: SmoothingTimes,
        ctx: &AudioGraphContext,
    ) -> Result<Self> {
        let specs = EffectKind::Reverb.params();
        let mut tank = ReverbTank::new(voicing, ctx)?;

        let damping = default_of(specs, "damping") / 100.0;
        let tone = default_of(specs, "tone") / 100.0;
        tank.set_decay(default_of(specs, "decay") / 100.0, ctx);
        tank.set_damping(damping);
        tank.set_tone(tone);
        tank.set_predelay(default_of(specs, "predelay") / 1000.0, 0.0, ctx);

        Ok(Self {
            times,
            ctx: *ctx,
            tank,
            damping: ParameterSmoother::new(damping, 0.0, 1.0),
            tone: ParameterSmoother::new(tone, 0.0, 1.0),
        })
    }

    pub fn tank(&self) -> &ReverbTank {
        &self.tank
    }
}

impl EffectProcessor for Reverb {
    fn kind(&self) -> EffectKind {
        EffectKind::Reverb
    }

    fn set_param(&mut self, name: &str, value: f32, ctx: &AudioGraphContext) {
        match name {
            "decay" => self.tank.set_decay(value / 100.0, ctx),
            "damping" => self.damping.set_target(value / 100.0, self.times.eq, ctx),
            "predelay" => self.tank.set_predelay(value / 1000.0, self.times.gain, ctx),
            "tone" => self.tone.set_target(value / 100.0, self.times.eq, ctx),
            "freeze" => self.tank.set_freeze(value >= 0.5, ctx),
            _ => {}
        }
    }

    fn process(&mut self, input: &[f32], output: &mut [f32], _ctx: &AudioGraphContext) {
        let frames = input.len().min(output.len());
        if !self.damping.is_settled() {
            self.tank.set_damping(self.damping.skip(frames));
        }
        if !self.tone.is_settled() {
            self.tank.set_tone(self.tone.skip(frames));
        }
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.tank.process(*x);
        }
    }

    fn reset(&mut self) {
        self.tank.clear();
    }

    fn teardown(&mut self) {
        self.tank.set_freeze(false, &self.ctx);
        self.tank.clear();
    }
}
