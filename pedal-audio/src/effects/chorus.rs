//! Chorus and flanger: two short modulated delay voices on one LFO
//!
//! The second voice rides the same LFO at a smaller, inverted depth so the
//! two read heads move against each other. The flanger feeds its first voice
//! back into itself.

use crate::context::AudioGraphContext;
use crate::dsp::{
    Biquad, FeedbackDelayNetwork, ModTarget, ModulationSource, ParameterSmoother, SmoothingTimes,
    Waveform,
};
use crate::effects::{default_of, EffectKind, EffectProcessor};

/// Depth of the second voice relative to the first
const SECOND_VOICE_RATIO: f32 = -0.7;

/// Flanger feedback at knob 100
const MAX_FLANGER_FEEDBACK: f32 = 0.9;

struct Voicing {
    /// Base delay of each voice in seconds
    base: [f32; 2],
    /// Sweep depth at knob 100 in seconds
    depth: f32,
    /// LFO rate range in Hz
    rate: (f32, f32),
}

fn voicing(kind: EffectKind) -> Voicing {
    match kind {
        EffectKind::Flanger => Voicing {
            base: [0.0025, 0.0035],
            depth: 0.002,
            rate: (0.05, 2.0),
        },
        _ => Voicing {
            base: [0.007, 0.011],
            depth: 0.003,
            rate: (0.1, 5.0),
        },
    }
}

/// Modulated delay pedal (chorus or flanger)
pub struct Modulated {
    kind: EffectKind,
    times: SmoothingTimes,
    voices: [FeedbackDelayNetwork; 2],
    lfo: ModulationSource,
    targets: [ModTarget; 2],
    /// Normalized depth (0 - 1)
    depth: ParameterSmoother,
    /// Depth at knob 100 in samples
    max_depth: f32,
    rate_range: (f32, f32),
    tone: Biquad,
    tone_cutoff: ParameterSmoother,
}

fn tone_from_knob(tone: f32) -> f32 {
    2000.0 * 6.0_f32.powf(tone.clamp(0.0, 100.0) / 100.0)
}

impl Modulated {
    pub fn new(kind: EffectKind, times: SmoothingTimes, ctx: &AudioGraphContext) -> Self {
        let v = voicing(kind);
        let specs = kind.params();
        let sr = ctx.sample_rate();

        let voices = v.base.map(|base| {
            let mut fdn = FeedbackDelayNetwork::new(base + v.depth + 0.001, ctx);
            fdn.set_delay_seconds(base, 0.0, ctx);
            fdn
        });

        let max_depth = v.depth * sr;
        let depth = default_of(specs, "depth") / 100.0;
        let rate = rate_from_knob(default_of(specs, "rate"), v.rate);
        let mut lfo = ModulationSource::new(rate, Waveform::Triangle);
        let targets = [
            lfo.add_target(depth * max_depth),
            lfo.add_target(depth * max_depth * SECOND_VOICE_RATIO),
        ];
        let tone = tone_from_knob(default_of(specs, "tone"));

        let mut fx = Self {
            kind,
            times,
            voices,
            lfo,
            targets,
            depth: ParameterSmoother::new(depth, 0.0, 1.0),
            max_depth,
            rate_range: v.rate,
            tone: Biquad::lowpass(sr, tone),
            tone_cutoff: ParameterSmoother::new(tone, 2000.0, 12000.0),
        };
        if kind == EffectKind::Flanger {
            let fb = default_of(specs, "feedback") / 100.0 * MAX_FLANGER_FEEDBACK;
            fx.voices[0].set_feedback(fb, 0.0, ctx);
        }
        fx
    }
}

fn rate_from_knob(rate: f32, (low, high): (f32, f32)) -> f32 {
    low + rate.clamp(0.0, 100.0) / 100.0 * (high - low)
}

impl EffectProcessor for Modulated {
    fn kind(&self) -> EffectKind {
        self.kind
    }

    fn set_param(&mut self, name: &str, value: f32, ctx: &AudioGraphContext) {
        match name {
            "rate" => {
                let rate = rate_from_knob(value, self.rate_range);
                self.lfo.set_rate(rate, self.times.eq, ctx);
            }
            "depth" => self.depth.set_target(value / 100.0, self.times.eq, ctx),
            "feedback" if self.kind == EffectKind::Flanger => {
                let fb = value / 100.0 * MAX_FLANGER_FEEDBACK;
                self.voices[0].set_feedback(fb, self.times.gain, ctx);
            }
            "tone" => self
                .tone_cutoff
                .set_target(tone_from_knob(value), self.times.eq, ctx),
            _ => {}
        }
    }

    fn process(&mut self, input: &[f32], output: &mut [f32], ctx: &AudioGraphContext) {
        let frames = input.len().min(output.len());
        let depth = self.depth.skip(frames) * self.max_depth;
        self.lfo.set_depth(self.targets[0], depth);
        self.lfo.set_depth(self.targets[1], depth * SECOND_VOICE_RATIO);
        self.tone.set_cutoff(self.tone_cutoff.skip(frames));

        let [a, b] = self.targets;
        for (x, y) in input.iter().zip(output.iter_mut()) {
            self.lfo.tick(ctx);
            let first = self.voices[0].process(*x, self.lfo.modulate(a, 0.0));
            let second = self.voices[1].process(*x, self.lfo.modulate(b, 0.0));
            *y = self.tone.process((first + second) * 0.5);
        }
    }

    fn reset(&mut self) {
        self.voices.iter_mut().for_each(FeedbackDelayNetwork::clear);
        self.tone.reset();
    }

    fn teardown(&mut self) {
        self.voices.iter_mut().for_each(FeedbackDelayNetwork::clear);
    }
}
