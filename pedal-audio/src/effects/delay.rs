//! Echo pedals: clean digital delay and bucket-brigade analog delay
//!
//! Both are one [`FeedbackDelayNetwork`] with a modulation LFO on the read
//! position. The digital voice keeps a highpass in the loop and a tone
//! lowpass on the repeats; the analog voice darkens and saturates every
//! repeat inside the loop and runs away when feedback is maxed.

use crate::context::AudioGraphContext;
use crate::dsp::{
    Biquad, FeedbackDelayNetwork, FeedbackMode, LoopFilter, ModTarget, ModulationSource, OnePole,
    ParameterSmoother, SmoothingTimes, Waveform,
};
use crate::effects::{default_of, EffectKind, EffectProcessor};

/// Loop highpass of the digital voice
const LOOP_HIGHPASS_HZ: f32 = 120.0;

/// Bucket-brigade emulation
const BBD_STAGES: usize = 4;
const BBD_DRIVE: f32 = 1.5;

/// Echo pedal
pub struct Echo {
    kind: EffectKind,
    times: SmoothingTimes,
    fdn: FeedbackDelayNetwork,
    lfo: ModulationSource,
    wobble: ModTarget,
    /// Modulation depth in samples
    depth: ParameterSmoother,
    max_depth: f32,
    tone: Biquad,
    tone_cutoff: ParameterSmoother,
    /// Tone range in Hz
    tone_range: (f32, f32),
}

impl Echo {
    pub fn new(kind: EffectKind, times: SmoothingTimes, ctx: &AudioGraphContext) -> Self {
        let sr = ctx.sample_rate();
        let specs = kind.params();
        let analog = kind == EffectKind::AnalogDelay;

        // Longest time plus headroom for modulation
        let (max_seconds, max_depth_secs, tone_range) = if analog {
            (0.62, 0.0015, (1200.0, 6000.0))
        } else {
            (2.01, 0.002, (1500.0, 12000.0))
        };
        let tone_hz = tone_from_knob(default_of(specs, "tone"), tone_range);

        let filter = if analog {
            LoopFilter::bucket_brigade(sr, tone_hz, BBD_STAGES, BBD_DRIVE)
        } else {
            LoopFilter::Highpass(OnePole::new(sr, LOOP_HIGHPASS_HZ))
        };

        let mut fdn = FeedbackDelayNetwork::new(max_seconds, ctx).with_filter(filter);
        fdn.set_delay_seconds(default_of(specs, "time") / 1000.0, 0.0, ctx);
        fdn.set_feedback(default_of(specs, "feedback") / 100.0, 0.0, ctx);

        let max_depth = max_depth_secs * sr;
        let depth = default_of(specs, "depth") / 100.0 * max_depth;
        let rate = rate_from_knob(default_of(specs, "rate"));
        let mut lfo = ModulationSource::new(rate, Waveform::Sine);
        let wobble = lfo.add_target(depth);

        Self {
            kind,
            times,
            fdn,
            lfo,
            wobble,
            depth: ParameterSmoother::new(depth, 0.0, max_depth),
            max_depth,
            // The analog voice filters inside the loop; this stays open for it
            tone: Biquad::lowpass(sr, if analog { 20000.0 } else { tone_hz }),
            tone_cutoff: ParameterSmoother::new(tone_hz, tone_range.0, tone_range.1),
            tone_range,
        }
    }

    fn is_analog(&self) -> bool {
        self.kind == EffectKind::AnalogDelay
    }

    pub fn feedback_mode(&self) -> FeedbackMode {
        self.fdn.mode()
    }
}

/// 0..100 knob to 0.05..5 Hz
fn rate_from_knob(rate: f32) -> f32 {
    0.05 + rate.clamp(0.0, 100.0) / 100.0 * 4.95
}

fn tone_from_knob(tone: f32, (low, high): (f32, f32)) -> f32 {
    low * (high / low).powf(tone.clamp(0.0, 100.0) / 100.0)
}

impl EffectProcessor for Echo {
    fn kind(&self) -> EffectKind {
        self.kind
    }

    fn set_param(&mut self, name: &str, value: f32, ctx: &AudioGraphContext) {
        match name {
            "time" => {
                self.fdn
                    .set_delay_seconds(value / 1000.0, self.times.gain, ctx);
            }
            "feedback" => {
                if self.is_analog() {
                    let mode = if value >= 100.0 {
                        FeedbackMode::SelfOscillation
                    } else {
                        FeedbackMode::Normal
                    };
                    self.fdn.set_mode(mode, self.times.gain, ctx);
                }
                self.fdn.set_feedback(value / 100.0, self.times.gain, ctx);
            }
            "hold" if !self.is_analog() => {
                let mode = if value >= 0.5 {
                    FeedbackMode::InfiniteHold
                } else {
                    FeedbackMode::Normal
                };
                self.fdn.set_mode(mode, self.times.fast, ctx);
            }
            "tone" => {
                let cutoff = tone_from_knob(value, self.tone_range);
                self.tone_cutoff.set_target(cutoff, self.times.eq, ctx);
            }
            "rate" => self.lfo.set_rate(rate_from_knob(value), self.times.eq, ctx),
            "depth" => {
                let depth = value / 100.0 * self.max_depth;
                self.depth.set_target(depth, self.times.eq, ctx);
            }
            _ => {}
        }
    }

    fn process(&mut self, input: &[f32], output: &mut [f32], ctx: &AudioGraphContext) {
        let frames = input.len().min(output.len());
        let sr = ctx.sample_rate();

        let depth = self.depth.skip(frames);
        self.lfo.set_depth(self.wobble, depth);

        let cutoff = self.tone_cutoff.skip(frames);
        if self.is_analog() {
            if let LoopFilter::BucketBrigade { stages, .. } = self.fdn.filter_mut() {
                for stage in stages.iter_mut() {
                    stage.set_cutoff(sr, cutoff);
                }
            }
        } else {
            self.tone.set_cutoff(cutoff);
        }

        for (x, y) in input.iter().zip(output.iter_mut()) {
            self.lfo.tick(ctx);
            let modulation = self.lfo.modulate(self.wobble, 0.0);
            let echo = self.fdn.process(*x, modulation);
            *y = self.tone.process(echo);
        }
    }

    fn reset(&mut self) {
        self.fdn.clear();
        self.tone.reset();
        self.lfo.reset();
    }

    fn teardown(&mut self) {
        self.fdn.clear();
    }
}
