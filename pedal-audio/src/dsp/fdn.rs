//! Feedback delay network: delay line, in-loop filter and feedback gain
//!
//! The shared building block for echo, chorus/flanger, bucket-brigade delay
//! emulation and reverb combs. Per sample:
//!
//! ```text
//! y = read(delay + modulation)
//! write(x + fb * filter(y))
//! ```

use crate::context::AudioGraphContext;
use crate::dsp::delay_line::{DelayInterpolation, DelayLine};
use crate::dsp::filter::{Biquad, OnePole};
use crate::dsp::{soft_saturate, ParameterSmoother};
use crate::error::{PedalError, Result};

/// Largest loop gain allowed in [`FeedbackMode::Normal`]
pub const MAX_STABLE_FEEDBACK: f32 = 0.98;

/// Loop gain used for deliberate self-oscillation
pub const SELF_OSCILLATION_FEEDBACK: f32 = 0.999;

/// How the feedback gain is constrained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackMode {
    /// Loop gain clamped to [`MAX_STABLE_FEEDBACK`]
    #[default]
    Normal,
    /// Loop gain pinned just below unity (runaway analog delay)
    SelfOscillation,
    /// Loop gain pinned at unity and new input faded out (freeze)
    InfiniteHold,
}

/// Filter inside the feedback path
#[derive(Debug, Clone)]
pub enum LoopFilter {
    None,
    /// One-pole lowpass (reverb comb damping, tape-style darkening)
    Damping(OnePole),
    /// One-pole highpass (keeps repeats from getting muddy)
    Highpass(OnePole),
    /// Cascaded lowpass stages with soft saturation (analog delay emulation)
    BucketBrigade { stages: Vec<OnePole>, drive: f32 },
    Biquad(Biquad),
}

impl LoopFilter {
    /// Bucket-brigade loop with `stages` one-pole lowpasses at `cutoff`
    pub fn bucket_brigade(sample_rate: f32, cutoff: f32, stages: usize, drive: f32) -> Self {
        LoopFilter::BucketBrigade {
            stages: (0..stages.max(1))
                .map(|_| OnePole::new(sample_rate, cutoff))
                .collect(),
            drive: drive.max(0.1),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        match self {
            LoopFilter::None => input,
            LoopFilter::Damping(lp) => lp.lowpass(input),
            LoopFilter::Highpass(hp) => hp.highpass(input),
            LoopFilter::BucketBrigade { stages, drive } => {
                let mut y = input;
                for stage in stages.iter_mut() {
                    y = stage.lowpass(y);
                }
                soft_saturate(y * *drive) / *drive
            }
            LoopFilter::Biquad(bq) => bq.process(input),
        }
    }

    /// Upper bound of the filter's magnitude response
    pub fn peak_gain(&self) -> f32 {
        match self {
            LoopFilter::Biquad(bq) => bq.peak_gain(),
            _ => 1.0,
        }
    }

    pub fn reset(&mut self) {
        match self {
            LoopFilter::None => {}
            LoopFilter::Damping(f) | LoopFilter::Highpass(f) => f.reset(),
            LoopFilter::BucketBrigade { stages, .. } => stages.iter_mut().for_each(OnePole::reset),
            LoopFilter::Biquad(bq) => bq.reset(),
        }
    }
}

/// Delay line with filtered, gain-limited feedback
#[derive(Debug, Clone)]
pub struct FeedbackDelayNetwork {
    line: DelayLine,
    /// Delay in samples
    delay: ParameterSmoother,
    feedback: ParameterSmoother,
    /// Gain on new input; ramps to zero while held
    input_gain: ParameterSmoother,
    /// Feedback as requested, before the stability limit
    requested_feedback: f32,
    mode: FeedbackMode,
    filter: LoopFilter,
}

impl FeedbackDelayNetwork {
    /// Allocate for up to `max_seconds` of delay
    pub fn new(max_seconds: f32, ctx: &AudioGraphContext) -> Self {
        let line = DelayLine::with_seconds(max_seconds, ctx.sample_rate());
        let max_delay = line.max_delay();
        Self {
            line,
            delay: ParameterSmoother::new(1.0, 1.0, max_delay),
            feedback: ParameterSmoother::new(0.0, -1.0, 1.0),
            input_gain: ParameterSmoother::new(1.0, 0.0, 1.0),
            requested_feedback: 0.0,
            mode: FeedbackMode::Normal,
            filter: LoopFilter::None,
        }
    }

    pub fn with_filter(mut self, filter: LoopFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter_mut(&mut self) -> &mut LoopFilter {
        &mut self.filter
    }

    pub fn set_interpolation(&mut self, mode: DelayInterpolation) {
        self.line.set_interpolation(mode);
    }

    /// Longest delay this network can produce, in samples
    pub fn max_delay_samples(&self) -> f32 {
        self.line.max_delay()
    }

    /// Ramp the delay time; out-of-range requests are clamped to the line
    ///
    /// Returns the delay that will actually be used.
    pub fn set_delay_samples(
        &mut self,
        samples: f32,
        time_constant: f32,
        ctx: &AudioGraphContext,
    ) -> f32 {
        let clamped = self.line.clamp_delay(samples);
        self.delay.set_target(clamped, time_constant, ctx);
        clamped
    }

    pub fn set_delay_seconds(
        &mut self,
        seconds: f32,
        time_constant: f32,
        ctx: &AudioGraphContext,
    ) -> f32 {
        self.set_delay_samples(ctx.seconds_to_samples(seconds), time_constant, ctx)
    }

    /// Check that `samples` fits the line without clamping
    pub fn check_delay(&self, samples: f32) -> Result<f32> {
        if samples > self.line.max_delay() {
            Err(PedalError::DelayOverflow {
                requested: samples,
                capacity: self.line.capacity(),
            })
        } else {
            Ok(self.line.clamp_delay(samples))
        }
    }

    /// Current (smoothed) delay in samples
    pub fn delay_samples(&self) -> f32 {
        self.delay.value()
    }

    /// Ramp the feedback gain; returns the gain after the stability limit
    pub fn set_feedback(
        &mut self,
        feedback: f32,
        time_constant: f32,
        ctx: &AudioGraphContext,
    ) -> f32 {
        self.requested_feedback = if feedback.is_finite() { feedback } else { 0.0 };
        let effective = self.limit_feedback(self.requested_feedback);
        self.feedback.set_target(effective, time_constant, ctx);
        effective
    }

    /// Reject loop gains at or above unity in `Normal` mode
    pub fn check_feedback(&self, feedback: f32) -> Result<f32> {
        let loop_gain = feedback.abs() * self.filter.peak_gain();
        if self.mode == FeedbackMode::Normal && (loop_gain >= 1.0 || loop_gain.is_nan()) {
            Err(PedalError::UnstableFeedback(feedback))
        } else {
            Ok(self.limit_feedback(feedback))
        }
    }

    fn limit_feedback(&self, feedback: f32) -> f32 {
        let peak = self.filter.peak_gain().max(1.0);
        match self.mode {
            FeedbackMode::Normal => {
                let limit = MAX_STABLE_FEEDBACK / peak;
                feedback.clamp(-limit, limit)
            }
            FeedbackMode::SelfOscillation => SELF_OSCILLATION_FEEDBACK / peak,
            FeedbackMode::InfiniteHold => 1.0 / peak,
        }
    }

    /// Switch feedback mode
    ///
    /// The feedback target is re-evaluated and the input gain ramps with the
    /// same time constant, so entering a hold crossfades input into the loop.
    pub fn set_mode(&mut self, mode: FeedbackMode, time_constant: f32, ctx: &AudioGraphContext) {
        self.mode = mode;
        let effective = self.limit_feedback(self.requested_feedback);
        self.feedback.set_target(effective, time_constant, ctx);
        let input_gain = if mode == FeedbackMode::InfiniteHold {
            0.0
        } else {
            1.0
        };
        self.input_gain.set_target(input_gain, time_constant, ctx);
    }

    pub fn mode(&self) -> FeedbackMode {
        self.mode
    }

    /// Feedback gain the loop is heading to
    pub fn feedback(&self) -> f32 {
        self.feedback.target()
    }

    /// Process one sample with the delay offset by `modulation` samples
    #[inline]
    pub fn process(&mut self, input: f32, modulation: f32) -> f32 {
        let delay = self.delay.next() + modulation;
        let out = self.line.read(delay);
        let fb = self.feedback.next();
        let gain = self.input_gain.next();

        let fed = self.filter.process(out) * fb;
        self.line.write(input * gain + fed);
        out
    }

    /// Clear delay memory and filter state
    pub fn clear(&mut self) {
        self.line.clear();
        self.filter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AudioGraphContext {
        AudioGraphContext::new(48000, 128)
    }

    #[test]
    fn test_impulse_response_decays_geometrically() {
        let ctx = ctx();
        let mut fdn = FeedbackDelayNetwork::new(0.01, &ctx);
        fdn.set_delay_samples(10.0, 0.0, &ctx);
        fdn.set_feedback(0.5, 0.0, &ctx);

        let out: Vec<f32> = (0..61)
            .map(|n| fdn.process(if n == 0 { 1.0 } else { 0.0 }, 0.0))
            .collect();

        let mut expected = 1.0;
        for k in 1..=6 {
            assert!((out[k * 10] - expected).abs() < 1e-6, "echo {}: {}", k, out[k * 10]);
            expected *= 0.5;
        }
        for (n, y) in out.iter().enumerate() {
            if n % 10 != 0 || n == 0 {
                assert_eq!(*y, 0.0, "unexpected output at {}", n);
            }
        }
    }

    #[test]
    fn test_unity_feedback_clamped_in_normal_mode() {
        let ctx = ctx();
        let mut fdn = FeedbackDelayNetwork::new(0.1, &ctx);
        assert_eq!(fdn.set_feedback(1.5, 0.0, &ctx), MAX_STABLE_FEEDBACK);
        assert_eq!(fdn.set_feedback(-3.0, 0.0, &ctx), -MAX_STABLE_FEEDBACK);
        assert!(matches!(
            fdn.check_feedback(1.0),
            Err(PedalError::UnstableFeedback(_))
        ));
        assert!(fdn.check_feedback(0.9).is_ok());
    }

    #[test]
    fn test_resonant_filter_lowers_feedback_limit() {
        let ctx = ctx();
        let bq = Biquad::new(crate::dsp::BiquadType::LowPass, 48000.0, 2000.0, 5.0);
        let peak = bq.peak_gain();
        let mut fdn = FeedbackDelayNetwork::new(0.1, &ctx).with_filter(LoopFilter::Biquad(bq));
        let effective = fdn.set_feedback(0.9, 0.0, &ctx);
        assert!(effective * peak <= MAX_STABLE_FEEDBACK + 1e-6);
    }

    #[test]
    fn test_self_oscillation_and_hold_pin_feedback() {
        let ctx = ctx();
        let mut fdn = FeedbackDelayNetwork::new(0.1, &ctx);
        fdn.set_feedback(0.3, 0.0, &ctx);
        fdn.set_mode(FeedbackMode::SelfOscillation, 0.0, &ctx);
        assert_eq!(fdn.feedback(), SELF_OSCILLATION_FEEDBACK);
        assert!(fdn.check_feedback(1.0).is_ok());

        fdn.set_mode(FeedbackMode::InfiniteHold, 0.0, &ctx);
        assert_eq!(fdn.feedback(), 1.0);

        fdn.set_mode(FeedbackMode::Normal, 0.0, &ctx);
        assert_eq!(fdn.feedback(), 0.3);
    }

    #[test]
    fn test_infinite_hold_mutes_input_and_sustains() {
        let ctx = ctx();
        let mut fdn = FeedbackDelayNetwork::new(0.01, &ctx);
        fdn.set_delay_samples(8.0, 0.0, &ctx);
        fdn.process(1.0, 0.0);
        fdn.set_mode(FeedbackMode::InfiniteHold, 0.0, &ctx);

        let mut echoes = Vec::new();
        for n in 1..=80 {
            // New input is ignored while held
            let y = fdn.process(0.7, 0.0);
            if n % 8 == 0 {
                echoes.push(y);
            }
        }
        assert_eq!(echoes.len(), 10);
        assert!(echoes.iter().all(|e| (*e - 1.0).abs() < 1e-6), "{:?}", echoes);
    }

    #[test]
    fn test_entering_hold_keeps_repeats_continuous() {
        let ctx = ctx();
        let mut fdn = FeedbackDelayNetwork::new(0.01, &ctx);
        fdn.set_delay_samples(100.0, 0.0, &ctx);
        for _ in 0..300 {
            fdn.process(0.5, 0.0);
        }
        fdn.set_mode(FeedbackMode::InfiniteHold, 0.005, &ctx);

        let mut prev = fdn.process(0.5, 0.0);
        let mut max_step = 0.0f32;
        for _ in 0..2400 {
            let y = fdn.process(0.5, 0.0);
            max_step = max_step.max((y - prev).abs());
            prev = y;
        }
        // Input fades out as the loop gain rises, so the held level is flat
        assert!(max_step < 1e-3, "step {}", max_step);
        assert!((prev - 0.5).abs() < 1e-3, "held {}", prev);

        // Input no longer reaches the loop
        for _ in 0..2400 {
            prev = fdn.process(-1.0, 0.0);
        }
        assert!((prev - 0.5).abs() < 1e-3, "held {}", prev);
    }

    #[test]
    fn test_delay_clamped_and_smoothed() {
        let ctx = ctx();
        let mut fdn = FeedbackDelayNetwork::new(0.1, &ctx);
        let max = fdn.max_delay_samples();
        assert_eq!(fdn.set_delay_samples(1.0e9, 0.0, &ctx), max);
        assert!(matches!(
            fdn.check_delay(1.0e9),
            Err(PedalError::DelayOverflow { .. })
        ));

        fdn.set_delay_samples(100.0, 0.0, &ctx);
        fdn.process(0.0, 0.0);
        fdn.set_delay_samples(200.0, 0.01, &ctx);
        fdn.process(0.0, 0.0);
        let d = fdn.delay_samples();
        assert!(d > 100.0 && d < 110.0, "delay stepped to {}", d);
    }

    #[test]
    fn test_bucket_brigade_loop_stays_bounded() {
        let ctx = ctx();
        let mut fdn = FeedbackDelayNetwork::new(0.05, &ctx)
            .with_filter(LoopFilter::bucket_brigade(48000.0, 3000.0, 4, 1.5));
        fdn.set_delay_samples(500.0, 0.0, &ctx);
        fdn.set_mode(FeedbackMode::SelfOscillation, 0.0, &ctx);
        let mut peak = 0.0f32;
        for n in 0..48000 {
            let x = if n < 480 { 0.8 } else { 0.0 };
            peak = peak.max(fdn.process(x, 0.0).abs());
        }
        assert!(peak.is_finite() && peak < 2.0, "peak {}", peak);
    }
}
