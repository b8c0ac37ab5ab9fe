//! Schroeder/Moorer reverb tank
//!
//! Parallel damped combs (one [`FeedbackDelayNetwork`] each, summed and
//! scaled by 1/N) feed a series of allpass diffusers. An optional pre-delay
//! sits in front and a highpass/lowpass tone stage behind.
//!
//! Delay times come from a [`ReverbVoicing`] so rooms can be retuned without
//! touching the tank.

use serde::{Deserialize, Serialize};

use crate::context::AudioGraphContext;
use crate::dsp::delay_line::DelayLine;
use crate::dsp::fdn::{FeedbackDelayNetwork, FeedbackMode, LoopFilter};
use crate::dsp::filter::{Biquad, OnePole};
use crate::dsp::ParameterSmoother;
use crate::error::{PedalError, Result};

/// Supported comb count
pub const COMB_RANGE: std::ops::RangeInclusive<usize> = 6..=12;

/// Supported allpass count
pub const ALLPASS_RANGE: std::ops::RangeInclusive<usize> = 4..=8;

/// Tuning data for one reverb character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbVoicing {
    /// Comb delay times in seconds (mutually decorrelated)
    pub comb_times: Vec<f32>,
    /// Allpass delay times in seconds
    pub allpass_times: Vec<f32>,
    /// Allpass coefficient `g`
    pub allpass_gain: f32,
    /// Comb feedback at decay 0 and decay 1
    pub min_feedback: f32,
    pub max_feedback: f32,
    /// One-pole damping coefficient reached at damping 1
    pub max_damping: f32,
    /// Longest pre-delay in seconds
    pub max_predelay: f32,
    /// Tone stage highpass in Hz
    pub low_cut: f32,
    /// Tone stage lowpass range in Hz (tone 0 .. tone 1)
    pub dark_cutoff: f32,
    pub bright_cutoff: f32,
}

impl ReverbVoicing {
    /// Large hall: long, sparse combs
    pub fn hall() -> Self {
        Self {
            comb_times: vec![
                0.0437, 0.0527, 0.0617, 0.0697, 0.0371, 0.0411, 0.0457, 0.0491,
            ],
            allpass_times: vec![0.0089, 0.0113, 0.0137, 0.0151],
            allpass_gain: 0.7,
            min_feedback: 0.8,
            max_feedback: 0.95,
            max_damping: 0.8,
            max_predelay: 0.25,
            low_cut: 80.0,
            dark_cutoff: 2500.0,
            bright_cutoff: 12000.0,
        }
    }

    /// Small room: short combs, quicker decay
    pub fn room() -> Self {
        Self {
            comb_times: vec![0.0253, 0.0269, 0.0290, 0.0307, 0.0322, 0.0338],
            allpass_times: vec![0.0126, 0.0100, 0.0077, 0.0051],
            allpass_gain: 0.5,
            min_feedback: 0.7,
            max_feedback: 0.88,
            max_damping: 0.6,
            max_predelay: 0.1,
            low_cut: 100.0,
            dark_cutoff: 3000.0,
            bright_cutoff: 14000.0,
        }
    }

    /// Reject voicings the tank cannot be built from
    pub fn validate(&self) -> Result<()> {
        if !COMB_RANGE.contains(&self.comb_times.len()) {
            return Err(PedalError::configuration(
                "comb_times",
                self.comb_times.len() as f32,
                "needs 6 to 12 combs",
            ));
        }
        if !ALLPASS_RANGE.contains(&self.allpass_times.len()) {
            return Err(PedalError::configuration(
                "allpass_times",
                self.allpass_times.len() as f32,
                "needs 4 to 8 allpasses",
            ));
        }
        if let Some(t) = self
            .comb_times
            .iter()
            .chain(self.allpass_times.iter())
            .find(|t| !(t.is_finite() && **t > 0.0 && **t <= 1.0))
        {
            return Err(PedalError::configuration(
                "delay_time",
                *t,
                "delay times must be in (0, 1] seconds",
            ));
        }
        if !(self.allpass_gain > 0.0 && self.allpass_gain < 1.0) {
            return Err(PedalError::configuration(
                "allpass_gain",
                self.allpass_gain,
                "must be between 0 and 1",
            ));
        }
        let feedback_ok = self.min_feedback >= 0.0
            && self.min_feedback <= self.max_feedback
            && self.max_feedback < 1.0;
        if !feedback_ok {
            return Err(PedalError::configuration(
                "max_feedback",
                self.max_feedback,
                "feedback range must satisfy 0 <= min <= max < 1",
            ));
        }
        Ok(())
    }
}

impl Default for ReverbVoicing {
    fn default() -> Self {
        Self::hall()
    }
}

/// Schroeder allpass: `y = -g*x + x[n-D] + g*y[n-D]`
#[derive(Debug, Clone)]
pub struct Allpass {
    line: DelayLine,
    delay: f32,
    gain: f32,
}

impl Allpass {
    pub fn new(delay_samples: f32, gain: f32) -> Self {
        let delay = delay_samples.max(1.0);
        Self {
            line: DelayLine::new(delay.ceil() as usize + 4),
            delay,
            gain: gain.clamp(-0.99, 0.99),
        }
    }

    /// Single-buffer form: w = x + g*w[n-D], y = -g*w + w[n-D]
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.line.read(self.delay);
        let w = input + self.gain * delayed;
        self.line.write(w);
        -self.gain * w + delayed
    }

    pub fn clear(&mut self) {
        self.line.clear();
    }
}

/// Parallel combs into series allpasses
#[derive(Debug, Clone)]
pub struct ReverbTank {
    combs: Vec<FeedbackDelayNetwork>,
    allpasses: Vec<Allpass>,
    comb_scale: f32,

    predelay_line: DelayLine,
    predelay: ParameterSmoother,

    low_cut: Biquad,
    tone: Biquad,

    min_feedback: f32,
    max_feedback: f32,
    max_damping: f32,
    dark_cutoff: f32,
    bright_cutoff: f32,

    frozen: bool,
}

impl ReverbTank {
    /// Smoothing for decay/damping/freeze moves
    const GLIDE: f32 = 0.05;

    /// Build a tank from a voicing
    pub fn new(voicing: &ReverbVoicing, ctx: &AudioGraphContext) -> Result<Self> {
        voicing.validate()?;
        let sr = ctx.sample_rate();

        let combs = voicing
            .comb_times
            .iter()
            .map(|t| {
                let mut comb = FeedbackDelayNetwork::new(*t + 0.001, ctx)
                    .with_filter(LoopFilter::Damping(OnePole::with_damping(0.0)));
                comb.set_delay_seconds(*t, 0.0, ctx);
                comb.set_feedback(voicing.min_feedback, 0.0, ctx);
                comb
            })
            .collect::<Vec<_>>();

        let allpasses = voicing
            .allpass_times
            .iter()
            .map(|t| Allpass::new(t * sr, voicing.allpass_gain))
            .collect();

        let predelay_line = DelayLine::with_seconds(voicing.max_predelay, sr);
        let max_predelay = predelay_line.max_delay();

        let mut tank = Self {
            comb_scale: 1.0 / combs.len() as f32,
            combs,
            allpasses,
            predelay_line,
            predelay: ParameterSmoother::new(1.0, 1.0, max_predelay),
            low_cut: Biquad::highpass(sr, voicing.low_cut),
            tone: Biquad::lowpass(sr, voicing.bright_cutoff),
            min_feedback: voicing.min_feedback,
            max_feedback: voicing.max_feedback,
            max_damping: voicing.max_damping.clamp(0.0, 0.99),
            dark_cutoff: voicing.dark_cutoff,
            bright_cutoff: voicing.bright_cutoff,
            frozen: false,
        };
        tank.set_decay(0.5, ctx);
        Ok(tank)
    }

    pub fn comb_count(&self) -> usize {
        self.combs.len()
    }

    pub fn allpass_count(&self) -> usize {
        self.allpasses.len()
    }

    /// Decay amount (0 - 1) mapped onto the voicing's feedback range
    pub fn set_decay(&mut self, decay: f32, ctx: &AudioGraphContext) {
        let decay = decay.clamp(0.0, 1.0);
        let fb = self.min_feedback + decay * (self.max_feedback - self.min_feedback);
        self.set_comb_feedback(fb, ctx);
    }

    /// Raw comb feedback gain (clamped below unity by each comb)
    pub fn set_comb_feedback(&mut self, feedback: f32, ctx: &AudioGraphContext) {
        for comb in self.combs.iter_mut() {
            comb.set_feedback(feedback, Self::GLIDE, ctx);
        }
    }

    /// High-frequency damping (0 - 1)
    pub fn set_damping(&mut self, damping: f32) {
        let coeff = damping.clamp(0.0, 1.0) * self.max_damping;
        for comb in self.combs.iter_mut() {
            if let LoopFilter::Damping(lp) = comb.filter_mut() {
                lp.set_damping(coeff);
            }
        }
    }

    /// Pre-delay in seconds (smoothed)
    pub fn set_predelay(&mut self, seconds: f32, time_constant: f32, ctx: &AudioGraphContext) {
        self.predelay
            .set_target(ctx.seconds_to_samples(seconds.max(0.0)), time_constant, ctx);
    }

    /// Tone (0 = dark, 1 = bright)
    pub fn set_tone(&mut self, tone: f32) {
        let tone = tone.clamp(0.0, 1.0);
        // Logarithmic sweep between the voicing's cutoffs
        let cutoff = self.dark_cutoff * (self.bright_cutoff / self.dark_cutoff).powf(tone);
        self.tone.set_cutoff(cutoff);
    }

    /// Infinite hold: combs pin at unity and fade out their input
    pub fn set_freeze(&mut self, frozen: bool, ctx: &AudioGraphContext) {
        if frozen == self.frozen {
            return;
        }
        self.frozen = frozen;
        let mode = if frozen {
            FeedbackMode::InfiniteHold
        } else {
            FeedbackMode::Normal
        };
        for comb in self.combs.iter_mut() {
            comb.set_mode(mode, Self::GLIDE, ctx);
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Process one sample; returns the wet signal only
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.predelay_line.read(self.predelay.next());
        self.predelay_line.write(input);

        let mut sum = 0.0;
        for comb in self.combs.iter_mut() {
            sum += comb.process(delayed, 0.0);
        }
        let mut y = sum * self.comb_scale;

        for ap in self.allpasses.iter_mut() {
            y = ap.process(y);
        }

        self.tone.process(self.low_cut.process(y))
    }

    /// Clear every delay line and filter
    pub fn clear(&mut self) {
        self.combs.iter_mut().for_each(FeedbackDelayNetwork::clear);
        self.allpasses.iter_mut().for_each(Allpass::clear);
        self.predelay_line.clear();
        self.low_cut.reset();
        self.tone.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Samples until the response stays below -60 dB of its peak
    fn decay_time(tank: &mut ReverbTank, length: usize) -> usize {
        let out: Vec<f32> = (0..length)
            .map(|n| tank.process(if n == 0 { 1.0 } else { 0.0 }))
            .collect();
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let threshold = peak * 1e-3;
        out.iter().rposition(|s| s.abs() > threshold).unwrap_or(0)
    }

    #[test]
    fn test_comb_and_allpass_counts_validated() {
        let ctx = AudioGraphContext::new(48000, 128);

        let mut few_combs = ReverbVoicing::hall();
        few_combs.comb_times.truncate(5);
        assert!(matches!(
            ReverbTank::new(&few_combs, &ctx),
            Err(PedalError::Configuration { .. })
        ));

        let mut many_combs = ReverbVoicing::hall();
        many_combs.comb_times.extend([0.031, 0.033, 0.035, 0.039, 0.043]);
        assert!(ReverbTank::new(&many_combs, &ctx).is_err());

        let mut few_allpasses = ReverbVoicing::hall();
        few_allpasses.allpass_times.truncate(3);
        assert!(ReverbTank::new(&few_allpasses, &ctx).is_err());

        let tank = ReverbTank::new(&ReverbVoicing::room(), &ctx).unwrap();
        assert_eq!(tank.comb_count(), 6);
        assert_eq!(tank.allpass_count(), 4);
    }

    #[test]
    fn test_allpass_is_lossless() {
        let mut ap = Allpass::new(37.0, 0.7);
        let mut energy_out = 0.0;
        for n in 0..20000 {
            let y = ap.process(if n == 0 { 1.0 } else { 0.0 });
            energy_out += y * y;
        }
        assert!((energy_out - 1.0).abs() < 1e-3, "energy {}", energy_out);
    }

    #[test]
    fn test_higher_feedback_decays_longer() {
        let ctx = AudioGraphContext::new(8000, 64);
        let mut previous = 0;
        for fb in [0.5, 0.7, 0.85, 0.95] {
            let mut tank = ReverbTank::new(&ReverbVoicing::hall(), &ctx).unwrap();
            tank.set_damping(0.0);
            tank.set_tone(1.0);
            tank.set_comb_feedback(fb, &ctx);
            // Let the feedback glide settle before the impulse
            for _ in 0..4000 {
                tank.process(0.0);
            }
            let t = decay_time(&mut tank, 8000 * 12);
            assert!(t > previous, "feedback {} decayed in {} <= {}", fb, t, previous);
            previous = t;
        }
    }

    #[test]
    fn test_freeze_sustains_and_ignores_input() {
        let ctx = AudioGraphContext::new(8000, 64);
        let mut tank = ReverbTank::new(&ReverbVoicing::hall(), &ctx).unwrap();
        tank.set_damping(0.0);
        tank.set_decay(1.0, &ctx);
        for _ in 0..4000 {
            tank.process(0.0);
        }
        for n in 0..400 {
            tank.process(if n < 40 { 0.5 } else { 0.0 });
        }
        tank.set_freeze(true, &ctx);
        assert!(tank.is_frozen());

        let out: Vec<f32> = (0..16000).map(|_| tank.process(1.0)).collect();
        let early = crate::dsp::rms(&out[4000..8000]);
        let late = crate::dsp::rms(&out[12000..16000]);
        assert!(early > 0.0);
        assert!(late / early > 0.5 && late / early < 2.0, "early {} late {}", early, late);
    }

    #[test]
    fn test_voicing_deserializes_with_defaults() {
        let voicing: ReverbVoicing = serde_json::from_str(r#"{"allpass_gain": 0.6}"#).unwrap();
        assert_eq!(voicing.allpass_gain, 0.6);
        assert_eq!(voicing.comb_times, ReverbVoicing::hall().comb_times);
        assert!(voicing.validate().is_ok());
    }
}
