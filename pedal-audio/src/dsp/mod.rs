//! DSP primitives shared by every pedal model

mod delay_line;
mod envelope;
mod fdn;
mod filter;
mod lfo;
mod reverb;
mod smoother;
mod waveshaper;

pub use delay_line::{DelayInterpolation, DelayLine};
pub use envelope::{DetectorMode, Direction, EnvelopeFollower};
pub use fdn::{
    FeedbackDelayNetwork, FeedbackMode, LoopFilter, MAX_STABLE_FEEDBACK, SELF_OSCILLATION_FEEDBACK,
};
pub use filter::{Biquad, BiquadType, DcBlocker, OnePole};
pub use lfo::{ModTarget, ModulationSource, Waveform};
pub use reverb::{Allpass, ReverbTank, ReverbVoicing, ALLPASS_RANGE, COMB_RANGE};
pub use smoother::{ParameterSmoother, SmoothingTimes};
pub use waveshaper::{
    BaseShape, Curve, CurveCache, CurveKey, CurveRecipe, Oversampler, Oversampling,
};

/// Soft saturation used inside feedback loops (slope 1 at the origin, |y| < 1)
#[inline(always)]
pub fn soft_saturate(x: f32) -> f32 {
    x / (1.0 + x.abs())
}

/// RMS of a block
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_saturate() {
        assert!(soft_saturate(10.0) < 1.0);
        assert!(soft_saturate(-10.0) > -1.0);
        assert!((soft_saturate(0.1) - 0.091).abs() < 0.01);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }
}
