//! First-order exponential parameter smoothing
//!
//! Every knob-driven value goes through a [`ParameterSmoother`] so that a
//! control change becomes an exponential approach instead of a step.

use serde::{Deserialize, Serialize};

use crate::context::AudioGraphContext;

/// Default smoothing time constants in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingTimes {
    /// Volume/gain changes
    pub gain: f32,
    /// Filter and EQ changes
    pub eq: f32,
    /// Bypass crossfade
    pub bypass: f32,
    /// Fast transitions (envelope-driven sweeps)
    pub fast: f32,
}

impl Default for SmoothingTimes {
    fn default() -> Self {
        Self {
            gain: 0.03,
            eq: 0.015,
            bypass: 0.02,
            fast: 0.005,
        }
    }
}

/// Settling threshold for [`ParameterSmoother::is_settled`]
const SETTLE_EPSILON: f32 = 1e-5;

/// Exponential approach toward a clamped target
#[derive(Debug, Clone)]
pub struct ParameterSmoother {
    current: f32,
    target: f32,
    coeff: f32,
    min: f32,
    max: f32,
}

impl ParameterSmoother {
    /// Create a smoother resting at `value` with the given bounds
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let value = value.clamp(min, max);
        Self {
            current: value,
            target: value,
            coeff: 0.0,
            min,
            max,
        }
    }

    /// Unbounded smoother (gain stages that are clamped elsewhere)
    pub fn unbounded(value: f32) -> Self {
        Self::new(value, f32::MIN, f32::MAX)
    }

    /// Ramp toward `value` with time constant `time_constant` seconds
    ///
    /// After one time constant the remaining distance is 1/e of the step.
    pub fn set_target(&mut self, value: f32, time_constant: f32, ctx: &AudioGraphContext) {
        self.target = value.clamp(self.min, self.max);
        let samples = time_constant.max(0.0) * ctx.sample_rate();
        self.coeff = if samples < 1.0 {
            0.0
        } else {
            (-1.0 / samples).exp()
        };
    }

    /// Jump straight to `value` (construction and reset only)
    pub fn snap(&mut self, value: f32) {
        self.target = value.clamp(self.min, self.max);
        self.current = self.target;
    }

    /// Advance by one sample and return the new value
    #[inline]
    pub fn next(&mut self) -> f32 {
        self.current = self.target + (self.current - self.target) * self.coeff;
        if (self.current - self.target).abs() < SETTLE_EPSILON {
            self.current = self.target;
        }
        self.current
    }

    /// Advance by `n` samples at once (control-rate callers)
    pub fn skip(&mut self, n: usize) -> f32 {
        if n == 0 {
            return self.current;
        }
        let factor = self.coeff.powi(n.min(i32::MAX as usize) as i32);
        self.current = self.target + (self.current - self.target) * factor;
        if (self.current - self.target).abs() < SETTLE_EPSILON {
            self.current = self.target;
        }
        self.current
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.min, self.max)
    }
}
