//! Envelope follower for auto-wah, swell and other level-driven effects
//!
//! Detection (RMS or peak) runs per sample. The smoothed envelope itself is
//! updated at a fixed control rate counted in samples, so its behaviour does
//! not depend on the audio block size.

use crate::context::AudioGraphContext;

/// Level detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorMode {
    /// Short-window RMS (smooth, musical)
    #[default]
    Rms,
    /// Rectified peak with decay (snappy)
    Peak,
}

/// Sweep direction for [`EnvelopeFollower::map`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Louder playing moves toward the top of the range
    #[default]
    Up,
    /// Louder playing moves toward the bottom of the range
    Down,
}

/// RMS integration window in seconds
const RMS_WINDOW_SECS: f32 = 0.01;

/// Peak detector decay time in seconds
const PEAK_DECAY_SECS: f32 = 0.02;

/// Amplitude-tracking control signal in [0, 1]
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    mode: DetectorMode,
    direction: Direction,
    sensitivity: f32,

    // Detector state
    mean_square: f32,
    rms_coeff: f32,
    peak: f32,
    peak_coeff: f32,

    // Control-rate envelope
    env: f32,
    attack_coeff: f32,
    release_coeff: f32,
    control_period: usize,
    countdown: usize,

    running: bool,
}

impl EnvelopeFollower {
    /// Create a follower ticking `control_rate` times per second
    pub fn new(ctx: &AudioGraphContext, control_rate: f32) -> Self {
        let sr = ctx.sample_rate();
        let control_period = (sr / control_rate.max(1.0)).round().max(1.0) as usize;
        let mut follower = Self {
            mode: DetectorMode::Rms,
            direction: Direction::Up,
            sensitivity: 1.0,
            mean_square: 0.0,
            rms_coeff: (-1.0 / (RMS_WINDOW_SECS * sr)).exp(),
            peak: 0.0,
            peak_coeff: (-1.0 / (PEAK_DECAY_SECS * sr)).exp(),
            env: 0.0,
            attack_coeff: 1.0,
            release_coeff: 1.0,
            control_period,
            countdown: control_period,
            running: true,
        };
        follower.set_attack(0.01, ctx);
        follower.set_release(0.1, ctx);
        follower
    }

    /// Per-tick coefficient for a time constant in seconds
    fn coeff_for(&self, seconds: f32, ctx: &AudioGraphContext) -> f32 {
        let tick_secs = self.control_period as f32 / ctx.sample_rate();
        1.0 - (-tick_secs / seconds.max(1e-4)).exp()
    }

    /// Attack time in seconds (0.001 - 0.5)
    pub fn set_attack(&mut self, seconds: f32, ctx: &AudioGraphContext) {
        self.attack_coeff = self.coeff_for(seconds.clamp(0.001, 0.5), ctx);
    }

    /// Release time in seconds (0.01 - 2.0)
    pub fn set_release(&mut self, seconds: f32, ctx: &AudioGraphContext) {
        self.release_coeff = self.coeff_for(seconds.clamp(0.01, 2.0), ctx);
    }

    pub fn attack_coeff(&self) -> f32 {
        self.attack_coeff
    }

    pub fn release_coeff(&self) -> f32 {
        self.release_coeff
    }

    /// Input gain before detection (0.1 - 10.0)
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity.clamp(0.1, 10.0);
    }

    pub fn set_mode(&mut self, mode: DetectorMode) {
        self.mode = mode;
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn control_period(&self) -> usize {
        self.control_period
    }

    /// Feed one input sample; returns true when a control tick happened
    #[inline]
    pub fn process(&mut self, sample: f32) -> bool {
        if !self.running {
            return false;
        }

        let x = if sample.is_finite() { sample } else { 0.0 };
        match self.mode {
            DetectorMode::Rms => {
                self.mean_square =
                    self.rms_coeff * self.mean_square + (1.0 - self.rms_coeff) * x * x;
            }
            DetectorMode::Peak => {
                self.peak = x.abs().max(self.peak * self.peak_coeff);
            }
        }

        self.countdown -= 1;
        if self.countdown == 0 {
            self.countdown = self.control_period;
            self.tick();
            true
        } else {
            false
        }
    }

    /// One control-rate update of the smoothed envelope
    fn tick(&mut self) {
        let level = match self.mode {
            DetectorMode::Rms => self.mean_square.sqrt(),
            DetectorMode::Peak => self.peak,
        };
        let instant = (level * self.sensitivity).clamp(0.0, 1.0);
        let coeff = if instant > self.env {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.env += (instant - self.env) * coeff;
        self.env = self.env.clamp(0.0, 1.0);
    }

    /// Feed a block; returns the number of control ticks that ran
    pub fn process_block(&mut self, samples: &[f32]) -> usize {
        samples.iter().filter(|s| self.process(**s)).count()
    }

    /// Smoothed envelope in [0, 1]
    #[inline]
    pub fn value(&self) -> f32 {
        self.env
    }

    /// Map the envelope onto `[low, high]` in the configured direction
    pub fn map(&self, low: f32, high: f32) -> f32 {
        match self.direction {
            Direction::Up => low + self.env * (high - low),
            Direction::Down => high - self.env * (high - low),
        }
    }

    /// Stop the control loop; the envelope falls to zero and stays there
    pub fn stop(&mut self) {
        self.running = false;
        self.env = 0.0;
        self.mean_square = 0.0;
        self.peak = 0.0;
        self.countdown = self.control_period;
    }

    /// Restart after [`stop`](Self::stop)
    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
