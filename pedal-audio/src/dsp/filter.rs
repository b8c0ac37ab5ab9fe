//! Mono filters: RBJ biquad, one-pole lowpass/highpass, DC blocker

use std::f32::consts::PI;

/// Biquad response type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BiquadType {
    #[default]
    LowPass,
    HighPass,
    BandPass,
    /// Peaking EQ, uses `gain_db`
    Peaking,
}

/// Biquad filter (direct form I, mono)
#[derive(Debug, Clone)]
pub struct Biquad {
    filter_type: BiquadType,
    sample_rate: f32,
    cutoff: f32,    // Hz
    q: f32,         // resonance
    gain_db: f32,   // peaking only

    // Normalized coefficients
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,

    // State
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// Create a filter and compute its coefficients
    pub fn new(filter_type: BiquadType, sample_rate: f32, cutoff: f32, q: f32) -> Self {
        let mut filter = Self {
            filter_type,
            sample_rate,
            cutoff: 1000.0,
            q: 0.707,
            gain_db: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        filter.cutoff = filter.clamp_cutoff(cutoff);
        filter.q = q.clamp(0.1, 20.0);
        filter.calculate_coefficients();
        filter
    }

    pub fn lowpass(sample_rate: f32, cutoff: f32) -> Self {
        Self::new(BiquadType::LowPass, sample_rate, cutoff, 0.707)
    }

    pub fn highpass(sample_rate: f32, cutoff: f32) -> Self {
        Self::new(BiquadType::HighPass, sample_rate, cutoff, 0.707)
    }

    fn clamp_cutoff(&self, cutoff: f32) -> f32 {
        // Stay below Nyquist so the bilinear mapping remains stable
        cutoff.clamp(10.0, (self.sample_rate * 0.45).max(10.0))
    }

    /// Set cutoff frequency (clamped to 10 Hz .. 0.45 * sample rate)
    pub fn set_cutoff(&mut self, cutoff: f32) {
        let cutoff = self.clamp_cutoff(cutoff);
        if cutoff != self.cutoff {
            self.cutoff = cutoff;
            self.calculate_coefficients();
        }
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    /// Set resonance (0.1 - 20.0)
    pub fn set_q(&mut self, q: f32) {
        self.q = q.clamp(0.1, 20.0);
        self.calculate_coefficients();
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    /// Set peaking gain in dB (-24 .. 24)
    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db = gain_db.clamp(-24.0, 24.0);
        self.calculate_coefficients();
    }

    pub fn filter_type(&self) -> BiquadType {
        self.filter_type
    }

    /// Upper bound of the magnitude response
    ///
    /// Used by feedback loops to keep the loop gain below unity.
    pub fn peak_gain(&self) -> f32 {
        match self.filter_type {
            BiquadType::LowPass | BiquadType::HighPass => {
                if self.q <= std::f32::consts::FRAC_1_SQRT_2 {
                    1.0
                } else {
                    self.q / (1.0 - 1.0 / (4.0 * self.q * self.q)).sqrt()
                }
            }
            BiquadType::BandPass => 1.0,
            BiquadType::Peaking => 10.0_f32.powf(self.gain_db.max(0.0) / 20.0),
        }
    }

    /// Calculate biquad coefficients based on current parameters
    fn calculate_coefficients(&mut self) {
        let omega = 2.0 * PI * self.cutoff / self.sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * self.q);

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            BiquadType::LowPass => (
                (1.0 - cos_omega) / 2.0,
                1.0 - cos_omega,
                (1.0 - cos_omega) / 2.0,
                1.0 + alpha,
                -2.0 * cos_omega,
                1.0 - alpha,
            ),
            BiquadType::HighPass => (
                (1.0 + cos_omega) / 2.0,
                -(1.0 + cos_omega),
                (1.0 + cos_omega) / 2.0,
                1.0 + alpha,
                -2.0 * cos_omega,
                1.0 - alpha,
            ),
            // Constant 0 dB peak gain
            BiquadType::BandPass => (
                alpha,
                0.0,
                -alpha,
                1.0 + alpha,
                -2.0 * cos_omega,
                1.0 - alpha,
            ),
            BiquadType::Peaking => {
                let a = 10.0_f32.powf(self.gain_db / 40.0);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_omega,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_omega,
                    1.0 - alpha / a,
                )
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process a single sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// One-pole lowpass with matching highpass output
#[derive(Debug, Clone)]
pub struct OnePole {
    coeff: f32,
    state: f32,
}

impl OnePole {
    pub fn new(sample_rate: f32, cutoff: f32) -> Self {
        let mut f = Self {
            coeff: 0.0,
            state: 0.0,
        };
        f.set_cutoff(sample_rate, cutoff);
        f
    }

    /// Lowpass with a raw damping coefficient (0 = open, 1 = frozen)
    pub fn with_damping(damping: f32) -> Self {
        Self {
            coeff: damping.clamp(0.0, 0.999),
            state: 0.0,
        }
    }

    pub fn set_cutoff(&mut self, sample_rate: f32, cutoff: f32) {
        let cutoff = cutoff.clamp(1.0, sample_rate * 0.49);
        self.coeff = (-2.0 * PI * cutoff / sample_rate).exp();
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.coeff = damping.clamp(0.0, 0.999);
    }

    #[inline]
    pub fn lowpass(&mut self, input: f32) -> f32 {
        self.state = input * (1.0 - self.coeff) + self.state * self.coeff;
        self.state
    }

    #[inline]
    pub fn highpass(&mut self, input: f32) -> f32 {
        input - self.lowpass(input)
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// DC blocker (first-order highpass around 10 Hz)
#[derive(Debug, Default, Clone)]
pub struct DcBlocker {
    x_prev: f32,
    y_prev: f32,
    coeff: f32,
}

impl DcBlocker {
    pub fn new(sample_rate: f32) -> Self {
        let cutoff = 10.0;
        let omega = 2.0 * PI * cutoff / sample_rate;
        Self {
            x_prev: 0.0,
            y_prev: 0.0,
            coeff: (1.0 - omega).clamp(0.0, 0.9999),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = input - self.x_prev + self.coeff * self.y_prev;
        self.x_prev = input;
        self.y_prev = output;
        output
    }

    pub fn reset(&mut self) {
        self.x_prev = 0.0;
        self.y_prev = 0.0;
    }
}
