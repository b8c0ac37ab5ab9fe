//! Fixed-capacity ring buffer with fractional reads

/// Delay interpolation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum DelayInterpolation {
    /// Linear interpolation (good balance)
    #[default]
    Linear,
    /// 4-point Lagrange cubic interpolation (highest quality)
    Lagrange,
}

/// Mono delay line
///
/// Reads happen before the write of the current sample, so the shortest
/// usable delay is one sample. Requested delays are clamped to the line.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    interpolation: DelayInterpolation,
}

impl DelayLine {
    /// Allocate a line holding `capacity` samples (at least 4)
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(4)],
            write_pos: 0,
            interpolation: DelayInterpolation::Linear,
        }
    }

    /// Allocate a line long enough for `seconds` at `sample_rate`
    pub fn with_seconds(seconds: f32, sample_rate: f32) -> Self {
        Self::new((seconds.max(0.0) * sample_rate).ceil() as usize + 4)
    }

    pub fn set_interpolation(&mut self, mode: DelayInterpolation) {
        self.interpolation = mode;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Longest delay that can be read with interpolation
    #[inline]
    pub fn max_delay(&self) -> f32 {
        (self.buffer.len() - 3) as f32
    }

    /// Clamp a requested delay (in samples) into the readable range
    #[inline]
    pub fn clamp_delay(&self, delay: f32) -> f32 {
        if delay.is_nan() {
            return 1.0;
        }
        delay.clamp(1.0, self.max_delay())
    }

    /// Sample written `offset` samples before the current write position
    #[inline]
    fn tap(&self, offset: usize) -> f32 {
        let len = self.buffer.len();
        self.buffer[(self.write_pos + len - (offset % len)) % len]
    }

    /// Read `delay` samples back (fractional)
    #[inline]
    pub fn read(&self, delay: f32) -> f32 {
        let delay = self.clamp_delay(delay);
        let int_delay = delay as usize;
        let frac = delay - int_delay as f32;

        match self.interpolation {
            DelayInterpolation::Linear => {
                let a = self.tap(int_delay);
                let b = self.tap(int_delay + 1);
                a + (b - a) * frac
            }
            DelayInterpolation::Lagrange => {
                // y[-1], y[0], y[1], y[2] around the integer delay
                let ym1 = self.tap(int_delay.saturating_sub(1).max(1));
                let y0 = self.tap(int_delay);
                let y1 = self.tap(int_delay + 1);
                let y2 = self.tap(int_delay + 2);

                let x = frac;
                let x_1 = x + 1.0;
                let x_2 = x - 1.0;
                let x_3 = x - 2.0;

                let l_1 = -x * x_2 * x_3 / 6.0;
                let l0 = x_1 * x_2 * x_3 / 2.0;
                let l1 = -x_1 * x * x_3 / 2.0;
                let l2 = x_1 * x * x_2 / 6.0;

                ym1 * l_1 + y0 * l0 + y1 * l1 + y2 * l2
            }
        }
    }

    /// Write the current sample and advance
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}
