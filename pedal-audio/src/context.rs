//! Explicit audio clock handed to every component

/// Sample rate and stream position for one processing context.
///
/// Passed by reference into every DSP component instead of a global clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioGraphContext {
    sample_rate: f32,
    block_size: usize,
    /// Frames processed since the stream started
    frame: u64,
}

impl AudioGraphContext {
    /// Create a context at frame zero
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate: sample_rate.max(1) as f32,
            block_size: block_size.max(1),
            frame: 0,
        }
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Maximum block length in frames
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Current stream position in frames
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Current stream position in seconds
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    /// Convert seconds to (fractional) samples
    #[inline]
    pub fn seconds_to_samples(&self, seconds: f32) -> f32 {
        seconds * self.sample_rate
    }

    /// Advance the clock after a block has been rendered
    pub fn advance(&mut self, frames: usize) {
        self.frame += frames as u64;
    }
}

impl Default for AudioGraphContext {
    fn default() -> Self {
        Self::new(48000, 256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let mut ctx = AudioGraphContext::new(48000, 128);
        ctx.advance(48000);
        assert_eq!(ctx.frame(), 48000);
        assert!((ctx.current_time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_conversions() {
        let ctx = AudioGraphContext::new(44100, 64);
        assert_eq!(ctx.seconds_to_samples(0.5), 22050.0);
        assert_eq!(ctx.block_size(), 64);
    }
}
