//! Signal sources feeding the chain and sinks receiving its output

use std::f32::consts::TAU;
use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::context::AudioGraphContext;

/// Something that produces the chain's input stream
///
/// `fill` runs on the audio thread and must not block or allocate.
pub trait SignalSource: Send {
    /// Write exactly `out.len()` samples
    fn fill(&mut self, out: &mut [f32], ctx: &AudioGraphContext);

    fn start(&mut self) {}

    /// Stopped sources fill with silence
    fn stop(&mut self) {}

    /// Jump to `seconds` into the stream (no-op for live sources)
    fn seek(&mut self, _seconds: f64) {}

    /// Short label for listings and logs
    fn label(&self) -> &'static str;
}

/// Something that receives the chain's output stream
pub trait SignalSink: Send {
    fn write(&mut self, samples: &[f32]);
}

pub struct Silence;

impl SignalSource for Silence {
    fn fill(&mut self, out: &mut [f32], _ctx: &AudioGraphContext) {
        out.fill(0.0);
    }

    fn label(&self) -> &'static str {
        "silence"
    }
}

/// Calibration sine
#[derive(Debug, Clone)]
pub struct ToneSource {
    frequency: f32,
    amplitude: f32,
    phase: f32,
    running: bool,
}

impl ToneSource {
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency: frequency.max(0.0),
            amplitude: amplitude.clamp(0.0, 1.0),
            phase: 0.0,
            running: true,
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }
}

impl Default for ToneSource {
    fn default() -> Self {
        Self::new(440.0, 0.25)
    }
}

impl SignalSource for ToneSource {
    fn fill(&mut self, out: &mut [f32], ctx: &AudioGraphContext) {
        if !self.running {
            out.fill(0.0);
            return;
        }
        let step = self.frequency / ctx.sample_rate();
        for s in out.iter_mut() {
            *s = self.amplitude * (TAU * self.phase).sin();
            self.phase = (self.phase + step).fract();
        }
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn seek(&mut self, _seconds: f64) {
        self.phase = 0.0;
    }

    fn label(&self) -> &'static str {
        "tone"
    }
}

/// Decoded mono samples played from memory
///
/// Shared through an `Arc` so the control thread can keep a handle without
/// copying the data.
pub struct BufferSource {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    position: usize,
    looping: bool,
    running: bool,
}

impl BufferSource {
    pub fn new(samples: Arc<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate: sample_rate.max(1),
            position: 0,
            looping: true,
            running: true,
        }
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length in seconds at the buffer's own sample rate
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

impl SignalSource for BufferSource {
    fn fill(&mut self, out: &mut [f32], _ctx: &AudioGraphContext) {
        let len = self.samples.len();
        if !self.running || len == 0 {
            out.fill(0.0);
            return;
        }

        let mut written = 0;
        while written < out.len() {
            if self.position >= len {
                if !self.looping {
                    out[written..].fill(0.0);
                    return;
                }
                self.position = 0;
            }
            let n = (out.len() - written).min(len - self.position);
            out[written..written + n]
                .copy_from_slice(&self.samples[self.position..self.position + n]);
            written += n;
            self.position += n;
        }
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn seek(&mut self, seconds: f64) {
        let frame = (seconds.max(0.0) * self.sample_rate as f64) as usize;
        self.position = frame.min(self.samples.len());
    }

    fn label(&self) -> &'static str {
        "file"
    }
}

/// Live input read from a ring buffer filled by a device callback
///
/// An underrun pads with silence.
pub struct RingSource {
    consumer: HeapCons<f32>,
    running: bool,
    underruns: u64,
}

impl RingSource {
    /// Create a connected ring of `capacity` samples
    pub fn channel(capacity: usize) -> (HeapProd<f32>, Self) {
        let (producer, consumer) = HeapRb::<f32>::new(capacity.max(1)).split();
        (producer, Self::new(consumer))
    }

    pub fn new(consumer: HeapCons<f32>) -> Self {
        Self {
            consumer,
            running: true,
            underruns: 0,
        }
    }

    /// Blocks that came up short
    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}

impl SignalSource for RingSource {
    fn fill(&mut self, out: &mut [f32], _ctx: &AudioGraphContext) {
        let read = self.consumer.pop_slice(out);
        if read < out.len() {
            out[read..].fill(0.0);
            self.underruns += 1;
        }
        if !self.running {
            out.fill(0.0);
        }
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn seek(&mut self, _seconds: f64) {
        // Drop queued latency
        let stale = self.consumer.occupied_len();
        self.consumer.skip(stale);
    }

    fn label(&self) -> &'static str {
        "mic"
    }
}

/// Copies the output stream into a ring buffer for a recorder thread
///
/// When the reader falls behind, new samples are dropped and counted.
pub struct RecorderTap {
    producer: HeapProd<f32>,
    dropped: u64,
}

impl RecorderTap {
    pub fn channel(capacity: usize) -> (Self, HeapCons<f32>) {
        let (producer, consumer) = HeapRb::<f32>::new(capacity.max(1)).split();
        (
            Self {
                producer,
                dropped: 0,
            },
            consumer,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SignalSink for RecorderTap {
    fn write(&mut self, samples: &[f32]) {
        let written = self.producer.push_slice(samples);
        self.dropped += (samples.len() - written) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_source_loops_and_seeks() {
        let ctx = AudioGraphContext::new(10, 4);
        let data = Arc::new(vec![1.0, 2.0, 3.0]);
        let mut src = BufferSource::new(data.clone(), 10);
        let mut out = [0.0; 5];
        src.fill(&mut out, &ctx);
        assert_eq!(out, [1.0, 2.0, 3.0, 1.0, 2.0]);

        src.seek(0.2);
        src.fill(&mut out[..1], &ctx);
        assert_eq!(out[0], 3.0);

        let mut once = BufferSource::new(data, 10).with_looping(false);
        once.fill(&mut out, &ctx);
        assert_eq!(out, [1.0, 2.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_tone_source_stop_is_silent() {
        let ctx = AudioGraphContext::new(48000, 64);
        let mut tone = ToneSource::new(1000.0, 0.5);
        let mut out = [0.0; 64];
        tone.fill(&mut out, &ctx);
        assert!(out.iter().any(|s| s.abs() > 0.1));
        assert!(out.iter().all(|s| s.abs() <= 0.5 + 1e-6));
        tone.stop();
        tone.fill(&mut out, &ctx);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_ring_source_pads_underrun() {
        let ctx = AudioGraphContext::new(48000, 4);
        let (mut producer, mut src) = RingSource::channel(16);
        producer.push_slice(&[0.5, 0.25]);
        let mut out = [1.0; 4];
        src.fill(&mut out, &ctx);
        assert_eq!(out, [0.5, 0.25, 0.0, 0.0]);
        assert_eq!(src.underruns(), 1);
    }

    #[test]
    fn test_recorder_tap_counts_drops() {
        let (mut tap, mut consumer) = RecorderTap::channel(4);
        tap.write(&[1.0; 6]);
        assert_eq!(tap.dropped(), 2);
        let mut out = [0.0; 4];
        assert_eq!(consumer.pop_slice(&mut out), 4);
    }
}
