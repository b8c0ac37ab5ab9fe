//! Low-frequency oscillator driving one or more parameter targets

use std::f32::consts::PI;

use crate::context::AudioGraphContext;
use crate::dsp::ParameterSmoother;

/// LFO waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

impl Waveform {
    /// Map a 0..3 knob position to a waveform
    pub fn from_index(index: f32) -> Self {
        match index.round() as i32 {
            i32::MIN..=0 => Waveform::Sine,
            1 => Waveform::Triangle,
            2 => Waveform::Square,
            _ => Waveform::Sawtooth,
        }
    }

    /// Bipolar value (-1..1) at a phase in [0, 1)
    #[inline]
    pub fn value(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * 2.0 * PI).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
        }
    }
}

/// Handle to one modulation target of a [`ModulationSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModTarget(usize);

/// Periodic control signal with per-target depth
///
/// The phase accumulator is never reset by parameter updates. A waveform
/// change crossfades from the previous shape.
#[derive(Debug, Clone)]
pub struct ModulationSource {
    phase: f32,
    rate: ParameterSmoother,
    waveform: Waveform,
    /// Shape being faded out
    previous: Waveform,
    /// 0 = previous shape, 1 = current shape
    blend: ParameterSmoother,
    depths: Vec<f32>,
    value: f32,
}

impl ModulationSource {
    /// Slowest and fastest supported rates in Hz
    pub const MIN_RATE: f32 = 0.01;
    pub const MAX_RATE: f32 = 20.0;

    pub fn new(rate: f32, waveform: Waveform) -> Self {
        let mut lfo = Self {
            phase: 0.0,
            rate: ParameterSmoother::new(rate, Self::MIN_RATE, Self::MAX_RATE),
            waveform,
            previous: waveform,
            blend: ParameterSmoother::new(1.0, 0.0, 1.0),
            depths: Vec::new(),
            value: 0.0,
        };
        lfo.value = waveform.value(0.0);
        lfo
    }

    /// Start at a phase offset in [0, 1)
    pub fn with_phase(mut self, phase: f32) -> Self {
        self.phase = phase.rem_euclid(1.0);
        self.value = self.waveform.value(self.phase);
        self
    }

    /// Register a target and return its handle
    pub fn add_target(&mut self, depth: f32) -> ModTarget {
        self.depths.push(depth);
        ModTarget(self.depths.len() - 1)
    }

    /// Change the depth of one target; unknown handles are ignored
    pub fn set_depth(&mut self, target: ModTarget, depth: f32) {
        if let Some(d) = self.depths.get_mut(target.0) {
            *d = depth;
        }
    }

    pub fn depth(&self, target: ModTarget) -> f32 {
        self.depths.get(target.0).copied().unwrap_or(0.0)
    }

    /// Change rate (smoothed, phase preserved)
    pub fn set_rate(&mut self, rate: f32, time_constant: f32, ctx: &AudioGraphContext) {
        self.rate.set_target(rate, time_constant, ctx);
    }

    pub fn rate(&self) -> f32 {
        self.rate.target()
    }

    /// Crossfade to `waveform` with time constant `time_constant` seconds
    pub fn set_waveform(
        &mut self,
        waveform: Waveform,
        time_constant: f32,
        ctx: &AudioGraphContext,
    ) {
        if waveform == self.waveform {
            return;
        }
        self.previous = self.waveform;
        self.waveform = waveform;
        self.blend.snap(0.0);
        self.blend.set_target(1.0, time_constant, ctx);
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Advance one sample and return the raw bipolar value
    #[inline]
    pub fn tick(&mut self, ctx: &AudioGraphContext) -> f32 {
        let inc = self.rate.next() / ctx.sample_rate();
        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.value = self.shape(self.phase);
        self.value
    }

    #[inline]
    fn shape(&mut self, phase: f32) -> f32 {
        let current = self.waveform.value(phase);
        if self.blend.is_settled() {
            return current;
        }
        let b = self.blend.next();
        self.previous.value(phase) + (current - self.previous.value(phase)) * b
    }

    /// Current raw value (-1..1)
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Base value offset by this LFO at the target's depth
    #[inline]
    pub fn modulate(&self, target: ModTarget, base: f32) -> f32 {
        base + self.value * self.depth(target)
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.blend.snap(1.0);
        self.previous = self.waveform;
        self.value = self.waveform.value(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_ranges() {
        for wave in [
            Waveform::Sine,
            Waveform::Triangle,
            Waveform::Square,
            Waveform::Sawtooth,
        ] {
            for i in 0..100 {
                let v = wave.value(i as f32 / 100.0);
                assert!((-1.0..=1.0).contains(&v), "{:?} out of range: {}", wave, v);
            }
        }
        assert_eq!(Waveform::Triangle.value(0.5), 1.0);
        assert_eq!(Waveform::Triangle.value(0.0), -1.0);
        assert_eq!(Waveform::Sawtooth.value(0.0), -1.0);
    }

    #[test]
    fn test_phase_persists_across_rate_change() {
        let ctx = AudioGraphContext::new(1000, 64);
        let mut lfo = ModulationSource::new(2.0, Waveform::Sine);
        for _ in 0..100 {
            lfo.tick(&ctx);
        }
        let phase_before = lfo.phase();
        assert!(phase_before > 0.15);

        lfo.set_rate(5.0, 0.01, &ctx);
        assert_eq!(lfo.phase(), phase_before);

        let value_before = lfo.value();
        let next = lfo.tick(&ctx);
        // One sample of motion, no jump back to phase 0
        assert!((next - value_before).abs() < 0.05);
    }

    #[test]
    fn test_multiple_targets() {
        let ctx = AudioGraphContext::new(1000, 64);
        let mut lfo = ModulationSource::new(1.0, Waveform::Sawtooth);
        let delay = lfo.add_target(2.0);
        let cutoff = lfo.add_target(-500.0);
        for _ in 0..250 {
            lfo.tick(&ctx);
        }
        let raw = lfo.value();
        assert!((lfo.modulate(delay, 10.0) - (10.0 + raw * 2.0)).abs() < 1e-6);
        assert!((lfo.modulate(cutoff, 1000.0) - (1000.0 - raw * 500.0)).abs() < 1e-3);

        lfo.set_depth(delay, 0.0);
        assert_eq!(lfo.modulate(delay, 10.0), 10.0);
    }

    #[test]
    fn test_rate_frequency() {
        let ctx = AudioGraphContext::new(1000, 64);
        let mut lfo = ModulationSource::new(4.0, Waveform::Square);
        let mut transitions = 0;
        let mut prev = lfo.value();
        for _ in 0..1000 {
            let v = lfo.tick(&ctx);
            if v != prev {
                transitions += 1;
            }
            prev = v;
        }
        // Two edges per cycle
        assert!((7..=9).contains(&transitions), "transitions: {}", transitions);
    }

    #[test]
    fn test_waveform_change_crossfades() {
        let ctx = AudioGraphContext::new(48000, 128);
        let mut lfo = ModulationSource::new(5.0, Waveform::Sine);
        // Phase 0.67, where sine and triangle are far apart
        for _ in 0..6432 {
            lfo.tick(&ctx);
        }
        let mut prev = lfo.value();
        assert!((prev - Waveform::Triangle.value(lfo.phase())).abs() > 1.0);

        lfo.set_waveform(Waveform::Triangle, 0.005, &ctx);
        assert_eq!(lfo.waveform(), Waveform::Triangle);
        let mut max_step = 0.0f32;
        for _ in 0..4800 {
            let v = lfo.tick(&ctx);
            max_step = max_step.max((v - prev).abs());
            prev = v;
        }
        assert!(max_step < 0.01, "step {}", max_step);
        assert_eq!(lfo.value(), Waveform::Triangle.value(lfo.phase()));
    }

    #[test]
    fn test_waveform_from_index() {
        assert_eq!(Waveform::from_index(0.0), Waveform::Sine);
        assert_eq!(Waveform::from_index(2.2), Waveform::Square);
        assert_eq!(Waveform::from_index(9.0), Waveform::Sawtooth);
    }
}
