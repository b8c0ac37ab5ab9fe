//! Waveshaper curve synthesis, curve caching and oversampling
//!
//! Every saturation pedal builds its transfer curve from the same recipe:
//! - drive multiplier
//! - base nonlinearity (tanh, algebraic soft clip, threshold with soft knee)
//! - optional asymmetry for even harmonics
//! - optional secondary harmonic term
//! - optional amplitude-dependent compression
//! - final clamp to [-1, 1]
//!
//! The curve passes through the origin, so no DC is injected by the shaper
//! itself; asymmetric curves still need a DC blocker downstream.

use serde::{Deserialize, Serialize};

use crate::dsp::filter::Biquad;

/// Base nonlinearity of a curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseShape {
    /// Hyperbolic tangent (smooth, tube-like)
    #[default]
    Tanh,
    /// Algebraic soft clip x / (1 + |x|)
    Algebraic,
    /// Linear up to `knee`, then a tanh shoulder into the rail
    SoftKnee,
}

/// Parameters that govern one transfer curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveRecipe {
    pub shape: BaseShape,
    /// Drive knob (0 - 100)
    pub drive: f32,
    /// Extra gain reached at drive 100 (g = 1 + drive / 100 * drive_range)
    pub drive_range: f32,
    /// 0 = symmetric; positive half scaled by 1 + a, negative by 1 - a
    pub asymmetry: f32,
    /// Secondary harmonic amount `k`
    pub harmonic: f32,
    /// Secondary harmonic ratio `m`
    pub harmonic_ratio: f32,
    /// Compression amount `c` at drive 100 (scales with drive)
    pub compression: f32,
    /// Soft-knee threshold (0.05 - 1.0), only used by `SoftKnee`
    pub knee: f32,
    /// Output scale before the final clamp
    pub output_gain: f32,
}

impl Default for CurveRecipe {
    fn default() -> Self {
        Self {
            shape: BaseShape::Tanh,
            drive: 0.0,
            drive_range: 11.0,
            asymmetry: 0.0,
            harmonic: 0.0,
            harmonic_ratio: 2.0,
            compression: 0.0,
            knee: 0.5,
            output_gain: 1.0,
        }
    }
}

impl CurveRecipe {
    /// Drive multiplier `g`
    #[inline]
    pub fn drive_gain(&self) -> f32 {
        1.0 + (self.drive.clamp(0.0, 100.0) / 100.0) * self.drive_range.max(0.0)
    }

    /// Copy of this recipe at a different drive setting
    pub fn with_drive(mut self, drive: f32) -> Self {
        self.drive = drive.clamp(0.0, 100.0);
        self
    }

    /// Evaluate the transfer function at `x` (not clamped to the table range)
    pub fn shape(&self, x: f32) -> f32 {
        let g = self.drive_gain();
        let driven = x * g;

        let mut y = match self.shape {
            BaseShape::Tanh => driven.tanh(),
            BaseShape::Algebraic => driven / (1.0 + driven.abs()),
            BaseShape::SoftKnee => {
                let knee = self.knee.clamp(0.05, 1.0);
                let magnitude = driven.abs();
                if magnitude <= knee || knee >= 1.0 {
                    driven.clamp(-1.0, 1.0)
                } else {
                    let span = 1.0 - knee;
                    let shoulder = knee + span * ((magnitude - knee) / span).tanh();
                    shoulder.copysign(driven)
                }
            }
        };

        let asym = self.asymmetry.clamp(-0.9, 0.9);
        if asym != 0.0 {
            y *= if x >= 0.0 { 1.0 + asym } else { 1.0 - asym };
        }

        if self.harmonic != 0.0 {
            y += self.harmonic * (driven * self.harmonic_ratio).tanh();
        }

        let c = self.compression.clamp(0.0, 1.0) * (self.drive.clamp(0.0, 100.0) / 100.0);
        if c > 0.0 {
            y *= 1.0 - c * x.abs().min(1.0);
        }

        (y * self.output_gain).clamp(-1.0, 1.0)
    }

    /// Rounded key used by [`CurveCache`]
    pub fn key(&self) -> CurveKey {
        CurveKey {
            shape: self.shape,
            drive: (self.drive * 2.0).round() as i32,
            drive_range: (self.drive_range * 10.0).round() as i32,
            asymmetry: (self.asymmetry * 100.0).round() as i32,
            harmonic: (self.harmonic * 100.0).round() as i32,
            harmonic_ratio: (self.harmonic_ratio * 10.0).round() as i32,
            compression: (self.compression * 100.0).round() as i32,
            knee: (self.knee * 100.0).round() as i32,
            output_gain: (self.output_gain * 100.0).round() as i32,
        }
    }
}

/// Rounded curve parameters; equal keys share a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurveKey {
    shape: BaseShape,
    drive: i32,
    drive_range: i32,
    asymmetry: i32,
    harmonic: i32,
    harmonic_ratio: i32,
    compression: i32,
    knee: i32,
    output_gain: i32,
}

/// Fixed-size transfer table over x in [-1, 1]
///
/// The length is odd so the centre entry sits exactly at x = 0; that entry
/// is pinned to 0.
#[derive(Debug, Clone)]
pub struct Curve {
    table: Vec<f32>,
}

impl Curve {
    /// Allocate an all-zero table of at least `resolution` points
    pub fn new(resolution: usize) -> Self {
        let len = resolution.max(3) | 1;
        Self {
            table: vec![0.0; len],
        }
    }

    /// Build a table for `recipe`
    pub fn from_recipe(recipe: &CurveRecipe, resolution: usize) -> Self {
        let mut curve = Self::new(resolution);
        curve.generate(recipe);
        curve
    }

    /// Regenerate in place (no allocation)
    pub fn generate(&mut self, recipe: &CurveRecipe) {
        let last = (self.table.len() - 1) as f32;
        for (i, entry) in self.table.iter_mut().enumerate() {
            let x = i as f32 / last * 2.0 - 1.0;
            let y = recipe.shape(x);
            *entry = if y.is_finite() { y.clamp(-1.0, 1.0) } else { 0.0 };
        }
        let centre = self.table.len() / 2;
        self.table[centre] = 0.0;
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn entries(&self) -> &[f32] {
        &self.table
    }

    /// Interpolated lookup; input outside [-1, 1] reads the end points
    #[inline]
    pub fn lookup(&self, x: f32) -> f32 {
        let x = if x.is_nan() { 0.0 } else { x.clamp(-1.0, 1.0) };
        let last = self.table.len() - 1;
        let pos = (x + 1.0) * 0.5 * last as f32;
        let index = (pos as usize).min(last - 1);
        let frac = pos - index as f32;
        let a = self.table[index];
        let b = self.table[index + 1];
        a + (b - a) * frac
    }
}

/// Preallocated tables keyed by rounded recipe
///
/// A hit re-uses a table; a miss overwrites the least recently used slot in
/// place, so the audio thread never allocates when a knob moves.
#[derive(Debug, Clone)]
pub struct CurveCache {
    slots: Vec<CacheSlot>,
    clock: u64,
    regenerations: u64,
}

#[derive(Debug, Clone)]
struct CacheSlot {
    key: Option<CurveKey>,
    last_used: u64,
    curve: Curve,
}

impl CurveCache {
    pub const DEFAULT_SLOTS: usize = 4;
    pub const DEFAULT_RESOLUTION: usize = 4097;

    pub fn new(slots: usize, resolution: usize) -> Self {
        Self {
            slots: (0..slots.max(1))
                .map(|_| CacheSlot {
                    key: None,
                    last_used: 0,
                    curve: Curve::new(resolution),
                })
                .collect(),
            clock: 0,
            regenerations: 0,
        }
    }

    /// Slot index holding the table for `recipe`, generating it on a miss
    pub fn acquire(&mut self, recipe: &CurveRecipe) -> usize {
        let key = recipe.key();
        self.clock += 1;

        if let Some(index) = self.slots.iter().position(|s| s.key == Some(key)) {
            self.slots[index].last_used = self.clock;
            return index;
        }

        let index = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| (s.key.is_some(), s.last_used))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let slot = &mut self.slots[index];
        slot.curve.generate(recipe);
        slot.key = Some(key);
        slot.last_used = self.clock;
        self.regenerations += 1;
        index
    }

    /// Table in slot `index` (clamped to the slot count)
    #[inline]
    pub fn curve(&self, index: usize) -> &Curve {
        &self.slots[index.min(self.slots.len() - 1)].curve
    }

    /// Number of table regenerations so far
    pub fn regenerations(&self) -> u64 {
        self.regenerations
    }
}

impl Default for CurveCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SLOTS, Self::DEFAULT_RESOLUTION)
    }
}

/// Oversampling factor around a nonlinearity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Oversampling {
    #[serde(rename = "1x")]
    X1,
    #[default]
    #[serde(rename = "2x")]
    X2,
    #[serde(rename = "4x")]
    X4,
}

impl Oversampling {
    pub fn factor(self) -> usize {
        match self {
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
        }
    }
}

/// Runs a shaping function at a multiple of the sample rate
///
/// Upsampling interpolates linearly between input samples. The shaped
/// stream is lowpassed by two cascaded biquads at the base band edge and
/// decimated by keeping the last sub-sample.
#[derive(Debug, Clone)]
pub struct Oversampler {
    mode: Oversampling,
    prev: f32,
    anti_alias: [Biquad; 2],
}

impl Oversampler {
    pub fn new(mode: Oversampling, sample_rate: f32) -> Self {
        let rate = sample_rate * mode.factor() as f32;
        let cutoff = sample_rate * 0.45;
        Self {
            mode,
            prev: 0.0,
            anti_alias: [Biquad::lowpass(rate, cutoff), Biquad::lowpass(rate, cutoff)],
        }
    }

    pub fn mode(&self) -> Oversampling {
        self.mode
    }

    /// Process one input sample through `shape`
    #[inline]
    pub fn process<F>(&mut self, input: f32, mut shape: F) -> f32
    where
        F: FnMut(f32) -> f32,
    {
        let factor = self.mode.factor();
        if factor == 1 {
            return shape(input);
        }

        let step = 1.0 / factor as f32;
        let mut out = 0.0;
        for i in 1..=factor {
            let sub = self.prev + (input - self.prev) * (i as f32 * step);
            let mut y = shape(sub);
            for filter in self.anti_alias.iter_mut() {
                y = filter.process(y);
            }
            out = y;
        }
        self.prev = input;
        out
    }

    /// Process a block in place
    pub fn process_block<F>(&mut self, samples: &mut [f32], mut shape: F)
    where
        F: FnMut(f32) -> f32,
    {
        for sample in samples.iter_mut() {
            *sample = self.process(*sample, &mut shape);
        }
    }

    pub fn reset(&mut self) {
        self.prev = 0.0;
        for filter in self.anti_alias.iter_mut() {
            filter.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn recipes() -> Vec<CurveRecipe> {
        let mut out = Vec::new();
        for shape in [BaseShape::Tanh, BaseShape::Algebraic, BaseShape::SoftKnee] {
            for drive in [0.0, 35.0, 100.0] {
                out.push(CurveRecipe {
                    shape,
                    drive,
                    asymmetry: 0.2,
                    harmonic: 0.3,
                    compression: 0.5,
                    knee: 0.4,
                    output_gain: 1.2,
                    ..CurveRecipe::default()
                });
            }
        }
        out
    }

    #[test]
    fn test_curve_passes_through_origin() {
        for recipe in recipes() {
            let curve = Curve::from_recipe(&recipe, 1024);
            assert_eq!(curve.len() % 2, 1);
            assert_eq!(curve.entries()[curve.len() / 2], 0.0);
            assert_eq!(curve.lookup(0.0), 0.0, "{:?}", recipe);
        }
    }

    #[test]
    fn test_curve_entries_bounded() {
        for recipe in recipes() {
            let curve = Curve::from_recipe(&recipe, 513);
            assert!(curve.entries().iter().all(|y| (-1.0..=1.0).contains(y)));
            assert!((-1.0..=1.0).contains(&curve.lookup(5.0)));
            assert!((-1.0..=1.0).contains(&curve.lookup(-5.0)));
            assert_eq!(curve.lookup(f32::NAN), 0.0);
        }
    }

    #[test]
    fn test_drive_zero_is_near_linear() {
        let curve = Curve::from_recipe(&CurveRecipe::default(), 4097);
        for x in [-0.1, -0.05, 0.02, 0.1] {
            assert!((curve.lookup(x) - x).abs() < 0.002, "x={}", x);
        }
    }

    #[test]
    fn test_more_drive_saturates_harder() {
        let soft = CurveRecipe::default().with_drive(10.0);
        let hard = CurveRecipe::default().with_drive(90.0);
        assert!(hard.shape(0.2) > soft.shape(0.2));
        assert!(hard.shape(0.9) > 0.99);
    }

    #[test]
    fn test_asymmetry_creates_uneven_halves() {
        let recipe = CurveRecipe {
            asymmetry: 0.3,
            ..CurveRecipe::default().with_drive(50.0)
        };
        assert!(recipe.shape(0.5) > -recipe.shape(-0.5));
    }

    #[test]
    fn test_cache_reuses_rounded_keys() {
        let mut cache = CurveCache::new(2, 257);
        let a = cache.acquire(&CurveRecipe::default().with_drive(40.0));
        assert_eq!(cache.regenerations(), 1);

        // Rounds to the same key
        let b = cache.acquire(&CurveRecipe::default().with_drive(40.1));
        assert_eq!(a, b);
        assert_eq!(cache.regenerations(), 1);

        let c = cache.acquire(&CurveRecipe::default().with_drive(60.0));
        assert_ne!(a, c);
        assert_eq!(cache.regenerations(), 2);

        // Both slots hot; returning to 40 is still a hit
        assert_eq!(cache.acquire(&CurveRecipe::default().with_drive(40.0)), a);
        assert_eq!(cache.regenerations(), 2);

        // A third key evicts the least recently used slot (60)
        let d = cache.acquire(&CurveRecipe::default().with_drive(80.0));
        assert_eq!(d, c);
        assert_eq!(cache.regenerations(), 3);
    }

    #[test]
    fn test_oversampler_passes_low_frequencies() {
        let sr = 48000.0;
        for mode in [Oversampling::X1, Oversampling::X2, Oversampling::X4] {
            let mut os = Oversampler::new(mode, sr);
            let mut peak = 0.0f32;
            for i in 0..4800 {
                let x = 0.5 * (2.0 * PI * 200.0 * i as f32 / sr).sin();
                let y = os.process(x, |v| v);
                if i > 2400 {
                    peak = peak.max(y.abs());
                }
            }
            assert!((peak - 0.5).abs() < 0.02, "{:?} peak {}", mode, peak);
        }
    }

    #[test]
    fn test_oversampler_band_limits_clipping() {
        // Hard clipping a high tone; the oversampled path filters the upper harmonics
        let sr = 48000.0;
        let shape = |v: f32| (v * 8.0).clamp(-1.0, 1.0);
        let render = |mode: Oversampling| -> Vec<f32> {
            let mut os = Oversampler::new(mode, sr);
            (0..4800)
                .map(|i| os.process((2.0 * PI * 7000.0 * i as f32 / sr).sin(), shape))
                .collect()
        };
        let x1 = render(Oversampling::X1);
        let x4 = render(Oversampling::X4);
        assert!(x1.iter().all(|s| s.is_finite()));
        assert!(x4.iter().all(|s| s.is_finite()));
        assert!(crate::dsp::rms(&x4) < crate::dsp::rms(&x1));
    }
}
