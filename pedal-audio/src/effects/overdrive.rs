//! Overdrive and fuzz: oversampled waveshaper between tone-shaping filters
//!
//! Signal path: input highpass -> oversampled curve lookup -> DC blocker ->
//! tone lowpass -> level. The curve is regenerated (through the cache) only
//! when the smoothed drive crosses a rounding step.

use crate::context::AudioGraphContext;
use crate::dsp::{
    Biquad, CurveCache, CurveKey, CurveRecipe, DcBlocker, Oversampler, ParameterSmoother,
    SmoothingTimes,
};
use crate::effects::{default_of, EffectKind, EffectProcessor, Voicings};

/// Input highpass (tightens the low end before clipping)
const INPUT_HIGHPASS_HZ: f32 = 40.0;

/// Tone knob sweep (Hz at 0 and 100)
const TONE_MIN_HZ: f32 = 800.0;
const TONE_MAX_HZ: f32 = 8000.0;

fn tone_to_cutoff(tone: f32) -> f32 {
    TONE_MIN_HZ * (TONE_MAX_HZ / TONE_MIN_HZ).powf(tone.clamp(0.0, 100.0) / 100.0)
}

/// 50 = unity
fn level_to_gain(level: f32) -> f32 {
    level.clamp(0.0, 100.0) / 50.0
}

/// Saturation pedal (overdrive or fuzz voicing)
pub struct Saturator {
    kind: EffectKind,
    drive_param: &'static str,
    times: SmoothingTimes,

    recipe: CurveRecipe,
    cache: CurveCache,
    active: usize,
    active_key: CurveKey,
    drive: ParameterSmoother,

    oversampler: Oversampler,
    input_hp: Biquad,
    dc_blocker: DcBlocker,
    tone: Biquad,
    tone_cutoff: ParameterSmoother,
    level: ParameterSmoother,
}

impl Saturator {
    pub fn new(
        kind: EffectKind,
        voicings: &Voicings,
        times: SmoothingTimes,
        ctx: &AudioGraphContext,
    ) -> Self {
        let sr = ctx.sample_rate();
        let (recipe, drive_param) = match kind {
            EffectKind::Fuzz => (voicings.fuzz, "fuzz"),
            _ => (voicings.overdrive, "drive"),
        };
        let specs = kind.params();
        let drive = default_of(specs, drive_param);
        let tone = tone_to_cutoff(default_of(specs, "tone"));

        let mut cache = CurveCache::default();
        let initial = recipe.with_drive(drive);
        let active = cache.acquire(&initial);

        Self {
            kind,
            drive_param,
            times,
            recipe,
            cache,
            active,
            active_key: initial.key(),
            drive: ParameterSmoother::new(drive, 0.0, 100.0),
            oversampler: Oversampler::new(voicings.oversampling, sr),
            input_hp: Biquad::highpass(sr, INPUT_HIGHPASS_HZ),
            dc_blocker: DcBlocker::new(sr),
            tone: Biquad::lowpass(sr, tone),
            tone_cutoff: ParameterSmoother::new(tone, TONE_MIN_HZ, TONE_MAX_HZ),
            level: ParameterSmoother::new(level_to_gain(default_of(specs, "level")), 0.0, 2.0),
        }
    }

    /// Table regenerations so far
    pub fn curve_regenerations(&self) -> u64 {
        self.cache.regenerations()
    }

    /// Move to the curve for the current smoothed drive
    fn refresh_curve(&mut self, drive: f32) {
        let recipe = self.recipe.with_drive(drive);
        let key = recipe.key();
        if key != self.active_key {
            self.active = self.cache.acquire(&recipe);
            self.active_key = key;
        }
    }
}

impl EffectProcessor for Saturator {
    fn kind(&self) -> EffectKind {
        self.kind
    }

    fn set_param(&mut self, name: &str, value: f32, ctx: &AudioGraphContext) {
        match name {
            "tone" => self
                .tone_cutoff
                .set_target(tone_to_cutoff(value), self.times.eq, ctx),
            "level" => self
                .level
                .set_target(level_to_gain(value), self.times.gain, ctx),
            n if n == self.drive_param => self.drive.set_target(value, self.times.eq, ctx),
            _ => {}
        }
    }

    fn process(&mut self, input: &[f32], output: &mut [f32], _ctx: &AudioGraphContext) {
        let frames = input.len().min(output.len());

        // Curve and tone follow their knobs once per block
        let drive = self.drive.skip(frames);
        self.refresh_curve(drive);
        self.tone.set_cutoff(self.tone_cutoff.skip(frames));

        let curve = self.cache.curve(self.active);
        for (x, y) in input.iter().zip(output.iter_mut()) {
            let pre = self.input_hp.process(*x);
            let shaped = self.oversampler.process(pre, |v| curve.lookup(v));
            let blocked = self.dc_blocker.process(shaped);
            *y = self.tone.process(blocked) * self.level.next();
        }
    }

    fn reset(&mut self) {
        self.oversampler.reset();
        self.input_hp.reset();
        self.dc_blocker.reset();
        self.tone.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::rms;
    use std::f32::consts::PI;

    fn sine(amplitude: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| amplitude * (2.0 * PI * 220.0 * i as f32 / 48000.0).sin())
            .collect()
    }

    fn render(fx: &mut Saturator, input: &[f32], ctx: &AudioGraphContext) -> Vec<f32> {
        let mut out = vec![0.0; input.len()];
        for (i, o) in input.chunks(128).zip(out.chunks_mut(128)) {
            fx.process(i, o, ctx);
        }
        out
    }

    fn overdrive_at(drive: f32, ctx: &AudioGraphContext) -> Saturator {
        let voicings = Voicings::default();
        let mut fx =
            Saturator::new(EffectKind::Overdrive, &voicings, SmoothingTimes::default(), ctx);
        fx.drive.snap(drive);
        fx.refresh_curve(drive);
        fx
    }

    #[test]
    fn test_zero_drive_preserves_level() {
        let ctx = AudioGraphContext::new(48000, 128);
        let mut fx = overdrive_at(0.0, &ctx);
        let input = sine(0.1, 48000);
        let out = render(&mut fx, &input, &ctx);
        let ratio = rms(&out[24000..]) / rms(&input[24000..]);
        assert!((ratio - 1.0).abs() < 0.1, "ratio {}", ratio);
    }

    #[test]
    fn test_full_drive_is_bounded() {
        let ctx = AudioGraphContext::new(48000, 128);
        let mut fx = overdrive_at(100.0, &ctx);
        let input = sine(0.5, 48000);
        let out = render(&mut fx, &input, &ctx);
        let level = rms(&out[24000..]);
        assert!(level > 0.1);
        assert!(level < 1.0, "runaway gain: {}", level);
        assert!(out.iter().all(|s| s.abs() < 1.5));
    }

    #[test]
    fn test_curve_only_regenerates_on_drive_change() {
        let ctx = AudioGraphContext::new(48000, 128);
        let mut fx = overdrive_at(30.0, &ctx);
        let input = sine(0.3, 4800);
        render(&mut fx, &input, &ctx);
        let before = fx.curve_regenerations();
        render(&mut fx, &input, &ctx);
        assert_eq!(fx.curve_regenerations(), before);

        fx.set_param("drive", 80.0, &ctx);
        render(&mut fx, &input, &ctx);
        assert!(fx.curve_regenerations() > before);
    }

    #[test]
    fn test_fuzz_uses_its_own_knob() {
        let ctx = AudioGraphContext::new(48000, 128);
        let mut fx = Saturator::new(
            EffectKind::Fuzz,
            &Voicings::default(),
            SmoothingTimes::default(),
            &ctx,
        );
        assert_eq!(fx.kind(), EffectKind::Fuzz);
        fx.set_param("fuzz", 100.0, &ctx);
        assert_eq!(fx.drive.target(), 100.0);
        fx.set_param("drive", 0.0, &ctx);
        assert_eq!(fx.drive.target(), 100.0);
    }
}
