//! Pedal models composed from the DSP primitives
//!
//! Every pedal implements [`EffectProcessor`] and declares its knobs in a
//! static [`ParamSpec`] table. Processors output the fully processed signal;
//! wet/dry mixing and bypass belong to [`EffectNode`](crate::EffectNode).

mod autowah;
mod chorus;
mod delay;
mod overdrive;
mod reverb;
mod tremolo;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use autowah::AutoWah;
pub use chorus::Modulated;
pub use delay::Echo;
pub use overdrive::Saturator;
pub use reverb::Reverb;
pub use tremolo::Tremolo;

use crate::context::AudioGraphContext;
use crate::dsp::{BaseShape, CurveRecipe, Oversampling, ReverbVoicing, SmoothingTimes};
use crate::error::{PedalError, Result};

/// Trait for pedal models
pub trait EffectProcessor: Send {
    /// Which pedal this is
    fn kind(&self) -> EffectKind;

    /// Knob table
    fn params(&self) -> &'static [ParamSpec] {
        self.kind().params()
    }

    /// Apply an already-clamped knob value (smoothed internally)
    fn set_param(&mut self, name: &str, value: f32, ctx: &AudioGraphContext);

    /// Render one block of fully processed signal
    fn process(&mut self, input: &[f32], output: &mut [f32], ctx: &AudioGraphContext);

    /// Clear delay memory and filter state
    fn reset(&mut self);

    /// Stop background control loops; must be idempotent
    fn teardown(&mut self) {}
}

/// One knob: name, range and default
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamSpec {
    pub const fn new(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            default,
        }
    }

    /// Clamp into range; NaN becomes the default
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// Position in the range (0 - 1)
    pub fn normalize(&self, value: f32) -> f32 {
        (self.clamp(value) - self.min) / (self.max - self.min)
    }
}

/// Default of `name` in a table (0.0 when absent)
pub(crate) fn default_of(specs: &[ParamSpec], name: &str) -> f32 {
    specs
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.default)
        .unwrap_or(0.0)
}

/// Pedal type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Overdrive,
    Fuzz,
    Delay,
    AnalogDelay,
    Chorus,
    Flanger,
    Tremolo,
    #[serde(rename = "autowah")]
    AutoWah,
    Reverb,
}

const OVERDRIVE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("drive", 0.0, 100.0, 30.0),
    ParamSpec::new("tone", 0.0, 100.0, 50.0),
    ParamSpec::new("level", 0.0, 100.0, 50.0),
];

const FUZZ_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("fuzz", 0.0, 100.0, 60.0),
    ParamSpec::new("tone", 0.0, 100.0, 50.0),
    ParamSpec::new("level", 0.0, 100.0, 50.0),
];

const DELAY_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("time", 20.0, 2000.0, 350.0),
    ParamSpec::new("feedback", 0.0, 100.0, 40.0),
    ParamSpec::new("tone", 0.0, 100.0, 60.0),
    ParamSpec::new("rate", 0.0, 100.0, 20.0),
    ParamSpec::new("depth", 0.0, 100.0, 0.0),
    ParamSpec::new("hold", 0.0, 1.0, 0.0),
];

const ANALOG_DELAY_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("time", 20.0, 600.0, 300.0),
    ParamSpec::new("feedback", 0.0, 100.0, 45.0),
    ParamSpec::new("tone", 0.0, 100.0, 50.0),
    ParamSpec::new("rate", 0.0, 100.0, 30.0),
    ParamSpec::new("depth", 0.0, 100.0, 20.0),
];

const CHORUS_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("rate", 0.0, 100.0, 30.0),
    ParamSpec::new("depth", 0.0, 100.0, 50.0),
    ParamSpec::new("tone", 0.0, 100.0, 70.0),
];

const FLANGER_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("rate", 0.0, 100.0, 20.0),
    ParamSpec::new("depth", 0.0, 100.0, 60.0),
    ParamSpec::new("feedback", 0.0, 100.0, 50.0),
    ParamSpec::new("tone", 0.0, 100.0, 80.0),
];

const TREMOLO_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("rate", 0.0, 100.0, 40.0),
    ParamSpec::new("depth", 0.0, 100.0, 50.0),
    ParamSpec::new("wave", 0.0, 3.0, 0.0),
];

const AUTOWAH_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("sensitivity", 0.0, 100.0, 50.0),
    ParamSpec::new("attack", 1.0, 200.0, 10.0),
    ParamSpec::new("release", 10.0, 2000.0, 150.0),
    ParamSpec::new("low", 100.0, 1000.0, 300.0),
    ParamSpec::new("high", 1000.0, 5000.0, 2500.0),
    ParamSpec::new("q", 0.5, 10.0, 4.0),
    ParamSpec::new("direction", 0.0, 1.0, 0.0),
];

const REVERB_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("decay", 0.0, 100.0, 50.0),
    ParamSpec::new("damping", 0.0, 100.0, 40.0),
    ParamSpec::new("predelay", 0.0, 250.0, 20.0),
    ParamSpec::new("tone", 0.0, 100.0, 60.0),
    ParamSpec::new("freeze", 0.0, 1.0, 0.0),
];

impl EffectKind {
    pub const ALL: [EffectKind; 9] = [
        EffectKind::Overdrive,
        EffectKind::Fuzz,
        EffectKind::Delay,
        EffectKind::AnalogDelay,
        EffectKind::Chorus,
        EffectKind::Flanger,
        EffectKind::Tremolo,
        EffectKind::AutoWah,
        EffectKind::Reverb,
    ];

    /// Type tag used in presets and commands
    pub fn as_str(self) -> &'static str {
        match self {
            EffectKind::Overdrive => "overdrive",
            EffectKind::Fuzz => "fuzz",
            EffectKind::Delay => "delay",
            EffectKind::AnalogDelay => "analog_delay",
            EffectKind::Chorus => "chorus",
            EffectKind::Flanger => "flanger",
            EffectKind::Tremolo => "tremolo",
            EffectKind::AutoWah => "autowah",
            EffectKind::Reverb => "reverb",
        }
    }

    /// Display name
    pub fn display_name(self) -> &'static str {
        match self {
            EffectKind::Overdrive => "Overdrive",
            EffectKind::Fuzz => "Fuzz",
            EffectKind::Delay => "Digital Delay",
            EffectKind::AnalogDelay => "Analog Delay",
            EffectKind::Chorus => "Chorus",
            EffectKind::Flanger => "Flanger",
            EffectKind::Tremolo => "Tremolo",
            EffectKind::AutoWah => "Auto-Wah",
            EffectKind::Reverb => "Reverb",
        }
    }

    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            EffectKind::Overdrive => OVERDRIVE_PARAMS,
            EffectKind::Fuzz => FUZZ_PARAMS,
            EffectKind::Delay => DELAY_PARAMS,
            EffectKind::AnalogDelay => ANALOG_DELAY_PARAMS,
            EffectKind::Chorus => CHORUS_PARAMS,
            EffectKind::Flanger => FLANGER_PARAMS,
            EffectKind::Tremolo => TREMOLO_PARAMS,
            EffectKind::AutoWah => AUTOWAH_PARAMS,
            EffectKind::Reverb => REVERB_PARAMS,
        }
    }

    /// Look up a knob by name
    pub fn param(self, name: &str) -> Option<&'static ParamSpec> {
        self.params().iter().find(|p| p.name == name)
    }

    /// Wet/dry mix a freshly added node starts at
    pub fn default_mix(self) -> f32 {
        match self {
            EffectKind::Delay | EffectKind::AnalogDelay => 0.4,
            EffectKind::Chorus | EffectKind::Flanger => 0.5,
            EffectKind::Reverb => 0.3,
            _ => 1.0,
        }
    }

    /// Build a processor on the control thread
    pub fn create(
        self,
        voicings: &Voicings,
        times: &SmoothingTimes,
        ctx: &AudioGraphContext,
    ) -> Result<Box<dyn EffectProcessor>> {
        let processor: Box<dyn EffectProcessor> = match self {
            EffectKind::Overdrive | EffectKind::Fuzz => {
                Box::new(Saturator::new(self, voicings, *times, ctx))
            }
            EffectKind::Delay | EffectKind::AnalogDelay => Box::new(Echo::new(self, *times, ctx)),
            EffectKind::Chorus | EffectKind::Flanger => Box::new(Modulated::new(self, *times, ctx)),
            EffectKind::Tremolo => Box::new(Tremolo::new(*times, ctx)),
            EffectKind::AutoWah => Box::new(AutoWah::new(voicings.control_rate, *times, ctx)),
            EffectKind::Reverb => Box::new(Reverb::new(voicings.reverb_voicing(), *times, ctx)?),
        };
        Ok(processor)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectKind {
    type Err = PedalError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_lowercase();
        EffectKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == tag || (tag == "auto_wah" && *k == EffectKind::AutoWah))
            .ok_or_else(|| PedalError::UnknownEffect(s.to_string()))
    }
}

/// Which reverb voicing new reverb pedals are built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReverbRoom {
    #[default]
    Hall,
    Room,
}

/// Tuning data for the pedal models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Voicings {
    /// Overdrive transfer curve
    pub overdrive: CurveRecipe,
    /// Fuzz transfer curve
    pub fuzz: CurveRecipe,
    /// Oversampling around the saturation curves
    pub oversampling: Oversampling,
    /// Envelope follower control rate in Hz
    pub control_rate: f32,
    pub reverb: ReverbRoom,
    pub hall: ReverbVoicing,
    pub room: ReverbVoicing,
}

impl Voicings {
    pub fn reverb_voicing(&self) -> &ReverbVoicing {
        match self.reverb {
            ReverbRoom::Hall => &self.hall,
            ReverbRoom::Room => &self.room,
        }
    }
}

impl Default for Voicings {
    fn default() -> Self {
        Self {
            // Tube-screamer style: tanh, mild asymmetry, a little compression
            overdrive: CurveRecipe {
                shape: BaseShape::Tanh,
                drive_range: 11.0,
                asymmetry: 0.06,
                compression: 0.08,
                ..CurveRecipe::default()
            },
            fuzz: CurveRecipe {
                shape: BaseShape::SoftKnee,
                drive_range: 40.0,
                asymmetry: 0.15,
                harmonic: 0.2,
                harmonic_ratio: 2.0,
                compression: 0.3,
                knee: 0.3,
                output_gain: 0.85,
                ..CurveRecipe::default()
            },
            oversampling: Oversampling::X4,
            control_rate: 1000.0,
            reverb: ReverbRoom::Hall,
            hall: ReverbVoicing::hall(),
            room: ReverbVoicing::room(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_tag() {
        for kind in EffectKind::ALL {
            assert_eq!(kind.as_str().parse::<EffectKind>().unwrap(), kind);
        }
        assert_eq!("Auto_Wah".parse::<EffectKind>().unwrap(), EffectKind::AutoWah);
        assert!(matches!(
            "wah-wah".parse::<EffectKind>(),
            Err(PedalError::UnknownEffect(_))
        ));
    }

    #[test]
    fn test_serde_tag_matches_display() {
        for kind in EffectKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_param_tables_are_consistent() {
        for kind in EffectKind::ALL {
            let params = kind.params();
            assert!(!params.is_empty());
            for spec in params {
                assert!(spec.min < spec.max, "{}.{}", kind, spec.name);
                assert!((spec.min..=spec.max).contains(&spec.default));
                assert_ne!(spec.name, "mix", "mix is handled by the node");
            }
        }
    }

    #[test]
    fn test_param_spec_clamp() {
        let spec = EffectKind::Delay.param("time").unwrap();
        assert_eq!(spec.clamp(5000.0), 2000.0);
        assert_eq!(spec.clamp(f32::NAN), 350.0);
        assert_eq!(spec.normalize(20.0), 0.0);
        assert!(EffectKind::Delay.param("wobble").is_none());
    }

    #[test]
    fn test_every_kind_builds() {
        let ctx = AudioGraphContext::new(48000, 128);
        let voicings = Voicings::default();
        let times = SmoothingTimes::default();
        for kind in EffectKind::ALL {
            let mut fx = kind.create(&voicings, &times, &ctx).unwrap();
            assert_eq!(fx.kind(), kind);
            let input = vec![0.25; 128];
            let mut output = vec![0.0; 128];
            fx.process(&input, &mut output, &ctx);
            assert!(output.iter().all(|s| s.is_finite()), "{}", kind);
        }
    }

    #[test]
    fn test_bad_reverb_voicing_is_reported() {
        let ctx = AudioGraphContext::new(48000, 128);
        let mut voicings = Voicings::default();
        voicings.hall.comb_times.clear();
        let result = EffectKind::Reverb.create(&voicings, &SmoothingTimes::default(), &ctx);
        assert!(matches!(result, Err(PedalError::Configuration { .. })));
    }

    #[test]
    fn test_voicings_partial_override() {
        let voicings: Voicings =
            serde_json::from_str(r#"{"reverb": "room", "control_rate": 500.0}"#).unwrap();
        assert_eq!(voicings.reverb, ReverbRoom::Room);
        assert_eq!(voicings.reverb_voicing(), &ReverbVoicing::room());
        assert_eq!(voicings.oversampling, Oversampling::X4);
    }
}
