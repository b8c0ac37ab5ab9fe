//! Saved pedalboards: effect types with their ordered knob values

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::AudioGraphContext;
use crate::dsp::SmoothingTimes;
use crate::effects::{EffectKind, Voicings};
use crate::error::Result;
use crate::node::{EffectNode, NodeId};

/// One pedal in a preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub effect_type: EffectKind,
    /// Knob values in declaration order
    #[serde(default)]
    pub params: Vec<(String, f32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix: Option<f32>,
    #[serde(default)]
    pub bypassed: bool,
}

impl PresetEntry {
    pub fn new(effect_type: EffectKind) -> Self {
        Self {
            effect_type,
            params: Vec::new(),
            mix: None,
            bypassed: false,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f32) -> Self {
        self.params.push((name.into(), value));
        self
    }

    /// Snapshot of a live node
    pub fn from_node(node: &EffectNode) -> Self {
        Self {
            effect_type: node.kind(),
            params: node
                .params()
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
            mix: Some(node.mix()),
            bypassed: node.is_bypassed(),
        }
    }

    /// Build a node with this entry's settings applied
    ///
    /// Unknown knob names are skipped; values are clamped by the node.
    pub fn build(
        &self,
        id: NodeId,
        voicings: &Voicings,
        times: SmoothingTimes,
        ctx: &AudioGraphContext,
    ) -> Result<EffectNode> {
        let mut node = EffectNode::new(id, self.effect_type, voicings, times, ctx)?
            .with_bypass(self.bypassed);
        for (name, value) in &self.params {
            if !node.update_parameter(name, *value, ctx) {
                tracing::debug!("Preset: {} has no parameter '{}'", self.effect_type, name);
            }
        }
        if let Some(mix) = self.mix {
            node = node.with_mix(mix);
        }
        Ok(node)
    }
}

/// A named chain of pedals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(default)]
    pub effects: Vec<PresetEntry>,
}

impl Preset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            effects: Vec::new(),
        }
    }

    pub fn from_nodes<'a>(
        name: impl Into<String>,
        nodes: impl IntoIterator<Item = &'a EffectNode>,
    ) -> Self {
        Self {
            name: name.into(),
            effects: nodes.into_iter().map(PresetEntry::from_node).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        tracing::info!("Saved preset '{}' to {:?}", self.name, path);
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let preset = Self::from_json(&json)?;
        tracing::info!(
            "Loaded preset '{}' with {} effects from {:?}",
            preset.name,
            preset.effects.len(),
            path
        );
        Ok(preset)
    }
}
