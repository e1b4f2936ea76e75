// mailgate/src/config.rs
//
// Scoring configuration.
//
// A `ScoringConfig` is a complete, validated configuration. Files may be
// partial: every struct is `#[serde(default)]`, so missing keys take the
// built-in defaults below. Experiments carry `ConfigOverride`s, partial
// mirrors of the config whose `Some` fields replace the base value on merge.
// A merged config is always re-validated before use.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::experiment::ExperimentConfig;
use crate::engine::heuristics::HeuristicRule;
use crate::error::ConfigError;
use crate::events::DecisionKind;

// ── Sections ──────────────────────────────────────────────────────────────────

/// Decision boundaries. `block if score > block; warn if score > warn`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    pub warn: f64,
    pub block: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { warn: 0.5, block: 0.8 }
    }
}

impl Thresholds {
    /// Score at which `target` starts to apply.
    pub fn baseline(&self, target: DecisionKind) -> f64 {
        match target {
            DecisionKind::Allow => 0.0,
            DecisionKind::Warn => self.warn,
            DecisionKind::Block => self.block,
        }
    }
}

/// Character-model OOD settings. Entropies are in bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OodConfig {
    pub enabled: bool,
    pub low_entropy: f64,
    pub high_entropy: f64,
    pub floor: f64,
    pub ceiling: f64,
    /// Raise the model score to the OOD risk when the latter is higher.
    pub apply_as_floor: bool,
}

impl Default for OodConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            low_entropy: 3.8,
            high_entropy: 5.5,
            floor: 0.35,
            ceiling: 0.65,
            apply_as_floor: true,
        }
    }
}

/// Fixed base scores for hard-classifier outcomes (model bypassed).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardScores {
    pub invalid_format: f64,
    pub disposable_domain: f64,
}

impl Default for HardScores {
    fn default() -> Self {
        Self { invalid_format: 0.90, disposable_domain: 0.95 }
    }
}

/// Artifact keys handed to the `ModelStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactNames {
    pub forest: String,
    pub tree: String,
    pub legit_model: String,
    pub fraud_model: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            forest: "forest.json".into(),
            tree: "tree.json".into(),
            legit_model: "legit_model.json".into(),
            fraud_model: "fraud_model.json".into(),
        }
    }
}

// ── Root ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfig {
    pub thresholds: Thresholds,
    /// Replaces the computed decision; the computed one is kept as
    /// `original_decision`.
    pub action_override: Option<DecisionKind>,
    pub ood: OodConfig,
    /// n-gram order of the character models (2 or 3).
    pub ngram_order: usize,
    pub hard_scores: HardScores,
    pub heuristics: Vec<HeuristicRule>,
    pub experiments: Vec<ExperimentConfig>,
    pub artifacts: ArtifactNames,
    pub mx_timeout_ms: u64,
    pub artifact_ttl_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            action_override: None,
            ood: OodConfig::default(),
            ngram_order: 2,
            hard_scores: HardScores::default(),
            heuristics: Vec::new(),
            experiments: Vec::new(),
            artifacts: ArtifactNames::default(),
            mx_timeout_ms: 25,
            artifact_ttl_secs: 300,
        }
    }
}

impl ScoringConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_slice(bytes)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| ConfigError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&bytes)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !(in_unit(t.warn) && in_unit(t.block) && t.warn < t.block) {
            return Err(ConfigError::InvalidThresholds { warn: t.warn, block: t.block });
        }

        let o = &self.ood;
        let finite = [o.low_entropy, o.high_entropy].iter().all(|v| v.is_finite());
        if !(finite && o.low_entropy < o.high_entropy
            && in_unit(o.floor) && in_unit(o.ceiling) && o.floor <= o.ceiling)
        {
            return Err(ConfigError::InvalidOod);
        }

        if !(2..=3).contains(&self.ngram_order) {
            return Err(ConfigError::InvalidOrder(self.ngram_order));
        }

        for (name, value) in [
            ("invalidFormat", self.hard_scores.invalid_format),
            ("disposableDomain", self.hard_scores.disposable_domain),
        ] {
            if !in_unit(value) {
                return Err(ConfigError::InvalidHardScore { name, value });
            }
        }

        for (index, rule) in self.heuristics.iter().enumerate() {
            rule.validate()
                .map_err(|reason| ConfigError::InvalidRule { index, reason })?;
        }

        for exp in &self.experiments {
            exp.validate()?;
        }
        Ok(())
    }

    /// Apply a partial override. The result is not validated.
    pub fn merged(&self, o: &ConfigOverride) -> ScoringConfig {
        let mut out = self.clone();
        if let Some(t) = &o.thresholds {
            out.thresholds.warn = t.warn.unwrap_or(out.thresholds.warn);
            out.thresholds.block = t.block.unwrap_or(out.thresholds.block);
        }
        if o.action_override.is_some() {
            out.action_override = o.action_override;
        }
        if let Some(ood) = &o.ood {
            let d = &mut out.ood;
            d.enabled = ood.enabled.unwrap_or(d.enabled);
            d.low_entropy = ood.low_entropy.unwrap_or(d.low_entropy);
            d.high_entropy = ood.high_entropy.unwrap_or(d.high_entropy);
            d.floor = ood.floor.unwrap_or(d.floor);
            d.ceiling = ood.ceiling.unwrap_or(d.ceiling);
            d.apply_as_floor = ood.apply_as_floor.unwrap_or(d.apply_as_floor);
        }
        if let Some(h) = &o.hard_scores {
            out.hard_scores.invalid_format = h.invalid_format.unwrap_or(out.hard_scores.invalid_format);
            out.hard_scores.disposable_domain =
                h.disposable_domain.unwrap_or(out.hard_scores.disposable_domain);
        }
        if let Some(rules) = &o.heuristics {
            out.heuristics = rules.clone();
        }
        if let Some(ms) = o.mx_timeout_ms {
            out.mx_timeout_ms = ms;
        }
        out
    }
}

// ── Partial overrides ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThresholdsOverride {
    pub warn: Option<f64>,
    pub block: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OodOverride {
    pub enabled: Option<bool>,
    pub low_entropy: Option<f64>,
    pub high_entropy: Option<f64>,
    pub floor: Option<f64>,
    pub ceiling: Option<f64>,
    pub apply_as_floor: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardScoresOverride {
    pub invalid_format: Option<f64>,
    pub disposable_domain: Option<f64>,
}

/// Partial `ScoringConfig`. Heuristic rules replace the base list wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverride {
    pub thresholds: Option<ThresholdsOverride>,
    pub action_override: Option<DecisionKind>,
    pub ood: Option<OodOverride>,
    pub hard_scores: Option<HardScoresOverride>,
    pub heuristics: Option<Vec<HeuristicRule>>,
    pub mx_timeout_ms: Option<u64>,
}
