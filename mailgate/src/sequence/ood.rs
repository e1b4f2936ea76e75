// mailgate/src/sequence/ood.rs
//
// Out-of-distribution detection over the local part.
//
// Two character models are queried: one trained on legitimate local parts,
// one on known-fraud local parts. A sample that is surprising to *both*
// (the minimum cross-entropy is high) is unlike anything seen in training;
// that is the abnormality signal. The risk curve is piecewise:
//
//   min_entropy <= low          → 0            (dead zone)
//   low < min_entropy < high    → floor..ceiling, linear   (ramp)
//   min_entropy >= high         → ceiling      (capped)
//
// The ceiling stays well below 1: OOD alone never produces a block.

use std::sync::Arc;

use serde::Serialize;

use super::model::CharSequenceModel;
use crate::config::OodConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OodZone {
    DeadZone,
    Ramp,
    Capped,
}

impl std::fmt::Display for OodZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeadZone => write!(f, "dead_zone"),
            Self::Ramp => write!(f, "ramp"),
            Self::Capped => write!(f, "capped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OodAssessment {
    pub legit_entropy: f64,
    pub fraud_entropy: f64,
    pub min_entropy: f64,
    pub risk: f64,
    pub zone: OodZone,
    /// Relative likelihood that the fraud model explains the sample better.
    pub p_fraud: f64,
}

/// Piecewise abnormality risk for a minimum cross-entropy.
pub fn risk_for_entropy(entropy: f64, cfg: &OodConfig) -> (f64, OodZone) {
    if !entropy.is_finite() || entropy <= cfg.low_entropy {
        (0.0, OodZone::DeadZone)
    } else if entropy >= cfg.high_entropy {
        (cfg.ceiling, OodZone::Capped)
    } else {
        let t = (entropy - cfg.low_entropy) / (cfg.high_entropy - cfg.low_entropy);
        (cfg.floor + t * (cfg.ceiling - cfg.floor), OodZone::Ramp)
    }
}

#[derive(Debug, Clone)]
pub struct OodDetector {
    legit: Arc<CharSequenceModel>,
    fraud: Arc<CharSequenceModel>,
}

impl OodDetector {
    pub fn new(legit: Arc<CharSequenceModel>, fraud: Arc<CharSequenceModel>) -> Self {
        Self { legit, fraud }
    }

    pub fn legit(&self) -> &CharSequenceModel {
        &self.legit
    }

    pub fn fraud(&self) -> &CharSequenceModel {
        &self.fraud
    }

    pub fn assess(&self, local: &str, cfg: &OodConfig) -> OodAssessment {
        let legit_entropy = self.legit.cross_entropy(local);
        let fraud_entropy = self.fraud.cross_entropy(local);
        let min_entropy = legit_entropy.min(fraud_entropy);
        let (risk, zone) = risk_for_entropy(min_entropy, cfg);

        // 2^(Hf - Hl) overflows to inf for extreme gaps; 1/(1+inf) = 0 is fine.
        let p_fraud = 1.0 / (1.0 + (fraud_entropy - legit_entropy).exp2());

        OodAssessment {
            legit_entropy,
            fraud_entropy,
            min_entropy,
            risk,
            zone,
            p_fraud: if p_fraud.is_finite() { p_fraud } else { 0.5 },
        }
    }
}
