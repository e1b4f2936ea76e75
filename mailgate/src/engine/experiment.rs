// mailgate/src/engine/experiment.rs
//
// Deterministic A/B bucketing.
//
//   bucket  = u64::from_be_bytes(sha256(fingerprint)[0..8]) % 100
//   variant = control if bucket < control weight, else treatment
//
// Assignment is a pure function of the fingerprint, so the same client lands
// in the same variant on every request and on every node. Only the treatment
// arm carries config overrides; control always scores with the base config.
// An override that fails validation after merging is dropped with a warning
// and the base config is used instead.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::{ConfigOverride, ScoringConfig};
use crate::error::ConfigError;
use crate::events::{Assignment, RequestContext, Variant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSplit {
    /// Percentage of buckets assigned to control.
    pub control: u8,
    pub treatment: u8,
    #[serde(default)]
    pub config_overrides: ConfigOverride,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    pub id: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub variants: VariantSplit,
}

fn enabled_by_default() -> bool {
    true
}

impl ExperimentConfig {
    /// `enabled && start <= now < end`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.start_date <= now && now < self.end_date
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason: &str| ConfigError::InvalidExperiment {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(fail("id must not be empty"));
        }
        if self.variants.control as u16 + self.variants.treatment as u16 != 100 {
            return Err(fail("variant weights must sum to 100"));
        }
        if self.start_date >= self.end_date {
            return Err(fail("startDate must precede endDate"));
        }
        Ok(())
    }

    pub fn assign(&self, fingerprint: &str) -> Assignment {
        let bucket = bucket_for(fingerprint);
        let variant = if bucket < self.variants.control { Variant::Control } else { Variant::Treatment };
        Assignment { experiment_id: self.id.clone(), variant, bucket }
    }
}

pub fn bucket_for(fingerprint: &str) -> u8 {
    let digest = Sha256::digest(fingerprint.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % 100) as u8
}

/// Host-supplied fingerprint if present, otherwise
/// `hex(sha256(ip|user_agent|accept_language|ip_country)[..16])`.
pub fn fingerprint(ctx: &RequestContext) -> String {
    if let Some(fp) = ctx.fingerprint.as_deref().filter(|f| !f.trim().is_empty()) {
        return fp.to_string();
    }
    let ip = ctx.ip_address.map(|ip| ip.to_string()).unwrap_or_default();
    let material = format!(
        "{}|{}|{}|{}",
        ip,
        ctx.user_agent.as_deref().unwrap_or(""),
        ctx.accept_language.as_deref().unwrap_or(""),
        ctx.ip_country.as_deref().unwrap_or(""),
    );
    hex::encode(&Sha256::digest(material.as_bytes())[..16])
}

/// First active experiment in declaration order.
pub fn select(experiments: &[ExperimentConfig], now: DateTime<Utc>) -> Option<&ExperimentConfig> {
    experiments.iter().find(|e| e.is_active(now))
}

pub fn variant_config<'a>(
    base: &'a ScoringConfig,
    experiment: &ExperimentConfig,
    variant: Variant,
) -> Cow<'a, ScoringConfig> {
    if variant == Variant::Control {
        return Cow::Borrowed(base);
    }
    let merged = base.merged(&experiment.variants.config_overrides);
    match merged.validate() {
        Ok(()) => Cow::Owned(merged),
        Err(e) => {
            warn!(experiment = %experiment.id, "treatment overrides rejected, using base config: {}", e);
            Cow::Borrowed(base)
        }
    }
}

/// Effective config and assignment for one request.
pub fn resolve<'a>(
    base: &'a ScoringConfig,
    fingerprint: &str,
    now: DateTime<Utc>,
) -> (Cow<'a, ScoringConfig>, Option<Assignment>) {
    match select(&base.experiments, now) {
        Some(exp) => {
            let assignment = exp.assign(fingerprint);
            (variant_config(base, exp, assignment.variant), Some(assignment))
        }
        None => (Cow::Borrowed(base), None),
    }
}
