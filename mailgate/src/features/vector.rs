// mailgate/src/features/vector.rs
//
// Feature vector builder: the single sanitization choke point between the
// analyzers / collaborators and the model.
//
// Every schema entry declares a name, an inclusive [min, max] range and the
// value used when its upstream signal is missing. `build` walks the schema in
// order and, per entry:
//   1. takes the upstream value if the signal is present,
//   2. substitutes the default otherwise (or if the value is NaN / ±inf),
//   3. clamps to range.
// The resulting vector is total, finite and bounded, whatever went in.
//
// Model artifacts reference features by these names; renaming an entry
// invalidates every exported tree.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use crate::email::ParsedEmail;
use crate::events::{DomainInfo, GeoMatch, IdentityMatch, MxInfo};
use crate::sequence::OodAssessment;
use crate::workers::LocalPartSignals;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

const fn feat(name: &'static str, min: f64, max: f64, default: f64) -> FeatureSpec {
    FeatureSpec { name, min, max, default }
}

const fn ratio(name: &'static str) -> FeatureSpec {
    feat(name, 0.0, 1.0, 0.0)
}

const fn flag(name: &'static str) -> FeatureSpec {
    feat(name, 0.0, 1.0, 0.0)
}

pub const FEATURE_COUNT: usize = 48;

pub static SCHEMA: [FeatureSpec; FEATURE_COUNT] = [
    // ── Local-part structure ──────────────────────────────────────────────────
    feat("local_length", 0.0, 64.0, 0.0),
    ratio("digit_ratio"),
    ratio("letter_ratio"),
    ratio("special_ratio"),
    ratio("unique_char_ratio"),
    ratio("vowel_ratio"),
    ratio("vowel_gap_ratio"),
    feat("max_digit_run", 0.0, 64.0, 0.0),
    feat("max_consonant_run", 0.0, 64.0, 0.0),
    feat("segment_count", 0.0, 32.0, 0.0),
    feat("avg_segment_length", 0.0, 64.0, 0.0),
    feat("segment_boundaries", 0.0, 64.0, 0.0),
    feat("shannon_entropy", 0.0, 8.0, 0.0),
    feat("bigram_entropy", 0.0, 12.0, 0.0),
    ratio("repeated_char_ratio"),
    ratio("keyboard_walk_ratio"),
    // ── Naturalness ───────────────────────────────────────────────────────────
    ratio("bigram_hit_rate"),
    ratio("trigram_hit_rate"),
    ratio("naturalness_score"),
    ratio("naturalness_confidence"),
    ratio("gibberish_risk"),
    // ── Sequential / dated ────────────────────────────────────────────────────
    ratio("sequential_confidence"),
    feat("trailing_digit_count", 0.0, 64.0, 0.0),
    flag("has_leading_zeros"),
    flag("is_monotonic"),
    ratio("dated_confidence"),
    flag("has_year"),
    // ── Character-model OOD ───────────────────────────────────────────────────
    feat("legit_entropy", 0.0, 16.0, 0.0),
    feat("fraud_entropy", 0.0, 16.0, 0.0),
    feat("min_entropy", 0.0, 16.0, 0.0),
    ratio("ood_risk"),
    feat("p_fraud", 0.0, 1.0, 0.5),
    // ── Address shape ─────────────────────────────────────────────────────────
    flag("has_plus_tag"),
    feat("domain_length", 0.0, 253.0, 0.0),
    feat("subdomain_depth", 0.0, 16.0, 0.0),
    // ── Domain reputation ─────────────────────────────────────────────────────
    flag("is_free_provider"),
    flag("is_disposable"),
    ratio("domain_reputation"),
    ratio("tld_risk"),
    // ── MX ────────────────────────────────────────────────────────────────────
    feat("mx_record_count", 0.0, 32.0, 0.0),
    flag("mx_missing"),
    flag("mx_known_provider"),
    // ── Identity / geo ────────────────────────────────────────────────────────
    ratio("name_similarity"),
    ratio("name_token_overlap"),
    flag("name_in_email"),
    flag("language_mismatch"),
    flag("timezone_mismatch"),
    ratio("geo_anomaly"),
];

fn index() -> &'static HashMap<&'static str, usize> {
    static INDEX: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    INDEX.get_or_init(|| SCHEMA.iter().enumerate().map(|(i, s)| (s.name, i)).collect())
}

pub fn index_of(name: &str) -> Option<usize> {
    index().get(name).copied()
}

/// Upstream signals. `None` means the signal is unavailable for this request.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureInputs<'a> {
    pub email: Option<&'a ParsedEmail>,
    pub signals: Option<&'a LocalPartSignals>,
    pub ood: Option<&'a OodAssessment>,
    pub domain: Option<&'a DomainInfo>,
    pub mx: Option<&'a MxInfo>,
    pub identity: Option<&'a IdentityMatch>,
    pub geo: Option<&'a GeoMatch>,
}

fn b(v: bool) -> f64 {
    if v { 1.0 } else { 0.0 }
}

fn raw_value(name: &str, i: &FeatureInputs<'_>) -> Option<f64> {
    let st = i.signals.map(|s| &s.structure);
    let nat = i.signals.map(|s| &s.naturalness);
    let seq = i.signals.map(|s| &s.sequential);
    let dated = i.signals.map(|s| &s.dated);

    match name {
        "local_length" => st.map(|s| s.length as f64),
        "digit_ratio" => st.map(|s| s.digit_ratio),
        "letter_ratio" => st.map(|s| s.letter_ratio),
        "special_ratio" => st.map(|s| s.special_ratio),
        "unique_char_ratio" => st.map(|s| s.unique_char_ratio),
        "vowel_ratio" => st.map(|s| s.vowel_ratio),
        "vowel_gap_ratio" => st.map(|s| s.vowel_gap_ratio),
        "max_digit_run" => st.map(|s| s.max_digit_run as f64),
        "max_consonant_run" => st.map(|s| s.max_consonant_run as f64),
        "segment_count" => st.map(|s| s.segment_count as f64),
        "avg_segment_length" => st.map(|s| s.avg_segment_length),
        "segment_boundaries" => st.map(|s| s.segment_boundaries as f64),
        "shannon_entropy" => st.map(|s| s.shannon_entropy),
        "bigram_entropy" => st.map(|s| s.bigram_entropy),
        "repeated_char_ratio" => st.map(|s| s.repeated_char_ratio),
        "keyboard_walk_ratio" => st.map(|s| s.keyboard_walk_ratio),

        "bigram_hit_rate" => nat.map(|n| n.bigram_hit_rate),
        "trigram_hit_rate" => nat.map(|n| n.trigram_hit_rate),
        "naturalness_score" => nat.map(|n| n.score),
        "naturalness_confidence" => nat.map(|n| n.confidence),
        "gibberish_risk" => nat.map(|n| n.gibberish_risk),

        "sequential_confidence" => seq.map(|s| s.confidence),
        "trailing_digit_count" => seq.map(|s| s.trailing_digit_count() as f64),
        "has_leading_zeros" => seq.map(|s| b(s.has_leading_zeros)),
        "is_monotonic" => seq.map(|s| b(s.is_monotonic)),
        "dated_confidence" => dated.map(|d| d.confidence),
        "has_year" => dated.map(|d| b(d.year.is_some())),

        "legit_entropy" => i.ood.map(|o| o.legit_entropy),
        "fraud_entropy" => i.ood.map(|o| o.fraud_entropy),
        "min_entropy" => i.ood.map(|o| o.min_entropy),
        "ood_risk" => i.ood.map(|o| o.risk),
        "p_fraud" => i.ood.map(|o| o.p_fraud),

        "has_plus_tag" => i.email.map(|e| b(e.plus_tag.is_some())),
        "domain_length" => i.email.map(|e| e.domain.len() as f64),
        "subdomain_depth" => i.email.map(|e| e.subdomain_depth() as f64),

        "is_free_provider" => i.domain.map(|d| b(d.is_free_provider)),
        "is_disposable" => i.domain.map(|d| b(d.is_disposable)),
        "domain_reputation" => i.domain.map(|d| d.reputation_score),
        "tld_risk" => i.domain.map(|d| d.tld_risk_score),

        "mx_record_count" => i.mx.map(|m| m.records.len() as f64),
        "mx_missing" => i.mx.map(|m| b(m.records.is_empty())),
        "mx_known_provider" => i.mx.map(|m| b(m.provider.is_some())),

        "name_similarity" => i.identity.map(|m| m.similarity),
        "name_token_overlap" => i.identity.map(|m| m.token_overlap),
        "name_in_email" => i.identity.map(|m| b(m.name_in_email)),
        "language_mismatch" => i.geo.map(|g| b(g.language_mismatch)),
        "timezone_mismatch" => i.geo.map(|g| b(g.timezone_mismatch)),
        "geo_anomaly" => i.geo.map(|g| g.anomaly_score),

        _ => None,
    }
}

fn sanitize(spec: &FeatureSpec, raw: Option<f64>) -> f64 {
    match raw {
        Some(v) if v.is_finite() => v.clamp(spec.min, spec.max),
        _ => spec.default,
    }
}

/// Fixed-schema, bounded feature vector. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Every feature at its documented default.
    pub fn defaults() -> Self {
        let mut values = [0.0; FEATURE_COUNT];
        for (v, s) in values.iter_mut().zip(SCHEMA.iter()) {
            *v = s.default;
        }
        Self { values }
    }

    /// Defaults with selected features replaced, sanitized like `build`.
    /// Unknown names are ignored.
    pub fn with_values<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let mut fv = Self::defaults();
        for (name, v) in pairs {
            if let Some(i) = index_of(name) {
                fv.values[i] = sanitize(&SCHEMA[i], Some(v));
            }
        }
        fv
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        index_of(name).map(|i| self.values[i])
    }

    /// Lookup by schema position. Panics on out-of-range index, which tree
    /// loading rules out by resolving names once.
    pub fn at(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        SCHEMA.iter().zip(self.values.iter()).map(|(s, v)| (s.name, *v))
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

pub fn build(inputs: &FeatureInputs<'_>) -> FeatureVector {
    let mut values = [0.0; FEATURE_COUNT];
    for (v, spec) in values.iter_mut().zip(SCHEMA.iter()) {
        *v = sanitize(spec, raw_value(spec.name, inputs));
    }
    FeatureVector { values }
}
