// mailgate/src/events.rs
//
// Shared domain types flowing through mailgate: the inbound signup request,
// enrichment results handed in by collaborators, and the decision / metrics
// records handed back to the host.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound request ───────────────────────────────────────────────────────────

/// One signup attempt as read from the host (or a JSONL replay file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    #[serde(flatten)]
    pub context: RequestContext,
    /// Optional ground-truth label carried through replay files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub ip_country: Option<String>, // ISO-3166 alpha-2
    pub timezone_offset_minutes: Option<i32>, // client-reported UTC offset
    pub display_name: Option<String>,
    /// Stable host-supplied fingerprint; derived from the fields above if absent.
    pub fingerprint: Option<String>,
    /// Request arrival time. Drives experiment activity and year classification
    /// so that replays reproduce the original decision.
    pub received_at: DateTime<Utc>,
    pub enrichment: Enrichment,
}

impl Default for RequestContext {
    /// A request with no timestamp is taken to arrive now.
    fn default() -> Self {
        Self {
            request_id: None,
            ip_address: None,
            user_agent: None,
            accept_language: None,
            ip_country: None,
            timezone_offset_minutes: None,
            display_name: None,
            fingerprint: None,
            received_at: Utc::now(),
            enrichment: Enrichment::default(),
        }
    }
}

/// Results of the optional external lookups. Any of them may be missing
/// (lookup failed, timed out, or was never attempted).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Enrichment {
    pub domain: Option<DomainInfo>,
    pub mx: Option<MxInfo>,
    pub identity: Option<IdentityMatch>,
    pub geo: Option<GeoMatch>,
}

// ── Collaborator results ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomainInfo {
    pub is_disposable: bool,
    pub is_free_provider: bool,
    /// 0 = trusted, 1 = known-bad.
    pub reputation_score: f64,
    /// Risk attached to the TLD alone (0 = neutral).
    pub tld_risk_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MxInfo {
    pub records: Vec<String>,
    /// Recognised mailbox provider behind the MX hosts, if any.
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityMatch {
    pub similarity: f64,
    pub token_overlap: f64,
    pub name_in_email: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeoMatch {
    pub language_mismatch: bool,
    pub timezone_mismatch: bool,
    pub anomaly_score: f64,
}

// ── Decision types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Allow,
    Warn,
    Block,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Warn => write!(f, "warn"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// Which tier produced the base score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSource {
    Forest { version: String },
    Tree { version: String },
    Unavailable,
    /// Hard classifier (invalid format, disposable domain): model bypassed.
    HardRule,
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forest { version } => write!(f, "forest@{}", version),
            Self::Tree { version } => write!(f, "tree@{}", version),
            Self::Unavailable => write!(f, "unavailable"),
            Self::HardRule => write!(f, "hard_rule"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedHeuristic {
    pub feature: String,
    pub value: f64,
    pub threshold: f64,
    pub target: DecisionKind,
    pub reason: String,
    pub score_before: f64,
    pub score_after: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Control,
    Treatment,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Treatment => write!(f, "treatment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub experiment_id: String,
    pub variant: Variant,
    pub bucket: u8, // 0..=99
}

/// Terminal output of the decision state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub score: f64,
    pub decision: DecisionKind,
    pub original_decision: DecisionKind,
    pub reason: String,
    pub applied_heuristics: Vec<AppliedHeuristic>,
    pub source: ModelSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
}

impl Decision {
    pub fn is_overridden(&self) -> bool {
        self.decision != self.original_decision
    }
}

/// Record handed to an external metrics sink. The core only builds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<String>,
    pub fingerprint: String,
    pub decision: DecisionKind,
    pub original_decision: DecisionKind,
    pub score: f64,
    pub reason: String,
    pub source: ModelSource,
    pub heuristics: Vec<String>,
    pub features: BTreeMap<String, f64>,
    pub assignment: Option<Assignment>,
    pub mx_from_cache: bool,
    pub mx_timed_out: bool,
    /// Wall-clock pipeline latency; set by `RiskEngine`, absent for pure calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_us: Option<u64>,
}

impl MetricsRecord {
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
