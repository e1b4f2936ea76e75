// mailgate/src/error.rs
//
// Error taxonomy. None of these cross the `score_email` boundary:
//   InputError    → short-circuited to a fixed high base score
//   ArtifactError → logged, next model tier or prior artifact used
//   ConfigError   → rejected at load time, prior valid config kept

use thiserror::Error;

/// Malformed email address. Mapped to the `invalid_format` hard score.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("address is empty")]
    Empty,
    #[error("address has no '@' separator")]
    MissingAt,
    #[error("local part is empty")]
    EmptyLocalPart,
    #[error("domain is empty")]
    EmptyDomain,
    #[error("local part exceeds {max} characters")]
    LocalPartTooLong { max: usize },
    #[error("address exceeds {max} characters")]
    TooLong { max: usize },
    #[error("invalid domain: {0}")]
    InvalidDomain(String),
    #[error("invalid character {ch:?} in local part")]
    InvalidLocalChar { ch: char },
}

/// Corrupt or incompatible model artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown node type {kind:?} at {path}")]
    UnknownNodeType { kind: String, path: String },
    #[error("missing field {field:?} at {path}")]
    MissingField { field: &'static str, path: String },
    #[error("node at {path} is not an object")]
    NotAnObject { path: String },
    #[error("unknown feature {name:?} at {path}")]
    UnknownFeature { name: String, path: String },
    #[error("non-finite threshold at {path}")]
    InvalidThreshold { path: String },
    #[error("leaf score {score} outside [0,1] at {path}")]
    InvalidScore { score: f64, path: String },
    #[error("unsupported split operator {op:?} at {path}")]
    UnsupportedOperator { op: String, path: String },
    #[error("tree deeper than {max} levels")]
    TooDeep { max: usize },
    #[error("forest contains no trees")]
    EmptyForest,
    #[error("forest has {trees} trees but {weights} weights")]
    WeightMismatch { trees: usize, weights: usize },
    #[error("tree weight {index} is negative or non-finite")]
    InvalidWeight { index: usize },
    #[error("unknown aggregation rule {0:?}")]
    UnknownAggregation(String),
    #[error("unsupported calibration method {0:?}")]
    UnknownCalibration(String),
    #[error("unrecognised artifact layout")]
    UnknownLayout,
    #[error("unsupported n-gram order {0} (expected 2 or 3)")]
    InvalidOrder(usize),
    #[error("context {context:?} has {len} chars, expected {expected}")]
    InvalidContext { context: String, len: usize, expected: usize },
    #[error("next-character key {0:?} is not a single character")]
    InvalidNextChar(String),
    #[error("artifact not found: {0}")]
    NotFound(String),
}

impl ArtifactError {
    /// Re-roots a node path (`$.left...`) under `root`, e.g. `forest[2]`.
    pub fn rooted_at(self, root: &str) -> Self {
        let rebase = |path: String| format!("{}{}", root, path.trim_start_matches('$'));
        match self {
            Self::UnknownNodeType { kind, path } => Self::UnknownNodeType { kind, path: rebase(path) },
            Self::MissingField { field, path } => Self::MissingField { field, path: rebase(path) },
            Self::NotAnObject { path } => Self::NotAnObject { path: rebase(path) },
            Self::UnknownFeature { name, path } => Self::UnknownFeature { name, path: rebase(path) },
            Self::InvalidThreshold { path } => Self::InvalidThreshold { path: rebase(path) },
            Self::InvalidScore { score, path } => Self::InvalidScore { score, path: rebase(path) },
            Self::UnsupportedOperator { op, path } => Self::UnsupportedOperator { op, path: rebase(path) },
            other => other,
        }
    }
}

/// Rejected configuration. The caller keeps its prior valid config.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("thresholds must satisfy 0 <= warn < block <= 1 (warn={warn}, block={block})")]
    InvalidThresholds { warn: f64, block: f64 },
    #[error("ood config must satisfy low < high and 0 <= floor <= ceiling <= 1")]
    InvalidOod,
    #[error("n-gram order {0} not supported (expected 2 or 3)")]
    InvalidOrder(usize),
    #[error("hard score {name} = {value} outside [0,1]")]
    InvalidHardScore { name: &'static str, value: f64 },
    #[error("heuristic rule {index}: {reason}")]
    InvalidRule { index: usize, reason: String },
    #[error("experiment {id:?}: {reason}")]
    InvalidExperiment { id: String, reason: String },
    #[error("config is not valid JSON: {0}")]
    Parse(String),
    #[error("config unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}
