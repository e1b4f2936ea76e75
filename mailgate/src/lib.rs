// mailgate/src/lib.rs
//
// mailgate: inline signup-fraud risk scoring for email addresses.
//
// Layers, leaves first:
//   sequence   character n-gram models + OOD detection
//   workers    local-part analyzers (structure, naturalness, sequential, dated)
//   features   fixed-schema, bounded feature vector
//   model      decision tree / forest evaluation
//   engine     heuristics, experiments, decision policy, pipeline, JSONL sink
//
// `engine::score_email` is the pure entry point; `engine::RiskEngine` adds
// bounded lookups through the collaborator traits in `collab`.

pub mod collab;
pub mod config;
pub mod email;
pub mod engine;
pub mod error;
pub mod events;
pub mod features;
pub mod model;
pub mod sequence;
pub mod state;
pub mod workers;

pub use config::ScoringConfig;
pub use engine::{score_email, RiskEngine, ScoreOutcome};
pub use error::{ArtifactError, ConfigError, InputError};
pub use events::{Decision, DecisionKind, MetricsRecord, RequestContext, SignupRequest};
pub use state::cache::{ArtifactCache, ArtifactSnapshot};
