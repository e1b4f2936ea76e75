pub mod dispatcher;
pub mod experiment;
pub mod heuristics;
pub mod pipeline;
pub mod policy;

pub use pipeline::{score_email, RiskEngine, ScoreOutcome};
