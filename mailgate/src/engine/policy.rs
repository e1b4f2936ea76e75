// mailgate/src/engine/policy.rs
//
// Decision state machine.
//
//   Unscored ──score / hard──▶ Scored ──adjust──▶ Adjusted ──decide──▶ Decision
//
// Each transition consumes the previous state, so a decision cannot be taken
// on an unadjusted score and heuristics cannot run twice. Hard-classifier
// outcomes (invalid format, disposable domain) pass through `adjust`
// untouched.

use crate::config::{ScoringConfig, Thresholds};
use crate::engine::heuristics::{self, HeuristicOutcome};
use crate::events::{AppliedHeuristic, Assignment, Decision, DecisionKind, ModelSource};
use crate::features::vector::FeatureVector;

/// `block if score > block; warn if score > warn; else allow`
pub fn classify(score: f64, t: &Thresholds) -> DecisionKind {
    if score > t.block {
        DecisionKind::Block
    } else if score > t.warn {
        DecisionKind::Warn
    } else {
        DecisionKind::Allow
    }
}

#[derive(Debug, Default)]
pub struct Unscored;

#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    score:  f64,
    reason: String,
    source: ModelSource,
    hard:   bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Adjusted {
    score:   f64,
    reason:  String,
    source:  ModelSource,
    applied: Vec<AppliedHeuristic>,
}

/// Terminal state.
pub type Decided = Decision;

fn bounded(score: f64) -> f64 {
    if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 }
}

impl Unscored {
    pub fn new() -> Self {
        Unscored
    }

    pub fn score(self, score: f64, reason: impl Into<String>, source: ModelSource) -> Scored {
        Scored { score: bounded(score), reason: reason.into(), source, hard: false }
    }

    /// Fixed base score from a hard classifier; heuristics will be skipped.
    pub fn hard(self, score: f64, reason: impl Into<String>) -> Scored {
        Scored { score: bounded(score), reason: reason.into(), source: ModelSource::HardRule, hard: true }
    }
}

impl Scored {
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn is_hard(&self) -> bool {
        self.hard
    }

    pub fn adjust(self, cfg: &ScoringConfig, features: &FeatureVector) -> Adjusted {
        let outcome = if self.hard {
            HeuristicOutcome::unchanged(self.score)
        } else {
            heuristics::apply(&cfg.heuristics, features, self.score, &cfg.thresholds)
        };
        let reason = outcome
            .applied
            .last()
            .map(|a| a.reason.clone())
            .unwrap_or(self.reason);
        Adjusted {
            score: bounded(outcome.score),
            reason,
            source: self.source,
            applied: outcome.applied,
        }
    }
}

impl Adjusted {
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn decide(self, cfg: &ScoringConfig, assignment: Option<Assignment>) -> Decided {
        let original = classify(self.score, &cfg.thresholds);
        Decision {
            score:              self.score,
            decision:           cfg.action_override.unwrap_or(original),
            original_decision:  original,
            reason:             self.reason,
            applied_heuristics: self.applied,
            source:             self.source,
            assignment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::heuristics::{Direction, HeuristicRule};

    fn cfg_with_rule() -> ScoringConfig {
        ScoringConfig {
            heuristics: vec![HeuristicRule {
                feature: "sequential_confidence".into(),
                threshold: 0.4,
                direction: Direction::Gte,
                target_decision: DecisionKind::Warn,
                reason: "sequential_pattern".into(),
                min_score_offset: 0.01,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn classification_is_strict() {
        let t = Thresholds { warn: 0.5, block: 0.8 };
        assert_eq!(classify(0.5, &t), DecisionKind::Allow);
        assert_eq!(classify(0.50001, &t), DecisionKind::Warn);
        assert_eq!(classify(0.8, &t), DecisionKind::Warn);
        assert_eq!(classify(0.81, &t), DecisionKind::Block);
    }

    #[test]
    fn full_walk_with_heuristic() {
        let cfg = cfg_with_rule();
        let fv = FeatureVector::with_values([("sequential_confidence", 0.75)]);
        let d = Unscored::new()
            .score(0.2, "tree_leaf", ModelSource::Tree { version: "1".into() })
            .adjust(&cfg, &fv)
            .decide(&cfg, None);
        assert_eq!(d.decision, DecisionKind::Warn);
        assert_eq!(d.reason, "sequential_pattern");
        assert_eq!(d.applied_heuristics.len(), 1);
        assert!(!d.is_overridden());
    }

    #[test]
    fn hard_outcomes_skip_heuristics() {
        let cfg = cfg_with_rule();
        let fv = FeatureVector::with_values([("sequential_confidence", 1.0)]);
        let adjusted = Unscored::new().hard(0.9, "invalid_format").adjust(&cfg, &fv);
        assert_eq!(adjusted.score(), 0.9);
        let d = adjusted.decide(&cfg, None);
        assert_eq!(d.decision, DecisionKind::Block);
        assert!(d.applied_heuristics.is_empty());
        assert_eq!(d.source, ModelSource::HardRule);
    }

    #[test]
    fn action_override_keeps_original() {
        let cfg = ScoringConfig { action_override: Some(DecisionKind::Allow), ..Default::default() };
        let d = Unscored::new()
            .score(0.99, "forest", ModelSource::Unavailable)
            .adjust(&cfg, &FeatureVector::defaults())
            .decide(&cfg, None);
        assert_eq!(d.decision, DecisionKind::Allow);
        assert_eq!(d.original_decision, DecisionKind::Block);
        assert!(d.is_overridden());
    }

    #[test]
    fn non_finite_scores_are_bounded() {
        let s = Unscored::new().score(f64::NAN, "x", ModelSource::Unavailable);
        assert_eq!(s.score(), 0.0);
        let s = Unscored::new().score(3.0, "x", ModelSource::Unavailable);
        assert_eq!(s.score(), 1.0);
    }
}
