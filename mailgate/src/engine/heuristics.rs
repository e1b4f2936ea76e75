// mailgate/src/engine/heuristics.rs
//
// Declarative heuristic overrides.
//
// Rules are data (config), grouped by feature in declaration order. For each
// feature the first matching rule wins; later rules on the same feature are
// not consulted. A matching rule pulls the score up to
//
//     target = min(1, baseline(targetDecision) + minScoreOffset)
//
// where baseline(warn) = warn threshold, baseline(block) = block threshold.
// Because the offset is strictly positive, the raised score lands strictly
// above the threshold and the policy's `>` comparison picks the target tier.
// Scores are only ever raised.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Thresholds;
use crate::events::{AppliedHeuristic, DecisionKind};
use crate::features::vector::{index_of, FeatureVector};

pub const MAX_OFFSET: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeuristicRule {
    pub feature:          String,
    pub threshold:        f64,
    pub direction:        Direction,
    pub target_decision:  DecisionKind,
    pub reason:           String,
    pub min_score_offset: f64,
}

impl HeuristicRule {
    pub fn matches(&self, value: f64) -> bool {
        match self.direction {
            Direction::Gte => value >= self.threshold,
            Direction::Lte => value <= self.threshold,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if index_of(&self.feature).is_none() {
            return Err(format!("unknown feature {:?}", self.feature));
        }
        if !self.threshold.is_finite() {
            return Err("threshold must be finite".into());
        }
        if !(self.min_score_offset > 0.0 && self.min_score_offset <= MAX_OFFSET) {
            return Err(format!("minScoreOffset {} outside (0, {}]", self.min_score_offset, MAX_OFFSET));
        }
        if self.target_decision == DecisionKind::Allow {
            return Err("targetDecision must be warn or block".into());
        }
        if self.reason.trim().is_empty() {
            return Err("reason must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicOutcome {
    pub score:   f64,
    pub applied: Vec<AppliedHeuristic>,
}

impl HeuristicOutcome {
    pub fn unchanged(score: f64) -> Self {
        Self { score, applied: Vec::new() }
    }
}

pub fn apply(
    rules:      &[HeuristicRule],
    features:   &FeatureVector,
    score:      f64,
    thresholds: &Thresholds,
) -> HeuristicOutcome {
    let mut current = score;
    let mut applied = Vec::new();
    let mut decided: HashSet<&str> = HashSet::new();

    for rule in rules {
        if decided.contains(rule.feature.as_str()) {
            continue;
        }
        let Some(value) = features.get(&rule.feature) else { continue };
        if !rule.matches(value) {
            continue;
        }
        decided.insert(rule.feature.as_str());

        let target = (thresholds.baseline(rule.target_decision) + rule.min_score_offset).min(1.0);
        if current < target {
            debug!(
                feature = %rule.feature, value, target,
                "heuristic {} raised score {:.4} → {:.4}", rule.reason, current, target
            );
            applied.push(AppliedHeuristic {
                feature:      rule.feature.clone(),
                value,
                threshold:    rule.threshold,
                target:       rule.target_decision,
                reason:       rule.reason.clone(),
                score_before: current,
                score_after:  target,
            });
            current = target;
        }
    }

    HeuristicOutcome { score: current, applied }
}
