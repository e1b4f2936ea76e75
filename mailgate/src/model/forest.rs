// mailgate/src/model/forest.rs
//
// Forest artifacts: several trees plus an aggregation rule.
//
//   mean      plain average of member scores
//   weighted  Σ wᵢ·sᵢ / Σ wᵢ with one weight per tree
//   vote      fraction of members scoring ≥ 0.5
//
// The explanation comes from the most decisive member, the one whose score
// sits furthest from 0.5 (first one on ties).
//
// Layout as written by the exporter:
//   { "meta": { "version": "3.0.0-forest", "runId": "...", "nTrees": 40,
//               "calibration": { "method": "platt", "intercept": -2.1, "coef": 4.3 } },
//     "forest": [ <minified nodes> ],
//     "aggregation": "mean", "weights": [..] }            (last two optional)
// A bare JSON array of nodes is also accepted.

use serde_json::Value;

use super::tree::{meta_version, TreeEvaluation, TreeNode};
use crate::error::ArtifactError;
use crate::features::vector::FeatureVector;

const VOTE_CUTOFF: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Mean,
    Weighted(Vec<f64>),
    Vote,
}

/// Platt scaling applied to the aggregated score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub intercept: f64,
    pub coef:      f64,
}

impl Calibration {
    pub fn apply(&self, raw: f64) -> f64 {
        let z = self.intercept + self.coef * raw;
        let p = 1.0 / (1.0 + (-z).exp());
        if p.is_finite() { p.clamp(0.0, 1.0) } else { raw }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForestEvaluation {
    pub score:         f64,
    /// Aggregate before calibration.
    pub raw_score:     f64,
    pub reason:        String,
    pub member_scores: Vec<f64>,
    /// Path through the member that supplied the reason.
    pub decisive:      TreeEvaluation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forest {
    pub version:     String,
    pub run_id:      Option<String>,
    pub trees:       Vec<TreeNode>,
    pub aggregation: Aggregation,
    pub calibration: Option<Calibration>,
}

impl Forest {
    pub fn load(bytes: &[u8]) -> Result<Self, ArtifactError> {
        Self::from_value(&serde_json::from_slice(bytes)?)
    }

    pub fn from_value(value: &Value) -> Result<Self, ArtifactError> {
        let members = match value {
            Value::Array(items) => items,
            Value::Object(obj) => obj
                .get("forest")
                .and_then(Value::as_array)
                .ok_or(ArtifactError::UnknownLayout)?,
            _ => return Err(ArtifactError::UnknownLayout),
        };
        if members.is_empty() {
            return Err(ArtifactError::EmptyForest);
        }

        let trees = members
            .iter()
            .enumerate()
            .map(|(i, m)| parse_member(m, i))
            .collect::<Result<Vec<_>, _>>()?;

        let aggregation = parse_aggregation(value, trees.len())?;
        let calibration = parse_calibration(value)?;
        let run_id = value
            .get("meta")
            .and_then(|m| m.get("runId"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self { version: meta_version(value), run_id, trees, aggregation, calibration })
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn evaluate(&self, fv: &FeatureVector) -> ForestEvaluation {
        let evals: Vec<TreeEvaluation> = self.trees.iter().map(|t| t.evaluate(fv)).collect();
        let member_scores: Vec<f64> = evals.iter().map(|e| e.score).collect();

        let raw_score = match &self.aggregation {
            Aggregation::Mean => member_scores.iter().sum::<f64>() / member_scores.len() as f64,
            Aggregation::Weighted(w) => {
                let total: f64 = w.iter().sum();
                member_scores.iter().zip(w).map(|(s, w)| s * w).sum::<f64>() / total
            }
            Aggregation::Vote => {
                let votes = member_scores.iter().filter(|s| **s >= VOTE_CUTOFF).count();
                votes as f64 / member_scores.len() as f64
            }
        };
        let raw_score = if raw_score.is_finite() { raw_score.clamp(0.0, 1.0) } else { 0.0 };
        let score = self.calibration.map(|c| c.apply(raw_score)).unwrap_or(raw_score);

        // Loading guarantees at least one member.
        let mut decisive_idx = 0;
        for (i, s) in member_scores.iter().enumerate() {
            if (s - 0.5).abs() > (member_scores[decisive_idx] - 0.5).abs() {
                decisive_idx = i;
            }
        }
        let decisive = evals.into_iter().nth(decisive_idx).unwrap_or(TreeEvaluation {
            score: raw_score,
            reason: "model_score".into(),
            path: Vec::new(),
        });

        ForestEvaluation {
            score,
            raw_score,
            reason: decisive.reason.clone(),
            member_scores,
            decisive,
        }
    }
}

fn parse_member(value: &Value, index: usize) -> Result<TreeNode, ArtifactError> {
    // Members may be wrapped like single-tree artifacts.
    let root = value.as_object().and_then(|o| o.get("tree")).unwrap_or(value);
    TreeNode::parse(root).map_err(|e| e.rooted_at(&format!("forest[{}]", index)))
}

fn parse_aggregation(value: &Value, trees: usize) -> Result<Aggregation, ArtifactError> {
    let rule = value.get("aggregation").and_then(Value::as_str).unwrap_or("mean");
    match rule {
        "mean" => Ok(Aggregation::Mean),
        "vote" | "majority" => Ok(Aggregation::Vote),
        "weighted" => {
            let raw = value
                .get("weights")
                .and_then(Value::as_array)
                .ok_or(ArtifactError::WeightMismatch { trees, weights: 0 })?;
            if raw.len() != trees {
                return Err(ArtifactError::WeightMismatch { trees, weights: raw.len() });
            }
            let mut weights = Vec::with_capacity(raw.len());
            for (index, w) in raw.iter().enumerate() {
                match w.as_f64() {
                    Some(w) if w.is_finite() && w >= 0.0 => weights.push(w),
                    _ => return Err(ArtifactError::InvalidWeight { index }),
                }
            }
            if weights.iter().sum::<f64>() <= 0.0 {
                return Err(ArtifactError::InvalidWeight { index: 0 });
            }
            Ok(Aggregation::Weighted(weights))
        }
        other => Err(ArtifactError::UnknownAggregation(other.to_string())),
    }
}

fn parse_calibration(value: &Value) -> Result<Option<Calibration>, ArtifactError> {
    let Some(cal) = value.get("meta").and_then(|m| m.get("calibration")) else {
        return Ok(None);
    };
    if cal.is_null() {
        return Ok(None);
    }
    let method = cal.get("method").and_then(Value::as_str).unwrap_or("platt");
    if method != "platt" {
        return Err(ArtifactError::UnknownCalibration(method.to_string()));
    }
    let num = |field: &'static str| {
        cal.get(field)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .ok_or(ArtifactError::MissingField { field, path: "$.meta.calibration".into() })
    };
    Ok(Some(Calibration { intercept: num("intercept")?, coef: num("coef")? }))
}
