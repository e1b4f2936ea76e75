// mailgate/src/model/mod.rs
//
// Ensemble risk model evaluation.
//
// Preference at call time: forest, else single tree, else the
// `model_unavailable` sentinel with score 0. Whatever tier answers is
// recorded as the decision's `ModelSource`.

pub mod forest;
pub mod tree;

use serde_json::Value;

use crate::error::ArtifactError;
use crate::events::ModelSource;
use crate::features::vector::FeatureVector;

pub use forest::{Aggregation, Calibration, Forest, ForestEvaluation};
pub use tree::{DecisionTree, PathStep, TreeEvaluation, TreeNode};

pub const UNAVAILABLE_REASON: &str = "model_unavailable";

#[derive(Debug, Clone, PartialEq)]
pub enum EnsembleModel {
    Tree(DecisionTree),
    Forest(Forest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelScore {
    pub score:  f64,
    pub reason: String,
    pub source: ModelSource,
    pub path:   Option<Vec<PathStep>>,
}

impl ModelScore {
    pub fn unavailable() -> Self {
        Self {
            score:  0.0,
            reason: UNAVAILABLE_REASON.to_string(),
            source: ModelSource::Unavailable,
            path:   None,
        }
    }
}

impl EnsembleModel {
    /// Sniffs the layout: arrays and objects with a `forest` key are forests,
    /// anything else must be a tree.
    pub fn load(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let is_forest = value.is_array() || value.get("forest").is_some();
        if is_forest {
            Forest::from_value(&value).map(EnsembleModel::Forest)
        } else {
            DecisionTree::from_value(&value).map(EnsembleModel::Tree)
        }
    }

    pub fn version(&self) -> &str {
        match self {
            EnsembleModel::Tree(t) => &t.version,
            EnsembleModel::Forest(f) => &f.version,
        }
    }

    pub fn evaluate(&self, fv: &FeatureVector) -> ModelScore {
        match self {
            EnsembleModel::Tree(t) => {
                let e = t.evaluate(fv);
                ModelScore {
                    score:  e.score,
                    reason: e.reason,
                    source: ModelSource::Tree { version: t.version.clone() },
                    path:   Some(e.path),
                }
            }
            EnsembleModel::Forest(f) => {
                let e = f.evaluate(fv);
                ModelScore {
                    score:  e.score,
                    reason: e.reason,
                    source: ModelSource::Forest { version: f.version.clone() },
                    path:   Some(e.decisive.path),
                }
            }
        }
    }
}

/// The loaded model tiers. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSet {
    pub forest: Option<EnsembleModel>,
    pub tree:   Option<EnsembleModel>,
}

impl ModelSet {
    pub fn is_empty(&self) -> bool {
        self.forest.is_none() && self.tree.is_none()
    }

    pub fn score(&self, fv: &FeatureVector) -> ModelScore {
        self.forest
            .as_ref()
            .or(self.tree.as_ref())
            .map(|m| m.evaluate(fv))
            .unwrap_or_else(ModelScore::unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &[u8] = br#"{"meta":{"version":"1.4.0"},"tree":
        {"type":"leaf","value":0.2,"reason":"tree_says_so"}}"#;
    const FOREST: &[u8] = br#"{"meta":{"version":"3.0.0-forest"},"forest":[{"t":"l","v":0.7}]}"#;

    #[test]
    fn load_sniffs_layout() {
        assert!(matches!(EnsembleModel::load(TREE).unwrap(), EnsembleModel::Tree(_)));
        assert!(matches!(EnsembleModel::load(FOREST).unwrap(), EnsembleModel::Forest(_)));
        assert!(matches!(EnsembleModel::load(b"[]"), Err(ArtifactError::EmptyForest)));
    }

    #[test]
    fn fallback_chain() {
        let fv = FeatureVector::defaults();
        let forest = EnsembleModel::load(FOREST).ok();
        let tree = EnsembleModel::load(TREE).ok();

        let both = ModelSet { forest: forest.clone(), tree: tree.clone() };
        let s = both.score(&fv);
        assert_eq!(s.score, 0.7);
        assert_eq!(s.source.to_string(), "forest@3.0.0-forest");

        let tree_only = ModelSet { forest: None, tree };
        let s = tree_only.score(&fv);
        assert_eq!(s.reason, "tree_says_so");
        assert_eq!(s.source, ModelSource::Tree { version: "1.4.0".into() });

        let none = ModelSet::default();
        assert!(none.is_empty());
        assert_eq!(none.score(&fv), ModelScore::unavailable());
        assert_eq!(none.score(&fv).score, 0.0);
    }
}
