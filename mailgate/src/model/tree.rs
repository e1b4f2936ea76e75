// mailgate/src/model/tree.rs
//
// Decision tree artifacts.
//
// Trees arrive as JSON from the offline exporter in one of two node layouts:
//
//   verbose   {"type":"leaf","value":0.83,"reason":"..."}
//             {"type":"node","feature":"digit_ratio","threshold":0.4,
//              "operator":"<=","left":{..},"right":{..}}
//             ("score" / "featureName" / "split" accepted as aliases)
//   minified  {"t":"l","v":0.83}
//             {"t":"n","f":"digit_ratio","v":0.4,"l":{..},"r":{..}}
//
// A tree artifact is a bare root node or `{ "meta": {...}, "tree": root }`.
// Parsing happens once, validates everything, and resolves feature names to
// schema positions so evaluation never has to look a name up.

use serde_json::{json, Map, Value};

use crate::error::ArtifactError;
use crate::features::vector::{index_of, FeatureVector};

pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Leaf {
        score:  f64,
        reason: Option<String>,
    },
    Split {
        feature:   String,
        index:     usize,
        threshold: f64,
        left:      Box<TreeNode>,
        right:     Box<TreeNode>,
    },
}

/// One decision taken on the way down.
#[derive(Debug, Clone, PartialEq)]
pub struct PathStep {
    pub feature:   String,
    pub threshold: f64,
    pub value:     f64,
    pub went_left: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeEvaluation {
    pub score:  f64,
    pub reason: String,
    pub path:   Vec<PathStep>,
}

impl TreeNode {
    pub fn parse(value: &Value) -> Result<Self, ArtifactError> {
        parse_node(value, "$", 0)
    }

    pub fn evaluate(&self, fv: &FeatureVector) -> TreeEvaluation {
        let mut node = self;
        let mut path = Vec::new();
        loop {
            match node {
                TreeNode::Leaf { score, reason } => {
                    let reason = reason.clone().unwrap_or_else(|| derived_reason(path.last()));
                    return TreeEvaluation { score: *score, reason, path };
                }
                TreeNode::Split { feature, index, threshold, left, right } => {
                    let value = fv.at(*index);
                    let went_left = value <= *threshold;
                    path.push(PathStep {
                        feature: feature.clone(),
                        threshold: *threshold,
                        value,
                        went_left,
                    });
                    node = if went_left { &**left } else { &**right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// Verbose JSON form.
    pub fn to_value(&self) -> Value {
        match self {
            TreeNode::Leaf { score, reason } => {
                let mut m = Map::new();
                m.insert("type".into(), json!("leaf"));
                m.insert("value".into(), json!(score));
                if let Some(r) = reason {
                    m.insert("reason".into(), json!(r));
                }
                Value::Object(m)
            }
            TreeNode::Split { feature, threshold, left, right, .. } => json!({
                "type": "node",
                "feature": feature,
                "threshold": threshold,
                "operator": "<=",
                "left": left.to_value(),
                "right": right.to_value(),
            }),
        }
    }
}

fn derived_reason(last: Option<&PathStep>) -> String {
    match last {
        Some(step) if step.went_left => format!("{}_low", step.feature),
        Some(step) => format!("{}_high", step.feature),
        None => "model_score".to_string(),
    }
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&'static str]) -> Option<&'a Value> {
    names.iter().find_map(|n| obj.get(*n))
}

fn require<'a>(
    obj:   &'a Map<String, Value>,
    names: &[&'static str],
    path:  &str,
) -> Result<&'a Value, ArtifactError> {
    field(obj, names).ok_or_else(|| ArtifactError::MissingField {
        field: names[0],
        path:  path.to_string(),
    })
}

fn number(v: &Value, field: &'static str, path: &str) -> Result<f64, ArtifactError> {
    v.as_f64().ok_or_else(|| ArtifactError::MissingField { field, path: path.to_string() })
}

fn parse_node(value: &Value, path: &str, depth: usize) -> Result<TreeNode, ArtifactError> {
    if depth > MAX_DEPTH {
        return Err(ArtifactError::TooDeep { max: MAX_DEPTH });
    }
    let obj = value
        .as_object()
        .ok_or_else(|| ArtifactError::NotAnObject { path: path.to_string() })?;

    let kind = require(obj, &["type", "t"], path)?
        .as_str()
        .unwrap_or_default();

    match kind {
        "leaf" | "l" => parse_leaf(obj, path),
        "node" | "split" | "n" => parse_split(obj, path, depth),
        other => Err(ArtifactError::UnknownNodeType {
            kind: other.to_string(),
            path: path.to_string(),
        }),
    }
}

fn parse_leaf(obj: &Map<String, Value>, path: &str) -> Result<TreeNode, ArtifactError> {
    let score = number(require(obj, &["value", "score", "v"], path)?, "value", path)?;
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(ArtifactError::InvalidScore { score, path: path.to_string() });
    }
    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    Ok(TreeNode::Leaf { score, reason })
}

fn parse_split(obj: &Map<String, Value>, path: &str, depth: usize) -> Result<TreeNode, ArtifactError> {
    let feature = require(obj, &["feature", "featureName", "f"], path)?
        .as_str()
        .ok_or_else(|| ArtifactError::MissingField { field: "feature", path: path.to_string() })?
        .to_string();
    let index = index_of(&feature).ok_or_else(|| ArtifactError::UnknownFeature {
        name: feature.clone(),
        path: path.to_string(),
    })?;

    let threshold = require(obj, &["threshold", "v"], path)?
        .as_f64()
        .filter(|t| t.is_finite())
        .ok_or_else(|| ArtifactError::InvalidThreshold { path: path.to_string() })?;

    if let Some(op) = obj.get("operator") {
        let op = op.as_str().unwrap_or_default();
        if op != "<=" {
            return Err(ArtifactError::UnsupportedOperator {
                op: op.to_string(),
                path: path.to_string(),
            });
        }
    }

    let left_path = format!("{}.left", path);
    let right_path = format!("{}.right", path);
    let left = parse_node(require(obj, &["left", "l"], path)?, &left_path, depth + 1)?;
    let right = parse_node(require(obj, &["right", "r"], path)?, &right_path, depth + 1)?;

    Ok(TreeNode::Split {
        feature,
        index,
        threshold,
        left:  Box::new(left),
        right: Box::new(right),
    })
}

/// Single-tree artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    pub version: String,
    pub root:    TreeNode,
}

impl DecisionTree {
    pub fn from_value(value: &Value) -> Result<Self, ArtifactError> {
        match value.as_object().and_then(|o| o.get("tree")) {
            Some(root) => Ok(Self {
                version: meta_version(value),
                root:    TreeNode::parse(root)?,
            }),
            None => Ok(Self { version: meta_version(value), root: TreeNode::parse(value)? }),
        }
    }

    pub fn load(bytes: &[u8]) -> Result<Self, ArtifactError> {
        Self::from_value(&serde_json::from_slice(bytes)?)
    }

    pub fn evaluate(&self, fv: &FeatureVector) -> TreeEvaluation {
        self.root.evaluate(fv)
    }

    pub fn to_json(&self) -> String {
        json!({ "meta": { "version": self.version }, "tree": self.root.to_value() }).to_string()
    }
}

pub(crate) fn meta_version(value: &Value) -> String {
    value
        .get("meta")
        .and_then(|m| m.get("version"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "unversioned".to_string())
}
