// mailgate/src/sequence/model.rs
//
// Character n-gram language model.
//
// Counts next-character occurrences per (N-1)-character context over
// overlapping windows of size N. Scoring uses add-one (Laplace) smoothing over
// the observed vocabulary plus one slot for never-seen characters:
//
//     P(next | ctx) = (count(ctx, next) + 1) / (total(ctx) + V)
//
// so every probability is strictly positive and cross-entropy is finite for
// any input, including contexts the model never saw (P = 1/V).
//
// Artifact JSON (shared with the training side):
//     { "order": 2, "contexts": { "a": { "b": 12, ... }, ... }, "totalSamples": 5000 }
// Maps are ordered so one model always serializes to identical bytes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelArtifact {
    order: usize,
    contexts: BTreeMap<String, BTreeMap<String, u64>>,
    #[serde(default)]
    total_samples: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharSequenceModel {
    order: usize,
    contexts: HashMap<String, HashMap<char, u64>>,
    context_totals: HashMap<String, u64>,
    vocabulary: BTreeSet<char>,
    total_samples: u64,
}

impl CharSequenceModel {
    pub fn new(order: usize) -> Result<Self, ArtifactError> {
        if !(2..=3).contains(&order) {
            return Err(ArtifactError::InvalidOrder(order));
        }
        Ok(Self {
            order,
            contexts: HashMap::new(),
            context_totals: HashMap::new(),
            vocabulary: BTreeSet::new(),
            total_samples: 0,
        })
    }

    /// Build a model from a corpus in one go.
    pub fn trained(order: usize, samples: impl IntoIterator<Item = impl AsRef<str>>)
        -> Result<Self, ArtifactError>
    {
        let mut m = Self::new(order)?;
        for s in samples {
            m.train(s.as_ref());
        }
        Ok(m)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn train(&mut self, sample: &str) {
        let chars: Vec<char> = sample.chars().collect();
        self.total_samples += 1;
        self.vocabulary.extend(chars.iter().copied());
        if chars.len() < self.order {
            return;
        }
        for w in chars.windows(self.order) {
            let ctx: String = w[..self.order - 1].iter().collect();
            let next = w[self.order - 1];
            *self.contexts.entry(ctx.clone()).or_default().entry(next).or_default() += 1;
            *self.context_totals.entry(ctx).or_default() += 1;
        }
    }

    /// Smoothed conditional probability. Always in (0, 1].
    pub fn probability(&self, context: &str, next: char) -> f64 {
        let v = (self.vocabulary.len() + 1) as f64;
        let total = self.context_totals.get(context).copied().unwrap_or(0) as f64;
        let count = self
            .contexts
            .get(context)
            .and_then(|nexts| nexts.get(&next))
            .copied()
            .unwrap_or(0) as f64;
        (count + 1.0) / (total + v)
    }

    /// Average surprise in bits per predicted character. Samples shorter than
    /// the model order carry no transitions and score 0.0.
    pub fn cross_entropy(&self, sample: &str) -> f64 {
        let chars: Vec<char> = sample.chars().collect();
        if chars.len() < self.order {
            return 0.0;
        }
        let mut bits = 0.0f64;
        let mut n = 0usize;
        let mut ctx = String::with_capacity(self.order * 4);
        for w in chars.windows(self.order) {
            ctx.clear();
            ctx.extend(&w[..self.order - 1]);
            bits -= self.probability(&ctx, w[self.order - 1]).log2();
            n += 1;
        }
        (bits / n as f64).max(0.0)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let art: ModelArtifact = serde_json::from_slice(bytes)?;
        let mut m = Self::new(art.order)?;
        m.total_samples = art.total_samples;

        for (ctx, nexts) in art.contexts {
            let len = ctx.chars().count();
            if len != m.order - 1 {
                return Err(ArtifactError::InvalidContext {
                    context: ctx,
                    len,
                    expected: m.order - 1,
                });
            }
            m.vocabulary.extend(ctx.chars());
            let mut table = HashMap::with_capacity(nexts.len());
            let mut total = 0u64;
            for (key, count) in nexts {
                let mut it = key.chars();
                let next = match (it.next(), it.next()) {
                    (Some(c), None) => c,
                    _ => return Err(ArtifactError::InvalidNextChar(key)),
                };
                m.vocabulary.insert(next);
                table.insert(next, count);
                total = total.saturating_add(count);
            }
            m.context_totals.insert(ctx.clone(), total);
            m.contexts.insert(ctx, table);
        }
        Ok(m)
    }

    pub fn to_json(&self) -> String {
        let contexts = self
            .contexts
            .iter()
            .map(|(ctx, nexts)| {
                let inner = nexts.iter().map(|(c, n)| (c.to_string(), *n)).collect();
                (ctx.clone(), inner)
            })
            .collect();
        let art = ModelArtifact { order: self.order, contexts, total_samples: self.total_samples };
        serde_json::to_string(&art).unwrap_or_default()
    }
}
