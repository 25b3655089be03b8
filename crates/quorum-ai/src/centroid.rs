//! Centroid-based intent classification.
//!
//! Utterances become hashed bag-of-words vectors; each intent is represented
//! by the L2-normalised mean of its training vectors, and a new utterance is
//! assigned to the centroid with the highest cosine similarity. It is the
//! baseline the cross-validation harness runs when no real classifier is
//! plugged in.

use std::collections::BTreeMap;

use async_trait::async_trait;
use quorum_core::{ContextPrediction, IntentCandidate, NONE_INTENT, TrainingSample};
use tracing::debug;

use crate::crossval::FoldEvaluator;
use crate::metrics::ConfusionTally;

/// Dimensionality of the hashed feature space.
pub const DEFAULT_DIM: usize = 256;

/// Centroid classifier trained on labelled utterances.
#[derive(Debug, Clone)]
pub struct CentroidClassifier {
    model_id: String,
    centroids: BTreeMap<String, Vec<f32>>,
    dim: usize,
}

impl CentroidClassifier {
    /// Compute one centroid per intent found in `samples`.
    pub fn train(model_id: impl Into<String>, samples: &[TrainingSample], dim: usize) -> Self {
        let mut accum: BTreeMap<&str, (Vec<f32>, usize)> = BTreeMap::new();
        for sample in samples {
            let v = embed(&sample.utterance, dim);
            let entry = accum
                .entry(sample.intent.as_str())
                .or_insert_with(|| (vec![0.0f32; dim], 0));
            for (acc, val) in entry.0.iter_mut().zip(&v) {
                *acc += val;
            }
            entry.1 += 1;
        }

        let centroids = accum
            .into_iter()
            .map(|(label, (mut sum, count))| {
                for v in &mut sum {
                    *v /= count as f32;
                }
                normalize(&mut sum);
                (label.to_string(), sum)
            })
            .collect();

        Self {
            model_id: model_id.into(),
            centroids,
            dim,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Number of intents the model knows.
    pub fn intent_count(&self) -> usize {
        self.centroids.len()
    }

    /// Best intent and its cosine similarity, or `None` when nothing in the
    /// utterance overlaps with any centroid.
    pub fn classify(&self, text: &str) -> Option<(&str, f32)> {
        let v = embed(text, self.dim);
        let (label, sim) = best_match(&self.centroids, &v)?;
        (sim > 0.0).then_some((label, sim))
    }

    /// All intents with their similarity rescaled to sum to 1, best first.
    pub fn predict(&self, text: &str) -> Vec<IntentCandidate> {
        let v = embed(text, self.dim);
        let sims: Vec<(&str, f32)> = self
            .centroids
            .iter()
            .map(|(label, centroid)| (label.as_str(), cosine_sim(&v, centroid).max(0.0)))
            .collect();
        let total: f32 = sims.iter().map(|(_, s)| s).sum();
        if total <= 0.0 {
            return Vec::new();
        }

        let mut candidates: Vec<IntentCandidate> = sims
            .into_iter()
            .map(|(label, s)| IntentCandidate::new(label, f64::from(s / total)))
            .collect();
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates
    }

    /// Predictions for one context, with the out-of-scope score taken as the
    /// distance of the best centroid.
    pub fn predict_context(&self, text: &str) -> ContextPrediction {
        let oos = self
            .classify(text)
            .map_or(1.0, |(_, sim)| f64::from(1.0 - sim).clamp(0.0, 1.0));
        ContextPrediction {
            confidence: 1.0,
            out_of_scope_score: oos,
            intents: self.predict(text),
        }
    }
}

/// Runs [`CentroidClassifier`] through the cross-validation harness.
#[derive(Debug, Clone)]
pub struct CentroidEvaluator {
    pub dim: usize,
}

impl Default for CentroidEvaluator {
    fn default() -> Self {
        Self { dim: DEFAULT_DIM }
    }
}

#[async_trait]
impl FoldEvaluator for CentroidEvaluator {
    type Model = CentroidClassifier;

    async fn train(&self, model_id: &str, train_set: &[TrainingSample]) -> anyhow::Result<Self::Model> {
        let model = CentroidClassifier::train(model_id, train_set, self.dim);
        debug!(model_id, intents = model.intent_count(), samples = train_set.len(), "trained centroids");
        Ok(model)
    }

    async fn evaluate(
        &self,
        model: &Self::Model,
        test_set: &[TrainingSample],
        tally: &mut ConfusionTally,
    ) -> anyhow::Result<()> {
        for sample in test_set {
            let actual = model
                .classify(&sample.utterance)
                .map_or(NONE_INTENT, |(label, _)| label);
            tally.record(&sample.intent, actual);
        }
        Ok(())
    }
}

// ── Features ──

/// Hashed bag-of-words, L2-normalised.
fn embed(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    if dim == 0 {
        return v;
    }
    for token in tokens(text) {
        let bucket = (fnv1a(token.as_bytes()) % dim as u64) as usize;
        v[bucket] += 1.0;
    }
    normalize(&mut v);
    v
}

/// Lower-cased alphanumeric runs.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

// ── Similarity ──

fn best_match<'a>(centroids: &'a BTreeMap<String, Vec<f32>>, embedding: &[f32]) -> Option<(&'a str, f32)> {
    let mut best: Option<(&str, f32)> = None;
    for (label, centroid) in centroids {
        let sim = cosine_sim(embedding, centroid);
        if best.is_none_or(|(_, b)| sim > b) {
            best = Some((label.as_str(), sim));
        }
    }
    best
}

/// Both inputs are unit vectors, so the dot product is the cosine.
fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
