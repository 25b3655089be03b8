//! Prediction bundles and understanding results exchanged between the
//! per-context classifiers, the election engine, and downstream dialog logic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ExtractionResult;

/// Label of the synthetic out-of-scope intent.
pub const NONE_INTENT: &str = "none";

/// Name of the pseudo-context used when no context was predicted at all.
pub const GLOBAL_CONTEXT: &str = "global";

/// Extractor id carried by candidates produced by exact utterance matching.
pub const EXACT_MATCH_EXTRACTOR: &str = "exact-matcher";

/// A slot filled by a classifier for one intent candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub name: String,
    pub value: serde_json::Value,
    /// Raw text the slot was tagged on.
    pub source: String,
    pub confidence: f64,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<ExtractionResult>,
}

/// One classifier output within a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub slots: BTreeMap<String, Slot>,
    #[serde(default = "default_extractor")]
    pub extractor: String,
}

fn default_extractor() -> String {
    "classifier".to_string()
}

impl IntentCandidate {
    /// Classifier candidate without slots.
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            slots: BTreeMap::new(),
            extractor: default_extractor(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.label == NONE_INTENT
    }
}

/// Scores produced for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPrediction {
    /// Probability that the event belongs to this context.
    pub confidence: f64,
    /// Probability that the event matches none of the context's intents.
    #[serde(rename = "oos", default)]
    pub out_of_scope_score: f64,
    #[serde(default)]
    pub intents: Vec<IntentCandidate>,
}

impl ContextPrediction {
    /// True when one of the candidates came from exact utterance matching.
    pub fn has_exact_match(&self) -> bool {
        self.intents
            .iter()
            .any(|i| i.extractor == EXACT_MATCH_EXTRACTOR)
    }

    /// Out-of-scope score as seen by the election.
    ///
    /// An exact match overrides the out-of-scope classifier entirely.
    pub fn effective_oos(&self) -> f64 {
        if self.has_exact_match() {
            0.0
        } else {
            self.out_of_scope_score
        }
    }
}

/// Raw per-context predictions for one utterance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<BTreeMap<String, ContextPrediction>>,
    #[serde(default, rename = "includedContexts", alias = "included_contexts")]
    pub included_contexts: Vec<String>,
}

impl PredictionBundle {
    pub fn context(&self, name: &str) -> Option<&ContextPrediction> {
        self.predictions.as_ref().and_then(|p| p.get(name))
    }
}

/// One entry of the final ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIntent {
    pub name: String,
    pub context: String,
    pub confidence: f64,
}

impl RankedIntent {
    pub fn new(name: impl Into<String>, context: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            context: context.into(),
            confidence,
        }
    }

    pub fn is_none(&self) -> bool {
        self.name == NONE_INTENT
    }
}

/// A prediction bundle together with the outcome of the election.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnderstandingResult {
    #[serde(flatten)]
    pub bundle: PredictionBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elected_intent: Option<RankedIntent>,
    #[serde(default)]
    pub ranked_intents: Vec<RankedIntent>,
    #[serde(default)]
    pub ambiguous: bool,
    #[serde(default)]
    pub slots: BTreeMap<String, Slot>,
}

impl From<PredictionBundle> for UnderstandingResult {
    fn from(bundle: PredictionBundle) -> Self {
        Self {
            bundle,
            ..Default::default()
        }
    }
}
