//! Labelled utterances used to train and evaluate intent classifiers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingSample {
    pub utterance: String,
    pub intent: String,
}

impl TrainingSample {
    pub fn new(utterance: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
            intent: intent.into(),
        }
    }
}

/// Group samples by intent, ordered by intent name.
///
/// Within a group, samples keep their input order.
pub fn group_by_intent(samples: impl IntoIterator<Item = TrainingSample>) -> Vec<Vec<TrainingSample>> {
    let mut groups: BTreeMap<String, Vec<TrainingSample>> = BTreeMap::new();
    for sample in samples {
        groups.entry(sample.intent.clone()).or_default().push(sample);
    }
    groups.into_values().collect()
}
