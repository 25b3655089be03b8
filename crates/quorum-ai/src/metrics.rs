//! Confusion tallies and per-class precision / recall / F1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Pseudo-class holding the unweighted mean over all real classes.
pub const ALL_CLASSES: &str = "all";
/// Key under which a real class named [`ALL_CLASSES`] is reported.
pub const RENAMED_ALL_CLASS: &str = "all (intent)";

/// Scores for one class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    #[serde(rename = "tp")]
    pub true_positive: u64,
    #[serde(rename = "fp")]
    pub false_positive: u64,
    #[serde(rename = "fn")]
    pub false_negative: u64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Predicted label -> count, for samples of this class predicted wrong.
    #[serde(default)]
    pub confusions: BTreeMap<String, u64>,
}

/// Running counts of predictions against expectations.
#[derive(Debug, Clone, Default)]
pub struct ConfusionTally {
    tp: BTreeMap<String, u64>,
    fp: BTreeMap<String, u64>,
    fn_: BTreeMap<String, u64>,
    confusions: BTreeMap<String, BTreeMap<String, u64>>,
}

impl ConfusionTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one test sample.
    pub fn record(&mut self, expected: &str, actual: &str) {
        if expected == actual {
            *self.tp.entry(expected.to_string()).or_default() += 1;
            return;
        }
        *self.fp.entry(actual.to_string()).or_default() += 1;
        *self.fn_.entry(expected.to_string()).or_default() += 1;
        *self
            .confusions
            .entry(expected.to_string())
            .or_default()
            .entry(actual.to_string())
            .or_default() += 1;
    }

    /// Make a class show up in the scores even if it never gets recorded.
    pub fn register_class(&mut self, class: &str) {
        self.tp.entry(class.to_string()).or_default();
    }

    pub fn true_positives(&self, class: &str) -> u64 {
        self.tp.get(class).copied().unwrap_or(0)
    }

    pub fn false_positives(&self, class: &str) -> u64 {
        self.fp.get(class).copied().unwrap_or(0)
    }

    pub fn false_negatives(&self, class: &str) -> u64 {
        self.fn_.get(class).copied().unwrap_or(0)
    }

    /// Total number of recorded samples.
    pub fn total(&self) -> u64 {
        self.tp.values().sum::<u64>() + self.fn_.values().sum::<u64>()
    }

    /// Add another tally's counts into this one.
    pub fn merge(&mut self, other: &ConfusionTally) {
        for (dst, src) in [(&mut self.tp, &other.tp), (&mut self.fp, &other.fp), (&mut self.fn_, &other.fn_)] {
            for (class, n) in src {
                *dst.entry(class.clone()).or_default() += n;
            }
        }
        for (expected, row) in &other.confusions {
            let dst = self.confusions.entry(expected.clone()).or_default();
            for (actual, n) in row {
                *dst.entry(actual.clone()).or_default() += n;
            }
        }
    }

    /// Every class seen as expected or predicted.
    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self
            .tp
            .keys()
            .chain(self.fp.keys())
            .chain(self.fn_.keys())
            .cloned()
            .collect();
        classes.sort();
        classes.dedup();
        classes
    }

    /// Per-class scores plus the [`ALL_CLASSES`] row.
    ///
    /// Divisions by zero score 0. A real class named [`ALL_CLASSES`] is
    /// reported as [`RENAMED_ALL_CLASS`].
    pub fn scores(&self) -> BTreeMap<String, ClassScore> {
        let mut scores: BTreeMap<String, ClassScore> = BTreeMap::new();
        for class in self.classes() {
            let tp = self.true_positives(&class);
            let fp = self.false_positives(&class);
            let fn_ = self.false_negatives(&class);
            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, tp + fn_);
            let f1 = nan_to_zero(2.0 * precision * recall / (precision + recall));
            let key = if class == ALL_CLASSES {
                warn!(class = %class, renamed = RENAMED_ALL_CLASS, "class name collides with the mean row");
                RENAMED_ALL_CLASS.to_string()
            } else {
                class.clone()
            };
            scores.insert(
                key,
                ClassScore {
                    true_positive: tp,
                    false_positive: fp,
                    false_negative: fn_,
                    precision,
                    recall,
                    f1,
                    confusions: self.confusions.get(&class).cloned().unwrap_or_default(),
                },
            );
        }

        let n = scores.len() as f64;
        let mean = |f: fn(&ClassScore) -> f64| nan_to_zero(scores.values().map(f).sum::<f64>() / n);
        let all = ClassScore {
            precision: mean(|s| s.precision),
            recall: mean(|s| s.recall),
            f1: mean(|s| s.f1),
            ..Default::default()
        };
        scores.insert(ALL_CLASSES.to_string(), all);
        scores
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    nan_to_zero(num as f64 / den as f64)
}

fn nan_to_zero(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v }
}
