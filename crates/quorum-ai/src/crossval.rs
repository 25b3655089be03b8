//! Stratified k-fold cross-validation for intent classifiers.
//!
//! Every fold's test set holds roughly `1/k` of each intent's utterances.
//! Folds are trained and evaluated concurrently, each with its own model and
//! tally; the tallies are merged once all folds are done.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use quorum_core::TrainingSample;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::metrics::{ClassScore, ConfusionTally};

/// Trains a model on one fold and scores it on the held-out samples.
#[async_trait]
pub trait FoldEvaluator: Send + Sync + 'static {
    type Model: Send + Sync;

    /// Train a model identified by `model_id` on `train_set`.
    async fn train(&self, model_id: &str, train_set: &[TrainingSample]) -> anyhow::Result<Self::Model>;

    /// Predict every sample of `test_set` and record it once in `tally`.
    async fn evaluate(
        &self,
        model: &Self::Model,
        test_set: &[TrainingSample],
        tally: &mut ConfusionTally,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossValidationConfig {
    /// Number of folds; at least 2.
    pub k: usize,
    /// Fixed seed for reproducible shuffles. Random when unset.
    pub seed: Option<u64>,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self { k: 3, seed: None }
    }
}

/// One train/test split.
#[derive(Debug, Clone)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<TrainingSample>,
    pub test: Vec<TrainingSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldSummary {
    pub index: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub accuracy: f64,
}

/// Outcome of a cross-validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite_name: String,
    pub k: usize,
    /// Per-class scores, including the `"all"` row.
    pub classes: BTreeMap<String, ClassScore>,
    pub folds: Vec<FoldSummary>,
}

/// Split intent groups into `k` stratified folds.
pub fn make_folds(dataset: &[Vec<TrainingSample>], k: usize, rng: &mut StdRng) -> Vec<Fold> {
    // chunks[intent][fold]
    let chunks: Vec<Vec<Vec<TrainingSample>>> = dataset
        .iter()
        .map(|group| {
            let mut samples = group.clone();
            samples.shuffle(rng);
            let mut parts = split_even(samples, k);
            parts.shuffle(rng);
            parts
        })
        .collect();

    (0..k)
        .map(|index| {
            let mut train = Vec::new();
            let mut test = Vec::new();
            for parts in &chunks {
                for (i, part) in parts.iter().enumerate() {
                    if i == index {
                        test.extend(part.iter().cloned());
                    } else {
                        train.extend(part.iter().cloned());
                    }
                }
            }
            Fold { index, train, test }
        })
        .collect()
}

/// `k` chunks whose sizes differ by at most one, larger chunks first.
fn split_even(samples: Vec<TrainingSample>, k: usize) -> Vec<Vec<TrainingSample>> {
    let base = samples.len() / k;
    let extra = samples.len() % k;
    let mut rest = samples.into_iter();
    (0..k)
        .map(|i| {
            let size = base + usize::from(i < extra);
            rest.by_ref().take(size).collect()
        })
        .collect()
}

/// Cross-validate `evaluator` on `dataset`, grouped by intent.
pub async fn run<E: FoldEvaluator>(
    suite_name: &str,
    dataset: &[Vec<TrainingSample>],
    evaluator: Arc<E>,
    config: &CrossValidationConfig,
) -> anyhow::Result<SuiteReport> {
    if config.k < 2 {
        bail!("cross-validation needs at least 2 folds, got {}", config.k);
    }
    if dataset.iter().all(Vec::is_empty) {
        bail!("suite {suite_name}: dataset is empty");
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let folds = make_folds(dataset, config.k, &mut rng);
    info!(suite = suite_name, k = config.k, intents = dataset.len(), "starting cross-validation");

    let mut tasks = JoinSet::new();
    for fold in folds {
        let evaluator = Arc::clone(&evaluator);
        let model_id = format!("{suite_name}-fold-{}", fold.index);
        tasks.spawn(async move {
            let model = evaluator
                .train(&model_id, &fold.train)
                .await
                .with_context(|| format!("training {model_id}"))?;
            let mut tally = ConfusionTally::new();
            evaluator
                .evaluate(&model, &fold.test, &mut tally)
                .await
                .with_context(|| format!("evaluating {model_id}"))?;
            debug!(model_id = %model_id, train = fold.train.len(), test = fold.test.len(), "fold done");
            anyhow::Ok((fold.index, fold.train.len(), fold.test.len(), tally))
        });
    }

    let mut merged = ConfusionTally::new();
    for group in dataset {
        for sample in group {
            merged.register_class(&sample.intent);
        }
    }
    let mut summaries = Vec::with_capacity(config.k);
    while let Some(joined) = tasks.join_next().await {
        let (index, train_size, test_size, tally) = joined.context("fold task panicked")??;
        let correct: u64 = tally.classes().iter().map(|c| tally.true_positives(c)).sum();
        let accuracy = if test_size == 0 { 0.0 } else { correct as f64 / test_size as f64 };
        merged.merge(&tally);
        summaries.push(FoldSummary {
            index,
            train_size,
            test_size,
            accuracy,
        });
    }
    summaries.sort_by_key(|s| s.index);

    let classes = merged.scores();
    if let Some(all) = classes.get(crate::ALL_CLASSES) {
        info!(suite = suite_name, f1 = all.f1, precision = all.precision, recall = all.recall, "cross-validation finished");
    }

    Ok(SuiteReport {
        suite_name: suite_name.to_string(),
        k: config.k,
        classes,
        folds: summaries,
    })
}

/// Train once on the whole dataset, for a production model.
pub async fn train_full<E: FoldEvaluator>(
    suite_name: &str,
    dataset: &[Vec<TrainingSample>],
    evaluator: &E,
) -> anyhow::Result<E::Model> {
    let samples: Vec<TrainingSample> = dataset.iter().flatten().cloned().collect();
    if samples.is_empty() {
        bail!("suite {suite_name}: dataset is empty");
    }
    let model_id = format!("{suite_name}-full");
    info!(model_id = %model_id, samples = samples.len(), "training on full dataset");
    evaluator
        .train(&model_id, &samples)
        .await
        .with_context(|| format!("training {model_id}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    fn dataset(intents: &[(&str, usize)]) -> Vec<Vec<TrainingSample>> {
        intents
            .iter()
            .map(|(intent, n)| {
                (0..*n)
                    .map(|i| TrainingSample::new(format!("{intent} utterance {i}"), *intent))
                    .collect()
            })
            .collect()
    }

    /// Looks up test utterances in the training set; unseen ones get "none".
    struct Memorizer {
        trained: Mutex<Vec<String>>,
    }

    impl Memorizer {
        fn new() -> Self {
            Self {
                trained: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FoldEvaluator for Memorizer {
        type Model = Vec<TrainingSample>;

        async fn train(&self, model_id: &str, train_set: &[TrainingSample]) -> anyhow::Result<Self::Model> {
            self.trained.lock().unwrap().push(model_id.to_string());
            Ok(train_set.to_vec())
        }

        async fn evaluate(
            &self,
            model: &Self::Model,
            test_set: &[TrainingSample],
            tally: &mut ConfusionTally,
        ) -> anyhow::Result<()> {
            for sample in test_set {
                let actual = model
                    .iter()
                    .find(|m| m.utterance == sample.utterance)
                    .map(|m| m.intent.as_str())
                    .unwrap_or("none");
                tally.record(&sample.intent, actual);
            }
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl FoldEvaluator for Broken {
        type Model = ();

        async fn train(&self, model_id: &str, _: &[TrainingSample]) -> anyhow::Result<()> {
            if model_id.ends_with("fold-1") {
                bail!("out of memory");
            }
            Ok(())
        }

        async fn evaluate(&self, _: &(), _: &[TrainingSample], _: &mut ConfusionTally) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn folds_partition_every_sample_once() {
        let data = dataset(&[("a", 7), ("b", 5), ("c", 1)]);
        let mut rng = StdRng::seed_from_u64(7);
        let folds = make_folds(&data, 3, &mut rng);

        let mut seen = HashSet::new();
        for fold in &folds {
            for sample in &fold.test {
                assert!(seen.insert(sample.utterance.clone()), "duplicate {}", sample.utterance);
            }
            assert_eq!(fold.train.len() + fold.test.len(), 13);
        }
        assert_eq!(seen.len(), 13);
    }

    #[test]
    fn nine_per_intent_split_three_ways() {
        let data = dataset(&[("greet", 9), ("bye", 9)]);
        let mut rng = StdRng::seed_from_u64(42);
        let folds = make_folds(&data, 3, &mut rng);

        assert_eq!(folds.len(), 3);
        for fold in &folds {
            assert_eq!(fold.test.len(), 6);
            assert_eq!(fold.train.len(), 12);
            for intent in ["greet", "bye"] {
                assert_eq!(fold.test.iter().filter(|s| s.intent == intent).count(), 3);
                assert_eq!(fold.train.iter().filter(|s| s.intent == intent).count(), 6);
            }
            let test: HashSet<_> = fold.test.iter().map(|s| &s.utterance).collect();
            assert!(fold.train.iter().all(|s| !test.contains(&s.utterance)));
        }
    }

    #[test]
    fn same_seed_same_folds() {
        let data = dataset(&[("a", 10), ("b", 10)]);
        let a = make_folds(&data, 3, &mut StdRng::seed_from_u64(1));
        let b = make_folds(&data, 3, &mut StdRng::seed_from_u64(1));
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.test, y.test);
        }
    }

    #[test]
    fn uneven_groups_differ_by_at_most_one() {
        let sizes: Vec<usize> = split_even(dataset(&[("a", 10)]).remove(0), 3)
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[tokio::test]
    async fn run_reports_every_fold_and_class() {
        let data = dataset(&[("greet", 9), ("bye", 9)]);
        let evaluator = Arc::new(Memorizer::new());
        let config = CrossValidationConfig { k: 3, seed: Some(3) };
        let report = run("smalltalk", &data, Arc::clone(&evaluator), &config).await.unwrap();

        assert_eq!(report.suite_name, "smalltalk");
        assert_eq!(report.folds.len(), 3);
        assert!(report.folds.iter().all(|f| f.test_size == 6 && f.train_size == 12));

        // Held-out utterances are never in the training set.
        let greet = &report.classes["greet"];
        assert_eq!(greet.true_positive, 0);
        assert_eq!(greet.false_negative, 9);
        assert_eq!(greet.confusions["none"], 9);
        assert_eq!(report.classes["none"].false_positive, 18);
        for score in report.classes.values() {
            assert!(!score.precision.is_nan() && !score.recall.is_nan() && !score.f1.is_nan());
        }

        let mut ids = evaluator.trained.lock().unwrap().clone();
        ids.sort();
        assert_eq!(ids, vec!["smalltalk-fold-0", "smalltalk-fold-1", "smalltalk-fold-2"]);
    }

    #[tokio::test]
    async fn fold_errors_propagate() {
        let data = dataset(&[("a", 6)]);
        let err = run("s", &data, Arc::new(Broken), &CrossValidationConfig::default())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("out of memory"));
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let data = dataset(&[("a", 6)]);
        let config = CrossValidationConfig { k: 1, seed: None };
        assert!(run("s", &data, Arc::new(Memorizer::new()), &config).await.is_err());

        let empty: Vec<Vec<TrainingSample>> = vec![vec![]];
        let config = CrossValidationConfig::default();
        assert!(run("s", &empty, Arc::new(Memorizer::new()), &config).await.is_err());
        assert!(train_full("s", &empty, &Memorizer::new()).await.is_err());
    }

    #[tokio::test]
    async fn train_full_uses_every_sample() {
        let data = dataset(&[("a", 4), ("b", 5)]);
        let evaluator = Memorizer::new();
        let model = train_full("prod", &data, &evaluator).await.unwrap();
        assert_eq!(model.len(), 9);
        assert_eq!(evaluator.trained.lock().unwrap()[0], "prod-full");
    }
}
