//! Cross-validation pipeline: reads a labelled dataset, runs the centroid
//! baseline through k folds, and reports per-class scores.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use quorum_ai::{CentroidEvaluator, CrossValidationConfig, SuiteReport};
use quorum_core::{TrainingSample, group_by_intent};
use serde::Deserialize;

pub struct SuiteStats {
    pub samples: usize,
    pub intents: usize,
    pub elapsed_secs: f64,
}

/// Either a flat list of samples or a map of intent to utterances.
#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Samples(Vec<TrainingSample>),
    ByIntent(BTreeMap<String, Vec<String>>),
}

/// Load a dataset file and group it by intent.
pub fn load_dataset(path: &Path) -> anyhow::Result<Vec<Vec<TrainingSample>>> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file: DatasetFile =
        serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))?;

    let samples: Vec<TrainingSample> = match file {
        DatasetFile::Samples(samples) => samples,
        DatasetFile::ByIntent(map) => map
            .into_iter()
            .flat_map(|(intent, utterances)| {
                utterances
                    .into_iter()
                    .map(move |u| TrainingSample::new(u, intent.clone()))
            })
            .collect(),
    };
    Ok(group_by_intent(samples))
}

/// Run the full suite: load → fold → train/evaluate → merge.
pub async fn run_suite(
    suite_name: &str,
    dataset_path: &Path,
    config: &CrossValidationConfig,
) -> anyhow::Result<(SuiteReport, SuiteStats)> {
    let start = Instant::now();

    let dataset = load_dataset(dataset_path)?;
    let samples: usize = dataset.iter().map(Vec::len).sum();
    eprintln!(
        "  Read {samples} samples over {} intents from {}",
        dataset.len(),
        dataset_path.display()
    );

    eprintln!("  Running {}-fold cross-validation...", config.k);
    let report = quorum_ai::crossval::run(suite_name, &dataset, Arc::new(CentroidEvaluator::default()), config)
        .await
        .with_context(|| format!("cross-validating suite {suite_name}"))?;

    Ok((
        report,
        SuiteStats {
            samples,
            intents: dataset.len(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        },
    ))
}
