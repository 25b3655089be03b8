mod display;
mod suite;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use quorum_ai::{CrossValidationConfig, ElectionAlgorithm, elect, merge_spellchecked};
use quorum_core::PredictionBundle;
use quorum_entities::{EntityClient, EntityClientConfig};

#[derive(Parser)]
#[command(name = "quorum", version, about = "Intent election and entity extraction toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Elect an intent from a prediction bundle and print the result as JSON
    Elect {
        /// Prediction bundle (JSON)
        bundle: PathBuf,
        /// Election algorithm (legacy, natural)
        #[arg(short, long, default_value_t = ElectionAlgorithm::Natural)]
        algorithm: ElectionAlgorithm,
        /// Predictions made on the spell-corrected text
        #[arg(long, requires_all = ["text", "corrected_text"])]
        corrected: Option<PathBuf>,
        /// Original utterance
        #[arg(long)]
        text: Option<String>,
        /// Spell-corrected utterance
        #[arg(long)]
        corrected_text: Option<String>,
    },
    /// Extract numeric entities from one or more inputs
    Extract {
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Base URL of the extraction service
        #[arg(long, env = "QUORUM_ENTITY_URL", default_value = "http://localhost:8000")]
        url: String,
        #[arg(long, default_value = "en")]
        lang: String,
        /// Time zone used to resolve relative times
        #[arg(long, env = "QUORUM_TZ", default_value = "UTC")]
        tz: String,
        /// Directory holding the cache snapshot
        #[arg(long, env = "QUORUM_CACHE_DIR")]
        cache_dir: Option<PathBuf>,
        /// Always ask the service, ignoring cached results
        #[arg(long)]
        no_cache: bool,
    },
    /// Cross-validate the centroid baseline on a labelled dataset
    Crossval {
        /// Dataset (JSON): list of {utterance, intent} or map of intent to utterances
        dataset: PathBuf,
        #[arg(short, default_value_t = 3)]
        k: usize,
        /// Seed for reproducible folds
        #[arg(long)]
        seed: Option<u64>,
        /// Suite name (defaults to the dataset file stem)
        #[arg(long)]
        suite: Option<String>,
        /// Print the report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    tracing::info!("quorum v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match cli.command {
        Command::Elect {
            bundle,
            algorithm,
            corrected,
            text,
            corrected_text,
        } => {
            let mut predictions = read_bundle(&bundle)?;
            if let (Some(path), Some(text), Some(corrected_text)) = (corrected, text, corrected_text) {
                let corrected = read_bundle(&path)?;
                predictions = merge_spellchecked(&text, &corrected_text, &predictions, &corrected);
            }

            let result = elect(predictions, algorithm);
            eprintln!("{}", display::render_election_summary(&result));
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Extract {
            inputs,
            url,
            lang,
            tz,
            cache_dir,
            no_cache,
        } => {
            let config = EntityClientConfig {
                url,
                timezone: tz,
                cache_dir,
                ..Default::default()
            };
            let client = EntityClient::configure(config).await;
            if !client.is_enabled() {
                eprintln!("  Entity service unavailable, results will be empty");
            }

            let results = client.extract_many(&inputs, &lang, !no_cache).await;
            client.shutdown().await;

            let out: Vec<_> = inputs
                .iter()
                .zip(&results)
                .map(|(input, entities)| serde_json::json!({ "input": input, "entities": entities }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Crossval {
            dataset,
            k,
            seed,
            suite,
            json,
        } => {
            let suite_name = suite.unwrap_or_else(|| suite_name_of(&dataset));
            let config = CrossValidationConfig { k, seed };
            let (report, stats) = suite::run_suite(&suite_name, &dataset, &config).await?;
            eprintln!(
                "  {} samples, {} intents in {:.2}s",
                stats.samples, stats.intents, stats.elapsed_secs
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", display::render_report(&report));
            }
        }
    }
    Ok(())
}

fn read_bundle(path: &Path) -> anyhow::Result<PredictionBundle> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing prediction bundle {}", path.display()))
}

fn suite_name_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "suite".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_algorithm_flag() {
        let cli = Cli::try_parse_from(["quorum", "elect", "b.json", "--algorithm", "legacy"]).unwrap();
        match cli.command {
            Command::Elect { algorithm, .. } => assert_eq!(algorithm, ElectionAlgorithm::Legacy),
            _ => panic!("expected elect"),
        }
        assert!(Cli::try_parse_from(["quorum", "elect", "b.json", "-a", "fancy"]).is_err());
    }

    #[test]
    fn corrected_bundle_needs_both_texts() {
        let args = ["quorum", "elect", "b.json", "--corrected", "c.json", "--text", "helo"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn suite_name_defaults_to_file_stem() {
        assert_eq!(suite_name_of(Path::new("data/smalltalk.json")), "smalltalk");
    }

    #[test]
    fn reads_bundle_with_camel_case_contexts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        std::fs::write(
            &path,
            r#"{"predictions": {"main": {"confidence": 1, "oos": 0, "intents": [{"label": "A", "confidence": 0.9}]}},
                "includedContexts": ["main"]}"#,
        )
        .unwrap();
        let bundle = read_bundle(&path).unwrap();
        assert_eq!(bundle.included_contexts, vec!["main"]);
        assert_eq!(elect(bundle, ElectionAlgorithm::Natural).elected_intent.unwrap().name, "A");
    }
}
