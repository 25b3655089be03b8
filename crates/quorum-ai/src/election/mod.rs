//! Election engine: turns per-context predictions into a single elected
//! intent, a ranking, an ambiguity flag, and the elected intent's slots.
//!
//! `elect` is pure and never fails. Malformed references are logged and
//! skipped.

mod ambiguity;
mod legacy;
mod natural;
mod slots;
mod stats;

use std::fmt;
use std::str::FromStr;

use quorum_core::{PredictionBundle, UnderstandingResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use ambiguity::AMBIGUITY_BAND;
pub use legacy::{
    CONFUSION_TOP3_STD, CONFUSION_Z_THRESHOLD, LOW_CONFIDENCE_OOS, LOW_CONFIDENCE_THRESHOLD,
    OOS_INJECT_THRESHOLD,
};

/// Which ranking strategy the election uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionAlgorithm {
    /// Per-context log-normal split across every included context.
    Legacy,
    /// Best context only, with its OOS score competing as `none`.
    #[default]
    Natural,
}

impl ElectionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Natural => "natural",
        }
    }
}

impl fmt::Display for ElectionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown election algorithm: {0} (expected \"legacy\" or \"natural\")")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for ElectionAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "natural" => Ok(Self::Natural),
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Run the election over a prediction bundle.
///
/// A bundle without predictions comes back untouched, with no election
/// fields set.
pub fn elect(bundle: PredictionBundle, algorithm: ElectionAlgorithm) -> UnderstandingResult {
    let Some(predictions) = bundle.predictions.as_ref() else {
        return UnderstandingResult::from(bundle);
    };

    let ranked_intents = match algorithm {
        ElectionAlgorithm::Natural => natural::rank(predictions, &bundle.included_contexts),
        ElectionAlgorithm::Legacy => legacy::rank(predictions, &bundle.included_contexts),
    };
    let elected_intent = ranked_intents.first().cloned();
    let ambiguous = ambiguity::detect_ambiguity(&ranked_intents);
    let slots = slots::extract_slots(&bundle, elected_intent.as_ref(), ambiguous);

    debug!(
        algorithm = %algorithm,
        elected = elected_intent.as_ref().map(|e| e.name.as_str()).unwrap_or("-"),
        candidates = ranked_intents.len(),
        ambiguous,
        "election complete"
    );

    UnderstandingResult {
        bundle,
        elected_intent,
        ranked_intents,
        ambiguous,
        slots,
    }
}
