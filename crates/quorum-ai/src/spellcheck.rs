//! Merging of predictions made on the original text with predictions made on
//! its spell-corrected version, before the election runs.

use quorum_core::{ContextPrediction, IntentCandidate, PredictionBundle};
use tracing::debug;

/// Fold the corrected run into the original one.
///
/// Nothing happens when the correction did not change the text or when
/// either run has no predictions. Otherwise, per context present in both
/// runs:
/// - the context confidences are averaged when the corrected run's best
///   context beats the original's best;
/// - intent confidences take the per-label maximum when the corrected run's
///   best non-`none` intent is at least as confident;
/// - the OOS score always comes from the corrected run.
pub fn merge_spellchecked(
    original_text: &str,
    corrected_text: &str,
    original: &PredictionBundle,
    corrected: &PredictionBundle,
) -> PredictionBundle {
    if original_text == corrected_text {
        return original.clone();
    }
    let (Some(orig_preds), Some(corr_preds)) = (&original.predictions, &corrected.predictions) else {
        return original.clone();
    };

    let corrected_context_wins = best_context_confidence(corr_preds.values())
        > best_context_confidence(orig_preds.values());

    let mut merged = orig_preds.clone();
    for (name, ctx) in merged.iter_mut() {
        let Some(corr) = corr_preds.get(name) else {
            continue;
        };
        if corrected_context_wins {
            ctx.confidence = (ctx.confidence + corr.confidence) / 2.0;
        }
        if best_intent_confidence(&corr.intents) >= best_intent_confidence(&ctx.intents) {
            take_max_per_label(&mut ctx.intents, &corr.intents);
        }
        ctx.out_of_scope_score = corr.out_of_scope_score;
    }

    debug!(
        original = original_text,
        corrected = corrected_text,
        corrected_context_wins,
        "merged spell-checked predictions"
    );

    PredictionBundle {
        predictions: Some(merged),
        included_contexts: original.included_contexts.clone(),
    }
}

fn best_context_confidence<'a>(contexts: impl Iterator<Item = &'a ContextPrediction>) -> f64 {
    contexts.map(|c| c.confidence).fold(f64::NEG_INFINITY, f64::max)
}

fn best_intent_confidence(intents: &[IntentCandidate]) -> f64 {
    intents
        .iter()
        .filter(|i| !i.is_none())
        .map(|i| i.confidence)
        .fold(f64::NEG_INFINITY, f64::max)
}

fn take_max_per_label(intents: &mut Vec<IntentCandidate>, corrected: &[IntentCandidate]) {
    for corr in corrected {
        match intents.iter_mut().find(|i| i.label == corr.label) {
            Some(existing) if corr.confidence > existing.confidence => {
                existing.confidence = corr.confidence;
            }
            Some(_) => {}
            None => intents.push(corr.clone()),
        }
    }
}
