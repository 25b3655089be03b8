//! Natural election: trust the best context and let its out-of-scope score
//! compete with its intents as a `none` candidate.

use std::collections::BTreeMap;

use quorum_core::{ContextPrediction, GLOBAL_CONTEXT, NONE_INTENT, RankedIntent};

use super::stats::sort_desc_by;

/// Rank the top two candidates of the most confident context.
pub(crate) fn rank(predictions: &BTreeMap<String, ContextPrediction>, included: &[String]) -> Vec<RankedIntent> {
    let global = ContextPrediction {
        confidence: 1.0,
        out_of_scope_score: 0.0,
        intents: Vec::new(),
    };
    let (ctx_name, ctx) = pick_context(predictions, included).unwrap_or((GLOBAL_CONTEXT, &global));

    let mut candidates: Vec<(&str, f64)> = ctx
        .intents
        .iter()
        .map(|i| (i.label.as_str(), i.confidence))
        .collect();
    candidates.push((NONE_INTENT, ctx.effective_oos()));
    sort_desc_by(&mut candidates, |c| c.1);

    let mut top: Vec<(&str, f64)> = Vec::with_capacity(2);
    for candidate in candidates {
        if top.len() == 2 {
            break;
        }
        if !top.iter().any(|(label, _)| *label == candidate.0) {
            top.push(candidate);
        }
    }

    let total: f64 = top.iter().map(|c| c.1).sum();
    let n = top.len() as f64;
    top.into_iter()
        .map(|(label, confidence)| {
            let scaled = if total > 0.0 { confidence / total } else { 1.0 / n };
            RankedIntent::new(label, ctx_name, scaled)
        })
        .collect()
}

/// Highest-confidence context among the included ones, or among all when
/// none of the included contexts was predicted. Ties go to the first one.
fn pick_context<'a>(
    predictions: &'a BTreeMap<String, ContextPrediction>,
    included: &[String],
) -> Option<(&'a str, &'a ContextPrediction)> {
    let best = |only_included: bool| {
        predictions
            .iter()
            .filter(|(name, _)| !only_included || included.contains(*name))
            .fold(None, |best: Option<(&'a String, &'a ContextPrediction)>, (name, ctx)| match best {
                Some((_, b)) if b.confidence >= ctx.confidence => best,
                _ => Some((name, ctx)),
            })
    };
    best(true)
        .or_else(|| best(false))
        .map(|(name, ctx)| (name.as_str(), ctx))
}
