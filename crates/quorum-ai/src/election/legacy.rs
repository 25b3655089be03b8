//! Legacy election: every context contributes its two best intents, split
//! under a log-normal assumption and weighted by the context confidence.
//!
//! Kept for bots configured before the natural election existed. The
//! thresholds are empirically tuned and must not change.

use std::collections::BTreeMap;

use quorum_core::{ContextPrediction, GLOBAL_CONTEXT, NONE_INTENT, RankedIntent};

use super::stats::{normal_cdf, round_to, sample_std, sort_desc_by};

/// OOS score from which a `none` candidate joins a context's intents.
pub const OOS_INJECT_THRESHOLD: f64 = 0.4;
/// Upper bound on `(top1 - top2) / stdev` for a context to count as confused.
pub const CONFUSION_Z_THRESHOLD: f64 = 2.5;
/// Upper bound on the spread of the three best confidences of a confused context.
pub const CONFUSION_TOP3_STD: f64 = 0.03;
/// Winning confidence under which a high OOS score overrides the election.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.4;
/// OOS score above which the low-confidence override applies.
pub const LOW_CONFIDENCE_OOS: f64 = 0.4;

#[derive(Debug, Clone)]
struct Candidate<'a> {
    label: &'a str,
    confidence: f64,
}

/// Rank intents across all included contexts.
///
/// When no included context was predicted, `none` is elected in the global
/// context.
pub(crate) fn rank(predictions: &BTreeMap<String, ContextPrediction>, included: &[String]) -> Vec<RankedIntent> {
    let in_scope: Vec<&str> = predictions
        .keys()
        .filter(|name| included.contains(*name))
        .map(String::as_str)
        .collect();
    if in_scope.is_empty() {
        return vec![RankedIntent::new(NONE_INTENT, GLOBAL_CONTEXT, 1.0)];
    }

    let included_total = in_scope
        .iter()
        .filter_map(|name| predictions.get(*name))
        .map(|ctx| ctx.confidence)
        .sum::<f64>()
        .min(1.0);

    let mut ranked: Vec<RankedIntent> = Vec::new();
    for (name, ctx) in predictions {
        if !in_scope.contains(&name.as_str()) {
            continue;
        }
        let ctx_confidence = if included_total > 0.0 {
            ctx.confidence / included_total
        } else {
            ctx.confidence
        };
        for candidate in context_candidates(ctx, ctx_confidence) {
            ranked.push(RankedIntent::new(candidate.label, name.as_str(), candidate.confidence));
        }
    }

    sort_desc_by(&mut ranked, |r| r.confidence);
    let mut ranked = dedup_by_name(ranked);
    apply_low_confidence_override(&mut ranked, predictions);
    ranked
}

/// At most two weighted candidates for one context.
fn context_candidates(ctx: &ContextPrediction, ctx_confidence: f64) -> Vec<Candidate<'_>> {
    let mut preds: Vec<Candidate<'_>> = ctx
        .intents
        .iter()
        .map(|i| Candidate {
            label: i.label.as_str(),
            confidence: i.confidence,
        })
        .collect();

    let oos = ctx.effective_oos();
    if oos >= OOS_INJECT_THRESHOLD {
        preds.push(Candidate {
            label: NONE_INTENT,
            confidence: oos,
        });
    }
    for p in &mut preds {
        p.confidence = round_to(p.confidence, 2);
    }
    sort_desc_by(&mut preds, |p| p.confidence);

    if preds.len() >= 3 && is_really_confused(&preds) {
        preds.insert(
            0,
            Candidate {
                label: NONE_INTENT,
                confidence: 1.0,
            },
        );
    }

    match preds.as_slice() {
        [] => vec![Candidate {
            label: NONE_INTENT,
            confidence: 1.0,
        }],
        [top] => vec![Candidate {
            label: top.label,
            confidence: ctx_confidence,
        }],
        [top, ..] if top.confidence >= 1.0 => vec![Candidate {
            label: top.label,
            confidence: ctx_confidence,
        }],
        [first, second, ..] => {
            let p1 = lognormal_split(&preds);
            vec![
                Candidate {
                    label: first.label,
                    confidence: round_to(ctx_confidence * p1, 3),
                },
                Candidate {
                    label: second.label,
                    confidence: round_to(ctx_confidence * (1.0 - p1), 3),
                },
            ]
        }
    }
}

/// The best candidates are too close to each other to trust any of them.
fn is_really_confused(sorted: &[Candidate<'_>]) -> bool {
    let all: Vec<f64> = sorted.iter().map(|p| p.confidence).collect();
    let z = (all[0] - all[1]) / sample_std(&all);
    // A NaN z (no spread at all) falls through to the top-3 test.
    !(z >= CONFUSION_Z_THRESHOLD) && sample_std(&all[..3]) <= CONFUSION_TOP3_STD
}

/// Share of probability mass going to the best of the first two candidates.
fn lognormal_split(sorted: &[Candidate<'_>]) -> f64 {
    let logs: Vec<f64> = sorted
        .iter()
        .filter(|p| p.confidence > 0.0)
        .map(|p| p.confidence.ln())
        .collect();
    let z = (sorted[0].confidence.ln() - sorted[1].confidence.ln()) / sample_std(&logs);
    let p1 = normal_cdf(z);
    if p1.is_nan() { 0.5 } else { p1 }
}

fn dedup_by_name(ranked: Vec<RankedIntent>) -> Vec<RankedIntent> {
    let mut out: Vec<RankedIntent> = Vec::with_capacity(ranked.len());
    for r in ranked {
        if !out.iter().any(|o| o.name == r.name) {
            out.push(r);
        }
    }
    out
}

/// A weak winner in a context that looks out of scope loses to `none`.
fn apply_low_confidence_override(ranked: &mut Vec<RankedIntent>, predictions: &BTreeMap<String, ContextPrediction>) {
    let Some(top) = ranked.first() else {
        return;
    };
    if top.is_none() || top.confidence >= LOW_CONFIDENCE_THRESHOLD {
        return;
    }
    let context = top.context.clone();
    let Some(oos) = predictions.get(&context).map(ContextPrediction::effective_oos) else {
        return;
    };
    if oos <= LOW_CONFIDENCE_OOS {
        return;
    }

    ranked.retain(|r| !r.is_none());
    ranked.push(RankedIntent::new(NONE_INTENT, context, oos));
    sort_desc_by(ranked, |r| r.confidence);
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::IntentCandidate;

    fn ctx(confidence: f64, oos: f64, intents: &[(&str, f64)]) -> ContextPrediction {
        ContextPrediction {
            confidence,
            out_of_scope_score: oos,
            intents: intents
                .iter()
                .map(|(l, c)| IntentCandidate::new(*l, *c))
                .collect(),
        }
    }

    fn included(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn best_intent_of_best_context_wins() {
        let predictions = BTreeMap::from([
            ("ctxA".to_string(), ctx(0.5, 0.0, &[("X", 0.9), ("Y", 0.1)])),
            ("ctxB".to_string(), ctx(0.5, 0.0, &[("Z", 0.5), ("W", 0.3), ("V", 0.2)])),
        ]);
        let ranked = rank(&predictions, &included(&["ctxA", "ctxB"]));

        assert_eq!(ranked[0].name, "X");
        assert_eq!(ranked[0].context, "ctxA");
        // Two candidates always sit sqrt(2) standard deviations apart.
        assert!((ranked[0].confidence - round_to(0.5 * normal_cdf(2f64.sqrt()), 3)).abs() < 1e-9);
        assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn single_candidate_takes_context_confidence() {
        let predictions = BTreeMap::from([
            ("a".to_string(), ctx(0.6, 0.0, &[("X", 0.7)])),
            ("b".to_string(), ctx(0.4, 0.0, &[("Y", 0.9)])),
        ]);
        let ranked = rank(&predictions, &included(&["a", "b"]));
        assert_eq!(ranked[0].name, "X");
        assert!((ranked[0].confidence - 0.6).abs() < 1e-9);
        assert!((ranked[1].confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn context_without_candidates_elects_none() {
        let predictions = BTreeMap::from([("a".to_string(), ctx(1.0, 0.0, &[]))]);
        let ranked = rank(&predictions, &included(&["a"]));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, NONE_INTENT);
        assert_eq!(ranked[0].confidence, 1.0);
    }

    #[test]
    fn high_oos_injects_none() {
        let predictions = BTreeMap::from([("a".to_string(), ctx(1.0, 0.7, &[("X", 0.2), ("Y", 0.1)]))]);
        let ranked = rank(&predictions, &included(&["a"]));
        assert_eq!(ranked[0].name, NONE_INTENT);
        assert_eq!(ranked[1].name, "X");
    }

    #[test]
    fn exact_match_ignores_oos() {
        let mut a = ctx(1.0, 0.9, &[("X", 1.0)]);
        a.intents[0].extractor = quorum_core::EXACT_MATCH_EXTRACTOR.to_string();
        let predictions = BTreeMap::from([("a".to_string(), a)]);
        let ranked = rank(&predictions, &included(&["a"]));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "X");
    }

    #[test]
    fn confused_context_forces_none() {
        // Three nearly identical confidences after rounding.
        let predictions = BTreeMap::from([(
            "a".to_string(),
            ctx(1.0, 0.0, &[("X", 0.34), ("Y", 0.33), ("Z", 0.33)]),
        )]);
        let ranked = rank(&predictions, &included(&["a"]));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, NONE_INTENT);
    }

    #[test]
    fn spread_candidates_are_not_confused() {
        let preds = [
            Candidate { label: "X", confidence: 0.6 },
            Candidate { label: "Y", confidence: 0.3 },
            Candidate { label: "Z", confidence: 0.1 },
        ];
        assert!(!is_really_confused(&preds));
    }

    #[test]
    fn excluded_contexts_are_dropped() {
        let predictions = BTreeMap::from([
            ("a".to_string(), ctx(0.9, 0.0, &[("X", 1.0)])),
            ("b".to_string(), ctx(0.3, 0.0, &[("Y", 1.0)])),
        ]);
        let ranked = rank(&predictions, &included(&["b"]));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "Y");
        // Normalised against the included total only.
        assert!((ranked[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn no_included_context_elects_global_none() {
        let predictions = BTreeMap::from([("a".to_string(), ctx(1.0, 0.0, &[("X", 0.9), ("Y", 0.1)]))]);
        let ranked = rank(&predictions, &included(&["other"]));
        assert_eq!(ranked, vec![RankedIntent::new(NONE_INTENT, GLOBAL_CONTEXT, 1.0)]);

        let ranked = rank(&BTreeMap::new(), &included(&["a"]));
        assert_eq!(ranked[0].name, NONE_INTENT);
        assert_eq!(ranked[0].context, GLOBAL_CONTEXT);
    }

    #[test]
    fn identical_confidences_are_confused() {
        let predictions = BTreeMap::from([(
            "a".to_string(),
            ctx(1.0, 0.0, &[("A", 0.3), ("B", 0.3), ("C", 0.3)]),
        )]);
        let ranked = rank(&predictions, &included(&["a"]));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, NONE_INTENT);
        assert_eq!(ranked[0].confidence, 1.0);
    }

    #[test]
    fn labels_are_deduplicated_across_contexts() {
        let predictions = BTreeMap::from([
            ("a".to_string(), ctx(0.5, 0.0, &[("X", 1.0)])),
            ("b".to_string(), ctx(0.5, 0.0, &[("X", 1.0)])),
        ]);
        let ranked = rank(&predictions, &included(&["a", "b"]));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].context, "a");
    }

    #[test]
    fn weak_winner_loses_to_out_of_scope() {
        // Strong winner elsewhere: no override.
        let predictions = BTreeMap::from([
            ("a".to_string(), ctx(0.3, 0.39, &[("X", 0.9)])),
            ("b".to_string(), ctx(0.7, 0.0, &[("Y", 0.9)])),
        ]);
        let ranked = rank(&predictions, &included(&["a", "b"]));
        assert_eq!(ranked[0].name, "Y");

        let predictions = BTreeMap::from([
            ("a".to_string(), ctx(0.3, 0.0, &[("X", 0.9)])),
            ("b".to_string(), ctx(0.2, 0.0, &[("Y", 0.9)])),
        ]);
        let mut ranked = vec![RankedIntent::new("X", "a", 0.3), RankedIntent::new("Y", "b", 0.2)];
        apply_low_confidence_override(&mut ranked, &predictions);
        assert_eq!(ranked[0].name, "X");

        let predictions = BTreeMap::from([("a".to_string(), ctx(0.3, 0.6, &[("X", 0.9)]))]);
        let mut ranked = vec![RankedIntent::new("X", "a", 0.3)];
        apply_low_confidence_override(&mut ranked, &predictions);
        assert_eq!(ranked[0].name, NONE_INTENT);
        assert!((ranked[0].confidence - 0.6).abs() < 1e-9);
        assert_eq!(ranked.len(), 2);
    }
}
