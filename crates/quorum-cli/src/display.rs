//! Human-readable rendering of cross-validation reports and election results.
//!
//! Renders into a `String` so callers choose the stream; the binary prints
//! tables to stdout and progress to stderr.

use std::fmt::{self, Write};

use quorum_ai::{ALL_CLASSES, SuiteReport};
use quorum_core::UnderstandingResult;

const MAX_CONFUSIONS: usize = 3;
const CLASS_WIDTH: usize = 24;

// ── Cross-validation ──

/// Per-class score table, the `all` row last, followed by the fold sizes.
pub fn render_report(report: &SuiteReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    write_report(&mut out, report).map(|()| out).unwrap_or_default()
}

fn write_report(out: &mut String, report: &SuiteReport) -> fmt::Result {
    writeln!(out, "=== {} ({}-fold) ===", report.suite_name, report.k)?;
    writeln!(
        out,
        "  {:<CLASS_WIDTH$} {:>5} {:>5} {:>5} {:>9} {:>7} {:>6}  confused with",
        "class", "tp", "fp", "fn", "precision", "recall", "f1"
    )?;

    let rows = report
        .classes
        .iter()
        .filter(|(name, _)| name.as_str() != ALL_CLASSES)
        .chain(report.classes.get_key_value(ALL_CLASSES));
    for (name, score) in rows {
        writeln!(
            out,
            "  {:<CLASS_WIDTH$} {:>5} {:>5} {:>5} {:>9.3} {:>7.3} {:>6.3}  {}",
            truncate(name, CLASS_WIDTH),
            score.true_positive,
            score.false_positive,
            score.false_negative,
            score.precision,
            score.recall,
            score.f1,
            top_confusions(&score.confusions),
        )?;
    }

    writeln!(out)?;
    writeln!(out, "Folds")?;
    for fold in &report.folds {
        writeln!(
            out,
            "  #{:<3} train {:>5}  test {:>5}  accuracy {:.3}",
            fold.index, fold.train_size, fold.test_size, fold.accuracy
        )?;
    }
    Ok(())
}

/// Most frequent wrong predictions, e.g. `bye×3, none×1`.
fn top_confusions(confusions: &std::collections::BTreeMap<String, u64>) -> String {
    let mut items: Vec<(&String, &u64)> = confusions.iter().collect();
    items.sort_by(|a, b| b.1.cmp(a.1));
    let shown: Vec<String> = items
        .iter()
        .take(MAX_CONFUSIONS)
        .map(|(label, n)| format!("{label}×{n}"))
        .collect();
    let mut line = shown.join(", ");
    if items.len() > MAX_CONFUSIONS {
        line.push_str(&format!(" (+{} more)", items.len() - MAX_CONFUSIONS));
    }
    line
}

// ── Election ──

/// One-line summary of an election, for stderr.
pub fn render_election_summary(result: &UnderstandingResult) -> String {
    match &result.elected_intent {
        None => "no election (no predictions)".to_string(),
        Some(elected) => {
            let mut line = format!(
                "elected {}/{} ({:.3})",
                elected.context, elected.name, elected.confidence
            );
            if result.ambiguous {
                line.push_str(" [ambiguous]");
            }
            if !result.slots.is_empty() {
                let names: Vec<&str> = result.slots.keys().map(String::as_str).collect();
                line.push_str(" slots: ");
                line.push_str(&names.join(", "));
            }
            line
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}
