//! Joining several inputs into one request text and splitting the returned
//! spans back onto their inputs.
//!
//! Every input is followed by [`JOIN_TOKEN`], so a batch of N inputs carries
//! exactly N join points. Offsets are counted in characters.

use quorum_core::ExtractionResult;

/// Separator placed after every input of a batch.
///
/// Zero-width spaces around the marker keep it from fusing with neighbouring
/// words and make it unlikely in natural text.
pub(crate) const JOIN_TOKEN: &str = "\u{200B}::_::\u{200B}";

/// A span returned by the service, with offsets into the joined text.
#[derive(Debug, Clone)]
pub(crate) struct RawSpan {
    pub start: usize,
    pub end: usize,
    pub entity: ExtractionResult,
}

/// Character range `[from, to)` of one input inside the joined text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug)]
pub(crate) struct JoinedBatch {
    pub text: String,
    pub segments: Vec<Segment>,
}

/// Join `inputs` with a trailing token after each one.
///
/// Occurrences of the token inside an input are masked with spaces of the
/// same character length, so segmentation stays exact and offsets stay valid.
pub(crate) fn join(inputs: &[&str]) -> JoinedBatch {
    let mask = " ".repeat(JOIN_TOKEN.chars().count());
    let mut text = String::new();
    for input in inputs {
        if input.contains(JOIN_TOKEN) {
            tracing::warn!("input contains the batch join token, masking it");
            text.push_str(&input.replace(JOIN_TOKEN, &mask));
        } else {
            text.push_str(input);
        }
        text.push_str(JOIN_TOKEN);
    }

    let segments = segments_of(&text);
    debug_assert_eq!(segments.len(), inputs.len());
    JoinedBatch { text, segments }
}

/// Recover input segments from the join token positions in `text`.
fn segments_of(text: &str) -> Vec<Segment> {
    let token_chars = JOIN_TOKEN.chars().count();
    let mut segments = Vec::new();
    let mut from = 0;
    // Running byte → char conversion; match_indices yields ascending offsets.
    let mut last_byte = 0;
    let mut last_char = 0;

    for (byte_idx, _) in text.match_indices(JOIN_TOKEN) {
        last_char += text[last_byte..byte_idx].chars().count();
        last_byte = byte_idx;
        segments.push(Segment {
            from,
            to: last_char,
        });
        from = last_char + token_chars;
    }
    segments
}

/// Assign every span to the segment containing it and rebase its offsets.
///
/// Spans crossing a segment boundary belong to no input and are dropped.
pub(crate) fn split_spans(spans: Vec<RawSpan>, segments: &[Segment]) -> Vec<Vec<ExtractionResult>> {
    let mut out = vec![Vec::new(); segments.len()];
    for span in spans {
        if span.start > span.end {
            continue;
        }
        let owner = segments
            .iter()
            .position(|s| span.start >= s.from && span.end <= s.to);
        match owner {
            Some(idx) => {
                let segment = segments[idx];
                let mut entity = span.entity;
                entity.start = span.start - segment.from;
                entity.end = span.end - segment.from;
                out[idx].push(entity);
            }
            None => {
                tracing::debug!(start = span.start, end = span.end, "dropping span across inputs");
            }
        }
    }
    out
}
