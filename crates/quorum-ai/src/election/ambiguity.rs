use quorum_core::RankedIntent;

/// Distance from a perfectly even split that still counts as undecided.
pub const AMBIGUITY_BAND: f64 = 0.1;

/// True when the ranking cannot tell its candidates apart.
///
/// Confidences are rescaled to sum to 1 before comparing each one with
/// `1/N`. A `none` at the top does not lift the ambiguity if everything
/// below it is evenly split.
pub(crate) fn detect_ambiguity(ranked: &[RankedIntent]) -> bool {
    let n = ranked.len();
    if n < 2 {
        return false;
    }

    let total: f64 = ranked.iter().map(|r| r.confidence).sum();
    let rescaled: Vec<f64> = ranked
        .iter()
        .map(|r| if total > 0.0 { r.confidence / total } else { 1.0 / n as f64 })
        .collect();

    let perfect = 1.0 / n as f64;
    let in_band = |c: &f64| (perfect - AMBIGUITY_BAND..=perfect + AMBIGUITY_BAND).contains(c);

    rescaled.iter().all(in_band) || (ranked[0].is_none() && rescaled[1..].iter().all(in_band))
}
