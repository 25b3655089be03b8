use std::collections::BTreeMap;

use quorum_core::{PredictionBundle, RankedIntent, Slot};
use tracing::warn;

/// Slots of the elected candidate, looked up in its own context.
///
/// Nothing is extracted for `none` or for an ambiguous election. An elected
/// context missing from the bundle is malformed input and yields no slots.
pub(crate) fn extract_slots(
    bundle: &PredictionBundle,
    elected: Option<&RankedIntent>,
    ambiguous: bool,
) -> BTreeMap<String, Slot> {
    let Some(elected) = elected else {
        return BTreeMap::new();
    };
    if ambiguous || elected.is_none() {
        return BTreeMap::new();
    }

    let Some(ctx) = bundle.context(&elected.context) else {
        warn!(
            intent = %elected.name,
            context = %elected.context,
            "elected context missing from predictions, skipping slot extraction"
        );
        return BTreeMap::new();
    };

    ctx.intents
        .iter()
        .find(|i| i.label == elected.name)
        .map(|i| i.slots.clone())
        .unwrap_or_default()
}
