pub mod entity;
pub mod training;
pub mod understanding;

pub use entity::ExtractionResult;
pub use training::{TrainingSample, group_by_intent};
pub use understanding::{
    ContextPrediction, EXACT_MATCH_EXTRACTOR, GLOBAL_CONTEXT, IntentCandidate, NONE_INTENT,
    PredictionBundle, RankedIntent, Slot, UnderstandingResult,
};
