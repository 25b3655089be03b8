//! Resolution layer: turns per-context predictions into one elected intent
//! and measures classifier quality with stratified k-fold cross-validation.

pub mod centroid;
pub mod crossval;
pub mod election;
pub mod metrics;
pub mod spellcheck;

pub use centroid::{CentroidClassifier, CentroidEvaluator};
pub use crossval::{CrossValidationConfig, Fold, FoldEvaluator, FoldSummary, SuiteReport};
pub use election::{ElectionAlgorithm, UnknownAlgorithm, elect};
pub use metrics::{ALL_CLASSES, ClassScore, ConfusionTally, RENAMED_ALL_CLASS};
pub use spellcheck::merge_spellchecked;
