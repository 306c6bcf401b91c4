//! Risk prediction: model inputs, response normalization and the
//! request pipeline

mod features;
mod normalizer;
mod pipeline;
pub mod thresholds;

pub use features::{
    normalize_frequency, normalize_label, RelapseFeatures, NEUTRAL_EMOTION, NEVER_LOGGED_DAYS,
    UNKNOWN_LABEL,
};
pub use normalizer::{PredictionNormalizer, WireShape, DEFAULT_CONFIDENCE};
pub use pipeline::Predictor;
