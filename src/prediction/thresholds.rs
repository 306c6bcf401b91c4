//! Risk bucket thresholds shared with the model service

use crate::types::RiskBucket;

/// Scores at or below this are low risk
pub const LOW_MAX: f64 = 0.49;

/// Scores at or above this are high risk
pub const HIGH_MIN: f64 = 0.70;

pub fn bucket_from_score(score: f64) -> RiskBucket {
    if score >= HIGH_MIN {
        RiskBucket::High
    } else if score <= LOW_MAX {
        RiskBucket::Low
    } else {
        RiskBucket::Medium
    }
}

/// Distance from the 0.5 decision boundary, scaled to 0-1
pub fn confidence_from_score(score: f64) -> f64 {
    ((score - 0.5).abs() * 2.0).min(1.0)
}
