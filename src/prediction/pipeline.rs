//! Prediction orchestration
//!
//! Validates the feature form, asks the model service, normalizes whatever
//! shape comes back and hands qualifying records to the alert trigger.

use super::features::RelapseFeatures;
use super::normalizer::PredictionNormalizer;
use crate::alert::AlertTrigger;
use crate::detached::DetachedHandle;
use crate::error::EngineError;
use crate::services::RiskModelService;
use crate::types::PredictionRecord;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs feature forms through the risk model
pub struct Predictor {
    model: Arc<dyn RiskModelService>,
    alerts: Option<AlertTrigger>,
}

impl Predictor {
    pub fn new(model: Arc<dyn RiskModelService>) -> Self {
        Self {
            model,
            alerts: None,
        }
    }

    pub fn with_alerts(mut self, trigger: AlertTrigger) -> Self {
        self.alerts = Some(trigger);
        self
    }

    /// Predict relapse risk for `features`.
    ///
    /// Alerts are started but never awaited; their outcome cannot change the
    /// returned record.
    pub async fn predict(&self, features: &RelapseFeatures) -> Result<PredictionRecord, EngineError> {
        let (record, _alerts) = self.predict_with_alerts(features).await?;
        Ok(record)
    }

    /// Like [`predict`](Self::predict) but also returns the detached alert
    /// task handles, so a short-lived process can let them settle.
    pub async fn predict_with_alerts(
        &self,
        features: &RelapseFeatures,
    ) -> Result<(PredictionRecord, Vec<DetachedHandle>), EngineError> {
        features.validate()?;
        if features.is_trivial() {
            return Err(EngineError::TrivialPayload(
                "every answer is still at its default, fill in the profile first".to_string(),
            ));
        }

        let prepared = features.prepared();
        debug!(
            frequency = %prepared.pulling_frequency,
            emotion = %prepared.emotion,
            "sending features to risk model"
        );
        let raw = self.model.predict(&prepared).await?;
        let record = PredictionNormalizer::normalize(&raw)?;

        info!(
            score = record.risk_score,
            bucket = %record.risk_bucket,
            confidence = record.confidence,
            model_version = ?record.model_version,
            "prediction normalized"
        );

        let handles = match &self.alerts {
            Some(trigger) => trigger.maybe_fire(&record),
            None => Vec::new(),
        };
        Ok((record, handles))
    }
}
