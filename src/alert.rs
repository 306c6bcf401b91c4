//! Elevated-risk alerting
//!
//! Deciding is synchronous and deterministic. Acting on the decision is not:
//! the dispatch request and the supportive notification both run detached,
//! so a slow or failing alert service never touches the prediction the caller
//! already has.

use crate::config::{AlertConfig, DEFAULT_HIGH_RISK_THRESHOLD};
use crate::detached::{spawn_detached, DetachedHandle};
use crate::error::EngineError;
use crate::services::{AlertDispatchService, SupportiveNotifier};
use crate::types::{PredictionRecord, RiskBucket};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// When to alert and how long to wait for the dispatch service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    pub high_risk_threshold: f64,
    pub dispatch_timeout: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            high_risk_threshold: DEFAULT_HIGH_RISK_THRESHOLD,
            dispatch_timeout: Duration::from_secs(10),
        }
    }
}

impl AlertPolicy {
    /// High bucket alone is enough, and so is a score at the threshold
    pub fn should_alert(&self, record: &PredictionRecord) -> bool {
        record.risk_bucket == RiskBucket::High || record.risk_score >= self.high_risk_threshold
    }
}

/// Fires the alert side effects for qualifying predictions
pub struct AlertTrigger {
    policy: AlertPolicy,
    dispatcher: Arc<dyn AlertDispatchService>,
    notifier: Arc<dyn SupportiveNotifier>,
    title: String,
    message: String,
}

impl AlertTrigger {
    pub fn new(
        policy: AlertPolicy,
        dispatcher: Arc<dyn AlertDispatchService>,
        notifier: Arc<dyn SupportiveNotifier>,
    ) -> Self {
        let copy = AlertConfig::default();
        Self {
            policy,
            dispatcher,
            notifier,
            title: copy.supportive_title,
            message: copy.supportive_message,
        }
    }

    /// Replace the supportive notification text
    pub fn with_message(mut self, title: impl Into<String>, message: impl Into<String>) -> Self {
        self.title = title.into();
        self.message = message.into();
        self
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// Start the alert side effects if `record` qualifies.
    ///
    /// Returns the handles of the spawned tasks, empty when the record does
    /// not qualify. Callers normally drop them.
    pub fn maybe_fire(&self, record: &PredictionRecord) -> Vec<DetachedHandle> {
        if !self.policy.should_alert(record) {
            debug!(
                score = record.risk_score,
                bucket = %record.risk_bucket,
                "below alert threshold"
            );
            return Vec::new();
        }

        info!(
            score = record.risk_score,
            bucket = %record.risk_bucket,
            threshold = self.policy.high_risk_threshold,
            "elevated risk, firing alert"
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let timeout = self.policy.dispatch_timeout;
        let score = record.risk_score;
        let dispatch = spawn_detached("alert-dispatch", async move {
            let result = tokio::time::timeout(timeout, dispatcher.dispatch(score))
                .await
                .map_err(|_| {
                    EngineError::Unavailable(format!(
                        "alert service did not answer within {:?}",
                        timeout
                    ))
                })??;

            if result.ok {
                info!(sent = ?result.sent, message = ?result.message, "alert dispatched");
            } else {
                warn!(message = ?result.message, "alert service declined to send");
            }
            Ok::<(), EngineError>(())
        });

        let notifier = Arc::clone(&self.notifier);
        let title = self.title.clone();
        let message = self.message.clone();
        let notification = spawn_detached("supportive-notification", async move {
            notifier.notify(&title, &message);
            Ok::<(), EngineError>(())
        });

        dispatch.into_iter().chain(notification).collect()
    }
}
