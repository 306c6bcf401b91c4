//! Remote collaborators
//!
//! The engine talks to four network services and one local notifier. Each is
//! a trait so the UI layer (or a test) can supply its own implementation;
//! [`HttpApi`] is the stock JSON-over-HTTP one.

mod http;

pub use http::HttpApi;

use crate::error::EngineError;
use crate::prediction::RelapseFeatures;
use crate::types::{AlertDispatchResult, CheckInPayload, RemoteSummary};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// Read-only streak summary kept by the server
#[async_trait]
pub trait RemoteSummaryService: Send + Sync {
    async fn fetch_summary(&self) -> Result<RemoteSummary, EngineError>;
}

/// Mirrors local check-ins to the server
#[async_trait]
pub trait CheckInSyncService: Send + Sync {
    async fn post_check_in(&self, payload: &CheckInPayload) -> Result<(), EngineError>;
}

/// Black-box risk model. Returns the raw response body for normalization.
#[async_trait]
pub trait RiskModelService: Send + Sync {
    async fn predict(&self, features: &RelapseFeatures) -> Result<Value, EngineError>;
}

/// Server-side elevated-risk alerting
#[async_trait]
pub trait AlertDispatchService: Send + Sync {
    async fn dispatch(&self, score: f64) -> Result<AlertDispatchResult, EngineError>;
}

/// Shows a local, non-alarming notification to the user
pub trait SupportiveNotifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Notifier that only writes a log line. Used where no UI is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl SupportiveNotifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title, body, "supportive notification");
    }
}

/// Read an alert dispatch response.
///
/// Accepts `{ok, sent, message}` and the failure form
/// `{ok: false, error, message}`; a failure with only `error` reports that
/// text as the message.
pub fn parse_alert_response(value: &Value) -> AlertDispatchResult {
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

    AlertDispatchResult {
        ok: value.get("ok").and_then(Value::as_bool).unwrap_or(false),
        sent: value.get("sent").and_then(Value::as_bool),
        message: text("message").or_else(|| text("error")),
    }
}
