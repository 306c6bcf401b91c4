//! JSON-over-HTTP implementation of the remote services

use super::{
    parse_alert_response, AlertDispatchService, CheckInSyncService, RemoteSummaryService,
    RiskModelService,
};
use crate::config::ApiConfig;
use crate::error::EngineError;
use crate::prediction::RelapseFeatures;
use crate::types::{AlertDispatchResult, CheckInPayload, RemoteSummary};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Client for the TrichMind backend and model service
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    config: ApiConfig,
}

impl HttpApi {
    pub fn new(config: ApiConfig) -> Result<Self, EngineError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Turn a non-2xx response into a `Service` error carrying the server's
    /// own explanation when it sent one.
    async fn ensure_success(response: Response, what: &str) -> Result<Response, EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = error_text(&body).unwrap_or_else(|| status.to_string());
        warn!(status = status.as_u16(), what, detail = %detail, "remote call rejected");
        Err(EngineError::Service(format!("{} failed: {}", what, detail)))
    }
}

#[async_trait]
impl RemoteSummaryService for HttpApi {
    async fn fetch_summary(&self) -> Result<RemoteSummary, EngineError> {
        let url = self.config.url(&self.config.summary_path);
        debug!(url = %url, "fetching streak summary");
        let response = self.client.get(&url).send().await?;
        let response = Self::ensure_success(response, "summary fetch").await?;
        Ok(response.json::<RemoteSummary>().await?)
    }
}

#[async_trait]
impl CheckInSyncService for HttpApi {
    async fn post_check_in(&self, payload: &CheckInPayload) -> Result<(), EngineError> {
        let url = self.config.url(&self.config.checkin_path);
        debug!(url = %url, relapsed = payload.relapsed, "syncing check-in");
        let response = self.client.post(&url).json(payload).send().await?;
        Self::ensure_success(response, "check-in sync").await?;
        Ok(())
    }
}

#[async_trait]
impl RiskModelService for HttpApi {
    /// Non-2xx answers are folded into the `{ok: false, message}` envelope so
    /// the normalizer reports them like any other service failure.
    async fn predict(&self, features: &RelapseFeatures) -> Result<Value, EngineError> {
        let url = self.config.url(&self.config.predict_path);
        debug!(url = %url, "requesting risk prediction");
        let response = self.client.post(&url).json(features).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = error_text(&body).unwrap_or_else(|| status.to_string());
            warn!(status = status.as_u16(), message = %message, "prediction request rejected");
            return Ok(json!({"ok": false, "message": message}));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl AlertDispatchService for HttpApi {
    async fn dispatch(&self, score: f64) -> Result<AlertDispatchResult, EngineError> {
        let url = self.config.url(&self.config.alert_path);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "score": score }))
            .send()
            .await?;

        // Failure bodies share the success schema, so parse regardless of status
        let status = response.status();
        let body = response.text().await?;
        let mut result = serde_json::from_str::<Value>(&body)
            .map(|value| parse_alert_response(&value))
            .unwrap_or_default();
        if !status.is_success() {
            result.ok = false;
            if result.message.is_none() {
                result.message = Some(status.to_string());
            }
        }
        Ok(result)
    }
}

/// Error text from a JSON body: `detail`, `message`, or `error`
fn error_text(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::String(_) | Value::Null => None,
            other => Some(other.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::PredictionNormalizer;
    use crate::types::{CalendarDate, RiskBucket};
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    fn api_for(server: &Server) -> HttpApi {
        let config = ApiConfig {
            base_url: server.url(),
            timeout_secs: 5,
            ..ApiConfig::default()
        };
        HttpApi::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_summary_decodes_camel_case() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/relapse/overview")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"currentStreak":5,"previousStreak":3,"longestStreak":12,
                    "relapseCount":4,"last14":[{"date":"2024-01-01","relapsed":false}]}"#,
            )
            .create_async()
            .await;

        let summary = api_for(&server).fetch_summary().await.unwrap();
        mock.assert_async().await;

        assert_eq!(summary.current_streak, 5);
        assert_eq!(summary.previous_streak, 3);
        assert_eq!(summary.longest_streak, 12);
        assert_eq!(summary.relapse_count, 4);
        assert_eq!(summary.last14.len(), 1);
    }

    #[tokio::test]
    async fn test_summary_server_error_is_service_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/relapse/overview")
            .with_status(503)
            .with_body(r#"{"detail":"maintenance"}"#)
            .create_async()
            .await;

        let err = api_for(&server).fetch_summary().await.unwrap_err();
        assert!(matches!(err, EngineError::Service(ref m) if m.contains("maintenance")));
    }

    #[tokio::test]
    async fn test_post_check_in_sends_payload() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/relapse/checkin")
            .match_body(Matcher::Json(json!({
                "relapsed": true,
                "date": "2024-01-03",
                "note": "rough day"
            })))
            .with_status(201)
            .create_async()
            .await;

        let payload = CheckInPayload {
            relapsed: true,
            date: Some(CalendarDate::parse_strict("2024-01-03").unwrap()),
            note: Some("rough day".to_string()),
        };
        api_for(&server).post_check_in(&payload).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_predict_rejection_becomes_failure_envelope() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/predict_relapse_overview")
            .with_status(500)
            .with_body(r#"{"detail":"Model not loaded"}"#)
            .create_async()
            .await;

        let raw = api_for(&server)
            .predict(&RelapseFeatures::default())
            .await
            .unwrap();
        assert_eq!(raw, json!({"ok": false, "message": "Model not loaded"}));

        let err = PredictionNormalizer::normalize(&raw).unwrap_err();
        assert!(matches!(err, EngineError::Service(m) if m == "Model not loaded"));
    }

    #[tokio::test]
    async fn test_predict_returns_raw_body() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/predict_relapse_overview")
            .match_body(Matcher::PartialJson(json!({"pulling_frequency": "daily"})))
            .with_status(200)
            .with_body(r#"{"risk_score":0.81,"risk_bucket":"high","risk_code":2,"confidence":0.62}"#)
            .create_async()
            .await;

        let features = RelapseFeatures {
            pulling_frequency: "daily".to_string(),
            ..RelapseFeatures::default()
        };
        let raw = api_for(&server).predict(&features).await.unwrap();
        let record = PredictionNormalizer::normalize(&raw).unwrap();
        assert_eq!(record.risk_bucket, RiskBucket::High);
        assert_eq!(record.risk_code, Some(2));
    }

    #[tokio::test]
    async fn test_dispatch_parses_both_shapes() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/alerts/high-risk")
            .match_body(Matcher::Json(json!({"score": 0.9})))
            .with_status(200)
            .with_body(r#"{"ok":true,"sent":true,"message":"sent"}"#)
            .create_async()
            .await;

        let result = api_for(&server).dispatch(0.9).await.unwrap();
        mock.assert_async().await;
        assert_eq!(
            result,
            AlertDispatchResult {
                ok: true,
                sent: Some(true),
                message: Some("sent".to_string()),
            }
        );

        let mut failing = Server::new_async().await;
        failing
            .mock("POST", "/api/alerts/high-risk")
            .with_status(502)
            .with_body(r#"{"ok":false,"error":"smtp_down"}"#)
            .create_async()
            .await;

        let failed = api_for(&failing).dispatch(0.9).await.unwrap();
        assert!(!failed.ok);
        assert_eq!(failed.message.as_deref(), Some("smtp_down"));
    }
}
