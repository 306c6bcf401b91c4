//! TrichMind core - on-device streak and relapse-risk engine
//!
//! Keeps the daily check-in log, derives streak statistics from it, decides
//! when server statistics may stand in for local ones, and turns risk model
//! responses into one canonical record that can trigger a supportive alert.
//!
//! ## Modules
//!
//! - **Streaks**: [`store`], [`streak`], [`reconcile`] and the [`tracker`] façade
//! - **Prediction**: [`prediction`] (features, normalization, pipeline) and [`alert`]
//! - **Remote**: [`services`] traits with an HTTP client, [`refresh`] ordering

pub mod alert;
pub mod clock;
pub mod config;
pub mod detached;
pub mod error;
pub mod logging;
pub mod prediction;
pub mod reconcile;
pub mod refresh;
pub mod services;
pub mod store;
pub mod streak;
pub mod tracker;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use alert::{AlertPolicy, AlertTrigger};
pub use config::EngineConfig;
pub use error::EngineError;
pub use prediction::{PredictionNormalizer, Predictor, RelapseFeatures};
pub use reconcile::{record_check_in, ReconciliationPolicy};
pub use store::CheckInStore;
pub use streak::{Adjacency, StreakCalculator};
pub use tracker::StreakTracker;
pub use types::{
    CalendarDate, CheckInLog, CheckInRecord, PredictionRecord, RemoteSummary, RiskBucket,
    StatsSource, StreakSnapshot,
};

/// Engine version reported by the CLI and the C ABI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in reports
pub const PRODUCER_NAME: &str = "trichmind-core";
