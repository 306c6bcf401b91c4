//! TrichMind CLI - command-line front end for the streak and risk engine
//!
//! Commands:
//! - check-in: Record today's (or a given day's) check-in
//! - stats: Show streak statistics
//! - normalize: Normalize a raw model service response
//! - predict: Request a relapse-risk prediction
//! - config: Print the effective configuration
//! - doctor: Diagnose storage, configuration and endpoints

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use trichmind_core::clock::{Clock, FixedClock, SystemClock};
use trichmind_core::logging::init_logging;
use trichmind_core::prediction::thresholds::{bucket_from_score, confidence_from_score};
use trichmind_core::refresh::SummaryRefresher;
use trichmind_core::services::{HttpApi, LogNotifier, RemoteSummaryService};
use trichmind_core::store::{decode_log, FileBackend};
use trichmind_core::{
    AlertTrigger, CalendarDate, CheckInStore, EngineConfig, EngineError, PredictionNormalizer,
    PredictionRecord, Predictor, RelapseFeatures, StreakSnapshot, StreakTracker, ENGINE_VERSION,
    PRODUCER_NAME,
};

/// TrichMind - offline-first streak tracking and relapse-risk alerts
#[derive(Parser)]
#[command(name = "trichmind")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Track check-in streaks and relapse risk", long_about = None)]
struct Cli {
    /// Config file (defaults to $TRICHMIND_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the check-in log (overrides the config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a check-in
    CheckIn {
        /// The day included a relapse
        #[arg(long)]
        relapsed: bool,

        /// Day to record (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,

        /// Free-text note sent along with the sync
        #[arg(long)]
        note: Option<String>,

        /// Also sync the check-in to the server
        #[arg(long)]
        sync: bool,

        /// Override today's date (YYYY-MM-DD)
        #[arg(long)]
        today: Option<String>,
    },

    /// Show streak statistics
    Stats {
        /// Override today's date (YYYY-MM-DD)
        #[arg(long)]
        today: Option<String>,

        /// Fetch the server summary when there are no local check-ins
        #[arg(long)]
        with_remote: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Normalize a raw model service response
    Normalize {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Recompute bucket, code and confidence from the score
        #[arg(long)]
        derive_bucket: bool,
    },

    /// Request a relapse-risk prediction
    Predict {
        /// Feature form as JSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Skip the elevated-risk alert
        #[arg(long)]
        no_alert: bool,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Diagnose storage, configuration and endpoints
    Doctor {
        /// Skip the network check
        #[arg(long)]
        offline: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(if cli.verbose { "debug" } else { "warn" });

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), TrichCliError> {
    let config_path = cli.config.clone().or_else(EngineConfig::default_path);
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default(),
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }

    match cli.command {
        Commands::CheckIn {
            relapsed,
            date,
            note,
            sync,
            today,
        } => cmd_check_in(&config, relapsed, date.as_deref(), note, sync, today.as_deref()).await,

        Commands::Stats {
            today,
            with_remote,
            json,
        } => cmd_stats(&config, today.as_deref(), with_remote, json).await,

        Commands::Normalize {
            input,
            derive_bucket,
        } => cmd_normalize(&input, derive_bucket),

        Commands::Predict { input, no_alert } => cmd_predict(&config, &input, no_alert).await,

        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }

        Commands::Doctor { offline, json } => {
            cmd_doctor(&config, config_path.as_deref(), offline, json).await
        }
    }
}

fn parse_date(raw: Option<&str>) -> Result<Option<CalendarDate>, TrichCliError> {
    Ok(raw.map(CalendarDate::parse_strict).transpose()?)
}

fn clock_for(today: Option<&str>) -> Result<Arc<dyn Clock>, TrichCliError> {
    Ok(match parse_date(today)? {
        Some(day) => Arc::new(FixedClock(day)),
        None => Arc::new(SystemClock),
    })
}

fn open_store(config: &EngineConfig) -> CheckInStore {
    let backend = FileBackend::new(config.storage.resolved_data_dir());
    CheckInStore::with_key(Box::new(backend), &config.storage.log_key)
}

fn read_input(input: &Path) -> Result<String, TrichCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

async fn cmd_check_in(
    config: &EngineConfig,
    relapsed: bool,
    date: Option<&str>,
    note: Option<String>,
    sync: bool,
    today: Option<&str>,
) -> Result<(), TrichCliError> {
    let date = parse_date(date)?;
    let mut tracker = StreakTracker::open(
        open_store(config),
        clock_for(today)?,
        config.reconciliation_policy(),
    );
    if sync {
        let api = Arc::new(HttpApi::new(config.api.clone())?);
        tracker = tracker.with_sync(api);
    }

    let outcome = tracker.record_check_in(relapsed, date, note)?;
    if let Some(handle) = outcome.sync {
        handle.join().await;
    }

    print_snapshot(&outcome.snapshot, false)
}

async fn cmd_stats(
    config: &EngineConfig,
    today: Option<&str>,
    with_remote: bool,
    json: bool,
) -> Result<(), TrichCliError> {
    let mut tracker = StreakTracker::open(
        open_store(config),
        clock_for(today)?,
        config.reconciliation_policy(),
    );

    if with_remote && tracker.log().is_empty() {
        let refresher = Arc::new(SummaryRefresher::new(Arc::new(HttpApi::new(
            config.api.clone(),
        )?)));
        tracker = tracker.with_remote(refresher.clone());
        if let Some(pending) = tracker.refresh_remote() {
            pending?.wait().await;
        }
        if let Some(error) = refresher.last_error() {
            eprintln!("server data unavailable: {}", error);
        }
    }

    print_snapshot(&tracker.snapshot(), json)
}

fn print_snapshot(snapshot: &StreakSnapshot, json: bool) -> Result<(), TrichCliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let trend = match snapshot.delta() {
        Some(delta) if delta > 0 => format!(" (+{} since yesterday)", delta),
        Some(delta) if delta < 0 => format!(" ({} since yesterday)", delta),
        _ => String::new(),
    };
    println!("Source:          {}", snapshot.source.as_str());
    println!("Current streak:  {} days{}", snapshot.current, trend);
    println!("Best streak:     {} days", snapshot.best);
    println!("Before relapse:  {} days", snapshot.before_relapse);
    println!("Relapse days:    {}", snapshot.relapse_days);
    Ok(())
}

fn cmd_normalize(input: &Path, derive_bucket: bool) -> Result<(), TrichCliError> {
    let mut record = PredictionNormalizer::normalize_str(&read_input(input)?)?;
    if derive_bucket {
        record = rederive(record);
    }
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn rederive(record: PredictionRecord) -> PredictionRecord {
    let bucket = bucket_from_score(record.risk_score);
    PredictionRecord {
        risk_bucket: bucket,
        risk_code: Some(bucket.code()),
        confidence: confidence_from_score(record.risk_score),
        ..record
    }
}

async fn cmd_predict(config: &EngineConfig, input: &Path, no_alert: bool) -> Result<(), TrichCliError> {
    let features: RelapseFeatures = serde_json::from_str(&read_input(input)?)?;
    let api = Arc::new(HttpApi::new(config.api.clone())?);

    let mut predictor = Predictor::new(api.clone());
    if !no_alert {
        let trigger = AlertTrigger::new(config.alert_policy(), api, Arc::new(LogNotifier))
            .with_message(
                config.alerts.supportive_title.clone(),
                config.alerts.supportive_message.clone(),
            );
        predictor = predictor.with_alerts(trigger);
    }

    let (record, alerts) = predictor.predict_with_alerts(&features).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    // The process is about to exit; give the alert a bounded chance to land
    let grace = config.alert_policy().dispatch_timeout + Duration::from_secs(1);
    let settle = async {
        for handle in alerts {
            handle.join().await;
        }
    };
    if tokio::time::timeout(grace, settle).await.is_err() {
        eprintln!("alert still pending at exit");
    }
    Ok(())
}

async fn cmd_doctor(
    config: &EngineConfig,
    config_path: Option<&Path>,
    offline: bool,
    json: bool,
) -> Result<(), TrichCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("TrichMind core {}", ENGINE_VERSION),
    });

    checks.push(match config_path {
        Some(path) if path.exists() => match EngineConfig::load(path) {
            Ok(_) => DoctorCheck::ok("config", format!("{} is valid", path.display())),
            Err(e) => DoctorCheck::error("config", format!("{}: {}", path.display(), e)),
        },
        Some(path) => DoctorCheck::warning(
            "config",
            format!("{} not found, using defaults", path.display()),
        ),
        None => DoctorCheck::warning("config", "no config location, using defaults".to_string()),
    });

    let data_dir = config.storage.resolved_data_dir();
    let log_path = FileBackend::new(&data_dir).path_for(&config.storage.log_key);
    checks.push(if !log_path.exists() {
        DoctorCheck::warning(
            "check_in_log",
            format!("{} does not exist yet (no check-ins)", log_path.display()),
        )
    } else {
        match fs::read_to_string(&log_path) {
            Ok(raw) => {
                let (log, dropped) = decode_log(&raw);
                if dropped > 0 {
                    DoctorCheck::warning(
                        "check_in_log",
                        format!("{} valid records, {} invalid entries ignored", log.len(), dropped),
                    )
                } else {
                    DoctorCheck::ok("check_in_log", format!("{} records", log.len()))
                }
            }
            Err(e) => DoctorCheck::error(
                "check_in_log",
                format!("Cannot read {}: {}", log_path.display(), e),
            ),
        }
    });

    if !offline {
        let check = match HttpApi::new(config.api.clone()) {
            Ok(api) => match api.fetch_summary().await {
                Ok(_) => DoctorCheck::ok("summary_endpoint", format!("{} reachable", config.api.base_url)),
                Err(e) => DoctorCheck::warning(
                    "summary_endpoint",
                    format!("{} unavailable: {}", config.api.base_url, e),
                ),
            },
            Err(e) => DoctorCheck::error("summary_endpoint", e.to_string()),
        };
        checks.push(check);
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("TrichMind Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(TrichCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum TrichCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for TrichCliError {
    fn from(e: io::Error) -> Self {
        TrichCliError::Io(e)
    }
}

impl From<EngineError> for TrichCliError {
    fn from(e: EngineError) -> Self {
        TrichCliError::Engine(e)
    }
}

impl From<serde_json::Error> for TrichCliError {
    fn from(e: serde_json::Error) -> Self {
        TrichCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        CliError {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<TrichCliError> for CliError {
    fn from(e: TrichCliError) -> Self {
        match e {
            TrichCliError::Io(e) => {
                CliError::new("IO_ERROR", e.to_string(), "Check file paths and permissions")
            }
            TrichCliError::Json(e) => CliError::new("JSON_ERROR", e.to_string(), "Check JSON syntax"),
            TrichCliError::DoctorFailed => CliError::new(
                "DOCTOR_FAILED",
                "One or more health checks failed".to_string(),
                "Review the doctor report for details",
            ),
            TrichCliError::Engine(e) => {
                let message = e.to_string();
                match e {
                    EngineError::Service(_) => {
                        CliError::new("SERVICE_ERROR", message, "The remote service reported a failure")
                    }
                    EngineError::Validation(_) => {
                        CliError::new("VALIDATION_ERROR", message, "Check the input values")
                    }
                    EngineError::TrivialPayload(_) => CliError::new(
                        "EMPTY_FEATURES",
                        message,
                        "Fill in at least one profile answer before predicting",
                    ),
                    EngineError::Storage(_) => {
                        CliError::new("STORAGE_ERROR", message, "Check --data-dir and its permissions")
                    }
                    EngineError::Json(_) => CliError::new("JSON_ERROR", message, "Check JSON syntax"),
                    EngineError::Http(_) => {
                        CliError::new("HTTP_ERROR", message, "Run 'trichmind doctor' to check the endpoint")
                    }
                    EngineError::Config(_) => {
                        CliError::new("CONFIG_ERROR", message, "Run 'trichmind config' to inspect settings")
                    }
                    EngineError::DateParse(_) => {
                        CliError::new("DATE_ERROR", message, "Dates use the YYYY-MM-DD format")
                    }
                    EngineError::Unavailable(_) => {
                        CliError::new("UNAVAILABLE", message, "Retry once the service is reachable")
                    }
                }
            }
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: String) -> Self {
        Self::with(name, CheckStatus::Ok, message)
    }

    fn warning(name: &str, message: String) -> Self {
        Self::with(name, CheckStatus::Warning, message)
    }

    fn error(name: &str, message: String) -> Self {
        Self::with(name, CheckStatus::Error, message)
    }

    fn with(name: &str, status: CheckStatus, message: String) -> Self {
        DoctorCheck {
            name: name.to_string(),
            status,
            message,
        }
    }
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
