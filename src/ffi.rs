//! FFI bindings for the TrichMind engine
//!
//! C-compatible entry points for the mobile UI layer. Strings cross the
//! boundary as null-terminated UTF-8; every string returned by a `tm_*`
//! function is allocated here and must be released with `tm_free_string`.
//! Errors are reported as NULL (or a negative status) and the message is
//! kept in a thread-local slot readable through `tm_last_error`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use crate::alert::AlertPolicy;
use crate::clock::{Clock, FixedClock, SystemClock};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::logging::init_logging;
use crate::prediction::PredictionNormalizer;
use crate::reconcile::record_check_in;
use crate::store::{decode_log, CheckInStore, FileBackend};
use crate::tracker::StreakTracker;
use crate::types::{CalendarDate, CheckInLog, RemoteSummary};
use tracing::warn;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Required string argument
unsafe fn required(ptr: *const c_char, name: &str) -> Result<String, EngineError> {
    optional(ptr, name)?
        .ok_or_else(|| EngineError::Validation(format!("{} must not be NULL", name)))
}

/// Nullable string argument; NULL and "" both read as absent
unsafe fn optional(ptr: *const c_char, name: &str) -> Result<Option<String>, EngineError> {
    if ptr.is_null() {
        return Ok(None);
    }
    let s = CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| EngineError::Validation(format!("{} is not valid UTF-8", name)))?;
    Ok(if s.is_empty() { None } else { Some(s.to_string()) })
}

unsafe fn optional_date(ptr: *const c_char, name: &str) -> Result<Option<CalendarDate>, EngineError> {
    optional(ptr, name)?
        .map(|s| CalendarDate::parse_strict(&s))
        .transpose()
}

/// Config from `config_path` when given, otherwise the default location
unsafe fn engine_config(config_path: *const c_char) -> Result<EngineConfig, EngineError> {
    match optional(config_path, "config_path")? {
        Some(path) => EngineConfig::load(Path::new(&path)),
        None => Ok(EngineConfig::load_or_default()),
    }
}

/// Log store in `dir` under the configured key
fn open_store(dir: String, config: &EngineConfig) -> CheckInStore {
    CheckInStore::with_key(Box::new(FileBackend::new(dir)), &config.storage.log_key)
}

/// Remote summary for an empty log. A summary that does not parse counts as absent.
fn summary_for(log: &CheckInLog, raw: Option<String>) -> Option<RemoteSummary> {
    if !log.is_empty() {
        return None;
    }
    let raw = raw?;
    match serde_json::from_str::<RemoteSummary>(&raw) {
        Ok(summary) => Some(summary),
        Err(e) => {
            warn!(error = %e, "unreadable server summary, treating as unavailable");
            None
        }
    }
}

/// Hand a result to C: the string on success, NULL plus last error on failure
fn into_c_string(result: Result<String, EngineError>) -> *mut c_char {
    match result {
        Ok(s) => match CString::new(s) {
            Ok(cstr) => cstr.into_raw(),
            Err(_) => {
                set_last_error("result contained an interior NUL byte");
                ptr::null_mut()
            }
        },
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Compute streak statistics for a persisted log.
///
/// `summary_json` (nullable) is the remote summary, read only when the log is
/// empty; one that does not parse is treated as unavailable. `today`
/// (nullable) is `YYYY-MM-DD`, defaulting to the local date. `config_path`
/// (nullable) selects the config file, otherwise the default location is used.
///
/// # Safety
/// - `log_json` must be a valid null-terminated C string.
/// - `today`, `summary_json` and `config_path` must be NULL or valid
///   null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `tm_free_string`.
/// - Returns NULL on error; call `tm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tm_snapshot(
    log_json: *const c_char,
    today: *const c_char,
    summary_json: *const c_char,
    config_path: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let result = (|| -> Result<String, EngineError> {
        let config = engine_config(config_path)?;
        let (log, _dropped) = decode_log(&required(log_json, "log_json")?);
        let today = optional_date(today, "today")?.unwrap_or_else(CalendarDate::today_local);
        let summary = summary_for(&log, optional(summary_json, "summary_json")?);

        let snapshot = config
            .reconciliation_policy()
            .reconcile(&log, today, summary.as_ref());
        Ok(serde_json::to_string(&snapshot)?)
    })();

    into_c_string(result)
}

/// Record a check-in in the log stored under `data_dir`.
///
/// `date` (nullable) defaults to today. `config_path` (nullable) selects the
/// config file. Returns the new snapshot as JSON.
///
/// # Safety
/// - `data_dir` must be a valid null-terminated C string.
/// - `date` and `config_path` must be NULL or valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `tm_free_string`.
/// - Returns NULL on error; call `tm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tm_record_check_in(
    data_dir: *const c_char,
    relapsed: bool,
    date: *const c_char,
    config_path: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let result = (|| -> Result<String, EngineError> {
        let config = engine_config(config_path)?;
        let store = open_store(required(data_dir, "data_dir")?, &config);
        let date = optional_date(date, "date")?;
        let policy = config.reconciliation_policy();

        let log = store.load();
        let (_, snapshot) = record_check_in(
            &store,
            &policy,
            &log,
            relapsed,
            date,
            CalendarDate::today_local(),
        )?;
        Ok(serde_json::to_string(&snapshot)?)
    })();

    into_c_string(result)
}

/// Normalize a raw model service response into the canonical record JSON.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `tm_free_string`.
/// - Returns NULL on error; call `tm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tm_normalize_prediction(json: *const c_char) -> *mut c_char {
    clear_last_error();

    let result = (|| -> Result<String, EngineError> {
        let record = PredictionNormalizer::normalize_str(&required(json, "json")?)?;
        Ok(serde_json::to_string(&record)?)
    })();

    into_c_string(result)
}

/// Whether a model response warrants an elevated-risk alert.
///
/// A `threshold` outside [0, 1] (or NaN) selects the default of 0.7.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns 1 to alert, 0 not to, -1 on error (see `tm_last_error`).
#[no_mangle]
pub unsafe extern "C" fn tm_should_alert(json: *const c_char, threshold: f64) -> i32 {
    clear_last_error();

    let result = (|| -> Result<bool, EngineError> {
        let record = PredictionNormalizer::normalize_str(&required(json, "json")?)?;
        let mut policy = AlertPolicy::default();
        if (0.0..=1.0).contains(&threshold) {
            policy.high_risk_threshold = threshold;
        }
        Ok(policy.should_alert(&record))
    })();

    match result {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Stateful Tracker API
// ============================================================================

/// Opaque handle to a StreakTracker
pub struct TmTrackerHandle {
    tracker: StreakTracker,
}

/// Open a tracker over the log stored in `data_dir`.
///
/// `today` (nullable) pins the tracker's date, otherwise the local clock is
/// used. `config_path` (nullable) selects the config file.
///
/// # Safety
/// - `data_dir` must be a valid null-terminated C string.
/// - `today` and `config_path` must be NULL or valid null-terminated C strings.
/// - Must be freed with `tm_tracker_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn tm_tracker_open(
    data_dir: *const c_char,
    today: *const c_char,
    config_path: *const c_char,
) -> *mut TmTrackerHandle {
    clear_last_error();

    let opened = (|| -> Result<StreakTracker, EngineError> {
        let config = engine_config(config_path)?;
        let dir = required(data_dir, "data_dir")?;
        let clock: Arc<dyn Clock> = match optional_date(today, "today")? {
            Some(day) => Arc::new(FixedClock(day)),
            None => Arc::new(SystemClock),
        };
        Ok(StreakTracker::open(
            open_store(dir, &config),
            clock,
            config.reconciliation_policy(),
        ))
    })();

    match opened {
        Ok(tracker) => Box::into_raw(Box::new(TmTrackerHandle { tracker })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a tracker.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `tm_tracker_open`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tm_tracker_free(tracker: *mut TmTrackerHandle) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

/// Current snapshot of a tracker as JSON.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `tm_tracker_open`.
/// - Returns a newly allocated string that must be freed with `tm_free_string`.
/// - Returns NULL on error; call `tm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tm_tracker_snapshot(tracker: *const TmTrackerHandle) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &*tracker;

    into_c_string(serde_json::to_string(&handle.tracker.snapshot()).map_err(EngineError::from))
}

/// Record a check-in through a tracker. Returns the new snapshot as JSON.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `tm_tracker_open`.
/// - `date` must be NULL or a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `tm_free_string`.
/// - Returns NULL on error; call `tm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tm_tracker_check_in(
    tracker: *mut TmTrackerHandle,
    relapsed: bool,
    date: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }
    let handle = &mut *tracker;

    let result = (|| -> Result<String, EngineError> {
        let date = optional_date(date, "date")?;
        let outcome = handle.tracker.record_check_in(relapsed, date, None)?;
        Ok(serde_json::to_string(&outcome.snapshot)?)
    })();

    into_c_string(result)
}

// ============================================================================
// Logging, Memory, Errors, Version
// ============================================================================

/// Install the engine's stderr log subscriber.
///
/// # Safety
/// - `filter` must be NULL or a valid null-terminated C string; NULL means
///   `info`.
/// - Returns 1 if installed, 0 if a subscriber already existed.
#[no_mangle]
pub unsafe extern "C" fn tm_init_logging(filter: *const c_char) -> i32 {
    let filter = optional(filter, "filter").ok().flatten();
    i32::from(init_logging(filter.as_deref().unwrap_or("info")))
}

/// Free a string returned by a `tm_*` function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a `tm_*` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tm_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `tm_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn tm_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the engine version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn tm_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
