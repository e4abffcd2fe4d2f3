//! FFI bindings for aac-insight
//!
//! C-compatible functions for driving the engine from a host UI written in
//! another language. Strings cross the boundary as null-terminated UTF-8 JSON;
//! returned strings are allocated here and must be freed with `aac_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::types::{EventData, InteractionType, Priority};
use crate::analytics::AnalyticsEngine;
use crate::config::EngineConfig;
use crate::error::AnalyticsError;
use crate::settings::BoardSettings;
use crate::store::FileStore;

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

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Serialize `value` into a newly allocated C string, or record the error
fn json_to_cstr<T: Serialize + ?Sized>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&AnalyticsError::from(e).to_string());
            ptr::null_mut()
        }
    }
}

/// Interaction as submitted through `aac_record_interaction`
#[derive(Debug, Deserialize)]
struct RecordRequest {
    #[serde(rename = "type")]
    event_type: InteractionType,
    #[serde(default)]
    data: EventData,
    /// Milliseconds since the Unix epoch; the current instant when absent
    #[serde(default)]
    timestamp: Option<i64>,
}

impl RecordRequest {
    fn timestamp(&self) -> Result<Option<DateTime<Utc>>, AnalyticsError> {
        match self.timestamp {
            None => Ok(None),
            Some(ms) => DateTime::from_timestamp_millis(ms)
                .map(Some)
                .ok_or_else(|| AnalyticsError::InvalidEvent(format!("timestamp out of range: {ms}"))),
        }
    }
}

// ============================================================================
// Engine lifecycle
// ============================================================================

/// Opaque handle to an engine and the board settings it adjusts
pub struct AacEngineHandle {
    engine: AnalyticsEngine<FileStore>,
    settings: BoardSettings,
}

/// Create an engine persisting under `storage_dir`.
///
/// # Safety
/// - `storage_dir` must be a valid null-terminated C string.
/// - `config_json` may be NULL for defaults, otherwise a valid C string.
/// - Must be freed with `aac_engine_free`.
/// - Returns NULL on error; call `aac_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn aac_engine_new(
    storage_dir: *const c_char,
    config_json: *const c_char,
) -> *mut AacEngineHandle {
    clear_last_error();

    let dir = match cstr_to_string(storage_dir) {
        Some(s) => s,
        None => {
            set_last_error("Invalid storage_dir string pointer");
            return ptr::null_mut();
        }
    };

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match EngineConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let engine = match FileStore::open(&dir).and_then(|store| AnalyticsEngine::open(store, config)) {
        Ok(engine) => engine,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    Box::into_raw(Box::new(AacEngineHandle {
        engine,
        settings: BoardSettings::default(),
    }))
}

/// Free an engine.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn aac_engine_free(handle: *mut AacEngineHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

// ============================================================================
// Ingestion
// ============================================================================

/// Record one interaction: `{"type": "tile_click", "data": {...}, "timestamp": ms?}`.
///
/// A `timestamp` ahead of the current time is rejected.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 when the request is malformed.
#[no_mangle]
pub unsafe extern "C" fn aac_record_interaction(
    handle: *mut AacEngineHandle,
    event_json: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &mut *handle;

    let json = match cstr_to_string(event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event string pointer");
            return -1;
        }
    };

    let request: RecordRequest = match serde_json::from_str(&json) {
        Ok(r) => r,
        Err(e) => {
            set_last_error(&AnalyticsError::from(e).to_string());
            return -1;
        }
    };

    let timestamp = match request.timestamp() {
        Ok(ts) => ts,
        Err(e) => {
            set_last_error(&e.to_string());
            return -1;
        }
    };

    match timestamp {
        Some(ts) => {
            if let Err(e) = handle.engine.check_timestamp(ts) {
                set_last_error(&e.to_string());
                return -1;
            }
            handle
                .engine
                .record_interaction_at(request.event_type, request.data, ts)
        }
        None => handle.engine.record_interaction(request.event_type, request.data),
    }
    0
}

/// Mark the start of a session; returns the session id.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - Returns a newly allocated string that must be freed with `aac_free_string`.
#[no_mangle]
pub unsafe extern "C" fn aac_begin_session(handle: *mut AacEngineHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    let id = handle.engine.begin_session();
    string_to_cstr(&id.to_string())
}

/// Mark the end of the current session.
///
/// A negative `duration_ms` lets the engine compute the duration itself.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - Returns 0 on success, -1 on a NULL handle.
#[no_mangle]
pub unsafe extern "C" fn aac_end_session(handle: *mut AacEngineHandle, duration_ms: i64) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &mut *handle;

    let duration = (duration_ms >= 0).then_some(duration_ms);
    handle.engine.end_session(duration);
    0
}

// ============================================================================
// Analysis
// ============================================================================

/// Run one analysis cycle; returns the outcome as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - Returns a newly allocated string that must be freed with `aac_free_string`.
#[no_mangle]
pub unsafe extern "C" fn aac_run_analysis(handle: *mut AacEngineHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    json_to_cstr(&handle.engine.run_analysis())
}

/// Latest behavior pattern as JSON (`null` before the first successful cycle).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - Returns a newly allocated string that must be freed with `aac_free_string`.
#[no_mangle]
pub unsafe extern "C" fn aac_current_pattern(handle: *const AacEngineHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*handle;

    json_to_cstr(&handle.engine.current_pattern())
}

/// Active recommendations as a JSON array.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - Returns a newly allocated string that must be freed with `aac_free_string`.
#[no_mangle]
pub unsafe extern "C" fn aac_current_recommendations(
    handle: *const AacEngineHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*handle;

    json_to_cstr(handle.engine.current_recommendations())
}

// ============================================================================
// Application
// ============================================================================

/// Apply one recommendation to the handle's settings; returns the summary JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - `id` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `aac_free_string`.
#[no_mangle]
pub unsafe extern "C" fn aac_apply_recommendation(
    handle: *mut AacEngineHandle,
    id: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    let id = match cstr_to_string(id) {
        Some(s) => s,
        None => {
            set_last_error("Invalid id string pointer");
            return ptr::null_mut();
        }
    };

    let summary = handle.engine.apply_recommendation(&id, &mut handle.settings);
    json_to_cstr(&summary)
}

/// Apply every active recommendation in the given priorities.
///
/// `priorities_json` is an array such as `["high", "medium"]`; NULL selects
/// the default batch (high and medium).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - `priorities_json` must be NULL or a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `aac_free_string`.
#[no_mangle]
pub unsafe extern "C" fn aac_apply_recommendations(
    handle: *mut AacEngineHandle,
    priorities_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    let filter: Vec<Priority> = if priorities_json.is_null() {
        crate::analytics::DEFAULT_BATCH_PRIORITIES.to_vec()
    } else {
        let json = match cstr_to_string(priorities_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid priorities string pointer");
                return ptr::null_mut();
            }
        };
        match serde_json::from_str(&json) {
            Ok(filter) => filter,
            Err(e) => {
                set_last_error(&AnalyticsError::from(e).to_string());
                return ptr::null_mut();
            }
        }
    };

    let summary = handle
        .engine
        .apply_recommendations(&filter, &mut handle.settings);
    json_to_cstr(&summary)
}

// ============================================================================
// Settings
// ============================================================================

/// Current board settings as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - Returns a newly allocated string that must be freed with `aac_free_string`.
#[no_mangle]
pub unsafe extern "C" fn aac_settings_json(handle: *const AacEngineHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*handle;

    json_to_cstr(&handle.settings)
}

/// Replace the board settings the engine applies recommendations to.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - `settings_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error (settings unchanged).
#[no_mangle]
pub unsafe extern "C" fn aac_set_settings(
    handle: *mut AacEngineHandle,
    settings_json: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &mut *handle;

    let json = match cstr_to_string(settings_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid settings string pointer");
            return -1;
        }
    };

    match BoardSettings::from_json(&json) {
        Ok(settings) => {
            handle.settings = settings;
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Take the warning raised when the persisted log could not be read at open.
///
/// Returns `{"key": ..., "message": ...}` the first time, `null` afterwards or
/// when the log loaded cleanly.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `aac_engine_new`.
/// - Returns a newly allocated string that must be freed with `aac_free_string`.
#[no_mangle]
pub unsafe extern "C" fn aac_take_load_warning(handle: *mut AacEngineHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    json_to_cstr(&handle.engine.take_load_warning())
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by an `aac_` function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an `aac_` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn aac_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `aac_` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn aac_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn aac_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
