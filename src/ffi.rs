//! FFI bindings for Synheart Fall
//!
//! This module provides C-compatible functions for driving the detector from
//! a host application (Android/iOS service, embedded firmware shim, ...).
//! Strings are null-terminated; returned strings are allocated by Rust and
//! must be freed by the caller using `fall_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::pipeline::{detect_falls_ndjson, FallDetector};
use crate::types::Intensity;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

/// Map the C intensity code (0 = low, 1 = medium, 2 = high)
fn intensity_from_code(code: i32) -> Option<Intensity> {
    match code {
        0 => Some(Intensity::Low),
        1 => Some(Intensity::Medium),
        2 => Some(Intensity::High),
        _ => None,
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Detect falls in NDJSON sample input and return the events as NDJSON.
///
/// # Safety
/// - `ndjson` and `intensity` must be valid null-terminated C strings.
/// - `intensity` is one of "low", "medium", "high".
/// - Returns a newly allocated string that must be freed with `fall_free_string`.
/// - Returns NULL on error; call `fall_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fall_detect_ndjson(
    ndjson: *const c_char,
    intensity: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let input = match cstr_to_string(ndjson) {
        Some(s) => s,
        None => {
            set_last_error("Invalid NDJSON string pointer");
            return ptr::null_mut();
        }
    };

    let intensity = match cstr_to_string(intensity).map(|s| s.parse::<Intensity>()) {
        Some(Ok(intensity)) => intensity,
        Some(Err(e)) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
        None => {
            set_last_error("Invalid intensity string pointer");
            return ptr::null_mut();
        }
    };

    match detect_falls_ndjson(&input, intensity) {
        Ok(events) => string_to_cstr(&events),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Detector API
// ============================================================================

/// Opaque handle to a FallDetector
pub struct FallDetectorHandle {
    detector: FallDetector,
}

/// Create a new detector for the given intensity code (0 = low, 1 = medium, 2 = high).
///
/// # Safety
/// - Returns a pointer to a newly allocated detector.
/// - Must be freed with `fall_detector_free`.
/// - Returns NULL for an unknown intensity code.
#[no_mangle]
pub unsafe extern "C" fn fall_detector_new(intensity: i32) -> *mut FallDetectorHandle {
    clear_last_error();

    let Some(intensity) = intensity_from_code(intensity) else {
        set_last_error(&format!("Unknown intensity code: {intensity}"));
        return ptr::null_mut();
    };

    let handle = Box::new(FallDetectorHandle {
        detector: FallDetector::new(intensity),
    });
    Box::into_raw(handle)
}

/// Free a detector.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `fall_detector_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fall_detector_free(detector: *mut FallDetectorHandle) {
    if !detector.is_null() {
        drop(Box::from_raw(detector));
    }
}

/// Feed one accelerometer reading observed at `now_ms`.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `fall_detector_new`.
/// - Calls on one detector must not overlap.
/// - Returns the confirmed fall event as JSON (free with `fall_free_string`),
///   or NULL. NULL with a non-NULL `fall_last_error` means the reading was
///   rejected; NULL without an error means no fall was confirmed.
#[no_mangle]
pub unsafe extern "C" fn fall_detector_process(
    detector: *mut FallDetectorHandle,
    now_ms: i64,
    x: f64,
    y: f64,
    z: f64,
) -> *mut c_char {
    clear_last_error();

    if detector.is_null() {
        set_last_error("Null detector pointer");
        return ptr::null_mut();
    }

    let handle = &mut *detector;

    match handle.detector.process_xyz(now_ms, x, y, z) {
        Ok(Some(event)) => match serde_json::to_string(&event) {
            Ok(json) => string_to_cstr(&json),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        },
        Ok(None) => ptr::null_mut(),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Drop any in-flight detection window.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `fall_detector_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn fall_detector_reset(detector: *mut FallDetectorHandle) -> i32 {
    clear_last_error();

    if detector.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }

    (*detector).detector.reset();
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by this library.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a `fall_*` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fall_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next `fall_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn fall_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn fall_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
