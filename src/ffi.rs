//! FFI bindings for survey navigation
//!
//! This module provides C-compatible functions so a mobile task driver can call the
//! engine. All functions use C strings (null-terminated) carrying JSON, and return
//! allocated memory that must be freed by the caller using `survey_nav_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde_json::Value;

use crate::result::ResultData;
use crate::session::{next_step_json, TaskSession};
use crate::task::Task;

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

fn to_json_cstr<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Answer one navigation query.
///
/// # Safety
/// - `task_json` must be a valid null-terminated C string.
/// - `result_json`, `current_step` and `cohorts_json` must be valid null-terminated
///   C strings or NULL.
/// - Returns a newly allocated string that must be freed with `survey_nav_free_string`.
/// - Returns NULL on error; call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_next_step(
    task_json: *const c_char,
    result_json: *const c_char,
    current_step: *const c_char,
    cohorts_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let task_str = match cstr_to_string(task_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid task JSON string pointer");
            return ptr::null_mut();
        }
    };

    let result_str = cstr_to_string(result_json);
    let current_str = cstr_to_string(current_step);
    let cohorts_str = cstr_to_string(cohorts_json);

    match next_step_json(
        &task_str,
        result_str.as_deref(),
        current_str.as_deref(),
        cohorts_str.as_deref(),
    ) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Validate a task definition and return the list of issues as a JSON array of strings.
///
/// # Safety
/// - `task_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `survey_nav_free_string`.
/// - Returns NULL if the JSON cannot be parsed; call `survey_nav_last_error`.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_validate_task(task_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let task_str = match cstr_to_string(task_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid task JSON string pointer");
            return ptr::null_mut();
        }
    };

    let task: Task = match serde_json::from_str(&task_str) {
        Ok(task) => task,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let issues: Vec<String> = task.validate().iter().map(|i| i.to_string()).collect();
    to_json_cstr(&issues)
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a TaskSession
pub struct TaskSessionHandle {
    session: TaskSession,
}

/// Create a session for a task definition.
///
/// # Safety
/// - `task_json` must be a valid null-terminated C string.
/// - Returns a pointer to a newly allocated session; free it with `survey_nav_session_free`.
/// - Returns NULL on error; call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_new(task_json: *const c_char) -> *mut TaskSessionHandle {
    clear_last_error();

    let task_str = match cstr_to_string(task_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid task JSON string pointer");
            return ptr::null_mut();
        }
    };

    match TaskSession::from_json(&task_str) {
        Ok(session) => Box::into_raw(Box::new(TaskSessionHandle { session })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `survey_nav_session_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_free(session: *mut TaskSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Start (or restart) the run and return the session state as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `survey_nav_session_new`.
/// - Returns a newly allocated string that must be freed with `survey_nav_free_string`.
/// - Returns NULL on error; call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_start(session: *mut TaskSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &mut *session;
    handle.session.start();
    to_json_cstr(&handle.session.state())
}

/// Commit the current step and move to the next one. Returns the session state as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `survey_nav_session_new`.
/// - Returns a newly allocated string that must be freed with `survey_nav_free_string`.
/// - Returns NULL on error; call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_advance(session: *mut TaskSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &mut *session;
    handle.session.advance();
    to_json_cstr(&handle.session.state())
}

/// Move to the previous step. Returns the session state as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `survey_nav_session_new`.
/// - Returns a newly allocated string that must be freed with `survey_nav_free_string`.
/// - Returns NULL on error; call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_back(session: *mut TaskSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &mut *session;
    handle.session.back();
    to_json_cstr(&handle.session.state())
}

/// Append a result (a JSON result tree node) to the current section.
///
/// # Safety
/// - `session` must be a valid pointer returned by `survey_nav_session_new`.
/// - `result_json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_record_result(
    session: *mut TaskSessionHandle,
    result_json: *const c_char,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &mut *session;

    let json_str = match cstr_to_string(result_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid result JSON string pointer");
            return -1;
        }
    };

    match serde_json::from_str::<ResultData>(&json_str) {
        Ok(result) => {
            handle.session.record_result(result);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Record answers for the current step from a JSON object keyed by input field identifier.
///
/// # Safety
/// - `session` must be a valid pointer returned by `survey_nav_session_new`.
/// - `answers_json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_record_answers(
    session: *mut TaskSessionHandle,
    answers_json: *const c_char,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &mut *session;

    let json_str = match cstr_to_string(answers_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid answers JSON string pointer");
            return -1;
        }
    };

    let answers: Value = match serde_json::from_str(&json_str) {
        Ok(value) => value,
        Err(e) => {
            set_last_error(&e.to_string());
            return -1;
        }
    };

    match handle.session.record_answers(answers.as_object()) {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Current progress as JSON (`null` when progress is not shown for the step).
///
/// # Safety
/// - `session` must be a valid pointer returned by `survey_nav_session_new`.
/// - Returns a newly allocated string that must be freed with `survey_nav_free_string`.
/// - Returns NULL on error; call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_progress(session: *mut TaskSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;
    to_json_cstr(&handle.session.progress())
}

/// Current cohort membership as a JSON array.
///
/// # Safety
/// - `session` must be a valid pointer returned by `survey_nav_session_new`.
/// - Returns a newly allocated string that must be freed with `survey_nav_free_string`.
/// - Returns NULL on error; call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_cohorts(session: *mut TaskSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;
    to_json_cstr(handle.session.current_cohorts())
}

/// Save cohort membership to JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `survey_nav_session_new`.
/// - Returns a newly allocated string that must be freed with `survey_nav_free_string`.
/// - Returns NULL on error; call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_save_cohorts(session: *mut TaskSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;

    match handle.session.save_cohorts() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Load cohort membership from JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `survey_nav_session_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `survey_nav_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_session_load_cohorts(
    session: *mut TaskSessionHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &mut *session;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match handle.session.load_cohorts(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by survey navigation functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a survey navigation function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn survey_nav_last_error() -> *const c_char {
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
pub unsafe extern "C" fn survey_nav_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
