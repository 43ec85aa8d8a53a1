//! C boundary.
//!
//! Flat functions returning `0` on success and `-1` on failure. Failures are
//! reported on stderr through `tracing`; panics never cross the boundary.
//!
//! ```c
//! int  pva_get(const char *name, char **json_out, double timeout);
//! int  pva_put(const char *name, const char **fields, const char **values, int size, double timeout);
//! int  pva_monitor(const char *name, void (*cb)(const char *json), uint64_t *handle_out);
//! int  pva_monitor_close(uint64_t handle);
//! void pva_string_free(char *s);
//! ```

use std::collections::HashMap;
use std::ffi::{c_char, c_int, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once, OnceLock};

use tracing_subscriber::EnvFilter;

use crate::client::MemoryClient;
use crate::config::BridgeConfig;
use crate::context::Context;
use crate::error::{BridgeError, BridgeResult, MonitorError, ValidationError};
use crate::monitor::drain::panic_message;
use crate::monitor::MonitorHandle;

/// Environment variable holding the stderr log filter.
pub const ENV_LOG: &str = "PVA_BRIDGE_LOG";

/// Monitor callback as seen from C.
pub type PvaCallback = unsafe extern "C" fn(json: *const c_char);

static CONTEXT: OnceLock<Context> = OnceLock::new();
static MONITORS: OnceLock<Mutex<HashMap<u64, MonitorHandle>>> = OnceLock::new();
static NEXT_MONITOR: AtomicU64 = AtomicU64::new(1);
static LOGGING: Once = Once::new();

/// Install the context used by the C functions.
///
/// Must run before the first C call; afterwards the installed context is
/// fixed and `ctx` is handed back.
pub fn install_context(ctx: Context) -> Result<(), Context> {
    CONTEXT.set(ctx)
}

fn context() -> &'static Context {
    CONTEXT.get_or_init(|| {
        let config = BridgeConfig::from_env();
        let client = Arc::new(MemoryClient::from_config(&config));
        Context::new(config, client)
    })
}

fn monitors() -> &'static Mutex<HashMap<u64, MonitorHandle>> {
    MONITORS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn init_logging() {
    LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .try_init();
    });
}

fn guarded(op: &'static str, f: impl FnOnce() -> BridgeResult<()>) -> c_int {
    init_logging();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            tracing::error!(op, error = %e, "call failed");
            e.status_code()
        }
        Err(payload) => {
            tracing::error!(op, error = panic_message(payload.as_ref()), "call panicked");
            -1
        }
    }
}

/// Borrow a C string argument.
unsafe fn arg<'a>(ptr: *const c_char, argument: &str) -> BridgeResult<&'a str> {
    if ptr.is_null() {
        return Err(ValidationError::MissingArgument {
            argument: argument.to_string(),
        }
        .into());
    }
    CStr::from_ptr(ptr).to_str().map_err(|_| {
        ValidationError::InvalidUtf8 {
            argument: argument.to_string(),
        }
        .into()
    })
}

unsafe fn arg_list<'a>(ptr: *const *const c_char, len: usize, argument: &str) -> BridgeResult<Vec<&'a str>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    if ptr.is_null() {
        return Err(ValidationError::MissingArgument {
            argument: argument.to_string(),
        }
        .into());
    }
    std::slice::from_raw_parts(ptr, len)
        .iter()
        .enumerate()
        .map(|(i, p)| arg(*p, &format!("{argument}[{i}]")))
        .collect()
}

unsafe fn get_into(name: *const c_char, json_out: *mut *mut c_char, timeout: f64) -> BridgeResult<()> {
    let name = arg(name, "name")?;
    if json_out.is_null() {
        return Err(ValidationError::MissingArgument {
            argument: "json_out".to_string(),
        }
        .into());
    }
    let text = context().get(name, timeout)?;
    let text = CString::new(text).map_err(|e| BridgeError::internal(format!("output contains NUL: {e}")))?;
    *json_out = text.into_raw();
    Ok(())
}

unsafe fn put_lists(
    name: *const c_char,
    fields: *const *const c_char,
    values: *const *const c_char,
    size: c_int,
    timeout: f64,
) -> BridgeResult<()> {
    let name = arg(name, "name")?;
    let len = usize::try_from(size).map_err(|_| ValidationError::InvalidArgument {
        argument: "size".to_string(),
        reason: format!("{size} is negative"),
    })?;
    let fields = arg_list(fields, len, "fields")?;
    let values = arg_list(values, len, "values")?;
    context().put(name, &fields, &values, timeout)
}

unsafe fn start_monitor(name: *const c_char, cb: Option<PvaCallback>, handle_out: *mut u64) -> BridgeResult<()> {
    let name = arg(name, "name")?;
    let Some(cb) = cb else {
        return Err(ValidationError::MissingArgument {
            argument: "callback".to_string(),
        }
        .into());
    };

    let channel = name.to_string();
    let monitor = context().monitor(name, move |json: &str| match CString::new(json) {
        Ok(text) => unsafe { cb(text.as_ptr()) },
        Err(e) => tracing::warn!(channel = %channel, error = %e, "update text contains NUL"),
    })?;

    let id = NEXT_MONITOR.fetch_add(1, Ordering::Relaxed);
    monitors()
        .lock()
        .map_err(|_| BridgeError::internal("poisoned lock: monitor table"))?
        .insert(id, monitor);
    if !handle_out.is_null() {
        *handle_out = id;
    }
    Ok(())
}

/// Fetch `name` and store its text in `*json_out`.
///
/// `*json_out` is written only on success and must be released with
/// [`pva_string_free`].
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string; `json_out` must be
/// null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn pva_get(name: *const c_char, json_out: *mut *mut c_char, timeout: f64) -> c_int {
    guarded("get", || unsafe { get_into(name, json_out, timeout) })
}

/// Assign `values[i]` to `fields[i]` for `i < size` and write them in one put.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string. `fields` and `values`
/// must be null or point to `size` valid string pointers.
#[no_mangle]
pub unsafe extern "C" fn pva_put(
    name: *const c_char,
    fields: *const *const c_char,
    values: *const *const c_char,
    size: c_int,
    timeout: f64,
) -> c_int {
    guarded("put", || unsafe { put_lists(name, fields, values, size, timeout) })
}

/// Start a monitor on `name`. `cb` runs on the monitor's own thread with the
/// text of every update; the pointer is only valid during the call.
///
/// When `handle_out` is not null it receives the id to pass to
/// [`pva_monitor_close`].
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string; `handle_out` must be
/// null or valid for writes. `cb` must be safe to call from any thread.
#[no_mangle]
pub unsafe extern "C" fn pva_monitor(
    name: *const c_char,
    cb: Option<PvaCallback>,
    handle_out: *mut u64,
) -> c_int {
    guarded("monitor", || unsafe { start_monitor(name, cb, handle_out) })
}

/// Stop the monitor `handle` and wait for its worker to exit.
#[no_mangle]
pub extern "C" fn pva_monitor_close(handle: u64) -> c_int {
    guarded("monitor_close", || {
        let removed = monitors()
            .lock()
            .map_err(|_| BridgeError::internal("poisoned lock: monitor table"))?
            .remove(&handle);
        let monitor = removed.ok_or(MonitorError::UnknownMonitor { id: handle })?;
        monitor.close();
        Ok(())
    })
}

/// Release a string returned by [`pva_get`]. Null is ignored.
///
/// # Safety
/// `s` must be null or a pointer returned by [`pva_get`] that has not been
/// released yet.
#[no_mangle]
pub unsafe extern "C" fn pva_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(s) });
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::ptr;

    #[test]
    fn null_arguments_fail() {
        let mut out: *mut c_char = ptr::null_mut();
        assert_eq!(unsafe { pva_get(ptr::null(), &mut out, 0.1) }, -1);
        assert!(out.is_null());

        let name = CString::new("x").unwrap();
        assert_eq!(unsafe { pva_get(name.as_ptr(), ptr::null_mut(), 0.1) }, -1);
        assert_eq!(unsafe { pva_monitor(name.as_ptr(), None, ptr::null_mut()) }, -1);
    }

    #[test]
    fn negative_size_fails() {
        let name = CString::new("x").unwrap();
        assert_eq!(unsafe { pva_put(name.as_ptr(), ptr::null(), ptr::null(), -1, 0.1) }, -1);
    }

    #[test]
    fn null_list_with_entries_fails() {
        let name = CString::new("x").unwrap();
        assert_eq!(unsafe { pva_put(name.as_ptr(), ptr::null(), ptr::null(), 2, 0.1) }, -1);
    }

    #[test]
    fn unknown_monitor_close_fails() {
        assert_eq!(pva_monitor_close(u64::MAX), -1);
    }

    #[test]
    fn string_free_ignores_null() {
        unsafe { pva_string_free(ptr::null_mut()) };
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let bad = [0xff_u8, 0xfe, 0];
        let err = unsafe { arg(bad.as_ptr().cast(), "name") }.unwrap_err();
        assert!(err.is_validation());
    }
}
