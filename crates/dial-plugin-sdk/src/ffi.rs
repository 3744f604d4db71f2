//! Generic `extern "C"` glue between the C entry points and a [`Plugin`].
//!
//! Each function here is monomorphized per plugin type. [`crate::export_plugin!`]
//! wraps them in `#[no_mangle]` symbols; [`vtable`] hands them to an in-process host
//! without exporting anything.
//!
//! Ownership across the boundary:
//! - the handle is a `Box<Handle<P>>` owned by the plugin until `deinit`;
//! - the schema and the last error message borrow from the handle and are never
//!   freed by the host;
//! - invoke results are `Box<[u8]>` allocations whose ownership moves to the host
//!   and comes back through `free_result`.
//!
//! A handle serves one call at a time. Panics are caught before they reach the
//! caller and reported as [`Status::UnknownError`].

use std::{
    any::Any,
    ffi::{c_char, c_void},
    panic::{self, AssertUnwindSafe},
    ptr, slice,
};

use crate::{
    abi::{PluginVTable, RawStatus, Status},
    Plugin, PluginError,
};

/// Per-instance state behind the opaque handle.
pub struct Handle<P> {
    plugin: P,
    schema: Option<Box<str>>,
    last_error: Option<String>,
}

impl<P: Plugin> Handle<P> {
    fn new(plugin: P) -> Self {
        Self {
            plugin,
            schema: None,
            last_error: None,
        }
    }

    fn fail(&mut self, operation: &'static str, err: PluginError) -> RawStatus {
        let status = err.status();
        tracing::warn!(
            plugin = P::NAME,
            operation,
            status = %status,
            error = %err,
            "plugin call failed"
        );
        self.last_error = Some(err.to_string());
        status.code()
    }

    fn schema_json(&mut self) -> Result<&str, PluginError> {
        if self.schema.is_none() {
            let plugin = &self.plugin;
            let json = guard(|| plugin.schema()?.to_json())?;
            self.schema = Some(json.into_boxed_str());
        }
        Ok(self.schema.as_deref().unwrap_or_default())
    }
}

/// Entry-point table for `P`, for hosts that link the plugin statically.
pub fn vtable<P: Plugin>() -> PluginVTable {
    PluginVTable {
        init: init::<P>,
        deinit: deinit::<P>,
        schema: schema::<P>,
        invoke: invoke::<P>,
        free_result: free_result::<P>,
        last_error_message: last_error_message::<P>,
    }
}

/// # Safety
/// `args` must point to `args_len` readable bytes (or be null with a zero length) and
/// `handle` must be valid for a pointer write.
pub unsafe extern "C" fn init<P: Plugin>(
    args_len: usize,
    args: *const c_char,
    handle: *mut *mut c_void,
) -> RawStatus {
    if handle.is_null() {
        tracing::warn!(plugin = P::NAME, "init called without a handle out-pointer");
        return Status::InitError.code();
    }
    *handle = ptr::null_mut();

    let config = bytes(args, args_len);
    match guard(|| P::init(config)) {
        Ok(plugin) => {
            *handle = Box::into_raw(Box::new(Handle::new(plugin))).cast();
            tracing::debug!(plugin = P::NAME, config_len = args_len, "plugin initialized");
            Status::Success.code()
        }
        Err(err) => {
            tracing::warn!(plugin = P::NAME, error = %err, "plugin initialization failed");
            err.status().code()
        }
    }
}

/// # Safety
/// `handle` must come from a successful [`init`] for the same `P` and must not be used
/// again afterwards.
pub unsafe extern "C" fn deinit<P: Plugin>(handle: *mut c_void) {
    if handle.is_null() {
        return;
    }
    let handle = Box::from_raw(handle.cast::<Handle<P>>());
    if panic::catch_unwind(AssertUnwindSafe(move || drop(handle))).is_err() {
        tracing::warn!(plugin = P::NAME, "plugin panicked during teardown");
    } else {
        tracing::debug!(plugin = P::NAME, "plugin deinitialized");
    }
}

/// # Safety
/// `handle` must be live and both out-pointers valid for writes. The schema written to
/// `schema` stays owned by the handle until [`deinit`].
pub unsafe extern "C" fn schema<P: Plugin>(
    handle: *mut c_void,
    schema_len: *mut usize,
    schema: *mut *const c_char,
) -> RawStatus {
    let Some(handle) = handle_mut::<P>(handle) else {
        return Status::UnknownError.code();
    };
    if schema_len.is_null() || schema.is_null() {
        return handle.fail("schema", PluginError::Schema("null out-pointer".into()));
    }
    *schema_len = 0;
    *schema = ptr::null();

    match handle.schema_json() {
        Ok(json) => {
            *schema_len = json.len();
            *schema = json.as_ptr().cast();
            Status::Success.code()
        }
        Err(err) => handle.fail("schema", err),
    }
}

/// # Safety
/// `handle` must be live, `fn_name` and `args` must point to the stated number of
/// readable bytes, and both out-pointers must be valid for writes. A successful result
/// must later be passed to [`free_result`] exactly once.
pub unsafe extern "C" fn invoke<P: Plugin>(
    handle: *mut c_void,
    fn_name_len: usize,
    fn_name: *const c_char,
    args_len: usize,
    args: *const c_char,
    result_len: *mut usize,
    result: *mut *const c_char,
) -> RawStatus {
    let Some(handle) = handle_mut::<P>(handle) else {
        return Status::UnknownError.code();
    };
    if result_len.is_null() || result.is_null() {
        return handle.fail(
            "invoke",
            PluginError::invoke("<unnamed>", "null result out-pointer"),
        );
    }
    *result_len = 0;
    *result = ptr::null();

    let name = bytes(fn_name, fn_name_len);
    let Ok(name) = std::str::from_utf8(name) else {
        let lossy = String::from_utf8_lossy(name).into_owned();
        return handle.fail("invoke", PluginError::UnknownFunction(lossy));
    };
    let args = bytes(args, args_len);

    let plugin = &mut handle.plugin;
    match guard(|| plugin.invoke(name, args)).and_then(transfer) {
        Ok(output) => {
            let len = output.len();
            *result = Box::into_raw(output).cast::<c_char>();
            *result_len = len;
            tracing::debug!(plugin = P::NAME, function = name, len, "function invoked");
            Status::Success.code()
        }
        Err(err) => handle.fail("invoke", err),
    }
}

/// # Safety
/// `result` and `result_len` must be exactly what one successful [`invoke`] on this
/// handle produced, and the buffer must not have been released before.
pub unsafe extern "C" fn free_result<P: Plugin>(
    _handle: *mut c_void,
    result_len: usize,
    result: *const c_char,
) {
    if result.is_null() {
        return;
    }
    let buffer = ptr::slice_from_raw_parts_mut(result.cast_mut().cast::<u8>(), result_len);
    drop(Box::from_raw(buffer));
    tracing::trace!(plugin = P::NAME, len = result_len, "result released");
}

/// # Safety
/// `handle` must be live and both out-pointers valid for writes. The message stays
/// owned by the handle and is invalidated by the next failing call.
pub unsafe extern "C" fn last_error_message<P: Plugin>(
    handle: *mut c_void,
    error_message_len: *mut usize,
    error_message: *mut *const c_char,
) {
    if error_message_len.is_null() || error_message.is_null() {
        return;
    }
    *error_message_len = 0;
    *error_message = ptr::null();

    if let Some(message) = handle_mut::<P>(handle).and_then(|h| h.last_error.as_deref()) {
        *error_message_len = message.len();
        *error_message = message.as_ptr().cast();
    }
}

unsafe fn handle_mut<'a, P>(handle: *mut c_void) -> Option<&'a mut Handle<P>> {
    handle.cast::<Handle<P>>().as_mut()
}

unsafe fn bytes<'a>(data: *const c_char, len: usize) -> &'a [u8] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(data.cast(), len)
    }
}

fn guard<T>(f: impl FnOnce() -> Result<T, PluginError>) -> Result<T, PluginError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(PluginError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Moves an output into an exactly-sized allocation, reporting allocation failure
/// instead of aborting.
fn transfer(output: Vec<u8>) -> Result<Box<[u8]>, PluginError> {
    if output.len() == output.capacity() {
        return Ok(output.into_boxed_slice());
    }
    let mut exact = Vec::new();
    exact
        .try_reserve_exact(output.len())
        .map_err(|_| PluginError::OutOfMemory(output.len()))?;
    exact.extend_from_slice(&output);
    Ok(exact.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FunctionDescriptor, Schema};

    struct Counter {
        calls: u32,
    }

    impl Plugin for Counter {
        const NAME: &'static str = "counter";

        fn init(config: &[u8]) -> Result<Self, PluginError> {
            match config {
                b"" => Ok(Self { calls: 0 }),
                b"panic" => panic!("refusing to start"),
                _ => Err(PluginError::Init("unexpected config".into())),
            }
        }

        fn schema(&self) -> Result<Schema, PluginError> {
            Ok(Schema::new(vec![FunctionDescriptor::new("count", "Count calls")]))
        }

        fn invoke(&mut self, function: &str, _args: &[u8]) -> Result<Vec<u8>, PluginError> {
            match function {
                "count" => {
                    self.calls += 1;
                    let mut out = Vec::with_capacity(64);
                    out.extend_from_slice(self.calls.to_string().as_bytes());
                    Ok(out)
                }
                "explode" => panic!("exploded"),
                "empty" => Ok(Vec::new()),
                "hungry" => Err(PluginError::OutOfMemory(1 << 30)),
                other => Err(PluginError::UnknownFunction(other.to_string())),
            }
        }
    }

    fn start(config: &[u8]) -> (RawStatus, *mut c_void) {
        let mut handle = ptr::NonNull::<c_void>::dangling().as_ptr();
        let status = unsafe { init::<Counter>(config.len(), config.as_ptr().cast(), &mut handle) };
        (status, handle)
    }

    fn call(handle: *mut c_void, name: &str) -> (RawStatus, Option<Vec<u8>>) {
        let mut len = usize::MAX;
        let mut out: *const c_char = ptr::NonNull::<c_char>::dangling().as_ptr();
        let status = unsafe {
            invoke::<Counter>(
                handle,
                name.len(),
                name.as_ptr().cast(),
                0,
                ptr::null(),
                &mut len,
                &mut out,
            )
        };
        if out.is_null() {
            assert_eq!(len, 0);
            return (status, None);
        }
        let copy = unsafe { slice::from_raw_parts(out.cast::<u8>(), len) }.to_vec();
        unsafe { free_result::<Counter>(handle, len, out) };
        (status, Some(copy))
    }

    fn last_error(handle: *mut c_void) -> Option<String> {
        let mut len = 0;
        let mut msg = ptr::null();
        unsafe { last_error_message::<Counter>(handle, &mut len, &mut msg) };
        if msg.is_null() {
            return None;
        }
        let bytes = unsafe { slice::from_raw_parts(msg.cast::<u8>(), len) };
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    #[test]
    fn rejected_config_leaves_a_null_handle() {
        let (status, handle) = start(b"bogus");
        assert_eq!(status, Status::InitError.code());
        assert!(handle.is_null());
    }

    #[test]
    fn panicking_init_is_an_unknown_error() {
        let (status, handle) = start(b"panic");
        assert_eq!(status, Status::UnknownError.code());
        assert!(handle.is_null());
    }

    #[test]
    fn state_persists_between_invocations() {
        let (status, handle) = start(b"");
        assert_eq!(status, Status::Success.code());
        assert_eq!(call(handle, "count"), (0, Some(b"1".to_vec())));
        assert_eq!(call(handle, "count"), (0, Some(b"2".to_vec())));
        unsafe { deinit::<Counter>(handle) };
    }

    #[test]
    fn error_message_tracks_the_latest_failure() {
        let (_, handle) = start(b"");
        assert_eq!(last_error(handle), None);

        assert_eq!(call(handle, "missing").0, Status::InvokeError.code());
        assert_eq!(last_error(handle).unwrap(), "unknown function `missing`");

        assert_eq!(call(handle, "count").0, Status::Success.code());
        assert_eq!(last_error(handle).unwrap(), "unknown function `missing`");

        assert_eq!(call(handle, "other").0, Status::InvokeError.code());
        assert_eq!(last_error(handle).unwrap(), "unknown function `other`");
        unsafe { deinit::<Counter>(handle) };
    }

    #[test]
    fn panicking_function_keeps_the_handle_usable() {
        let (_, handle) = start(b"");
        assert_eq!(call(handle, "explode"), (Status::UnknownError.code(), None));
        assert_eq!(last_error(handle).unwrap(), "plugin panicked: exploded");
        assert_eq!(call(handle, "count"), (0, Some(b"1".to_vec())));
        unsafe { deinit::<Counter>(handle) };
    }

    #[test]
    fn non_utf8_function_names_are_rejected() {
        let (_, handle) = start(b"");
        let name = [0xff_u8, 0xfe];
        let mut len = 0;
        let mut out = ptr::null();
        let status = unsafe {
            invoke::<Counter>(
                handle,
                name.len(),
                name.as_ptr().cast(),
                0,
                ptr::null(),
                &mut len,
                &mut out,
            )
        };
        assert_eq!(status, Status::InvokeError.code());
        assert!(out.is_null());
        unsafe { deinit::<Counter>(handle) };
    }

    #[test]
    fn schema_pointer_is_stable_across_calls() {
        let (_, handle) = start(b"");
        let read = || {
            let mut len = 0;
            let mut json = ptr::null();
            let status = unsafe { schema::<Counter>(handle, &mut len, &mut json) };
            assert_eq!(status, Status::Success.code());
            (json, len)
        };
        let first = read();
        let second = read();
        assert_eq!(first, second);
        let text = unsafe { slice::from_raw_parts(first.0.cast::<u8>(), first.1) };
        let parsed = Schema::from_slice(text).unwrap();
        assert_eq!(parsed.names().collect::<Vec<_>>(), ["count"]);
        unsafe { deinit::<Counter>(handle) };
    }

    #[test]
    fn transfer_trims_spare_capacity() {
        let mut output = Vec::with_capacity(32);
        output.extend_from_slice(b"abc");
        let boxed = transfer(output).unwrap();
        assert_eq!(&*boxed, b"abc");
    }

    #[test]
    fn deinit_tolerates_null() {
        unsafe { deinit::<Counter>(ptr::null_mut()) };
    }

    #[test]
    fn out_of_memory_produces_no_buffer() {
        let (_, handle) = start(b"");
        assert_eq!(call(handle, "hungry"), (Status::OutOfMemory.code(), None));
        assert_eq!(Status::OutOfMemory.code(), -2);
        assert!(last_error(handle).unwrap().starts_with("out of memory"));
        assert_eq!(call(handle, "count"), (0, Some(b"1".to_vec())));
        unsafe { deinit::<Counter>(handle) };
    }

    #[test]
    fn empty_output_is_handed_off_and_released() {
        let (_, handle) = start(b"");
        let name = "empty";
        let mut len = usize::MAX;
        let mut out: *const c_char = ptr::null();
        let status = unsafe {
            invoke::<Counter>(
                handle,
                name.len(),
                name.as_ptr().cast(),
                0,
                ptr::null(),
                &mut len,
                &mut out,
            )
        };
        assert_eq!(status, Status::Success.code());
        assert!(!out.is_null());
        assert_eq!(len, 0);
        unsafe { free_result::<Counter>(handle, len, out) };
        assert_eq!(call(handle, "count"), (0, Some(b"1".to_vec())));
        unsafe { deinit::<Counter>(handle) };
    }

    #[test]
    fn free_result_tolerates_null() {
        let (_, handle) = start(b"");
        unsafe { free_result::<Counter>(handle, 0, ptr::null()) };
        unsafe { free_result::<Counter>(handle, 16, ptr::null()) };
        assert_eq!(call(handle, "count"), (0, Some(b"1".to_vec())));
        unsafe { deinit::<Counter>(handle) };
    }

    #[test]
    fn null_result_out_pointer_is_an_invoke_error() {
        let (_, handle) = start(b"");
        let name = "count";
        let mut len = 0;
        let status = unsafe {
            invoke::<Counter>(
                handle,
                name.len(),
                name.as_ptr().cast(),
                0,
                ptr::null(),
                &mut len,
                ptr::null_mut(),
            )
        };
        assert_eq!(status, Status::InvokeError.code());
        assert!(last_error(handle).unwrap().contains("null result out-pointer"));
        unsafe { deinit::<Counter>(handle) };
    }
}
