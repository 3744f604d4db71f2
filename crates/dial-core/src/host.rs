//! Safe host-side driver over a plugin's entry points.
//!
//! A [`PluginInstance`] only exists between a successful `init` and its `deinit`, so
//! out-of-order calls cannot be expressed. Every invoke result is wrapped in a
//! [`ResultBuffer`] that hands the allocation back through `free_result` exactly once.

use std::{
    ffi::{c_char, c_void},
    fmt,
    ops::Deref,
    ptr, slice,
};

use dial_plugin_sdk::{PluginVTable, RawStatus, Schema, Status};

use crate::error::{HostError, Result};

/// One initialized plugin handle.
///
/// `Send` so distinct instances can live on distinct threads; not `Sync`, so a
/// handle never sees two calls at once.
pub struct PluginInstance {
    vtable: PluginVTable,
    handle: *mut c_void,
}

// SAFETY: the handle is exclusively owned by this value and plugins are `Send`.
unsafe impl Send for PluginInstance {}

impl PluginInstance {
    /// Calls `init` with `config` as the opaque init buffer.
    pub fn init(vtable: PluginVTable, config: &[u8]) -> Result<Self> {
        let mut handle = ptr::null_mut();
        let code = unsafe { (vtable.init)(config.len(), config.as_ptr().cast(), &mut handle) };
        match Status::from_code(code) {
            Some(Status::Success) => {
                tracing::debug!(config_len = config.len(), "plugin instance initialized");
                Ok(Self { vtable, handle })
            }
            Some(status) => Err(HostError::Status {
                operation: "init",
                status,
                message: None,
            }),
            None => Err(HostError::UndefinedStatus {
                operation: "init",
                code,
            }),
        }
    }

    /// Raw schema bytes. They stay owned by the plugin and are never freed here.
    pub fn schema_bytes(&self) -> Result<&[u8]> {
        let mut len = 0;
        let mut text: *const c_char = ptr::null();
        let code = unsafe { (self.vtable.schema)(self.handle, &mut len, &mut text) };
        self.check("schema", code)?;
        if text.is_null() {
            return Ok(&[]);
        }
        Ok(unsafe { slice::from_raw_parts(text.cast::<u8>(), len) })
    }

    pub fn schema(&self) -> Result<Schema> {
        Ok(Schema::from_slice(self.schema_bytes()?)?)
    }

    pub fn invoke(&self, function: &str, args: &[u8]) -> Result<ResultBuffer<'_>> {
        let mut len = 0;
        let mut data: *const c_char = ptr::null();
        let code = unsafe {
            (self.vtable.invoke)(
                self.handle,
                function.len(),
                function.as_ptr().cast(),
                args.len(),
                args.as_ptr().cast(),
                &mut len,
                &mut data,
            )
        };
        if let Err(err) = self.check("invoke", code) {
            metrics::counter!("dial_invocations_total", "outcome" => "error").increment(1);
            tracing::debug!(function, error = %err, "invocation failed");
            return Err(err);
        }
        metrics::counter!("dial_invocations_total", "outcome" => "success").increment(1);
        tracing::debug!(function, len, "invocation succeeded");
        Ok(ResultBuffer {
            owner: self,
            data,
            len,
        })
    }

    /// Diagnostic for the most recent failing call, copied out of the handle.
    pub fn last_error(&self) -> Option<String> {
        let mut len = 0;
        let mut message: *const c_char = ptr::null();
        unsafe { (self.vtable.last_error_message)(self.handle, &mut len, &mut message) };
        if message.is_null() || len == 0 {
            return None;
        }
        let bytes = unsafe { slice::from_raw_parts(message.cast::<u8>(), len) };
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Ends the instance. Dropping it has the same effect.
    pub fn deinit(self) {}

    fn check(&self, operation: &'static str, code: RawStatus) -> Result<()> {
        match Status::from_code(code) {
            Some(Status::Success) => Ok(()),
            Some(status) => Err(HostError::Status {
                operation,
                status,
                message: self.last_error(),
            }),
            None => Err(HostError::UndefinedStatus { operation, code }),
        }
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        unsafe { (self.vtable.deinit)(self.handle) };
        tracing::debug!("plugin instance deinitialized");
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("handle", &self.handle)
            .finish()
    }
}

/// Result of one successful invoke, released back to the plugin on drop.
pub struct ResultBuffer<'a> {
    owner: &'a PluginInstance,
    data: *const c_char,
    len: usize,
}

impl ResultBuffer<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.data.cast::<u8>(), self.len) }
    }

    pub fn to_str(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }
}

impl Deref for ResultBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for ResultBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultBuffer").field("len", &self.len).finish()
    }
}

impl Drop for ResultBuffer<'_> {
    fn drop(&mut self) {
        if self.data.is_null() {
            return;
        }
        let owner = self.owner;
        unsafe { (owner.vtable.free_result)(owner.handle, self.len, self.data) };
    }
}
