//! Raw C ABI shared by plugins and hosts.
//!
//! The declarations here mirror `include/dial-plugin.h` one to one.

use std::{
    ffi::{c_char, c_int, c_void},
    fmt,
};

/// Status code as it travels across the C boundary.
pub type RawStatus = c_int;

/// Closed set of status codes returned by the entry points. Negative values are failures.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success = 0,
    UnknownError = -1,
    OutOfMemory = -2,
    InitError = -3,
    SchemaError = -4,
    InvokeError = -5,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Success,
        Status::UnknownError,
        Status::OutOfMemory,
        Status::InitError,
        Status::SchemaError,
        Status::InvokeError,
    ];

    pub const fn code(self) -> RawStatus {
        self as RawStatus
    }

    /// Decodes a raw status, returning `None` for codes outside the enumeration.
    pub fn from_code(code: RawStatus) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::UnknownError => "unknown error",
            Status::OutOfMemory => "out of memory",
            Status::InitError => "init error",
            Status::SchemaError => "schema error",
            Status::InvokeError => "invoke error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

pub type InitFn =
    unsafe extern "C" fn(args_len: usize, args: *const c_char, handle: *mut *mut c_void) -> RawStatus;

pub type DeinitFn = unsafe extern "C" fn(handle: *mut c_void);

pub type SchemaFn = unsafe extern "C" fn(
    handle: *mut c_void,
    schema_len: *mut usize,
    schema: *mut *const c_char,
) -> RawStatus;

pub type InvokeFn = unsafe extern "C" fn(
    handle: *mut c_void,
    fn_name_len: usize,
    fn_name: *const c_char,
    args_len: usize,
    args: *const c_char,
    result_len: *mut usize,
    result: *mut *const c_char,
) -> RawStatus;

pub type FreeResultFn = unsafe extern "C" fn(handle: *mut c_void, result_len: usize, result: *const c_char);

pub type LastErrorMessageFn = unsafe extern "C" fn(
    handle: *mut c_void,
    error_message_len: *mut usize,
    error_message: *mut *const c_char,
);

/// Symbol names every plugin library exports, in vtable order.
pub const SYMBOLS: [&str; 6] = [
    "dial_plugin_init",
    "dial_plugin_deinit",
    "dial_plugin_schema",
    "dial_plugin_invoke",
    "dial_plugin_free_result",
    "dial_plugin_last_error_message",
];

/// The entry points of one plugin, however the host obtained them.
#[derive(Debug, Clone, Copy)]
pub struct PluginVTable {
    pub init: InitFn,
    pub deinit: DeinitFn,
    pub schema: SchemaFn,
    pub invoke: InvokeFn,
    pub free_result: FreeResultFn,
    pub last_error_message: LastErrorMessageFn,
}
