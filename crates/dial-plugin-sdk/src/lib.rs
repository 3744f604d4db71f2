pub mod abi;
pub mod error;
pub mod ffi;
pub mod schema;

pub use abi::{PluginVTable, RawStatus, Status};
pub use error::PluginError;
pub use schema::{FunctionDescriptor, Schema};

/// Trait implemented by native plugins exported through [`export_plugin!`].
///
/// Calls on one instance never overlap; the host serializes them.
pub trait Plugin: Send + Sized + 'static {
    /// Identifier used in log output.
    const NAME: &'static str;

    /// Builds the plugin from the opaque init buffer, which may be empty.
    fn init(config: &[u8]) -> Result<Self, PluginError>;

    /// Describes every function [`Plugin::invoke`] accepts. Called at most once per
    /// instance; the serialized form is cached for the lifetime of the handle.
    fn schema(&self) -> Result<Schema, PluginError>;

    fn invoke(&mut self, function: &str, args: &[u8]) -> Result<Vec<u8>, PluginError>;
}

/// C declarations of the entry points exported by every plugin.
pub const C_HEADER: &str = include_str!("../include/dial-plugin.h");

/// Exports `$plugin` under the fixed `dial_plugin_*` symbol names.
///
/// Also emits `dial_plugin_vtable()`, returning the same entry points for hosts that
/// link the plugin crate directly instead of loading it.
///
/// ```ignore
/// struct Clock;
/// impl dial_plugin_sdk::Plugin for Clock { /* ... */ }
/// dial_plugin_sdk::export_plugin!(Clock);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($plugin:ty) => {
        /// # Safety
        /// See `dial_plugin_sdk::ffi::init`.
        #[no_mangle]
        pub unsafe extern "C" fn dial_plugin_init(
            args_len: usize,
            args: *const ::std::ffi::c_char,
            handle: *mut *mut ::std::ffi::c_void,
        ) -> $crate::RawStatus {
            $crate::ffi::init::<$plugin>(args_len, args, handle)
        }

        /// # Safety
        /// See `dial_plugin_sdk::ffi::deinit`.
        #[no_mangle]
        pub unsafe extern "C" fn dial_plugin_deinit(handle: *mut ::std::ffi::c_void) {
            $crate::ffi::deinit::<$plugin>(handle)
        }

        /// # Safety
        /// See `dial_plugin_sdk::ffi::schema`.
        #[no_mangle]
        pub unsafe extern "C" fn dial_plugin_schema(
            handle: *mut ::std::ffi::c_void,
            schema_len: *mut usize,
            schema_str: *mut *const ::std::ffi::c_char,
        ) -> $crate::RawStatus {
            $crate::ffi::schema::<$plugin>(handle, schema_len, schema_str)
        }

        /// # Safety
        /// See `dial_plugin_sdk::ffi::invoke`.
        #[no_mangle]
        pub unsafe extern "C" fn dial_plugin_invoke(
            handle: *mut ::std::ffi::c_void,
            fn_name_len: usize,
            fn_name: *const ::std::ffi::c_char,
            args_len: usize,
            args: *const ::std::ffi::c_char,
            result_len: *mut usize,
            result: *mut *const ::std::ffi::c_char,
        ) -> $crate::RawStatus {
            $crate::ffi::invoke::<$plugin>(
                handle,
                fn_name_len,
                fn_name,
                args_len,
                args,
                result_len,
                result,
            )
        }

        /// # Safety
        /// See `dial_plugin_sdk::ffi::free_result`.
        #[no_mangle]
        pub unsafe extern "C" fn dial_plugin_free_result(
            handle: *mut ::std::ffi::c_void,
            result_len: usize,
            result: *const ::std::ffi::c_char,
        ) {
            $crate::ffi::free_result::<$plugin>(handle, result_len, result)
        }

        /// # Safety
        /// See `dial_plugin_sdk::ffi::last_error_message`.
        #[no_mangle]
        pub unsafe extern "C" fn dial_plugin_last_error_message(
            handle: *mut ::std::ffi::c_void,
            error_message_len: *mut usize,
            error_message: *mut *const ::std::ffi::c_char,
        ) {
            $crate::ffi::last_error_message::<$plugin>(handle, error_message_len, error_message)
        }

        pub fn dial_plugin_vtable() -> $crate::PluginVTable {
            $crate::PluginVTable {
                init: dial_plugin_init,
                deinit: dial_plugin_deinit,
                schema: dial_plugin_schema,
                invoke: dial_plugin_invoke,
                free_result: dial_plugin_free_result,
                last_error_message: dial_plugin_last_error_message,
            }
        }
    };
}
