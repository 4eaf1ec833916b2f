//! JNI entry points of the device gateway.
//!
//! Builds `devgate.dll`, loaded by `devgate.WinDeviceIO` and by the older
//! `devgate.DeviceIO`. No Java exception is ever raised from here: every
//! failure comes back as a status code, with JNI-level trouble reported as
//! `-1`.
//!
//! Logging goes through `env_logger`, configured with `DEVGATE_LOG`
//! (for example `DEVGATE_LOG=devgate_core=debug`) and defaulting to `warn`.

pub mod error;
pub mod marshal;

#[cfg(windows)]
mod exports;
#[cfg(windows)]
mod legacy;

pub use error::{status, BridgeError, BridgeResult};

use jni::sys::{jint, JNI_VERSION_1_6};
use jni::JavaVM;
use std::ffi::c_void;

#[cfg(windows)]
use devgate_core::Gateway;
#[cfg(windows)]
use devgate_platform::PlatformBackend;
#[cfg(windows)]
use once_cell::sync::Lazy;

/// The gateway serving every export. It holds no per-handle state, so one
/// instance is shared by all calling threads.
#[cfg(windows)]
pub(crate) static GATEWAY: Lazy<Gateway<PlatformBackend>> =
    Lazy::new(|| Gateway::new(PlatformBackend::new()));

/// Installs the logger; a second load of the library leaves the first one.
pub fn init_logging() {
    let env = env_logger::Env::new().filter_or(devgate_core::LOG_ENV, "warn");
    if env_logger::Builder::from_env(env).try_init().is_ok() {
        log::debug!("devgate native library v{} loaded", devgate_core::LIB_VERSION);
    }
}

#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    init_logging();
    JNI_VERSION_1_6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_init_is_repeatable() {
        init_logging();
        init_logging();
    }
}
