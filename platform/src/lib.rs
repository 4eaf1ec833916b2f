//! OS backends for the device gateway.
//!
//! Only Windows exposes raw volumes and physical drives through the handle
//! API the gateway forwards to; other targets compile to an empty crate.

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "windows")]
pub use windows::WindowsBackend as PlatformBackend;
