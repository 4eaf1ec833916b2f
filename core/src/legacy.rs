//! The older, narrower entry points.
//!
//! Older callers open devices with a read-only flag instead of separate read
//! and write flags. Everything here translates parameters and delegates to
//! [`Gateway`]; no behavior of its own.

use crate::backend::DeviceBackend;
use crate::error::Result;
use crate::gateway::{Gateway, OpenRequest};
use crate::handle::DeviceHandle;
use crate::joystick::{JoystickBounds, JoystickPos};

/// Open parameters of the older convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyOpen {
    pub read_only: bool,
    pub random_access: bool,
}

impl From<LegacyOpen> for OpenRequest {
    fn from(legacy: LegacyOpen) -> Self {
        OpenRequest {
            read: true,
            write: !legacy.read_only,
            random_access: legacy.random_access,
        }
    }
}

pub struct LegacyGateway<'g, B> {
    inner: &'g Gateway<B>,
}

impl<'g, B: DeviceBackend> LegacyGateway<'g, B> {
    pub fn new(inner: &'g Gateway<B>) -> Self {
        Self { inner }
    }

    pub fn open(&self, path: &str, read_only: bool, random_access: bool) -> Result<DeviceHandle> {
        self.inner.open(path, LegacyOpen { read_only, random_access }.into())
    }

    pub fn close(&self, handle: DeviceHandle) -> Result<()> {
        self.inner.close(handle)
    }

    pub fn flush(&self, handle: DeviceHandle) -> Result<()> {
        self.inner.flush(handle)
    }

    pub fn seek(&self, handle: DeviceHandle, position: i64) -> Result<()> {
        self.inner.seek(handle, position)
    }

    pub fn read(&self, handle: DeviceHandle, buf: &mut [u8], offset: i32, len: i32) -> Result<usize> {
        self.inner.read(handle, buf, offset, len)
    }

    pub fn write(&self, handle: DeviceHandle, buf: &[u8], offset: i32, len: i32) -> Result<usize> {
        self.inner.write(handle, buf, offset, len)
    }

    pub fn joystick_bounds(&self, index: u32) -> Result<JoystickBounds> {
        self.inner.joystick_bounds(index)
    }

    pub fn joystick_pos(&self, index: u32) -> Result<JoystickPos> {
        self.inner.joystick_pos(index)
    }

    pub fn error_message(&self, code: u32) -> Option<String> {
        self.inner.error_message(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_maps_to_read_access() {
        let request: OpenRequest = LegacyOpen { read_only: true, random_access: false }.into();
        assert_eq!(request, OpenRequest { read: true, write: false, random_access: false });
    }

    #[test]
    fn writable_maps_to_read_write() {
        let request: OpenRequest = LegacyOpen { read_only: false, random_access: true }.into();
        assert_eq!(request, OpenRequest::read_write());
    }
}
