use crate::handle::DeviceHandle;
use crate::joystick::{JoystickBounds, JoystickPos};

/// Raw last-error value from the OS.
pub type OsResult<T> = std::result::Result<T, u32>;

pub const GENERIC_READ: u32 = 0x8000_0000;
pub const GENERIC_WRITE: u32 = 0x4000_0000;
pub const FILE_FLAG_SEQUENTIAL_SCAN: u32 = 0x0800_0000;

/// Desired access bits passed to `CreateFile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessMode(pub u32);

impl AccessMode {
    pub const NONE: AccessMode = AccessMode(0);
    pub const READ: AccessMode = AccessMode(GENERIC_READ);
    pub const WRITE: AccessMode = AccessMode(GENERIC_WRITE);

    pub fn contains(self, other: AccessMode) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AccessMode {
    type Output = AccessMode;

    fn bitor(self, rhs: AccessMode) -> AccessMode {
        AccessMode(self.0 | rhs.0)
    }
}

/// Flags-and-attributes bits passed to `CreateFile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const NONE: OpenFlags = OpenFlags(0);
    pub const SEQUENTIAL_SCAN: OpenFlags = OpenFlags(FILE_FLAG_SEQUENTIAL_SCAN);

    pub fn is_sequential(self) -> bool {
        self.0 & FILE_FLAG_SEQUENTIAL_SCAN != 0
    }
}

/// The operating-system primitives the gateway forwards to.
///
/// Each method is exactly one OS call. Implementations never retry, never
/// interpret the error code and never keep state about the handles they hand
/// out; sharing is always read+write with `OPEN_EXISTING` disposition.
pub trait DeviceBackend: Send + Sync {
    fn create_file(&self, path: &str, access: AccessMode, flags: OpenFlags) -> OsResult<DeviceHandle>;

    fn close_handle(&self, handle: DeviceHandle) -> OsResult<()>;

    fn flush_buffers(&self, handle: DeviceHandle) -> OsResult<()>;

    /// Absolute positioning from the start of the device.
    fn set_file_pointer(&self, handle: DeviceHandle, offset: i64) -> OsResult<()>;

    fn read_file(&self, handle: DeviceHandle, buf: &mut [u8]) -> OsResult<usize>;

    fn write_file(&self, handle: DeviceHandle, buf: &[u8]) -> OsResult<usize>;

    /// Returns the number of bytes placed in `output`.
    fn device_io_control(
        &self,
        handle: DeviceHandle,
        code: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> OsResult<usize>;

    fn drive_type(&self, root: &str) -> u32;

    fn logical_drives(&self) -> u32;

    fn volume_label(&self, root: &str) -> OsResult<String>;

    fn net_connection(&self, device: &str) -> OsResult<String>;

    /// `path` is UTF-16 without terminator; the result likewise.
    fn short_path_name(&self, path: &[u16]) -> OsResult<Vec<u16>>;

    fn joystick_caps(&self, index: u32) -> OsResult<JoystickBounds>;

    fn joystick_pos(&self, index: u32) -> OsResult<JoystickPos>;

    fn format_message(&self, code: u32) -> Option<String>;
}

impl<B: DeviceBackend + ?Sized> DeviceBackend for std::sync::Arc<B> {
    fn create_file(&self, path: &str, access: AccessMode, flags: OpenFlags) -> OsResult<DeviceHandle> {
        (**self).create_file(path, access, flags)
    }

    fn close_handle(&self, handle: DeviceHandle) -> OsResult<()> {
        (**self).close_handle(handle)
    }

    fn flush_buffers(&self, handle: DeviceHandle) -> OsResult<()> {
        (**self).flush_buffers(handle)
    }

    fn set_file_pointer(&self, handle: DeviceHandle, offset: i64) -> OsResult<()> {
        (**self).set_file_pointer(handle, offset)
    }

    fn read_file(&self, handle: DeviceHandle, buf: &mut [u8]) -> OsResult<usize> {
        (**self).read_file(handle, buf)
    }

    fn write_file(&self, handle: DeviceHandle, buf: &[u8]) -> OsResult<usize> {
        (**self).write_file(handle, buf)
    }

    fn device_io_control(
        &self,
        handle: DeviceHandle,
        code: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> OsResult<usize> {
        (**self).device_io_control(handle, code, input, output)
    }

    fn drive_type(&self, root: &str) -> u32 {
        (**self).drive_type(root)
    }

    fn logical_drives(&self) -> u32 {
        (**self).logical_drives()
    }

    fn volume_label(&self, root: &str) -> OsResult<String> {
        (**self).volume_label(root)
    }

    fn net_connection(&self, device: &str) -> OsResult<String> {
        (**self).net_connection(device)
    }

    fn short_path_name(&self, path: &[u16]) -> OsResult<Vec<u16>> {
        (**self).short_path_name(path)
    }

    fn joystick_caps(&self, index: u32) -> OsResult<JoystickBounds> {
        (**self).joystick_caps(index)
    }

    fn joystick_pos(&self, index: u32) -> OsResult<JoystickPos> {
        (**self).joystick_pos(index)
    }

    fn format_message(&self, code: u32) -> Option<String> {
        (**self).format_message(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_mode_bits() {
        let both = AccessMode::READ | AccessMode::WRITE;
        assert_eq!(both.0, 0xC000_0000);
        assert!(both.contains(AccessMode::READ));
        assert!(both.contains(AccessMode::WRITE));
        assert!(!AccessMode::READ.contains(AccessMode::WRITE));
        assert!(!AccessMode::NONE.contains(AccessMode::NONE));
    }
}
