use crate::error::{GatewayError, Result};
use std::fmt;

/// Opaque reference to an open device or volume.
///
/// Stored at native pointer width. Crossing the runtime boundary goes through
/// [`DeviceHandle::to_jlong`] / [`DeviceHandle::from_jlong`], never a 32-bit
/// integer, so 64-bit handles survive the round trip intact.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(isize);

impl DeviceHandle {
    /// `INVALID_HANDLE_VALUE`
    pub const INVALID: DeviceHandle = DeviceHandle(-1);

    pub const fn from_raw(raw: isize) -> Self {
        DeviceHandle(raw)
    }

    pub const fn as_raw(self) -> isize {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0 && self != Self::INVALID
    }

    pub fn to_jlong(self) -> i64 {
        self.0 as i64
    }

    pub fn from_jlong(value: i64) -> Result<Self> {
        isize::try_from(value)
            .map(DeviceHandle)
            .map_err(|_| GatewayError::InvalidHandle)
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceHandle({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_values() {
        assert!(!DeviceHandle::INVALID.is_valid());
        assert!(!DeviceHandle::from_raw(0).is_valid());
        assert!(DeviceHandle::from_raw(0x1c4).is_valid());
    }

    #[test]
    fn jlong_keeps_pointer_width() {
        let raw = isize::MAX - 7;
        let handle = DeviceHandle::from_raw(raw);
        let back = DeviceHandle::from_jlong(handle.to_jlong()).unwrap();
        assert_eq!(back.as_raw(), raw);
        assert_eq!(DeviceHandle::INVALID.to_jlong(), -1);
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn oversized_jlong_rejected() {
        assert_eq!(DeviceHandle::from_jlong(1 << 40), Err(GatewayError::InvalidHandle));
    }
}
