use crate::backend::{AccessMode, DeviceBackend, OpenFlags};
use crate::error::{GatewayError, Result, ERROR_NOT_READY};
use crate::handle::DeviceHandle;
use crate::ioctl::{self, *};
use crate::joystick::{JoystickBounds, JoystickPos};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Version reported to callers so they can detect an outdated library.
pub const LIB_VERSION: i32 = 2;

/// Access requested when opening a device or volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenRequest {
    pub read: bool,
    pub write: bool,
    /// Without this hint a reading or writing handle is opened for
    /// sequential scanning.
    pub random_access: bool,
}

impl OpenRequest {
    pub fn read_only() -> Self {
        Self { read: true, ..Self::default() }
    }

    pub fn read_write() -> Self {
        Self { read: true, write: true, random_access: true }
    }

    /// Handle for control-code queries only.
    pub fn query() -> Self {
        Self::default()
    }

    pub fn access(&self) -> AccessMode {
        let mut access = AccessMode::NONE;
        if self.read {
            access = access | AccessMode::READ;
        }
        if self.write {
            access = access | AccessMode::WRITE;
        }
        access
    }

    pub fn flags(&self) -> OpenFlags {
        if (self.read || self.write) && !self.random_access {
            OpenFlags::SEQUENTIAL_SCAN
        } else {
            OpenFlags::NONE
        }
    }
}

/// The part of a caller buffer a transfer may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRange(Range<usize>);

impl TransferRange {
    /// Clamps `len` so that `offset + len` stays within `capacity`.
    ///
    /// A negative offset or a clamped length of zero or less is refused; the
    /// caller must not reach the OS in that case.
    pub fn clamp(capacity: usize, offset: i32, len: i32) -> Result<Self> {
        let invalid = GatewayError::InvalidRange { offset, length: len, capacity };
        if offset < 0 {
            return Err(invalid);
        }
        let start = offset as usize;
        let available = capacity.saturating_sub(start);
        let effective = (len.max(0) as usize).min(available);
        if effective == 0 {
            return Err(invalid);
        }
        Ok(TransferRange(start..start + effective))
    }

    pub fn start(&self) -> usize {
        self.0.start
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_range(&self) -> Range<usize> {
        self.0.clone()
    }
}

/// Forwards each operation to exactly one backend primitive.
///
/// Holds no state beyond the backend, so one instance can serve any number
/// of threads. Calls against the same handle are not serialized here.
#[derive(Debug, Default, Clone)]
pub struct Gateway<B> {
    backend: B,
}

impl<B: DeviceBackend> Gateway<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn lib_version(&self) -> i32 {
        LIB_VERSION
    }

    // --- lifecycle ---

    pub fn open(&self, path: &str, request: OpenRequest) -> Result<DeviceHandle> {
        if path.is_empty() || path.contains('\0') {
            return Err(GatewayError::InvalidInput(format!("bad device path {:?}", path)));
        }
        debug!("open {} {:?}", path, request);
        match self.backend.create_file(path, request.access(), request.flags()) {
            Ok(handle) if handle.is_valid() => {
                trace!("opened {} as {:?}", path, handle);
                Ok(handle)
            }
            Ok(handle) => {
                debug!("open {} yielded unusable handle {:?}", path, handle);
                Err(GatewayError::InvalidHandle)
            }
            Err(0) => Err(GatewayError::InvalidHandle),
            Err(code) => Err(GatewayError::Os(code)),
        }
    }

    /// Releases the handle after a best-effort volume unlock.
    ///
    /// The unlock outcome is ignored; only the close itself is reported.
    pub fn close(&self, handle: DeviceHandle) -> Result<()> {
        if let Err(code) = self.control(handle, FSCTL_UNLOCK_VOLUME, &[], &mut []) {
            trace!("unlock before close of {:?} returned {}", handle, code);
        }
        debug!("close {:?}", handle);
        self.backend.close_handle(handle).map_err(GatewayError::Os)
    }

    pub fn flush(&self, handle: DeviceHandle) -> Result<()> {
        self.backend.flush_buffers(handle).map_err(GatewayError::Os)
    }

    pub fn lock(&self, handle: DeviceHandle) -> Result<()> {
        debug!("lock {:?}", handle);
        self.control(handle, FSCTL_LOCK_VOLUME, &[], &mut [])
            .map(|_| ())
            .map_err(GatewayError::Os)
    }

    pub fn unlock(&self, handle: DeviceHandle) -> Result<()> {
        self.control(handle, FSCTL_UNLOCK_VOLUME, &[], &mut [])
            .map(|_| ())
            .map_err(GatewayError::Os)
    }

    /// Forces the filesystem off the volume. A volume that is not mounted
    /// (`ERROR_NOT_READY`) counts as dismounted.
    pub fn dismount(&self, handle: DeviceHandle) -> Result<()> {
        debug!("dismount {:?}", handle);
        match self.control(handle, FSCTL_DISMOUNT_VOLUME, &[], &mut []) {
            Ok(_) => Ok(()),
            Err(ERROR_NOT_READY) => {
                debug!("{:?} already dismounted", handle);
                Ok(())
            }
            Err(code) => Err(GatewayError::Os(code)),
        }
    }

    /// Moves the cursor to an absolute byte position.
    pub fn seek(&self, handle: DeviceHandle, position: i64) -> Result<()> {
        trace!("seek {:?} to {}", handle, position);
        self.backend.set_file_pointer(handle, position).map_err(GatewayError::Os)
    }

    // --- bulk transfer ---

    /// Reads into `buf[offset..offset + len]`, clamped to the buffer.
    ///
    /// Returns the number of bytes the OS actually delivered; a short read
    /// is not an error and is not retried.
    pub fn read(&self, handle: DeviceHandle, buf: &mut [u8], offset: i32, len: i32) -> Result<usize> {
        let range = TransferRange::clamp(buf.len(), offset, len)?;
        trace!("read {:?} {} bytes into offset {}", handle, range.len(), range.start());
        self.backend
            .read_file(handle, &mut buf[range.as_range()])
            .map_err(GatewayError::Os)
    }

    /// Writes `buf[offset..offset + len]`, clamped to the buffer.
    pub fn write(&self, handle: DeviceHandle, buf: &[u8], offset: i32, len: i32) -> Result<usize> {
        let range = TransferRange::clamp(buf.len(), offset, len)?;
        trace!("write {:?} {} bytes from offset {}", handle, range.len(), range.start());
        self.backend
            .write_file(handle, &buf[range.as_range()])
            .map_err(GatewayError::Os)
    }

    // --- control-code queries ---

    fn control(&self, handle: DeviceHandle, code: u32, input: &[u8], output: &mut [u8]) -> std::result::Result<usize, u32> {
        self.backend.device_io_control(handle, code, input, output)
    }

    fn query(&self, handle: DeviceHandle, code: u32, input: &[u8], mut scratch: Vec<u8>) -> Result<Vec<u8>> {
        let returned = self
            .control(handle, code, input, &mut scratch)
            .map_err(GatewayError::Os)?;
        scratch.truncate(returned.min(scratch.len()));
        Ok(scratch)
    }

    pub fn disk_geometry(&self, handle: DeviceHandle) -> Result<DiskGeometry> {
        let reply = self.query(handle, IOCTL_DISK_GET_DRIVE_GEOMETRY, &[], vec![0; DISK_GEOMETRY_SIZE])?;
        DiskGeometry::decode(ReplyView::new(&reply))
    }

    pub fn disk_geometry_ex(&self, handle: DeviceHandle) -> Result<DiskGeometryEx> {
        let reply = self.query(handle, IOCTL_DISK_GET_DRIVE_GEOMETRY_EX, &[], vec![0; DISK_GEOMETRY_EX_SIZE])?;
        DiskGeometryEx::decode(ReplyView::new(&reply))
    }

    pub fn partition_style(&self, handle: DeviceHandle) -> Result<DriveLayout> {
        let scratch = vec![0; DRIVE_LAYOUT_HEADER_SIZE + PARTITION_ENTRY_SIZE + REPLY_SLACK];
        let reply = self.query(handle, IOCTL_DISK_GET_DRIVE_LAYOUT_EX, &[], scratch)?;
        DriveLayout::decode(ReplyView::new(&reply))
    }

    pub fn partition_info(&self, handle: DeviceHandle) -> Result<PartitionInfo> {
        let reply = self.query(handle, IOCTL_DISK_GET_PARTITION_INFO_EX, &[], vec![0; PARTITION_ENTRY_SIZE])?;
        PartitionInfo::decode(ReplyView::new(&reply))
    }

    /// Disk number backing a volume, if the volume sits on one disk only.
    ///
    /// Any failure, including a spanned volume, yields `Unavailable`.
    pub fn physical_drive_num(&self, handle: DeviceHandle) -> Result<u32> {
        let reply = self
            .query(handle, IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS, &[], vec![0; VOLUME_DISK_EXTENTS_SIZE])
            .map_err(|_| GatewayError::Unavailable("volume disk extents"))?;
        VolumeDiskExtents::decode(ReplyView::new(&reply))
            .ok()
            .and_then(|extents| extents.single_disk())
            .ok_or(GatewayError::Unavailable("volume does not map to a single physical drive"))
    }

    pub fn hotplug_info(&self, handle: DeviceHandle) -> Result<HotplugInfo> {
        let scratch = HotplugInfo::request_buffer().to_vec();
        let reply = self.query(handle, IOCTL_STORAGE_GET_HOTPLUG_INFO, &[], scratch)?;
        HotplugInfo::decode(ReplyView::new(&reply))
    }

    pub fn storage_device_info(&self, handle: DeviceHandle) -> Result<StorageDeviceInfo> {
        let query = ioctl::storage_property_query();
        let scratch = vec![0; STORAGE_DESCRIPTOR_HEADER_SIZE + REPLY_SLACK];
        let reply = self.query(handle, IOCTL_STORAGE_QUERY_PROPERTY, &query, scratch)?;
        StorageDeviceInfo::decode(ReplyView::new(&reply))
    }

    pub fn delete_drive_layout(&self, handle: DeviceHandle) -> Result<()> {
        warn!("deleting drive layout on {:?}", handle);
        self.control(handle, IOCTL_DISK_DELETE_DRIVE_LAYOUT, &[], &mut [])
            .map(|_| ())
            .map_err(GatewayError::Os)
    }

    // --- path, volume and network utilities ---

    /// `DRIVE_*` classification of a root path; never fails.
    pub fn drive_type(&self, root: &str) -> u32 {
        self.backend.drive_type(root)
    }

    /// Bit 0 is `A:`, bit 25 is `Z:`.
    pub fn logical_drives(&self) -> u32 {
        self.backend.logical_drives()
    }

    pub fn volume_label(&self, root: &str) -> Result<String> {
        self.backend.volume_label(root).map_err(GatewayError::Os)
    }

    pub fn net_connection(&self, device: &str) -> Result<String> {
        self.backend.net_connection(device).map_err(GatewayError::Os)
    }

    /// Resolves `path` (UTF-16, no terminator) to its 8.3 form.
    ///
    /// Any failure, including an empty path, yields the sentinel.
    pub fn short_path_name(&self, path: &[u16]) -> Result<Vec<u16>> {
        if path.is_empty() {
            return Err(GatewayError::InvalidInput("empty path".to_string()));
        }
        self.backend
            .short_path_name(path)
            .map_err(|_| GatewayError::Unavailable("short path name"))
    }

    pub fn joystick_bounds(&self, index: u32) -> Result<JoystickBounds> {
        self.backend
            .joystick_caps(index)
            .map_err(|_| GatewayError::Unavailable("joystick capabilities"))
    }

    pub fn joystick_pos(&self, index: u32) -> Result<JoystickPos> {
        self.backend
            .joystick_pos(index)
            .map_err(|_| GatewayError::Unavailable("joystick position"))
    }

    /// Localized system text for an OS error code, if the OS has one.
    pub fn error_message(&self, code: u32) -> Option<String> {
        self.backend
            .format_message(code)
            .map(|msg| msg.trim_end().to_string())
            .filter(|msg| !msg.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_flags_follow_access() {
        let seq = OpenRequest { read: true, write: false, random_access: false };
        assert_eq!(seq.access(), AccessMode::READ);
        assert!(seq.flags().is_sequential());

        let both = OpenRequest { read: true, write: true, random_access: false };
        assert_eq!(both.access().0, 0xC000_0000);
        assert!(both.flags().is_sequential());

        assert!(!OpenRequest::read_write().flags().is_sequential());
        assert_eq!(OpenRequest::query().access(), AccessMode::NONE);
        assert!(!OpenRequest::query().flags().is_sequential());
    }

    #[test]
    fn clamp_within_capacity() {
        let range = TransferRange::clamp(512, 0, 512).unwrap();
        assert_eq!(range.as_range(), 0..512);

        let range = TransferRange::clamp(512, 500, 100).unwrap();
        assert_eq!(range.as_range(), 500..512);
        assert_eq!(range.len(), 12);
    }

    #[test]
    fn clamp_matches_min_rule() {
        for capacity in [0usize, 1, 7, 512] {
            for offset in [0i32, 1, 6, 300, 511, 512, 900] {
                for len in [-5i32, 0, 1, 5, 512, i32::MAX] {
                    let expected = (len as i64).min(capacity as i64 - offset as i64);
                    match TransferRange::clamp(capacity, offset, len) {
                        Ok(range) => {
                            assert_eq!(range.len() as i64, expected);
                            assert!(range.as_range().end <= capacity);
                        }
                        Err(_) => assert!(expected <= 0),
                    }
                }
            }
        }
    }

    #[test]
    fn clamp_rejects_negative_offset() {
        assert!(matches!(
            TransferRange::clamp(512, -1, 10),
            Err(GatewayError::InvalidRange { offset: -1, .. })
        ));
    }

    #[test]
    fn clamp_rejects_offset_past_end() {
        assert!(TransferRange::clamp(16, 16, 4).is_err());
        assert!(TransferRange::clamp(16, 40, 4).is_err());
    }
}
