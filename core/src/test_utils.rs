/// Simulated OS layer for testing - NEVER touches real hardware
///
/// Devices live in memory, every primitive call is recorded, and any
/// primitive can be made to fail with a chosen error code.
use crate::backend::{AccessMode, DeviceBackend, OpenFlags, OsResult};
use crate::drives::{DRIVE_NO_ROOT_DIR, DRIVE_REMOTE};
use crate::error::{ERROR_INVALID_FUNCTION, ERROR_NOT_READY, ERROR_SECTOR_NOT_FOUND};
use crate::handle::DeviceHandle;
use crate::ioctl::*;
use crate::joystick::{JoystickBounds, JoystickPos};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

pub const ERROR_FILE_NOT_FOUND: u32 = 2;
pub const ERROR_PATH_NOT_FOUND: u32 = 3;
pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const ERROR_INVALID_HANDLE: u32 = 6;
pub const ERROR_SHARING_VIOLATION: u32 = 32;
pub const ERROR_NEGATIVE_SEEK: u32 = 131;
pub const ERROR_NOT_CONNECTED: u32 = 2250;
pub const JOYERR_PARMS: u32 = 165;
pub const JOYERR_UNPLUGGED: u32 = 167;

/// One OS primitive, as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    CreateFile,
    CloseHandle,
    FlushBuffers,
    SetFilePointer,
    ReadFile,
    WriteFile,
    DeviceIoControl(u32),
    DriveType,
    LogicalDrives,
    VolumeLabel,
    NetConnection,
    ShortPathName,
    JoystickCaps,
    JoystickPos,
    FormatMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Primitive,
    pub handle: Option<DeviceHandle>,
    /// Bytes handed to the primitive (transfer length, path, ...).
    pub bytes: usize,
    pub detail: String,
}

/// An in-memory block device or volume.
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    pub data: Vec<u8>,
    replies: HashMap<u32, Vec<u8>>,
    ioctl_errors: HashMap<u32, u32>,
    end_error: Option<u32>,
    max_transfer: Option<usize>,
}

impl SimDevice {
    pub fn new(size: usize) -> Self {
        Self { data: vec![0; size], ..Self::default() }
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data, ..Self::default() }
    }

    pub fn with_reply(mut self, code: u32, reply: Vec<u8>) -> Self {
        self.replies.insert(code, reply);
        self
    }

    pub fn with_ioctl_error(mut self, code: u32, error: u32) -> Self {
        self.ioctl_errors.insert(code, error);
        self
    }

    /// Error reported instead of a zero-length read at the end of the medium.
    pub fn with_end_error(mut self, error: u32) -> Self {
        self.end_error = Some(error);
        self
    }

    /// Caps every read and write, producing short transfers.
    pub fn with_max_transfer(mut self, max: usize) -> Self {
        self.max_transfer = Some(max);
        self
    }

    pub fn with_geometry(self, geometry: DiskGeometryEx) -> Self {
        self.with_reply(IOCTL_DISK_GET_DRIVE_GEOMETRY, geometry.geometry.encode())
            .with_reply(IOCTL_DISK_GET_DRIVE_GEOMETRY_EX, geometry.encode())
    }

    pub fn with_layout(self, style: PartitionStyle, mbr_types: &[u8]) -> Self {
        self.with_reply(IOCTL_DISK_GET_DRIVE_LAYOUT_EX, DriveLayout::encode(style, mbr_types))
    }

    pub fn with_partition(self, info: PartitionInfo) -> Self {
        self.with_reply(IOCTL_DISK_GET_PARTITION_INFO_EX, info.encode())
    }

    pub fn with_hotplug(self, info: HotplugInfo) -> Self {
        self.with_reply(IOCTL_STORAGE_GET_HOTPLUG_INFO, info.encode())
    }

    pub fn with_storage(self, info: &StorageDeviceInfo) -> Self {
        self.with_reply(IOCTL_STORAGE_QUERY_PROPERTY, info.encode(b"1.00", b"0001"))
    }

    pub fn with_disk_number(self, disk: u32) -> Self {
        self.with_reply(IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS, VolumeDiskExtents::encode(disk))
    }

    fn control(&mut self, code: u32, output: &mut [u8]) -> OsResult<usize> {
        if let Some(&error) = self.ioctl_errors.get(&code) {
            return Err(error);
        }
        match code {
            FSCTL_LOCK_VOLUME | FSCTL_UNLOCK_VOLUME | FSCTL_DISMOUNT_VOLUME => Ok(0),
            IOCTL_DISK_DELETE_DRIVE_LAYOUT => {
                self.replies.insert(
                    IOCTL_DISK_GET_DRIVE_LAYOUT_EX,
                    DriveLayout::encode(PartitionStyle::Raw, &[]),
                );
                Ok(0)
            }
            _ => {
                let reply = self.replies.get(&code).ok_or(ERROR_INVALID_FUNCTION)?;
                if reply.len() > output.len() {
                    return Err(crate::error::ERROR_INSUFFICIENT_BUFFER);
                }
                output[..reply.len()].copy_from_slice(reply);
                Ok(reply.len())
            }
        }
    }
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    access: AccessMode,
    flags: OpenFlags,
    position: u64,
}

#[derive(Debug, Default)]
struct SimState {
    devices: HashMap<String, SimDevice>,
    open: HashMap<isize, OpenFile>,
    next_handle: isize,
    calls: Vec<Call>,
    failures: HashMap<Primitive, u32>,
    unusable_handles: bool,
    drive_mask: u32,
    drive_types: HashMap<char, u32>,
    labels: HashMap<char, String>,
    net: HashMap<char, String>,
    short_paths: HashMap<Vec<u16>, Vec<u16>>,
    joystick_bounds: HashMap<u32, JoystickBounds>,
    joystick_pos: HashMap<u32, JoystickPos>,
    messages: HashMap<u32, String>,
}

impl SimState {
    fn record(&mut self, op: Primitive, handle: Option<DeviceHandle>, bytes: usize, detail: impl Into<String>) -> OsResult<()> {
        self.calls.push(Call { op, handle, bytes, detail: detail.into() });
        match self.failures.get(&op) {
            Some(&code) => Err(code),
            None => Ok(()),
        }
    }

    fn file(&mut self, handle: DeviceHandle) -> OsResult<(&mut OpenFile, &mut SimDevice)> {
        let file = self.open.get_mut(&handle.as_raw()).ok_or(ERROR_INVALID_HANDLE)?;
        let device = self.devices.get_mut(&file.path).ok_or(ERROR_INVALID_HANDLE)?;
        Ok((file, device))
    }
}

/// Letter of `X:`, `X:\` or `\\.\X:\`.
fn drive_letter(path: &str) -> Option<char> {
    let mut chars = path.strip_prefix("\\\\.\\").unwrap_or(path).chars();
    let letter = chars.next()?.to_ascii_uppercase();
    (letter.is_ascii_uppercase() && chars.next() == Some(':')).then_some(letter)
}

/// Simulated OS layer.
#[derive(Debug)]
pub struct SimulatedBackend {
    state: Mutex<SimState>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        let mut state = SimState { next_handle: 0x100, ..SimState::default() };
        state.messages.insert(ERROR_FILE_NOT_FOUND, "The system cannot find the file specified.\r\n".into());
        state.messages.insert(ERROR_ACCESS_DENIED, "Access is denied.\r\n".into());
        state.messages.insert(ERROR_NOT_READY, "The device is not ready.\r\n".into());
        state.messages.insert(
            ERROR_SHARING_VIOLATION,
            "The process cannot access the file because it is being used by another process.\r\n".into(),
        );
        state.messages.insert(ERROR_SECTOR_NOT_FOUND, "The drive cannot find the sector requested.\r\n".into());
        Self { state: Mutex::new(state) }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- setup ---

    pub fn with_device(self, path: &str, device: SimDevice) -> Self {
        self.state().devices.insert(path.to_string(), device);
        self
    }

    /// Registers drive `letter` with its `\\.\X:` device and root metadata.
    pub fn with_volume(self, letter: char, drive_type: u32, label: Option<&str>, device: Option<SimDevice>) -> Self {
        let letter = letter.to_ascii_uppercase();
        {
            let mut state = self.state();
            state.drive_mask |= 1 << (letter as u32 - 'A' as u32);
            state.drive_types.insert(letter, drive_type);
            if let Some(label) = label {
                state.labels.insert(letter, label.to_string());
            }
            if let Some(device) = device {
                state.devices.insert(format!("\\\\.\\{}:", letter), device);
            }
        }
        self
    }

    pub fn with_net_drive(self, letter: char, remote: &str) -> Self {
        let backend = self.with_volume(letter, DRIVE_REMOTE, None, None);
        backend.state().net.insert(letter.to_ascii_uppercase(), remote.to_string());
        backend
    }

    pub fn with_short_path(self, long: &str, short: &str) -> Self {
        self.state()
            .short_paths
            .insert(long.encode_utf16().collect(), short.encode_utf16().collect());
        self
    }

    pub fn with_joystick(self, index: u32, bounds: JoystickBounds, pos: JoystickPos) -> Self {
        {
            let mut state = self.state();
            state.joystick_bounds.insert(index, bounds);
            state.joystick_pos.insert(index, pos);
        }
        self
    }

    pub fn with_message(self, code: u32, text: &str) -> Self {
        self.state().messages.insert(code, text.to_string());
        self
    }

    /// `create_file` reports success but hands out `INVALID_HANDLE_VALUE`.
    pub fn with_unusable_handles(self) -> Self {
        self.state().unusable_handles = true;
        self
    }

    // --- runtime control ---

    pub fn fail(&self, op: Primitive, code: u32) {
        self.state().failures.insert(op, code);
    }

    pub fn clear_failure(&self, op: Primitive) {
        self.state().failures.remove(&op);
    }

    pub fn set_joystick_pos(&self, index: u32, pos: JoystickPos) {
        self.state().joystick_pos.insert(index, pos);
    }

    /// Position queries fail afterwards; bounds keep answering.
    pub fn unplug_joystick(&self, index: u32) {
        self.state().joystick_pos.remove(&index);
    }

    // --- inspection ---

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, op: Primitive) -> usize {
        self.state().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn device_data(&self, path: &str) -> Option<Vec<u8>> {
        self.state().devices.get(path).map(|d| d.data.clone())
    }

    pub fn open_handles(&self) -> usize {
        self.state().open.len()
    }

    pub fn position(&self, handle: DeviceHandle) -> Option<u64> {
        self.state().open.get(&handle.as_raw()).map(|f| f.position)
    }

    pub fn open_flags(&self, handle: DeviceHandle) -> Option<(AccessMode, OpenFlags)> {
        self.state().open.get(&handle.as_raw()).map(|f| (f.access, f.flags))
    }
}

impl DeviceBackend for SimulatedBackend {
    fn create_file(&self, path: &str, access: AccessMode, flags: OpenFlags) -> OsResult<DeviceHandle> {
        let mut state = self.state();
        state.record(Primitive::CreateFile, None, path.len(), path)?;
        if state.unusable_handles {
            return Ok(DeviceHandle::INVALID);
        }
        if !state.devices.contains_key(path) {
            return Err(ERROR_FILE_NOT_FOUND);
        }
        let raw = state.next_handle;
        state.next_handle += 4;
        state.open.insert(raw, OpenFile { path: path.to_string(), access, flags, position: 0 });
        Ok(DeviceHandle::from_raw(raw))
    }

    fn close_handle(&self, handle: DeviceHandle) -> OsResult<()> {
        let mut state = self.state();
        state.record(Primitive::CloseHandle, Some(handle), 0, "")?;
        state.open.remove(&handle.as_raw()).map(|_| ()).ok_or(ERROR_INVALID_HANDLE)
    }

    fn flush_buffers(&self, handle: DeviceHandle) -> OsResult<()> {
        let mut state = self.state();
        state.record(Primitive::FlushBuffers, Some(handle), 0, "")?;
        state.file(handle).map(|_| ())
    }

    fn set_file_pointer(&self, handle: DeviceHandle, offset: i64) -> OsResult<()> {
        let mut state = self.state();
        state.record(Primitive::SetFilePointer, Some(handle), 0, offset.to_string())?;
        let (file, _) = state.file(handle)?;
        file.position = u64::try_from(offset).map_err(|_| ERROR_NEGATIVE_SEEK)?;
        Ok(())
    }

    fn read_file(&self, handle: DeviceHandle, buf: &mut [u8]) -> OsResult<usize> {
        let mut state = self.state();
        state.record(Primitive::ReadFile, Some(handle), buf.len(), "")?;
        let (file, device) = state.file(handle)?;
        if !file.access.contains(AccessMode::READ) {
            return Err(ERROR_ACCESS_DENIED);
        }
        let start = file.position.min(device.data.len() as u64) as usize;
        let remaining = device.data.len() - start;
        if remaining == 0 && !buf.is_empty() {
            return match device.end_error {
                Some(code) => Err(code),
                None => Ok(0),
            };
        }
        let n = buf.len().min(remaining).min(device.max_transfer.unwrap_or(usize::MAX));
        buf[..n].copy_from_slice(&device.data[start..start + n]);
        file.position += n as u64;
        Ok(n)
    }

    fn write_file(&self, handle: DeviceHandle, buf: &[u8]) -> OsResult<usize> {
        let mut state = self.state();
        state.record(Primitive::WriteFile, Some(handle), buf.len(), "")?;
        let (file, device) = state.file(handle)?;
        if !file.access.contains(AccessMode::WRITE) {
            return Err(ERROR_ACCESS_DENIED);
        }
        let start = file.position.min(device.data.len() as u64) as usize;
        let remaining = device.data.len() - start;
        if remaining == 0 && !buf.is_empty() {
            return Err(device.end_error.unwrap_or(ERROR_SECTOR_NOT_FOUND));
        }
        let n = buf.len().min(remaining).min(device.max_transfer.unwrap_or(usize::MAX));
        device.data[start..start + n].copy_from_slice(&buf[..n]);
        file.position += n as u64;
        Ok(n)
    }

    fn device_io_control(&self, handle: DeviceHandle, code: u32, input: &[u8], output: &mut [u8]) -> OsResult<usize> {
        let mut state = self.state();
        state.record(Primitive::DeviceIoControl(code), Some(handle), input.len(), format!("{:#x}", code))?;
        let (_, device) = state.file(handle)?;
        device.control(code, output)
    }

    fn drive_type(&self, root: &str) -> u32 {
        let mut state = self.state();
        if let Err(code) = state.record(Primitive::DriveType, None, root.len(), root) {
            return code;
        }
        drive_letter(root)
            .and_then(|letter| state.drive_types.get(&letter).copied())
            .unwrap_or(DRIVE_NO_ROOT_DIR)
    }

    fn logical_drives(&self) -> u32 {
        let mut state = self.state();
        match state.record(Primitive::LogicalDrives, None, 0, "") {
            Ok(()) => state.drive_mask,
            Err(_) => 0,
        }
    }

    fn volume_label(&self, root: &str) -> OsResult<String> {
        let mut state = self.state();
        state.record(Primitive::VolumeLabel, None, root.len(), root)?;
        let letter = drive_letter(root).ok_or(ERROR_PATH_NOT_FOUND)?;
        if !state.drive_types.contains_key(&letter) {
            return Err(ERROR_PATH_NOT_FOUND);
        }
        Ok(state.labels.get(&letter).cloned().unwrap_or_default())
    }

    fn net_connection(&self, device: &str) -> OsResult<String> {
        let mut state = self.state();
        state.record(Primitive::NetConnection, None, device.len(), device)?;
        drive_letter(device)
            .and_then(|letter| state.net.get(&letter).cloned())
            .ok_or(ERROR_NOT_CONNECTED)
    }

    fn short_path_name(&self, path: &[u16]) -> OsResult<Vec<u16>> {
        let mut state = self.state();
        state.record(Primitive::ShortPathName, None, path.len(), String::from_utf16_lossy(path))?;
        state.short_paths.get(path).cloned().ok_or(ERROR_FILE_NOT_FOUND)
    }

    fn joystick_caps(&self, index: u32) -> OsResult<JoystickBounds> {
        let mut state = self.state();
        state.record(Primitive::JoystickCaps, None, 0, index.to_string())?;
        state.joystick_bounds.get(&index).copied().ok_or(JOYERR_PARMS)
    }

    fn joystick_pos(&self, index: u32) -> OsResult<JoystickPos> {
        let mut state = self.state();
        state.record(Primitive::JoystickPos, None, 0, index.to_string())?;
        state.joystick_pos.get(&index).copied().ok_or(JOYERR_UNPLUGGED)
    }

    fn format_message(&self, code: u32) -> Option<String> {
        let mut state = self.state();
        state.record(Primitive::FormatMessage, None, 0, code.to_string()).ok()?;
        state.messages.get(&code).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_path_is_not_found() {
        let backend = SimulatedBackend::new();
        assert_eq!(
            backend.create_file("\\\\.\\Q:", AccessMode::READ, OpenFlags::NONE),
            Err(ERROR_FILE_NOT_FOUND)
        );
        assert_eq!(backend.count(Primitive::CreateFile), 1);
    }

    #[test]
    fn transfers_move_the_cursor() {
        let backend = SimulatedBackend::new().with_device("disk", SimDevice::with_data((0..16).collect()));
        let handle = backend
            .create_file("disk", AccessMode::READ | AccessMode::WRITE, OpenFlags::NONE)
            .unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(backend.read_file(handle, &mut buf), Ok(4));
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(backend.write_file(handle, &[9, 9]), Ok(2));
        assert_eq!(backend.position(handle), Some(6));
        assert_eq!(&backend.device_data("disk").unwrap()[4..6], &[9, 9]);
    }

    #[test]
    fn injected_failure_is_recorded() {
        let backend = SimulatedBackend::new();
        backend.fail(Primitive::VolumeLabel, ERROR_NOT_READY);
        assert_eq!(backend.volume_label("A:\\"), Err(ERROR_NOT_READY));
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn drive_letters_parse() {
        assert_eq!(drive_letter("e:\\"), Some('E'));
        assert_eq!(drive_letter("C:"), Some('C'));
        assert_eq!(drive_letter("\\\\.\\C:\\"), Some('C'));
        assert_eq!(drive_letter("\\\\?\\C:"), None);
        assert_eq!(drive_letter(""), None);
    }
}
