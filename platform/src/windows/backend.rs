use devgate_core::backend::{AccessMode, DeviceBackend, OpenFlags, OsResult};
use devgate_core::handle::DeviceHandle;
use devgate_core::joystick::{JoystickBounds, JoystickPos};
use std::ffi::c_void;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Media::Multimedia::{joyGetDevCapsW, joyGetPos, JOYCAPSW, JOYINFO};
use windows::Win32::NetworkManagement::WNet::WNetGetConnectionW;
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FlushFileBuffers, GetDriveTypeW, GetLogicalDrives, GetShortPathNameW,
    GetVolumeInformationW, ReadFile, SetFilePointerEx, WriteFile, FILE_BEGIN,
    FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::Diagnostics::Debug::{
    FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
};
use windows::Win32::System::IO::DeviceIoControl;
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

const MAX_PATH: usize = 260;
const REMOTE_NAME_CAPACITY: usize = 1024;
const MESSAGE_CAPACITY: usize = 1024;

/// Win32 implementation of the gateway primitives.
///
/// Devices are always opened with read+write sharing and `OPEN_EXISTING`,
/// so other processes can keep using a volume the gateway has open.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        WindowsBackend
    }

    /// Whether the process runs with an elevated token. Locking volumes and
    /// opening `\\.\PhysicalDriveN` for writing need one.
    pub fn is_elevated(&self) -> bool {
        match ProcessToken::open().and_then(|token| token.elevation()) {
            Ok(elevation) => elevation.TokenIsElevated != 0,
            Err(code) => {
                log::debug!("token query failed with {}", code);
                false
            }
        }
    }
}

/// Query access to the current process token, closed on drop.
struct ProcessToken(HANDLE);

impl ProcessToken {
    fn open() -> OsResult<Self> {
        let mut token = HANDLE::default();
        check(unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) })?;
        Ok(ProcessToken(token))
    }

    fn elevation(&self) -> OsResult<TOKEN_ELEVATION> {
        let mut elevation = TOKEN_ELEVATION::default();
        let mut returned = 0u32;
        check(unsafe {
            GetTokenInformation(
                self.0,
                TokenElevation,
                Some(&mut elevation as *mut TOKEN_ELEVATION as *mut c_void),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut returned,
            )
        })?;
        Ok(elevation)
    }
}

impl Drop for ProcessToken {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.0) };
    }
}

/// NUL-terminated UTF-16 copy of `s`.
fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn until_nul(buf: &[u16]) -> &[u16] {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    &buf[..len]
}

/// Recovers the Win32 error code wrapped in an `HRESULT_FROM_WIN32` value.
fn win32_code(err: &windows::core::Error) -> u32 {
    let hr = err.code().0 as u32;
    if hr & 0xFFFF_0000 == 0x8007_0000 {
        hr & 0xFFFF
    } else {
        hr
    }
}

fn check(result: windows::core::Result<()>) -> OsResult<()> {
    result.map_err(|e| win32_code(&e))
}

fn raw(handle: DeviceHandle) -> HANDLE {
    HANDLE(handle.as_raw())
}

impl DeviceBackend for WindowsBackend {
    fn create_file(&self, path: &str, access: AccessMode, flags: OpenFlags) -> OsResult<DeviceHandle> {
        let path = wide(path);
        let handle = unsafe {
            CreateFileW(
                PCWSTR(path.as_ptr()),
                access.0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_FLAGS_AND_ATTRIBUTES(flags.0),
                HANDLE::default(),
            )
        }
        .map_err(|e| win32_code(&e))?;
        Ok(DeviceHandle::from_raw(handle.0))
    }

    fn close_handle(&self, handle: DeviceHandle) -> OsResult<()> {
        check(unsafe { CloseHandle(raw(handle)) })
    }

    fn flush_buffers(&self, handle: DeviceHandle) -> OsResult<()> {
        check(unsafe { FlushFileBuffers(raw(handle)) })
    }

    fn set_file_pointer(&self, handle: DeviceHandle, offset: i64) -> OsResult<()> {
        check(unsafe { SetFilePointerEx(raw(handle), offset, None, FILE_BEGIN) })
    }

    fn read_file(&self, handle: DeviceHandle, buf: &mut [u8]) -> OsResult<usize> {
        let mut read = 0u32;
        check(unsafe { ReadFile(raw(handle), Some(buf), Some(&mut read), None) })?;
        Ok(read as usize)
    }

    fn write_file(&self, handle: DeviceHandle, buf: &[u8]) -> OsResult<usize> {
        let mut written = 0u32;
        check(unsafe { WriteFile(raw(handle), Some(buf), Some(&mut written), None) })?;
        Ok(written as usize)
    }

    fn device_io_control(
        &self,
        handle: DeviceHandle,
        code: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> OsResult<usize> {
        let input_ptr = (!input.is_empty()).then(|| input.as_ptr() as *const c_void);
        let output_ptr = (!output.is_empty()).then(|| output.as_mut_ptr() as *mut c_void);
        let mut returned = 0u32;
        check(unsafe {
            DeviceIoControl(
                raw(handle),
                code,
                input_ptr,
                input.len() as u32,
                output_ptr,
                output.len() as u32,
                Some(&mut returned),
                None,
            )
        })?;
        Ok(returned as usize)
    }

    fn drive_type(&self, root: &str) -> u32 {
        let root = wide(root);
        unsafe { GetDriveTypeW(PCWSTR(root.as_ptr())) }
    }

    fn logical_drives(&self) -> u32 {
        unsafe { GetLogicalDrives() }
    }

    fn volume_label(&self, root: &str) -> OsResult<String> {
        let root = wide(root);
        let mut label = [0u16; MAX_PATH + 1];
        check(unsafe {
            GetVolumeInformationW(PCWSTR(root.as_ptr()), Some(&mut label), None, None, None, None)
        })?;
        Ok(String::from_utf16_lossy(until_nul(&label)))
    }

    fn net_connection(&self, device: &str) -> OsResult<String> {
        let device = wide(device);
        let mut remote = vec![0u16; REMOTE_NAME_CAPACITY];
        let mut len = remote.len() as u32;
        let status = unsafe {
            WNetGetConnectionW(PCWSTR(device.as_ptr()), PWSTR(remote.as_mut_ptr()), &mut len)
        };
        if status.0 != 0 {
            return Err(status.0);
        }
        Ok(String::from_utf16_lossy(until_nul(&remote)))
    }

    fn short_path_name(&self, path: &[u16]) -> OsResult<Vec<u16>> {
        let mut long = path.to_vec();
        long.push(0);
        let long = PCWSTR(long.as_ptr());
        let needed = unsafe { GetShortPathNameW(long, None) };
        if needed == 0 {
            return Err(win32_code(&windows::core::Error::from_win32()));
        }
        let mut short = vec![0u16; needed as usize];
        let written = unsafe { GetShortPathNameW(long, Some(&mut short)) };
        if written == 0 || written as usize >= short.len() {
            return Err(win32_code(&windows::core::Error::from_win32()));
        }
        short.truncate(written as usize);
        Ok(short)
    }

    fn joystick_caps(&self, index: u32) -> OsResult<JoystickBounds> {
        let mut caps = JOYCAPSW::default();
        let status =
            unsafe { joyGetDevCapsW(index as usize, &mut caps, std::mem::size_of::<JOYCAPSW>() as u32) };
        if status != 0 {
            return Err(status);
        }
        Ok(JoystickBounds {
            x_min: caps.wXmin,
            x_max: caps.wXmax,
            y_min: caps.wYmin,
            y_max: caps.wYmax,
        })
    }

    fn joystick_pos(&self, index: u32) -> OsResult<JoystickPos> {
        let mut info = JOYINFO::default();
        let status = unsafe { joyGetPos(index, &mut info) };
        if status != 0 {
            return Err(status);
        }
        Ok(JoystickPos { buttons: info.wButtons, x: info.wXpos, y: info.wYpos })
    }

    fn format_message(&self, code: u32) -> Option<String> {
        let mut buf = vec![0u16; MESSAGE_CAPACITY];
        let len = unsafe {
            FormatMessageW(
                FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
                None,
                code,
                0,
                PWSTR(buf.as_mut_ptr()),
                buf.len() as u32,
                None,
            )
        };
        if len == 0 {
            log::trace!("no system message for {}", code);
            return None;
        }
        Some(String::from_utf16_lossy(&buf[..len as usize]))
    }
}
