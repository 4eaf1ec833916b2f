//! `std::io` adapters over device handles.
//!
//! These wrap the gateway the way a disk imaging tool uses it: open, take
//! the volume away from the filesystem, then stream bytes. Handles are
//! released when the adapter is dropped.

use crate::backend::DeviceBackend;
use crate::drives::{self, DiskInfo};
use crate::error::GatewayError;
use crate::gateway::{Gateway, OpenRequest};
use crate::handle::DeviceHandle;
use log::{debug, warn};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Bytes held back at the start of a physical drive until the image is
/// otherwise complete.
pub const BOOT_AREA_SIZE: usize = 0x2000;

/// Largest single transfer handed to the gateway.
const MAX_CHUNK: usize = i32::MAX as usize;

pub(crate) fn to_io_error<B: DeviceBackend>(gateway: &Gateway<B>, err: GatewayError) -> io::Error {
    let kind = match &err {
        GatewayError::Os(2) | GatewayError::Os(3) => io::ErrorKind::NotFound,
        GatewayError::Os(5) => io::ErrorKind::PermissionDenied,
        GatewayError::InvalidRange { .. } | GatewayError::InvalidInput(_) => io::ErrorKind::InvalidInput,
        _ => io::ErrorKind::Other,
    };
    let message = err
        .os_code()
        .and_then(|code| gateway.error_message(code))
        .unwrap_or_else(|| err.to_string());
    io::Error::new(kind, message)
}

/// An open handle that is closed when dropped.
pub struct DeviceFile<'g, B: DeviceBackend> {
    gateway: &'g Gateway<B>,
    handle: Option<DeviceHandle>,
}

impl<'g, B: DeviceBackend> DeviceFile<'g, B> {
    pub fn open(gateway: &'g Gateway<B>, path: &str, request: OpenRequest) -> io::Result<Self> {
        let handle = gateway.open(path, request).map_err(|e| to_io_error(gateway, e))?;
        Ok(Self { gateway, handle: Some(handle) })
    }

    pub fn gateway(&self) -> &'g Gateway<B> {
        self.gateway
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle.unwrap_or(DeviceHandle::INVALID)
    }

    /// Lock, then dismount; the handle stays open either way.
    pub fn lock_and_dismount(&self) -> io::Result<()> {
        let handle = self.handle();
        self.gateway
            .lock(handle)
            .and_then(|_| self.gateway.dismount(handle))
            .map_err(|e| self.io_error(e))
    }

    pub fn disk_info(&self) -> Option<DiskInfo> {
        drives::disk_info(self.gateway, self.handle())
    }

    /// Closes the handle, reporting a failing close.
    pub fn close(mut self) -> io::Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> io::Result<()> {
        match self.handle.take() {
            Some(handle) => self.gateway.close(handle).map_err(|e| self.io_error(e)),
            None => Ok(()),
        }
    }

    fn io_error(&self, err: GatewayError) -> io::Error {
        to_io_error(self.gateway, err)
    }

    /// One read; end of media and zero-length transfers yield `Ok(0)`.
    fn read_once(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(MAX_CHUNK) as i32;
        match self.gateway.read(self.handle(), buf, 0, len) {
            Ok(n) => Ok(n),
            // Raw devices fail instead of returning 0 when read past their end.
            Err(e) if e.is_end_of_media() => Ok(0),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Writes all of `buf`, one gateway call per short write.
    fn write_fully(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let len = buf.len().min(MAX_CHUNK) as i32;
            let written = self
                .gateway
                .write(self.handle(), buf, 0, len)
                .map_err(|e| self.io_error(e))?;
            if written == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "device accepted no data"));
            }
            buf = &buf[written..];
        }
        Ok(())
    }

    fn seek_to(&self, position: u64) -> io::Result<()> {
        let position = i64::try_from(position)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek position out of range"))?;
        self.gateway.seek(self.handle(), position).map_err(|e| self.io_error(e))
    }
}

impl<'g, B: DeviceBackend> Drop for DeviceFile<'g, B> {
    fn drop(&mut self) {
        if let Err(e) = self.close_inner() {
            debug!("close on drop failed: {}", e);
        }
    }
}

/// Dismounts the volumes of a physical-drive target first; reports whether
/// `path` names a physical drive.
fn prepare_target<B: DeviceBackend>(gateway: &Gateway<B>, path: &str) -> io::Result<bool> {
    if !drives::is_physical_drive(path) {
        return Ok(false);
    }
    if let Some(disk) = drives::physical_drive_number(path) {
        drives::dismount_volumes_on(gateway, disk).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    }
    Ok(true)
}

/// Sequential reader over a whole device or volume.
pub struct DeviceReader<'g, B: DeviceBackend> {
    file: DeviceFile<'g, B>,
}

impl<'g, B: DeviceBackend> DeviceReader<'g, B> {
    pub fn handle(&self) -> DeviceHandle {
        self.file.handle()
    }

    pub fn close(self) -> io::Result<()> {
        self.file.close()
    }
}

impl<'g, B: DeviceBackend> Read for DeviceReader<'g, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read_once(buf)
    }
}

pub fn open_for_sequential_read<'g, B: DeviceBackend>(
    gateway: &'g Gateway<B>,
    path: &str,
) -> io::Result<DeviceReader<'g, B>> {
    prepare_target(gateway, path)?;
    let file = DeviceFile::open(gateway, path, OpenRequest::read_only())?;
    file.lock_and_dismount()?;
    debug!("reading {} sequentially", path);
    Ok(DeviceReader { file })
}

/// Boot area collected from the first bytes of a physical-drive image.
struct BootArea {
    data: Box<[u8; BOOT_AREA_SIZE]>,
    filled: usize,
}

/// Sequential writer over a whole device or volume.
///
/// On a physical drive the partition table is wiped before writing and the
/// boot area is written last, so a partially written image is never
/// mistaken for a valid one.
pub struct DeviceWriter<'g, B: DeviceBackend> {
    file: DeviceFile<'g, B>,
    boot: Option<BootArea>,
    finished: bool,
}

impl<'g, B: DeviceBackend> DeviceWriter<'g, B> {
    pub fn handle(&self) -> DeviceHandle {
        self.file.handle()
    }

    /// Bytes of the boot area collected so far, if one is being held back.
    pub fn held_back(&self) -> Option<usize> {
        self.boot.as_ref().map(|boot| boot.filled)
    }

    /// Writes the held-back boot area, then closes the handle.
    ///
    /// The first error wins; the handle is closed regardless.
    pub fn finish(mut self) -> io::Result<()> {
        self.finish_inner()
    }

    fn finish_inner(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let boot_result = match self.boot.take() {
            Some(boot) => {
                debug!("writing boot area ({} bytes collected)", boot.filled);
                self.file
                    .seek_to(0)
                    .and_then(|_| self.file.write_fully(&boot.data[..]))
            }
            None => Ok(()),
        };
        let close_result = self.file.close_inner();
        boot_result.and(close_result)
    }
}

impl<'g, B: DeviceBackend> Write for DeviceWriter<'g, B> {
    fn write(&mut self, mut buf: &[u8]) -> io::Result<usize> {
        let total = buf.len();
        if let Some(boot) = self.boot.as_mut() {
            if boot.filled < BOOT_AREA_SIZE {
                let take = (BOOT_AREA_SIZE - boot.filled).min(buf.len());
                boot.data[boot.filled..boot.filled + take].copy_from_slice(&buf[..take]);
                boot.filled += take;
                buf = &buf[take..];
                if boot.filled == BOOT_AREA_SIZE {
                    self.file.seek_to(BOOT_AREA_SIZE as u64)?;
                }
            }
        }
        self.file.write_fully(buf)?;
        Ok(total)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .gateway
            .flush(self.file.handle())
            .map_err(|e| self.file.io_error(e))
    }
}

impl<'g, B: DeviceBackend> Drop for DeviceWriter<'g, B> {
    fn drop(&mut self) {
        if let Err(e) = self.finish_inner() {
            warn!("finishing device image on drop failed: {}", e);
        }
    }
}

pub fn open_for_sequential_write<'g, B: DeviceBackend>(
    gateway: &'g Gateway<B>,
    path: &str,
) -> io::Result<DeviceWriter<'g, B>> {
    let physical = prepare_target(gateway, path)?;
    let request = OpenRequest { read: physical, write: true, random_access: physical };
    let file = DeviceFile::open(gateway, path, request)?;
    file.lock_and_dismount()?;
    let boot = if physical {
        if let Err(e) = gateway.delete_drive_layout(file.handle()) {
            warn!("could not delete drive layout of {}: {}", path, e);
        }
        Some(BootArea { data: Box::new([0u8; BOOT_AREA_SIZE]), filled: 0 })
    } else {
        None
    };
    debug!("writing {} sequentially (physical drive: {})", path, physical);
    Ok(DeviceWriter { file, boot, finished: false })
}

/// Random access to a device, positioned with absolute seeks only.
pub struct RandomAccessDevice<'g, B: DeviceBackend> {
    file: DeviceFile<'g, B>,
    disk_info: Option<DiskInfo>,
    read_only: bool,
}

impl<'g, B: DeviceBackend> RandomAccessDevice<'g, B> {
    pub fn handle(&self) -> DeviceHandle {
        self.file.handle()
    }

    /// Medium description, captured when the device was opened.
    pub fn disk_info(&self) -> Option<&DiskInfo> {
        self.disk_info.as_ref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn close(self) -> io::Result<()> {
        self.file.close()
    }
}

impl<'g, B: DeviceBackend> Read for RandomAccessDevice<'g, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read_once(buf)
    }
}

impl<'g, B: DeviceBackend> Write for RandomAccessDevice<'g, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_fully(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .gateway
            .flush(self.file.handle())
            .map_err(|e| self.file.io_error(e))
    }
}

impl<'g, B: DeviceBackend> Seek for RandomAccessDevice<'g, B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(position) => {
                self.file.seek_to(position)?;
                Ok(position)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "only absolute positioning is supported",
            )),
        }
    }
}

pub fn open_for_random_access<'g, B: DeviceBackend>(
    gateway: &'g Gateway<B>,
    path: &str,
    read_only: bool,
) -> io::Result<RandomAccessDevice<'g, B>> {
    prepare_target(gateway, path)?;
    let request = OpenRequest { read: true, write: !read_only, random_access: true };
    let file = DeviceFile::open(gateway, path, request)?;
    file.lock_and_dismount()?;
    let disk_info = file.disk_info();
    debug!("opened {} for random access: {:?}", path, disk_info);
    Ok(RandomAccessDevice { file, disk_info, read_only })
}
