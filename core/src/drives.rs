//! Drive discovery built from gateway primitives.
//!
//! Enumerates drive letters, classifies them and describes each usable
//! medium with geometry, vendor/product text and volume label. Partitioned
//! media also get a `\\.\PhysicalDriveN` entry, since reading or writing the
//! whole medium (boot sector included) needs the physical device.

use crate::backend::DeviceBackend;
use crate::gateway::{Gateway, OpenRequest};
use crate::handle::DeviceHandle;
use crate::ioctl::{DiskGeometry, PartitionStyle};
use crate::text::ascii_to_string;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

pub const DRIVE_UNKNOWN: u32 = 0;
pub const DRIVE_NO_ROOT_DIR: u32 = 1;
pub const DRIVE_REMOVABLE: u32 = 2;
pub const DRIVE_FIXED: u32 = 3;
pub const DRIVE_REMOTE: u32 = 4;
pub const DRIVE_CDROM: u32 = 5;
pub const DRIVE_RAMDISK: u32 = 6;

pub const PHYSICAL_DRIVE_PREFIX: &str = "\\\\.\\PhysicalDrive";

/// Geometry is only trusted for media up to the size of a 2.88 MB floppy.
const FLOPPY_SIZE_LIMIT: i64 = 2880 * 1024;

/// Vendor and product ids are shown with at most this many bytes each.
pub const ID_TEXT_LIMIT: usize = 31;

const SMB_PORT: u16 = 445;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Which media a caller is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaFilter {
    #[default]
    AnyDisk,
    AnyDiskReadOnly,
    AnyDiskWriteOnly,
    Floppy,
    FloppyReadOnly,
}

impl MediaFilter {
    /// Optical drives can only be read.
    pub fn includes_cdrom(self) -> bool {
        matches!(self, MediaFilter::AnyDisk | MediaFilter::AnyDiskReadOnly)
    }

    fn accepts(self, drive_type: u32) -> bool {
        match drive_type {
            DRIVE_REMOVABLE | DRIVE_FIXED => true,
            DRIVE_CDROM => self.includes_cdrom(),
            _ => false,
        }
    }
}

/// Iterates the letters set in a logical-drive bitmask, `A` first.
#[derive(Debug, Clone)]
pub struct DriveLetters {
    mask: u32,
    index: u8,
}

impl DriveLetters {
    pub fn new(mask: u32) -> Self {
        Self { mask, index: 0 }
    }
}

impl Iterator for DriveLetters {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        while self.index < 26 {
            let index = self.index;
            self.index += 1;
            if self.mask & (1 << index) != 0 {
                return Some(char::from(b'A' + index));
            }
        }
        None
    }
}

/// What could be learned about a medium from its geometry and descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskInfo {
    /// `"<vendor> <product>"`, possibly empty.
    pub text: String,
    /// Present only while the geometry describes the whole medium.
    pub geometry: Option<DiskGeometry>,
    pub disk_size: i64,
    pub is_usb: bool,
}

impl DiskInfo {
    pub fn size_text(&self) -> Option<String> {
        (self.disk_size > 0).then(|| format_size(self.disk_size))
    }
}

impl fmt::Display for DiskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size_text() {
            Some(size) if self.text.is_empty() => f.write_str(&size),
            Some(size) => write!(f, "{} {}", self.text, size),
            None => f.write_str(&self.text),
        }
    }
}

/// A medium a caller may open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drive {
    pub path: String,
    pub description: String,
    pub cdrom: bool,
    pub disk_size: i64,
    /// Physical drives need administrator rights.
    pub needs_special_privileges: bool,
}

impl fmt::Display for Drive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// A redirected network drive and where it points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetDrive {
    pub root: String,
    pub remote: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("volume {volume} on the target disk could not be dismounted: {reason}")]
pub struct DismountError {
    pub volume: String,
    pub code: u32,
    pub reason: String,
}

/// Human readable size: KByte below 10000 KiB, MByte below 1000 MiB, GByte above.
pub fn format_size(size: i64) -> String {
    let kib = size / 1024;
    if kib < 10_000 {
        return format!("{} KByte", kib);
    }
    let mib = kib / 1024;
    if mib < 1000 {
        return format!("{} MByte", mib);
    }
    let gib = size as f64 / 1_073_741_824.0;
    let text = format!("{:.1}", gib);
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{} GByte", text)
}

pub fn vendor_product_text(vendor: &str, product: &str) -> String {
    format!("{} {}", vendor, product).trim().to_string()
}

/// Disk number encoded in a `\\.\PhysicalDriveN` path.
pub fn physical_drive_number(path: &str) -> Option<u32> {
    let suffix = path.get(..PHYSICAL_DRIVE_PREFIX.len()).and_then(|prefix| {
        prefix
            .eq_ignore_ascii_case(PHYSICAL_DRIVE_PREFIX)
            .then(|| &path[PHYSICAL_DRIVE_PREFIX.len()..])
    })?;
    suffix.parse().ok()
}

pub fn is_physical_drive(path: &str) -> bool {
    path.len() > PHYSICAL_DRIVE_PREFIX.len()
        && path
            .get(..PHYSICAL_DRIVE_PREFIX.len())
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case(PHYSICAL_DRIVE_PREFIX))
}

/// Host part of a `\\host\share` path.
pub fn remote_host(share: &str) -> Option<&str> {
    let rest = share.strip_prefix("\\\\")?;
    let host = rest.split('\\').next().unwrap_or(rest);
    (!host.is_empty()).then_some(host)
}

/// `A:\`, `C:\`, ... for every mounted drive letter.
pub fn list_roots<B: DeviceBackend>(gateway: &Gateway<B>) -> Vec<String> {
    DriveLetters::new(gateway.logical_drives())
        .map(|letter| format!("{}:\\", letter))
        .collect()
}

/// Roots of the drives redirected to a network share.
pub fn net_drives<B: DeviceBackend>(gateway: &Gateway<B>) -> Vec<String> {
    DriveLetters::new(gateway.logical_drives())
        .filter(|letter| gateway.drive_type(&format!("{}:", letter)) == DRIVE_REMOTE)
        .map(|letter| format!("{}:\\", letter))
        .collect()
}

/// Network drives together with the share each one is connected to.
pub fn net_connections<B: DeviceBackend>(gateway: &Gateway<B>) -> Vec<NetDrive> {
    net_drives(gateway)
        .into_iter()
        .map(|root| {
            let remote = gateway.net_connection(&root[..2]).ok();
            let host = remote.as_deref().and_then(remote_host).map(str::to_string);
            NetDrive { root, remote, host }
        })
        .collect()
}

/// Tells whether a host answers on the network.
pub trait Reachability {
    fn is_reachable(&self, host: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Reachability for F {
    fn is_reachable(&self, host: &str) -> bool {
        self(host)
    }
}

/// Connects to the file sharing port of a host.
#[derive(Debug, Clone, Copy)]
pub struct TcpReachability {
    pub port: u16,
    pub timeout: Duration,
}

impl Default for TcpReachability {
    fn default() -> Self {
        Self { port: SMB_PORT, timeout: CONNECT_TIMEOUT }
    }
}

impl Reachability for TcpReachability {
    fn is_reachable(&self, host: &str) -> bool {
        let addrs = match (host, self.port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!("cannot resolve {}: {}", host, e);
                return false;
            }
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

/// Roots of the network drives whose server does not answer.
///
/// A drive without a readable `\\host\share` connection counts as
/// unreachable. Each host is asked at most once per call.
pub fn find_unreachable_net_paths<B: DeviceBackend>(
    gateway: &Gateway<B>,
    reachability: &impl Reachability,
) -> BTreeSet<String> {
    let mut reachable: HashMap<String, bool> = HashMap::new();
    net_connections(gateway)
        .into_iter()
        .filter(|drive| {
            let Some(host) = drive.host.as_deref() else {
                return true;
            };
            let up = *reachable.entry(host.to_string()).or_insert_with(|| {
                let up = reachability.is_reachable(host);
                debug!("host {} {}", host, if up { "answers" } else { "does not answer" });
                up
            });
            !up
        })
        .map(|drive| drive.root)
        .collect()
}

fn id_text(id: &[u8]) -> String {
    ascii_to_string(&id[..id.len().min(ID_TEXT_LIMIT)])
}

/// Describes the medium behind `handle`.
///
/// `None` when neither geometry query succeeds or the geometry is
/// implausible (no medium inserted, virtual devices).
pub fn disk_info<B: DeviceBackend>(gateway: &Gateway<B>, handle: DeviceHandle) -> Option<DiskInfo> {
    // Floppy drives may reject the extended query but answer the plain one.
    let (geometry, reported_size) = match gateway.disk_geometry_ex(handle) {
        Ok(ex) => (ex.geometry, ex.disk_size),
        Err(_) => (gateway.disk_geometry(handle).ok()?, 0),
    };
    if !geometry
        .to_slots()
        .iter()
        .all(|&value| (1..=i32::MAX as i64).contains(&value))
    {
        trace!("implausible geometry {:?} on {:?}", geometry, handle);
        return None;
    }

    let (text, is_usb) = match gateway.storage_device_info(handle) {
        Ok(info) => (
            vendor_product_text(&id_text(&info.vendor_id), &id_text(&info.product_id)),
            info.is_usb,
        ),
        Err(e) => {
            debug!("no storage descriptor for {:?}: {}", handle, e);
            (String::new(), false)
        }
    };

    let chs_size = geometry.chs_size();
    if chs_size > FLOPPY_SIZE_LIMIT && reported_size > 0 {
        return Some(DiskInfo { text, geometry: None, disk_size: reported_size, is_usb });
    }
    Some(DiskInfo { text, geometry: Some(geometry), disk_size: chs_size, is_usb })
}

/// Media matching `filter`, each volume followed by its physical drive
/// where the medium is partitioned.
pub fn list_drives<B: DeviceBackend>(gateway: &Gateway<B>, filter: MediaFilter) -> Vec<Drive> {
    let mut drives = Vec::new();
    let mut seen_disks = BTreeSet::new();

    for letter in DriveLetters::new(gateway.logical_drives()) {
        let name = format!("{}:", letter);
        let drive_type = gateway.drive_type(&format!("{}\\", name));
        if !filter.accepts(drive_type) {
            continue;
        }
        let path = format!("\\\\.\\{}", name);
        let handle = match gateway.open(&path, OpenRequest::query()) {
            Ok(handle) => handle,
            Err(e) => {
                debug!("skipping {}: {}", path, e);
                continue;
            }
        };
        describe_volume(gateway, handle, &name, &path, drive_type, &mut seen_disks, &mut drives);
        if let Err(e) = gateway.close(handle) {
            debug!("close of {} failed: {}", path, e);
        }
    }
    drives
}

fn describe_volume<B: DeviceBackend>(
    gateway: &Gateway<B>,
    handle: DeviceHandle,
    name: &str,
    path: &str,
    drive_type: u32,
    seen_disks: &mut BTreeSet<u32>,
    drives: &mut Vec<Drive>,
) {
    // Only fixed drives that can actually be detached are of interest.
    if drive_type == DRIVE_FIXED {
        match gateway.hotplug_info(handle) {
            Ok(info) if info.is_hotpluggable() => {}
            _ => {
                trace!("{} is a built-in disk", name);
                return;
            }
        }
    }
    let cdrom = drive_type == DRIVE_CDROM;

    let info = disk_info(gateway, handle);
    let mut text = info.as_ref().map(|i| i.to_string()).unwrap_or_default();
    let disk_size = info.as_ref().map_or(-1, |i| i.disk_size);

    let label = gateway
        .volume_label(&format!("{}\\", path))
        .ok()
        .map(|label| ascii_to_string(label.as_bytes()));

    // Floppy drives fail the layout query and stay listed as plain volumes.
    if !cdrom {
        if let Ok(layout) = gateway.partition_style(handle) {
            if layout.style != PartitionStyle::Raw {
                if let Ok(disk) = gateway.physical_drive_num(handle) {
                    if seen_disks.insert(disk) {
                        let base = if text.is_empty() { name } else { text.as_str() };
                        drives.push(Drive {
                            path: format!("{}{}", PHYSICAL_DRIVE_PREFIX, disk),
                            description: format!("{} incl. boot sector", base),
                            cdrom,
                            disk_size,
                            needs_special_privileges: true,
                        });
                    }
                }
                if !text.is_empty() {
                    match gateway.partition_info(handle) {
                        Ok(part) => text.push_str(&format!(", Partition {}", part.number)),
                        Err(_) => text.push_str(", Partition"),
                    }
                }
            }
        }
    }

    let mut volume = name.to_string();
    if let Some(label) = label.filter(|l| !l.is_empty()) {
        volume.push(' ');
        volume.push_str(&label);
    }
    let description = if text.is_empty() { volume } else { format!("{} ({})", text, volume) };

    drives.push(Drive {
        path: path.to_string(),
        description,
        cdrom,
        disk_size,
        needs_special_privileges: false,
    });
}

/// Takes every mounted volume on physical drive `disk` out of the
/// filesystem, so the raw device can be written without the filesystem
/// caching stale data.
pub fn dismount_volumes_on<B: DeviceBackend>(gateway: &Gateway<B>, disk: u32) -> Result<(), DismountError> {
    for letter in DriveLetters::new(gateway.logical_drives()) {
        let name = format!("{}:", letter);
        let drive_type = gateway.drive_type(&format!("{}\\", name));
        if drive_type != DRIVE_REMOVABLE && drive_type != DRIVE_FIXED {
            continue;
        }
        let path = format!("\\\\.\\{}", name);
        let Ok(handle) = gateway.open(&path, OpenRequest::read_only()) else {
            continue;
        };
        let outcome = match gateway.physical_drive_num(handle) {
            Ok(num) if num == disk => {
                debug!("dismounting {} from physical drive {}", name, disk);
                gateway.lock(handle).and_then(|_| gateway.dismount(handle))
            }
            _ => Ok(()),
        };
        if let Err(e) = gateway.close(handle) {
            debug!("close of {} failed: {}", path, e);
        }
        if let Err(e) = outcome {
            let code = e.os_code().unwrap_or(0);
            let reason = e
                .os_code()
                .and_then(|code| gateway.error_message(code))
                .unwrap_or_else(|| e.to_string());
            return Err(DismountError { volume: name, code, reason });
        }
    }
    Ok(())
}
