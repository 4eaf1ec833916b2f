//! Control codes and the reply layouts the gateway decodes.
//!
//! Replies land in plain byte buffers and are read back through [`ReplyView`],
//! which bounds-checks every field access against the number of bytes the OS
//! actually returned. Each decoded type also knows how to encode itself in
//! the native layout so simulated backends can produce realistic replies.

use crate::error::{GatewayError, Result};
use serde::Serialize;

const METHOD_BUFFERED: u32 = 0;
const FILE_ANY_ACCESS: u32 = 0;
const FILE_READ_ACCESS: u32 = 1;
const FILE_WRITE_ACCESS: u32 = 2;

const FILE_DEVICE_DISK: u32 = 0x07;
const FILE_DEVICE_FILE_SYSTEM: u32 = 0x09;
const FILE_DEVICE_MASS_STORAGE: u32 = 0x2D;
const IOCTL_VOLUME_BASE: u32 = 0x56;

pub const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

pub const FSCTL_LOCK_VOLUME: u32 = ctl_code(FILE_DEVICE_FILE_SYSTEM, 6, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const FSCTL_UNLOCK_VOLUME: u32 = ctl_code(FILE_DEVICE_FILE_SYSTEM, 7, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const FSCTL_DISMOUNT_VOLUME: u32 = ctl_code(FILE_DEVICE_FILE_SYSTEM, 8, METHOD_BUFFERED, FILE_ANY_ACCESS);

pub const IOCTL_DISK_GET_DRIVE_GEOMETRY: u32 = ctl_code(FILE_DEVICE_DISK, 0x00, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_DISK_GET_PARTITION_INFO_EX: u32 = ctl_code(FILE_DEVICE_DISK, 0x12, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_DISK_GET_DRIVE_LAYOUT_EX: u32 = ctl_code(FILE_DEVICE_DISK, 0x14, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_DISK_GET_DRIVE_GEOMETRY_EX: u32 = ctl_code(FILE_DEVICE_DISK, 0x28, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_DISK_DELETE_DRIVE_LAYOUT: u32 =
    ctl_code(FILE_DEVICE_DISK, 0x40, METHOD_BUFFERED, FILE_READ_ACCESS | FILE_WRITE_ACCESS);

pub const IOCTL_STORAGE_GET_HOTPLUG_INFO: u32 =
    ctl_code(FILE_DEVICE_MASS_STORAGE, 0x305, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_STORAGE_QUERY_PROPERTY: u32 =
    ctl_code(FILE_DEVICE_MASS_STORAGE, 0x500, METHOD_BUFFERED, FILE_ANY_ACCESS);

pub const IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS: u32 =
    ctl_code(IOCTL_VOLUME_BASE, 0, METHOD_BUFFERED, FILE_ANY_ACCESS);

/// Slack appended to variable-length replies (layout, descriptor).
pub const REPLY_SLACK: usize = 4096;

pub const DISK_GEOMETRY_SIZE: usize = 24;
pub const DISK_GEOMETRY_EX_SIZE: usize = 40;
pub const DRIVE_LAYOUT_HEADER_SIZE: usize = 48;
pub const PARTITION_ENTRY_SIZE: usize = 144;
pub const HOTPLUG_INFO_SIZE: usize = 8;
pub const STORAGE_QUERY_SIZE: usize = 12;
pub const STORAGE_DESCRIPTOR_HEADER_SIZE: usize = 40;
pub const VOLUME_DISK_EXTENTS_SIZE: usize = 32;

/// `PARTITION_ENTRY_UNUSED`
pub const PARTITION_ENTRY_UNUSED: u8 = 0;
/// `BusTypeUsb`
pub const BUS_TYPE_USB: u32 = 7;

/// Bounds-checked little-endian view over a control-code reply.
#[derive(Debug, Clone, Copy)]
pub struct ReplyView<'a> {
    bytes: &'a [u8],
}

impl<'a> ReplyView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn require(&self, field: &'static str, needed: usize) -> Result<()> {
        if self.bytes.len() < needed {
            return Err(GatewayError::TruncatedReply { field, needed, len: self.bytes.len() });
        }
        Ok(())
    }

    fn field<const N: usize>(&self, field: &'static str, offset: usize) -> Result<[u8; N]> {
        let end = offset.checked_add(N).ok_or(GatewayError::TruncatedReply {
            field,
            needed: usize::MAX,
            len: self.bytes.len(),
        })?;
        self.require(field, end)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[offset..end]);
        Ok(out)
    }

    pub fn u8_at(&self, field: &'static str, offset: usize) -> Result<u8> {
        Ok(self.field::<1>(field, offset)?[0])
    }

    pub fn bool_at(&self, field: &'static str, offset: usize) -> Result<bool> {
        Ok(self.u8_at(field, offset)? != 0)
    }

    pub fn u32_at(&self, field: &'static str, offset: usize) -> Result<u32> {
        Ok(u32::from_le_bytes(self.field(field, offset)?))
    }

    pub fn i64_at(&self, field: &'static str, offset: usize) -> Result<i64> {
        Ok(i64::from_le_bytes(self.field(field, offset)?))
    }

    /// Copies a string field out of the reply.
    ///
    /// The field starts at `start` and stops at the first NUL, at the start of
    /// any boundary lying after it, or at the end of the reply. Descriptor
    /// strings are not reliably NUL-terminated, so the neighbouring offsets
    /// are what delimits them. The reply itself is never modified.
    pub fn text_at(&self, start: usize, boundaries: &[usize]) -> Vec<u8> {
        if start == 0 || start >= self.bytes.len() {
            return Vec::new();
        }
        let limit = boundaries
            .iter()
            .copied()
            .filter(|&b| b > start)
            .fold(self.bytes.len(), usize::min);
        self.bytes[start..limit]
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .collect()
    }
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskGeometry {
    pub cylinders: i64,
    pub media_type: u32,
    pub tracks_per_cylinder: u32,
    pub sectors_per_track: u32,
    pub bytes_per_sector: u32,
}

impl DiskGeometry {
    pub fn decode(view: ReplyView<'_>) -> Result<Self> {
        view.require("DISK_GEOMETRY", DISK_GEOMETRY_SIZE)?;
        Ok(Self {
            cylinders: view.i64_at("Cylinders", 0)?,
            media_type: view.u32_at("MediaType", 8)?,
            tracks_per_cylinder: view.u32_at("TracksPerCylinder", 12)?,
            sectors_per_track: view.u32_at("SectorsPerTrack", 16)?,
            bytes_per_sector: view.u32_at("BytesPerSector", 20)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; DISK_GEOMETRY_SIZE];
        put_i64(&mut buf, 0, self.cylinders);
        put_u32(&mut buf, 8, self.media_type);
        put_u32(&mut buf, 12, self.tracks_per_cylinder);
        put_u32(&mut buf, 16, self.sectors_per_track);
        put_u32(&mut buf, 20, self.bytes_per_sector);
        buf
    }

    /// Size implied by cylinders/heads/sectors.
    pub fn chs_size(&self) -> i64 {
        self.cylinders
            .saturating_mul(self.tracks_per_cylinder as i64)
            .saturating_mul(self.sectors_per_track as i64)
            .saturating_mul(self.bytes_per_sector as i64)
    }

    /// Cylinders, tracks/cylinder, sectors/track, bytes/sector.
    pub fn to_slots(&self) -> [i64; 4] {
        [
            self.cylinders,
            self.tracks_per_cylinder as i64,
            self.sectors_per_track as i64,
            self.bytes_per_sector as i64,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskGeometryEx {
    pub geometry: DiskGeometry,
    pub disk_size: i64,
}

impl DiskGeometryEx {
    pub fn decode(view: ReplyView<'_>) -> Result<Self> {
        view.require("DISK_GEOMETRY_EX", DISK_GEOMETRY_SIZE + 8)?;
        Ok(Self {
            geometry: DiskGeometry::decode(view)?,
            disk_size: view.i64_at("DiskSize", DISK_GEOMETRY_SIZE)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.geometry.encode();
        buf.resize(DISK_GEOMETRY_EX_SIZE, 0);
        put_i64(&mut buf, DISK_GEOMETRY_SIZE, self.disk_size);
        buf
    }

    pub fn to_slots(&self) -> [i64; 5] {
        let [c, t, s, b] = self.geometry.to_slots();
        [c, t, s, b, self.disk_size]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartitionStyle {
    Mbr,
    Gpt,
    Raw,
    Other(u32),
}

impl PartitionStyle {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => PartitionStyle::Mbr,
            1 => PartitionStyle::Gpt,
            2 => PartitionStyle::Raw,
            other => PartitionStyle::Other(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            PartitionStyle::Mbr => 0,
            PartitionStyle::Gpt => 1,
            PartitionStyle::Raw => 2,
            PartitionStyle::Other(raw) => raw,
        }
    }
}

/// Partition style plus the number of occupied partition slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriveLayout {
    pub style: PartitionStyle,
    pub partition_count: u32,
}

impl DriveLayout {
    /// MBR tables always report four (or more) slots, so only entries whose
    /// type byte is not `PARTITION_ENTRY_UNUSED` count. GPT and raw layouts
    /// report only real entries and are taken as is.
    pub fn decode(view: ReplyView<'_>) -> Result<Self> {
        let style = PartitionStyle::from_raw(view.u32_at("PartitionStyle", 0)?);
        let raw_count = view.u32_at("PartitionCount", 4)?;
        let partition_count = match style {
            PartitionStyle::Mbr => {
                let mut used = 0;
                for index in 0..raw_count as usize {
                    let entry = DRIVE_LAYOUT_HEADER_SIZE + index * PARTITION_ENTRY_SIZE;
                    if view.u8_at("Mbr.PartitionType", entry + 32)? != PARTITION_ENTRY_UNUSED {
                        used += 1;
                    }
                }
                used
            }
            _ => raw_count,
        };
        Ok(Self { style, partition_count })
    }

    /// Encodes a layout with one entry per element of `mbr_types`.
    ///
    /// For non-MBR styles the type bytes are left zero and only the entry
    /// count matters.
    pub fn encode(style: PartitionStyle, mbr_types: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; DRIVE_LAYOUT_HEADER_SIZE + mbr_types.len() * PARTITION_ENTRY_SIZE];
        put_u32(&mut buf, 0, style.raw());
        put_u32(&mut buf, 4, mbr_types.len() as u32);
        for (index, &kind) in mbr_types.iter().enumerate() {
            let entry = DRIVE_LAYOUT_HEADER_SIZE + index * PARTITION_ENTRY_SIZE;
            put_u32(&mut buf, entry, style.raw());
            if style == PartitionStyle::Mbr {
                buf[entry + 32] = kind;
            }
        }
        buf
    }

    pub fn to_slots(&self) -> [i64; 2] {
        [self.style.raw() as i64, self.partition_count as i64]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    pub number: u32,
    pub length: i64,
}

impl PartitionInfo {
    pub fn decode(view: ReplyView<'_>) -> Result<Self> {
        Ok(Self {
            length: view.i64_at("PartitionLength", 16)?,
            number: view.u32_at("PartitionNumber", 24)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; PARTITION_ENTRY_SIZE];
        put_i64(&mut buf, 16, self.length);
        put_u32(&mut buf, 24, self.number);
        buf
    }

    pub fn to_slots(&self) -> [i64; 2] {
        [self.number as i64, self.length]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HotplugInfo {
    pub media_removable: bool,
    pub media_hotplug: bool,
    pub device_hotplug: bool,
}

impl HotplugInfo {
    /// Output buffer with the `Size` member preset, as the driver expects.
    pub fn request_buffer() -> [u8; HOTPLUG_INFO_SIZE] {
        let mut buf = [0u8; HOTPLUG_INFO_SIZE];
        put_u32(&mut buf, 0, HOTPLUG_INFO_SIZE as u32);
        buf
    }

    pub fn decode(view: ReplyView<'_>) -> Result<Self> {
        Ok(Self {
            media_removable: view.bool_at("MediaRemovable", 4)?,
            media_hotplug: view.bool_at("MediaHotplug", 5)?,
            device_hotplug: view.bool_at("DeviceHotplug", 6)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Self::request_buffer().to_vec();
        buf[4] = self.media_removable as u8;
        buf[5] = self.media_hotplug as u8;
        buf[6] = self.device_hotplug as u8;
        buf
    }

    pub fn is_hotpluggable(&self) -> bool {
        self.media_removable || self.media_hotplug || self.device_hotplug
    }

    pub fn to_slots(&self) -> [bool; 3] {
        [self.media_removable, self.media_hotplug, self.device_hotplug]
    }
}

/// `STORAGE_PROPERTY_QUERY` for `StorageDeviceProperty` / `PropertyStandardQuery`.
pub fn storage_property_query() -> [u8; STORAGE_QUERY_SIZE] {
    [0u8; STORAGE_QUERY_SIZE]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageDeviceInfo {
    pub bus_type: u32,
    pub is_usb: bool,
    pub vendor_id: Vec<u8>,
    pub product_id: Vec<u8>,
}

impl StorageDeviceInfo {
    pub fn decode(view: ReplyView<'_>) -> Result<Self> {
        let vendor = view.u32_at("VendorIdOffset", 12)? as usize;
        let product = view.u32_at("ProductIdOffset", 16)? as usize;
        let revision = view.u32_at("ProductRevisionOffset", 20)? as usize;
        let serial = view.u32_at("SerialNumberOffset", 24)? as usize;
        let bus_type = view.u32_at("BusType", 28)?;
        let fields = [vendor, product, revision, serial];
        Ok(Self {
            bus_type,
            is_usb: bus_type == BUS_TYPE_USB,
            vendor_id: view.text_at(vendor, &fields),
            product_id: view.text_at(product, &fields),
        })
    }

    /// Lays the strings out back to back without terminators, the way many
    /// USB bridges report them; revision and serial follow.
    pub fn encode(&self, revision: &[u8], serial: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; STORAGE_DESCRIPTOR_HEADER_SIZE];
        let mut offsets = [0u32; 4];
        for (slot, text) in [&self.vendor_id[..], &self.product_id[..], revision, serial]
            .into_iter()
            .enumerate()
        {
            if !text.is_empty() {
                offsets[slot] = buf.len() as u32;
                buf.extend_from_slice(text);
            }
        }
        buf.push(0);
        let total = buf.len() as u32;
        put_u32(&mut buf, 0, STORAGE_DESCRIPTOR_HEADER_SIZE as u32);
        put_u32(&mut buf, 4, total);
        for (slot, offset) in offsets.iter().enumerate() {
            put_u32(&mut buf, 12 + slot * 4, *offset);
        }
        put_u32(&mut buf, 28, self.bus_type);
        buf
    }

    pub fn vendor_text(&self) -> String {
        crate::text::ascii_to_string(&self.vendor_id)
    }

    pub fn product_text(&self) -> String {
        crate::text::ascii_to_string(&self.product_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeDiskExtents {
    pub extent_count: u32,
    pub first_disk: u32,
}

impl VolumeDiskExtents {
    pub fn decode(view: ReplyView<'_>) -> Result<Self> {
        Ok(Self {
            extent_count: view.u32_at("NumberOfDiskExtents", 0)?,
            first_disk: view.u32_at("Extents[0].DiskNumber", 8)?,
        })
    }

    pub fn encode(disk: u32) -> Vec<u8> {
        let mut buf = vec![0u8; VOLUME_DISK_EXTENTS_SIZE];
        put_u32(&mut buf, 0, 1);
        put_u32(&mut buf, 8, disk);
        buf
    }

    /// The disk number if the volume lives on exactly one physical drive.
    pub fn single_disk(&self) -> Option<u32> {
        (self.extent_count == 1).then_some(self.first_disk)
    }
}
