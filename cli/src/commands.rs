use anyhow::{Context, Result};
use devgate_core::drives::{self, Drive, Reachability, MediaFilter, NetDrive};
use devgate_core::ioctl::{DiskGeometryEx, DriveLayout, HotplugInfo, PartitionInfo};
use devgate_core::joystick::{Joystick, JoystickBounds, JoystickState};
use devgate_core::stream;
use devgate_core::{DeviceBackend, Gateway, OpenRequest};
use log::debug;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Vendor and product of a device as printable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageSummary {
    pub bus_type: u32,
    pub is_usb: bool,
    pub vendor: String,
    pub product: String,
}

/// Everything the control-code queries reveal about one device.
///
/// A query the device rejects leaves its field empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    pub path: String,
    pub geometry: Option<DiskGeometryEx>,
    pub layout: Option<DriveLayout>,
    pub partition: Option<PartitionInfo>,
    pub hotplug: Option<HotplugInfo>,
    pub storage: Option<StorageSummary>,
    pub physical_drive: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootEntry {
    pub root: String,
    pub drive_type: u32,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetEntry {
    #[serde(flatten)]
    pub drive: NetDrive,
    pub reachable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoystickReport {
    pub index: u32,
    pub bounds: JoystickBounds,
    pub state: Option<JoystickState>,
}

fn emit<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn drive_type_name(drive_type: u32) -> &'static str {
    match drive_type {
        drives::DRIVE_NO_ROOT_DIR => "no root",
        drives::DRIVE_REMOVABLE => "removable",
        drives::DRIVE_FIXED => "fixed",
        drives::DRIVE_REMOTE => "network",
        drives::DRIVE_CDROM => "cd-rom",
        drives::DRIVE_RAMDISK => "ram disk",
        _ => "unknown",
    }
}

pub fn list_drives<B: DeviceBackend>(
    gateway: &Gateway<B>,
    filter: MediaFilter,
    json: bool,
    out: &mut impl Write,
) -> Result<Vec<Drive>> {
    let found = drives::list_drives(gateway, filter);
    if json {
        emit(out, &found)?;
    } else if found.is_empty() {
        writeln!(out, "No drives found.")?;
    } else {
        for drive in &found {
            let marker = if drive.needs_special_privileges { " (admin)" } else { "" };
            writeln!(out, "{:<22} {}{}", drive.path, drive.description, marker)?;
        }
    }
    Ok(found)
}

pub fn list_roots<B: DeviceBackend>(gateway: &Gateway<B>, json: bool, out: &mut impl Write) -> Result<()> {
    let roots: Vec<RootEntry> = drives::list_roots(gateway)
        .into_iter()
        .map(|root| {
            let drive_type = gateway.drive_type(&root);
            let label = gateway.volume_label(&root).ok().filter(|l| !l.is_empty());
            RootEntry { root, drive_type, label }
        })
        .collect();
    if json {
        return emit(out, &roots);
    }
    for entry in &roots {
        write!(out, "{:<4} {:<10}", entry.root, drive_type_name(entry.drive_type))?;
        match &entry.label {
            Some(label) => writeln!(out, " {}", label)?,
            None => writeln!(out)?,
        }
    }
    Ok(())
}

/// Opens `path` without data access and runs every query against it.
pub fn inspect<B: DeviceBackend>(gateway: &Gateway<B>, path: &str) -> Result<DeviceReport> {
    let handle = gateway
        .open(path, OpenRequest::query())
        .map_err(|e| describe(gateway, e))
        .with_context(|| format!("Cannot open {}", path))?;

    let report = DeviceReport {
        path: path.to_string(),
        geometry: gateway.disk_geometry_ex(handle).ok(),
        layout: gateway.partition_style(handle).ok(),
        partition: gateway.partition_info(handle).ok(),
        hotplug: gateway.hotplug_info(handle).ok(),
        storage: gateway.storage_device_info(handle).ok().map(|info| StorageSummary {
            bus_type: info.bus_type,
            is_usb: info.is_usb,
            vendor: info.vendor_text(),
            product: info.product_text(),
        }),
        physical_drive: gateway.physical_drive_num(handle).ok(),
    };
    if let Err(e) = gateway.close(handle) {
        debug!("closing {} failed: {}", path, e);
    }
    Ok(report)
}

pub fn show_info<B: DeviceBackend>(gateway: &Gateway<B>, path: &str, json: bool, out: &mut impl Write) -> Result<()> {
    let report = inspect(gateway, path)?;
    if json {
        return emit(out, &report);
    }

    writeln!(out, "Device: {}", report.path)?;
    if let Some(storage) = &report.storage {
        let text = drives::vendor_product_text(&storage.vendor, &storage.product);
        writeln!(out, "  Model: {}{}", text, if storage.is_usb { " (USB)" } else { "" })?;
    }
    if let Some(ex) = &report.geometry {
        let g = &ex.geometry;
        writeln!(
            out,
            "  Geometry: {} cylinders, {} heads, {} sectors/track, {} bytes/sector",
            g.cylinders, g.tracks_per_cylinder, g.sectors_per_track, g.bytes_per_sector
        )?;
        writeln!(out, "  Size: {}", drives::format_size(ex.disk_size))?;
    }
    if let Some(layout) = &report.layout {
        writeln!(out, "  Layout: {:?}, {} partition(s)", layout.style, layout.partition_count)?;
    }
    if let Some(partition) = &report.partition {
        writeln!(out, "  Partition: #{}, {} bytes", partition.number, partition.length)?;
    }
    if let Some(hotplug) = &report.hotplug {
        writeln!(
            out,
            "  Removable: {}",
            if hotplug.is_hotpluggable() { "Yes" } else { "No" }
        )?;
    }
    if let Some(disk) = report.physical_drive {
        writeln!(out, "  Physical drive: {}{}", drives::PHYSICAL_DRIVE_PREFIX, disk)?;
    }
    Ok(())
}

/// Copies a device, or a window of it, into `file`.
pub fn dump<B: DeviceBackend>(
    gateway: &Gateway<B>,
    device: &str,
    file: &Path,
    offset: Option<u64>,
    length: Option<u64>,
) -> Result<u64> {
    let mut image = File::create(file).with_context(|| format!("Cannot create {}", file.display()))?;

    let copied = if offset.is_some() || length.is_some() {
        let mut source = stream::open_for_random_access(gateway, device, true)
            .with_context(|| format!("Cannot open {}", device))?;
        source.seek(SeekFrom::Start(offset.unwrap_or(0)))?;
        let copied = match length {
            Some(length) => io::copy(&mut (&mut source).take(length), &mut image)?,
            None => io::copy(&mut source, &mut image)?,
        };
        source.close()?;
        copied
    } else {
        let mut source = stream::open_for_sequential_read(gateway, device)
            .with_context(|| format!("Cannot open {}", device))?;
        let copied = io::copy(&mut source, &mut image)?;
        source.close()?;
        copied
    };

    image.flush()?;
    debug!("dumped {} bytes of {} to {}", copied, device, file.display());
    Ok(copied)
}

/// Writes the image in `file` onto `device`.
pub fn restore<B: DeviceBackend>(gateway: &Gateway<B>, file: &Path, device: &str) -> Result<u64> {
    let mut image = File::open(file).with_context(|| format!("Cannot open {}", file.display()))?;
    let mut target = stream::open_for_sequential_write(gateway, device)
        .with_context(|| format!("Cannot open {} for writing", device))?;
    let copied = io::copy(&mut image, &mut target)?;
    target.finish().context("Finishing the write failed")?;
    Ok(copied)
}

pub fn show_error<B: DeviceBackend>(gateway: &Gateway<B>, code: u32, out: &mut impl Write) -> Result<()> {
    match gateway.error_message(code) {
        Some(message) => writeln!(out, "{}: {}", code, message)?,
        None => writeln!(out, "{}: no system message", code)?,
    }
    Ok(())
}

pub fn list_net<B: DeviceBackend>(
    gateway: &Gateway<B>,
    reachability: &impl Reachability,
    json: bool,
    out: &mut impl Write,
) -> Result<Vec<NetEntry>> {
    let unreachable = drives::find_unreachable_net_paths(gateway, reachability);
    let entries: Vec<NetEntry> = drives::net_connections(gateway)
        .into_iter()
        .map(|drive| {
            let reachable = !unreachable.contains(&drive.root);
            NetEntry { drive, reachable }
        })
        .collect();
    if json {
        emit(out, &entries)?;
        return Ok(entries);
    }
    if entries.is_empty() {
        writeln!(out, "No network drives.")?;
    }
    for entry in &entries {
        let remote = entry.drive.remote.as_deref().unwrap_or("(disconnected)");
        let marker = if entry.reachable { "" } else { " (unreachable)" };
        writeln!(out, "{:<4} {}{}", entry.drive.root, remote, marker)?;
    }
    Ok(entries)
}

pub fn show_joystick<B: DeviceBackend>(
    gateway: &Gateway<B>,
    index: u32,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let mut stick = Joystick::open(gateway, index)
        .with_context(|| format!("Joystick {} is not connected", index))?;
    let report = JoystickReport { index, bounds: stick.bounds(), state: stick.poll()? };
    if json {
        return emit(out, &report);
    }

    let b = report.bounds;
    writeln!(out, "Joystick {}: x {}..{}, y {}..{}", index, b.x_min, b.x_max, b.y_min, b.y_max)?;
    if let Some(state) = report.state {
        writeln!(out, "  buttons {:#06b}, x {:+.2}, y {:+.2}", state.buttons, state.x, state.y)?;
    }
    Ok(())
}

/// Lets the OS text of a gateway error show up in anyhow's report.
fn describe<B: DeviceBackend>(gateway: &Gateway<B>, err: devgate_core::GatewayError) -> anyhow::Error {
    match err.os_code().and_then(|code| gateway.error_message(code)) {
        Some(message) => anyhow::anyhow!("{} ({})", message, err),
        None => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devgate_core::drives::{DRIVE_FIXED, DRIVE_REMOVABLE};
    use devgate_core::ioctl::*;
    use devgate_core::joystick::JoystickPos;
    use devgate_core::test_utils::{SimDevice, SimulatedBackend};

    fn stick() -> SimDevice {
        SimDevice::with_data((0..8192u32).map(|i| (i % 251) as u8).collect())
            .with_geometry(DiskGeometryEx {
                geometry: DiskGeometry {
                    cylinders: 1,
                    media_type: 11,
                    tracks_per_cylinder: 1,
                    sectors_per_track: 16,
                    bytes_per_sector: 512,
                },
                disk_size: 8192,
            })
            .with_storage(&StorageDeviceInfo {
                bus_type: BUS_TYPE_USB,
                is_usb: true,
                vendor_id: b"Kingston".to_vec(),
                product_id: b"DataTraveler".to_vec(),
            })
            .with_disk_number(1)
    }

    fn machine() -> Gateway<SimulatedBackend> {
        Gateway::new(
            SimulatedBackend::new()
                .with_volume('C', DRIVE_FIXED, Some("SYSTEM"), Some(SimDevice::new(4096).with_disk_number(0)))
                .with_volume('E', DRIVE_REMOVABLE, Some("STICK"), Some(stick()))
                .with_net_drive('Z', "\\\\nas\\backup")
                .with_joystick(
                    0,
                    JoystickBounds { x_min: 0, x_max: 100, y_min: 0, y_max: 100 },
                    JoystickPos { buttons: 1, x: 100, y: 0 },
                ),
        )
    }

    fn text(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn info_collects_available_queries() {
        let gateway = machine();
        let report = inspect(&gateway, "\\\\.\\E:").unwrap();
        assert_eq!(report.geometry.map(|g| g.disk_size), Some(8192));
        assert_eq!(report.physical_drive, Some(1));
        let storage = report.storage.unwrap();
        assert!(storage.is_usb);
        assert_eq!(storage.vendor, "Kingston");
        assert!(report.layout.is_none());
        assert_eq!(gateway.backend().open_handles(), 0);
    }

    #[test]
    fn info_text_names_the_model() {
        let gateway = machine();
        let mut out = Vec::new();
        show_info(&gateway, "\\\\.\\E:", false, &mut out).unwrap();
        let out = text(out);
        assert!(out.contains("Model: Kingston DataTraveler (USB)"), "{}", out);
        assert!(out.contains("Physical drive: \\\\.\\PhysicalDrive1"));
    }

    #[test]
    fn info_on_missing_device_fails() {
        let gateway = machine();
        let err = inspect(&gateway, "\\\\.\\Q:").unwrap_err();
        assert!(format!("{:#}", err).contains("Cannot open"));
    }

    #[test]
    fn roots_show_type_and_label() {
        let gateway = machine();
        let mut out = Vec::new();
        list_roots(&gateway, false, &mut out).unwrap();
        let out = text(out);
        assert!(out.lines().any(|l| l.starts_with("C:\\") && l.contains("fixed") && l.ends_with("SYSTEM")));
        assert!(out.lines().any(|l| l.starts_with("Z:\\") && l.contains("network")));
    }

    #[test]
    fn net_lists_connections_as_json() {
        let gateway = machine();
        let mut out = Vec::new();
        let found = list_net(&gateway, &|_: &str| true, true, &mut out).unwrap();
        assert_eq!(found.len(), 1);
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed[0]["remote"], "\\\\nas\\backup");
        assert_eq!(parsed[0]["host"], "nas");
        assert_eq!(parsed[0]["reachable"], true);
    }

    #[test]
    fn net_marks_silent_hosts() {
        let gateway = machine();
        let mut out = Vec::new();
        let found = list_net(&gateway, &|_: &str| false, false, &mut out).unwrap();
        assert!(!found[0].reachable);
        assert!(text(out).contains("(unreachable)"));
    }

    #[test]
    fn dump_window_of_device() {
        let gateway = machine();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("window.img");
        let copied = dump(&gateway, "\\\\.\\E:", &file, Some(512), Some(1024)).unwrap();
        assert_eq!(copied, 1024);
        let data = std::fs::read(&file).unwrap();
        let expected: Vec<u8> = (512..1536u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(data, expected);
        assert_eq!(gateway.backend().open_handles(), 0);
    }

    #[test]
    fn dump_then_restore_whole_volume() {
        let gateway = machine();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stick.img");
        assert_eq!(dump(&gateway, "\\\\.\\E:", &file, None, None).unwrap(), 8192);

        let mut image = std::fs::read(&file).unwrap();
        image[0] = 0xEB;
        std::fs::write(&file, &image).unwrap();
        assert_eq!(restore(&gateway, &file, "\\\\.\\E:").unwrap(), 8192);
        assert_eq!(gateway.backend().device_data("\\\\.\\E:").unwrap()[0], 0xEB);
    }

    #[test]
    fn error_text_is_printed() {
        let gateway = machine();
        let mut out = Vec::new();
        show_error(&gateway, 5, &mut out).unwrap();
        show_error(&gateway, 99_999, &mut out).unwrap();
        assert_eq!(text(out), "5: Access is denied.\n99999: no system message\n");
    }

    #[test]
    fn joystick_reports_bounds_and_state() {
        let gateway = machine();
        let mut out = Vec::new();
        show_joystick(&gateway, 0, false, &mut out).unwrap();
        let out = text(out);
        assert!(out.starts_with("Joystick 0: x 0..100, y 0..100"));
        assert!(out.contains("x +1.00, y -1.00"));
        assert!(show_joystick(&gateway, 3, false, &mut Vec::new()).is_err());
    }

    #[test]
    fn drive_listing_skips_system_disk() {
        let gateway = machine();
        let mut out = Vec::new();
        let found = list_drives(&gateway, MediaFilter::AnyDisk, false, &mut out).unwrap();
        assert!(found.iter().all(|d| !d.path.ends_with("C:")));
        assert!(found.iter().any(|d| d.path == "\\\\.\\E:"));
    }
}
