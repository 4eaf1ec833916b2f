//! `devgate.WinDeviceIO` native methods.
//!
//! Each export returns `0` or an error code unless noted; results travel
//! back through the array parameters, which are sized by the Java caller.

use crate::error::{status, BridgeResult};
use crate::marshal::{self, require};
use crate::GATEWAY;
use devgate_core::{DeviceHandle, GatewayError, OpenRequest, ResultCode};
use jni::objects::{JBooleanArray, JByteArray, JCharArray, JClass, JIntArray, JLongArray, JString};
use jni::sys::{jboolean, jint, jlong, jstring};
use jni::JNIEnv;
use std::ptr;

fn handle(raw: jlong) -> BridgeResult<DeviceHandle> {
    Ok(DeviceHandle::from_jlong(raw)?)
}

// --- lifecycle ---

fn open_device(
    env: &mut JNIEnv,
    path: &JString,
    request: OpenRequest,
    handle_out: &JLongArray,
) -> BridgeResult<()> {
    require(env.get_array_length(handle_out)?, 1)?;
    let path = marshal::string(env, path)?;
    let handle = GATEWAY.open(&path, request)?;
    marshal::put_longs(env, handle_out, &[handle.to_jlong()])
}

fn read_device(
    env: &mut JNIEnv,
    raw: jlong,
    buf: &JByteArray,
    offset: jint,
    len: jint,
    len_out: &JIntArray,
) -> BridgeResult<()> {
    require(env.get_array_length(len_out)?, 1)?;
    let handle = handle(raw)?;
    let size = env.get_array_length(buf)?.max(0) as usize;
    let mut data = vec![0u8; size];
    let count = GATEWAY.read(handle, &mut data, offset, len)?;
    // A successful read had a valid, non-negative offset.
    let start = offset as usize;
    marshal::put_bytes(env, buf, start, &data[start..start + count])?;
    marshal::put_int(env, len_out, count as jint)
}

fn write_device(
    env: &mut JNIEnv,
    raw: jlong,
    buf: &JByteArray,
    offset: jint,
    len: jint,
    len_out: &JIntArray,
) -> BridgeResult<()> {
    require(env.get_array_length(len_out)?, 1)?;
    let handle = handle(raw)?;
    let data = marshal::get_bytes(env, buf)?;
    let count = GATEWAY.write(handle, &data, offset, len)?;
    marshal::put_int(env, len_out, count as jint)
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_openDevice<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    path: JString<'local>,
    read: jboolean,
    write: jboolean,
    random_access: jboolean,
    handle_out: JLongArray<'local>,
) -> jint {
    let request = OpenRequest {
        read: marshal::flag(read),
        write: marshal::flag(write),
        random_access: marshal::flag(random_access),
    };
    status(&open_device(&mut env, &path, request, &handle_out))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_closeDevice<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
) -> jint {
    status(&handle(raw).and_then(|h| Ok(GATEWAY.close(h)?)))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_flushDevice<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
) -> jint {
    status(&handle(raw).and_then(|h| Ok(GATEWAY.flush(h)?)))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_lockDevice<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
) -> jint {
    status(&handle(raw).and_then(|h| Ok(GATEWAY.lock(h)?)))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_dismountDevice<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
) -> jint {
    status(&handle(raw).and_then(|h| Ok(GATEWAY.dismount(h)?)))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_seekDevice<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
    position: jlong,
) -> jint {
    status(&handle(raw).and_then(|h| Ok(GATEWAY.seek(h, position)?)))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_readDevice<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
    buf: JByteArray<'local>,
    offset: jint,
    len: jint,
    len_out: JIntArray<'local>,
) -> jint {
    status(&read_device(&mut env, raw, &buf, offset, len, &len_out))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_writeDevice<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
    buf: JByteArray<'local>,
    offset: jint,
    len: jint,
    len_out: JIntArray<'local>,
) -> jint {
    status(&write_device(&mut env, raw, &buf, offset, len, &len_out))
}

// --- control-code queries ---

/// Shared shape of the queries that fill a `long[]`.
fn fill_longs<const N: usize>(
    env: &JNIEnv,
    out: &JLongArray,
    query: impl FnOnce() -> BridgeResult<[i64; N]>,
) -> BridgeResult<()> {
    require(env.get_array_length(out)?, N)?;
    let slots = query()?;
    marshal::put_longs(env, out, &slots)
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getDiskGeometry<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
    out: JLongArray<'local>,
) -> jint {
    status(&fill_longs(&env, &out, || Ok(GATEWAY.disk_geometry(handle(raw)?)?.to_slots())))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getDiskGeometryEx<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
    out: JLongArray<'local>,
) -> jint {
    status(&fill_longs(&env, &out, || Ok(GATEWAY.disk_geometry_ex(handle(raw)?)?.to_slots())))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getPartitionStyle<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
    out: JLongArray<'local>,
) -> jint {
    status(&fill_longs(&env, &out, || Ok(GATEWAY.partition_style(handle(raw)?)?.to_slots())))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getPartitionInfo<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
    out: JLongArray<'local>,
) -> jint {
    status(&fill_longs(&env, &out, || Ok(GATEWAY.partition_info(handle(raw)?)?.to_slots())))
}

/// Returns the disk number itself, or `-1` when the volume does not sit on
/// exactly one physical drive.
#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getPhysicalDriveNum<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
) -> jint {
    handle(raw)
        .ok()
        .and_then(|h| GATEWAY.physical_drive_num(h).ok())
        .and_then(|disk| jint::try_from(disk).ok())
        .unwrap_or(ResultCode::SENTINEL.value())
}

fn hotplug_info(env: &JNIEnv, raw: jlong, out: &JBooleanArray) -> BridgeResult<()> {
    require(env.get_array_length(out)?, 3)?;
    let info = GATEWAY.hotplug_info(handle(raw)?)?;
    marshal::put_flags(env, out, &info.to_slots())
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getHotplugInfo<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
    out: JBooleanArray<'local>,
) -> jint {
    status(&hotplug_info(&env, raw, &out))
}

/// Each output is filled only if it has room; a short USB flag array does
/// not keep the vendor and product texts from being written.
fn storage_device_info(
    env: &JNIEnv,
    raw: jlong,
    usb_out: &JByteArray,
    vendor_out: &JByteArray,
    product_out: &JByteArray,
) -> BridgeResult<()> {
    let info = GATEWAY.storage_device_info(handle(raw)?)?;
    if env.get_array_length(usb_out)? >= 1 {
        env.set_byte_array_region(usb_out, 0, &[info.is_usb as i8])?;
    }
    marshal::put_text(env, vendor_out, &info.vendor_id)?;
    marshal::put_text(env, product_out, &info.product_id)
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getStorageDeviceInfo<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
    usb_out: JByteArray<'local>,
    vendor_out: JByteArray<'local>,
    product_out: JByteArray<'local>,
) -> jint {
    status(&storage_device_info(&env, raw, &usb_out, &vendor_out, &product_out))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_deleteDriveLayout<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
) -> jint {
    status(&handle(raw).and_then(|h| Ok(GATEWAY.delete_drive_layout(h)?)))
}

// --- path, volume and network utilities ---

/// Returns the `DRIVE_*` code; `DRIVE_UNKNOWN` if the path cannot be read.
#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getDriveType<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    root: JString<'local>,
) -> jint {
    match marshal::string(&mut env, &root) {
        Ok(root) => GATEWAY.drive_type(&root) as jint,
        Err(e) => {
            log::debug!("getDriveType: {}", e);
            0
        }
    }
}

/// Returns the drive bitmask, bit 0 being `A:`.
#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getLogicalDrives<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> jint {
    GATEWAY.logical_drives() as jint
}

fn volume_info(env: &mut JNIEnv, root: &JString, out: &JByteArray) -> BridgeResult<()> {
    let root = marshal::string(env, root)?;
    let label = GATEWAY.volume_label(&root)?;
    marshal::put_text(env, out, label.as_bytes())
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getVolumeInfo<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    root: JString<'local>,
    label_out: JByteArray<'local>,
) -> jint {
    status(&volume_info(&mut env, &root, &label_out))
}

fn net_connection(env: &mut JNIEnv, device: &JString, out: &JByteArray) -> BridgeResult<()> {
    let device = marshal::string(env, device)?;
    let remote = GATEWAY.net_connection(&device)?;
    marshal::put_text(env, out, remote.as_bytes())
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getNetConnection<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    device: JString<'local>,
    remote_out: JByteArray<'local>,
) -> jint {
    status(&net_connection(&mut env, &device, &remote_out))
}

/// Resolves the NUL-terminated path in `buf` in place. The array must hold
/// at least two chars; one is always kept for the terminator.
fn short_path_name(env: &JNIEnv, buf: &JCharArray) -> BridgeResult<usize> {
    let room = marshal::path_room(env.get_array_length(buf)?)?;
    let capacity = room + 1;
    let long = marshal::get_chars(env, buf, capacity)?;
    let long_len = long.iter().position(|&c| c == 0).unwrap_or(long.len());
    let short = GATEWAY.short_path_name(&long[..long_len])?;
    marshal::fit_path(room, &short)?;
    marshal::put_chars(env, buf, capacity, &short)
}

/// Returns the length of the short path, or `-1`.
#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getShortPathName<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    buf: JCharArray<'local>,
) -> jint {
    match short_path_name(&env, &buf) {
        Ok(len) => len as jint,
        Err(e) => {
            log::debug!("getShortPathName: {}", e);
            ResultCode::SENTINEL.value()
        }
    }
}

// --- joystick ---

/// Fills a joystick `long[]`. Any failure, the MM error codes included,
/// is reported as `-1`.
pub(crate) fn joystick_slots<const N: usize>(
    env: &JNIEnv,
    out: &JLongArray,
    query: impl FnOnce() -> BridgeResult<[i64; N]>,
) -> jint {
    match fill_longs(env, out, query) {
        Ok(()) => ResultCode::SUCCESS.value(),
        Err(e) => {
            log::trace!("joystick query failed: {}", e);
            ResultCode::SENTINEL.value()
        }
    }
}

pub(crate) fn joystick_index(index: jint) -> BridgeResult<u32> {
    u32::try_from(index).map_err(|_| GatewayError::Unavailable("joystick index").into())
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getJoystickBounds<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    index: jint,
    out: JLongArray<'local>,
) -> jint {
    joystick_slots(&env, &out, || Ok(GATEWAY.joystick_bounds(joystick_index(index)?)?.to_slots()))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getJoystickPos<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    index: jint,
    out: JLongArray<'local>,
) -> jint {
    joystick_slots(&env, &out, || Ok(GATEWAY.joystick_pos(joystick_index(index)?)?.to_slots()))
}

// --- misc ---

pub(crate) fn new_string_or_null(env: &mut JNIEnv, text: Option<String>) -> jstring {
    let Some(text) = text else {
        return ptr::null_mut();
    };
    match env.new_string(text) {
        Ok(text) => text.into_raw(),
        Err(e) => {
            log::debug!("could not hand message to Java: {}", e);
            ptr::null_mut()
        }
    }
}

/// Returns the system text for `code`, or `null`.
#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getErrorMsg<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    code: jint,
) -> jstring {
    new_string_or_null(&mut env, GATEWAY.error_message(code as u32))
}

#[no_mangle]
pub extern "system" fn Java_devgate_WinDeviceIO_getLibVersion<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
) -> jint {
    GATEWAY.lib_version()
}
