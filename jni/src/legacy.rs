//! `devgate.DeviceIO` native methods, kept for callers built against the
//! older class. Everything routes through [`LegacyGateway`].

use crate::error::{status, BridgeResult};
use crate::exports;
use crate::marshal::{self, require};
use crate::GATEWAY;
use devgate_core::{DeviceHandle, LegacyGateway};
use devgate_platform::PlatformBackend;
use jni::objects::{JByteArray, JClass, JIntArray, JLongArray, JString};
use jni::sys::{jboolean, jint, jlong, jstring};
use jni::JNIEnv;

fn legacy() -> LegacyGateway<'static, PlatformBackend> {
    LegacyGateway::new(&GATEWAY)
}

fn handle(raw: jlong) -> BridgeResult<DeviceHandle> {
    Ok(DeviceHandle::from_jlong(raw)?)
}

fn open_device(
    env: &mut JNIEnv,
    path: &JString,
    read_only: bool,
    random_access: bool,
    handle_out: &JLongArray,
) -> BridgeResult<()> {
    require(env.get_array_length(handle_out)?, 1)?;
    let path = marshal::string(env, path)?;
    let handle = legacy().open(&path, read_only, random_access)?;
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
    let count = legacy().read(handle, &mut data, offset, len)?;
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
    let count = legacy().write(handle, &data, offset, len)?;
    marshal::put_int(env, len_out, count as jint)
}

#[no_mangle]
pub extern "system" fn Java_devgate_DeviceIO_openDevice<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    path: JString<'local>,
    read_only: jboolean,
    random_access: jboolean,
    handle_out: JLongArray<'local>,
) -> jint {
    let read_only = marshal::flag(read_only);
    let random_access = marshal::flag(random_access);
    status(&open_device(&mut env, &path, read_only, random_access, &handle_out))
}

#[no_mangle]
pub extern "system" fn Java_devgate_DeviceIO_closeDevice<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
) -> jint {
    status(&handle(raw).and_then(|h| Ok(legacy().close(h)?)))
}

#[no_mangle]
pub extern "system" fn Java_devgate_DeviceIO_flushDevice<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
) -> jint {
    status(&handle(raw).and_then(|h| Ok(legacy().flush(h)?)))
}

#[no_mangle]
pub extern "system" fn Java_devgate_DeviceIO_seekDevice<'local>(
    _env: JNIEnv<'local>,
    _class: JClass<'local>,
    raw: jlong,
    position: jlong,
) -> jint {
    status(&handle(raw).and_then(|h| Ok(legacy().seek(h, position)?)))
}

#[no_mangle]
pub extern "system" fn Java_devgate_DeviceIO_readDevice<'local>(
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
pub extern "system" fn Java_devgate_DeviceIO_writeDevice<'local>(
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

#[no_mangle]
pub extern "system" fn Java_devgate_DeviceIO_getJoystickBounds<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    index: jint,
    out: JLongArray<'local>,
) -> jint {
    exports::joystick_slots(&env, &out, || {
        Ok(legacy().joystick_bounds(exports::joystick_index(index)?)?.to_slots())
    })
}

#[no_mangle]
pub extern "system" fn Java_devgate_DeviceIO_getJoystickPos<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    index: jint,
    out: JLongArray<'local>,
) -> jint {
    exports::joystick_slots(&env, &out, || {
        Ok(legacy().joystick_pos(exports::joystick_index(index)?)?.to_slots())
    })
}

#[no_mangle]
pub extern "system" fn Java_devgate_DeviceIO_getErrorMsg<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    code: jint,
) -> jstring {
    exports::new_string_or_null(&mut env, legacy().error_message(code as u32))
}
