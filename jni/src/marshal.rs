//! Moving values between Java arrays and gateway types.
//!
//! Every output array is measured before the gateway is asked for anything,
//! so an undersized array fails with the sentinel without an OS call.

use crate::error::BridgeResult;
use devgate_core::error::ensure_capacity;
use devgate_core::text::{fill_text, fill_wide};
use jni::objects::{JBooleanArray, JByteArray, JCharArray, JIntArray, JLongArray, JString};
use jni::sys::{jboolean, jbyte, jint, jsize, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;

pub fn string(env: &mut JNIEnv, value: &JString) -> BridgeResult<String> {
    Ok(env.get_string(value)?.into())
}

pub fn flag(value: jboolean) -> bool {
    value != JNI_FALSE
}

/// Fails unless an array of `len` elements can hold `needed`.
pub fn require(len: jsize, needed: usize) -> BridgeResult<()> {
    ensure_capacity(len.max(0) as usize, needed)?;
    Ok(())
}

pub fn put_longs(env: &JNIEnv, out: &JLongArray, slots: &[i64]) -> BridgeResult<()> {
    env.set_long_array_region(out, 0, slots)?;
    Ok(())
}

pub fn put_int(env: &JNIEnv, out: &JIntArray, value: jint) -> BridgeResult<()> {
    env.set_int_array_region(out, 0, &[value])?;
    Ok(())
}

pub fn put_flags(env: &JNIEnv, out: &JBooleanArray, flags: &[bool]) -> BridgeResult<()> {
    env.set_boolean_array_region(out, 0, &jbooleans(flags))?;
    Ok(())
}

/// Writes `text` into `out`, truncated to the array and NUL-terminated when
/// room is left. Bytes past the terminator are left as they were.
pub fn put_text(env: &JNIEnv, out: &JByteArray, text: &[u8]) -> BridgeResult<()> {
    let capacity = env.get_array_length(out)?.max(0) as usize;
    let bytes = terminated(text, capacity);
    if !bytes.is_empty() {
        env.set_byte_array_region(out, 0, &bytes)?;
    }
    Ok(())
}

pub fn get_chars(env: &JNIEnv, buf: &JCharArray, len: usize) -> BridgeResult<Vec<u16>> {
    let mut chars = vec![0u16; len];
    env.get_char_array_region(buf, 0, &mut chars)?;
    Ok(chars)
}

/// Writes `wide` back into `buf`, returning the number of chars written
/// without the terminator.
pub fn put_chars(env: &JNIEnv, buf: &JCharArray, capacity: usize, wide: &[u16]) -> BridgeResult<usize> {
    let mut chars = vec![0u16; capacity.min(wide.len() + 1)];
    let written = fill_wide(&mut chars, wide);
    env.set_char_array_region(buf, 0, &chars)?;
    Ok(written)
}

pub fn jbooleans(flags: &[bool]) -> Vec<jboolean> {
    flags.iter().map(|&f| if f { JNI_TRUE } else { JNI_FALSE }).collect()
}

/// Prefix of an array of `capacity` bytes after copying `text` into it.
pub fn terminated(text: &[u8], capacity: usize) -> Vec<jbyte> {
    let mut bytes = vec![0u8; capacity.min(text.len() + 1)];
    let written = fill_text(&mut bytes, text);
    bytes.truncate((written + 1).min(bytes.len()));
    signed(&bytes)
}

pub fn signed(bytes: &[u8]) -> Vec<jbyte> {
    bytes.iter().map(|&b| b as jbyte).collect()
}

pub fn unsigned(bytes: &[jbyte]) -> Vec<u8> {
    bytes.iter().map(|&b| b as u8).collect()
}

/// Copies the whole Java array out as unsigned bytes.
pub fn get_bytes(env: &JNIEnv, buf: &JByteArray) -> BridgeResult<Vec<u8>> {
    let len = env.get_array_length(buf)?.max(0) as usize;
    let mut bytes = vec![0 as jbyte; len];
    env.get_byte_array_region(buf, 0, &mut bytes)?;
    Ok(unsigned(&bytes))
}

/// Stores `data` into `buf` starting at element `start`.
pub fn put_bytes(env: &JNIEnv, buf: &JByteArray, start: usize, data: &[u8]) -> BridgeResult<()> {
    if !data.is_empty() {
        env.set_byte_array_region(buf, start as jsize, &signed(data))?;
    }
    Ok(())
}

/// Chars a resolved path may use in an array of `capacity` chars. One is
/// always kept for the terminator, so the array needs at least two.
pub fn path_room(capacity: jsize) -> BridgeResult<usize> {
    require(capacity, 2)?;
    Ok(capacity as usize - 1)
}

/// Fails unless `path` fits in `room` chars.
pub fn fit_path(room: usize, path: &[u16]) -> BridgeResult<()> {
    ensure_capacity(room, path.len())?;
    Ok(())
}
