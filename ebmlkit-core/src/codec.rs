// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! The `codec` module reads and writes the EBML primitive payload types.
//!
//! All readers take the payload size in bytes and decode a zero size to the
//! type's zero value. All encoders emit the minimum-length encoding unless a
//! fixed length is requested, and fail with `LengthTooSmall` when the minimum
//! encoding does not fit the request.

use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use crate::errors::{decode_error, Error, Result};
use crate::io::ReadBytes;

/// The EBML date epoch: dates are signed nanoseconds relative to this instant.
pub const DATE_EPOCH: OffsetDateTime = datetime!(2001-01-01 00:00 UTC);

/// Sign-extends a `bits`-wide big-endian value to 64 bits.
fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Reads an unsigned integer payload of up to 8 bytes.
pub fn read_uint<R: ReadBytes>(reader: &mut R, size: u64) -> Result<u64> {
    if size > 8 {
        return decode_error("unsigned integer payload longer than 8 bytes");
    }
    let mut buf = [0u8; 8];
    reader.read_buf_exact(&mut buf[(8 - size as usize)..])?;
    Ok(u64::from_be_bytes(buf))
}

/// Reads a signed integer payload of up to 8 bytes, sign-extending the top
/// bit of the stored width.
pub fn read_int<R: ReadBytes>(reader: &mut R, size: u64) -> Result<i64> {
    if size > 8 {
        return decode_error("signed integer payload longer than 8 bytes");
    }
    let mut buf = [0u8; 8];
    reader.read_buf_exact(&mut buf[(8 - size as usize)..])?;
    Ok(sign_extend(u64::from_be_bytes(buf), size as u32 * 8))
}

/// Reads a floating-point payload. Only sizes 0, 4, and 8 are valid.
pub fn read_float<R: ReadBytes>(reader: &mut R, size: u64) -> Result<f64> {
    match size {
        0 => Ok(0.0),
        4 => Ok(f64::from(reader.read_be_f32()?)),
        8 => reader.read_be_f64(),
        _ => Err(Error::InvalidFloatSize(size)),
    }
}

/// Reads an ASCII string payload. The payload is cut at the first NUL; bytes
/// outside the ASCII range are replaced with `?` and logged, never failed on.
pub fn read_ascii<R: ReadBytes>(reader: &mut R, size: u64) -> Result<String> {
    let data = reader.read_boxed_slice_exact(size as usize)?;
    let bytes = data.split(|b| *b == 0).next().unwrap_or(&data);

    let mut replaced = 0usize;
    let value = bytes
        .iter()
        .map(|b| {
            if b.is_ascii() {
                *b as char
            }
            else {
                replaced += 1;
                '?'
            }
        })
        .collect();

    if replaced > 0 {
        log::warn!("replaced {} non-ascii byte(s) in string payload", replaced);
    }
    Ok(value)
}

/// Reads a UTF-8 string payload, cut at the first NUL. Invalid UTF-8 is an
/// error.
pub fn read_utf8<R: ReadBytes>(reader: &mut R, size: u64) -> Result<String> {
    let data = reader.read_boxed_slice_exact(size as usize)?;
    let bytes = data.split(|b| *b == 0).next().unwrap_or(&data);
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => decode_error("invalid utf-8 in unicode string payload"),
    }
}

/// Reads a date payload: 8 bytes of signed nanoseconds since the 2001 epoch.
pub fn read_date<R: ReadBytes>(reader: &mut R, size: u64) -> Result<OffsetDateTime> {
    if size == 0 {
        return Ok(DATE_EPOCH);
    }
    if size != 8 {
        return decode_error("date payload must be 8 bytes");
    }
    let mut buf = [0u8; 8];
    reader.read_buf_exact(&mut buf)?;
    let nanos = i64::from_be_bytes(buf);
    Ok(DATE_EPOCH + Duration::nanoseconds(nanos))
}

/// Reads a raw binary payload.
pub fn read_binary<R: ReadBytes>(reader: &mut R, size: u64) -> Result<Box<[u8]>> {
    reader.read_boxed_slice_exact(size as usize)
}

/// The synthesized value of a void element: the declared number of 0xFF
/// bytes. The underlying source is never touched.
pub fn void_value(size: u64) -> Box<[u8]> {
    vec![0xFF; size as usize].into_boxed_slice()
}

/// Pads or validates a minimum-length encoding against a requested fixed
/// length, filling on the left with `fill`.
fn fit(mut bytes: Vec<u8>, length: Option<u32>, fill: u8) -> Result<Vec<u8>> {
    match length {
        None => Ok(bytes),
        Some(len) => {
            let len = len as usize;
            if bytes.len() > len {
                return Err(Error::LengthTooSmall("value does not fit requested length"));
            }
            let mut padded = vec![fill; len - bytes.len()];
            padded.append(&mut bytes);
            Ok(padded)
        }
    }
}

/// Encodes an unsigned integer at its minimum length, stripping leading zero
/// bytes. Zero encodes to an empty payload.
pub fn encode_uint(value: u64, length: Option<u32>) -> Result<Vec<u8>> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(8);
    fit(bytes[start..].to_vec(), length, 0x00)
}

/// Encodes a signed integer at its minimum length, stripping redundant sign
/// bytes while keeping the sign bit of the leading byte intact.
pub fn encode_int(value: i64, length: Option<u32>) -> Result<Vec<u8>> {
    let bytes = value.to_be_bytes();
    let minimal: Vec<u8> = if value >= 0 {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(8);
        let mut v = bytes[start..].to_vec();
        // Re-pad if stripping exposed a set sign bit.
        if v.first().map_or(false, |b| b & 0x80 != 0) {
            v.insert(0, 0x00);
        }
        v
    }
    else {
        let start = bytes.iter().position(|b| *b != 0xFF).unwrap_or(7);
        let mut v = bytes[start..].to_vec();
        if v.first().map_or(true, |b| b & 0x80 == 0) {
            v.insert(0, 0xFF);
        }
        v
    };
    fit(minimal, length, if value < 0 { 0xFF } else { 0x00 })
}

/// Encodes a float as 0, 4, or 8 bytes. Without a fixed length, zero encodes
/// empty and everything else as 8 bytes.
pub fn encode_float(value: f64, length: Option<u32>) -> Result<Vec<u8>> {
    match length {
        None => {
            if value == 0.0 {
                Ok(Vec::new())
            }
            else {
                Ok(value.to_be_bytes().to_vec())
            }
        }
        Some(0) => {
            if value != 0.0 {
                return Err(Error::LengthTooSmall("non-zero float in a 0-byte payload"));
            }
            Ok(Vec::new())
        }
        Some(4) => Ok((value as f32).to_be_bytes().to_vec()),
        Some(8) => Ok(value.to_be_bytes().to_vec()),
        Some(n) => Err(Error::InvalidFloatSize(u64::from(n))),
    }
}

/// Encodes an ASCII string, replacing bytes outside the printable range
/// [0x20, 0x7E] with `?`, then padding with NUL or truncating to a fixed
/// length.
pub fn encode_ascii(value: &str, length: Option<u32>) -> Result<Vec<u8>> {
    let mut bytes: Vec<u8> = value
        .bytes()
        .map(|b| if (0x20..=0x7E).contains(&b) { b } else { b'?' })
        .collect();
    if let Some(len) = length {
        bytes.resize(len as usize, 0x00);
    }
    Ok(bytes)
}

/// Encodes a UTF-8 string, padding with NUL or truncating to a fixed length.
pub fn encode_utf8(value: &str, length: Option<u32>) -> Result<Vec<u8>> {
    let mut bytes = value.as_bytes().to_vec();
    if let Some(len) = length {
        bytes.resize(len as usize, 0x00);
    }
    Ok(bytes)
}

/// Encodes a date as 8 bytes of signed nanoseconds since the 2001 epoch.
pub fn encode_date(value: OffsetDateTime, length: Option<u32>) -> Result<Vec<u8>> {
    if let Some(len) = length {
        if len != 8 {
            return Err(Error::InvalidLength("date payloads are exactly 8 bytes"));
        }
    }
    let nanos = (value - DATE_EPOCH).whole_nanoseconds();
    match i64::try_from(nanos) {
        Ok(nanos) => Ok(nanos.to_be_bytes().to_vec()),
        Err(_) => Err(Error::InvalidLength("date out of range of the 2001 epoch")),
    }
}

/// Encodes a binary payload, zero-padding to a fixed length when requested.
pub fn encode_binary(value: &[u8], length: Option<u32>) -> Result<Vec<u8>> {
    match length {
        None => Ok(value.to_vec()),
        Some(len) => {
            let len = len as usize;
            if value.len() > len {
                return Err(Error::LengthTooSmall("binary payload longer than requested length"));
            }
            let mut bytes = value.to_vec();
            bytes.resize(len, 0x00);
            Ok(bytes)
        }
    }
}
