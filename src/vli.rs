//! Variable-length integers: the wire encoding of every size field.
//!
//! A VLI stores 7 bits per byte, least-significant group first.  Every byte
//! but the last has its high bit set.  The encoding is always minimal, so a
//! value has exactly one valid byte sequence of 1–9 bytes.
//!
//! # Calling modes
//! - Single-call ([`encode`], [`decode`]): the whole integer is written or
//!   read in one call.
//! - Multi-call ([`encode_partial`], [`decode_partial`]): the caller owns a
//!   cursor (bytes already emitted or consumed) and keeps calling with fresh
//!   buffers until [`Status::Done`].  The cursor starts at `0`.

use crate::error::{Error, Result, Status};

/// Largest value a VLI can carry: `2^63 - 1`.
pub const VLI_MAX: u64 = u64::MAX / 2;
/// "Unknown / unspecified" sentinel.  Never written to the wire.
pub const VLI_UNKNOWN: u64 = u64::MAX;
/// Longest encoding in bytes.
pub const VLI_BYTES_MAX: usize = 9;

/// `true` for values in `[0, VLI_MAX]` and for [`VLI_UNKNOWN`].
#[inline]
pub fn is_valid(value: u64) -> bool {
    value <= VLI_MAX || value == VLI_UNKNOWN
}

/// Encoded length of `value` in bytes, or `None` if `value > VLI_MAX`.
pub fn encoded_size(value: u64) -> Option<usize> {
    if value > VLI_MAX {
        return None;
    }
    let bits = 64 - value.leading_zeros() as usize;
    Some(bits.div_ceil(7).max(1))
}

/// Single-call encode into `out[*out_pos..]`.
///
/// Nothing is written unless the whole encoding fits; on success `*out_pos`
/// is advanced past it.
pub fn encode(value: u64, out: &mut [u8], out_pos: &mut usize) -> Result<()> {
    let needed = encoded_size(value).ok_or(Error::Usage("VLI value out of range"))?;
    let available = out.len().saturating_sub(*out_pos);
    if available < needed {
        return Err(Error::BufferTooSmall { needed, available });
    }
    let mut cursor = 0;
    encode_partial(value, &mut cursor, out, out_pos)?;
    Ok(())
}

/// Append the encoding of `value` to a growable buffer.
pub fn encode_to_vec(value: u64, out: &mut Vec<u8>) -> Result<()> {
    let mut buf = [0u8; VLI_BYTES_MAX];
    let mut pos = 0;
    encode(value, &mut buf, &mut pos)?;
    out.extend_from_slice(&buf[..pos]);
    Ok(())
}

/// Multi-call encode.
///
/// `cursor` counts the bytes of this value already written by earlier calls.
/// Returns [`Status::Pending`] when `out` filled up before the last byte,
/// [`Status::Done`] once the final byte is out, and [`Status::NoProgress`]
/// when called with no output space at all.
pub fn encode_partial(
    value:   u64,
    cursor:  &mut usize,
    out:     &mut [u8],
    out_pos: &mut usize,
) -> Result<Status> {
    let size = encoded_size(value).ok_or(Error::Usage("VLI value out of range"))?;
    if *cursor >= size {
        return Err(Error::Usage("VLI cursor past the end of the encoding"));
    }
    if *out_pos >= out.len() {
        return Ok(Status::NoProgress);
    }

    let mut rest = value >> (*cursor * 7);
    while rest >= 0x80 {
        out[*out_pos] = (rest as u8) | 0x80;
        *out_pos += 1;
        *cursor += 1;
        rest >>= 7;
        if *out_pos == out.len() {
            return Ok(Status::Pending);
        }
    }

    out[*out_pos] = rest as u8;
    *out_pos += 1;
    *cursor += 1;
    Ok(Status::Done)
}

/// Single-call decode from `input[*in_pos..]`.
///
/// Truncated input is corruption here, since no further bytes will come.
/// `*in_pos` is only advanced on success.
pub fn decode(input: &[u8], in_pos: &mut usize) -> Result<u64> {
    let mut value = 0;
    let mut cursor = 0;
    let mut pos = *in_pos;
    match decode_partial(&mut value, &mut cursor, input, &mut pos)? {
        Status::Done => {
            *in_pos = pos;
            Ok(value)
        }
        Status::Pending | Status::NoProgress => Err(Error::corrupt("truncated VLI")),
    }
}

/// Multi-call decode.
///
/// `value` and `cursor` are owned by the caller and carried between calls;
/// `value` is reset when `cursor` is `0`.  Returns [`Status::Pending`] when
/// the input ran out mid-integer and [`Status::NoProgress`] when there was
/// no input to read.
pub fn decode_partial(
    value:  &mut u64,
    cursor: &mut usize,
    input:  &[u8],
    in_pos: &mut usize,
) -> Result<Status> {
    if *cursor == 0 {
        *value = 0;
    }
    // The pair must look like something an earlier call could have left.
    if *cursor >= VLI_BYTES_MAX || (*value >> (*cursor * 7)) != 0 {
        return Err(Error::Usage("VLI decode cursor is inconsistent"));
    }
    if *in_pos >= input.len() {
        return Ok(Status::NoProgress);
    }

    while *in_pos < input.len() {
        let byte = input[*in_pos];
        *in_pos += 1;

        *value |= u64::from(byte & 0x7F) << (*cursor * 7);
        *cursor += 1;

        if byte & 0x80 == 0 {
            if byte == 0 && *cursor > 1 {
                return Err(Error::corrupt("non-minimal VLI encoding"));
            }
            return Ok(Status::Done);
        }

        if *cursor == VLI_BYTES_MAX {
            return Err(Error::corrupt("VLI longer than nine bytes"));
        }
    }

    Ok(Status::Pending)
}
