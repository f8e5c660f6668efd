//! Stream Header and Stream Footer, the fixed 12-byte frame of a Stream.
//!
//! # Layout (little-endian)
//! ```text
//! Header:  magic FD 37 7A 58 5A 00 (6) | flags (2) | CRC32(flags) (4)
//! Footer:  CRC32(backward_size ‖ flags) (4) | backward_size (4) | flags (2) | "YZ" (2)
//! Flags:   byte 0 reserved = 0 | byte 1: low nibble check id, high nibble reserved = 0
//! ```
//!
//! The footer stores Backward Size as `backward_size / 4 - 1`, so any
//! 32-bit field maps into `[4, 2^34]`.
//!
//! A decoded Header always reports `backward_size: None`, which lets
//! [`compare`] check a Header against a Footer with the same routine used
//! for two Footers.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::check::{Check, CHECK_ID_MAX};
use crate::error::{Error, Result};

pub const HEADER_MAGIC: &[u8; 6] = &[0xFD, b'7', b'z', b'X', b'Z', 0x00];
pub const FOOTER_MAGIC: &[u8; 2] = b"YZ";
/// Size of both the Stream Header and the Stream Footer.
pub const STREAM_HEADER_SIZE: usize = 12;
/// Highest Stream Flags version this build understands.
pub const VERSION_MAX: u32 = 0;
pub const BACKWARD_SIZE_MIN: u64 = 4;
pub const BACKWARD_SIZE_MAX: u64 = 1 << 34;

/// Decoded Stream Flags, shared by Header and Footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFlags {
    pub version:       u32,
    pub check:         Check,
    /// Size of the Index field.  `None` means unknown (always, for a Header).
    pub backward_size: Option<u64>,
}

/// Result of [`compare`] when both records are understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagsComparison {
    Equal,
    Differ,
}

/// `true` for a positive multiple of four in `[4, 2^34]`.
#[inline]
pub fn is_backward_size_valid(backward_size: u64) -> bool {
    (BACKWARD_SIZE_MIN..=BACKWARD_SIZE_MAX).contains(&backward_size) && backward_size % 4 == 0
}

impl StreamFlags {
    pub fn new(check: Check) -> Self {
        Self { version: 0, check, backward_size: None }
    }

    pub fn with_backward_size(check: Check, backward_size: u64) -> Self {
        Self { version: 0, check, backward_size: Some(backward_size) }
    }

    /// Serialize the two flag bytes.
    fn flags_bytes(&self) -> Result<[u8; 2]> {
        if self.version > VERSION_MAX {
            return Err(Error::unsupported(format!("stream flags version {}", self.version)));
        }
        if !self.check.is_valid() {
            return Err(Error::Usage("check id above 15"));
        }
        Ok([0x00, self.check.id()])
    }

    /// Parse the two flag bytes; reserved bits must be clear.
    fn parse_flags(bytes: [u8; 2]) -> Result<Self> {
        if bytes[0] != 0x00 || bytes[1] & 0xF0 != 0 {
            return Err(Error::unsupported(format!(
                "reserved stream flag bits set ({:02x} {:02x})",
                bytes[0], bytes[1]
            )));
        }
        let check = Check::from_id(bytes[1] & CHECK_ID_MAX)
            .ok_or_else(|| Error::corrupt("check id above 15"))?;
        Ok(Self::new(check))
    }

    // ── Header ───────────────────────────────────────────────────────────────

    pub fn encode_header(&self) -> Result<[u8; STREAM_HEADER_SIZE]> {
        let flags = self.flags_bytes()?;
        let mut out = [0u8; STREAM_HEADER_SIZE];
        out[..6].copy_from_slice(HEADER_MAGIC);
        out[6..8].copy_from_slice(&flags);
        out[8..12].copy_from_slice(&crc32(&flags).to_le_bytes());
        Ok(out)
    }

    pub fn decode_header(bytes: &[u8; STREAM_HEADER_SIZE]) -> Result<Self> {
        if &bytes[..6] != HEADER_MAGIC {
            return Err(Error::FormatNotRecognized);
        }
        let flags = [bytes[6], bytes[7]];
        let stored = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let computed = crc32(&flags);
        if stored != computed {
            log::warn!("stream header CRC32 mismatch: stored {stored:08x}, computed {computed:08x}");
            return Err(Error::corrupt("stream header CRC32 mismatch"));
        }
        // The header has no Backward Size; parse_flags leaves it unknown.
        Self::parse_flags(flags)
    }

    pub fn write_header<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.encode_header()?)?;
        Ok(())
    }

    pub fn read_header<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; STREAM_HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        Self::decode_header(&buf)
    }

    // ── Footer ───────────────────────────────────────────────────────────────

    pub fn encode_footer(&self) -> Result<[u8; STREAM_HEADER_SIZE]> {
        let backward_size = self
            .backward_size
            .filter(|&size| is_backward_size_valid(size))
            .ok_or(Error::Usage("footer needs a valid backward size"))?;
        let flags = self.flags_bytes()?;
        let field = ((backward_size / 4) - 1) as u32;

        let mut out = [0u8; STREAM_HEADER_SIZE];
        let mut w = &mut out[..];
        w.write_u32::<LittleEndian>(footer_crc32(field, flags))?;
        w.write_u32::<LittleEndian>(field)?;
        w.write_all(&flags)?;
        w.write_all(FOOTER_MAGIC)?;
        Ok(out)
    }

    pub fn decode_footer(bytes: &[u8; STREAM_HEADER_SIZE]) -> Result<Self> {
        Self::read_footer(&bytes[..])
    }

    /// Magic first, then CRC32, flags and Backward Size.
    fn footer_from_fields(stored: u32, field: u32, flag_bytes: [u8; 2], magic: [u8; 2]) -> Result<Self> {
        if &magic != FOOTER_MAGIC {
            return Err(Error::FormatNotRecognized);
        }
        let computed = footer_crc32(field, flag_bytes);
        if stored != computed {
            log::warn!("stream footer CRC32 mismatch: stored {stored:08x}, computed {computed:08x}");
            return Err(Error::corrupt("stream footer CRC32 mismatch"));
        }

        let mut flags = Self::parse_flags(flag_bytes)?;
        let backward_size = (u64::from(field) + 1) * 4;
        if !is_backward_size_valid(backward_size) {
            return Err(Error::corrupt(format!("backward size {backward_size} out of range")));
        }
        flags.backward_size = Some(backward_size);
        Ok(flags)
    }

    pub fn write_footer<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.encode_footer()?)?;
        Ok(())
    }

    /// Read a footer field by field.
    pub fn read_footer<R: Read>(mut reader: R) -> Result<Self> {
        let stored = reader.read_u32::<LittleEndian>()?;
        let field = reader.read_u32::<LittleEndian>()?;
        let mut flag_bytes = [0u8; 2];
        reader.read_exact(&mut flag_bytes)?;
        let mut magic = [0u8; 2];
        reader.read_exact(&mut magic)?;
        Self::footer_from_fields(stored, field, flag_bytes, magic)
    }
}

/// Compare two Stream Flags records.
///
/// Backward sizes are compared only when both are known.  A version this
/// build does not understand is reported as [`Error::UnsupportedOptions`]
/// rather than as a difference.
pub fn compare(a: &StreamFlags, b: &StreamFlags) -> Result<FlagsComparison> {
    if a.version > VERSION_MAX || b.version > VERSION_MAX {
        return Err(Error::unsupported(format!(
            "stream flags version {}",
            a.version.max(b.version)
        )));
    }
    if !a.check.is_valid() || !b.check.is_valid() {
        return Err(Error::Usage("check id above 15"));
    }
    if a.check.id() != b.check.id() {
        return Ok(FlagsComparison::Differ);
    }

    if let (Some(x), Some(y)) = (a.backward_size, b.backward_size) {
        if !is_backward_size_valid(x) || !is_backward_size_valid(y) {
            return Err(Error::Usage("invalid backward size"));
        }
        if x != y {
            return Ok(FlagsComparison::Differ);
        }
    }

    Ok(FlagsComparison::Equal)
}

/// CRC32 over the Backward Size field and the flags, as stored in the footer.
fn footer_crc32(field: u32, flags: [u8; 2]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&field.to_le_bytes());
    hasher.update(&flags);
    hasher.finalize()
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}
