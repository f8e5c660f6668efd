//! Index field producer.
//!
//! ```text
//! 0x00 | VLI(count) | (VLI unpadded | VLI uncompressed)* | 0-3 zero bytes | CRC32 (LE)
//! ```
//!
//! The CRC32 covers everything before it, indicator and padding included.

use crc32fast::Hasher;

use crate::error::Result;
use crate::vli::{self, VLI_BYTES_MAX};

/// First byte of the Index field.  A Block Header can never start with it.
pub const INDEX_INDICATOR: u8 = 0x00;

/// Smallest possible Unpadded Size: a minimal Block Header plus one byte.
pub const UNPADDED_SIZE_MIN: u64 = 5;

/// Sizes of one Block as listed in the Index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    pub unpadded_size:     u64,
    pub uncompressed_size: u64,
}

impl IndexRecord {
    pub fn new(unpadded_size: u64, uncompressed_size: u64) -> Self {
        Self { unpadded_size, uncompressed_size }
    }
}

#[inline]
pub(crate) fn vli_len(value: u64) -> u64 {
    vli::encoded_size(value).unwrap_or(VLI_BYTES_MAX) as u64
}

/// Index size without padding and CRC32: indicator, count and record list.
#[inline]
pub fn unpadded_index_size(count: u64, list_size: u64) -> u64 {
    1 + vli_len(count) + list_size
}

/// Full encoded Index size.  Always a multiple of four.
#[inline]
pub fn index_size(count: u64, list_size: u64) -> u64 {
    ((unpadded_index_size(count, list_size) + 3) & !3) + 4
}

/// Number of zero bytes needed after `unpadded` bytes of Index.
#[inline]
pub(crate) fn padding_len(unpadded: u64) -> usize {
    ((4 - (unpadded & 3)) & 3) as usize
}

/// Serialize a complete Index field.
pub fn encode_index(records: &[IndexRecord]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(8 + records.len() * 4);
    out.push(INDEX_INDICATOR);
    vli::encode_to_vec(records.len() as u64, &mut out)?;
    for record in records {
        vli::encode_to_vec(record.unpadded_size, &mut out)?;
        vli::encode_to_vec(record.uncompressed_size, &mut out)?;
    }
    out.resize(out.len() + padding_len(out.len() as u64), 0x00);

    let mut crc = Hasher::new();
    crc.update(&out);
    out.extend_from_slice(&crc.finalize().to_le_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index() {
        let bytes = encode_index(&[]).unwrap();
        // Well-known empty xz Index.
        assert_eq!(bytes, [0x00, 0x00, 0x00, 0x00, 0x1C, 0xDF, 0x44, 0x21]);
        assert_eq!(index_size(0, 0), 8);
    }

    #[test]
    fn sizes_agree_with_encoding() {
        let records = [IndexRecord::new(10, 20), IndexRecord::new(30, 5)];
        let bytes = encode_index(&records).unwrap();
        let list = records.iter().map(|r| vli_len(r.unpadded_size) + vli_len(r.uncompressed_size)).sum();
        assert_eq!(unpadded_index_size(2, list), 6);
        assert_eq!(bytes.len() as u64, index_size(2, list));
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..8], &[0x00, 0x02, 10, 20, 30, 5, 0, 0]);
    }

    #[test]
    fn rejects_out_of_range_sizes() {
        let records = [IndexRecord::new(u64::MAX, 1)];
        assert!(encode_index(&records).unwrap_err().is_usage());
    }
}
