//! Constant-memory Index validation.
//!
//! [`IndexHash`] checks that the Index field of a Stream lists exactly the
//! Blocks that were actually seen, without keeping the list itself.
//!
//! # How it works
//! 1. While Blocks are decoded, the caller [`append`](IndexHash::append)s
//!    each Block's `(unpadded_size, uncompressed_size)`.  The pair is folded
//!    into a running digest and a few counters.
//! 2. The raw Index bytes are then fed to [`decode`](IndexHash::decode) in
//!    chunks of any size.  Each parsed record goes through the same folding
//!    function into a second digest.
//! 3. When the Index ends, counters and digests must agree and the Index's
//!    own CRC32 must match.
//!
//! Memory use does not depend on the number of Blocks.
//!
//! # States
//!
//! | State          | Entered on                 | Allowed calls |
//! |----------------|----------------------------|---------------|
//! | `Accumulating` | construction               | `append`, `decode` |
//! | `Hashing`      | first `decode` call        | `decode` |
//! | `Valid`        | `decode` returned `Done`   | queries only |
//! | `Invalid`      | `decode` returned an error | queries only |

pub mod encoder;

use crc32fast::Hasher as Crc32;

use crate::error::{Error, Result, Status};
use crate::stream_flags::{self, FlagsComparison, StreamFlags, BACKWARD_SIZE_MAX, STREAM_HEADER_SIZE};
use crate::vli::{self, VLI_BYTES_MAX, VLI_MAX};

pub use encoder::{encode_index, index_size, unpadded_index_size, IndexRecord, INDEX_INDICATOR, UNPADDED_SIZE_MIN};
use encoder::{padding_len, vli_len};

// ── Digest ───────────────────────────────────────────────────────────────────

/// Streaming digest used to fold Block sizes.
///
/// The digest never reaches the wire, so any collision-resistant hash will
/// do.  BLAKE3 is the default; CRC32 is available for callers that trade
/// collision resistance for speed.
pub trait IndexDigest: Default {
    type Output: PartialEq + AsRef<[u8]>;
    fn update(&mut self, bytes: &[u8]);
    fn finish(&self) -> Self::Output;
}

impl IndexDigest for blake3::Hasher {
    type Output = [u8; 32];

    fn update(&mut self, bytes: &[u8]) {
        blake3::Hasher::update(self, bytes);
    }

    fn finish(&self) -> [u8; 32] {
        self.finalize().into()
    }
}

impl IndexDigest for Crc32 {
    type Output = [u8; 4];

    fn update(&mut self, bytes: &[u8]) {
        Crc32::update(self, bytes);
    }

    fn finish(&self) -> [u8; 4] {
        self.clone().finalize().to_le_bytes()
    }
}

// ── Running totals ───────────────────────────────────────────────────────────

/// Counters and digest for one side of the comparison.
#[derive(Default)]
struct Totals<D> {
    /// Sum of unpadded sizes, each rounded up to a multiple of four.
    blocks_size:       u64,
    uncompressed_size: u64,
    count:             u64,
    /// Encoded size of the record list.
    list_size:         u64,
    digest:            D,
}

impl<D: IndexDigest> Totals<D> {
    fn append(&mut self, unpadded_size: u64, uncompressed_size: u64) -> Result<()> {
        if unpadded_size > VLI_MAX || uncompressed_size > VLI_MAX {
            return Err(Error::corrupt("block size is not a valid VLI"));
        }
        if unpadded_size < UNPADDED_SIZE_MIN {
            return Err(Error::corrupt(format!("unpadded size {unpadded_size} is below {UNPADDED_SIZE_MIN}")));
        }

        let blocks_size = self
            .blocks_size
            .checked_add((unpadded_size + 3) & !3)
            .filter(|&n| n <= VLI_MAX)
            .ok_or_else(|| Error::corrupt("total block size overflows"))?;
        let total_uncompressed = self
            .uncompressed_size
            .checked_add(uncompressed_size)
            .filter(|&n| n <= VLI_MAX)
            .ok_or_else(|| Error::corrupt("total uncompressed size overflows"))?;
        let count = self.count + 1;
        let list_size = self.list_size + vli_len(unpadded_size) + vli_len(uncompressed_size);

        let index = index_size(count, list_size);
        if index > BACKWARD_SIZE_MAX {
            return Err(Error::corrupt("index would exceed the backward size limit"));
        }
        if stream_size(blocks_size, index) > VLI_MAX {
            return Err(Error::corrupt("stream size overflows"));
        }

        self.fold(unpadded_size, uncompressed_size)?;
        self.blocks_size = blocks_size;
        self.uncompressed_size = total_uncompressed;
        self.count = count;
        self.list_size = list_size;
        Ok(())
    }

    /// Hash the canonical encoding of one record.
    fn fold(&mut self, unpadded_size: u64, uncompressed_size: u64) -> Result<()> {
        let mut buf = [0u8; 2 * VLI_BYTES_MAX];
        let mut pos = 0;
        vli::encode(unpadded_size, &mut buf, &mut pos)?;
        vli::encode(uncompressed_size, &mut buf, &mut pos)?;
        self.digest.update(&buf[..pos]);
        Ok(())
    }
}

fn stream_size(blocks_size: u64, index_size: u64) -> u64 {
    (2 * STREAM_HEADER_SIZE as u64)
        .saturating_add(blocks_size)
        .saturating_add(index_size)
}

// ── Validator ────────────────────────────────────────────────────────────────

/// Public view of the validator's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Accumulating,
    Hashing,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    Accumulating,
    Indicator,
    Count,
    Unpadded,
    Uncompressed,
    PaddingInit,
    Padding,
    Crc32,
    Valid,
    Invalid,
}

/// Streaming Index validator.  See the module docs.
pub struct IndexHash<D = blake3::Hasher> {
    sequence:          Sequence,
    /// Built from `append`.
    blocks:            Totals<D>,
    /// Built from the decoded Index.
    records:           Totals<D>,
    /// Records still to be read from the Index.
    remaining:         u64,
    unpadded_size:     u64,
    uncompressed_size: u64,
    /// VLI cursor, padding bytes left, or CRC32 bytes matched.
    pos:               usize,
    crc32:             Crc32,
}

impl IndexHash {
    /// Validator using BLAKE3 as the record digest.
    pub fn new() -> Self {
        Self::with_digest()
    }
}

impl Default for IndexHash {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: IndexDigest> IndexHash<D> {
    pub fn with_digest() -> Self {
        Self {
            sequence:          Sequence::Accumulating,
            blocks:            Totals::default(),
            records:           Totals::default(),
            remaining:         0,
            unpadded_size:     0,
            uncompressed_size: 0,
            pos:               0,
            crc32:             Crc32::new(),
        }
    }

    pub fn state(&self) -> IndexState {
        match self.sequence {
            Sequence::Accumulating => IndexState::Accumulating,
            Sequence::Valid        => IndexState::Valid,
            Sequence::Invalid      => IndexState::Invalid,
            _                      => IndexState::Hashing,
        }
    }

    /// Record one Block.  Only allowed before the first [`decode`](Self::decode).
    pub fn append(&mut self, unpadded_size: u64, uncompressed_size: u64) -> Result<()> {
        if self.sequence != Sequence::Accumulating {
            return Err(Error::Usage("append after index decoding has started"));
        }
        self.blocks.append(unpadded_size, uncompressed_size)
    }

    /// Number of Blocks appended so far.
    pub fn record_count(&self) -> u64 { self.blocks.count }

    /// Sum of appended unpadded sizes, each rounded up to four.
    pub fn blocks_size(&self) -> u64 { self.blocks.blocks_size }

    pub fn uncompressed_size(&self) -> u64 { self.blocks.uncompressed_size }

    /// Encoded size of the Index field implied by the appended Blocks.
    /// This is what the Stream Footer's Backward Size must equal.
    pub fn encoded_size(&self) -> u64 {
        index_size(self.blocks.count, self.blocks.list_size)
    }

    /// Size of the whole Stream: header, Blocks, Index and footer.
    pub fn stream_size(&self) -> u64 {
        stream_size(self.blocks.blocks_size, self.encoded_size())
    }

    /// Feed Index bytes from `input[*in_pos..]`.
    ///
    /// Returns [`Status::Pending`] while more bytes are needed,
    /// [`Status::NoProgress`] for empty input and [`Status::Done`] once the
    /// Index has been validated.  Any mismatch is [`Error::Corrupt`] and
    /// leaves the validator `Invalid`.  Calls after `Done` or an error are
    /// usage errors.
    pub fn decode(&mut self, input: &[u8], in_pos: &mut usize) -> Result<Status> {
        match self.sequence {
            Sequence::Valid | Sequence::Invalid => {
                return Err(Error::Usage("index hash already reached a final state"));
            }
            Sequence::Accumulating => {
                log::debug!("index hash: {} blocks appended, decoding index", self.blocks.count);
                self.sequence = Sequence::Indicator;
            }
            _ => {}
        }

        if *in_pos >= input.len() {
            return Ok(Status::NoProgress);
        }

        match self.run(input, in_pos) {
            Ok(status) => Ok(status),
            Err(err) => {
                log::warn!("index validation failed: {err}");
                self.sequence = Sequence::Invalid;
                Err(err)
            }
        }
    }

    fn run(&mut self, input: &[u8], in_pos: &mut usize) -> Result<Status> {
        // Start of the bytes this call feeds to the Index CRC32.
        let mut crc_from = (self.sequence != Sequence::Crc32).then_some(*in_pos);

        while *in_pos < input.len() {
            match self.sequence {
                Sequence::Indicator => {
                    if input[*in_pos] != INDEX_INDICATOR {
                        return Err(Error::corrupt("missing index indicator"));
                    }
                    *in_pos += 1;
                    self.sequence = Sequence::Count;
                }

                Sequence::Count => {
                    if vli::decode_partial(&mut self.remaining, &mut self.pos, input, in_pos)? != Status::Done {
                        break;
                    }
                    self.pos = 0;
                    if self.remaining != self.blocks.count {
                        return Err(Error::corrupt(format!(
                            "index lists {} records but {} blocks were seen",
                            self.remaining, self.blocks.count
                        )));
                    }
                    self.sequence = self.next_record_or_padding();
                }

                Sequence::Unpadded => {
                    if vli::decode_partial(&mut self.unpadded_size, &mut self.pos, input, in_pos)? != Status::Done {
                        break;
                    }
                    self.pos = 0;
                    self.sequence = Sequence::Uncompressed;
                }

                Sequence::Uncompressed => {
                    if vli::decode_partial(&mut self.uncompressed_size, &mut self.pos, input, in_pos)? != Status::Done {
                        break;
                    }
                    self.pos = 0;
                    self.records.append(self.unpadded_size, self.uncompressed_size)?;
                    self.remaining -= 1;
                    self.sequence = self.next_record_or_padding();
                }

                Sequence::PaddingInit => {
                    self.compare_totals()?;
                    self.pos = padding_len(unpadded_index_size(self.records.count, self.records.list_size));
                    self.sequence = Sequence::Padding;
                }

                Sequence::Padding => {
                    if self.pos > 0 {
                        if input[*in_pos] != 0x00 {
                            return Err(Error::corrupt("non-zero index padding"));
                        }
                        *in_pos += 1;
                        self.pos -= 1;
                    } else {
                        if let Some(from) = crc_from.take() {
                            self.crc32.update(&input[from..*in_pos]);
                        }
                        self.sequence = Sequence::Crc32;
                    }
                }

                Sequence::Crc32 => {
                    let expected = self.crc32.clone().finalize();
                    if input[*in_pos] != (expected >> (self.pos * 8)) as u8 {
                        return Err(Error::corrupt("index CRC32 mismatch"));
                    }
                    *in_pos += 1;
                    self.pos += 1;
                    if self.pos == 4 {
                        log::debug!("index hash: {} records verified", self.records.count);
                        self.sequence = Sequence::Valid;
                        return Ok(Status::Done);
                    }
                }

                Sequence::Accumulating | Sequence::Valid | Sequence::Invalid => {
                    return Err(Error::Usage("index hash is not decoding"));
                }
            }
        }

        if let Some(from) = crc_from {
            self.crc32.update(&input[from..*in_pos]);
        }
        Ok(Status::Pending)
    }

    fn next_record_or_padding(&self) -> Sequence {
        if self.remaining == 0 {
            Sequence::PaddingInit
        } else {
            Sequence::Unpadded
        }
    }

    fn compare_totals(&self) -> Result<()> {
        let (blocks, records) = (&self.blocks, &self.records);
        if blocks.blocks_size != records.blocks_size
            || blocks.uncompressed_size != records.uncompressed_size
            || blocks.list_size != records.list_size
        {
            return Err(Error::corrupt("index sizes do not match the blocks"));
        }
        let (expected, actual) = (blocks.digest.finish(), records.digest.finish());
        if expected != actual {
            log::warn!(
                "index digest mismatch: blocks {}, index {}",
                hex::encode(expected.as_ref()),
                hex::encode(actual.as_ref())
            );
            return Err(Error::corrupt("index records do not match the blocks"));
        }
        Ok(())
    }

    /// Cross-check the Stream Header and Footer against this Index.
    ///
    /// The two flag records must be equal and the Footer's Backward Size must
    /// equal [`encoded_size`](Self::encoded_size).  Only valid once `decode`
    /// returned `Done`; any other state is a usage error.
    pub fn check_footer(&self, header: &StreamFlags, footer: &StreamFlags) -> Result<()> {
        if self.sequence != Sequence::Valid {
            return Err(Error::Usage("footer check before the index was validated"));
        }
        if stream_flags::compare(header, footer)? == FlagsComparison::Differ {
            return Err(Error::corrupt("stream header and footer flags differ"));
        }
        let backward_size = footer
            .backward_size
            .ok_or(Error::Usage("footer flags carry no backward size"))?;
        if backward_size != self.encoded_size() {
            return Err(Error::corrupt(format!(
                "backward size {backward_size} does not match index size {}",
                self.encoded_size()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::Check;

    fn feed<D: IndexDigest>(hash: &mut IndexHash<D>, bytes: &[u8]) -> Result<Status> {
        let mut pos = 0;
        let status = hash.decode(bytes, &mut pos)?;
        if status == Status::Done {
            assert_eq!(pos, bytes.len());
        }
        Ok(status)
    }

    fn sample() -> (IndexHash, Vec<u8>) {
        let mut hash = IndexHash::new();
        hash.append(10, 20).unwrap();
        hash.append(30, 5).unwrap();
        let wire = encode_index(&[IndexRecord::new(10, 20), IndexRecord::new(30, 5)]).unwrap();
        (hash, wire)
    }

    #[test]
    fn matching_index_is_valid() {
        let (mut hash, wire) = sample();
        assert_eq!(hash.state(), IndexState::Accumulating);
        assert_eq!(hash.encoded_size(), wire.len() as u64);
        assert_eq!(feed(&mut hash, &wire).unwrap(), Status::Done);
        assert_eq!(hash.state(), IndexState::Valid);
        assert_eq!(hash.blocks_size(), 12 + 32);
        assert_eq!(hash.uncompressed_size(), 25);
    }

    #[test]
    fn empty_index_is_valid() {
        let mut hash = IndexHash::new();
        let wire = encode_index(&[]).unwrap();
        assert_eq!(hash.encoded_size(), 8);
        assert_eq!(feed(&mut hash, &wire).unwrap(), Status::Done);
    }

    #[test]
    fn any_mutation_is_corrupt() {
        let (_, wire) = sample();
        // Count, each size and every CRC byte.
        for at in [1, 2, 3, 4, 5, 8, 9, 10, 11] {
            let (mut hash, mut bad) = sample();
            bad[at] ^= 0x01;
            let err = feed(&mut hash, &bad).unwrap_err();
            assert!(matches!(err, Error::Corrupt(_)), "byte {at}");
            assert_eq!(hash.state(), IndexState::Invalid);
        }
        assert_eq!(wire.len(), 12);
    }

    #[test]
    fn different_record_order_is_corrupt() {
        let mut hash = IndexHash::new();
        hash.append(30, 5).unwrap();
        hash.append(10, 20).unwrap();
        let wire = encode_index(&[IndexRecord::new(10, 20), IndexRecord::new(30, 5)]).unwrap();
        assert!(matches!(feed(&mut hash, &wire), Err(Error::Corrupt(_))));
    }

    #[test]
    fn same_totals_different_records_is_corrupt() {
        // Sums, counts and list sizes all agree; only the digest differs.
        let mut hash = IndexHash::new();
        hash.append(12, 20).unwrap();
        hash.append(12, 5).unwrap();
        let wire = encode_index(&[IndexRecord::new(12, 5), IndexRecord::new(12, 20)]).unwrap();
        assert!(matches!(feed(&mut hash, &wire), Err(Error::Corrupt(_))));
    }

    #[test]
    fn non_zero_padding_is_corrupt() {
        let (mut hash, mut wire) = sample();
        wire[6] = 0x01;
        assert!(matches!(feed(&mut hash, &wire), Err(Error::Corrupt(_))));
    }

    #[test]
    fn missing_indicator_is_corrupt() {
        let (mut hash, mut wire) = sample();
        wire[0] = 0x02;
        assert!(matches!(feed(&mut hash, &wire), Err(Error::Corrupt(_))));
    }

    #[test]
    fn append_after_decode_is_usage_error() {
        let (mut hash, wire) = sample();
        assert_eq!(feed(&mut hash, &wire[..3]).unwrap(), Status::Pending);
        assert_eq!(hash.state(), IndexState::Hashing);
        assert!(hash.append(1, 1).unwrap_err().is_usage());

        // Even an empty first call starts hashing.
        let mut fresh = IndexHash::new();
        assert_eq!(feed(&mut fresh, &[]).unwrap(), Status::NoProgress);
        assert!(fresh.append(1, 1).unwrap_err().is_usage());
    }

    #[test]
    fn calls_after_final_state_are_usage_errors() {
        let (mut hash, wire) = sample();
        feed(&mut hash, &wire).unwrap();
        assert!(feed(&mut hash, &[0]).unwrap_err().is_usage());

        let (mut hash, mut wire) = sample();
        wire[11] ^= 0xFF;
        feed(&mut hash, &wire).unwrap_err();
        assert!(feed(&mut hash, &[0]).unwrap_err().is_usage());
    }

    #[test]
    fn byte_at_a_time() {
        let (mut hash, wire) = sample();
        for (i, byte) in wire.iter().enumerate() {
            let status = feed(&mut hash, std::slice::from_ref(byte)).unwrap();
            let expected = if i + 1 == wire.len() { Status::Done } else { Status::Pending };
            assert_eq!(status, expected, "byte {i}");
        }
    }

    #[test]
    fn crc32_digest_works_too() {
        let mut hash = IndexHash::<Crc32>::with_digest();
        hash.append(1000, 4096).unwrap();
        let wire = encode_index(&[IndexRecord::new(1000, 4096)]).unwrap();
        assert_eq!(feed(&mut hash, &wire).unwrap(), Status::Done);
    }

    #[test]
    fn append_rejects_invalid_and_overflowing_sizes() {
        let mut hash = IndexHash::new();
        assert!(matches!(hash.append(VLI_MAX + 1, 0), Err(Error::Corrupt(_))));
        assert!(matches!(hash.append(5, vli::VLI_UNKNOWN), Err(Error::Corrupt(_))));
        assert!(matches!(hash.append(4, 0), Err(Error::Corrupt(_))));
        hash.append(5, 0).unwrap();
        let mut hash = IndexHash::new();

        hash.append(100, VLI_MAX - 10).unwrap();
        assert!(matches!(hash.append(100, 11), Err(Error::Corrupt(_))));
        assert!(matches!(hash.append(VLI_MAX - 64, 0), Err(Error::Corrupt(_))));
        // Failed appends leave the totals alone.
        assert_eq!(hash.record_count(), 1);
        assert_eq!(hash.uncompressed_size(), VLI_MAX - 10);
    }

    #[test]
    fn tiny_unpadded_size_in_index_is_corrupt() {
        // A Block can't be smaller than its header plus one byte of data.
        let mut wire = vec![INDEX_INDICATOR, 0x01, 0x04, 0x00];
        let mut crc = Crc32::new();
        crc.update(&wire);
        wire.extend_from_slice(&crc.finalize().to_le_bytes());

        let mut hash = IndexHash::new();
        hash.append(5, 0).unwrap();
        let err = feed(&mut hash, &wire).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
        assert_eq!(hash.state(), IndexState::Invalid);
    }

    #[test]
    fn footer_check_needs_a_validated_index() {
        let (mut hash, wire) = sample();
        let header = StreamFlags::new(Check::Crc64);
        let footer = StreamFlags::with_backward_size(Check::Crc64, wire.len() as u64);
        assert!(hash.check_footer(&header, &footer).unwrap_err().is_usage());

        feed(&mut hash, &wire[..5]).unwrap();
        assert!(hash.check_footer(&header, &footer).unwrap_err().is_usage());

        feed(&mut hash, &wire[5..]).unwrap();
        hash.check_footer(&header, &footer).unwrap();
    }

    #[test]
    fn footer_cross_check() {
        let (mut hash, wire) = sample();
        feed(&mut hash, &wire).unwrap();
        let header = StreamFlags::new(Check::Crc64);
        let footer = StreamFlags::with_backward_size(Check::Crc64, wire.len() as u64);
        hash.check_footer(&header, &footer).unwrap();

        let wrong_size = StreamFlags::with_backward_size(Check::Crc64, 16);
        assert!(matches!(hash.check_footer(&header, &wrong_size), Err(Error::Corrupt(_))));
        let wrong_check = StreamFlags::with_backward_size(Check::Crc32, 12);
        assert!(matches!(hash.check_footer(&header, &wrong_check), Err(Error::Corrupt(_))));
    }
}
