use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use proptest::prelude::*;
use tempfile::NamedTempFile;
use xzmeta::index::{encode_index, IndexRecord};
use xzmeta::stream_flags::STREAM_HEADER_SIZE;
use xzmeta::vli::{self, VLI_MAX};
use xzmeta::{Check, Error, IndexHash, IndexState, Status, StreamFlags};

/// `xz` output for an empty input with the default CRC64 check.
const EMPTY_XZ: [u8; 32] = [
    0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00, 0x04, 0xE6, 0xD6, 0xB4, 0x46,
    0x00, 0x00, 0x00, 0x00, 0x1C, 0xDF, 0x44, 0x21,
    0x1F, 0xB6, 0xF3, 0x7D, 0x01, 0x00, 0x00, 0x00, 0x00, 0x04, 0x59, 0x5A,
];

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write header, placeholder Blocks, Index and footer for `records`.
fn write_stream<W: Write>(mut w: W, check: Check, records: &[IndexRecord]) -> xzmeta::Result<()> {
    StreamFlags::new(check).write_header(&mut w)?;
    for r in records {
        let padded = ((r.unpadded_size + 3) & !3) as usize;
        w.write_all(&vec![0xA5; padded])?;
    }
    let index = encode_index(records)?;
    w.write_all(&index)?;
    StreamFlags::with_backward_size(check, index.len() as u64).write_footer(&mut w)?;
    Ok(())
}

/// Validate the tail of a single-Stream file against the Block sizes the
/// caller saw, feeding the Index in `chunk`-byte pieces.
fn validate_stream(file: &mut File, blocks: &[IndexRecord], chunk: usize) -> xzmeta::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    let header = StreamFlags::read_header(&mut *file)?;

    file.seek(SeekFrom::End(-(STREAM_HEADER_SIZE as i64)))?;
    let footer = StreamFlags::read_footer(&mut *file)?;
    let backward_size = footer.backward_size.ok_or(Error::Usage("footer without size"))?;

    let mut hash = IndexHash::new();
    for b in blocks {
        hash.append(b.unpadded_size, b.uncompressed_size)?;
    }

    file.seek(SeekFrom::End(-(STREAM_HEADER_SIZE as i64) - backward_size as i64))?;
    let mut index = vec![0u8; backward_size as usize];
    file.read_exact(&mut index)?;

    let mut status = Status::NoProgress;
    for piece in index.chunks(chunk) {
        let mut pos = 0;
        status = hash.decode(piece, &mut pos)?;
        assert_eq!(pos, piece.len());
    }
    assert_eq!(status, Status::Done);
    assert_eq!(hash.state(), IndexState::Valid);
    hash.check_footer(&header, &footer)
}

#[test]
fn empty_xz_file_validates() {
    init_logging();
    let header = StreamFlags::decode_header(EMPTY_XZ[..12].try_into().unwrap()).unwrap();
    let footer = StreamFlags::decode_footer(EMPTY_XZ[20..].try_into().unwrap()).unwrap();
    assert_eq!(header.check, Check::Crc64);
    assert_eq!(footer.backward_size, Some(8));

    let mut hash = IndexHash::new();
    let mut pos = 0;
    assert_eq!(hash.decode(&EMPTY_XZ[12..20], &mut pos).unwrap(), Status::Done);
    hash.check_footer(&header, &footer).unwrap();

    // The producer side emits the same bytes.
    let mut produced = Vec::new();
    write_stream(&mut produced, Check::Crc64, &[]).unwrap();
    assert_eq!(produced, EMPTY_XZ);
}

#[test]
fn stream_roundtrip_through_file() {
    init_logging();
    let blocks = vec![
        IndexRecord::new(10, 20),
        IndexRecord::new(30, 5),
        IndexRecord::new(70_000, 1 << 20),
        IndexRecord::new(129, 0),
    ];

    let temp = NamedTempFile::new().unwrap();
    write_stream(File::create(temp.path()).unwrap(), Check::Sha256, &blocks).unwrap();

    for chunk in [1, 3, 1024] {
        let mut file = File::open(temp.path()).unwrap();
        validate_stream(&mut file, &blocks, chunk).unwrap();
    }
}

#[test]
fn missing_block_is_detected() {
    init_logging();
    let written = vec![IndexRecord::new(10, 20), IndexRecord::new(30, 5)];
    let temp = NamedTempFile::new().unwrap();
    write_stream(File::create(temp.path()).unwrap(), Check::Crc32, &written).unwrap();

    let mut file = File::open(temp.path()).unwrap();
    let err = validate_stream(&mut file, &written[..1], 4).unwrap_err();
    assert!(matches!(err, Error::Corrupt(_)));
}

#[test]
fn corrupted_footer_is_detected() {
    init_logging();
    let blocks = vec![IndexRecord::new(64, 64)];
    let mut bytes = Vec::new();
    write_stream(&mut bytes, Check::Crc32, &blocks).unwrap();
    let n = bytes.len();
    bytes[n - 7] ^= 0x40;

    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(&bytes).unwrap();
    let mut file = temp.reopen().unwrap();
    let err = validate_stream(&mut file, &blocks, 8).unwrap_err();
    assert!(matches!(err, Error::Corrupt(_)));
}

#[test]
fn truncated_file_is_io_error() {
    let mut bytes = Vec::new();
    write_stream(&mut bytes, Check::None, &[]).unwrap();
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(&bytes[..6]).unwrap();
    let mut file = temp.reopen().unwrap();
    assert!(matches!(StreamFlags::read_header(&mut file), Err(Error::Io(_))));
}

proptest! {
    #[test]
    fn vli_roundtrip(value in 0..=VLI_MAX) {
        let mut out = Vec::new();
        vli::encode_to_vec(value, &mut out).unwrap();
        prop_assert_eq!(Some(out.len()), vli::encoded_size(value));
        let mut pos = 0;
        prop_assert_eq!(vli::decode(&out, &mut pos).unwrap(), value);
        prop_assert_eq!(pos, out.len());
    }

    #[test]
    fn index_accepts_any_chunking(
        sizes in proptest::collection::vec((5u64..1 << 40, 0u64..1 << 50), 0..40),
        chunk in 1usize..17,
    ) {
        let records: Vec<_> = sizes.iter().map(|&(u, c)| IndexRecord::new(u, c)).collect();
        let wire = encode_index(&records).unwrap();

        let mut hash = IndexHash::new();
        for r in &records {
            hash.append(r.unpadded_size, r.uncompressed_size).unwrap();
        }
        prop_assert_eq!(hash.encoded_size(), wire.len() as u64);

        let mut last = Status::NoProgress;
        for piece in wire.chunks(chunk) {
            let mut pos = 0;
            last = hash.decode(piece, &mut pos).unwrap();
        }
        prop_assert_eq!(last, Status::Done);
    }
}
