//! Integrity-check kinds named by the Stream Flags.
//!
//! The check id occupies four bits on the wire, so ids `0..=15` are all
//! representable.  Only four are assigned; the rest are reserved but still
//! have a defined digest size so a decoder can skip over them.

/// Highest check id that fits in the Stream Flags.
pub const CHECK_ID_MAX: u8 = 15;

/// Integrity check applied to each Block's uncompressed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    None,
    Crc32,
    Crc64,
    Sha256,
    /// Any other id.  Values above [`CHECK_ID_MAX`] are invalid.
    Reserved(u8),
}

impl Check {
    /// Resolve a wire id.  Returns `None` above [`CHECK_ID_MAX`].
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x00 => Some(Check::None),
            0x01 => Some(Check::Crc32),
            0x04 => Some(Check::Crc64),
            0x0A => Some(Check::Sha256),
            id if id <= CHECK_ID_MAX => Some(Check::Reserved(id)),
            _ => None,
        }
    }

    #[inline]
    pub fn id(self) -> u8 {
        match self {
            Check::None        => 0x00,
            Check::Crc32       => 0x01,
            Check::Crc64       => 0x04,
            Check::Sha256      => 0x0A,
            Check::Reserved(n) => n,
        }
    }

    /// `false` only for a `Reserved` id above [`CHECK_ID_MAX`].
    #[inline]
    pub fn is_valid(self) -> bool {
        self.id() <= CHECK_ID_MAX
    }

    /// `true` for the four assigned kinds.
    pub fn is_supported(self) -> bool {
        !matches!(self, Check::Reserved(_))
    }

    /// Digest size in bytes, or `None` for an invalid id.
    pub fn size(self) -> Option<usize> {
        const SIZES: [usize; 16] = [0, 4, 4, 4, 8, 8, 8, 16, 16, 16, 32, 32, 32, 64, 64, 64];
        SIZES.get(self.id() as usize).copied()
    }

    /// Human-readable name (diagnostics only).
    pub fn name(self) -> &'static str {
        match self {
            Check::None        => "none",
            Check::Crc32       => "crc32",
            Check::Crc64       => "crc64",
            Check::Sha256      => "sha256",
            Check::Reserved(_) => "reserved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_roundtrip() {
        for id in 0..=CHECK_ID_MAX {
            assert_eq!(Check::from_id(id).unwrap().id(), id);
        }
        assert_eq!(Check::from_id(16), None);
        assert_eq!(Check::from_id(4), Some(Check::Crc64));
    }

    #[test]
    fn sizes() {
        assert_eq!(Check::None.size(), Some(0));
        assert_eq!(Check::Crc32.size(), Some(4));
        assert_eq!(Check::Crc64.size(), Some(8));
        assert_eq!(Check::Sha256.size(), Some(32));
        assert_eq!(Check::Reserved(15).size(), Some(64));
        assert_eq!(Check::Reserved(16).size(), None);
        assert!(!Check::Reserved(16).is_valid());
        assert!(!Check::Reserved(2).is_supported());
    }
}
