//! Filter ids, the properties registry, and bounded filter chains.
//!
//! # Identity rules
//! A filter is identified on the wire by a VLI id.  Ids at or above
//! [`FILTER_RESERVED_START`] are reserved and never valid in a chain, and
//! [`VLI_UNKNOWN`] is the old chain terminator which a [`FilterChain`] never
//! stores.
//!
//! # Properties
//! This crate treats a filter's options as an opaque properties blob.  Only
//! its length is checked, by a [`FilterRegistry`] keyed by filter id.  What
//! the bytes mean is up to the filter implementation, which lives elsewhere.

pub mod flags;

use crate::error::{Error, Result};
use crate::vli::VLI_UNKNOWN;

pub use flags::{chain_size, decode, decode_chain, encode, encode_chain, flags_size};

/// Longest filter chain a Block may declare.
pub const FILTERS_MAX: usize = 4;
/// First reserved filter id (`2^62`).
pub const FILTER_RESERVED_START: u64 = 1 << 62;

// ── Filter ids ───────────────────────────────────────────────────────────────

pub const ID_LZMA1:     u64 = 0x4000_0000_0000_0001;
pub const ID_LZMA2:     u64 = 0x21;
pub const ID_DELTA:     u64 = 0x03;
pub const ID_X86:       u64 = 0x04;
pub const ID_POWERPC:   u64 = 0x05;
pub const ID_IA64:      u64 = 0x06;
pub const ID_ARM:       u64 = 0x07;
pub const ID_ARMTHUMB:  u64 = 0x08;
pub const ID_SPARC:     u64 = 0x09;
pub const ID_ARM64:     u64 = 0x0A;
pub const ID_RISCV:     u64 = 0x0B;

/// Filters this build knows the properties layout of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterId {
    Lzma1,
    Lzma2,
    Delta,
    X86,
    PowerPc,
    Ia64,
    Arm,
    ArmThumb,
    Sparc,
    Arm64,
    RiscV,
}

impl FilterId {
    #[inline]
    pub fn id(self) -> u64 {
        match self {
            FilterId::Lzma1    => ID_LZMA1,
            FilterId::Lzma2    => ID_LZMA2,
            FilterId::Delta    => ID_DELTA,
            FilterId::X86      => ID_X86,
            FilterId::PowerPc  => ID_POWERPC,
            FilterId::Ia64     => ID_IA64,
            FilterId::Arm      => ID_ARM,
            FilterId::ArmThumb => ID_ARMTHUMB,
            FilterId::Sparc    => ID_SPARC,
            FilterId::Arm64    => ID_ARM64,
            FilterId::RiscV    => ID_RISCV,
        }
    }

    /// Returns `None` if the id is not recognised by this build.
    pub fn from_id(id: u64) -> Option<Self> {
        match id {
            ID_LZMA1    => Some(FilterId::Lzma1),
            ID_LZMA2    => Some(FilterId::Lzma2),
            ID_DELTA    => Some(FilterId::Delta),
            ID_X86      => Some(FilterId::X86),
            ID_POWERPC  => Some(FilterId::PowerPc),
            ID_IA64     => Some(FilterId::Ia64),
            ID_ARM      => Some(FilterId::Arm),
            ID_ARMTHUMB => Some(FilterId::ArmThumb),
            ID_SPARC    => Some(FilterId::Sparc),
            ID_ARM64    => Some(FilterId::Arm64),
            ID_RISCV    => Some(FilterId::RiscV),
            _           => None,
        }
    }

    /// Human-readable name (diagnostics only, never parsed).
    pub fn name(self) -> &'static str {
        match self {
            FilterId::Lzma1    => "lzma1",
            FilterId::Lzma2    => "lzma2",
            FilterId::Delta    => "delta",
            FilterId::X86      => "x86",
            FilterId::PowerPc  => "powerpc",
            FilterId::Ia64     => "ia64",
            FilterId::Arm      => "arm",
            FilterId::ArmThumb => "armthumb",
            FilterId::Sparc    => "sparc",
            FilterId::Arm64    => "arm64",
            FilterId::RiscV    => "riscv",
        }
    }
}

// ── Properties trait ─────────────────────────────────────────────────────────

/// Reports how many properties bytes a filter's options encode to.
pub trait FilterProperties: Send + Sync {
    /// Size of the properties blob for `options`.  A blob this filter can't
    /// have is [`Error::UnsupportedOptions`].
    fn properties_size(&self, options: Option<&[u8]>) -> Result<u64>;
}

/// Filters whose properties are a fixed number of bytes (LZMA1, LZMA2, Delta).
pub struct FixedProperties {
    id:   FilterId,
    size: u64,
}

impl FilterProperties for FixedProperties {
    fn properties_size(&self, options: Option<&[u8]>) -> Result<u64> {
        let options = options.ok_or(Error::Usage("filter requires options"))?;
        if options.len() as u64 != self.size {
            return Err(Error::unsupported(format!(
                "{} properties must be {} bytes, got {}",
                self.id.name(), self.size, options.len()
            )));
        }
        Ok(self.size)
    }
}

/// Branch/call/jump filters: no properties, or a 4-byte start offset.
pub struct BcjProperties(FilterId);

impl FilterProperties for BcjProperties {
    fn properties_size(&self, options: Option<&[u8]>) -> Result<u64> {
        match options.map(<[u8]>::len) {
            None | Some(0) => Ok(0),
            Some(4)        => Ok(4),
            Some(n)        => Err(Error::unsupported(format!(
                "{} properties must be 0 or 4 bytes, got {n}",
                self.0.name()
            ))),
        }
    }
}

/// Resolve a recognised filter to its properties handler.
pub fn get_filter(id: FilterId) -> Box<dyn FilterProperties> {
    match id {
        FilterId::Lzma1 => Box::new(FixedProperties { id, size: 5 }),
        FilterId::Lzma2 => Box::new(FixedProperties { id, size: 1 }),
        FilterId::Delta => Box::new(FixedProperties { id, size: 1 }),
        other           => Box::new(BcjProperties(other)),
    }
}

/// Resolve a raw wire id.
///
/// Returns `Err(Error::UnsupportedOptions)` if the id is not recognised.
pub fn get_filter_by_id(id: u64) -> Result<Box<dyn FilterProperties>> {
    FilterId::from_id(id)
        .map(get_filter)
        .ok_or_else(|| Error::unsupported(format!("unknown filter id {id:#x}")))
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Maps a filter id to its properties size.  Pass [`BuiltinFilters`] unless
/// the application registers filters of its own.
///
/// Callers ask [`is_supported`](Self::is_supported) first; `properties_size`
/// is only consulted for supported ids.
pub trait FilterRegistry {
    fn properties_size(&self, id: u64, options: Option<&[u8]>) -> Result<u64>;
    fn is_supported(&self, id: u64) -> bool;
}

/// `properties_size` for an id the registry claims, or `UnsupportedOptions`.
pub(crate) fn supported_properties_size(
    registry: &dyn FilterRegistry,
    id:       u64,
    options:  Option<&[u8]>,
) -> Result<u64> {
    if !registry.is_supported(id) {
        return Err(Error::unsupported(format!("unknown filter id {id:#x}")));
    }
    registry.properties_size(id, options)
}

/// Registry backed by [`get_filter_by_id`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFilters;

impl FilterRegistry for BuiltinFilters {
    fn properties_size(&self, id: u64, options: Option<&[u8]>) -> Result<u64> {
        get_filter_by_id(id)?.properties_size(options)
    }

    fn is_supported(&self, id: u64) -> bool {
        FilterId::from_id(id).is_some()
    }
}

// ── Filter and chain ─────────────────────────────────────────────────────────

/// One stage of a filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub id:      u64,
    /// Opaque properties blob.  `None` when the filter takes no properties.
    pub options: Option<Vec<u8>>,
}

impl Filter {
    pub fn new(id: u64, options: Option<Vec<u8>>) -> Self {
        Self { id, options }
    }

    #[inline]
    pub fn options(&self) -> Option<&[u8]> {
        self.options.as_deref()
    }
}

/// Ordered filter pipeline with at most [`FILTERS_MAX`] entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_filters(filters: Vec<Filter>) -> Result<Self> {
        if filters.len() > FILTERS_MAX {
            return Err(Error::Usage("filter chain longer than four entries"));
        }
        if filters.iter().any(|f| f.id == VLI_UNKNOWN) {
            return Err(Error::Usage("terminator id inside a filter chain"));
        }
        Ok(Self { filters })
    }

    pub fn push(&mut self, filter: Filter) -> Result<()> {
        if self.filters.len() == FILTERS_MAX {
            return Err(Error::Usage("filter chain longer than four entries"));
        }
        if filter.id == VLI_UNKNOWN {
            return Err(Error::Usage("terminator id inside a filter chain"));
        }
        self.filters.push(filter);
        Ok(())
    }

    pub fn len(&self) -> usize { self.filters.len() }

    pub fn is_empty(&self) -> bool { self.filters.is_empty() }

    pub fn get(&self, index: usize) -> Option<&Filter> { self.filters.get(index) }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> { self.filters.iter() }

    pub fn as_slice(&self) -> &[Filter] { &self.filters }

    /// Deep copy, checking every options blob against `registry`.
    ///
    /// A filter that carries options must be supported by the registry, and
    /// the registry must agree on the blob's length.  A filter without
    /// options is copied as-is even if its id is unknown.
    pub fn try_clone(&self, registry: &dyn FilterRegistry) -> Result<Self> {
        let mut filters = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            let options = match filter.options() {
                Some(opts) => {
                    let size = supported_properties_size(registry, filter.id, Some(opts))?;
                    if size != opts.len() as u64 {
                        return Err(Error::unsupported(format!(
                            "filter {:#x} reports {size} properties bytes for a {}-byte blob",
                            filter.id,
                            opts.len()
                        )));
                    }
                    Some(opts.to_vec())
                }
                None => None,
            };
            filters.push(Filter { id: filter.id, options });
        }
        Ok(Self { filters })
    }
}

impl<'a> IntoIterator for &'a FilterChain {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.filters.iter()
    }
}

/// Copy `src` into `dst`.  On error `dst` is left untouched.
pub fn filters_copy(src: &FilterChain, dst: &mut FilterChain, registry: &dyn FilterRegistry) -> Result<()> {
    *dst = src.try_clone(registry)?;
    Ok(())
}
