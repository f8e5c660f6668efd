//! Filter Flags wire codec.
//!
//! ```text
//! VLI(filter id) | VLI(properties length) | properties bytes
//! ```
//!
//! A Block Header lists one Filter Flags record per chain entry, back to
//! back; the entry count is stored elsewhere in the header.

use crate::error::{Error, Result};
use crate::filter::{supported_properties_size, Filter, FilterChain, FilterRegistry, FILTERS_MAX, FILTER_RESERVED_START};
use crate::vli;

/// Encoded size of one Filter Flags record.
pub fn flags_size(filter: &Filter, registry: &dyn FilterRegistry) -> Result<usize> {
    Ok(checked_layout(filter, registry)?.total)
}

struct Layout {
    props: usize,
    total: usize,
}

fn checked_layout(filter: &Filter, registry: &dyn FilterRegistry) -> Result<Layout> {
    if filter.id >= FILTER_RESERVED_START {
        return Err(Error::Usage("reserved filter id"));
    }
    let id_len = vli::encoded_size(filter.id).ok_or(Error::Usage("reserved filter id"))?;

    let props = supported_properties_size(registry, filter.id, filter.options())?;
    let props_len = vli::encoded_size(props)
        .ok_or_else(|| Error::unsupported(format!("properties size {props} is not a valid VLI")))?;
    let blob_len = filter.options().map_or(0, <[u8]>::len);
    if blob_len as u64 != props {
        return Err(Error::unsupported(format!(
            "filter {:#x} reports {props} properties bytes for a {blob_len}-byte blob",
            filter.id
        )));
    }

    Ok(Layout { props: blob_len, total: id_len + props_len + blob_len })
}

/// Encode one record into `out[*out_pos..]`.  Nothing is written unless the
/// whole record fits.
pub fn encode(
    filter:   &Filter,
    registry: &dyn FilterRegistry,
    out:      &mut [u8],
    out_pos:  &mut usize,
) -> Result<()> {
    let layout = checked_layout(filter, registry)?;
    let available = out.len().saturating_sub(*out_pos);
    if available < layout.total {
        return Err(Error::BufferTooSmall { needed: layout.total, available });
    }

    vli::encode(filter.id, out, out_pos)?;
    vli::encode(layout.props as u64, out, out_pos)?;
    if let Some(props) = filter.options() {
        out[*out_pos..*out_pos + props.len()].copy_from_slice(props);
        *out_pos += props.len();
    }
    Ok(())
}

/// Decode one record from `input[*in_pos..]`.  `*in_pos` only moves on
/// success.
pub fn decode(registry: &dyn FilterRegistry, input: &[u8], in_pos: &mut usize) -> Result<Filter> {
    let mut pos = *in_pos;

    let id = vli::decode(input, &mut pos)?;
    if id >= FILTER_RESERVED_START {
        return Err(Error::corrupt(format!("reserved filter id {id:#x}")));
    }

    let props = vli::decode(input, &mut pos)?;
    let remaining = (input.len() - pos) as u64;
    if props > remaining {
        return Err(Error::corrupt(format!(
            "filter properties length {props} runs past the end ({remaining} bytes left)"
        )));
    }
    let blob = &input[pos..pos + props as usize];

    if supported_properties_size(registry, id, Some(blob))? != props {
        return Err(Error::unsupported(format!("filter {id:#x} rejects a {props}-byte blob")));
    }

    pos += blob.len();
    *in_pos = pos;
    let options = (!blob.is_empty()).then(|| blob.to_vec());
    Ok(Filter { id, options })
}

/// Encoded size of every record in `chain`.
pub fn chain_size(chain: &FilterChain, registry: &dyn FilterRegistry) -> Result<usize> {
    chain.iter().map(|f| flags_size(f, registry)).sum()
}

/// Encode a whole chain.  An empty chain is a usage error: every Block has
/// at least one filter.
pub fn encode_chain(
    chain:    &FilterChain,
    registry: &dyn FilterRegistry,
    out:      &mut [u8],
    out_pos:  &mut usize,
) -> Result<()> {
    if chain.is_empty() {
        return Err(Error::Usage("empty filter chain"));
    }
    let needed = chain_size(chain, registry)?;
    let available = out.len().saturating_sub(*out_pos);
    if available < needed {
        return Err(Error::BufferTooSmall { needed, available });
    }
    for filter in chain {
        encode(filter, registry, out, out_pos)?;
    }
    Ok(())
}

/// Decode `count` consecutive records into a chain.
pub fn decode_chain(
    registry: &dyn FilterRegistry,
    count:    usize,
    input:    &[u8],
    in_pos:   &mut usize,
) -> Result<FilterChain> {
    if count == 0 || count > FILTERS_MAX {
        return Err(Error::Usage("filter count must be 1 to 4"));
    }
    let mut pos = *in_pos;
    let mut chain = FilterChain::new();
    for _ in 0..count {
        chain.push(decode(registry, input, &mut pos)?)?;
    }
    *in_pos = pos;
    Ok(chain)
}
