//! Address lookup through the `.debug_addr` section.

use crate::common::{Error, Result};
use crate::cursor::EndianCursor;
use crate::endianity::Endianity;

/// Fetch element `index` of the address set whose `DW_AT_addr_base` is
/// `addr_base`.
///
/// `addr_base` points just past the set's header, so the header fields are
/// validated by reading backwards from it: the version two-byte field at
/// `addr_base - 4` must be 5, the address size lives at `addr_base - 2`, and
/// the segment selector size at `addr_base - 1`. Elements are
/// `address_size + segment_size` bytes apart.
pub(crate) fn read_debug_addr<Endian>(
    debug_addr: &[u8],
    endian: Endian,
    addr_base: u64,
    index: u64,
) -> Result<u64>
where
    Endian: Endianity,
{
    if addr_base < 8 {
        return Err(Error::OffsetOutOfBounds(addr_base));
    }
    let addr_base_pos = usize::try_from(addr_base).map_err(|_| Error::Overflow)?;
    if addr_base_pos > debug_addr.len() {
        return Err(Error::OffsetOutOfBounds(addr_base));
    }

    let mut cursor = EndianCursor::new(debug_addr, endian);
    cursor.seek_to(addr_base_pos - 4)?;
    let version = cursor.read_u16()?;
    if version != 5 {
        return Err(Error::UnknownVersion(u64::from(version)));
    }
    let address_size = cursor.read_u8()?;
    let segment_size = cursor.read_u8()?;

    let stride = u64::from(address_size) + u64::from(segment_size);
    let element = addr_base
        .checked_add(stride.checked_mul(index).ok_or(Error::Overflow)?)
        .ok_or(Error::Overflow)?;
    cursor.seek_to(usize::try_from(element).map_err(|_| Error::Overflow)?)?;
    cursor.read_address(address_size)
}
