//! An iterator over the address ranges of a compilation unit or function.
//!
//! DWARF versions before 5 store range lists in `.debug_ranges` as pairs of
//! address-sized words; version 5 stores them in `.debug_rnglists` as tagged
//! entries, some of which index `.debug_addr`. This iterator folds base
//! address handling for both encodings and only yields resolved ranges.

use std::mem;

use fallible_iterator::FallibleIterator;

use crate::addr::read_debug_addr;
use crate::common::{Error, Format, Result};
use crate::constants;
use crate::cursor::EndianCursor;
use crate::endianity::Endianity;
use crate::unit::PcRange;

/// Resolve a `DW_FORM_rnglistx` index to an offset within `.debug_rnglists`.
///
/// The offset table starts at `rnglists_base` with one format-sized slot per
/// index; each slot holds an offset relative to `rnglists_base`.
pub(crate) fn resolve_rnglistx<Endian>(
    debug_rnglists: &[u8],
    endian: Endian,
    format: Format,
    rnglists_base: u64,
    index: u64,
) -> Result<u64>
where
    Endian: Endianity,
{
    let slot_size = u64::from(format.word_size());
    let slot = rnglists_base
        .checked_add(index.checked_mul(slot_size).ok_or(Error::Overflow)?)
        .ok_or(Error::Overflow)?;
    let mut cursor = EndianCursor::new(debug_rnglists, endian);
    cursor.seek_to(usize::try_from(slot).map_err(|_| Error::Overflow)?)?;
    let offset = cursor.read_offset(format)?;
    rnglists_base.checked_add(offset).ok_or(Error::Overflow)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeListEncoding {
    /// `.debug_ranges` address pairs (DWARF 2-4).
    Pairs,
    /// `.debug_rnglists` tagged entries (DWARF 5).
    Tagged,
}

/// An iterator over one entity's address ranges.
#[derive(Debug)]
pub struct RangeIter<'input, Endian>
where
    Endian: Endianity,
{
    cursor: EndianCursor<'input, Endian>,
    encoding: RangeListEncoding,
    base_address: u64,
    debug_addr: Option<&'input [u8]>,
    addr_base: u64,
    done: bool,
}

impl<'input, Endian> RangeIter<'input, Endian>
where
    Endian: Endianity,
{
    /// Construct an iterator over the range list at `offset` in `section`.
    ///
    /// `section` must be `.debug_ranges` for unit versions below 5 and
    /// `.debug_rnglists` otherwise. `base_address` is the unit's
    /// `DW_AT_low_pc` (or 0 when absent); `debug_addr` and `addr_base`
    /// resolve the `*x` entry kinds.
    pub(crate) fn new(
        section: &'input [u8],
        endian: Endian,
        version: u16,
        offset: u64,
        base_address: u64,
        debug_addr: Option<&'input [u8]>,
        addr_base: u64,
    ) -> Result<Self> {
        let mut cursor = EndianCursor::new(section, endian);
        cursor.seek_to(usize::try_from(offset).map_err(|_| Error::Overflow)?)?;
        Ok(RangeIter {
            cursor,
            encoding: if version < 5 {
                RangeListEncoding::Pairs
            } else {
                RangeListEncoding::Tagged
            },
            base_address,
            debug_addr,
            addr_base,
            done: false,
        })
    }

    /// Advance to the next range.
    pub fn next(&mut self) -> Result<Option<PcRange>> {
        if self.done {
            return Ok(None);
        }
        match self.next_inner() {
            Ok(Some(range)) => {
                if range.start > range.end {
                    self.done = true;
                    return Err(Error::InvalidAddressRange);
                }
                Ok(Some(range))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    fn next_inner(&mut self) -> Result<Option<PcRange>> {
        loop {
            let range = match self.encoding {
                RangeListEncoding::Pairs => {
                    let start = self.cursor.read_native_address()?;
                    let end = self.cursor.read_native_address()?;
                    if start == 0 && end == 0 {
                        return Ok(None);
                    }
                    if start == max_native_address() {
                        // A base-address selection entry.
                        self.base_address = end;
                        continue;
                    }
                    PcRange {
                        start: self.base_address.wrapping_add(start),
                        end: self.base_address.wrapping_add(end),
                    }
                }
                RangeListEncoding::Tagged => {
                    match constants::DwRle(self.cursor.read_u8()?) {
                        constants::DW_RLE_end_of_list => return Ok(None),
                        constants::DW_RLE_base_addressx => {
                            let index = self.cursor.read_uleb128()?;
                            self.base_address = self.read_addr_index(index)?;
                            continue;
                        }
                        constants::DW_RLE_startx_endx => {
                            let start = self.cursor.read_uleb128()?;
                            let end = self.cursor.read_uleb128()?;
                            PcRange {
                                start: self.read_addr_index(start)?,
                                end: self.read_addr_index(end)?,
                            }
                        }
                        constants::DW_RLE_startx_length => {
                            let start = self.cursor.read_uleb128()?;
                            let length = self.cursor.read_uleb128()?;
                            let start = self.read_addr_index(start)?;
                            PcRange {
                                start,
                                end: start.wrapping_add(length),
                            }
                        }
                        constants::DW_RLE_offset_pair => {
                            let start = self.cursor.read_uleb128()?;
                            let end = self.cursor.read_uleb128()?;
                            PcRange {
                                start: self.base_address.wrapping_add(start),
                                end: self.base_address.wrapping_add(end),
                            }
                        }
                        constants::DW_RLE_base_address => {
                            self.base_address = self.cursor.read_native_address()?;
                            continue;
                        }
                        constants::DW_RLE_start_end => {
                            let start = self.cursor.read_native_address()?;
                            let end = self.cursor.read_native_address()?;
                            PcRange { start, end }
                        }
                        constants::DW_RLE_start_length => {
                            let start = self.cursor.read_native_address()?;
                            let length = self.cursor.read_uleb128()?;
                            PcRange {
                                start,
                                end: start.wrapping_add(length),
                            }
                        }
                        otherwise => return Err(Error::UnknownRangeListsEntry(otherwise)),
                    }
                }
            };
            return Ok(Some(range));
        }
    }

    fn read_addr_index(&self, index: u64) -> Result<u64> {
        let debug_addr = self.debug_addr.ok_or(Error::MissingDebugInfo)?;
        read_debug_addr(debug_addr, self.cursor.endian(), self.addr_base, index)
    }
}

impl<'input, Endian> FallibleIterator for RangeIter<'input, Endian>
where
    Endian: Endianity,
{
    type Item = PcRange;
    type Error = Error;

    fn next(&mut self) -> Result<Option<PcRange>> {
        RangeIter::next(self)
    }
}

#[inline]
fn max_native_address() -> u64 {
    u64::MAX >> (64 - 8 * mem::size_of::<usize>() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endianity::NativeEndian;

    fn word(buf: &mut Vec<u8>, value: usize) {
        buf.extend_from_slice(&value.to_ne_bytes());
    }

    fn uleb(buf: &mut Vec<u8>, value: u64) {
        leb128::write::unsigned(buf, value).unwrap();
    }

    #[test]
    fn test_pairs_with_base_update() {
        let mut buf = Vec::new();
        // (0x10, 0x20) relative to the initial base.
        word(&mut buf, 0x10);
        word(&mut buf, 0x20);
        // Base selection: (MAX, 0x2000).
        word(&mut buf, usize::MAX);
        word(&mut buf, 0x2000);
        // (0x1, 0x2) relative to the new base.
        word(&mut buf, 0x1);
        word(&mut buf, 0x2);
        // Terminator.
        word(&mut buf, 0);
        word(&mut buf, 0);

        let mut iter =
            RangeIter::new(&buf, NativeEndian::default(), 4, 0, 0x1000, None, 0).unwrap();
        assert_eq!(
            iter.next().unwrap(),
            Some(PcRange {
                start: 0x1010,
                end: 0x1020
            })
        );
        assert_eq!(
            iter.next().unwrap(),
            Some(PcRange {
                start: 0x2001,
                end: 0x2002
            })
        );
        assert_eq!(iter.next().unwrap(), None);
        // Exhausted iterators stay exhausted.
        assert_eq!(iter.next().unwrap(), None);
    }

    fn debug_addr_section(addresses: &[u64]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0; 4]);
        let version_bytes = 5u16.to_ne_bytes();
        buf.extend_from_slice(&version_bytes);
        buf.push(std::mem::size_of::<usize>() as u8);
        buf.push(0);
        for addr in addresses {
            word(&mut buf, *addr as usize);
        }
        buf
    }

    #[test]
    fn test_tagged_entries() {
        let debug_addr = debug_addr_section(&[0x4000, 0x5000]);

        let mut buf = Vec::new();
        // base_addressx 0 -> 0x4000.
        buf.push(constants::DW_RLE_base_addressx.0);
        uleb(&mut buf, 0);
        // offset_pair (0x10, 0x30).
        buf.push(constants::DW_RLE_offset_pair.0);
        uleb(&mut buf, 0x10);
        uleb(&mut buf, 0x30);
        // start_length (0x9000, 0x100).
        buf.push(constants::DW_RLE_start_length.0);
        word(&mut buf, 0x9000);
        uleb(&mut buf, 0x100);
        // end_of_list.
        buf.push(constants::DW_RLE_end_of_list.0);

        let mut iter =
            RangeIter::new(&buf, NativeEndian::default(), 5, 0, 0, Some(&debug_addr), 8).unwrap();
        assert_eq!(
            iter.next().unwrap(),
            Some(PcRange {
                start: 0x4010,
                end: 0x4030
            })
        );
        assert_eq!(
            iter.next().unwrap(),
            Some(PcRange {
                start: 0x9000,
                end: 0x9100
            })
        );
        assert_eq!(iter.next().unwrap(), None);
    }

    #[test]
    fn test_tagged_startx_endx() {
        let debug_addr = debug_addr_section(&[0x4000, 0x5000]);

        let mut buf = Vec::new();
        buf.push(constants::DW_RLE_startx_endx.0);
        uleb(&mut buf, 0);
        uleb(&mut buf, 1);
        buf.push(constants::DW_RLE_end_of_list.0);

        let mut iter =
            RangeIter::new(&buf, NativeEndian::default(), 5, 0, 0, Some(&debug_addr), 8).unwrap();
        assert_eq!(
            iter.next().unwrap(),
            Some(PcRange {
                start: 0x4000,
                end: 0x5000
            })
        );
        assert_eq!(iter.next().unwrap(), None);
    }

    #[test]
    fn test_tagged_unknown_entry() {
        let buf = [0x7f];
        let mut iter = RangeIter::new(&buf, NativeEndian::default(), 5, 0, 0, None, 0).unwrap();
        match iter.next() {
            Err(Error::UnknownRangeListsEntry(constants::DwRle(0x7f))) => {}
            otherwise => panic!("Unexpected result: {:?}", otherwise),
        }
    }

    #[test]
    fn test_backwards_range_rejected() {
        let mut buf = Vec::new();
        buf.push(constants::DW_RLE_start_end.0);
        word(&mut buf, 0x2000);
        word(&mut buf, 0x1000);
        buf.push(constants::DW_RLE_end_of_list.0);

        let mut iter = RangeIter::new(&buf, NativeEndian::default(), 5, 0, 0, None, 0).unwrap();
        assert_eq!(iter.next(), Err(Error::InvalidAddressRange));
    }

    #[test]
    fn test_resolve_rnglistx() {
        // A table of two 4-byte slots at base 8, pointing at offsets 0x10
        // and 0x18 past the base.
        let mut buf = vec![0u8; 8];
        buf.extend_from_slice(&0x10u32.to_ne_bytes());
        buf.extend_from_slice(&0x18u32.to_ne_bytes());
        buf.resize(0x40, 0);

        let offset =
            resolve_rnglistx(&buf, NativeEndian::default(), Format::Dwarf32, 8, 1).unwrap();
        assert_eq!(offset, 8 + 0x18);
    }

    #[test]
    fn test_missing_debug_addr_is_missing_info() {
        let mut buf = Vec::new();
        buf.push(constants::DW_RLE_base_addressx.0);
        uleb(&mut buf, 0);
        buf.push(constants::DW_RLE_end_of_list.0);

        let mut iter = RangeIter::new(&buf, NativeEndian::default(), 5, 0, 0, None, 0).unwrap();
        assert_eq!(iter.next(), Err(Error::MissingDebugInfo));
    }
}
