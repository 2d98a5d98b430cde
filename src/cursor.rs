//! A positioned reader over a debug section's bytes.

use std::mem;

use crate::common::{Error, Format, Result};
use crate::endianity::Endianity;

/// A predicate deciding whether a range of memory may be dereferenced.
///
/// Section buffers parsed out of a file on disk are always readable and never
/// need one of these. When the reader is pointed at a live process image
/// (unwinding through `.eh_frame` located via `.eh_frame_hdr`, or following
/// an indirect `DW_EH_PE_*` pointer), every dereference must first be vetted
/// against the process's mappings, and the caller supplies the predicate that
/// does so.
pub trait MemoryValidator {
    /// Return true if `length` bytes starting at `address` may be read.
    fn is_valid_memory(&self, address: u64, length: u64) -> bool;
}

/// A positioned reader over a byte slice.
///
/// All read operations advance the cursor past the bytes they consume.
/// Returned slices borrow from the underlying section data.
#[derive(Clone, Copy)]
pub struct EndianCursor<'input, Endian>
where
    Endian: Endianity,
{
    data: &'input [u8],
    pos: usize,
    endian: Endian,
    validator: Option<&'input dyn MemoryValidator>,
}

impl<'input, Endian> std::fmt::Debug for EndianCursor<'input, Endian>
where
    Endian: Endianity,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndianCursor")
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .field("endian", &self.endian)
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

impl<'input, Endian> EndianCursor<'input, Endian>
where
    Endian: Endianity,
{
    /// Construct a cursor positioned at the start of `data`.
    pub fn new(data: &'input [u8], endian: Endian) -> Self {
        EndianCursor {
            data,
            pos: 0,
            endian,
            validator: None,
        }
    }

    /// Construct a cursor whose every read consults `validator` before
    /// dereferencing. Used when `data` aliases live process memory.
    pub fn with_validator(
        data: &'input [u8],
        endian: Endian,
        validator: &'input dyn MemoryValidator,
    ) -> Self {
        EndianCursor {
            data,
            pos: 0,
            endian,
            validator: Some(validator),
        }
    }

    /// The current position within the data.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The total length of the underlying data.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Return true if no bytes remain.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// The number of bytes remaining.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The underlying data, including bytes already consumed.
    #[inline]
    pub fn data(&self) -> &'input [u8] {
        self.data
    }

    /// The cursor's endianity.
    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Reposition the cursor to `offset`.
    pub fn seek_to(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(Error::OffsetOutOfBounds(offset as u64));
        }
        self.pos = offset;
        Ok(())
    }

    /// Advance the cursor by `delta` bytes without reading them.
    pub fn seek_forward(&mut self, delta: u64) -> Result<()> {
        let delta = usize::try_from(delta).map_err(|_| Error::Overflow)?;
        let new_pos = self.pos.checked_add(delta).ok_or(Error::Overflow)?;
        self.seek_to(new_pos)
    }

    /// Consume `len` bytes, checking bounds and memory validity.
    fn advance(&mut self, len: usize) -> Result<&'input [u8]> {
        if len > self.remaining() {
            return Err(Error::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        if let Some(validator) = self.validator {
            let address = bytes.as_ptr() as u64;
            if !validator.is_valid_memory(address, len as u64) {
                return Err(Error::InvalidMemory(address));
            }
        }
        self.pos += len;
        Ok(bytes)
    }

    /// Read a u8.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.advance(1)?[0])
    }

    /// Read an i8.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.advance(1)?[0] as i8)
    }

    /// Read a u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.advance(2)?;
        Ok(self.endian.read_u16(bytes))
    }

    /// Read an i16.
    pub fn read_i16(&mut self) -> Result<i16> {
        let bytes = self.advance(2)?;
        Ok(self.endian.read_i16(bytes))
    }

    /// Read an unsigned 24-bit integer into a u32.
    pub fn read_u24(&mut self) -> Result<u32> {
        let bytes = self.advance(3)?;
        Ok(self.endian.read_uint(bytes) as u32)
    }

    /// Read a u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.advance(4)?;
        Ok(self.endian.read_u32(bytes))
    }

    /// Read an i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.advance(4)?;
        Ok(self.endian.read_i32(bytes))
    }

    /// Read a u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.advance(8)?;
        Ok(self.endian.read_u64(bytes))
    }

    /// Read an i64.
    pub fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.advance(8)?;
        Ok(self.endian.read_i64(bytes))
    }

    /// Read an unsigned LEB128-encoded integer.
    pub fn read_uleb128(&mut self) -> Result<u64> {
        if self.validator.is_some() {
            return self.read_uleb128_bytewise();
        }
        let mut rest = &self.data[self.pos..];
        let value = leb128::read::unsigned(&mut rest).map_err(|e| match e {
            leb128::read::Error::Overflow => Error::BadUnsignedLeb128,
            leb128::read::Error::IoError(_) => Error::UnexpectedEof,
        })?;
        self.pos = self.data.len() - rest.len();
        Ok(value)
    }

    // Decodes through `read_u8` so every byte dereference stays gated by the
    // validator.
    fn read_uleb128_bytewise(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            let low = u64::from(byte & 0x7f);
            if shift >= 64 || (shift == 63 && low > 1) {
                return Err(Error::BadUnsignedLeb128);
            }
            result |= low << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Read an unsigned LEB128-encoded integer that must fit in a u16.
    pub fn read_uleb128_u16(&mut self) -> Result<u16> {
        let value = self.read_uleb128()?;
        u16::try_from(value).map_err(|_| Error::Overflow)
    }

    /// Read a signed LEB128-encoded integer.
    pub fn read_sleb128(&mut self) -> Result<i64> {
        if self.validator.is_some() {
            return self.read_sleb128_bytewise();
        }
        let mut rest = &self.data[self.pos..];
        let value = leb128::read::signed(&mut rest).map_err(|e| match e {
            leb128::read::Error::Overflow => Error::BadSignedLeb128,
            leb128::read::Error::IoError(_) => Error::UnexpectedEof,
        })?;
        self.pos = self.data.len() - rest.len();
        Ok(value)
    }

    fn read_sleb128_bytewise(&mut self) -> Result<i64> {
        let mut result = 0i64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift >= 64 {
                return Err(Error::BadSignedLeb128);
            }
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }
    }

    /// Read `len` bytes and return them as a borrowed slice.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'input [u8]> {
        self.advance(len)
    }

    /// Read bytes up to the first occurrence of `sentinel`, consuming the
    /// sentinel but excluding it from the returned slice.
    pub fn read_bytes_until(&mut self, sentinel: u8) -> Result<&'input [u8]> {
        let start = self.pos;
        if self.validator.is_none() {
            match self.data[self.pos..].iter().position(|&b| b == sentinel) {
                Some(idx) => {
                    self.pos += idx + 1;
                    Ok(&self.data[start..start + idx])
                }
                None => Err(Error::UnexpectedEof),
            }
        } else {
            loop {
                if self.read_u8()? == sentinel {
                    return Ok(&self.data[start..self.pos - 1]);
                }
            }
        }
    }

    /// Read an initial length field.
    ///
    /// An initial length is a 4 byte value less than `0xffff_fff0`, or a
    /// 12 byte value whose first four bytes are `0xffff_ffff`, selecting
    /// 32- or 64-bit DWARF respectively. Values in between are reserved and
    /// rejected.
    pub fn read_initial_length(&mut self) -> Result<(u64, Format)> {
        let first = self.read_u32()?;
        if first < 0xffff_fff0 {
            Ok((u64::from(first), Format::Dwarf32))
        } else if first == 0xffff_ffff {
            Ok((self.read_u64()?, Format::Dwarf64))
        } else {
            Err(Error::UnknownReservedLength(first))
        }
    }

    /// Read an offset or length field sized by `format`.
    pub fn read_offset(&mut self, format: Format) -> Result<u64> {
        match format {
            Format::Dwarf32 => Ok(u64::from(self.read_u32()?)),
            Format::Dwarf64 => self.read_u64(),
        }
    }

    /// Read an unsigned integer of the given byte size.
    pub fn read_address(&mut self, size: u8) -> Result<u64> {
        match size {
            1 => Ok(u64::from(self.read_u8()?)),
            2 => Ok(u64::from(self.read_u16()?)),
            4 => Ok(u64::from(self.read_u32()?)),
            8 => self.read_u64(),
            otherwise => Err(Error::UnsupportedAddressSize(otherwise)),
        }
    }

    /// Read an address of the native word size.
    pub fn read_native_address(&mut self) -> Result<u64> {
        self.read_address(mem::size_of::<usize>() as u8)
    }
}
