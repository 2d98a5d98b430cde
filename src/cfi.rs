//! Call frame information from `.eh_frame`, `.debug_frame`, and
//! `.eh_frame_hdr`.
//!
//! Both call-frame sections hold a sequence of entries, each either a Common
//! Information Entry (CIE) holding state shared by many frames or a Frame
//! Description Entry (FDE) describing the unwinding of one function's PC
//! range. The sections differ only in version numbers, in the sentinel that
//! marks an entry as a CIE, and in how an FDE points back at its CIE.
//! `.eh_frame_hdr`, when present, adds a sorted binary-search table from PC
//! to FDE so a single frame can be located without scanning the section.

use std::mem;
use std::slice;

use crate::common::{Error, Format, Result};
use crate::constants::{self, DwEhPe};
use crate::cursor::{EndianCursor, MemoryValidator};
use crate::endianity::Endianity;

/// Which call-frame section an entry was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSectionKind {
    /// The runtime `.eh_frame` exception-handling section.
    EhFrame,
    /// The debug-only `.debug_frame` section.
    DebugFrame,
}

impl FrameSectionKind {
    /// The CIE-id value that marks an entry of this section as a CIE.
    fn cie_sentinel(self, format: Format) -> u64 {
        match self {
            FrameSectionKind::EhFrame => 0,
            FrameSectionKind::DebugFrame => match format {
                Format::Dwarf32 => u64::from(u32::MAX),
                Format::Dwarf64 => u64::MAX,
            },
        }
    }

    fn compatible_cie_version(self, version: u8) -> bool {
        match self {
            FrameSectionKind::EhFrame => version == 1 || version == 3,
            FrameSectionKind::DebugFrame => version == 4,
        }
    }
}

/// Everything needed to read entries out of one call-frame section: the
/// bytes, where those bytes live at runtime, and the optional memory gate
/// for reads that alias live process memory.
#[derive(Clone, Copy)]
pub(crate) struct FrameContext<'input, Endian>
where
    Endian: Endianity,
{
    pub data: &'input [u8],
    /// The runtime address of `data[0]`, used as the base for
    /// `DW_EH_PE_pcrel` pointers.
    pub section_address: u64,
    pub endian: Endian,
    pub kind: FrameSectionKind,
    pub validator: Option<&'input dyn MemoryValidator>,
}

impl<'input, Endian> FrameContext<'input, Endian>
where
    Endian: Endianity,
{
    pub(crate) fn cursor(&self) -> EndianCursor<'input, Endian> {
        match self.validator {
            Some(validator) => EndianCursor::with_validator(self.data, self.endian, validator),
            None => EndianCursor::new(self.data, self.endian),
        }
    }

    /// A cursor over the section truncated at `end`, positioned at `pos`.
    /// Truncation keeps a malformed entry from reading into its neighbors.
    fn cursor_bounded(&self, pos: usize, end: usize) -> Result<EndianCursor<'input, Endian>> {
        if end > self.data.len() || pos > end {
            return Err(Error::UnexpectedEof);
        }
        let mut cursor = match self.validator {
            Some(validator) => {
                EndianCursor::with_validator(&self.data[..end], self.endian, validator)
            }
            None => EndianCursor::new(&self.data[..end], self.endian),
        };
        cursor.seek_to(pos)?;
        Ok(cursor)
    }

    fn runtime_address(&self, offset: usize) -> u64 {
        self.section_address.wrapping_add(offset as u64)
    }
}

/// What kind of entry a header introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A Common Information Entry.
    Cie,
    /// A Frame Description Entry, referencing the CIE whose length field is
    /// at `cie_length_offset` within the section.
    Fde {
        /// The section offset of the referenced CIE's length field.
        cie_length_offset: u64,
    },
    /// The zero-length entry terminating `.eh_frame`.
    Terminator,
}

/// The decoded common header of a call-frame entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader<'input> {
    /// The section offset of the entry's length field. FDEs refer to their
    /// CIE by this offset.
    pub length_offset: u64,
    /// Whether the entry uses 32- or 64-bit DWARF lengths and ids.
    pub format: Format,
    /// Which kind of entry follows.
    pub kind: EntryKind,
    entry_bytes: &'input [u8],
    contents_offset: usize,
}

impl<'input> EntryHeader<'input> {
    /// The entry's bytes, from just past its CIE-id field to its end.
    #[inline]
    pub fn entry_bytes(&self) -> &'input [u8] {
        self.entry_bytes
    }

    /// Read the entry header at the cursor's position, leaving the cursor at
    /// the end of the entry regardless of the entry's kind.
    pub fn read<Endian>(
        cursor: &mut EndianCursor<'input, Endian>,
        kind: FrameSectionKind,
    ) -> Result<EntryHeader<'input>>
    where
        Endian: Endianity,
    {
        let length_offset = cursor.pos() as u64;
        let (length, format) = cursor.read_initial_length()?;
        if length == 0 {
            return Ok(EntryHeader {
                length_offset,
                format,
                kind: EntryKind::Terminator,
                entry_bytes: &[],
                contents_offset: cursor.pos(),
            });
        }

        let id_offset = cursor.pos();
        let length = usize::try_from(length).map_err(|_| Error::Overflow)?;
        let end = id_offset.checked_add(length).ok_or(Error::Overflow)?;
        if end > cursor.len() {
            return Err(Error::UnexpectedEof);
        }

        let id = cursor.read_offset(format)?;
        let contents_offset = cursor.pos();
        let entry_bytes = &cursor.data()[contents_offset..end];

        let entry_kind = if id == kind.cie_sentinel(format) {
            EntryKind::Cie
        } else {
            let cie_length_offset = match kind {
                // In `.eh_frame` the id is the distance back from the id
                // field to the CIE's length field.
                FrameSectionKind::EhFrame => (id_offset as u64)
                    .checked_sub(id)
                    .ok_or(Error::OffsetOutOfBounds(id))?,
                // In `.debug_frame` the id is the CIE's section offset.
                FrameSectionKind::DebugFrame => id,
            };
            EntryKind::Fde { cie_length_offset }
        };

        cursor.seek_to(end)?;
        Ok(EntryHeader {
            length_offset,
            format,
            kind: entry_kind,
            entry_bytes,
            contents_offset,
        })
    }

    fn end_offset(&self) -> usize {
        self.contents_offset + self.entry_bytes.len()
    }
}

/// > A Common Information Entry holds information that is shared among many
/// > Frame Description Entries. There is at least one CIE in every non-empty
/// > `.debug_frame` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonInformationEntry<'input> {
    /// The section offset of this CIE's length field; FDEs reference their
    /// CIE by this value.
    pub length_offset: u64,
    /// The call-frame version number, independent of the DWARF version.
    pub version: u8,
    /// Whether the entry uses 32- or 64-bit DWARF lengths and offsets.
    pub format: Format,
    /// The size in bytes of a target address in this CIE and its FDEs.
    pub address_size: u8,
    /// The size in bytes of a segment selector, or 0.
    pub segment_selector_size: u8,
    /// > A constant that is factored out of all advance location
    /// > instructions.
    pub code_alignment_factor: u64,
    /// > A constant that is factored out of certain offset instructions. The
    /// > resulting value is (operand * data_alignment_factor).
    pub data_alignment_factor: i64,
    /// > An unsigned LEB128 constant that indicates which column in the rule
    /// > table represents the return address of the function.
    pub return_address_register: u64,
    /// The raw augmentation string, without its NUL terminator.
    pub aug_str: &'input [u8],
    /// The raw augmentation data, borrowed from the section.
    pub aug_data: &'input [u8],
    /// The pointer encoding for FDE LSDA pointers, `DW_EH_PE_omit` if the
    /// augmentation declares none.
    pub lsda_pointer_enc: DwEhPe,
    /// The pointer encoding of the personality routine pointer, if the
    /// augmentation declares one.
    pub personality_enc: Option<DwEhPe>,
    /// The personality routine's address, if the augmentation declares one.
    pub personality_routine_pointer: Option<u64>,
    /// The pointer encoding for FDE address fields.
    pub fde_pointer_enc: DwEhPe,
    /// The instruction bytes establishing each register's initial unwind
    /// rule, handed to the call-frame instruction interpreter.
    pub initial_instructions: &'input [u8],
    is_signal_frame: bool,
    addresses_signed_with_b_key: bool,
    mte_tagged_frame: bool,
}

impl<'input> CommonInformationEntry<'input> {
    /// True if this CIE's FDEs describe signal handler frames (augmentation
    /// `S`).
    #[inline]
    pub fn is_signal_frame(&self) -> bool {
        self.is_signal_frame
    }

    /// True if return addresses in this CIE's FDEs are signed with the
    /// AArch64 B key (augmentation `B`).
    #[inline]
    pub fn addresses_signed_with_b_key(&self) -> bool {
        self.addresses_signed_with_b_key
    }

    /// True if this CIE's FDEs describe MTE tagged frames (augmentation
    /// `G`).
    #[inline]
    pub fn mte_tagged_frame(&self) -> bool {
        self.mte_tagged_frame
    }

    pub(crate) fn parse<Endian>(
        ctx: &FrameContext<'input, Endian>,
        header: &EntryHeader<'input>,
    ) -> Result<CommonInformationEntry<'input>>
    where
        Endian: Endianity,
    {
        match header.kind {
            EntryKind::Cie => {}
            EntryKind::Fde { .. } | EntryKind::Terminator => {
                return Err(Error::NotCieId(header.length_offset));
            }
        }

        let end = header.end_offset();
        let mut cursor = ctx.cursor_bounded(header.contents_offset, end)?;

        let version = cursor.read_u8()?;
        if !ctx.kind.compatible_cie_version(version) {
            return Err(Error::UnknownVersion(u64::from(version)));
        }

        let aug_str = cursor.read_bytes_until(0)?;
        let has_z = aug_str.first() == Some(&b'z');
        let has_eh_data = aug_str.starts_with(b"eh");
        if !has_z && !has_eh_data && !aug_str.is_empty() {
            return Err(Error::UnknownAugmentation);
        }
        if has_eh_data && aug_str.len() > 2 {
            return Err(Error::UnknownAugmentation);
        }

        let (address_size, segment_selector_size) = if version == 4 {
            (cursor.read_u8()?, cursor.read_u8()?)
        } else {
            (mem::size_of::<usize>() as u8, 0)
        };

        if has_eh_data {
            // The legacy "eh" augmentation carries one pointer of EH data
            // that nothing consumes anymore.
            cursor.seek_forward(u64::from(address_size))?;
        }

        let code_alignment_factor = cursor.read_uleb128()?;
        let data_alignment_factor = cursor.read_sleb128()?;
        let return_address_register = if version == 1 {
            u64::from(cursor.read_u8()?)
        } else {
            cursor.read_uleb128()?
        };

        let mut lsda_pointer_enc = constants::DW_EH_PE_omit;
        let mut personality_enc = None;
        let mut personality_routine_pointer = None;
        let mut fde_pointer_enc = constants::DW_EH_PE_absptr;
        let mut is_signal_frame = false;
        let mut addresses_signed_with_b_key = false;
        let mut mte_tagged_frame = false;
        let mut aug_data: &'input [u8] = &[];

        if has_z {
            let aug_len =
                usize::try_from(cursor.read_uleb128()?).map_err(|_| Error::Overflow)?;
            let aug_start = cursor.pos();
            let aug_end = aug_start.checked_add(aug_len).ok_or(Error::Overflow)?;
            if aug_end > end {
                return Err(Error::UnexpectedEof);
            }
            aug_data = &ctx.data[aug_start..aug_end];

            for &ch in &aug_str[1..] {
                match ch {
                    b'L' => {
                        lsda_pointer_enc = parse_pointer_encoding(&mut cursor)?;
                    }
                    b'P' => {
                        let enc = parse_pointer_encoding(&mut cursor)?;
                        // Position-independent binaries routinely encode the
                        // personality pointer indirectly through a GOT slot;
                        // following the indirection here yields the routine's
                        // address rather than the slot's.
                        let pointer_ctx = EhPointerContext {
                            pc_rel_base: ctx.runtime_address(cursor.pos()),
                            follow_indirect: true,
                            ..EhPointerContext::default()
                        };
                        personality_enc = Some(enc);
                        personality_routine_pointer = read_eh_pointer(
                            &mut cursor,
                            enc,
                            address_size,
                            &pointer_ctx,
                            ctx.validator,
                        )?;
                    }
                    b'R' => {
                        fde_pointer_enc = parse_pointer_encoding(&mut cursor)?;
                    }
                    b'S' => is_signal_frame = true,
                    b'B' => addresses_signed_with_b_key = true,
                    b'G' => mte_tagged_frame = true,
                    _ => return Err(Error::UnknownAugmentation),
                }
            }

            cursor.seek_to(aug_end)?;
        }

        let initial_instructions = &ctx.data[cursor.pos()..end];

        Ok(CommonInformationEntry {
            length_offset: header.length_offset,
            version,
            format: header.format,
            address_size,
            segment_selector_size,
            code_alignment_factor,
            data_alignment_factor,
            return_address_register,
            aug_str,
            aug_data,
            lsda_pointer_enc,
            personality_enc,
            personality_routine_pointer,
            fde_pointer_enc,
            initial_instructions,
            is_signal_frame,
            addresses_signed_with_b_key,
            mte_tagged_frame,
        })
    }
}

/// A Frame Description Entry: the unwind description for one function's PC
/// range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptionEntry<'input> {
    /// The section offset of the length field of this FDE's CIE.
    pub cie_length_offset: u64,
    /// The first address this entry describes.
    pub pc_begin: u64,
    /// The number of bytes of program text this entry describes.
    pub pc_range: u64,
    /// The address of the language-specific data area, if the CIE's
    /// augmentation declares one.
    pub lsda_pointer: Option<u64>,
    /// The raw augmentation data, borrowed from the section.
    pub aug_data: &'input [u8],
    /// The instruction bytes for this frame, handed to the call-frame
    /// instruction interpreter.
    pub instructions: &'input [u8],
}

impl<'input> FrameDescriptionEntry<'input> {
    /// Return true if this entry describes `address`.
    #[inline]
    pub fn contains(&self, address: u64) -> bool {
        self.pc_begin <= address && address < self.pc_begin.wrapping_add(self.pc_range)
    }

    pub(crate) fn parse<Endian>(
        ctx: &FrameContext<'input, Endian>,
        header: &EntryHeader<'input>,
        cie: &CommonInformationEntry<'input>,
    ) -> Result<FrameDescriptionEntry<'input>>
    where
        Endian: Endianity,
    {
        let cie_length_offset = match header.kind {
            EntryKind::Fde { cie_length_offset } => cie_length_offset,
            EntryKind::Cie | EntryKind::Terminator => {
                return Err(Error::NotCiePointer(header.length_offset));
            }
        };

        let end = header.end_offset();
        let mut cursor = ctx.cursor_bounded(header.contents_offset, end)?;

        if cie.segment_selector_size > 0 {
            cursor.seek_forward(u64::from(cie.segment_selector_size))?;
        }

        let pointer_ctx = EhPointerContext {
            pc_rel_base: ctx.runtime_address(cursor.pos()),
            follow_indirect: false,
            ..EhPointerContext::default()
        };
        let pc_begin = read_eh_pointer(
            &mut cursor,
            cie.fde_pointer_enc,
            cie.address_size,
            &pointer_ctx,
            ctx.validator,
        )?
        .ok_or(Error::InvalidFrameDescriptionEntry)?;

        // The range is a plain byte count; only the value format of the
        // encoding applies, never a relative base.
        let range_ctx = EhPointerContext::default();
        let pc_range = read_eh_pointer(
            &mut cursor,
            cie.fde_pointer_enc.format(),
            cie.address_size,
            &range_ctx,
            ctx.validator,
        )?
        .ok_or(Error::InvalidFrameDescriptionEntry)?;

        let mut aug_data: &'input [u8] = &[];
        let mut lsda_pointer = None;
        if !cie.aug_str.is_empty() {
            let aug_len =
                usize::try_from(cursor.read_uleb128()?).map_err(|_| Error::Overflow)?;
            let aug_start = cursor.pos();
            let aug_end = aug_start.checked_add(aug_len).ok_or(Error::Overflow)?;
            if aug_end > end {
                return Err(Error::UnexpectedEof);
            }
            aug_data = &ctx.data[aug_start..aug_end];

            if !cie.lsda_pointer_enc.is_absent() {
                let pointer_ctx = EhPointerContext {
                    pc_rel_base: ctx.runtime_address(cursor.pos()),
                    follow_indirect: true,
                    function_rel_base: Some(pc_begin),
                    ..EhPointerContext::default()
                };
                lsda_pointer = read_eh_pointer(
                    &mut cursor,
                    cie.lsda_pointer_enc,
                    cie.address_size,
                    &pointer_ctx,
                    ctx.validator,
                )?;
            }

            cursor.seek_to(aug_end)?;
        }

        let instructions = &ctx.data[cursor.pos()..end];

        Ok(FrameDescriptionEntry {
            cie_length_offset,
            pc_begin,
            pc_range,
            lsda_pointer,
            aug_data,
            instructions,
        })
    }
}

/// Read and validate a one-byte `DW_EH_PE_*` pointer encoding.
pub(crate) fn parse_pointer_encoding<Endian>(
    cursor: &mut EndianCursor<'_, Endian>,
) -> Result<DwEhPe>
where
    Endian: Endianity,
{
    let encoding = DwEhPe(cursor.read_u8()?);
    if encoding.is_valid_encoding() {
        Ok(encoding)
    } else {
        Err(Error::UnknownPointerEncoding(encoding.0))
    }
}

/// The relative bases available when decoding a DWARF-exception pointer.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EhPointerContext {
    /// The base for `DW_EH_PE_pcrel` pointers: the runtime address of the
    /// field being decoded.
    pub pc_rel_base: u64,
    /// Whether a `DW_EH_PE_indirect` result should be dereferenced.
    pub follow_indirect: bool,
    /// The base for `DW_EH_PE_datarel` pointers, when the caller has one.
    pub data_rel_base: Option<u64>,
    /// The base for `DW_EH_PE_textrel` pointers, when the caller has one.
    pub text_rel_base: Option<u64>,
    /// The base for `DW_EH_PE_funcrel` pointers, when the caller has one.
    pub function_rel_base: Option<u64>,
}

// The signed/unsigned intermediate of a pointer read: the two classes
// combine with their base differently.
#[derive(Debug, Clone, Copy)]
enum EhPointerValue {
    Unsigned(u64),
    Signed(i64),
}

/// Decode one DWARF-exception encoded pointer at the cursor's position.
///
/// Returns `None` for `DW_EH_PE_omit`. Signed values are combined with their
/// base as signed integers and then cast; unsigned values wrap. When the
/// encoding is indirect and `ctx.follow_indirect` is set, the resulting
/// address is dereferenced as a native word, gated by `validator`.
pub(crate) fn read_eh_pointer<Endian>(
    cursor: &mut EndianCursor<'_, Endian>,
    encoding: DwEhPe,
    address_size: u8,
    ctx: &EhPointerContext,
    validator: Option<&dyn MemoryValidator>,
) -> Result<Option<u64>>
where
    Endian: Endianity,
{
    if encoding.is_absent() {
        return Ok(None);
    }
    if !encoding.is_valid_encoding() {
        return Err(Error::UnknownPointerEncoding(encoding.0));
    }

    let value = match encoding.format() {
        constants::DW_EH_PE_absptr => EhPointerValue::Unsigned(cursor.read_address(address_size)?),
        constants::DW_EH_PE_uleb128 => EhPointerValue::Unsigned(cursor.read_uleb128()?),
        constants::DW_EH_PE_udata2 => EhPointerValue::Unsigned(u64::from(cursor.read_u16()?)),
        constants::DW_EH_PE_udata4 => EhPointerValue::Unsigned(u64::from(cursor.read_u32()?)),
        constants::DW_EH_PE_udata8 => EhPointerValue::Unsigned(cursor.read_u64()?),
        constants::DW_EH_PE_sleb128 => EhPointerValue::Signed(cursor.read_sleb128()?),
        constants::DW_EH_PE_sdata2 => EhPointerValue::Signed(i64::from(cursor.read_i16()?)),
        constants::DW_EH_PE_sdata4 => EhPointerValue::Signed(i64::from(cursor.read_i32()?)),
        constants::DW_EH_PE_sdata8 => EhPointerValue::Signed(cursor.read_i64()?),
        _ => return Err(Error::UnknownPointerEncoding(encoding.0)),
    };

    let base = match encoding.application() {
        constants::DW_EH_PE_absptr => None,
        constants::DW_EH_PE_pcrel => Some(ctx.pc_rel_base),
        constants::DW_EH_PE_textrel => {
            Some(ctx.text_rel_base.ok_or(Error::PointerBaseNotSpecified)?)
        }
        constants::DW_EH_PE_datarel => {
            Some(ctx.data_rel_base.ok_or(Error::PointerBaseNotSpecified)?)
        }
        constants::DW_EH_PE_funcrel => {
            Some(ctx.function_rel_base.ok_or(Error::PointerBaseNotSpecified)?)
        }
        _ => return Err(Error::UnsupportedPointerEncoding(encoding.0)),
    };

    let pointer = match (base, value) {
        (None, EhPointerValue::Unsigned(value)) => value,
        (None, EhPointerValue::Signed(value)) => value as u64,
        (Some(base), EhPointerValue::Unsigned(value)) => base.wrapping_add(value),
        (Some(base), EhPointerValue::Signed(value)) => {
            let base = i64::try_from(base).map_err(|_| Error::PointerOverflow)?;
            base.checked_add(value).ok_or(Error::PointerOverflow)? as u64
        }
    };

    if encoding.is_indirect() && ctx.follow_indirect {
        if usize::from(address_size) != mem::size_of::<usize>() {
            return Err(Error::NonNativeIndirection);
        }
        match validator {
            Some(validator)
                if validator.is_valid_memory(pointer, mem::size_of::<usize>() as u64) =>
            {
                // SAFETY: the caller's validator has vouched for a native
                // word at `pointer`.
                let value = unsafe { (pointer as *const usize).read_unaligned() };
                Ok(Some(value as u64))
            }
            _ => Err(Error::InvalidMemory(pointer)),
        }
    } else {
        Ok(Some(pointer))
    }
}

/// The parsed `.eh_frame_hdr` section: a pointer to `.eh_frame` and a sorted
/// binary-search table from initial PC to FDE address.
#[derive(Debug, Clone)]
pub struct ExceptionFrameHeader<'input> {
    /// The runtime address of the `.eh_frame` section.
    pub eh_frame_ptr: u64,
    /// The pointer encoding of the search table's entries.
    pub table_encoding: DwEhPe,
    /// The number of entries in the search table.
    pub fde_count: u64,
    entries: &'input [u8],
    entries_address: u64,
    header_address: u64,
}

impl<'input> ExceptionFrameHeader<'input> {
    /// Parse an `.eh_frame_hdr` section.
    ///
    /// `header_address` must be the runtime address of `data[0]`; it anchors
    /// the `pcrel` and `datarel` pointer encodings the section uses.
    pub fn parse<Endian>(
        data: &'input [u8],
        header_address: u64,
        endian: Endian,
    ) -> Result<ExceptionFrameHeader<'input>>
    where
        Endian: Endianity,
    {
        let mut cursor = EndianCursor::new(data, endian);

        let version = cursor.read_u8()?;
        if version != 1 {
            return Err(Error::UnknownVersion(u64::from(version)));
        }

        let eh_frame_ptr_enc = parse_pointer_encoding(&mut cursor)?;
        let fde_count_enc = parse_pointer_encoding(&mut cursor)?;
        let table_encoding = parse_pointer_encoding(&mut cursor)?;
        if eh_frame_ptr_enc.is_absent() || fde_count_enc.is_absent() || table_encoding.is_absent()
        {
            return Err(Error::UnsupportedPointerEncoding(constants::DW_EH_PE_omit.0));
        }

        let native_size = mem::size_of::<usize>() as u8;

        let pointer_ctx = EhPointerContext {
            pc_rel_base: header_address.wrapping_add(cursor.pos() as u64),
            follow_indirect: false,
            data_rel_base: Some(header_address),
            ..EhPointerContext::default()
        };
        let eh_frame_ptr = read_eh_pointer(&mut cursor, eh_frame_ptr_enc, native_size, &pointer_ctx, None)?
            .ok_or(Error::PointerBaseNotSpecified)?;

        let pointer_ctx = EhPointerContext {
            pc_rel_base: header_address.wrapping_add(cursor.pos() as u64),
            follow_indirect: false,
            data_rel_base: Some(header_address),
            ..EhPointerContext::default()
        };
        let fde_count = read_eh_pointer(&mut cursor, fde_count_enc, native_size, &pointer_ctx, None)?
            .ok_or(Error::PointerBaseNotSpecified)?;

        let entry_size = table_entry_size(table_encoding)?;
        let table_len = usize::try_from(
            fde_count
                .checked_mul(u64::from(entry_size))
                .ok_or(Error::Overflow)?,
        )
        .map_err(|_| Error::Overflow)?;
        let entries_offset = cursor.pos();
        let entries = cursor.read_bytes(table_len)?;

        Ok(ExceptionFrameHeader {
            eh_frame_ptr,
            table_encoding,
            fde_count,
            entries,
            entries_address: header_address.wrapping_add(entries_offset as u64),
            header_address,
        })
    }

    /// The raw bytes of the binary-search table.
    #[inline]
    pub fn entries_bytes(&self) -> &'input [u8] {
        self.entries
    }

    /// Binary-search the table for the FDE covering `pc` and return the
    /// FDE's runtime address.
    ///
    /// The table is sorted by initial PC. The search converges on the last
    /// entry whose initial PC does not exceed `pc`; whether that entry's FDE
    /// actually covers `pc` is for the caller to verify once the FDE is
    /// parsed.
    pub(crate) fn find_fde_pointer<Endian>(
        &self,
        endian: Endian,
        validator: Option<&'input dyn MemoryValidator>,
        pc: u64,
    ) -> Result<u64>
    where
        Endian: Endianity,
    {
        if self.fde_count == 0 {
            return Err(Error::MissingDebugInfo);
        }
        let entry_size = u64::from(table_entry_size(self.table_encoding)?);

        let mut left: u64 = 0;
        let mut len = self.fde_count;
        while len > 1 {
            let mid = left + len / 2;
            let entry_pc = self.read_entry(endian, validator, mid, entry_size)?.0;
            if pc < entry_pc {
                len /= 2;
            } else {
                left = mid;
                if pc == entry_pc {
                    break;
                }
                len -= len / 2;
            }
        }

        self.read_entry(endian, validator, left, entry_size)
            .map(|(_, fde_ptr)| fde_ptr)
    }

    /// Read table entry `index`: its initial PC and its FDE pointer.
    fn read_entry<Endian>(
        &self,
        endian: Endian,
        validator: Option<&'input dyn MemoryValidator>,
        index: u64,
        entry_size: u64,
    ) -> Result<(u64, u64)>
    where
        Endian: Endianity,
    {
        let offset = usize::try_from(index * entry_size).map_err(|_| Error::Overflow)?;
        let mut cursor = match validator {
            Some(validator) => EndianCursor::with_validator(self.entries, endian, validator),
            None => EndianCursor::new(self.entries, endian),
        };
        cursor.seek_to(offset)?;

        let pointer_ctx = EhPointerContext {
            pc_rel_base: self.entries_address.wrapping_add(offset as u64),
            follow_indirect: true,
            data_rel_base: Some(self.header_address),
            ..EhPointerContext::default()
        };
        let native_size = mem::size_of::<usize>() as u8;
        let initial_pc = read_eh_pointer(
            &mut cursor,
            self.table_encoding,
            native_size,
            &pointer_ctx,
            validator,
        )?
        .ok_or(Error::PointerBaseNotSpecified)?;
        let fde_ptr = read_eh_pointer(
            &mut cursor,
            self.table_encoding,
            native_size,
            &pointer_ctx,
            validator,
        )?
        .ok_or(Error::PointerBaseNotSpecified)?;
        Ok((initial_pc, fde_ptr))
    }

    /// Locate, parse, and return the CIE/FDE pair covering `pc`, reading the
    /// FDE out of live memory at the header's `eh_frame_ptr`.
    ///
    /// This is the in-process unwinding path, for when `.eh_frame` itself
    /// was never registered as a section. `eh_frame_len` bounds the section
    /// when the caller knows its extent (the named range must be readable);
    /// when it does not, a `validator` is required, and the section's extent
    /// is taken to be the longest contiguous range the validator confirms
    /// readable starting at `eh_frame_ptr`.
    pub fn find_entry<Endian>(
        &self,
        endian: Endian,
        validator: Option<&'input dyn MemoryValidator>,
        eh_frame_len: Option<usize>,
        pc: u64,
    ) -> Result<(CommonInformationEntry<'input>, FrameDescriptionEntry<'input>)>
    where
        Endian: Endianity,
    {
        let fde_ptr = self.find_fde_pointer(endian, validator, pc)?;
        if fde_ptr < self.eh_frame_ptr {
            return Err(Error::OffsetOutOfBounds(fde_ptr));
        }
        let fde_offset = usize::try_from(fde_ptr - self.eh_frame_ptr).map_err(|_| Error::Overflow)?;

        let len = match eh_frame_len {
            Some(len) => len,
            None => {
                let validator = validator.ok_or(Error::InvalidMemory(self.eh_frame_ptr))?;
                // At the very least the FDE's length field must be readable.
                let minimum = fde_offset.checked_add(4).ok_or(Error::Overflow)?;
                validated_extent(validator, self.eh_frame_ptr, minimum)?
            }
        };
        if fde_offset >= len {
            return Err(Error::OffsetOutOfBounds(fde_ptr));
        }

        // SAFETY: the slice aliases this process's own `.eh_frame`, and the
        // whole `len` bytes are readable: either the caller named the
        // section's extent, or the validator just confirmed the range end to
        // end.
        let eh_frame = unsafe { slice::from_raw_parts(self.eh_frame_ptr as *const u8, len) };
        let ctx = FrameContext {
            data: eh_frame,
            section_address: self.eh_frame_ptr,
            endian,
            kind: FrameSectionKind::EhFrame,
            validator,
        };

        let (cie, fde) = parse_fde_and_cie(&ctx, fde_offset)?;
        if !fde.contains(pc) {
            return Err(Error::MissingDebugInfo);
        }
        Ok((cie, fde))
    }
}

/// The longest length in `[minimum, u32::MAX]` for which the validator
/// confirms `[address, address + length)` readable, as one whole range.
///
/// Readability is taken to be prefix-monotone: if a range is readable, so is
/// every prefix of it. Doubling probes find the scale, a bisection finds the
/// boundary, so entries near the end of the section stay reachable without
/// ever naming a byte the validator has not vouched for.
fn validated_extent(
    validator: &dyn MemoryValidator,
    address: u64,
    minimum: usize,
) -> Result<usize> {
    const LIMIT: usize = u32::MAX as usize;

    let readable = |length: usize| validator.is_valid_memory(address, length as u64);
    if minimum == 0 || minimum > LIMIT || !readable(minimum) {
        return Err(Error::InvalidMemory(address));
    }

    let mut valid = minimum;
    let mut probe = minimum.saturating_mul(2).min(LIMIT);
    while probe > valid && readable(probe) {
        valid = probe;
        probe = probe.saturating_mul(2).min(LIMIT);
    }
    if probe == valid {
        return Ok(valid);
    }

    // `valid` is readable and `probe` is not; bisect the boundary.
    let (mut lo, mut hi) = (valid, probe);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if readable(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

/// The size in bytes of one `.eh_frame_hdr` table entry: two pointers of the
/// table's encoding.
fn table_entry_size(table_encoding: DwEhPe) -> Result<u8> {
    match table_encoding.format() {
        constants::DW_EH_PE_udata2 | constants::DW_EH_PE_sdata2 => Ok(4),
        constants::DW_EH_PE_udata4 | constants::DW_EH_PE_sdata4 => Ok(8),
        constants::DW_EH_PE_udata8 | constants::DW_EH_PE_sdata8 => Ok(16),
        constants::DW_EH_PE_uleb128 | constants::DW_EH_PE_sleb128 => {
            Err(Error::VariableLengthSearchTable)
        }
        _ => Err(Error::UnknownPointerEncoding(table_encoding.0)),
    }
}

/// Parse the FDE at `fde_offset` and the CIE it references.
pub(crate) fn parse_fde_and_cie<'input, Endian>(
    ctx: &FrameContext<'input, Endian>,
    fde_offset: usize,
) -> Result<(CommonInformationEntry<'input>, FrameDescriptionEntry<'input>)>
where
    Endian: Endianity,
{
    let mut cursor = ctx.cursor();
    cursor.seek_to(fde_offset)?;
    let fde_header = EntryHeader::read(&mut cursor, ctx.kind)?;
    let cie_length_offset = match fde_header.kind {
        EntryKind::Fde { cie_length_offset } => cie_length_offset,
        EntryKind::Cie | EntryKind::Terminator => {
            return Err(Error::NotCiePointer(fde_header.length_offset));
        }
    };

    let mut cie_cursor = ctx.cursor();
    cie_cursor.seek_to(usize::try_from(cie_length_offset).map_err(|_| Error::Overflow)?)?;
    let cie_header = EntryHeader::read(&mut cie_cursor, ctx.kind)?;
    let cie = CommonInformationEntry::parse(ctx, &cie_header)?;
    let fde = FrameDescriptionEntry::parse(ctx, &fde_header, &cie)?;
    Ok((cie, fde))
}
