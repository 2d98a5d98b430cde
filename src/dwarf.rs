//! The top-level `Dwarf` object: the section registry, the eager scans, and
//! the per-address query surface.

use std::collections::HashMap;
use std::mem;

use tracing::debug;

use crate::abbrev::{Abbreviations, AbbreviationsCache};
use crate::addr::read_debug_addr;
use crate::cfi::{
    parse_fde_and_cie, CommonInformationEntry, EntryHeader, EntryKind, ExceptionFrameHeader,
    FrameContext, FrameDescriptionEntry, FrameSectionKind,
};
use crate::common::{Error, Result, SectionId, SECTION_COUNT};
use crate::constants;
use crate::cursor::{EndianCursor, MemoryValidator};
use crate::endianity::{Endianity, NativeEndian};
use crate::line::{self, SourceLocation};
use crate::ranges::{resolve_rnglistx, RangeIter};
use crate::section::Section;
use crate::unit::{
    parse_die, parse_die_attrs, parse_unit_header, CompileUnit, Die, DieAttr, FormValue, Function,
    PcRange, UnitHeader,
};

/// A parsed view of one module's debug information.
///
/// Populate the section registry with whatever sections the module has, then
/// call [`open`](Dwarf::open) to index functions and compilation units and
/// [`scan_all_unwind_info`](Dwarf::scan_all_unwind_info) to index unwind
/// information. Those two calls mutate the object and require exclusive
/// access; every query after them is a pure read.
///
/// All section bytes are borrowed for `'input`, and every string, block, and
/// instruction buffer the queries return borrows from them in turn.
#[derive(Debug)]
pub struct Dwarf<'input, Endian = NativeEndian>
where
    Endian: Endianity,
{
    endian: Endian,
    sections: [Option<Section<'input>>; SECTION_COUNT],
    base_address: u64,
    abbrev_cache: AbbreviationsCache,
    compile_units: Vec<CompileUnit<'input>>,
    functions: Vec<Function<'input>>,
    cies: HashMap<u64, CommonInformationEntry<'input>>,
    fdes: Vec<FrameDescriptionEntry<'input>>,
    eh_frame_hdr: Option<ExceptionFrameHeader<'input>>,
}

impl<'input> Dwarf<'input, NativeEndian> {
    /// Construct an empty `Dwarf` with the native byte order, for reading
    /// the current process's own image.
    pub fn native() -> Self {
        Dwarf::new(NativeEndian::default())
    }
}

impl<'input, Endian> Dwarf<'input, Endian>
where
    Endian: Endianity,
{
    /// Construct an empty `Dwarf` with no sections registered.
    pub fn new(endian: Endian) -> Self {
        Dwarf {
            endian,
            sections: [None; SECTION_COUNT],
            base_address: 0,
            abbrev_cache: AbbreviationsCache::new(),
            compile_units: Vec::new(),
            functions: Vec::new(),
            cies: HashMap::new(),
            fdes: Vec::new(),
            eh_frame_hdr: None,
        }
    }

    /// The byte order this object reads with.
    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Register a section's bytes.
    pub fn set_section(&mut self, id: SectionId, section: Section<'input>) {
        self.sections[id.index()] = Some(section);
    }

    /// The registered section, if any.
    #[inline]
    pub fn section(&self, id: SectionId) -> Option<&Section<'input>> {
        self.sections[id.index()].as_ref()
    }

    /// The registered section's bytes, or `MissingDebugInfo`.
    pub(crate) fn section_data(&self, id: SectionId) -> Result<&'input [u8]> {
        self.section(id)
            .map(|section| section.data)
            .ok_or(Error::MissingDebugInfo)
    }

    /// The compilation units indexed by [`open`](Dwarf::open).
    #[inline]
    pub fn compile_units(&self) -> &[CompileUnit<'input>] {
        &self.compile_units
    }

    /// The functions indexed by [`open`](Dwarf::open).
    #[inline]
    pub fn functions(&self) -> &[Function<'input>] {
        &self.functions
    }

    /// The frame description entries collected by
    /// [`scan_all_unwind_info`](Dwarf::scan_all_unwind_info), sorted by
    /// `pc_begin`. Empty when `.eh_frame_hdr` supplies the index instead.
    #[inline]
    pub fn frame_descriptions(&self) -> &[FrameDescriptionEntry<'input>] {
        &self.fdes
    }

    /// The parsed `.eh_frame_hdr`, when
    /// [`scan_all_unwind_info`](Dwarf::scan_all_unwind_info) retained one.
    #[inline]
    pub fn exception_frame_header(&self) -> Option<&ExceptionFrameHeader<'input>> {
        self.eh_frame_hdr.as_ref()
    }

    /// Index every function and compilation unit in `.debug_info`.
    ///
    /// Requires `.debug_info` and `.debug_abbrev` to be registered.
    pub fn open(&mut self) -> Result<()> {
        // Both scans are driven off locals so the abbreviation cache can be
        // borrowed mutably while the resolution helpers borrow `self`.
        let mut cache = mem::take(&mut self.abbrev_cache);
        let result = self
            .scan_all_functions(&mut cache)
            .and_then(|_| self.scan_all_compile_units(&mut cache));
        self.abbrev_cache = cache;
        result?;

        debug!(
            functions = self.functions.len(),
            compile_units = self.compile_units.len(),
            "indexed .debug_info"
        );
        Ok(())
    }

    /// Find the compilation unit whose address ranges contain `address`.
    pub fn find_compile_unit(&self, address: u64) -> Result<&CompileUnit<'input>> {
        for cu in &self.compile_units {
            if let Some(range) = cu.pc_range {
                if range.contains(address) {
                    return Ok(cu);
                }
            }
            if cu.die.attr(constants::DW_AT_ranges).is_some() {
                let mut iter = match self.ranges(cu, &cu.die) {
                    Ok(iter) => iter,
                    Err(Error::MissingDebugInfo) => continue,
                    Err(err) => return Err(err),
                };
                while let Some(range) = iter.next()? {
                    if range.contains(address) {
                        return Ok(cu);
                    }
                }
            }
        }
        Err(Error::MissingDebugInfo)
    }

    /// The name of the function containing `address`, if the index has one.
    pub fn get_symbol_name(&self, address: u64) -> Option<&'input str> {
        self.functions
            .iter()
            .find(|func| {
                func.pc_range
                    .map_or(false, |range| range.contains(address))
            })
            .and_then(|func| func.name)
    }

    /// Run `cu`'s line number program and return the source location for
    /// `address`.
    pub fn get_line_number_info(
        &self,
        cu: &CompileUnit<'input>,
        address: u64,
    ) -> Result<SourceLocation> {
        line::line_number_info(self, cu, address)
    }

    /// Iterate the address ranges of `die`'s `DW_AT_ranges` list.
    ///
    /// The list lives in `.debug_ranges` for unit versions before 5 and in
    /// `.debug_rnglists` from version 5 on; the base address is the unit's
    /// `DW_AT_low_pc`, or 0 when it has none.
    pub fn ranges(
        &self,
        cu: &CompileUnit<'input>,
        die: &Die<'input>,
    ) -> Result<RangeIter<'input, Endian>> {
        let ranges_value = die
            .attr(constants::DW_AT_ranges)
            .ok_or(Error::MissingDebugInfo)?;
        self.ranges_from_value(cu, ranges_value)
    }

    fn ranges_from_value(
        &self,
        cu: &CompileUnit<'input>,
        ranges_value: &FormValue<'input>,
    ) -> Result<RangeIter<'input, Endian>> {
        let section_id = if cu.version < 5 {
            SectionId::DebugRanges
        } else {
            SectionId::DebugRnglists
        };
        let section = self.section_data(section_id)?;

        let offset = match *ranges_value {
            FormValue::SecOffset(offset) | FormValue::Udata(offset) => offset,
            FormValue::RnglistX(index) => {
                resolve_rnglistx(section, self.endian, cu.format, cu.rnglists_base, index)?
            }
            _ => return Err(Error::UnsupportedAttributeForm),
        };

        let base_address = match cu.die.attr(constants::DW_AT_low_pc) {
            Some(value) => self.resolve_address(cu, value)?,
            None => 0,
        };

        RangeIter::new(
            section,
            self.endian,
            cu.version,
            offset,
            base_address,
            self.section_data(SectionId::DebugAddr).ok(),
            cu.addr_base,
        )
    }

    /// Resolve a string-class attribute value to the string it names.
    pub(crate) fn resolve_string(
        &self,
        cu: &CompileUnit<'input>,
        value: &FormValue<'input>,
    ) -> Result<&'input str> {
        match *value {
            FormValue::String(bytes) => str_from_bytes(bytes),
            FormValue::Strp(offset) => {
                string_at(self.section_data(SectionId::DebugStr)?, offset)
            }
            FormValue::LineStrp(offset) => {
                string_at(self.section_data(SectionId::DebugLineStr)?, offset)
            }
            FormValue::Strx(index) => {
                if cu.str_offsets_base == 0 {
                    return Err(Error::OffsetOutOfBounds(0));
                }
                let str_offsets = self.section_data(SectionId::DebugStrOffsets)?;
                let slot = cu
                    .str_offsets_base
                    .checked_add(
                        index
                            .checked_mul(u64::from(cu.format.word_size()))
                            .ok_or(Error::Overflow)?,
                    )
                    .ok_or(Error::Overflow)?;
                let mut cursor = EndianCursor::new(str_offsets, self.endian);
                cursor.seek_to(usize::try_from(slot).map_err(|_| Error::Overflow)?)?;
                let offset = cursor.read_offset(cu.format)?;
                string_at(self.section_data(SectionId::DebugStr)?, offset)
            }
            _ => Err(Error::UnsupportedAttributeForm),
        }
    }

    /// Resolve an address-class attribute value to an address.
    pub(crate) fn resolve_address(
        &self,
        cu: &CompileUnit<'input>,
        value: &FormValue<'input>,
    ) -> Result<u64> {
        match *value {
            FormValue::Addr(address) => Ok(address),
            FormValue::Addrx(index) => {
                let debug_addr = self.section_data(SectionId::DebugAddr)?;
                read_debug_addr(debug_addr, self.endian, cu.addr_base, index)
            }
            _ => Err(Error::UnsupportedAttributeForm),
        }
    }

    fn scan_all_functions(&mut self, cache: &mut AbbreviationsCache) -> Result<()> {
        let debug_info = self.section_data(SectionId::DebugInfo)?;
        let debug_abbrev = self.section_data(SectionId::DebugAbbrev)?;

        let mut functions = Vec::new();
        let mut cursor = EndianCursor::new(debug_info, self.endian);

        // The scratch buffers: one for the entry under inspection, one for
        // chasing a name reference. Only retained entries copy out of them.
        let mut attrs = Vec::new();
        let mut chase_attrs = Vec::new();

        while let Some(header) = parse_unit_header(&mut cursor)? {
            let abbrevs = cache.get(debug_abbrev, self.endian, header.debug_abbrev_offset)?;
            let padding_code = abbrevs.padding_code().filter(|&code| code < 0x80);
            let mut current_cu: Option<CompileUnit<'input>> = None;

            while cursor.pos() < header.end_offset {
                skip_padding(&mut cursor, header.end_offset, padding_code)?;
                if cursor.pos() >= header.end_offset {
                    break;
                }

                let (tag, has_children) =
                    match parse_die_attrs(&mut cursor, abbrevs, &header, &mut attrs)? {
                        Some(die) => die,
                        // A null entry closes a sibling list; skip it.
                        None => continue,
                    };

                match tag {
                    constants::DW_TAG_compile_unit => {
                        let die = Die::new(tag, has_children, attrs.clone());
                        current_cu = Some(self.build_compile_unit(&header, die)?);
                    }
                    constants::DW_TAG_subprogram
                    | constants::DW_TAG_inlined_subroutine
                    | constants::DW_TAG_entry_point => {
                        let cu = match &current_cu {
                            Some(cu) => cu,
                            // Function entries cannot precede their unit's
                            // root entry in well-formed data.
                            None => continue,
                        };
                        let name = self.resolve_function_name(
                            debug_info,
                            abbrevs,
                            &header,
                            cu,
                            &attrs,
                            &mut chase_attrs,
                        )?;
                        self.collect_function(cu, &attrs, name, &mut functions)?;
                    }
                    _ => {}
                }
            }

            cursor.seek_to(header.end_offset)?;
        }

        self.functions = functions;
        Ok(())
    }

    /// Find a function's name on its own entry or through up to three
    /// `DW_AT_abstract_origin`/`DW_AT_specification` hops.
    fn resolve_function_name(
        &self,
        debug_info: &'input [u8],
        abbrevs: &Abbreviations,
        header: &UnitHeader,
        cu: &CompileUnit<'input>,
        attrs: &[DieAttr<'input>],
        chase_attrs: &mut Vec<DieAttr<'input>>,
    ) -> Result<Option<&'input str>> {
        const MAX_HOPS: usize = 3;

        let mut chasing = false;
        for _ in 0..=MAX_HOPS {
            // Pull what this hop needs out of the borrow before the chase
            // buffer is overwritten; attribute values are `Copy`.
            let (name_value, reference) = {
                let current: &[DieAttr<'input>] = if chasing {
                    chase_attrs.as_slice()
                } else {
                    attrs
                };
                (
                    attr_of(current, constants::DW_AT_name).copied(),
                    attr_of(current, constants::DW_AT_abstract_origin)
                        .or_else(|| attr_of(current, constants::DW_AT_specification))
                        .copied(),
                )
            };

            if let Some(value) = name_value {
                return self.resolve_string(cu, &value).map(Some);
            }

            let offset = match reference {
                Some(FormValue::Ref(offset)) => offset,
                // Cross-unit and signature references are not chased; the
                // function is simply recorded without a name.
                _ => return Ok(None),
            };

            let unit_size = (header.end_offset - header.offset) as u64;
            if offset >= unit_size {
                return Err(Error::OffsetOutOfBounds(offset));
            }

            let mut cursor = EndianCursor::new(debug_info, self.endian);
            cursor.seek_to(header.offset + offset as usize)?;
            if parse_die_attrs(&mut cursor, abbrevs, header, chase_attrs)?.is_none() {
                return Ok(None);
            }
            chasing = true;
        }

        Ok(None)
    }

    /// Record `attrs`' function in `functions`: once per contiguous range,
    /// once per `DW_AT_ranges` entry, or once with no range at all if the
    /// entry at least has a name.
    fn collect_function(
        &self,
        cu: &CompileUnit<'input>,
        attrs: &[DieAttr<'input>],
        name: Option<&'input str>,
        functions: &mut Vec<Function<'input>>,
    ) -> Result<()> {
        // A failure to resolve the low PC against `.debug_addr` means this
        // entry has no usable range, not that the scan should die.
        let low_pc = match attr_of(attrs, constants::DW_AT_low_pc) {
            Some(value) => match self.resolve_address(cu, value) {
                Ok(address) => Some(address),
                Err(Error::MissingDebugInfo) => None,
                Err(err) => return Err(err),
            },
            None => None,
        };
        let high_pc = attr_of(attrs, constants::DW_AT_high_pc);

        if let (Some(low), Some(high)) = (low_pc, high_pc) {
            if let Some(end) = high_pc_to_end(low, high) {
                functions.push(Function {
                    name,
                    pc_range: Some(PcRange { start: low, end }),
                });
                return Ok(());
            }
        }

        if let Some(ranges_value) = attr_of(attrs, constants::DW_AT_ranges) {
            match self.ranges_from_value(cu, ranges_value) {
                Ok(mut iter) => {
                    let mut emitted = false;
                    while let Some(range) = iter.next()? {
                        functions.push(Function {
                            name,
                            pc_range: Some(range),
                        });
                        emitted = true;
                    }
                    if emitted {
                        return Ok(());
                    }
                }
                // No range list for this entry; fall through to the
                // name-only record.
                Err(Error::MissingDebugInfo) => {}
                Err(err) => return Err(err),
            }
        }

        if name.is_some() {
            functions.push(Function {
                name,
                pc_range: None,
            });
        }
        Ok(())
    }

    fn scan_all_compile_units(&mut self, cache: &mut AbbreviationsCache) -> Result<()> {
        let debug_info = self.section_data(SectionId::DebugInfo)?;
        let debug_abbrev = self.section_data(SectionId::DebugAbbrev)?;

        let mut compile_units = Vec::new();
        let mut cursor = EndianCursor::new(debug_info, self.endian);

        while let Some(header) = parse_unit_header(&mut cursor)? {
            let abbrevs = cache.get(debug_abbrev, self.endian, header.debug_abbrev_offset)?;

            if let Some(die) = parse_die(&mut cursor, abbrevs, &header)? {
                if die.tag == constants::DW_TAG_compile_unit {
                    compile_units.push(self.build_compile_unit(&header, die)?);
                }
            }

            cursor.seek_to(header.end_offset)?;
        }

        self.compile_units = compile_units;
        Ok(())
    }

    /// Derive a [`CompileUnit`] from a unit's root entry.
    fn build_compile_unit(
        &self,
        header: &UnitHeader,
        die: Die<'input>,
    ) -> Result<CompileUnit<'input>> {
        let base_of = |name: constants::DwAt| {
            die.attr(name)
                .and_then(|value| value.sec_offset().or_else(|| value.udata()))
                .unwrap_or(0)
        };
        let str_offsets_base = base_of(constants::DW_AT_str_offsets_base);
        let addr_base = base_of(constants::DW_AT_addr_base);
        let rnglists_base = base_of(constants::DW_AT_rnglists_base);
        let loclists_base = base_of(constants::DW_AT_loclists_base);
        let frame_base = die.attr(constants::DW_AT_frame_base).copied();

        let mut cu = CompileUnit {
            version: header.version,
            format: header.format,
            pc_range: None,
            str_offsets_base,
            addr_base,
            rnglists_base,
            loclists_base,
            frame_base,
            die,
        };

        if let Some(low_value) = cu.die.attr(constants::DW_AT_low_pc) {
            let low = match self.resolve_address(&cu, low_value) {
                Ok(address) => Some(address),
                Err(Error::MissingDebugInfo) => None,
                Err(err) => return Err(err),
            };
            if let (Some(low), Some(high)) = (low, cu.die.attr(constants::DW_AT_high_pc)) {
                if let Some(end) = high_pc_to_end(low, high) {
                    cu.pc_range = Some(PcRange { start: low, end });
                }
            }
        }

        Ok(cu)
    }

    /// Build the per-address unwind index.
    ///
    /// When `.eh_frame_hdr` is registered and parses, only its binary-search
    /// table is retained and later lookups go through it. Otherwise every
    /// entry of `.eh_frame` and `.debug_frame` is decoded up front: CIEs
    /// into a map keyed by their length-field offset, FDEs into a list
    /// sorted by `pc_begin`.
    ///
    /// `base_address` is the module's load address, used to translate each
    /// section's virtual address into runtime addresses.
    pub fn scan_all_unwind_info(&mut self, base_address: u64) -> Result<()> {
        self.base_address = base_address;

        if let Some(section) = self.section(SectionId::EhFrameHdr) {
            let header_address = section.runtime_address(base_address, 0);
            match ExceptionFrameHeader::parse(section.data, header_address, self.endian) {
                Ok(header) => {
                    debug!(
                        fde_count = header.fde_count,
                        "using the .eh_frame_hdr search table"
                    );
                    self.eh_frame_hdr = Some(header);
                    return Ok(());
                }
                Err(err) => {
                    // A broken auxiliary index should not disable unwinding
                    // while the primary sections are intact.
                    debug!(error = %err, "malformed .eh_frame_hdr, falling back to a full scan");
                }
            }
        }

        let mut cies = HashMap::new();
        let mut fdes = Vec::new();

        for (id, kind) in [
            (SectionId::EhFrame, FrameSectionKind::EhFrame),
            (SectionId::DebugFrame, FrameSectionKind::DebugFrame),
        ] {
            let section = match self.section(id) {
                Some(section) => *section,
                None => continue,
            };
            let ctx = FrameContext {
                data: section.data,
                section_address: section.runtime_address(base_address, 0),
                endian: self.endian,
                kind,
                validator: None,
            };

            let mut cursor = ctx.cursor();
            while !cursor.is_empty() {
                let header = EntryHeader::read(&mut cursor, kind)?;
                match header.kind {
                    EntryKind::Terminator => break,
                    EntryKind::Cie => {
                        let cie = CommonInformationEntry::parse(&ctx, &header)?;
                        cies.insert(cie.length_offset, cie);
                    }
                    EntryKind::Fde { cie_length_offset } => {
                        let cie = cies
                            .get(&cie_length_offset)
                            .ok_or(Error::InvalidFrameDescriptionEntry)?;
                        fdes.push(FrameDescriptionEntry::parse(&ctx, &header, cie)?);
                    }
                }
            }
        }

        // Ties are impossible in well-formed data, so an unstable sort is
        // fine.
        fdes.sort_unstable_by_key(|fde| fde.pc_begin);

        debug!(
            cies = cies.len(),
            fdes = fdes.len(),
            "scanned call frame information"
        );
        self.cies = cies;
        self.fdes = fdes;
        Ok(())
    }

    /// The CIE/FDE pair needed to virtually unwind one frame at `address`.
    ///
    /// `validator` gates dereferences when the unwind data aliases live
    /// process memory; pass `None` when every relevant section was
    /// registered from a file.
    pub fn frame_entry_for_address(
        &self,
        address: u64,
        validator: Option<&'input dyn MemoryValidator>,
    ) -> Result<(CommonInformationEntry<'input>, FrameDescriptionEntry<'input>)> {
        if let Some(header) = &self.eh_frame_hdr {
            if let Some(section) = self.section(SectionId::EhFrame) {
                let fde_ptr = header.find_fde_pointer(self.endian, validator, address)?;
                let offset = fde_ptr
                    .checked_sub(header.eh_frame_ptr)
                    .ok_or(Error::OffsetOutOfBounds(fde_ptr))?;
                let ctx = FrameContext {
                    data: section.data,
                    section_address: section.runtime_address(self.base_address, 0),
                    endian: self.endian,
                    kind: FrameSectionKind::EhFrame,
                    validator,
                };
                let (cie, fde) = parse_fde_and_cie(
                    &ctx,
                    usize::try_from(offset).map_err(|_| Error::Overflow)?,
                )?;
                if !fde.contains(address) {
                    return Err(Error::MissingDebugInfo);
                }
                return Ok((cie, fde));
            }
            // Without a registered `.eh_frame`, the FDE bytes are read out
            // of live memory at the header's pointer.
            return header.find_entry(self.endian, validator, None, address);
        }

        let index = self.fdes.partition_point(|fde| fde.pc_begin <= address);
        if index == 0 {
            return Err(Error::MissingDebugInfo);
        }
        let fde = &self.fdes[index - 1];
        if !fde.contains(address) {
            return Err(Error::MissingDebugInfo);
        }
        let cie = self
            .cies
            .get(&fde.cie_length_offset)
            .ok_or(Error::MissingDebugInfo)?;
        Ok((cie.clone(), fde.clone()))
    }
}

fn attr_of<'a, 'input>(
    attrs: &'a [DieAttr<'input>],
    name: constants::DwAt,
) -> Option<&'a FormValue<'input>> {
    attrs
        .iter()
        .find(|(attr_name, _)| *attr_name == name)
        .map(|(_, value)| value)
}

/// `DW_AT_high_pc` is an absolute address when its form is address-class and
/// an offset from the low PC when it is constant-class.
fn high_pc_to_end(low: u64, high: &FormValue<'_>) -> Option<u64> {
    match *high {
        FormValue::Addr(end) => Some(end),
        ref value => value.udata().map(|offset| low.wrapping_add(offset)),
    }
}

/// Skip runs of null-entry bytes and of a single-byte padding abbreviation
/// code so padded function tails do not cost a decode each.
fn skip_padding<Endian>(
    cursor: &mut EndianCursor<'_, Endian>,
    end: usize,
    padding_code: Option<u64>,
) -> Result<()>
where
    Endian: Endianity,
{
    let data = cursor.data();
    let mut pos = cursor.pos();
    while pos < end {
        let byte = data[pos];
        if byte != 0 && Some(u64::from(byte)) != padding_code {
            break;
        }
        pos += 1;
    }
    cursor.seek_to(pos)
}

fn string_at(data: &[u8], offset: u64) -> Result<&str> {
    let start = usize::try_from(offset).map_err(|_| Error::Overflow)?;
    if start > data.len() {
        return Err(Error::OffsetOutOfBounds(offset));
    }
    let rest = &data[start..];
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::UnexpectedEof)?;
    str_from_bytes(&rest[..end])
}

fn str_from_bytes(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| Error::BadUtf8)
}
