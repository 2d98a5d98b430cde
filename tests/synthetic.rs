//! End-to-end tests against synthesized debug sections.
//!
//! Each test builds complete section images in memory with `test_assembler`
//! and drives the public API the way a symbolizer or unwinder would.

use std::mem;
use std::path::PathBuf;

use test_assembler::{Endian, Label, LabelMaker, Section as Asm};

use dwalin::constants::*;
use dwalin::{Dwarf, Error, Format, Section, SectionId};

fn native_endian() -> Endian {
    if cfg!(target_endian = "little") {
        Endian::Little
    } else {
        Endian::Big
    }
}

fn asm() -> Asm {
    Asm::with_endian(native_endian())
}

fn native() -> dwalin::NativeEndian {
    dwalin::NativeEndian::default()
}

trait AsmMethods: Sized {
    fn uleb(self, val: u64) -> Self;
    fn sleb(self, val: i64) -> Self;
    /// A native-word address.
    fn word(self, val: u64) -> Self;
    /// A 32-bit initial length field, patched once the end label resolves.
    fn initial_length32(self, length: &Label, start: &Label) -> Self;
}

impl AsmMethods for Asm {
    fn uleb(self, val: u64) -> Self {
        let mut buf = Vec::new();
        leb128::write::unsigned(&mut buf, val).unwrap();
        self.append_bytes(&buf)
    }

    fn sleb(self, val: i64) -> Self {
        let mut buf = Vec::new();
        leb128::write::signed(&mut buf, val).unwrap();
        self.append_bytes(&buf)
    }

    fn word(self, val: u64) -> Self {
        match mem::size_of::<usize>() {
            8 => self.D64(val),
            4 => self.D32(val as u32),
            _ => panic!("unsupported word size"),
        }
    }

    fn initial_length32(self, length: &Label, start: &Label) -> Self {
        self.D32(length).mark(start)
    }
}

fn finish(section: Asm, length: &Label, start: &Label) -> Vec<u8> {
    let end = Label::new();
    let section = section.mark(&end);
    length.set_const((&end - start) as u64);
    section.get_contents().unwrap()
}

fn native_word_size() -> u8 {
    mem::size_of::<usize>() as u8
}

/// Scenario: one 32-bit DWARF 4 compilation unit with two functions and a
/// line table.
mod dwarf4_unit {
    use super::*;

    fn debug_abbrev() -> Vec<u8> {
        asm()
            // Code 1: DW_TAG_compile_unit, has children.
            .uleb(1)
            .uleb(DW_TAG_compile_unit.0)
            .D8(DW_CHILDREN_yes.0)
            .uleb(DW_AT_name.0)
            .uleb(DW_FORM_string.0)
            .uleb(DW_AT_comp_dir.0)
            .uleb(DW_FORM_string.0)
            .uleb(DW_AT_low_pc.0)
            .uleb(DW_FORM_addr.0)
            .uleb(DW_AT_high_pc.0)
            .uleb(DW_FORM_udata.0)
            .uleb(DW_AT_stmt_list.0)
            .uleb(DW_FORM_sec_offset.0)
            .uleb(0)
            .uleb(0)
            // Code 2: DW_TAG_subprogram, no children.
            .uleb(2)
            .uleb(DW_TAG_subprogram.0)
            .D8(DW_CHILDREN_no.0)
            .uleb(DW_AT_name.0)
            .uleb(DW_FORM_string.0)
            .uleb(DW_AT_low_pc.0)
            .uleb(DW_FORM_addr.0)
            .uleb(DW_AT_high_pc.0)
            .uleb(DW_FORM_udata.0)
            .uleb(0)
            .uleb(0)
            // End of the table.
            .uleb(0)
            .get_contents()
            .unwrap()
    }

    fn debug_info() -> Vec<u8> {
        let length = Label::new();
        let start = Label::new();
        let section = asm()
            .initial_length32(&length, &start)
            // Version 4, abbreviation offset, address size.
            .D16(4)
            .D32(0)
            .D8(native_word_size())
            // Root DIE.
            .uleb(1)
            .append_bytes(b"demo\0")
            .append_bytes(b"/src\0")
            .word(0x1000)
            .uleb(0x100)
            .D32(0)
            // Function "alpha": [0x1000, 0x1040).
            .uleb(2)
            .append_bytes(b"alpha\0")
            .word(0x1000)
            .uleb(0x40)
            // Function "beta": [0x1040, 0x1080).
            .uleb(2)
            .append_bytes(b"beta\0")
            .word(0x1040)
            .uleb(0x40)
            // Null DIE closing the unit's children.
            .uleb(0);
        finish(section, &length, &start)
    }

    fn debug_line() -> Vec<u8> {
        let unit_length = Label::new();
        let unit_start = Label::new();
        let header_length = Label::new();
        let header_start = Label::new();
        let program_start = Label::new();

        let section = asm()
            .initial_length32(&unit_length, &unit_start)
            .D16(4)
            .D32(&header_length)
            .mark(&header_start)
            // minimum_instruction_length, maximum_operations_per_instruction.
            .D8(1)
            .D8(1)
            // default_is_stmt, line_base, line_range, opcode_base.
            .D8(1)
            .D8(1)
            .D8(1)
            .D8(13)
            // standard_opcode_lengths for opcodes 1-12.
            .append_bytes(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1])
            // No include directories.
            .D8(0)
            // File 1: "demo.c", directory 0.
            .append_bytes(b"demo.c\0")
            .uleb(0)
            .uleb(0)
            .uleb(0)
            // End of the file table.
            .D8(0)
            .mark(&program_start)
            // DW_LNE_set_address 0x1040.
            .D8(0)
            .uleb(1 + u64::from(native_word_size()))
            .D8(DW_LNE_set_address.0)
            .word(0x1040)
            // DW_LNS_advance_line +9, DW_LNS_copy: row (0x1040, line 10).
            .D8(DW_LNS_advance_line.0)
            .sleb(9)
            .D8(DW_LNS_copy.0)
            // DW_LNS_advance_pc 0x20, advance_line +2, copy:
            // row (0x1060, line 12).
            .D8(DW_LNS_advance_pc.0)
            .uleb(0x20)
            .D8(DW_LNS_advance_line.0)
            .sleb(2)
            .D8(DW_LNS_copy.0)
            // DW_LNS_advance_pc 0x20, DW_LNE_end_sequence: the sequence
            // covers up to 0x1080.
            .D8(DW_LNS_advance_pc.0)
            .uleb(0x20)
            .D8(0)
            .uleb(1)
            .D8(DW_LNE_end_sequence.0);

        header_length.set_const((&program_start - &header_start) as u64);
        finish(section, &unit_length, &unit_start)
    }

    fn build<'a>(abbrev: &'a [u8], info: &'a [u8], line: &'a [u8]) -> Dwarf<'a> {
        let mut dwarf = Dwarf::native();
        dwarf.set_section(SectionId::DebugAbbrev, Section::new(abbrev, None));
        dwarf.set_section(SectionId::DebugInfo, Section::new(info, None));
        dwarf.set_section(SectionId::DebugLine, Section::new(line, None));
        dwarf.open().unwrap();
        dwarf
    }

    #[test]
    fn symbolication() {
        let (abbrev, info, line) = (debug_abbrev(), debug_info(), debug_line());
        let dwarf = build(&abbrev, &info, &line);

        assert_eq!(dwarf.functions().len(), 2);
        assert_eq!(dwarf.get_symbol_name(0x1005), Some("alpha"));
        assert_eq!(dwarf.get_symbol_name(0x1045), Some("beta"));
        assert_eq!(dwarf.get_symbol_name(0x1080), None);

        let cu = dwarf.find_compile_unit(0x1040).unwrap();
        assert_eq!(cu.version, 4);
        assert_eq!(cu.format, Format::Dwarf32);

        let location = dwarf.get_line_number_info(cu, 0x1045).unwrap();
        assert_eq!(location.file_name, PathBuf::from("/src/demo.c"));
        assert_eq!(location.line, 10);
        assert_eq!(location.column, 0);

        // A target equal to a row's address belongs to that row's range.
        let location = dwarf.get_line_number_info(cu, 0x1060).unwrap();
        assert_eq!(location.line, 12);

        // Before the first row of the sequence there is no answer.
        assert_eq!(
            dwarf.get_line_number_info(cu, 0x103f),
            Err(Error::MissingDebugInfo)
        );
    }

    #[test]
    fn lookup_misses_are_missing_debug_info() {
        let (abbrev, info, line) = (debug_abbrev(), debug_info(), debug_line());
        let dwarf = build(&abbrev, &info, &line);

        match dwarf.find_compile_unit(0x9000_0000) {
            Err(Error::MissingDebugInfo) => {}
            otherwise => panic!("Unexpected result: {:?}", otherwise),
        }
    }

    #[test]
    fn truncated_debug_info_is_invalid_not_missing() {
        let abbrev = debug_abbrev();
        let mut info = debug_info();
        // Chop the section mid-DIE, but patch the unit length so the header
        // still claims the missing bytes.
        let lost = 10;
        let claimed = (info.len() - 4) as u32;
        info[0..4].copy_from_slice(&if cfg!(target_endian = "little") {
            claimed.to_le_bytes()
        } else {
            claimed.to_be_bytes()
        });
        info.truncate(info.len() - lost);

        let mut dwarf = Dwarf::native();
        dwarf.set_section(SectionId::DebugAbbrev, Section::new(&abbrev, None));
        dwarf.set_section(SectionId::DebugInfo, Section::new(&info, None));
        match dwarf.open() {
            Err(err) => assert!(!err.is_missing_debug_info()),
            Ok(()) => panic!("Truncated .debug_info should not parse"),
        }
    }

    #[test]
    fn open_without_debug_info_is_missing() {
        let abbrev = debug_abbrev();
        let mut dwarf = Dwarf::native();
        dwarf.set_section(SectionId::DebugAbbrev, Section::new(&abbrev, None));
        assert_eq!(dwarf.open(), Err(Error::MissingDebugInfo));
    }
}

/// Scenario: a DWARF 5 unit whose strings go through `.debug_str_offsets`
/// and whose addresses go through `.debug_addr`.
mod dwarf5_indexed_forms {
    use super::*;

    fn debug_str() -> Vec<u8> {
        b"main\0ignored\0".to_vec()
    }

    fn debug_str_offsets() -> Vec<u8> {
        let length = Label::new();
        let start = Label::new();
        let section = asm()
            .initial_length32(&length, &start)
            // Version 5, padding.
            .D16(5)
            .D16(0)
            // Slot 0: "main" at offset 0 of .debug_str.
            .D32(0);
        finish(section, &length, &start)
    }

    fn debug_addr() -> Vec<u8> {
        let length = Label::new();
        let start = Label::new();
        let section = asm()
            .initial_length32(&length, &start)
            .D16(5)
            .D8(native_word_size())
            .D8(0)
            // Element 0.
            .word(0x2000);
        finish(section, &length, &start)
    }

    fn debug_abbrev() -> Vec<u8> {
        asm()
            .uleb(1)
            .uleb(DW_TAG_compile_unit.0)
            .D8(DW_CHILDREN_yes.0)
            .uleb(DW_AT_str_offsets_base.0)
            .uleb(DW_FORM_sec_offset.0)
            .uleb(DW_AT_addr_base.0)
            .uleb(DW_FORM_sec_offset.0)
            .uleb(DW_AT_low_pc.0)
            .uleb(DW_FORM_addrx1.0)
            .uleb(DW_AT_high_pc.0)
            .uleb(DW_FORM_udata.0)
            .uleb(0)
            .uleb(0)
            .uleb(2)
            .uleb(DW_TAG_subprogram.0)
            .D8(DW_CHILDREN_no.0)
            .uleb(DW_AT_name.0)
            .uleb(DW_FORM_strx1.0)
            .uleb(DW_AT_low_pc.0)
            .uleb(DW_FORM_addrx1.0)
            .uleb(DW_AT_high_pc.0)
            .uleb(DW_FORM_udata.0)
            .uleb(0)
            .uleb(0)
            .uleb(0)
            .get_contents()
            .unwrap()
    }

    fn debug_info() -> Vec<u8> {
        let length = Label::new();
        let start = Label::new();
        let section = asm()
            .initial_length32(&length, &start)
            // Version 5, DW_UT_compile, address size, abbreviation offset.
            .D16(5)
            .D8(DW_UT_compile.0)
            .D8(native_word_size())
            .D32(0)
            // Root DIE: bases point past the section headers.
            .uleb(1)
            .D32(8)
            .D32(8)
            .D8(0)
            .uleb(0x100)
            // Function "main": [0x2000, 0x2050).
            .uleb(2)
            .D8(0)
            .D8(0)
            .uleb(0x50)
            .uleb(0);
        finish(section, &length, &start)
    }

    #[test]
    fn strx_and_addrx_resolve() {
        let (str_section, str_offsets, addr, abbrev, info) = (
            debug_str(),
            debug_str_offsets(),
            debug_addr(),
            debug_abbrev(),
            debug_info(),
        );

        let mut dwarf = Dwarf::native();
        dwarf.set_section(SectionId::DebugStr, Section::new(&str_section, None));
        dwarf.set_section(SectionId::DebugStrOffsets, Section::new(&str_offsets, None));
        dwarf.set_section(SectionId::DebugAddr, Section::new(&addr, None));
        dwarf.set_section(SectionId::DebugAbbrev, Section::new(&abbrev, None));
        dwarf.set_section(SectionId::DebugInfo, Section::new(&info, None));
        dwarf.open().unwrap();

        assert_eq!(dwarf.get_symbol_name(0x2010), Some("main"));
        assert_eq!(dwarf.get_symbol_name(0x2050), None);

        let cu = dwarf.find_compile_unit(0x20ff).unwrap();
        assert_eq!(cu.str_offsets_base, 8);
        assert_eq!(cu.addr_base, 8);
        assert_eq!(cu.pc_range.unwrap().start, 0x2000);
    }
}

/// Scenario: a unit whose PC coverage comes from a `.debug_rnglists` range
/// list mixing `base_addressx`, `offset_pair`, and `end_of_list`.
mod rnglists_ranges {
    use super::*;

    fn debug_addr() -> Vec<u8> {
        let length = Label::new();
        let start = Label::new();
        let section = asm()
            .initial_length32(&length, &start)
            .D16(5)
            .D8(native_word_size())
            .D8(0)
            .word(0x4000);
        finish(section, &length, &start)
    }

    fn debug_rnglists() -> Vec<u8> {
        asm()
            .D8(DW_RLE_base_addressx.0)
            .uleb(0)
            .D8(DW_RLE_offset_pair.0)
            .uleb(0)
            .uleb(0x10)
            .D8(DW_RLE_offset_pair.0)
            .uleb(0x20)
            .uleb(0x30)
            .D8(DW_RLE_end_of_list.0)
            .get_contents()
            .unwrap()
    }

    fn debug_abbrev() -> Vec<u8> {
        asm()
            .uleb(1)
            .uleb(DW_TAG_compile_unit.0)
            .D8(DW_CHILDREN_no.0)
            .uleb(DW_AT_addr_base.0)
            .uleb(DW_FORM_sec_offset.0)
            .uleb(DW_AT_ranges.0)
            .uleb(DW_FORM_sec_offset.0)
            .uleb(0)
            .uleb(0)
            .uleb(0)
            .get_contents()
            .unwrap()
    }

    fn debug_info() -> Vec<u8> {
        let length = Label::new();
        let start = Label::new();
        let section = asm()
            .initial_length32(&length, &start)
            .D16(5)
            .D8(DW_UT_compile.0)
            .D8(native_word_size())
            .D32(0)
            .uleb(1)
            .D32(8)
            .D32(0);
        finish(section, &length, &start)
    }

    #[test]
    fn ranges_drive_unit_lookup() {
        let (addr, rnglists, abbrev, info) =
            (debug_addr(), debug_rnglists(), debug_abbrev(), debug_info());

        let mut dwarf = Dwarf::native();
        dwarf.set_section(SectionId::DebugAddr, Section::new(&addr, None));
        dwarf.set_section(SectionId::DebugRnglists, Section::new(&rnglists, None));
        dwarf.set_section(SectionId::DebugAbbrev, Section::new(&abbrev, None));
        dwarf.set_section(SectionId::DebugInfo, Section::new(&info, None));
        dwarf.open().unwrap();

        let cu = &dwarf.compile_units()[0];
        assert_eq!(cu.pc_range, None);

        let mut iter = dwarf.ranges(cu, &cu.die).unwrap();
        let first = iter.next().unwrap().unwrap();
        let second = iter.next().unwrap().unwrap();
        assert_eq!((first.start, first.end), (0x4000, 0x4010));
        assert_eq!((second.start, second.end), (0x4020, 0x4030));
        assert_eq!(iter.next().unwrap(), None);

        assert!(dwarf.find_compile_unit(0x4025).is_ok());
        assert_eq!(
            dwarf.find_compile_unit(0x4015),
            Err(Error::MissingDebugInfo)
        );
    }
}

/// Scenario: an `.eh_frame` with one `zR` CIE and three FDEs, indexed both
/// by a full scan and by a synthetic `.eh_frame_hdr`.
mod eh_frame_unwind {
    use super::*;

    const BASE: u64 = 0x7_0000;
    const EH_FRAME_VA: u64 = 0x100;
    const EH_FRAME_HDR_VA: u64 = 0x200;

    /// Build the `.eh_frame` image and return it along with the section
    /// offsets of the three FDEs (for functions at 0x5000, 0x5010, 0x5020).
    fn eh_frame() -> (Vec<u8>, [u64; 3]) {
        let section_start = Label::new();
        let mut section = asm().mark(&section_start);

        // The CIE, at offset 0, augmentation "zR" with an absptr FDE
        // pointer encoding.
        let cie_length = Label::new();
        let cie_start = Label::new();
        let cie_end = Label::new();
        section = section
            .initial_length32(&cie_length, &cie_start)
            .D32(0)
            .D8(1)
            .append_bytes(b"zR\0")
            .uleb(1)
            .sleb(-8)
            .uleb(16)
            .uleb(1)
            .D8(DW_EH_PE_absptr.0)
            // DW_CFA_nop padding.
            .append_bytes(&[0, 0, 0])
            .mark(&cie_end);
        cie_length.set_const((&cie_end - &cie_start) as u64);

        // Three FDEs, deliberately out of PC order so the scan has
        // something to sort.
        let mut offsets = Vec::new();
        for pc_begin in [0x5010u64, 0x5000, 0x5020] {
            let fde_length = Label::new();
            let fde_label = Label::new();
            let fde_start = Label::new();
            let fde_end = Label::new();
            let id_pos = Label::new();
            let id_value = Label::new();
            section = section
                .mark(&fde_label)
                .initial_length32(&fde_length, &fde_start)
                .mark(&id_pos)
                .D32(&id_value)
                .word(pc_begin)
                .word(0x10)
                // Augmentation data length.
                .uleb(0)
                // DW_CFA_nop.
                .D8(0)
                .mark(&fde_end);
            fde_length.set_const((&fde_end - &fde_start) as u64);
            // The id points back from its own field to the CIE's length
            // field at offset 0.
            id_value.set_const((&id_pos - &section_start) as u64);
            offsets.push(fde_label);
        }

        // The zero terminator entry.
        section = section.D32(0);

        let offsets = [
            (&offsets[0] - &section_start) as u64,
            (&offsets[1] - &section_start) as u64,
            (&offsets[2] - &section_start) as u64,
        ];
        (section.get_contents().unwrap(), offsets)
    }

    /// Build the `.eh_frame_hdr` image: absptr frame pointer, udata4 count,
    /// and a datarel|sdata4 search table sorted by initial PC.
    fn eh_frame_hdr(fde_offsets: &[u64; 3]) -> Vec<u8> {
        let hdr_address = BASE + EH_FRAME_HDR_VA;
        let eh_frame_address = BASE + EH_FRAME_VA;
        let table_enc = DW_EH_PE_datarel.0 | DW_EH_PE_sdata4.0;

        let datarel = |value: u64| (value.wrapping_sub(hdr_address)) as i64 as i32 as u32;

        // Table rows sorted ascending by PC: 0x5000, 0x5010, 0x5020 map to
        // the second, first, and third FDE as emitted.
        let rows = [
            (0x5000u64, eh_frame_address + fde_offsets[1]),
            (0x5010, eh_frame_address + fde_offsets[0]),
            (0x5020, eh_frame_address + fde_offsets[2]),
        ];

        let mut section = asm()
            .D8(1)
            .D8(DW_EH_PE_absptr.0)
            .D8(DW_EH_PE_udata4.0)
            .D8(table_enc)
            .word(eh_frame_address)
            .D32(3);
        for (pc, fde_ptr) in rows {
            section = section.D32(datarel(pc)).D32(datarel(fde_ptr));
        }
        section.get_contents().unwrap()
    }

    #[test]
    fn full_scan_sorts_fdes() {
        let (frame, _) = eh_frame();
        let mut dwarf = Dwarf::native();
        dwarf.set_section(SectionId::EhFrame, Section::new(&frame, Some(EH_FRAME_VA)));
        dwarf.scan_all_unwind_info(BASE).unwrap();

        let fdes = dwarf.frame_descriptions();
        assert_eq!(fdes.len(), 3);
        assert!(fdes.windows(2).all(|w| w[0].pc_begin <= w[1].pc_begin));
        assert_eq!(fdes[0].pc_begin, 0x5000);
        assert_eq!(fdes[2].pc_begin, 0x5020);

        let (cie, fde) = dwarf.frame_entry_for_address(0x5015, None).unwrap();
        assert_eq!(fde.pc_begin, 0x5010);
        assert_eq!(fde.pc_range, 0x10);
        assert_eq!(cie.aug_str, b"zR");
        assert_eq!(cie.return_address_register, 16);

        assert_eq!(
            dwarf.frame_entry_for_address(0x4fff, None),
            Err(Error::MissingDebugInfo)
        );
        assert_eq!(
            dwarf.frame_entry_for_address(0x5030, None),
            Err(Error::MissingDebugInfo)
        );
    }

    #[test]
    fn header_table_lookup() {
        let (frame, offsets) = eh_frame();
        let hdr = eh_frame_hdr(&offsets);

        let mut dwarf = Dwarf::native();
        dwarf.set_section(SectionId::EhFrame, Section::new(&frame, Some(EH_FRAME_VA)));
        dwarf.set_section(
            SectionId::EhFrameHdr,
            Section::new(&hdr, Some(EH_FRAME_HDR_VA)),
        );
        dwarf.scan_all_unwind_info(BASE).unwrap();

        // The header supplies the index; no FDE list is built.
        let header = dwarf.exception_frame_header().unwrap();
        assert_eq!(header.fde_count, 3);
        assert_eq!(header.eh_frame_ptr, BASE + EH_FRAME_VA);
        assert!(dwarf.frame_descriptions().is_empty());

        for (pc, expected_begin) in [
            (0x5000u64, 0x5000u64),
            (0x5005, 0x5000),
            (0x5010, 0x5010),
            (0x501f, 0x5010),
            (0x502f, 0x5020),
        ] {
            let (_, fde) = dwarf.frame_entry_for_address(pc, None).unwrap();
            assert_eq!(fde.pc_begin, expected_begin, "pc = {:#x}", pc);
            assert!(fde.contains(pc));
        }

        assert_eq!(
            dwarf.frame_entry_for_address(0x4fff, None),
            Err(Error::MissingDebugInfo)
        );
        assert_eq!(
            dwarf.frame_entry_for_address(0x5030, None),
            Err(Error::MissingDebugInfo)
        );
    }

    /// An `.eh_frame_hdr` image for the in-process path: version 1, an
    /// absptr frame pointer naming the frame bytes' real address, and a
    /// udata8 search table of absolute PCs and FDE addresses.
    fn in_memory_hdr(frame: &[u8], fde_offsets: &[u64; 3]) -> Vec<u8> {
        let mut hdr = asm()
            .D8(1)
            .D8(DW_EH_PE_absptr.0)
            .D8(DW_EH_PE_udata4.0)
            .D8(DW_EH_PE_udata8.0)
            .word(frame.as_ptr() as u64)
            .D32(3)
            .get_contents()
            .unwrap();
        let rows = [
            (0x5000u64, frame.as_ptr() as u64 + fde_offsets[1]),
            (0x5010, frame.as_ptr() as u64 + fde_offsets[0]),
            (0x5020, frame.as_ptr() as u64 + fde_offsets[2]),
        ];
        for (pc, fde_ptr) in rows {
            hdr.extend_from_slice(&pc.to_ne_bytes());
            hdr.extend_from_slice(&fde_ptr.to_ne_bytes());
        }
        hdr
    }

    #[test]
    fn header_in_memory_lookup() {
        // The in-process path: no registered `.eh_frame`, the header points
        // at the frame bytes by their real address.
        let (frame, offsets) = eh_frame();
        let hdr = in_memory_hdr(&frame, &offsets);

        let header =
            dwalin::ExceptionFrameHeader::parse(&hdr, hdr.as_ptr() as u64, native()).unwrap();
        let (cie, fde) = header
            .find_entry(native(), None, Some(frame.len()), 0x5012)
            .unwrap();
        assert_eq!(fde.pc_begin, 0x5010);
        assert_eq!(cie.aug_str, b"zR");

        assert_eq!(
            header.find_entry(native(), None, Some(frame.len()), 0x6000),
            Err(Error::MissingDebugInfo)
        );
    }

    /// Accepts reads that fall entirely inside one of two buffers, the way a
    /// real process-map validator accepts reads inside one mapping.
    struct SpanValidator {
        spans: [(u64, u64); 2],
    }

    impl dwalin::MemoryValidator for SpanValidator {
        fn is_valid_memory(&self, address: u64, length: u64) -> bool {
            self.spans.iter().any(|&(start, len)| {
                address >= start && address.saturating_add(length) <= start.saturating_add(len)
            })
        }
    }

    #[test]
    fn header_in_memory_lookup_unknown_extent() {
        // Same in-process path, but the caller does not know how long
        // `.eh_frame` is; the validator bounds every read instead, and the
        // lookup must stay inside what it vouches for.
        let (frame, offsets) = eh_frame();
        let hdr = in_memory_hdr(&frame, &offsets);

        let validator = SpanValidator {
            spans: [
                (frame.as_ptr() as u64, frame.len() as u64),
                (hdr.as_ptr() as u64, hdr.len() as u64),
            ],
        };

        let header =
            dwalin::ExceptionFrameHeader::parse(&hdr, hdr.as_ptr() as u64, native()).unwrap();
        for (pc, expected_begin) in [(0x5002u64, 0x5000u64), (0x5012, 0x5010), (0x502f, 0x5020)] {
            let (cie, fde) = header
                .find_entry(native(), Some(&validator), None, pc)
                .unwrap();
            assert_eq!(fde.pc_begin, expected_begin, "pc = {:#x}", pc);
            assert_eq!(cie.aug_str, b"zR");
        }

        // Without either an extent or a validator the lookup refuses to
        // touch memory at all.
        match header.find_entry(native(), None, None, 0x5012) {
            Err(Error::InvalidMemory(_)) => {}
            otherwise => panic!("Unexpected result: {:?}", otherwise),
        }
    }
}

/// Scenario: a 64-bit `.debug_frame` CIE (version 4) and its FDE.
mod debug_frame_64 {
    use super::*;

    fn debug_frame() -> Vec<u8> {
        let cie_length = Label::new();
        let cie_start = Label::new();
        let cie_end = Label::new();

        let mut section = asm()
            // 64-bit initial length.
            .D32(0xffff_ffff)
            .D64(&cie_length)
            .mark(&cie_start)
            // 64-bit CIE sentinel.
            .D64(0xffff_ffff_ffff_ffffu64)
            .D8(4)
            // Empty augmentation.
            .D8(0)
            // Address size, segment selector size.
            .D8(native_word_size())
            .D8(0)
            .uleb(1)
            .sleb(-8)
            .uleb(16)
            .mark(&cie_end);
        cie_length.set_const((&cie_end - &cie_start) as u64);

        let fde_length = Label::new();
        let fde_start = Label::new();
        let fde_end = Label::new();
        section = section
            .D32(0xffff_ffff)
            .D64(&fde_length)
            .mark(&fde_start)
            // The CIE's section offset.
            .D64(0)
            .word(0x1000)
            .word(0x20)
            .D8(0)
            .mark(&fde_end);
        fde_length.set_const((&fde_end - &fde_start) as u64);

        section.get_contents().unwrap()
    }

    #[test]
    fn scan_and_lookup() {
        let frame = debug_frame();
        let mut dwarf = Dwarf::native();
        dwarf.set_section(SectionId::DebugFrame, Section::new(&frame, None));
        dwarf.scan_all_unwind_info(0).unwrap();

        assert_eq!(dwarf.frame_descriptions().len(), 1);

        let (cie, fde) = dwarf.frame_entry_for_address(0x1010, None).unwrap();
        assert_eq!(cie.format, Format::Dwarf64);
        assert_eq!(cie.version, 4);
        assert_eq!(cie.length_offset, 0);
        // The FDE names its CIE by the CIE's length-field offset.
        assert_eq!(fde.cie_length_offset, 0);
        assert_eq!(fde.pc_begin, 0x1000);
        assert_eq!(fde.pc_range, 0x20);

        assert_eq!(
            dwarf.frame_entry_for_address(0x1020, None),
            Err(Error::MissingDebugInfo)
        );
    }
}
