//! A zero-copy reader for the DWARF debugging format and the System V
//! `.eh_frame` / `.eh_frame_hdr` unwind tables.
//!
//! `dwalin` answers two questions about a target program, given a runtime
//! instruction address:
//!
//! * which function encloses the address, and which source file, line, and
//!   column produced it (symbolication), and
//! * which Common Information Entry and Frame Description Entry describe how
//!   to virtually unwind one stack frame at that address.
//!
//! The caller extracts the raw debug section bytes from its object container
//! (ELF, Mach-O, COFF) however it likes and registers them in a [`Dwarf`]
//! object; everything this crate returns borrows from those bytes.
//!
//! ```rust,no_run
//! # fn example() -> dwalin::Result<()> {
//! # let load_section = |_: dwalin::SectionId| -> &'static [u8] { unimplemented!() };
//! use dwalin::{Dwarf, LittleEndian, Section, SectionId};
//!
//! let mut dwarf = Dwarf::new(LittleEndian);
//! for id in SectionId::ALL {
//!     dwarf.set_section(id, Section::new(load_section(id), None));
//! }
//! dwarf.open()?;
//! dwarf.scan_all_unwind_info(0)?;
//!
//! let pc = 0x4010a0;
//! if let Some(name) = dwarf.get_symbol_name(pc) {
//!     let cu = dwarf.find_compile_unit(pc)?;
//!     let location = dwarf.get_line_number_info(cu, pc)?;
//!     println!("{}: {}:{}", name, location.file_name.display(), location.line);
//! }
//! let (_cie, _fde) = dwarf.frame_entry_for_address(pc, None)?;
//! # Ok(())
//! # }
//! ```
//!
//! DWARF versions 2 through 5 are supported. Writing DWARF, type units,
//! split DWARF, and non-native target address sizes are out of scope, as are
//! the expression and call-frame instruction interpreters; their instruction
//! streams are exposed as raw borrowed buffers for a sibling crate to
//! consume.

#![warn(missing_docs)]

pub mod constants;

mod abbrev;
mod addr;
mod cfi;
mod common;
mod cursor;
mod dwarf;
mod endianity;
mod line;
mod ranges;
mod section;
mod unit;

pub use crate::abbrev::{Abbreviation, Abbreviations, AbbreviationsCache, AttributeSpecification};
pub use crate::cfi::{
    CommonInformationEntry, EntryHeader, EntryKind, ExceptionFrameHeader, FrameDescriptionEntry,
    FrameSectionKind,
};
pub use crate::common::{Error, Format, Result, SectionId, SECTION_COUNT};
pub use crate::cursor::{EndianCursor, MemoryValidator};
pub use crate::dwarf::Dwarf;
pub use crate::endianity::{BigEndian, Endianity, LittleEndian, NativeEndian};
pub use crate::line::SourceLocation;
pub use crate::ranges::RangeIter;
pub use crate::section::Section;
pub use crate::unit::{CompileUnit, Die, DieAttr, FormValue, Function, PcRange, UnitHeader};
