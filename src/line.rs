//! The DWARF line number program.
//!
//! A line number program is a byte-coded state machine whose committed rows
//! map instruction addresses to source file, line, and column. This module
//! runs one unit's program just far enough to answer a single address query:
//! each committed row is checked against the previous one, and the query is
//! answered from the previous row as soon as the pair brackets the target
//! address.

use std::mem;
use std::path::PathBuf;

use crate::common::{Error, Format, Result, SectionId};
use crate::constants;
use crate::cursor::EndianCursor;
use crate::dwarf::Dwarf;
use crate::endianity::Endianity;
use crate::unit::{parse_form_value, CompileUnit, FormValue};

/// A source location produced by a line number program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// The source file's path, joined from its directory and file entries.
    pub file_name: PathBuf,
    /// The 1-based source line. Zero means the row is not attributable to a
    /// line.
    pub line: u64,
    /// The 1-based source column. Zero means "left edge".
    pub column: u64,
}

/// One entry of a line number program's file name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileEntry<'input> {
    path: &'input str,
    dir_index: u64,
    mtime: u64,
    size: u64,
    md5: Option<&'input [u8; 16]>,
}

/// The registers of the line number state machine, plus a mirror of the most
/// recently committed row so a query can be answered from the row *before*
/// the one that steps past the target address.
#[derive(Debug, Clone, Copy)]
struct LineMachine {
    address: u64,
    file: u64,
    line: i64,
    column: u64,
    is_stmt: bool,
    basic_block: bool,
    end_sequence: bool,

    prev_valid: bool,
    prev_address: u64,
    prev_file: u64,
    prev_line: i64,
    prev_column: u64,
}

#[derive(Debug, Clone, Copy)]
struct Row {
    file: u64,
    line: i64,
    column: u64,
}

impl LineMachine {
    fn new(default_is_stmt: bool) -> Self {
        LineMachine {
            address: 0,
            file: 1,
            line: 1,
            column: 0,
            is_stmt: default_is_stmt,
            basic_block: false,
            end_sequence: false,
            prev_valid: false,
            prev_address: 0,
            prev_file: 0,
            prev_line: 0,
            prev_column: 0,
        }
    }

    /// Commit the machine's current state as a row: answer the query from
    /// the previous row if the pair brackets `target`, then make the current
    /// state the previous row.
    fn commit(&mut self, target: u64) -> Option<Row> {
        let matched = if self.prev_valid && self.prev_address <= target && target < self.address {
            Some(Row {
                file: self.prev_file,
                line: self.prev_line,
                column: self.prev_column,
            })
        } else {
            None
        };

        self.prev_valid = true;
        self.prev_address = self.address;
        self.prev_file = self.file;
        self.prev_line = self.line;
        self.prev_column = self.column;

        matched
    }
}

/// Run the line number program for `cu` and return the source location for
/// `target`, or `MissingDebugInfo` if no row range brackets it.
pub(crate) fn line_number_info<'input, Endian>(
    dwarf: &Dwarf<'input, Endian>,
    cu: &CompileUnit<'input>,
    target: u64,
) -> Result<SourceLocation>
where
    Endian: Endianity,
{
    let debug_line = dwarf.section_data(SectionId::DebugLine)?;
    let offset = cu
        .die
        .attr(constants::DW_AT_stmt_list)
        .and_then(FormValue::sec_offset)
        .ok_or(Error::MissingDebugInfo)?;
    let comp_dir = match cu.die.attr(constants::DW_AT_comp_dir) {
        Some(value) => dwarf.resolve_string(cu, value)?,
        None => return Err(Error::MissingDebugInfo),
    };

    let mut cursor = EndianCursor::new(debug_line, dwarf.endian());
    cursor.seek_to(usize::try_from(offset).map_err(|_| Error::Overflow)?)?;

    let (unit_length, format) = cursor.read_initial_length()?;
    let length = usize::try_from(unit_length).map_err(|_| Error::Overflow)?;
    let unit_end = cursor.pos().checked_add(length).ok_or(Error::Overflow)?;
    if unit_end > cursor.len() {
        return Err(Error::UnexpectedEof);
    }

    let version = cursor.read_u16()?;
    if !(2..=5).contains(&version) {
        return Err(Error::UnknownVersion(u64::from(version)));
    }

    if version >= 5 {
        let address_size = cursor.read_u8()?;
        if usize::from(address_size) != mem::size_of::<usize>() {
            return Err(Error::UnsupportedAddressSize(address_size));
        }
        // The segment selector size; segments are not supported, but the
        // field still takes up space.
        let _segment_selector_size = cursor.read_u8()?;
    }

    let header_length = cursor.read_offset(format)?;
    let program_start = cursor
        .pos()
        .checked_add(usize::try_from(header_length).map_err(|_| Error::Overflow)?)
        .ok_or(Error::Overflow)?;
    if program_start > unit_end {
        return Err(Error::UnexpectedEof);
    }

    let minimum_instruction_length = cursor.read_u8()?;
    if minimum_instruction_length == 0 {
        return Err(Error::MinimumInstructionLengthZero);
    }

    if version >= 4 {
        let maximum_operations_per_instruction = cursor.read_u8()?;
        if maximum_operations_per_instruction == 0 {
            return Err(Error::MaximumOperationsPerInstructionZero);
        }
    }

    let default_is_stmt = cursor.read_u8()? != 0;
    let line_base = i64::from(cursor.read_i8()?);
    let line_range = cursor.read_u8()?;
    if line_range == 0 {
        return Err(Error::LineRangeZero);
    }
    let opcode_base = cursor.read_u8()?;
    if opcode_base == 0 {
        return Err(Error::OpcodeBaseZero);
    }
    let standard_opcode_lengths = cursor.read_bytes(usize::from(opcode_base) - 1)?;

    let (directories, mut file_entries) = if version < 5 {
        parse_tables_pre_v5(&mut cursor, comp_dir)?
    } else {
        parse_tables_v5(&mut cursor, dwarf, cu, format)?
    };

    cursor.seek_to(program_start)?;

    let mut machine = LineMachine::new(default_is_stmt);

    while cursor.pos() < unit_end {
        let opcode = cursor.read_u8()?;

        if opcode >= opcode_base {
            // A special opcode advances both address and line, then commits.
            let adjusted = u64::from(opcode - opcode_base);
            machine.address = machine.address.wrapping_add(
                (adjusted / u64::from(line_range)) * u64::from(minimum_instruction_length),
            );
            machine.line += line_base + (adjusted % u64::from(line_range)) as i64;
            if let Some(row) = machine.commit(target) {
                return build_location(version, &directories, &file_entries, row);
            }
            machine.basic_block = false;
        } else if opcode == 0 {
            // Extended opcode: a length-prefixed sub-instruction.
            let len = usize::try_from(cursor.read_uleb128()?).map_err(|_| Error::Overflow)?;
            let end = cursor.pos().checked_add(len).ok_or(Error::Overflow)?;
            if len == 0 {
                continue;
            }
            match constants::DwLne(cursor.read_u8()?) {
                constants::DW_LNE_end_sequence => {
                    machine.end_sequence = true;
                    if let Some(row) = machine.commit(target) {
                        return build_location(version, &directories, &file_entries, row);
                    }
                    machine = LineMachine::new(default_is_stmt);
                }
                constants::DW_LNE_set_address => {
                    machine.address = cursor.read_native_address()?;
                }
                constants::DW_LNE_define_file => {
                    let path = str_from_bytes(cursor.read_bytes_until(0)?)?;
                    let dir_index = cursor.read_uleb128()?;
                    let mtime = cursor.read_uleb128()?;
                    let size = cursor.read_uleb128()?;
                    file_entries.push(FileEntry {
                        path,
                        dir_index,
                        mtime,
                        size,
                        md5: None,
                    });
                }
                // Unknown sub-opcodes just carry payload to skip.
                _ => {}
            }
            cursor.seek_to(end)?;
        } else {
            match constants::DwLns(opcode) {
                constants::DW_LNS_copy => {
                    if let Some(row) = machine.commit(target) {
                        return build_location(version, &directories, &file_entries, row);
                    }
                    machine.basic_block = false;
                }
                constants::DW_LNS_advance_pc => {
                    let advance = cursor.read_uleb128()?;
                    machine.address = machine
                        .address
                        .wrapping_add(advance * u64::from(minimum_instruction_length));
                }
                constants::DW_LNS_advance_line => {
                    machine.line += cursor.read_sleb128()?;
                }
                constants::DW_LNS_set_file => {
                    machine.file = cursor.read_uleb128()?;
                }
                constants::DW_LNS_set_column => {
                    machine.column = cursor.read_uleb128()?;
                }
                constants::DW_LNS_negate_stmt => {
                    machine.is_stmt = !machine.is_stmt;
                }
                constants::DW_LNS_set_basic_block => {
                    machine.basic_block = true;
                }
                constants::DW_LNS_const_add_pc => {
                    let adjusted = u64::from(255 - opcode_base);
                    machine.address = machine.address.wrapping_add(
                        (adjusted / u64::from(line_range)) * u64::from(minimum_instruction_length),
                    );
                }
                constants::DW_LNS_fixed_advance_pc => {
                    machine.address = machine.address.wrapping_add(u64::from(cursor.read_u16()?));
                }
                constants::DW_LNS_set_prologue_end => {}
                _ => {
                    // An unknown standard opcode; the header tells us how
                    // many ULEB128 operands to discard.
                    let operands = standard_opcode_lengths[usize::from(opcode) - 1];
                    for _ in 0..operands {
                        cursor.read_uleb128()?;
                    }
                }
            }
        }
    }

    Err(Error::MissingDebugInfo)
}

/// Parse the version 2-4 include-directory and file tables: NUL-terminated
/// path lists, each terminated by an empty entry. Directory 0 is implicitly
/// the compilation directory.
fn parse_tables_pre_v5<'input, Endian>(
    cursor: &mut EndianCursor<'input, Endian>,
    comp_dir: &'input str,
) -> Result<(Vec<&'input str>, Vec<FileEntry<'input>>)>
where
    Endian: Endianity,
{
    let mut directories = vec![comp_dir];
    loop {
        let dir = cursor.read_bytes_until(0)?;
        if dir.is_empty() {
            break;
        }
        directories.push(str_from_bytes(dir)?);
    }

    let mut file_entries = Vec::new();
    loop {
        let path = cursor.read_bytes_until(0)?;
        if path.is_empty() {
            break;
        }
        let dir_index = cursor.read_uleb128()?;
        let mtime = cursor.read_uleb128()?;
        let size = cursor.read_uleb128()?;
        file_entries.push(FileEntry {
            path: str_from_bytes(path)?,
            dir_index,
            mtime,
            size,
            md5: None,
        });
    }

    Ok((directories, file_entries))
}

// DWARF 5 describes each directory and file entry with up to this many
// (content type, form) descriptor pairs.
const MAX_ENTRY_FORMATS: u8 = 10;

/// Parse the version 5 directory and file tables, each preceded by its
/// entry-format descriptors. Directory 0 and file 0 are explicit.
fn parse_tables_v5<'input, Endian>(
    cursor: &mut EndianCursor<'input, Endian>,
    dwarf: &Dwarf<'input, Endian>,
    cu: &CompileUnit<'input>,
    format: Format,
) -> Result<(Vec<&'input str>, Vec<FileEntry<'input>>)>
where
    Endian: Endianity,
{
    let dir_formats = parse_entry_formats(cursor)?;
    let dir_count = cursor.read_uleb128()?;
    let mut directories = Vec::new();
    for _ in 0..dir_count {
        let mut path = None;
        for &(content_type, form) in &dir_formats {
            let value = parse_form_value(cursor, form, format, None)?;
            if content_type == constants::DW_LNCT_path {
                path = Some(dwarf.resolve_string(cu, &value)?);
            }
        }
        directories.push(path.ok_or(Error::MissingDebugInfo)?);
    }

    let file_formats = parse_entry_formats(cursor)?;
    let file_count = cursor.read_uleb128()?;
    let mut file_entries = Vec::new();
    for _ in 0..file_count {
        let mut entry = FileEntry {
            path: "",
            dir_index: 0,
            mtime: 0,
            size: 0,
            md5: None,
        };
        for &(content_type, form) in &file_formats {
            let value = parse_form_value(cursor, form, format, None)?;
            match content_type {
                constants::DW_LNCT_path => entry.path = dwarf.resolve_string(cu, &value)?,
                constants::DW_LNCT_directory_index => {
                    entry.dir_index = value.udata().ok_or(Error::MissingDebugInfo)?;
                }
                constants::DW_LNCT_timestamp => {
                    entry.mtime = value.udata().unwrap_or(0);
                }
                constants::DW_LNCT_size => {
                    entry.size = value.udata().unwrap_or(0);
                }
                constants::DW_LNCT_MD5 => {
                    if let FormValue::Data16(bytes) = value {
                        entry.md5 = Some(bytes);
                    }
                }
                // Unknown content types are decoded for their size and
                // otherwise ignored.
                _ => {}
            }
        }
        file_entries.push(entry);
    }

    Ok((directories, file_entries))
}

fn parse_entry_formats<Endian>(
    cursor: &mut EndianCursor<'_, Endian>,
) -> Result<Vec<(constants::DwLnct, constants::DwForm)>>
where
    Endian: Endianity,
{
    let count = cursor.read_u8()?;
    if count > MAX_ENTRY_FORMATS {
        return Err(Error::InvalidEntryFormatCount(count));
    }
    let mut formats = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let content_type = constants::DwLnct(cursor.read_uleb128()?);
        let form = constants::DwForm(cursor.read_uleb128()?);
        formats.push((content_type, form));
    }
    Ok(formats)
}

fn build_location(
    version: u16,
    directories: &[&str],
    file_entries: &[FileEntry<'_>],
    row: Row,
) -> Result<SourceLocation> {
    // Version 5 made file numbering 0-based; before that, file 0 meant "no
    // file" and the table started at 1.
    let index = if version < 5 {
        if row.file == 0 {
            return Err(Error::InvalidFileIndex(0));
        }
        row.file - 1
    } else {
        row.file
    };

    let entry = usize::try_from(index)
        .ok()
        .and_then(|i| file_entries.get(i))
        .ok_or(Error::InvalidFileIndex(row.file))?;
    let dir = usize::try_from(entry.dir_index)
        .ok()
        .and_then(|i| directories.get(i))
        .ok_or(Error::InvalidDirectoryIndex(entry.dir_index))?;

    Ok(SourceLocation {
        file_name: PathBuf::from(dir).join(entry.path),
        line: u64::try_from(row.line).unwrap_or(0),
        column: row.column,
    })
}

fn str_from_bytes(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| Error::BadUtf8)
}
