//! Types shared by every module: the 32/64-bit DWARF format, the section
//! registry identifiers, and the crate-wide error type.

use crate::constants;

/// Whether the format of a unit is 32- or 64-bit DWARF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// 32-bit DWARF.
    Dwarf32,
    /// 64-bit DWARF.
    Dwarf64,
}

impl Format {
    /// Return the serialized size of an initial length field for the format.
    #[inline]
    pub fn initial_length_size(self) -> u8 {
        match self {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 12,
        }
    }

    /// Return the size of an offset or length field for the format.
    #[inline]
    pub fn word_size(self) -> u8 {
        match self {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 8,
        }
    }
}

/// An identifier for one of the debug sections a [`Dwarf`](crate::Dwarf) can
/// be populated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionId {
    /// The `.debug_info` section.
    DebugInfo,
    /// The `.debug_abbrev` section.
    DebugAbbrev,
    /// The `.debug_str` section.
    DebugStr,
    /// The `.debug_str_offsets` section.
    DebugStrOffsets,
    /// The `.debug_line` section.
    DebugLine,
    /// The `.debug_line_str` section.
    DebugLineStr,
    /// The `.debug_ranges` section.
    DebugRanges,
    /// The `.debug_loclists` section.
    DebugLoclists,
    /// The `.debug_rnglists` section.
    DebugRnglists,
    /// The `.debug_addr` section.
    DebugAddr,
    /// The `.debug_names` section.
    DebugNames,
    /// The `.debug_frame` section.
    DebugFrame,
    /// The `.eh_frame` section.
    EhFrame,
    /// The `.eh_frame_hdr` section.
    EhFrameHdr,
}

/// The number of section registry slots.
pub const SECTION_COUNT: usize = 14;

impl SectionId {
    /// Every section identifier, in registry order.
    pub const ALL: [SectionId; SECTION_COUNT] = [
        SectionId::DebugInfo,
        SectionId::DebugAbbrev,
        SectionId::DebugStr,
        SectionId::DebugStrOffsets,
        SectionId::DebugLine,
        SectionId::DebugLineStr,
        SectionId::DebugRanges,
        SectionId::DebugLoclists,
        SectionId::DebugRnglists,
        SectionId::DebugAddr,
        SectionId::DebugNames,
        SectionId::DebugFrame,
        SectionId::EhFrame,
        SectionId::EhFrameHdr,
    ];

    /// The ELF name of the section.
    pub fn name(self) -> &'static str {
        match self {
            SectionId::DebugInfo => ".debug_info",
            SectionId::DebugAbbrev => ".debug_abbrev",
            SectionId::DebugStr => ".debug_str",
            SectionId::DebugStrOffsets => ".debug_str_offsets",
            SectionId::DebugLine => ".debug_line",
            SectionId::DebugLineStr => ".debug_line_str",
            SectionId::DebugRanges => ".debug_ranges",
            SectionId::DebugLoclists => ".debug_loclists",
            SectionId::DebugRnglists => ".debug_rnglists",
            SectionId::DebugAddr => ".debug_addr",
            SectionId::DebugNames => ".debug_names",
            SectionId::DebugFrame => ".debug_frame",
            SectionId::EhFrame => ".eh_frame",
            SectionId::EhFrameHdr => ".eh_frame_hdr",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            SectionId::DebugInfo => 0,
            SectionId::DebugAbbrev => 1,
            SectionId::DebugStr => 2,
            SectionId::DebugStrOffsets => 3,
            SectionId::DebugLine => 4,
            SectionId::DebugLineStr => 5,
            SectionId::DebugRanges => 6,
            SectionId::DebugLoclists => 7,
            SectionId::DebugRnglists => 8,
            SectionId::DebugAddr => 9,
            SectionId::DebugNames => 10,
            SectionId::DebugFrame => 11,
            SectionId::EhFrame => 12,
            SectionId::EhFrameHdr => 13,
        }
    }
}

/// An error that occurred while reading debug information.
///
/// Callers usually only need the distinction exposed by
/// [`Error::is_missing_debug_info`]: [`Error::MissingDebugInfo`] means the
/// sections are well formed but simply lack an answer for the query (fall
/// back to another source), while every other variant means the debug data
/// itself is broken and further queries against it are pointless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Hit the end of input before the read completed.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// A memory-validity predicate rejected a dereference at the given
    /// address.
    #[error("memory at {0:#x} failed the validity check")]
    InvalidMemory(u64),
    /// A decoded value does not fit in the requested integer type.
    #[error("value does not fit in the requested integer type")]
    Overflow,
    /// An error decoding an unsigned LEB128 value.
    #[error("bad unsigned LEB128 value")]
    BadUnsignedLeb128,
    /// An error decoding a signed LEB128 value.
    #[error("bad signed LEB128 value")]
    BadSignedLeb128,
    /// Found an initial length within the reserved range.
    #[error("unknown reserved initial length value {0:#x}")]
    UnknownReservedLength(u32),
    /// Found an unknown DWARF version.
    #[error("unknown DWARF version {0}")]
    UnknownVersion(u64),
    /// Found a DWARF 5 unit type other than a full compilation unit.
    #[error("unsupported unit type {0}")]
    UnsupportedUnitType(u8),
    /// The address size does not match the native word size.
    #[error("unsupported address size {0}")]
    UnsupportedAddressSize(u8),
    /// An abbreviation's has-children byte was not one of
    /// `DW_CHILDREN_{yes,no}`.
    #[error("invalid abbreviation has-children byte {0:#x}")]
    InvalidAbbreviationChildren(u8),
    /// Found an abbreviation code that has already been used in this table.
    #[error("duplicate abbreviation code {0}")]
    DuplicateAbbreviationCode(u64),
    /// A debugging information entry used an abbreviation code that its unit's
    /// table does not declare.
    #[error("invalid abbreviation code {0}")]
    InvalidAbbreviationCode(u64),
    /// Found an unknown `DW_FORM_*` value.
    #[error("unknown form {0}")]
    UnknownForm(constants::DwForm),
    /// An attribute's form is not one the operation can consume.
    #[error("unsupported attribute form")]
    UnsupportedAttributeForm,
    /// Found an invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    BadUtf8,
    /// An offset points outside its section, unit, or table.
    #[error("offset {0:#x} is out of bounds")]
    OffsetOutOfBounds(u64),
    /// Found an unknown `.debug_rnglists` entry kind.
    #[error("unknown range list entry {0}")]
    UnknownRangeListsEntry(constants::DwRle),
    /// A range list yielded a range that ends before it starts.
    #[error("invalid address range")]
    InvalidAddressRange,
    /// A line program row referenced a directory the header does not declare.
    #[error("invalid directory index {0}")]
    InvalidDirectoryIndex(u64),
    /// A line program row referenced a file the header does not declare.
    #[error("invalid file index {0}")]
    InvalidFileIndex(u64),
    /// A DWARF 5 line program header declared more entry-format descriptors
    /// than the format allows.
    #[error("too many entry format descriptors: {0}")]
    InvalidEntryFormatCount(u8),
    /// The line program's minimum instruction length must not be zero.
    #[error("minimum instruction length must not be zero")]
    MinimumInstructionLengthZero,
    /// The line program's maximum operations per instruction must not be zero.
    #[error("maximum operations per instruction must not be zero")]
    MaximumOperationsPerInstructionZero,
    /// The line program's line range must not be zero.
    #[error("line range must not be zero")]
    LineRangeZero,
    /// The line program's opcode base must not be zero.
    #[error("opcode base must not be zero")]
    OpcodeBaseZero,
    /// Expected to find the CIE sentinel, but found an FDE's CIE pointer.
    #[error("expected a CIE, found id {0:#x}")]
    NotCieId(u64),
    /// Expected to find a pointer to a CIE, but found the CIE sentinel.
    #[error("expected a CIE pointer, found the CIE id {0:#x}")]
    NotCiePointer(u64),
    /// An augmentation string was ambiguous or used an unknown character.
    #[error("unknown or ambiguous augmentation string")]
    UnknownAugmentation,
    /// The given pointer encoding is either unknown or invalid.
    #[error("unknown pointer encoding {0:#x}")]
    UnknownPointerEncoding(u8),
    /// The given pointer encoding is valid but not supported.
    #[error("unsupported pointer encoding {0:#x}")]
    UnsupportedPointerEncoding(u8),
    /// A relative pointer was found, but the required base address was not
    /// supplied.
    #[error("pointer base not specified")]
    PointerBaseNotSpecified,
    /// Applying a pointer's base address overflowed.
    #[error("pointer arithmetic overflowed")]
    PointerOverflow,
    /// An indirect pointer cannot be followed because the entry's address
    /// size differs from the native word size.
    #[error("indirection requires the native address size")]
    NonNativeIndirection,
    /// The `.eh_frame_hdr` search table uses a variable-length encoding, so
    /// it cannot be indexed.
    #[error("variable-length .eh_frame_hdr search table")]
    VariableLengthSearchTable,
    /// A frame description entry is structurally invalid.
    #[error("invalid frame description entry")]
    InvalidFrameDescriptionEntry,
    /// The sections are well formed but do not contain the requested
    /// information.
    #[error("missing debug info")]
    MissingDebugInfo,
}

impl Error {
    /// Return true if this error means the requested information is simply
    /// absent, as opposed to the debug data being structurally broken.
    #[inline]
    pub fn is_missing_debug_info(&self) -> bool {
        matches!(self, Error::MissingDebugInfo)
    }
}

/// The result of a parse.
pub type Result<T> = std::result::Result<T, Error>;
