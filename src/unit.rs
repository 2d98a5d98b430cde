//! Units, debugging information entries, and attribute values from
//! `.debug_info`.

use std::mem;

use crate::abbrev::Abbreviations;
use crate::common::{Error, Format, Result};
use crate::constants;
use crate::cursor::EndianCursor;
use crate::endianity::Endianity;

/// A half-open range `[start, end)` of instruction addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcRange {
    /// The first address in the range.
    pub start: u64,
    /// The first address past the end of the range.
    pub end: u64,
}

impl PcRange {
    /// Return true if the range contains `address`.
    #[inline]
    pub fn contains(&self, address: u64) -> bool {
        self.start <= address && address < self.end
    }
}

/// The header of a `.debug_info` unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHeader {
    /// The offset of the unit's initial length field within `.debug_info`.
    pub offset: usize,
    /// Whether the unit is 32- or 64-bit DWARF.
    pub format: Format,
    /// The unit's DWARF version.
    pub version: u16,
    /// The offset of the unit's abbreviation table within `.debug_abbrev`.
    pub debug_abbrev_offset: u64,
    /// The size in bytes of an address described by this unit.
    pub address_size: u8,
    /// The offset of the unit's first debugging information entry within
    /// `.debug_info`.
    pub entries_offset: usize,
    /// The offset one past the last byte of the unit within `.debug_info`.
    pub end_offset: usize,
}

/// Parse the unit header at the cursor's position.
///
/// Returns `None` when the section ends here, either because no bytes remain
/// or because the unit length is zero.
pub(crate) fn parse_unit_header<Endian>(
    cursor: &mut EndianCursor<'_, Endian>,
) -> Result<Option<UnitHeader>>
where
    Endian: Endianity,
{
    if cursor.is_empty() {
        return Ok(None);
    }

    let offset = cursor.pos();
    let (unit_length, format) = cursor.read_initial_length()?;
    if unit_length == 0 {
        return Ok(None);
    }

    let length = usize::try_from(unit_length).map_err(|_| Error::Overflow)?;
    let end_offset = cursor
        .pos()
        .checked_add(length)
        .ok_or(Error::Overflow)?;
    if end_offset > cursor.len() {
        return Err(Error::UnexpectedEof);
    }

    let version = cursor.read_u16()?;
    if !(2..=5).contains(&version) {
        return Err(Error::UnknownVersion(u64::from(version)));
    }

    // DWARF 5 moved the address size before the abbreviation offset and
    // added the unit type in between.
    let (debug_abbrev_offset, address_size) = if version >= 5 {
        let unit_type = cursor.read_u8()?;
        if constants::DwUt(unit_type) != constants::DW_UT_compile {
            return Err(Error::UnsupportedUnitType(unit_type));
        }
        let address_size = cursor.read_u8()?;
        let debug_abbrev_offset = cursor.read_offset(format)?;
        (debug_abbrev_offset, address_size)
    } else {
        let debug_abbrev_offset = cursor.read_offset(format)?;
        let address_size = cursor.read_u8()?;
        (debug_abbrev_offset, address_size)
    };

    if usize::from(address_size) != mem::size_of::<usize>() {
        return Err(Error::UnsupportedAddressSize(address_size));
    }

    Ok(Some(UnitHeader {
        offset,
        format,
        version,
        debug_abbrev_offset,
        address_size,
        entries_offset: cursor.pos(),
        end_offset,
    }))
}

/// An attribute value, decoded according to its form.
///
/// The indirect families (`Strp`, `Strx`, `Addrx`, ...) carry the raw offset
/// or index; resolution through the string, address, and list sections
/// happens at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormValue<'input> {
    /// An address of native word size.
    Addr(u64),
    /// An index into `.debug_addr`, relative to a unit's `DW_AT_addr_base`.
    Addrx(u64),
    /// A length-prefixed block of bytes.
    Block(&'input [u8]),
    /// An unsigned constant.
    Udata(u64),
    /// A signed constant.
    Sdata(i64),
    /// Exactly sixteen bytes, referenced in place.
    Data16(&'input [u8; 16]),
    /// A DWARF expression's instruction bytes.
    Exprloc(&'input [u8]),
    /// A boolean flag.
    Flag(bool),
    /// An offset into some other debug section, sized by the unit's format.
    SecOffset(u64),
    /// A reference to another entry, relative to its unit's header.
    Ref(u64),
    /// A section-absolute or type-signature reference.
    RefAddr(u64),
    /// A string stored inline, without its NUL terminator.
    String(&'input [u8]),
    /// An offset into `.debug_str`.
    Strp(u64),
    /// An index into `.debug_str_offsets`, relative to a unit's
    /// `DW_AT_str_offsets_base`.
    Strx(u64),
    /// An offset into `.debug_line_str`.
    LineStrp(u64),
    /// An index into `.debug_loclists`, relative to a unit's
    /// `DW_AT_loclists_base`.
    LoclistX(u64),
    /// An index into `.debug_rnglists`, relative to a unit's
    /// `DW_AT_rnglists_base`.
    RnglistX(u64),
}

impl<'input> FormValue<'input> {
    /// The value as an unsigned constant, if it is one.
    pub fn udata(&self) -> Option<u64> {
        match *self {
            FormValue::Udata(value) => Some(value),
            FormValue::Sdata(value) => u64::try_from(value).ok(),
            _ => None,
        }
    }

    /// The value as a section offset, if it is one.
    pub fn sec_offset(&self) -> Option<u64> {
        match *self {
            FormValue::SecOffset(offset) => Some(offset),
            _ => None,
        }
    }
}

/// Decode the attribute value with the given form at the cursor's position.
///
/// `implicit_const` must be the abbreviation's payload when `form` is
/// `DW_FORM_implicit_const`.
pub(crate) fn parse_form_value<'input, Endian>(
    cursor: &mut EndianCursor<'input, Endian>,
    form: constants::DwForm,
    format: Format,
    implicit_const: Option<i64>,
) -> Result<FormValue<'input>>
where
    Endian: Endianity,
{
    let mut form = form;
    loop {
        return Ok(match form {
            constants::DW_FORM_addr => FormValue::Addr(cursor.read_native_address()?),

            constants::DW_FORM_addrx1 => FormValue::Addrx(u64::from(cursor.read_u8()?)),
            constants::DW_FORM_addrx2 => FormValue::Addrx(u64::from(cursor.read_u16()?)),
            constants::DW_FORM_addrx3 => FormValue::Addrx(u64::from(cursor.read_u24()?)),
            constants::DW_FORM_addrx4 => FormValue::Addrx(u64::from(cursor.read_u32()?)),
            constants::DW_FORM_addrx => FormValue::Addrx(cursor.read_uleb128()?),

            constants::DW_FORM_block1 => {
                let len = usize::from(cursor.read_u8()?);
                FormValue::Block(cursor.read_bytes(len)?)
            }
            constants::DW_FORM_block2 => {
                let len = usize::from(cursor.read_u16()?);
                FormValue::Block(cursor.read_bytes(len)?)
            }
            constants::DW_FORM_block4 => {
                let len = usize::try_from(cursor.read_u32()?).map_err(|_| Error::Overflow)?;
                FormValue::Block(cursor.read_bytes(len)?)
            }
            constants::DW_FORM_block => {
                let len = usize::try_from(cursor.read_uleb128()?).map_err(|_| Error::Overflow)?;
                FormValue::Block(cursor.read_bytes(len)?)
            }

            constants::DW_FORM_data1 => FormValue::Udata(u64::from(cursor.read_u8()?)),
            constants::DW_FORM_data2 => FormValue::Udata(u64::from(cursor.read_u16()?)),
            constants::DW_FORM_data4 => FormValue::Udata(u64::from(cursor.read_u32()?)),
            constants::DW_FORM_data8 => FormValue::Udata(cursor.read_u64()?),
            constants::DW_FORM_data16 => {
                let bytes: &[u8; 16] = cursor
                    .read_bytes(16)?
                    .try_into()
                    .map_err(|_| Error::UnexpectedEof)?;
                FormValue::Data16(bytes)
            }

            constants::DW_FORM_udata => FormValue::Udata(cursor.read_uleb128()?),
            constants::DW_FORM_sdata => FormValue::Sdata(cursor.read_sleb128()?),

            constants::DW_FORM_exprloc => {
                let len = usize::try_from(cursor.read_uleb128()?).map_err(|_| Error::Overflow)?;
                FormValue::Exprloc(cursor.read_bytes(len)?)
            }

            constants::DW_FORM_flag => FormValue::Flag(cursor.read_u8()? != 0),
            constants::DW_FORM_flag_present => FormValue::Flag(true),

            constants::DW_FORM_sec_offset => FormValue::SecOffset(cursor.read_offset(format)?),

            constants::DW_FORM_ref1 => FormValue::Ref(u64::from(cursor.read_u8()?)),
            constants::DW_FORM_ref2 => FormValue::Ref(u64::from(cursor.read_u16()?)),
            constants::DW_FORM_ref4 => FormValue::Ref(u64::from(cursor.read_u32()?)),
            constants::DW_FORM_ref8 => FormValue::Ref(cursor.read_u64()?),
            constants::DW_FORM_ref_udata => FormValue::Ref(cursor.read_uleb128()?),

            constants::DW_FORM_ref_addr => FormValue::RefAddr(cursor.read_offset(format)?),
            constants::DW_FORM_ref_sig8 => FormValue::RefAddr(cursor.read_u64()?),

            constants::DW_FORM_string => FormValue::String(cursor.read_bytes_until(0)?),
            constants::DW_FORM_strp => FormValue::Strp(cursor.read_offset(format)?),
            constants::DW_FORM_line_strp => FormValue::LineStrp(cursor.read_offset(format)?),

            constants::DW_FORM_strx1 => FormValue::Strx(u64::from(cursor.read_u8()?)),
            constants::DW_FORM_strx2 => FormValue::Strx(u64::from(cursor.read_u16()?)),
            constants::DW_FORM_strx3 => FormValue::Strx(u64::from(cursor.read_u24()?)),
            constants::DW_FORM_strx4 => FormValue::Strx(u64::from(cursor.read_u32()?)),
            constants::DW_FORM_strx => FormValue::Strx(cursor.read_uleb128()?),

            constants::DW_FORM_indirect => {
                form = constants::DwForm(cursor.read_uleb128()?);
                continue;
            }

            constants::DW_FORM_implicit_const => {
                FormValue::Sdata(implicit_const.ok_or(Error::UnknownForm(form))?)
            }

            constants::DW_FORM_loclistx => FormValue::LoclistX(cursor.read_uleb128()?),
            constants::DW_FORM_rnglistx => FormValue::RnglistX(cursor.read_uleb128()?),

            otherwise => return Err(Error::UnknownForm(otherwise)),
        });
    }
}

/// One decoded attribute of a debugging information entry.
pub type DieAttr<'input> = (constants::DwAt, FormValue<'input>);

/// A debugging information entry: a tag, a has-children flag, and the
/// entry's decoded attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Die<'input> {
    /// The entry's tag.
    pub tag: constants::DwTag,
    /// Whether the entry owns a subtree of children.
    pub has_children: bool,
    attrs: Vec<DieAttr<'input>>,
}

impl<'input> Die<'input> {
    pub(crate) fn new(
        tag: constants::DwTag,
        has_children: bool,
        attrs: Vec<DieAttr<'input>>,
    ) -> Self {
        Die {
            tag,
            has_children,
            attrs,
        }
    }

    /// The entry's attributes, in declaration order.
    #[inline]
    pub fn attrs(&self) -> &[DieAttr<'input>] {
        &self.attrs
    }

    /// The value of the attribute named `name`, if the entry has it.
    pub fn attr(&self, name: constants::DwAt) -> Option<&FormValue<'input>> {
        self.attrs
            .iter()
            .find(|(attr_name, _)| *attr_name == name)
            .map(|(_, value)| value)
    }
}

/// Decode the entry at the cursor's position into a caller-owned attribute
/// buffer, which is cleared first.
///
/// Returns `None` for a null entry (abbreviation code zero). The buffer
/// scheme lets the unit scanner reuse a handful of attribute vectors across
/// the thousands of entries it inspects and discards, copying storage only
/// for the few it retains.
pub(crate) fn parse_die_attrs<'input, Endian>(
    cursor: &mut EndianCursor<'input, Endian>,
    abbrevs: &Abbreviations,
    header: &UnitHeader,
    attrs: &mut Vec<DieAttr<'input>>,
) -> Result<Option<(constants::DwTag, bool)>>
where
    Endian: Endianity,
{
    attrs.clear();

    let code = cursor.read_uleb128()?;
    if code == 0 {
        return Ok(None);
    }
    let abbrev = abbrevs
        .get(code)
        .ok_or(Error::InvalidAbbreviationCode(code))?;

    attrs.reserve(abbrev.attributes().len());
    for spec in abbrev.attributes() {
        let value = parse_form_value(cursor, spec.form(), header.format, spec.implicit_const())?;
        attrs.push((spec.name(), value));
    }

    Ok(Some((abbrev.tag(), abbrev.has_children())))
}

/// Decode the entry at the cursor's position into an owned [`Die`].
pub(crate) fn parse_die<'input, Endian>(
    cursor: &mut EndianCursor<'input, Endian>,
    abbrevs: &Abbreviations,
    header: &UnitHeader,
) -> Result<Option<Die<'input>>>
where
    Endian: Endianity,
{
    let mut attrs = Vec::new();
    Ok(parse_die_attrs(cursor, abbrevs, header, &mut attrs)?
        .map(|(tag, has_children)| Die::new(tag, has_children, attrs)))
}

/// A compilation unit retained by the eager scan: its root entry plus the
/// handful of header-level values per-address queries need.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileUnit<'input> {
    /// The unit's DWARF version.
    pub version: u16,
    /// Whether the unit is 32- or 64-bit DWARF.
    pub format: Format,
    /// The unit's root (`DW_TAG_compile_unit`) entry.
    pub die: Die<'input>,
    /// The unit's contiguous PC range, when `DW_AT_low_pc`/`DW_AT_high_pc`
    /// describe one. Discontiguous units keep `None` here and are matched
    /// through their `DW_AT_ranges` list instead.
    pub pc_range: Option<PcRange>,
    /// The `DW_AT_str_offsets_base` offset into `.debug_str_offsets`, or 0.
    pub str_offsets_base: u64,
    /// The `DW_AT_addr_base` offset into `.debug_addr`, or 0.
    pub addr_base: u64,
    /// The `DW_AT_rnglists_base` offset into `.debug_rnglists`, or 0.
    pub rnglists_base: u64,
    /// The `DW_AT_loclists_base` offset into `.debug_loclists`, or 0.
    pub loclists_base: u64,
    /// The unit's `DW_AT_frame_base` attribute, if any, for the expression
    /// evaluator.
    pub frame_base: Option<FormValue<'input>>,
}

/// A function-like entry collected by the eager scan.
///
/// Functions are recorded in the order the scan encounters them; an address
/// lookup is a linear scan of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Function<'input> {
    /// The function's name, when one was found on the entry or through its
    /// `DW_AT_abstract_origin`/`DW_AT_specification` chain.
    pub name: Option<&'input str>,
    /// The function's PC range, when one was found.
    pub pc_range: Option<PcRange>,
}
