//! Functions for parsing DWARF debugging abbreviations.

use std::collections::hash_map;

use crate::common::{Error, Result};
use crate::constants;
use crate::cursor::EndianCursor;
use crate::endianity::Endianity;

/// A cache of abbreviation tables parsed out of `.debug_abbrev`, keyed by
/// their offset within the section.
///
/// Each offset is parsed at most once; compilation units that share an
/// abbreviation table share the parsed result. Tables accumulate for the
/// lifetime of the cache — debug sections are bounded and reuse is frequent,
/// so eviction would only cost re-parses.
#[derive(Debug, Default)]
pub struct AbbreviationsCache {
    tables: hash_map::HashMap<u64, Abbreviations>,
}

impl AbbreviationsCache {
    /// Construct an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the abbreviation table at `offset` within `debug_abbrev`, parsing
    /// and caching it on first access.
    pub fn get<Endian>(
        &mut self,
        debug_abbrev: &[u8],
        endian: Endian,
        offset: u64,
    ) -> Result<&Abbreviations>
    where
        Endian: Endianity,
    {
        match self.tables.entry(offset) {
            hash_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            hash_map::Entry::Vacant(entry) => {
                let start = usize::try_from(offset).map_err(|_| Error::Overflow)?;
                if start > debug_abbrev.len() {
                    return Err(Error::OffsetOutOfBounds(offset));
                }
                let mut cursor = EndianCursor::new(&debug_abbrev[start..], endian);
                let abbrevs = Abbreviations::parse(&mut cursor)?;
                Ok(entry.insert(abbrevs))
            }
        }
    }
}

/// A set of abbreviations for one compilation unit, keyed by code.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Abbreviations {
    abbrevs: hash_map::HashMap<u64, Abbreviation>,
}

impl Abbreviations {
    /// Get the abbreviation associated with the given code.
    #[inline]
    pub fn get(&self, code: u64) -> Option<&Abbreviation> {
        self.abbrevs.get(&code)
    }

    /// The code of an abbreviation with no attributes and no children, if
    /// the table declares one.
    ///
    /// Some toolchains emit such an abbreviation purely to pad the tails of
    /// functions in `.debug_info`; the unit scanner skips runs of its code
    /// without decoding each occurrence.
    pub fn padding_code(&self) -> Option<u64> {
        self.abbrevs
            .values()
            .find(|abbrev| abbrev.attributes.is_empty() && !abbrev.has_children)
            .map(|abbrev| abbrev.code)
    }

    fn insert(&mut self, abbrev: Abbreviation) -> Result<()> {
        match self.abbrevs.entry(abbrev.code) {
            hash_map::Entry::Occupied(_) => Err(Error::DuplicateAbbreviationCode(abbrev.code)),
            hash_map::Entry::Vacant(entry) => {
                entry.insert(abbrev);
                Ok(())
            }
        }
    }

    /// Parse a series of abbreviations, terminated by a null abbreviation.
    pub(crate) fn parse<Endian>(cursor: &mut EndianCursor<'_, Endian>) -> Result<Abbreviations>
    where
        Endian: Endianity,
    {
        let mut abbrevs = Abbreviations::default();
        while let Some(abbrev) = Abbreviation::parse(cursor)? {
            abbrevs.insert(abbrev)?;
        }
        Ok(abbrevs)
    }
}

/// An abbreviation describes the shape of a debugging information entry: its
/// code, its tag, whether it has children, and its attribute specifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation {
    code: u64,
    tag: constants::DwTag,
    has_children: bool,
    attributes: Vec<AttributeSpecification>,
}

impl Abbreviation {
    /// Get this abbreviation's code.
    #[inline]
    pub fn code(&self) -> u64 {
        self.code
    }

    /// Get this abbreviation's tag.
    #[inline]
    pub fn tag(&self) -> constants::DwTag {
        self.tag
    }

    /// Return true if entries with this abbreviation have children.
    #[inline]
    pub fn has_children(&self) -> bool {
        self.has_children
    }

    /// Get this abbreviation's attribute specifications.
    #[inline]
    pub fn attributes(&self) -> &[AttributeSpecification] {
        &self.attributes
    }

    /// Parse one abbreviation declaration. Returns `None` for the null
    /// declaration terminating the table.
    fn parse<Endian>(cursor: &mut EndianCursor<'_, Endian>) -> Result<Option<Abbreviation>>
    where
        Endian: Endianity,
    {
        let code = cursor.read_uleb128()?;
        if code == 0 {
            return Ok(None);
        }

        let tag = constants::DwTag(cursor.read_uleb128()?);
        let has_children = match constants::DwChildren(cursor.read_u8()?) {
            constants::DW_CHILDREN_no => false,
            constants::DW_CHILDREN_yes => true,
            constants::DwChildren(byte) => {
                return Err(Error::InvalidAbbreviationChildren(byte));
            }
        };

        let mut attributes = Vec::new();
        loop {
            let name = cursor.read_uleb128()?;
            let form = cursor.read_uleb128()?;
            if name == 0 && form == 0 {
                break;
            }
            let form = constants::DwForm(form);
            let implicit_const = if form == constants::DW_FORM_implicit_const {
                Some(cursor.read_sleb128()?)
            } else {
                None
            };
            attributes.push(AttributeSpecification {
                name: constants::DwAt(name),
                form,
                implicit_const,
            });
        }

        Ok(Some(Abbreviation {
            code,
            tag,
            has_children,
            attributes,
        }))
    }
}

/// The description of one attribute in an abbreviation: its name, its form,
/// and (for `DW_FORM_implicit_const`) the constant value stored in the
/// abbreviation itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpecification {
    name: constants::DwAt,
    form: constants::DwForm,
    implicit_const: Option<i64>,
}

impl AttributeSpecification {
    /// Get the attribute's name.
    #[inline]
    pub fn name(&self) -> constants::DwAt {
        self.name
    }

    /// Get the attribute's form.
    #[inline]
    pub fn form(&self) -> constants::DwForm {
        self.form
    }

    /// The `DW_FORM_implicit_const` payload, if that is the attribute's form.
    #[inline]
    pub fn implicit_const(&self) -> Option<i64> {
        self.implicit_const
    }
}
