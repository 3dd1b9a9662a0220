#![forbid(unsafe_code)]

//! The "basic type tag" enumeration and the typed values decoded from it.
//!
//! Used for class-dump constant-pool/static/instance field descriptors and
//! for primitive-array elements.

use crate::error::{Error, FormatReason};
use crate::id::Id;
use crate::reader::HprofRead;
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;

/// A basic type tag: `Object` is read as an [`Id`], the rest at their fixed
/// widths (1, 2, 4, 8, 1, 2, 4, 8 bytes respectively).
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum FieldType {
    Object = 2,
    Bool = 4,
    Char = 5,
    Float = 6,
    Double = 7,
    Byte = 8,
    Short = 9,
    Int = 10,
    Long = 11,
}

impl FieldType {
    /// Parses a basic type tag byte, producing
    /// [`FormatReason::UnknownBasicType`] for anything outside the
    /// enumeration.
    pub fn from_tag_byte(tag_byte: u8, record_tag: u8, offset: u64) -> Result<Self, Error> {
        FieldType::try_from(tag_byte).map_err(|_| Error::FormatError {
            tag: record_tag,
            offset,
            reason: FormatReason::UnknownBasicType(tag_byte),
        })
    }

    /// Wire width in bytes. `Object` width depends on the stream's
    /// [`crate::id::IdSize`] and so isn't representable here; callers
    /// needing a primitive-array element stride pass the id size in.
    pub fn byte_size(self, id_size_bytes: u32) -> u64 {
        match self {
            FieldType::Object => id_size_bytes as u64,
            FieldType::Bool | FieldType::Byte => 1,
            FieldType::Char | FieldType::Short => 2,
            FieldType::Float | FieldType::Int => 4,
            FieldType::Double | FieldType::Long => 8,
        }
    }
}

/// A single typed value: the basic type tag paired with its decoded
/// payload.
#[derive(Clone, Copy, Debug)]
pub enum FieldValue {
    Object(Id),
    Bool(bool),
    Char(u16),
    Float(f32),
    Double(f64),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Object(_) => FieldType::Object,
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Char(_) => FieldType::Char,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Double(_) => FieldType::Double,
            FieldValue::Byte(_) => FieldType::Byte,
            FieldValue::Short(_) => FieldType::Short,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Long(_) => FieldType::Long,
        }
    }
}

/// A homogeneous run of primitive values, as found in a primitive array
/// dump.
#[derive(Clone, Debug)]
pub enum ArrayValue {
    Bool(Vec<bool>),
    Char(Vec<u16>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
}

/// Reads one value of the given basic type tag.
pub fn read_field_value<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
    ty: FieldType,
) -> Result<FieldValue, Error> {
    Ok(match ty {
        FieldType::Object => FieldValue::Object(reader.read_id()?),
        FieldType::Bool => FieldValue::Bool(reader.read_bool()?),
        FieldType::Char => FieldValue::Char(reader.read_u16()?),
        FieldType::Float => FieldValue::Float(reader.read_f32()?),
        FieldType::Double => FieldValue::Double(reader.read_f64()?),
        FieldType::Byte => FieldValue::Byte(reader.read_i8()?),
        FieldType::Short => FieldValue::Short(reader.read_i16()?),
        FieldType::Int => FieldValue::Int(reader.read_i32()?),
        FieldType::Long => FieldValue::Long(reader.read_i64()?),
    })
}
