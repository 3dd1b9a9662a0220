#![forbid(unsafe_code)]

//! Heap-dump sub-records: the contents of a `0x0C`/`0x1C` container, framed
//! by [`crate::parser`] but otherwise tag-dispatched independently of the
//! top-level record stream (see [`crate::records`]).
//!
//! Sub-tags share numeric space with top-level tags but are a distinct
//! namespace — `0x01` here is `RootJniGlobal`, not `LoadClass`.

use crate::error::{Error, FormatReason};
use crate::id::{Id, Serial};
use crate::reader::{BoundedRead, HprofRead};
use crate::value::{read_field_value, ArrayValue, FieldType, FieldValue};
use std::collections::HashMap;

pub(crate) const TAG_ROOT_UNKNOWN: u8 = 0xFF;
pub(crate) const TAG_ROOT_JNI_GLOBAL: u8 = 0x01;
pub(crate) const TAG_ROOT_JNI_LOCAL: u8 = 0x02;
pub(crate) const TAG_ROOT_JAVA_FRAME: u8 = 0x03;
pub(crate) const TAG_ROOT_NATIVE_STACK: u8 = 0x04;
pub(crate) const TAG_ROOT_STICKY_CLASS: u8 = 0x05;
pub(crate) const TAG_ROOT_THREAD_BLOCK: u8 = 0x06;
pub(crate) const TAG_ROOT_MONITOR_USED: u8 = 0x07;
pub(crate) const TAG_ROOT_THREAD_OBJECT: u8 = 0x08;
pub(crate) const TAG_CLASS_DUMP: u8 = 0x20;
pub(crate) const TAG_INSTANCE_DUMP: u8 = 0x21;
pub(crate) const TAG_OBJECT_ARRAY_DUMP: u8 = 0x22;
pub(crate) const TAG_PRIMITIVE_ARRAY_DUMP: u8 = 0x23;

#[derive(Clone, Copy, Debug)]
pub struct RootUnknown {
    pub object_id: Id,
}

#[derive(Clone, Copy, Debug)]
pub struct RootJniGlobal {
    pub object_id: Id,
    pub jni_global_ref_id: Id,
}

#[derive(Clone, Copy, Debug)]
pub struct RootJniLocal {
    pub object_id: Id,
    pub thread_serial: Serial,
    pub frame_number: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct RootJavaFrame {
    pub object_id: Id,
    pub thread_serial: Serial,
    pub frame_number: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct RootNativeStack {
    pub object_id: Id,
    pub thread_serial: Serial,
}

#[derive(Clone, Copy, Debug)]
pub struct RootStickyClass {
    pub object_id: Id,
}

#[derive(Clone, Copy, Debug)]
pub struct RootThreadBlock {
    pub object_id: Id,
    pub thread_serial: Serial,
}

#[derive(Clone, Copy, Debug)]
pub struct RootMonitorUsed {
    pub object_id: Id,
}

#[derive(Clone, Copy, Debug)]
pub struct RootThreadObject {
    pub object_id: Id,
    pub thread_serial: Serial,
    pub stack_trace_serial: Serial,
}

pub(crate) fn read_root_unknown<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<RootUnknown, Error> {
    Ok(RootUnknown {
        object_id: reader.read_id()?,
    })
}

pub(crate) fn read_root_jni_global<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<RootJniGlobal, Error> {
    Ok(RootJniGlobal {
        object_id: reader.read_id()?,
        jni_global_ref_id: reader.read_id()?,
    })
}

pub(crate) fn read_root_jni_local<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<RootJniLocal, Error> {
    Ok(RootJniLocal {
        object_id: reader.read_id()?,
        thread_serial: reader.read_u32()?.into(),
        frame_number: reader.read_u32()?,
    })
}

pub(crate) fn read_root_java_frame<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<RootJavaFrame, Error> {
    Ok(RootJavaFrame {
        object_id: reader.read_id()?,
        thread_serial: reader.read_u32()?.into(),
        frame_number: reader.read_u32()?,
    })
}

pub(crate) fn read_root_native_stack<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<RootNativeStack, Error> {
    Ok(RootNativeStack {
        object_id: reader.read_id()?,
        thread_serial: reader.read_u32()?.into(),
    })
}

pub(crate) fn read_root_sticky_class<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<RootStickyClass, Error> {
    Ok(RootStickyClass {
        object_id: reader.read_id()?,
    })
}

pub(crate) fn read_root_thread_block<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<RootThreadBlock, Error> {
    Ok(RootThreadBlock {
        object_id: reader.read_id()?,
        thread_serial: reader.read_u32()?.into(),
    })
}

pub(crate) fn read_root_monitor_used<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<RootMonitorUsed, Error> {
    Ok(RootMonitorUsed {
        object_id: reader.read_id()?,
    })
}

pub(crate) fn read_root_thread_object<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<RootThreadObject, Error> {
    Ok(RootThreadObject {
        object_id: reader.read_id()?,
        thread_serial: reader.read_u32()?.into(),
        stack_trace_serial: reader.read_u32()?.into(),
    })
}

/// One entry of a class dump's constant pool: a JVM constant-pool slot that
/// happens to hold a value of interest to a profiler (other slots aren't
/// written at all).
#[derive(Clone, Copy, Debug)]
pub struct ConstantPoolEntry {
    pub index: u16,
    pub value: FieldValue,
}

#[derive(Clone, Copy, Debug)]
pub struct StaticFieldEntry {
    pub name_id: Id,
    pub value: FieldValue,
}

#[derive(Clone, Copy, Debug)]
pub struct InstanceFieldDescriptor {
    pub name_id: Id,
    pub field_type: FieldType,
}

/// A class dump record: the layout of one class, including its declared
/// instance fields in wire order. Also the unit stored in [`ClassTable`] for
/// later instance-dump decoding.
#[derive(Clone, Debug)]
pub struct ClassDescription {
    pub class_object_id: Id,
    pub stack_trace_serial: Serial,
    pub super_class_object_id: Id,
    pub class_loader_object_id: Id,
    pub signers_object_id: Id,
    pub protection_domain_object_id: Id,
    pub instance_size: u32,
    pub constants: Vec<ConstantPoolEntry>,
    pub statics: Vec<StaticFieldEntry>,
    pub instance_fields: Vec<InstanceFieldDescriptor>,
}

/// An instance dump, decoded eagerly: field values are already resolved
/// against the [`ClassTable`] rather than left as an opaque byte blob. Order
/// is most-derived-class-first, matching the wire layout (see
/// `SPEC_FULL.md` §9).
#[derive(Clone, Debug)]
pub struct InstanceDump {
    pub object_id: Id,
    pub stack_trace_serial: Serial,
    pub class_object_id: Id,
    pub fields: Vec<(Id, FieldValue)>,
}

#[derive(Clone, Debug)]
pub struct ObjectArrayDump {
    pub object_id: Id,
    pub stack_trace_serial: Serial,
    pub array_class_id: Id,
    pub elements: Vec<Id>,
}

#[derive(Clone, Debug)]
pub struct PrimitiveArrayDump {
    pub object_id: Id,
    pub stack_trace_serial: Serial,
    pub element_type: FieldType,
    pub values: ArrayValue,
}

/// Classes seen so far in the current heap dump, keyed by `class_object_id`.
/// Populated as class-dump sub-records are decoded and consulted by
/// [`read_instance_dump`] for each instance's field layout (the eager
/// decoding strategy, see `SPEC_FULL.md` §9).
#[derive(Default)]
pub struct ClassTable {
    classes: HashMap<Id, ClassDescription>,
}

impl ClassTable {
    pub fn new() -> Self {
        ClassTable {
            classes: HashMap::new(),
        }
    }

    pub fn insert(&mut self, class: ClassDescription) {
        self.classes.insert(class.class_object_id, class);
    }

    pub fn get(&self, class_object_id: Id) -> Option<&ClassDescription> {
        self.classes.get(&class_object_id)
    }
}

pub(crate) fn read_class_dump<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
    record_tag: u8,
    record_offset: u64,
) -> Result<ClassDescription, Error> {
    let class_object_id = reader.read_id()?;
    let stack_trace_serial = reader.read_u32()?.into();
    let super_class_object_id = reader.read_id()?;
    let class_loader_object_id = reader.read_id()?;
    let signers_object_id = reader.read_id()?;
    let protection_domain_object_id = reader.read_id()?;
    reader.read_id()?; // reserved
    reader.read_id()?; // reserved
    let instance_size = reader.read_u32()?;

    // These three sections are each independently count-prefixed; none of
    // them is bounded by `instance_size`, which describes only the byte
    // size of this class's future instance dumps (see `SPEC_FULL.md` §4).
    let const_pool_count = reader.read_u16()?;
    let mut constants = Vec::with_capacity(const_pool_count as usize);
    for _ in 0..const_pool_count {
        let index = reader.read_u16()?;
        let field_type = FieldType::from_tag_byte(reader.read_u8()?, record_tag, record_offset)?;
        let value = read_field_value(reader, field_type)?;
        constants.push(ConstantPoolEntry { index, value });
    }

    let static_count = reader.read_u16()?;
    let mut statics = Vec::with_capacity(static_count as usize);
    for _ in 0..static_count {
        let name_id = reader.read_id()?;
        let field_type = FieldType::from_tag_byte(reader.read_u8()?, record_tag, record_offset)?;
        let value = read_field_value(reader, field_type)?;
        statics.push(StaticFieldEntry { name_id, value });
    }

    let instance_field_count = reader.read_u16()?;
    let mut instance_fields = Vec::with_capacity(instance_field_count as usize);
    for _ in 0..instance_field_count {
        let name_id = reader.read_id()?;
        let field_type = FieldType::from_tag_byte(reader.read_u8()?, record_tag, record_offset)?;
        instance_fields.push(InstanceFieldDescriptor {
            name_id,
            field_type,
        });
    }

    Ok(ClassDescription {
        class_object_id,
        stack_trace_serial,
        super_class_object_id,
        class_loader_object_id,
        signers_object_id,
        protection_domain_object_id,
        instance_size,
        constants,
        statics,
        instance_fields,
    })
}

/// Decodes an instance dump's field bytes against `class_table`, walking
/// from the object's own class up through `super_class_object_id` until it
/// hits the root (id `0`). A class missing from `class_table` — a producer
/// emitting an instance dump before its class dump — is
/// [`FormatReason::MissingClassDump`], not a silent skip.
pub(crate) fn read_instance_dump<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
    class_table: &ClassTable,
    record_tag: u8,
    record_offset: u64,
) -> Result<InstanceDump, Error> {
    let object_id = reader.read_id()?;
    let stack_trace_serial = reader.read_u32()?.into();
    let class_object_id = reader.read_id()?;
    let data_size = reader.read_u32()?;

    let mut bounded = BoundedRead::new(reader, data_size as u64);
    let mut fields = Vec::new();
    let mut current = class_object_id;
    while current.value() != 0 {
        let class_desc = class_table.get(current).ok_or(Error::FormatError {
            tag: record_tag,
            offset: record_offset,
            reason: FormatReason::MissingClassDump,
        })?;
        for field in &class_desc.instance_fields {
            let value = read_field_value(&mut bounded, field.field_type)?;
            fields.push((field.name_id, value));
        }
        current = class_desc.super_class_object_id;
    }
    bounded.finish(record_tag, record_offset)?;

    Ok(InstanceDump {
        object_id,
        stack_trace_serial,
        class_object_id,
        fields,
    })
}

pub(crate) fn read_object_array_dump<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<ObjectArrayDump, Error> {
    let object_id = reader.read_id()?;
    let stack_trace_serial = reader.read_u32()?.into();
    let num_elements = reader.read_u32()?;
    let array_class_id = reader.read_id()?;
    let mut elements = Vec::with_capacity(num_elements as usize);
    for _ in 0..num_elements {
        elements.push(reader.read_id()?);
    }
    Ok(ObjectArrayDump {
        object_id,
        stack_trace_serial,
        array_class_id,
        elements,
    })
}

pub(crate) fn read_primitive_array_dump<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
    record_tag: u8,
    record_offset: u64,
) -> Result<PrimitiveArrayDump, Error> {
    let object_id = reader.read_id()?;
    let stack_trace_serial = reader.read_u32()?.into();
    let num_elements = reader.read_u32()?;
    let type_tag = reader.read_u8()?;
    let element_type = FieldType::from_tag_byte(type_tag, record_tag, record_offset)?;
    let values = read_array_values(
        reader,
        element_type,
        num_elements as usize,
        record_tag,
        record_offset,
    )?;
    Ok(PrimitiveArrayDump {
        object_id,
        stack_trace_serial,
        element_type,
        values,
    })
}

fn read_array_values<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
    ty: FieldType,
    count: usize,
    record_tag: u8,
    record_offset: u64,
) -> Result<ArrayValue, Error> {
    macro_rules! collect {
        ($read:ident, $variant:ident) => {{
            let mut v = Vec::with_capacity(count);
            for _ in 0..count {
                v.push(reader.$read()?);
            }
            ArrayValue::$variant(v)
        }};
    }
    Ok(match ty {
        FieldType::Bool => collect!(read_bool, Bool),
        FieldType::Char => collect!(read_u16, Char),
        FieldType::Float => collect!(read_f32, Float),
        FieldType::Double => collect!(read_f64, Double),
        FieldType::Byte => collect!(read_i8, Byte),
        FieldType::Short => collect!(read_i16, Short),
        FieldType::Int => collect!(read_i32, Int),
        FieldType::Long => collect!(read_i64, Long),
        FieldType::Object => {
            return Err(Error::FormatError {
                tag: record_tag,
                offset: record_offset,
                reason: FormatReason::UnknownBasicType(2),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ByteOrder, IdSize};
    use crate::reader::MemoryHprofRead;

    fn class_dump_bytes() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&1u64.to_be_bytes()); // class_object_id
        b.extend_from_slice(&0u32.to_be_bytes()); // stack_trace_serial
        b.extend_from_slice(&0u64.to_be_bytes()); // super_class_object_id (none)
        b.extend_from_slice(&0u64.to_be_bytes()); // class_loader_object_id
        b.extend_from_slice(&0u64.to_be_bytes()); // signers_object_id
        b.extend_from_slice(&0u64.to_be_bytes()); // protection_domain_object_id
        b.extend_from_slice(&0u64.to_be_bytes()); // reserved
        b.extend_from_slice(&0u64.to_be_bytes()); // reserved
        b.extend_from_slice(&16u32.to_be_bytes()); // instance_size
        b.extend_from_slice(&0u16.to_be_bytes()); // const_pool_count
        b.extend_from_slice(&0u16.to_be_bytes()); // static_count
        b.extend_from_slice(&1u16.to_be_bytes()); // instance_field_count
        b.extend_from_slice(&9u64.to_be_bytes()); // field name id
        b.push(10); // FieldType::Int
        b
    }

    #[test]
    fn class_dump_sections_are_count_prefixed() {
        let data = class_dump_bytes();
        let mut reader = MemoryHprofRead::new(&data, IdSize::U64, ByteOrder::Network);
        let class = read_class_dump(&mut reader, TAG_CLASS_DUMP, 0).unwrap();
        assert_eq!(class.instance_fields.len(), 1);
        assert_eq!(class.instance_fields[0].field_type, FieldType::Int);
        assert_eq!(class.super_class_object_id.value(), 0);
    }

    #[test]
    fn instance_dump_walks_superclass_chain_most_derived_first() {
        let mut table = ClassTable::new();
        table.insert(ClassDescription {
            class_object_id: 2u64.into(),
            stack_trace_serial: 0u32.into(),
            super_class_object_id: 0u64.into(),
            class_loader_object_id: 0u64.into(),
            signers_object_id: 0u64.into(),
            protection_domain_object_id: 0u64.into(),
            instance_size: 8,
            constants: vec![],
            statics: vec![],
            instance_fields: vec![InstanceFieldDescriptor {
                name_id: 200u64.into(),
                field_type: FieldType::Long,
            }],
        });
        table.insert(ClassDescription {
            class_object_id: 1u64.into(),
            stack_trace_serial: 0u32.into(),
            super_class_object_id: 2u64.into(),
            class_loader_object_id: 0u64.into(),
            signers_object_id: 0u64.into(),
            protection_domain_object_id: 0u64.into(),
            instance_size: 4,
            constants: vec![],
            statics: vec![],
            instance_fields: vec![InstanceFieldDescriptor {
                name_id: 100u64.into(),
                field_type: FieldType::Int,
            }],
        });

        let mut body = Vec::new();
        body.extend_from_slice(&1u64.to_be_bytes()); // object_id
        body.extend_from_slice(&0u32.to_be_bytes()); // stack_trace_serial
        body.extend_from_slice(&1u64.to_be_bytes()); // class_object_id
        body.extend_from_slice(&12u32.to_be_bytes()); // data_size: 4 (int) + 8 (long)
        body.extend_from_slice(&7i32.to_be_bytes()); // own class's int field
        body.extend_from_slice(&9i64.to_be_bytes()); // superclass's long field

        let mut reader = MemoryHprofRead::new(&body, IdSize::U64, ByteOrder::Network);
        let instance = read_instance_dump(&mut reader, &table, TAG_INSTANCE_DUMP, 0).unwrap();
        assert_eq!(instance.fields.len(), 2);
        assert_eq!(instance.fields[0].0.value(), 100);
        assert_eq!(instance.fields[1].0.value(), 200);
        match instance.fields[1].1 {
            FieldValue::Long(v) => assert_eq!(v, 9),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn instance_dump_missing_class_is_format_error() {
        let table = ClassTable::new();
        let mut body = Vec::new();
        body.extend_from_slice(&1u64.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&99u64.to_be_bytes()); // unknown class
        body.extend_from_slice(&0u32.to_be_bytes());
        let mut reader = MemoryHprofRead::new(&body, IdSize::U64, ByteOrder::Network);
        match read_instance_dump(&mut reader, &table, TAG_INSTANCE_DUMP, 0) {
            Err(Error::FormatError {
                reason: FormatReason::MissingClassDump,
                ..
            }) => {}
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn instance_dump_rejects_frame_length_mismatch() {
        let mut table = ClassTable::new();
        table.insert(ClassDescription {
            class_object_id: 1u64.into(),
            stack_trace_serial: 0u32.into(),
            super_class_object_id: 0u64.into(),
            class_loader_object_id: 0u64.into(),
            signers_object_id: 0u64.into(),
            protection_domain_object_id: 0u64.into(),
            instance_size: 4,
            constants: vec![],
            statics: vec![],
            instance_fields: vec![InstanceFieldDescriptor {
                name_id: 100u64.into(),
                field_type: FieldType::Int,
            }],
        });
        let mut body = Vec::new();
        body.extend_from_slice(&1u64.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&1u64.to_be_bytes());
        body.extend_from_slice(&8u32.to_be_bytes()); // claims 8, field only consumes 4
        body.extend_from_slice(&7i32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        let mut reader = MemoryHprofRead::new(&body, IdSize::U64, ByteOrder::Network);
        match read_instance_dump(&mut reader, &table, TAG_INSTANCE_DUMP, 0) {
            Err(Error::FormatError {
                reason: FormatReason::FrameLengthMismatch,
                ..
            }) => {}
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn primitive_array_dump_reads_int_elements() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u64.to_be_bytes()); // object_id
        data.extend_from_slice(&0u32.to_be_bytes()); // stack_trace_serial
        data.extend_from_slice(&3u32.to_be_bytes()); // num_elements
        data.push(10); // FieldType::Int
        data.extend_from_slice(&1i32.to_be_bytes());
        data.extend_from_slice(&2i32.to_be_bytes());
        data.extend_from_slice(&3i32.to_be_bytes());
        let mut reader = MemoryHprofRead::new(&data, IdSize::U64, ByteOrder::Network);
        let dump = read_primitive_array_dump(&mut reader, TAG_PRIMITIVE_ARRAY_DUMP, 0).unwrap();
        assert_eq!(dump.element_type, FieldType::Int);
        match dump.values {
            ArrayValue::Int(v) => assert_eq!(v, vec![1, 2, 3]),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn primitive_array_dump_rejects_object_type_tag() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u64.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.push(2); // Object tag, invalid for a primitive array
        let mut reader = MemoryHprofRead::new(&data, IdSize::U64, ByteOrder::Network);
        match read_primitive_array_dump(&mut reader, TAG_PRIMITIVE_ARRAY_DUMP, 0) {
            Err(Error::FormatError {
                reason: FormatReason::UnknownBasicType(2),
                ..
            }) => {}
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn object_array_dump_reads_elements() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u64.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&5u64.to_be_bytes()); // array class id
        data.extend_from_slice(&10u64.to_be_bytes());
        data.extend_from_slice(&11u64.to_be_bytes());
        let mut reader = MemoryHprofRead::new(&data, IdSize::U64, ByteOrder::Network);
        let dump = read_object_array_dump(&mut reader).unwrap();
        assert_eq!(dump.elements.len(), 2);
        assert_eq!(dump.elements[1].value(), 11);
    }
}
