#![forbid(unsafe_code)]

//! Top-level record types and their decoders (tags `0x01`-`0x0E`, excluding
//! the heap-dump container tags which have their own sub-parser in
//! [`crate::heap_dump`]).

use crate::error::Error;
use crate::id::{Id, Serial};
use crate::reader::HprofRead;

pub(crate) const TAG_UTF8: u8 = 0x01;
pub(crate) const TAG_LOAD_CLASS: u8 = 0x02;
pub(crate) const TAG_UNLOAD_CLASS: u8 = 0x03;
pub(crate) const TAG_STACK_FRAME: u8 = 0x04;
pub(crate) const TAG_STACK_TRACE: u8 = 0x05;
pub(crate) const TAG_ALLOC_SITES: u8 = 0x06;
pub(crate) const TAG_HEAP_SUMMARY: u8 = 0x07;
pub(crate) const TAG_START_THREAD: u8 = 0x0A;
pub(crate) const TAG_END_THREAD: u8 = 0x0B;
pub(crate) const TAG_HEAP_DUMP: u8 = 0x0C;
pub(crate) const TAG_CPU_SAMPLES: u8 = 0x0D;
pub(crate) const TAG_CONTROL_SETTINGS: u8 = 0x0E;
pub(crate) const TAG_HEAP_DUMP_SEGMENT: u8 = 0x1C;
pub(crate) const TAG_HEAP_DUMP_END: u8 = 0x2C;

/// A line referenced from a [`StackFrameRecord`]. Negative codes are
/// reserved sentinels rather than real line numbers.
#[derive(Copy, Clone, Debug)]
pub enum LineNum {
    Line(u32),
    Unknown,
    CompiledMethod,
    NativeMethod,
}

impl LineNum {
    fn from_code(code: i32) -> LineNum {
        match code {
            n if n > 0 => LineNum::Line(n as u32),
            -1 => LineNum::Unknown,
            -2 => LineNum::CompiledMethod,
            -3 => LineNum::NativeMethod,
            // Any other reserved/unrecognized negative code is treated like
            // Unknown rather than failing the whole record: it carries no
            // further information the handler could act on either way.
            _ => LineNum::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoadClassRecord {
    pub class_serial: Serial,
    pub class_obj_id: Id,
    pub stack_trace_serial: Serial,
    pub class_name_id: Id,
}

#[derive(Clone, Debug)]
pub struct StackFrameRecord {
    pub frame_id: Id,
    pub method_name_id: Id,
    pub method_signature_id: Id,
    pub source_file_name_id: Id,
    pub class_serial: Serial,
    pub line_num: LineNum,
}

#[derive(Clone, Debug)]
pub struct StackTraceRecord {
    pub stack_trace_serial: Serial,
    pub thread_serial: Serial,
    pub frame_ids: Vec<Id>,
}

#[derive(Clone, Debug)]
pub struct AllocSite {
    pub is_array: u8,
    pub class_serial: Serial,
    pub stack_trace_serial: Serial,
    pub live_bytes: u32,
    pub live_instances: u32,
    pub total_bytes_allocated: u32,
    pub total_instances_allocated: u32,
}

#[derive(Clone, Debug)]
pub struct AllocSitesRecord {
    pub flags: u16,
    pub cutoff_ratio: f32,
    pub live_bytes: u32,
    pub live_instances: u32,
    pub total_bytes_allocated: u64,
    pub total_instances_allocated: u64,
    pub sites: Vec<AllocSite>,
}

#[derive(Clone, Debug)]
pub struct HeapSummaryRecord {
    pub live_bytes: u32,
    pub live_instances: u32,
    pub total_bytes: u64,
    pub total_instances: u64,
}

#[derive(Clone, Debug)]
pub struct StartThreadRecord {
    pub thread_serial: Serial,
    pub thread_object_id: Id,
    pub stack_trace_serial: Serial,
    pub thread_name_id: Id,
    pub thread_group_name_id: Id,
    pub thread_group_parent_name_id: Id,
}

#[derive(Clone, Debug)]
pub struct EndThreadRecord {
    pub thread_serial: Serial,
}

#[derive(Clone, Debug)]
pub struct CpuSample {
    pub num_samples: u32,
    pub stack_trace_serial: Serial,
}

#[derive(Clone, Debug)]
pub struct CpuSamplesRecord {
    pub total_num_samples: u32,
    pub samples: Vec<CpuSample>,
}

#[derive(Clone, Debug)]
pub struct ControlSettingsRecord {
    pub bits: u32,
    pub stack_trace_depth: u16,
}

pub(crate) fn read_utf8<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
    id_size_bytes: u32,
    body_len: u64,
) -> Result<(Id, Bytes), Error> {
    let id = reader.read_id()?;
    let payload_len = body_len - id_size_bytes as u64;
    let text = reader.read_bytes(payload_len)?;
    Ok((id, text))
}

pub(crate) fn read_load_class<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<LoadClassRecord, Error> {
    Ok(LoadClassRecord {
        class_serial: reader.read_u32()?.into(),
        class_obj_id: reader.read_id()?,
        stack_trace_serial: reader.read_u32()?.into(),
        class_name_id: reader.read_id()?,
    })
}

pub(crate) fn read_unload_class<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<Serial, Error> {
    Ok(reader.read_u32()?.into())
}

pub(crate) fn read_stack_frame<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<StackFrameRecord, Error> {
    Ok(StackFrameRecord {
        frame_id: reader.read_id()?,
        method_name_id: reader.read_id()?,
        method_signature_id: reader.read_id()?,
        source_file_name_id: reader.read_id()?,
        class_serial: reader.read_u32()?.into(),
        line_num: LineNum::from_code(reader.read_i32()?),
    })
}

pub(crate) fn read_stack_trace<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<StackTraceRecord, Error> {
    let stack_trace_serial = reader.read_u32()?.into();
    let thread_serial = reader.read_u32()?.into();
    let num_frames = reader.read_u32()?;
    let mut frame_ids = Vec::with_capacity(num_frames as usize);
    for _ in 0..num_frames {
        frame_ids.push(reader.read_id()?);
    }
    Ok(StackTraceRecord {
        stack_trace_serial,
        thread_serial,
        frame_ids,
    })
}

pub(crate) fn read_alloc_sites<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<AllocSitesRecord, Error> {
    let flags = reader.read_u16()?;
    let cutoff_ratio = reader.read_f32()?;
    let live_bytes = reader.read_u32()?;
    let live_instances = reader.read_u32()?;
    let total_bytes_allocated = reader.read_u64()?;
    let total_instances_allocated = reader.read_u64()?;
    let num_sites = reader.read_u32()?;
    let mut sites = Vec::with_capacity(num_sites as usize);
    for _ in 0..num_sites {
        sites.push(AllocSite {
            is_array: reader.read_u8()?,
            class_serial: reader.read_u32()?.into(),
            stack_trace_serial: reader.read_u32()?.into(),
            live_bytes: reader.read_u32()?,
            live_instances: reader.read_u32()?,
            total_bytes_allocated: reader.read_u32()?,
            total_instances_allocated: reader.read_u32()?,
        });
    }
    Ok(AllocSitesRecord {
        flags,
        cutoff_ratio,
        live_bytes,
        live_instances,
        total_bytes_allocated,
        total_instances_allocated,
        sites,
    })
}

pub(crate) fn read_heap_summary<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<HeapSummaryRecord, Error> {
    Ok(HeapSummaryRecord {
        live_bytes: reader.read_u32()?,
        live_instances: reader.read_u32()?,
        total_bytes: reader.read_u64()?,
        total_instances: reader.read_u64()?,
    })
}

pub(crate) fn read_start_thread<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<StartThreadRecord, Error> {
    Ok(StartThreadRecord {
        thread_serial: reader.read_u32()?.into(),
        thread_object_id: reader.read_id()?,
        stack_trace_serial: reader.read_u32()?.into(),
        thread_name_id: reader.read_id()?,
        thread_group_name_id: reader.read_id()?,
        thread_group_parent_name_id: reader.read_id()?,
    })
}

pub(crate) fn read_end_thread<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<EndThreadRecord, Error> {
    Ok(EndThreadRecord {
        thread_serial: reader.read_u32()?.into(),
    })
}

pub(crate) fn read_cpu_samples<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<CpuSamplesRecord, Error> {
    let total_num_samples = reader.read_u32()?;
    let num_traces = reader.read_u32()?;
    let mut samples = Vec::with_capacity(num_traces as usize);
    for _ in 0..num_traces {
        samples.push(CpuSample {
            num_samples: reader.read_u32()?,
            stack_trace_serial: reader.read_u32()?.into(),
        });
    }
    Ok(CpuSamplesRecord {
        total_num_samples,
        samples,
    })
}

pub(crate) fn read_control_settings<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<ControlSettingsRecord, Error> {
    Ok(ControlSettingsRecord {
        bits: reader.read_u32()?,
        stack_trace_depth: reader.read_u16()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ByteOrder, IdSize};
    use crate::reader::MemoryHprofRead;

    fn memory_reader(data: &[u8]) -> MemoryHprofRead<'_> {
        MemoryHprofRead::new(data, IdSize::U64, ByteOrder::Network)
    }

    #[test]
    fn load_class_decodes_all_fields() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes()); // class_serial
        data.extend_from_slice(&2u64.to_be_bytes()); // class_obj_id
        data.extend_from_slice(&3u32.to_be_bytes()); // stack_trace_serial
        data.extend_from_slice(&4u64.to_be_bytes()); // class_name_id
        let mut reader = memory_reader(&data);
        let record = read_load_class(&mut reader).unwrap();
        assert_eq!(record.class_serial.value(), 1);
        assert_eq!(record.class_obj_id.value(), 2);
        assert_eq!(record.stack_trace_serial.value(), 3);
        assert_eq!(record.class_name_id.value(), 4);
    }

    #[test]
    fn unload_class_decodes_serial() {
        let data = 7u32.to_be_bytes();
        let mut reader = memory_reader(&data);
        assert_eq!(read_unload_class(&mut reader).unwrap().value(), 7);
    }

    #[test]
    fn end_thread_decodes_serial() {
        let data = 5u32.to_be_bytes();
        let mut reader = memory_reader(&data);
        assert_eq!(read_end_thread(&mut reader).unwrap().thread_serial.value(), 5);
    }

    #[test]
    fn stack_frame_decodes_a_normal_line_number() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u64.to_be_bytes()); // frame_id
        data.extend_from_slice(&2u64.to_be_bytes()); // method_name_id
        data.extend_from_slice(&3u64.to_be_bytes()); // method_signature_id
        data.extend_from_slice(&4u64.to_be_bytes()); // source_file_name_id
        data.extend_from_slice(&9u32.to_be_bytes()); // class_serial
        data.extend_from_slice(&42i32.to_be_bytes()); // line_num
        let mut reader = memory_reader(&data);
        let record = read_stack_frame(&mut reader).unwrap();
        assert_eq!(record.frame_id.value(), 1);
        assert_eq!(record.class_serial.value(), 9);
        match record.line_num {
            LineNum::Line(42) => {}
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn stack_frame_maps_reserved_negative_codes() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u64.to_be_bytes());
        data.extend_from_slice(&0u64.to_be_bytes());
        data.extend_from_slice(&0u64.to_be_bytes());
        data.extend_from_slice(&0u64.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&(-2i32).to_be_bytes());
        let mut reader = memory_reader(&data);
        match read_stack_frame(&mut reader).unwrap().line_num {
            LineNum::CompiledMethod => {}
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn stack_trace_decodes_frame_ids() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes()); // stack_trace_serial
        data.extend_from_slice(&2u32.to_be_bytes()); // thread_serial
        data.extend_from_slice(&2u32.to_be_bytes()); // num_frames
        data.extend_from_slice(&10u64.to_be_bytes());
        data.extend_from_slice(&11u64.to_be_bytes());
        let mut reader = memory_reader(&data);
        let record = read_stack_trace(&mut reader).unwrap();
        assert_eq!(record.frame_ids.len(), 2);
        assert_eq!(record.frame_ids[1].value(), 11);
    }

    #[test]
    fn alloc_sites_decodes_prefix_and_one_site() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u16.to_be_bytes()); // flags
        data.extend_from_slice(&0.5f32.to_be_bytes()); // cutoff_ratio
        data.extend_from_slice(&100u32.to_be_bytes()); // live_bytes
        data.extend_from_slice(&10u32.to_be_bytes()); // live_instances
        data.extend_from_slice(&200u64.to_be_bytes()); // total_bytes_allocated
        data.extend_from_slice(&20u64.to_be_bytes()); // total_instances_allocated
        data.extend_from_slice(&1u32.to_be_bytes()); // num_sites
        data.push(1); // is_array
        data.extend_from_slice(&3u32.to_be_bytes()); // class_serial
        data.extend_from_slice(&4u32.to_be_bytes()); // stack_trace_serial
        data.extend_from_slice(&5u32.to_be_bytes()); // live_bytes
        data.extend_from_slice(&6u32.to_be_bytes()); // live_instances
        data.extend_from_slice(&7u32.to_be_bytes()); // total_bytes_allocated
        data.extend_from_slice(&8u32.to_be_bytes()); // total_instances_allocated
        let mut reader = memory_reader(&data);
        let record = read_alloc_sites(&mut reader).unwrap();
        assert_eq!(record.cutoff_ratio, 0.5);
        assert_eq!(record.sites.len(), 1);
        assert_eq!(record.sites[0].is_array, 1);
        assert_eq!(record.sites[0].total_instances_allocated, 8);
    }

    #[test]
    fn heap_summary_decodes_all_fields() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&3u64.to_be_bytes());
        data.extend_from_slice(&4u64.to_be_bytes());
        let mut reader = memory_reader(&data);
        let record = read_heap_summary(&mut reader).unwrap();
        assert_eq!(record.live_bytes, 1);
        assert_eq!(record.live_instances, 2);
        assert_eq!(record.total_bytes, 3);
        assert_eq!(record.total_instances, 4);
    }

    #[test]
    fn start_thread_decodes_all_fields() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes()); // thread_serial
        data.extend_from_slice(&2u64.to_be_bytes()); // thread_object_id
        data.extend_from_slice(&3u32.to_be_bytes()); // stack_trace_serial
        data.extend_from_slice(&4u64.to_be_bytes()); // thread_name_id
        data.extend_from_slice(&5u64.to_be_bytes()); // thread_group_name_id
        data.extend_from_slice(&6u64.to_be_bytes()); // thread_group_parent_name_id
        let mut reader = memory_reader(&data);
        let record = read_start_thread(&mut reader).unwrap();
        assert_eq!(record.thread_serial.value(), 1);
        assert_eq!(record.thread_object_id.value(), 2);
        assert_eq!(record.thread_group_parent_name_id.value(), 6);
    }

    #[test]
    fn cpu_samples_decodes_each_sample() {
        let mut data = Vec::new();
        data.extend_from_slice(&50u32.to_be_bytes()); // total_num_samples
        data.extend_from_slice(&2u32.to_be_bytes()); // num_traces
        data.extend_from_slice(&30u32.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(&2u32.to_be_bytes());
        let mut reader = memory_reader(&data);
        let record = read_cpu_samples(&mut reader).unwrap();
        assert_eq!(record.total_num_samples, 50);
        assert_eq!(record.samples.len(), 2);
        assert_eq!(record.samples[1].num_samples, 20);
        assert_eq!(record.samples[1].stack_trace_serial.value(), 2);
    }

    #[test]
    fn control_settings_decodes_all_fields() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x3u32.to_be_bytes());
        data.extend_from_slice(&16u16.to_be_bytes());
        let mut reader = memory_reader(&data);
        let record = read_control_settings(&mut reader).unwrap();
        assert_eq!(record.bits, 0x3);
        assert_eq!(record.stack_trace_depth, 16);
    }
}

