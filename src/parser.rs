#![forbid(unsafe_code)]

//! The outer frame loop, the heap-dump sub-parser, and the entry points that
//! tie a byte source, a [`HprofHandler`] and a [`ParserOptions`] together.
//!
//! Byte offsets reported in errors raised from here are relative to the
//! start of the record stream (i.e. right after the file header), not the
//! absolute file offset.

use crate::error::{Error, FormatReason};
use crate::handler::{HeapDumpKind, HprofHandler};
use crate::heap_dump::{self, ClassTable, InstanceDump};
use crate::id::{ByteOrder, IdSize};
use crate::reader::{BoundedRead, HprofRead, MemoryHprofRead, StreamHprofRead};
use crate::records;
use byteorder::{NetworkEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// The fixed-layout preamble every hprof stream starts with: a
/// null-terminated format-identifier string, the width of every `Id` field
/// that follows, and a millisecond Unix timestamp.
#[derive(Clone, Debug)]
pub struct FileHeader {
    pub format: Vec<u8>,
    pub id_size: IdSize,
    pub timestamp_millis: u64,
}

/// Tunables for a single parse. Defaults match what a conforming hprof
/// stream looks like in practice; `with_max_frame_body_len` and
/// `with_decode_instance_fields` exist purely for the caller's own
/// resource/performance tradeoffs, not format correctness.
#[derive(Clone, Debug)]
pub struct ParserOptions {
    byte_order: ByteOrder,
    decode_instance_fields: bool,
    max_frame_body_len: u64,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            byte_order: ByteOrder::Network,
            decode_instance_fields: true,
            max_frame_body_len: 64 * 1024 * 1024,
        }
    }
}

impl ParserOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most producers write big-endian (`ByteOrder::Network`); this exists
    /// for the rare non-conforming producer, as the teacher's
    /// `StreamHprofReader` builder already allowed.
    pub fn with_id_byteorder(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// When `false`, instance dumps are delivered with an empty `fields`
    /// list instead of being decoded against the class table — the class
    /// chain walk and the class table itself still update normally, so a
    /// later instance dump referencing the same classes is unaffected.
    pub fn with_decode_instance_fields(mut self, decode: bool) -> Self {
        self.decode_instance_fields = decode;
        self
    }

    /// A frame declaring a larger body length than this is rejected before
    /// any of its body is read, so a corrupt or hostile length field can't
    /// force a large allocation downstream.
    pub fn with_max_frame_body_len(mut self, max: u64) -> Self {
        self.max_frame_body_len = max;
        self
    }
}

fn read_file_header<R: Read>(source: &mut R) -> Result<FileHeader, Error> {
    let mut format = Vec::new();
    loop {
        let b = source
            .read_u8()
            .map_err(|_| Error::TruncatedStream {
                offset: format.len() as u64,
            })?;
        if b == 0 {
            break;
        }
        format.push(b);
    }
    let header_tail_offset = format.len() as u64 + 1;

    let id_size_raw = source
        .read_u32::<NetworkEndian>()
        .map_err(|_| Error::TruncatedStream {
            offset: header_tail_offset,
        })?;
    let id_size = IdSize::from_header_value(id_size_raw).ok_or(Error::FormatError {
        tag: 0,
        offset: header_tail_offset,
        reason: FormatReason::InvalidIdSize(id_size_raw),
    })?;

    let timestamp_millis = source
        .read_u64::<NetworkEndian>()
        .map_err(|_| Error::TruncatedStream {
            offset: header_tail_offset + 4,
        })?;

    Ok(FileHeader {
        format,
        id_size,
        timestamp_millis,
    })
}

/// Drives a [`HprofHandler`] to completion over one hprof byte stream.
/// Built by [`parse_reader`], [`parse_slice`] or [`parse_file`] rather than
/// directly, since constructing the inner reader needs the file header's
/// `id_size` decided first.
struct HprofParser<Bytes, R: HprofRead<Bytes>, H: HprofHandler> {
    reader: R,
    handler: H,
    options: ParserOptions,
    class_table: ClassTable,
    _bytes: std::marker::PhantomData<Bytes>,
}

impl<Bytes: AsRef<[u8]>, R: HprofRead<Bytes>, H: HprofHandler> HprofParser<Bytes, R, H> {
    fn run(self) -> Result<H, Error> {
        let HprofParser {
            mut reader,
            mut handler,
            options,
            mut class_table,
            ..
        } = self;
        let mut heap_dump_segment_open = false;

        loop {
            let tag = match reader.read_u8() {
                Ok(tag) => tag,
                Err(Error::TruncatedStream { .. }) => break,
                Err(e) => return Err(e),
            };
            let frame_offset = reader.position();
            let _timestamp_delta_us = reader.read_u32()?;
            let body_len = reader.read_u32()? as u64;
            if body_len > options.max_frame_body_len {
                return Err(Error::FormatError {
                    tag,
                    offset: frame_offset,
                    reason: FormatReason::FrameTooLarge {
                        declared: body_len,
                        limit: options.max_frame_body_len,
                    },
                });
            }

            let mut bounded = BoundedRead::new(&mut reader, body_len);
            dispatch_top_level(
                tag,
                &mut bounded,
                body_len,
                &mut handler,
                &mut class_table,
                &options,
                &mut heap_dump_segment_open,
            )?;
            bounded.finish(tag, frame_offset)?;
        }

        Ok(handler)
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_top_level<Bytes: AsRef<[u8]>, R: HprofRead<Bytes>, H: HprofHandler>(
    tag: u8,
    reader: &mut R,
    body_len: u64,
    handler: &mut H,
    class_table: &mut ClassTable,
    options: &ParserOptions,
    heap_dump_segment_open: &mut bool,
) -> Result<(), Error> {
    log::trace!("dispatching record tag {:#x} ({} body bytes)", tag, body_len);
    match tag {
        records::TAG_UTF8 => {
            let id_width = reader.id_width();
            let (id, text) = records::read_utf8(reader, id_width, body_len)?;
            handler.on_utf8(id, text.as_ref())?;
        }
        records::TAG_LOAD_CLASS => handler.on_load_class(&records::read_load_class(reader)?)?,
        records::TAG_UNLOAD_CLASS => {
            handler.on_unload_class(records::read_unload_class(reader)?)?
        }
        records::TAG_STACK_FRAME => {
            handler.on_stack_frame(&records::read_stack_frame(reader)?)?
        }
        records::TAG_STACK_TRACE => {
            handler.on_stack_trace(&records::read_stack_trace(reader)?)?
        }
        records::TAG_ALLOC_SITES => {
            handler.on_alloc_sites(&records::read_alloc_sites(reader)?)?
        }
        records::TAG_HEAP_SUMMARY => {
            handler.on_heap_summary(&records::read_heap_summary(reader)?)?
        }
        records::TAG_START_THREAD => {
            handler.on_start_thread(&records::read_start_thread(reader)?)?
        }
        records::TAG_END_THREAD => handler.on_end_thread(&records::read_end_thread(reader)?)?,
        records::TAG_CPU_SAMPLES => {
            handler.on_cpu_samples(&records::read_cpu_samples(reader)?)?
        }
        records::TAG_CONTROL_SETTINGS => {
            handler.on_control_settings(&records::read_control_settings(reader)?)?
        }
        records::TAG_HEAP_DUMP => {
            log::debug!("entering standalone heap dump container");
            handler.on_heap_dump_begin(HeapDumpKind::Standalone)?;
            run_heap_dump(reader, class_table, handler, options.decode_instance_fields)?;
            handler.on_heap_dump_end()?;
            log::debug!("closed standalone heap dump container");
        }
        records::TAG_HEAP_DUMP_SEGMENT => {
            if !*heap_dump_segment_open {
                log::debug!("entering segmented heap dump container");
                handler.on_heap_dump_begin(HeapDumpKind::Segment)?;
                *heap_dump_segment_open = true;
            }
            run_heap_dump(reader, class_table, handler, options.decode_instance_fields)?;
        }
        records::TAG_HEAP_DUMP_END => {
            handler.on_heap_dump_end()?;
            *heap_dump_segment_open = false;
            log::debug!("closed segmented heap dump container");
        }
        other => {
            log::warn!("skipping unknown top-level record tag {:#x}", other);
            let remaining = reader.remaining_in_frame().unwrap_or(0);
            reader.skip(remaining)?;
        }
    }
    Ok(())
}

fn run_heap_dump<Bytes, R: HprofRead<Bytes>, H: HprofHandler>(
    reader: &mut R,
    class_table: &mut ClassTable,
    handler: &mut H,
    decode_instance_fields: bool,
) -> Result<(), Error> {
    loop {
        let remaining = reader.remaining_in_frame().unwrap_or(0);
        if remaining == 0 {
            break;
        }
        let sub_tag = reader.read_u8()?;
        let sub_offset = reader.position();
        log::trace!("dispatching heap dump sub-record tag {:#x}", sub_tag);
        match sub_tag {
            heap_dump::TAG_ROOT_UNKNOWN => {
                handler.on_root_unknown(&heap_dump::read_root_unknown(reader)?)?
            }
            heap_dump::TAG_ROOT_JNI_GLOBAL => {
                handler.on_root_jni_global(&heap_dump::read_root_jni_global(reader)?)?
            }
            heap_dump::TAG_ROOT_JNI_LOCAL => {
                handler.on_root_jni_local(&heap_dump::read_root_jni_local(reader)?)?
            }
            heap_dump::TAG_ROOT_JAVA_FRAME => {
                handler.on_root_java_frame(&heap_dump::read_root_java_frame(reader)?)?
            }
            heap_dump::TAG_ROOT_NATIVE_STACK => {
                handler.on_root_native_stack(&heap_dump::read_root_native_stack(reader)?)?
            }
            heap_dump::TAG_ROOT_STICKY_CLASS => {
                handler.on_root_sticky_class(&heap_dump::read_root_sticky_class(reader)?)?
            }
            heap_dump::TAG_ROOT_THREAD_BLOCK => {
                handler.on_root_thread_block(&heap_dump::read_root_thread_block(reader)?)?
            }
            heap_dump::TAG_ROOT_MONITOR_USED => {
                handler.on_root_monitor_used(&heap_dump::read_root_monitor_used(reader)?)?
            }
            heap_dump::TAG_ROOT_THREAD_OBJECT => {
                handler.on_root_thread_object(&heap_dump::read_root_thread_object(reader)?)?
            }
            heap_dump::TAG_CLASS_DUMP => {
                let class = heap_dump::read_class_dump(reader, sub_tag, sub_offset)?;
                handler.on_class_dump(&class)?;
                class_table.insert(class);
            }
            heap_dump::TAG_INSTANCE_DUMP => {
                let instance = if decode_instance_fields {
                    heap_dump::read_instance_dump(reader, class_table, sub_tag, sub_offset)?
                } else {
                    read_instance_dump_header_only(reader)?
                };
                handler.on_instance_dump(&instance)?;
            }
            heap_dump::TAG_OBJECT_ARRAY_DUMP => {
                handler.on_object_array_dump(&heap_dump::read_object_array_dump(reader)?)?;
            }
            heap_dump::TAG_PRIMITIVE_ARRAY_DUMP => {
                let dump = heap_dump::read_primitive_array_dump(reader, sub_tag, sub_offset)?;
                handler.on_primitive_array_dump(&dump)?;
            }
            other => {
                return Err(Error::FormatError {
                    tag: other,
                    offset: sub_offset,
                    reason: FormatReason::UnknownHeapSubTag(other),
                });
            }
        }
    }
    Ok(())
}

/// Reads only an instance dump's fixed header and discards its field bytes,
/// for `ParserOptions::with_decode_instance_fields(false)`.
fn read_instance_dump_header_only<Bytes, R: HprofRead<Bytes>>(
    reader: &mut R,
) -> Result<InstanceDump, Error> {
    let object_id = reader.read_id()?;
    let stack_trace_serial = reader.read_u32()?.into();
    let class_object_id = reader.read_id()?;
    let data_size = reader.read_u32()?;
    reader.skip(data_size as u64)?;
    Ok(InstanceDump {
        object_id,
        stack_trace_serial,
        class_object_id,
        fields: Vec::new(),
    })
}

/// Parses from any [`std::io::Read`], copying payload bytes (strings, blobs)
/// into owned buffers as it goes. Returns the handler so the caller can
/// inspect whatever state it accumulated.
pub fn parse_reader<R: Read, H: HprofHandler>(
    source: &mut R,
    mut handler: H,
    options: ParserOptions,
) -> Result<H, Error> {
    let header = read_file_header(source)?;
    handler.on_header(&header)?;
    let reader = StreamHprofRead::new(source, header.id_size, options.byte_order);
    let parser = HprofParser {
        reader,
        handler,
        options,
        class_table: ClassTable::new(),
        _bytes: std::marker::PhantomData,
    };
    parser.run()
}

/// Parses from an in-memory byte slice, borrowing string/blob payloads
/// instead of copying them — the cheaper choice for a memory-mapped dump.
pub fn parse_slice<H: HprofHandler>(
    data: &[u8],
    mut handler: H,
    options: ParserOptions,
) -> Result<H, Error> {
    let mut cursor = data;
    let header = read_file_header(&mut cursor)?;
    handler.on_header(&header)?;
    let reader = MemoryHprofRead::new(cursor, header.id_size, options.byte_order);
    let parser = HprofParser {
        reader,
        handler,
        options,
        class_table: ClassTable::new(),
        _bytes: std::marker::PhantomData,
    };
    parser.run()
}

/// Opens `path` and parses it through a buffered reader. For very large
/// dumps, memory-mapping the file and calling [`parse_slice`] avoids the
/// per-string/blob copies this path makes.
pub fn parse_file<P: AsRef<Path>, H: HprofHandler>(
    path: P,
    handler: H,
    options: ParserOptions,
) -> Result<H, Error> {
    let file = File::open(path).map_err(Error::Io)?;
    let mut reader = BufReader::new(file);
    parse_reader(&mut reader, handler, options)
}
