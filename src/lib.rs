#![forbid(unsafe_code)]

//! A streaming decoder for the HPROF binary heap-profile format (the format
//! the JVM writes with `-XX:+HeapDumpOnOutOfMemoryError` or `jmap
//! -dump:format=b`).
//!
//! The crate does one pass over a byte stream and pushes fully-typed
//! records to a [`HprofHandler`] implementation you provide — there is no
//! intermediate in-memory representation of the whole dump, no random
//! access, and no re-emission of the stream. Implement only the handler
//! methods you care about; everything else defaults to a no-op.
//!
//! ```no_run
//! use hprof_stream::{parse_file, HprofHandler, ParserOptions};
//!
//! #[derive(Default)]
//! struct CountInstances(u64);
//!
//! impl HprofHandler for CountInstances {
//!     fn on_instance_dump(
//!         &mut self,
//!         _instance: &hprof_stream::InstanceDump,
//!     ) -> Result<(), hprof_stream::Error> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), hprof_stream::Error> {
//! let counter = parse_file("heap.hprof", CountInstances::default(), ParserOptions::new())?;
//! println!("{} instances", counter.0);
//! # Ok(())
//! # }
//! ```

mod error;
mod handler;
mod heap_dump;
mod id;
mod parser;
mod reader;
mod records;
mod value;

pub use error::{Error, FormatReason, Result};
pub use handler::{HeapDumpKind, HprofHandler};
pub use heap_dump::{
    ClassDescription, ClassTable, ConstantPoolEntry, InstanceDump, InstanceFieldDescriptor,
    ObjectArrayDump, PrimitiveArrayDump, RootJavaFrame, RootJniGlobal, RootJniLocal,
    RootMonitorUsed, RootNativeStack, RootStickyClass, RootThreadBlock, RootThreadObject,
    RootUnknown, StaticFieldEntry,
};
pub use id::{ByteOrder, Id, IdSize, Serial};
pub use parser::{parse_file, parse_reader, parse_slice, FileHeader, ParserOptions};
pub use reader::{BoundedRead, HprofRead, MemoryHprofRead, StreamHprofRead};
pub use records::{
    AllocSite, AllocSitesRecord, ControlSettingsRecord, CpuSample, CpuSamplesRecord,
    EndThreadRecord, HeapSummaryRecord, LineNum, LoadClassRecord, StackFrameRecord,
    StackTraceRecord, StartThreadRecord,
};
pub use value::{ArrayValue, FieldType, FieldValue};
