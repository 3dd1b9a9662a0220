#![forbid(unsafe_code)]

//! The push-based consumer contract.
//!
//! [`HprofHandler`] is a capability set: implement only the methods you
//! care about, everything else no-ops. [`crate::parser::HprofParser`] drives
//! a handler to completion in a single pass over the stream — there is no
//! intermediate `Record` enum a caller iterates over. A method returning
//! `Err` — typically [`Error::HandlerAbort`], though any `Error` propagates
//! the same way — stops the parse immediately and is returned to whoever
//! called the parser.

use crate::error::Error;
use crate::heap_dump::{
    ClassDescription, InstanceDump, ObjectArrayDump, PrimitiveArrayDump, RootJavaFrame,
    RootJniGlobal, RootJniLocal, RootMonitorUsed, RootNativeStack, RootStickyClass,
    RootThreadBlock, RootThreadObject, RootUnknown,
};
use crate::id::{Id, Serial};
use crate::parser::FileHeader;
use crate::records::{
    AllocSitesRecord, ControlSettingsRecord, CpuSamplesRecord, EndThreadRecord,
    HeapSummaryRecord, LoadClassRecord, StackFrameRecord, StackTraceRecord, StartThreadRecord,
};

/// Marks which top-level tag opened the current heap-dump container: a
/// standalone `0x0C` dump, or one `0x1C` segment of a dump split across
/// several (all segments between the first `0x1C` and the closing `0x2C`
/// belong to one logical dump — see `SPEC_FULL.md` §5 ordering).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HeapDumpKind {
    Standalone,
    Segment,
}

#[allow(unused_variables)]
pub trait HprofHandler {
    fn on_header(&mut self, header: &FileHeader) -> Result<(), Error> {
        Ok(())
    }

    fn on_utf8(&mut self, id: Id, text: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn on_load_class(&mut self, record: &LoadClassRecord) -> Result<(), Error> {
        Ok(())
    }

    fn on_unload_class(&mut self, class_serial: Serial) -> Result<(), Error> {
        Ok(())
    }

    fn on_stack_frame(&mut self, record: &StackFrameRecord) -> Result<(), Error> {
        Ok(())
    }

    fn on_stack_trace(&mut self, record: &StackTraceRecord) -> Result<(), Error> {
        Ok(())
    }

    fn on_alloc_sites(&mut self, record: &AllocSitesRecord) -> Result<(), Error> {
        Ok(())
    }

    fn on_heap_summary(&mut self, record: &HeapSummaryRecord) -> Result<(), Error> {
        Ok(())
    }

    fn on_start_thread(&mut self, record: &StartThreadRecord) -> Result<(), Error> {
        Ok(())
    }

    fn on_end_thread(&mut self, record: &EndThreadRecord) -> Result<(), Error> {
        Ok(())
    }

    fn on_cpu_samples(&mut self, record: &CpuSamplesRecord) -> Result<(), Error> {
        Ok(())
    }

    fn on_control_settings(&mut self, record: &ControlSettingsRecord) -> Result<(), Error> {
        Ok(())
    }

    /// Called once before the first sub-record of a heap-dump container.
    fn on_heap_dump_begin(&mut self, kind: HeapDumpKind) -> Result<(), Error> {
        Ok(())
    }

    /// Called on the closing `0x2C` that ends the (possibly segmented) heap
    /// dump opened by a prior [`HprofHandler::on_heap_dump_begin`].
    fn on_heap_dump_end(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn on_root_unknown(&mut self, root: &RootUnknown) -> Result<(), Error> {
        Ok(())
    }

    fn on_root_jni_global(&mut self, root: &RootJniGlobal) -> Result<(), Error> {
        Ok(())
    }

    fn on_root_jni_local(&mut self, root: &RootJniLocal) -> Result<(), Error> {
        Ok(())
    }

    fn on_root_java_frame(&mut self, root: &RootJavaFrame) -> Result<(), Error> {
        Ok(())
    }

    fn on_root_native_stack(&mut self, root: &RootNativeStack) -> Result<(), Error> {
        Ok(())
    }

    fn on_root_sticky_class(&mut self, root: &RootStickyClass) -> Result<(), Error> {
        Ok(())
    }

    fn on_root_thread_block(&mut self, root: &RootThreadBlock) -> Result<(), Error> {
        Ok(())
    }

    fn on_root_monitor_used(&mut self, root: &RootMonitorUsed) -> Result<(), Error> {
        Ok(())
    }

    fn on_root_thread_object(&mut self, root: &RootThreadObject) -> Result<(), Error> {
        Ok(())
    }

    fn on_class_dump(&mut self, class: &ClassDescription) -> Result<(), Error> {
        Ok(())
    }

    fn on_instance_dump(&mut self, instance: &InstanceDump) -> Result<(), Error> {
        Ok(())
    }

    fn on_object_array_dump(&mut self, dump: &ObjectArrayDump) -> Result<(), Error> {
        Ok(())
    }

    fn on_primitive_array_dump(&mut self, dump: &PrimitiveArrayDump) -> Result<(), Error> {
        Ok(())
    }
}
