#![forbid(unsafe_code)]

use std::io;

/// Sub-reason for a [`Error::FormatError`].
///
/// Mirrors the sub-reasons a conforming decoder must be able to distinguish:
/// an unrecognized basic type tag, an unrecognized heap-dump sub-tag, a
/// decoder that didn't consume exactly the declared body length, or an
/// instance dump referencing a class that was never dumped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormatReason {
    /// A decoder consumed a different number of bytes than the frame (or
    /// heap-dump container) declared.
    FrameLengthMismatch,
    /// The value decoder saw a basic type tag it doesn't recognize.
    UnknownBasicType(u8),
    /// The heap-dump sub-parser saw a sub-tag it doesn't recognize. Unlike
    /// unknown top-level tags, these are always fatal: sub-records carry no
    /// length prefix, so there is nothing to skip.
    UnknownHeapSubTag(u8),
    /// An instance dump referenced a class object id with no prior class
    /// dump (only possible under the eager instance-decoding strategy).
    MissingClassDump,
    /// The file header's identifier-size field was neither 4 nor 8.
    InvalidIdSize(u32),
    /// A frame declared a body length past the parser's configured cap
    /// (a defensive limit, not a format requirement — see
    /// `ParserOptions::with_max_frame_body_len`).
    FrameTooLarge { declared: u64, limit: u64 },
}

impl std::fmt::Display for FormatReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatReason::FrameLengthMismatch => {
                write!(f, "decoder did not consume exactly the declared length")
            }
            FormatReason::UnknownBasicType(tag) => write!(f, "unknown basic type tag {:#x}", tag),
            FormatReason::UnknownHeapSubTag(tag) => {
                write!(f, "unknown heap dump sub-record tag {:#x}", tag)
            }
            FormatReason::MissingClassDump => {
                write!(f, "instance dump references a class with no prior class dump")
            }
            FormatReason::InvalidIdSize(size) => {
                write!(f, "invalid identifier size in file header: {}", size)
            }
            FormatReason::FrameTooLarge { declared, limit } => write!(
                f,
                "frame declares body length {} exceeding configured limit {}",
                declared, limit
            ),
        }
    }
}

/// Errors produced while decoding an hprof byte stream.
///
/// The parser never recovers from a fatal error — on any variant below it
/// stops and returns to the caller. The one exception is an unrecognized
/// *top-level* tag, which is skipped rather than treated as an error (see
/// the outer dispatcher in [`crate::parser`]).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying reader returned EOF, or fewer bytes than required,
    /// partway through a field. `offset` is the byte offset (relative to
    /// the start of the stream) of the read that failed.
    #[error("truncated stream at offset {offset}")]
    TruncatedStream {
        offset: u64,
    },

    /// A structurally well-formed but semantically invalid record.
    /// `tag` is the top-level record tag (or heap-dump sub-tag) being
    /// decoded when the problem was found, `offset` is the byte offset of
    /// the frame (or sub-record) in question, and `reason` identifies which
    /// of the format invariants was violated.
    #[error("format error in record {tag:#x} at offset {offset}: {reason}")]
    FormatError {
        tag: u8,
        offset: u64,
        reason: FormatReason,
    },

    /// An I/O error from the underlying byte source, passed through
    /// unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A handler callback requested that parsing stop. Not a decoding
    /// failure in its own right, but surfaced distinctly from
    /// [`Error::FormatError`] so callers can tell the two apart.
    #[error("handler requested abort")]
    HandlerAbort,
}

pub type Result<T> = std::result::Result<T, Error>;
