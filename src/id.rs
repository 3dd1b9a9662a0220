#![forbid(unsafe_code)]

use std::fmt;

/// Ids name objects, classes, utf8 blobs, stack frames and similar entities.
///
/// The on-disk width of an id is either 4 or 8 bytes, chosen once by the
/// file header's [`IdSize`]; regardless of width, an `Id` is always stored
/// widened to 64 bits.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Default)]
pub struct Id(u64);

impl Id {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for Id {
    fn from(id: u64) -> Id {
        Id(id)
    }
}

impl From<u32> for Id {
    fn from(id: u32) -> Id {
        Id(id as u64)
    }
}

impl From<Id> for u64 {
    fn from(id: Id) -> u64 {
        id.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::UpperHex for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

/// An alternate means of identification, used alongside [`Id`] for classes,
/// threads and stack traces. A [`crate::records::LoadClassRecord`], for
/// instance, carries both a `class_obj_id` (an [`Id`]) and a `class_serial`
/// (a `Serial`) — some records only have one or the other available.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Default)]
pub struct Serial(u32);

impl Serial {
    pub fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for Serial {
    fn from(num: u32) -> Self {
        Serial(num)
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Width of [`Id`] fields on the wire, fixed once from the file header and
/// applied to every identifier field thereafter.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IdSize {
    U32,
    U64,
}

impl IdSize {
    pub fn size_in_bytes(self) -> u32 {
        match self {
            IdSize::U32 => 4,
            IdSize::U64 => 8,
        }
    }

    pub fn from_header_value(value: u32) -> Option<IdSize> {
        match value {
            4 => Some(IdSize::U32),
            8 => Some(IdSize::U64),
            _ => None,
        }
    }
}

/// Byte order for multi-byte fields. HPROF is specified as big-endian
/// throughout; `Native` exists only to decode producer quirks seen in the
/// wild and defaults off.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ByteOrder {
    Network,
    Native,
}

impl Default for ByteOrder {
    fn default() -> Self {
        ByteOrder::Network
    }
}
