// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tag/type/value wire codec.
//!
//! Every field on the wire starts with a head byte `(tag << 4) | type`.
//! Tags of 15 and above put the sentinel 15 in the head byte and the real tag
//! in the byte that follows. The payload layout depends on the [`WireType`].
//!
//! Decoding is tag-directed: readers ask for a tag, and every lower-tagged
//! field in between is skipped wholesale (nested structs included). That is
//! what lets an old reader consume a struct written by a newer peer.
//!
//! # Example
//!
//! ```
//! use tars_rpc::codec::{TarsReader, TarsWriter};
//!
//! let mut w = TarsWriter::new();
//! w.write_i32(7, 1);
//! w.write_string("hello", 3);
//!
//! let bytes = w.into_bytes();
//! let mut r = TarsReader::new(&bytes);
//! assert_eq!(r.read_string(3, true).unwrap(), Some("hello".to_string()));
//! ```

mod reader;
mod traits;
mod value;
mod writer;

pub use reader::TarsReader;
pub use traits::{TarsDecode, TarsEncode, TarsStruct};
pub use value::{Field, Value};
pub use writer::TarsWriter;

use std::fmt;

/// Wire type codes carried in the low nibble of the head byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Byte = 0,
    Short = 1,
    Int = 2,
    Long = 3,
    Float = 4,
    Double = 5,
    String1 = 6,
    String4 = 7,
    Map = 8,
    List = 9,
    StructBegin = 10,
    StructEnd = 11,
    ZeroTag = 12,
    SimpleList = 13,
}

impl TryFrom<u8> for WireType {
    type Error = DecodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => WireType::Byte,
            1 => WireType::Short,
            2 => WireType::Int,
            3 => WireType::Long,
            4 => WireType::Float,
            5 => WireType::Double,
            6 => WireType::String1,
            7 => WireType::String4,
            8 => WireType::Map,
            9 => WireType::List,
            10 => WireType::StructBegin,
            11 => WireType::StructEnd,
            12 => WireType::ZeroTag,
            13 => WireType::SimpleList,
            other => return Err(DecodeError::InvalidType(other)),
        })
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Byte => "byte",
            WireType::Short => "short",
            WireType::Int => "int",
            WireType::Long => "long",
            WireType::Float => "float",
            WireType::Double => "double",
            WireType::String1 => "string1",
            WireType::String4 => "string4",
            WireType::Map => "map",
            WireType::List => "list",
            WireType::StructBegin => "struct_begin",
            WireType::StructEnd => "struct_end",
            WireType::ZeroTag => "zero",
            WireType::SimpleList => "simple_list",
        };
        f.write_str(name)
    }
}

/// Head byte tag value meaning "the real tag is in the next byte".
pub const TAG_SENTINEL: u8 = 15;

/// Nesting bound for skipping and dynamic decoding.
pub const MAX_NESTING_DEPTH: u32 = 64;

/// Errors raised while decoding a wire stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("tag {tag}: expected {expected}, found {found}")]
    TypeMismatch {
        tag: u8,
        expected: &'static str,
        found: WireType,
    },

    #[error("required tag {0} not found")]
    MissingTag(u8),

    #[error("unexpected end of buffer at offset {offset} (need {needed} bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("invalid wire type code {0}")]
    InvalidType(u8),

    #[error("invalid length {length} at tag {tag}")]
    InvalidLength { tag: u8, length: i64 },

    #[error("tag {0}: simple list can only decode into a byte sequence")]
    SimpleListElement(u8),

    #[error("tag {0}: string is not valid utf-8")]
    InvalidUtf8(u8),

    #[error("tag {tag}: value {value} out of range for {target}")]
    OutOfRange {
        tag: u8,
        value: i64,
        target: &'static str,
    },

    #[error("nesting deeper than {0} levels")]
    TooDeep(u32),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

#[cfg(test)]
mod tests;
