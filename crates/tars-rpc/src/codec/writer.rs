// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Encoding half of the wire codec.

use super::{WireType, TAG_SENTINEL};

/// Growable output buffer for tagged fields.
///
/// Encoding is infallible: every write appends to an owned `Vec<u8>`.
#[derive(Debug, Default, Clone)]
pub struct TarsWriter {
    buf: Vec<u8>,
}

impl TarsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Write a head byte, spilling the tag into a second byte when it is 15 or more.
    pub fn write_head(&mut self, ty: WireType, tag: u8) {
        if tag < TAG_SENTINEL {
            self.buf.push((tag << 4) | ty as u8);
        } else {
            self.buf.push((TAG_SENTINEL << 4) | ty as u8);
            self.buf.push(tag);
        }
    }

    // ========================================================================
    // Integers (shrink-to-fit)
    // ========================================================================

    pub fn write_i8(&mut self, value: i8, tag: u8) {
        if value == 0 {
            self.write_head(WireType::ZeroTag, tag);
        } else {
            self.write_head(WireType::Byte, tag);
            self.buf.push(value as u8);
        }
    }

    pub fn write_i16(&mut self, value: i16, tag: u8) {
        if let Ok(narrow) = i8::try_from(value) {
            self.write_i8(narrow, tag);
        } else {
            self.write_head(WireType::Short, tag);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_i32(&mut self, value: i32, tag: u8) {
        if let Ok(narrow) = i16::try_from(value) {
            self.write_i16(narrow, tag);
        } else {
            self.write_head(WireType::Int, tag);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_i64(&mut self, value: i64, tag: u8) {
        if let Ok(narrow) = i32::try_from(value) {
            self.write_i32(narrow, tag);
        } else {
            self.write_head(WireType::Long, tag);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_bool(&mut self, value: bool, tag: u8) {
        self.write_i8(i8::from(value), tag);
    }

    /// Unsigned values travel as the next wider signed type.
    pub fn write_u8(&mut self, value: u8, tag: u8) {
        self.write_i16(i16::from(value), tag);
    }

    pub fn write_u16(&mut self, value: u16, tag: u8) {
        self.write_i32(i32::from(value), tag);
    }

    pub fn write_u32(&mut self, value: u32, tag: u8) {
        self.write_i64(i64::from(value), tag);
    }

    // ========================================================================
    // Floating point
    // ========================================================================

    pub fn write_f32(&mut self, value: f32, tag: u8) {
        if value == 0.0 {
            self.write_head(WireType::ZeroTag, tag);
        } else {
            self.write_head(WireType::Float, tag);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_f64(&mut self, value: f64, tag: u8) {
        if value == 0.0 {
            self.write_head(WireType::ZeroTag, tag);
        } else {
            self.write_head(WireType::Double, tag);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    // ========================================================================
    // Strings and byte arrays
    // ========================================================================

    pub fn write_string(&mut self, value: &str, tag: u8) {
        let bytes = value.as_bytes();
        if let Ok(short) = u8::try_from(bytes.len()) {
            self.write_head(WireType::String1, tag);
            self.buf.push(short);
        } else {
            self.write_head(WireType::String4, tag);
            self.buf
                .extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Byte array as a simple list: no per-element head bytes.
    pub fn write_bytes(&mut self, value: &[u8], tag: u8) {
        self.write_head(WireType::SimpleList, tag);
        self.write_head(WireType::Byte, 0);
        self.write_i32(value.len() as i32, 0);
        self.buf.extend_from_slice(value);
    }

    // ========================================================================
    // Composites
    // ========================================================================

    /// Write a list head and its length; the caller then writes `len` tag-0 elements.
    pub fn write_list_header(&mut self, len: usize, tag: u8) {
        self.write_head(WireType::List, tag);
        self.write_i32(len as i32, 0);
    }

    /// Write a map head and its length; the caller then writes `len` key(0)/value(1) pairs.
    pub fn write_map_header(&mut self, len: usize, tag: u8) {
        self.write_head(WireType::Map, tag);
        self.write_i32(len as i32, 0);
    }

    /// Bracket a nested struct between begin/end markers.
    pub fn write_struct<F>(&mut self, tag: u8, body: F)
    where
        F: FnOnce(&mut TarsWriter),
    {
        self.write_head(WireType::StructBegin, tag);
        body(self);
        self.write_head(WireType::StructEnd, 0);
    }
}
