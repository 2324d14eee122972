// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoding half of the wire codec.

use super::{DecodeError, DecodeResult, WireType, MAX_NESTING_DEPTH, TAG_SENTINEL};

/// Generate big-endian raw reads (no head byte, bounds-checked).
macro_rules! impl_read_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub(crate) fn $name(&mut self) -> DecodeResult<$type> {
            let raw = self.take($size)?;
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(raw);
            Ok(<$type>::from_be_bytes(bytes))
        }
    };
}

/// Tag-directed reader over a borrowed byte slice.
///
/// Every `read_*` method takes the wanted tag and a `require` flag. An absent
/// optional field yields `Ok(None)` and leaves the cursor where it was, so
/// the next higher tag can still be read.
#[derive(Debug, Clone)]
pub struct TarsReader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: u32,
}

impl<'a> TarsReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: n,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    impl_read_be!(raw_i8, i8, 1);
    impl_read_be!(raw_i16, i16, 2);
    impl_read_be!(raw_i32, i32, 4);
    impl_read_be!(raw_i64, i64, 8);
    impl_read_be!(raw_u8, u8, 1);
    impl_read_be!(raw_u32, u32, 4);
    impl_read_be!(raw_f32, f32, 4);
    impl_read_be!(raw_f64, f64, 8);

    // ========================================================================
    // Head bytes and skipping
    // ========================================================================

    /// Decode the next head without consuming it. Returns type, tag and head length.
    pub fn peek_head(&self) -> DecodeResult<(WireType, u8, usize)> {
        let first = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof {
            offset: self.pos,
            needed: 1,
        })?;
        let ty = WireType::try_from(first & 0x0F)?;
        let tag = first >> 4;
        if tag < TAG_SENTINEL {
            return Ok((ty, tag, 1));
        }
        let real = *self
            .buf
            .get(self.pos + 1)
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.pos + 1,
                needed: 1,
            })?;
        Ok((ty, real, 2))
    }

    pub fn read_head(&mut self) -> DecodeResult<(WireType, u8)> {
        let (ty, tag, len) = self.peek_head()?;
        self.pos += len;
        Ok((ty, tag))
    }

    /// Advance to the field carrying `tag`, skipping every lower tag.
    ///
    /// Stops without consuming anything when it meets a higher tag, a struct
    /// terminator or the end of the buffer. In that case a required field is
    /// an error and an optional one yields `Ok(None)`. On success the head is
    /// consumed and the field's wire type is returned.
    pub fn skip_to(&mut self, tag: u8, require: bool) -> DecodeResult<Option<WireType>> {
        loop {
            if self.is_empty() {
                break;
            }
            let (ty, cur, head_len) = self.peek_head()?;
            if ty == WireType::StructEnd || cur > tag {
                break;
            }
            self.pos += head_len;
            if cur == tag {
                return Ok(Some(ty));
            }
            self.skip_field(ty)?;
        }
        if require {
            Err(DecodeError::MissingTag(tag))
        } else {
            Ok(None)
        }
    }

    /// Skip the payload of a field whose head was already consumed.
    pub fn skip_field(&mut self, ty: WireType) -> DecodeResult<()> {
        match ty {
            WireType::Byte => self.skip(1),
            WireType::Short => self.skip(2),
            WireType::Int | WireType::Float => self.skip(4),
            WireType::Long | WireType::Double => self.skip(8),
            WireType::String1 => {
                let len = self.raw_u8()? as usize;
                self.skip(len)
            }
            WireType::String4 => {
                let len = self.raw_u32()? as usize;
                self.skip(len)
            }
            WireType::Map => {
                let len = self.read_length(0)?;
                self.nested(|r| {
                    for _ in 0..len * 2 {
                        r.skip_any_field()?;
                    }
                    Ok(())
                })
            }
            WireType::List => {
                let len = self.read_length(0)?;
                self.nested(|r| {
                    for _ in 0..len {
                        r.skip_any_field()?;
                    }
                    Ok(())
                })
            }
            WireType::SimpleList => {
                let (elem, _) = self.read_head()?;
                if elem != WireType::Byte {
                    return Err(DecodeError::TypeMismatch {
                        tag: 0,
                        expected: "byte",
                        found: elem,
                    });
                }
                let len = self.read_length(0)?;
                self.skip(len)
            }
            WireType::StructBegin => self.nested(|r| r.skip_to_struct_end()),
            WireType::StructEnd | WireType::ZeroTag => Ok(()),
        }
    }

    /// Skip one complete field, head included.
    pub fn skip_any_field(&mut self) -> DecodeResult<()> {
        let (ty, _) = self.read_head()?;
        self.skip_field(ty)
    }

    /// Consume fields up to and including the terminator of the current struct.
    pub fn skip_to_struct_end(&mut self) -> DecodeResult<()> {
        loop {
            let (ty, _) = self.read_head()?;
            if ty == WireType::StructEnd {
                return Ok(());
            }
            self.skip_field(ty)?;
        }
    }

    fn skip(&mut self, n: usize) -> DecodeResult<()> {
        self.take(n).map(|_| ())
    }

    fn nested<T, F>(&mut self, f: F) -> DecodeResult<T>
    where
        F: FnOnce(&mut Self) -> DecodeResult<T>,
    {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(DecodeError::TooDeep(MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    /// Read a required int32 length at `tag` and sanity-check it.
    fn read_length(&mut self, tag: u8) -> DecodeResult<usize> {
        let len = self.read_i32(tag, true)?.unwrap_or(0);
        // every element occupies at least one byte
        if len < 0 || len as usize > self.remaining() {
            return Err(DecodeError::InvalidLength {
                tag,
                length: i64::from(len),
            });
        }
        Ok(len as usize)
    }

    // ========================================================================
    // Scalars
    // ========================================================================

    /// Read an integer payload encoded no wider than `widest`.
    pub(crate) fn read_int_payload(
        &mut self,
        ty: WireType,
        tag: u8,
        widest: WireType,
        expected: &'static str,
    ) -> DecodeResult<i64> {
        let fits = (ty as u8) <= (widest as u8);
        match ty {
            WireType::ZeroTag => Ok(0),
            WireType::Byte => Ok(i64::from(self.raw_i8()?)),
            WireType::Short if fits => Ok(i64::from(self.raw_i16()?)),
            WireType::Int if fits => Ok(i64::from(self.raw_i32()?)),
            WireType::Long if fits => self.raw_i64(),
            found => Err(DecodeError::TypeMismatch {
                tag,
                expected,
                found,
            }),
        }
    }

    pub fn read_i8(&mut self, tag: u8, require: bool) -> DecodeResult<Option<i8>> {
        match self.skip_to(tag, require)? {
            Some(ty) => Ok(Some(
                self.read_int_payload(ty, tag, WireType::Byte, "int8")? as i8,
            )),
            None => Ok(None),
        }
    }

    pub fn read_i16(&mut self, tag: u8, require: bool) -> DecodeResult<Option<i16>> {
        match self.skip_to(tag, require)? {
            Some(ty) => Ok(Some(
                self.read_int_payload(ty, tag, WireType::Short, "int16")? as i16,
            )),
            None => Ok(None),
        }
    }

    pub fn read_i32(&mut self, tag: u8, require: bool) -> DecodeResult<Option<i32>> {
        match self.skip_to(tag, require)? {
            Some(ty) => Ok(Some(
                self.read_int_payload(ty, tag, WireType::Int, "int32")? as i32,
            )),
            None => Ok(None),
        }
    }

    pub fn read_i64(&mut self, tag: u8, require: bool) -> DecodeResult<Option<i64>> {
        match self.skip_to(tag, require)? {
            Some(ty) => Ok(Some(self.read_int_payload(
                ty,
                tag,
                WireType::Long,
                "int64",
            )?)),
            None => Ok(None),
        }
    }

    pub fn read_bool(&mut self, tag: u8, require: bool) -> DecodeResult<Option<bool>> {
        Ok(self.read_i8(tag, require)?.map(|v| v != 0))
    }

    pub fn read_u8(&mut self, tag: u8, require: bool) -> DecodeResult<Option<u8>> {
        self.read_i16(tag, require)?
            .map(|v| unsigned(tag, i64::from(v), "uint8"))
            .transpose()
    }

    pub fn read_u16(&mut self, tag: u8, require: bool) -> DecodeResult<Option<u16>> {
        self.read_i32(tag, require)?
            .map(|v| unsigned(tag, i64::from(v), "uint16"))
            .transpose()
    }

    pub fn read_u32(&mut self, tag: u8, require: bool) -> DecodeResult<Option<u32>> {
        self.read_i64(tag, require)?
            .map(|v| unsigned(tag, v, "uint32"))
            .transpose()
    }

    pub fn read_f32(&mut self, tag: u8, require: bool) -> DecodeResult<Option<f32>> {
        match self.skip_to(tag, require)? {
            Some(WireType::ZeroTag) => Ok(Some(0.0)),
            Some(WireType::Float) => Ok(Some(self.raw_f32()?)),
            Some(found) => Err(DecodeError::TypeMismatch {
                tag,
                expected: "float",
                found,
            }),
            None => Ok(None),
        }
    }

    pub fn read_f64(&mut self, tag: u8, require: bool) -> DecodeResult<Option<f64>> {
        match self.skip_to(tag, require)? {
            Some(WireType::ZeroTag) => Ok(Some(0.0)),
            Some(WireType::Float) => Ok(Some(f64::from(self.raw_f32()?))),
            Some(WireType::Double) => Ok(Some(self.raw_f64()?)),
            Some(found) => Err(DecodeError::TypeMismatch {
                tag,
                expected: "double",
                found,
            }),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Strings and byte arrays
    // ========================================================================

    /// Raw string payload after a String1/String4 head.
    pub(crate) fn read_string_payload(&mut self, ty: WireType, tag: u8) -> DecodeResult<&'a [u8]> {
        let len = match ty {
            WireType::String1 => self.raw_u8()? as usize,
            WireType::String4 => self.raw_u32()? as usize,
            found => {
                return Err(DecodeError::TypeMismatch {
                    tag,
                    expected: "string",
                    found,
                })
            }
        };
        self.take(len)
    }

    pub fn read_string(&mut self, tag: u8, require: bool) -> DecodeResult<Option<String>> {
        match self.skip_to(tag, require)? {
            Some(ty) => {
                let raw = self.read_string_payload(ty, tag)?;
                let s = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8(tag))?;
                Ok(Some(s.to_owned()))
            }
            None => Ok(None),
        }
    }

    /// Raw bytes after a SimpleList head.
    pub(crate) fn read_simple_list_payload(&mut self, tag: u8) -> DecodeResult<&'a [u8]> {
        let (elem, _) = self.read_head()?;
        if elem != WireType::Byte {
            return Err(DecodeError::TypeMismatch {
                tag,
                expected: "byte",
                found: elem,
            });
        }
        let len = self.read_length(0)?;
        self.take(len)
    }

    /// Read a byte array written either as a simple list or as a list of bytes.
    pub fn read_bytes(&mut self, tag: u8, require: bool) -> DecodeResult<Option<Vec<u8>>> {
        match self.skip_to(tag, require)? {
            Some(WireType::SimpleList) => Ok(Some(self.read_simple_list_payload(tag)?.to_vec())),
            Some(WireType::List) => {
                let len = self.read_length(0)?;
                let mut out = Vec::with_capacity(len);
                for _ in 0..len {
                    out.push(self.read_i8(0, true)?.unwrap_or(0) as u8);
                }
                Ok(Some(out))
            }
            Some(found) => Err(DecodeError::TypeMismatch {
                tag,
                expected: "bytes",
                found,
            }),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Composites
    // ========================================================================

    /// Position on a list at `tag` and return its element count.
    ///
    /// A simple list is refused: it only ever carries bytes.
    pub fn read_list_len(&mut self, tag: u8, require: bool) -> DecodeResult<Option<usize>> {
        match self.skip_to(tag, require)? {
            Some(WireType::List) => Ok(Some(self.read_length(0)?)),
            Some(WireType::SimpleList) => Err(DecodeError::SimpleListElement(tag)),
            Some(found) => Err(DecodeError::TypeMismatch {
                tag,
                expected: "list",
                found,
            }),
            None => Ok(None),
        }
    }

    /// Position on a map at `tag` and return its pair count.
    pub fn read_map_len(&mut self, tag: u8, require: bool) -> DecodeResult<Option<usize>> {
        match self.skip_to(tag, require)? {
            Some(WireType::Map) => Ok(Some(self.read_length(0)?)),
            Some(found) => Err(DecodeError::TypeMismatch {
                tag,
                expected: "map",
                found,
            }),
            None => Ok(None),
        }
    }

    /// Position inside a nested struct at `tag`. Returns false when absent.
    pub fn enter_struct(&mut self, tag: u8, require: bool) -> DecodeResult<bool> {
        match self.skip_to(tag, require)? {
            Some(WireType::StructBegin) => Ok(true),
            Some(found) => Err(DecodeError::TypeMismatch {
                tag,
                expected: "struct",
                found,
            }),
            None => Ok(false),
        }
    }

    /// Decode a nested struct body, then skip whatever fields this reader does not know.
    pub fn read_nested<T, F>(&mut self, body: F) -> DecodeResult<T>
    where
        F: FnOnce(&mut Self) -> DecodeResult<T>,
    {
        self.nested(|r| {
            let value = body(r)?;
            r.skip_to_struct_end()?;
            Ok(value)
        })
    }
}

/// Narrow a widened wire integer into an unsigned field, rejecting overflow.
fn unsigned<T: TryFrom<i64>>(tag: u8, value: i64, target: &'static str) -> DecodeResult<T> {
    T::try_from(value).map_err(|_| DecodeError::OutOfRange { tag, value, target })
}
