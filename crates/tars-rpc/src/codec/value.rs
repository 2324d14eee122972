// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema-less decoding of a wire stream into a value tree.

use super::{DecodeError, DecodeResult, TarsReader, WireType, MAX_NESTING_DEPTH};
use std::fmt::{self, Write as _};

/// One decoded field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub tag: u8,
    pub value: Value,
}

/// A wire value decoded without knowing its schema.
///
/// All integer encodings collapse into [`Value::Int`] because shrink-to-fit
/// erases the declared width.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// String payload that is not valid UTF-8.
    RawString(Vec<u8>),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Struct(Vec<Field>),
}

impl Value {
    /// Decode every top-level field in `buf`.
    pub fn decode_fields(buf: &[u8]) -> DecodeResult<Vec<Field>> {
        let mut r = TarsReader::new(buf);
        let mut fields = Vec::new();
        while !r.is_empty() {
            let (ty, tag) = r.read_head()?;
            if ty == WireType::StructEnd {
                break;
            }
            fields.push(Field {
                tag,
                value: read_value(&mut r, ty, 0)?,
            });
        }
        Ok(fields)
    }

    /// Render as an indented, tag-annotated tree.
    pub fn render_fields(fields: &[Field]) -> String {
        let mut out = String::new();
        for field in fields {
            render_field(&mut out, field, 0);
        }
        out
    }
}

fn read_value(r: &mut TarsReader<'_>, ty: WireType, depth: u32) -> DecodeResult<Value> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(DecodeError::TooDeep(MAX_NESTING_DEPTH));
    }
    Ok(match ty {
        WireType::ZeroTag => Value::Int(0),
        WireType::Byte | WireType::Short | WireType::Int | WireType::Long => {
            Value::Int(r.read_int_payload(ty, 0, WireType::Long, "int")?)
        }
        WireType::Float => Value::Float(r.raw_f32()?),
        WireType::Double => Value::Double(r.raw_f64()?),
        WireType::String1 | WireType::String4 => {
            let raw = r.read_string_payload(ty, 0)?;
            match std::str::from_utf8(raw) {
                Ok(s) => Value::String(s.to_owned()),
                Err(_) => Value::RawString(raw.to_vec()),
            }
        }
        WireType::SimpleList => Value::Bytes(r.read_simple_list_payload(0)?.to_vec()),
        WireType::List => {
            let len = read_len(r)?;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                let (ty, _) = r.read_head()?;
                items.push(read_value(r, ty, depth + 1)?);
            }
            Value::List(items)
        }
        WireType::Map => {
            let len = read_len(r)?;
            let mut pairs = Vec::with_capacity(len);
            for _ in 0..len {
                let (kt, _) = r.read_head()?;
                let k = read_value(r, kt, depth + 1)?;
                let (vt, _) = r.read_head()?;
                let v = read_value(r, vt, depth + 1)?;
                pairs.push((k, v));
            }
            Value::Map(pairs)
        }
        WireType::StructBegin => {
            let mut fields = Vec::new();
            loop {
                let (ty, tag) = r.read_head()?;
                if ty == WireType::StructEnd {
                    break;
                }
                fields.push(Field {
                    tag,
                    value: read_value(r, ty, depth + 1)?,
                });
            }
            Value::Struct(fields)
        }
        WireType::StructEnd => Value::Struct(Vec::new()),
    })
}

fn read_len(r: &mut TarsReader<'_>) -> DecodeResult<usize> {
    let len = r.read_i32(0, true)?.unwrap_or(0);
    if len < 0 || len as usize > r.remaining() {
        return Err(DecodeError::InvalidLength {
            tag: 0,
            length: i64::from(len),
        });
    }
    Ok(len as usize)
}

fn render_field(out: &mut String, field: &Field, indent: usize) {
    let _ = write!(out, "{:width$}[{}] ", "", field.tag, width = indent * 2);
    render_value(out, &field.value, indent);
}

fn render_value(out: &mut String, value: &Value, indent: usize) {
    let pad = (indent + 1) * 2;
    match value {
        Value::List(items) => {
            let _ = writeln!(out, "list({})", items.len());
            for item in items {
                let _ = write!(out, "{:pad$}- ", "");
                render_value(out, item, indent + 1);
            }
        }
        Value::Map(pairs) => {
            let _ = writeln!(out, "map({})", pairs.len());
            for (k, v) in pairs {
                let _ = write!(out, "{:pad$}{} => ", "", k);
                render_value(out, v, indent + 1);
            }
        }
        Value::Struct(fields) => {
            let _ = writeln!(out, "struct");
            for field in fields {
                render_field(out, field, indent + 1);
            }
        }
        scalar => {
            let _ = writeln!(out, "{}", scalar);
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::RawString(b) | Value::Bytes(b) => {
                write!(f, "bytes({})", b.len())?;
                if !b.is_empty() {
                    f.write_str(" ")?;
                    for byte in b.iter().take(32) {
                        write!(f, "{:02x}", byte)?;
                    }
                    if b.len() > 32 {
                        f.write_str("..")?;
                    }
                }
                Ok(())
            }
            Value::List(items) => write!(f, "list({})", items.len()),
            Value::Map(pairs) => write!(f, "map({})", pairs.len()),
            Value::Struct(fields) => write!(f, "struct({})", fields.len()),
        }
    }
}
