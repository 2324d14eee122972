// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed encode/decode traits over the tagged codec.

use super::{DecodeResult, TarsReader, TarsWriter};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// A value that can be written as one tagged field.
pub trait TarsEncode {
    fn encode_field(&self, w: &mut TarsWriter, tag: u8);

    /// Encode a slice of `Self` as one field. Bytes override this to use a simple list.
    fn encode_slice(items: &[Self], w: &mut TarsWriter, tag: u8)
    where
        Self: Sized,
    {
        w.write_list_header(items.len(), tag);
        for item in items {
            item.encode_field(w, 0);
        }
    }
}

/// A value that can be read back from one tagged field.
///
/// An absent optional field decodes to `Default::default()`.
pub trait TarsDecode: Sized + Default {
    fn decode_field(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Self>;

    /// Decode a sequence of `Self`. Bytes override this to accept a simple list.
    fn decode_vec(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Vec<Self>> {
        let Some(len) = r.read_list_len(tag, require)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(Self::decode_field(r, 0, true)?);
        }
        Ok(out)
    }
}

/// A struct with its own field layout, framed by struct begin/end when nested.
///
/// Implement this and call [`impl_tars_struct!`](crate::impl_tars_struct) to
/// get the field-level traits.
pub trait TarsStruct: Sized + Default {
    fn write_to(&self, w: &mut TarsWriter);
    fn read_from(r: &mut TarsReader<'_>) -> DecodeResult<Self>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut w = TarsWriter::new();
        self.write_to(&mut w);
        w.into_bytes()
    }

    fn from_bytes(buf: &[u8]) -> DecodeResult<Self> {
        Self::read_from(&mut TarsReader::new(buf))
    }
}

/// Derive [`TarsEncode`]/[`TarsDecode`] for types implementing [`TarsStruct`].
#[macro_export]
macro_rules! impl_tars_struct {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::codec::TarsEncode for $ty {
            fn encode_field(&self, w: &mut $crate::codec::TarsWriter, tag: u8) {
                w.write_struct(tag, |w| $crate::codec::TarsStruct::write_to(self, w));
            }
        }

        impl $crate::codec::TarsDecode for $ty {
            fn decode_field(
                r: &mut $crate::codec::TarsReader<'_>,
                tag: u8,
                require: bool,
            ) -> $crate::codec::DecodeResult<Self> {
                if !r.enter_struct(tag, require)? {
                    return Ok(Self::default());
                }
                r.read_nested(<$ty as $crate::codec::TarsStruct>::read_from)
            }
        }
    )+};
}

macro_rules! impl_scalar {
    ($ty:ty, $write:ident, $read:ident) => {
        impl TarsEncode for $ty {
            fn encode_field(&self, w: &mut TarsWriter, tag: u8) {
                w.$write(*self, tag);
            }
        }

        impl TarsDecode for $ty {
            fn decode_field(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Self> {
                Ok(r.$read(tag, require)?.unwrap_or_default())
            }
        }
    };
}

impl_scalar!(bool, write_bool, read_bool);
impl_scalar!(i16, write_i16, read_i16);
impl_scalar!(i32, write_i32, read_i32);
impl_scalar!(i64, write_i64, read_i64);
impl_scalar!(u16, write_u16, read_u16);
impl_scalar!(u32, write_u32, read_u32);
impl_scalar!(f32, write_f32, read_f32);
impl_scalar!(f64, write_f64, read_f64);

impl TarsEncode for u8 {
    fn encode_field(&self, w: &mut TarsWriter, tag: u8) {
        w.write_u8(*self, tag);
    }

    fn encode_slice(items: &[Self], w: &mut TarsWriter, tag: u8) {
        w.write_bytes(items, tag);
    }
}

impl TarsDecode for u8 {
    fn decode_field(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Self> {
        Ok(r.read_u8(tag, require)?.unwrap_or_default())
    }

    fn decode_vec(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Vec<Self>> {
        Ok(r.read_bytes(tag, require)?.unwrap_or_default())
    }
}

impl TarsEncode for i8 {
    fn encode_field(&self, w: &mut TarsWriter, tag: u8) {
        w.write_i8(*self, tag);
    }

    fn encode_slice(items: &[Self], w: &mut TarsWriter, tag: u8) {
        let raw: Vec<u8> = items.iter().map(|b| *b as u8).collect();
        w.write_bytes(&raw, tag);
    }
}

impl TarsDecode for i8 {
    fn decode_field(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Self> {
        Ok(r.read_i8(tag, require)?.unwrap_or_default())
    }

    fn decode_vec(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Vec<Self>> {
        let raw = r.read_bytes(tag, require)?.unwrap_or_default();
        Ok(raw.into_iter().map(|b| b as i8).collect())
    }
}

impl TarsEncode for String {
    fn encode_field(&self, w: &mut TarsWriter, tag: u8) {
        w.write_string(self, tag);
    }
}

impl TarsEncode for str {
    fn encode_field(&self, w: &mut TarsWriter, tag: u8) {
        w.write_string(self, tag);
    }
}

impl TarsDecode for String {
    fn decode_field(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Self> {
        Ok(r.read_string(tag, require)?.unwrap_or_default())
    }
}

impl<T: TarsEncode> TarsEncode for Vec<T> {
    fn encode_field(&self, w: &mut TarsWriter, tag: u8) {
        T::encode_slice(self, w, tag);
    }
}

impl<T: TarsDecode> TarsDecode for Vec<T> {
    fn decode_field(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Self> {
        T::decode_vec(r, tag, require)
    }
}

impl<K: TarsEncode, V: TarsEncode> TarsEncode for BTreeMap<K, V> {
    fn encode_field(&self, w: &mut TarsWriter, tag: u8) {
        w.write_map_header(self.len(), tag);
        for (k, v) in self {
            k.encode_field(w, 0);
            v.encode_field(w, 1);
        }
    }
}

impl<K: TarsDecode + Ord, V: TarsDecode> TarsDecode for BTreeMap<K, V> {
    fn decode_field(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Self> {
        let mut out = BTreeMap::new();
        if let Some(len) = r.read_map_len(tag, require)? {
            for _ in 0..len {
                let k = K::decode_field(r, 0, true)?;
                let v = V::decode_field(r, 1, true)?;
                out.insert(k, v);
            }
        }
        Ok(out)
    }
}

impl<K: TarsEncode, V: TarsEncode, S> TarsEncode for HashMap<K, V, S> {
    fn encode_field(&self, w: &mut TarsWriter, tag: u8) {
        w.write_map_header(self.len(), tag);
        for (k, v) in self {
            k.encode_field(w, 0);
            v.encode_field(w, 1);
        }
    }
}

impl<K, V, S> TarsDecode for HashMap<K, V, S>
where
    K: TarsDecode + Eq + Hash,
    V: TarsDecode,
    S: std::hash::BuildHasher + Default,
{
    fn decode_field(r: &mut TarsReader<'_>, tag: u8, require: bool) -> DecodeResult<Self> {
        let mut out = HashMap::default();
        if let Some(len) = r.read_map_len(tag, require)? {
            for _ in 0..len {
                let k = K::decode_field(r, 0, true)?;
                let v = V::decode_field(r, 1, true)?;
                out.insert(k, v);
            }
        }
        Ok(out)
    }
}
