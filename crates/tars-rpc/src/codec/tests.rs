// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use std::collections::BTreeMap;

fn head_type(bytes: &[u8]) -> WireType {
    WireType::try_from(bytes[0] & 0x0F).unwrap()
}

fn encoded<T: TarsEncode>(value: &T, tag: u8) -> Vec<u8> {
    let mut w = TarsWriter::new();
    value.encode_field(&mut w, tag);
    w.into_bytes()
}

fn decoded<T: TarsDecode>(bytes: &[u8], tag: u8) -> T {
    T::decode_field(&mut TarsReader::new(bytes), tag, true).unwrap()
}

#[test]
fn test_integer_boundaries_roundtrip() {
    for v in [0i8, 1, -1, i8::MIN, i8::MAX] {
        assert_eq!(decoded::<i8>(&encoded(&(v as i16), 0), 0), v);
    }
    for v in [0i16, i16::MIN, i16::MAX, 128, -129] {
        assert_eq!(decoded::<i16>(&encoded(&v, 1), 1), v);
    }
    for v in [0i32, i32::MIN, i32::MAX, 32768, -32769] {
        assert_eq!(decoded::<i32>(&encoded(&v, 2), 2), v);
    }
    for v in [0i64, i64::MIN, i64::MAX, 1 << 31, -(1 << 31) - 1] {
        assert_eq!(decoded::<i64>(&encoded(&v, 3), 3), v);
    }
    for v in [0u8, u8::MAX] {
        assert_eq!(decoded::<u8>(&encoded(&v, 4), 4), v);
    }
    for v in [0u16, u16::MAX] {
        assert_eq!(decoded::<u16>(&encoded(&v, 5), 5), v);
    }
    for v in [0u32, u32::MAX] {
        assert_eq!(decoded::<u32>(&encoded(&v, 6), 6), v);
    }
}

#[test]
fn test_shrink_to_fit() {
    assert_eq!(encoded(&0i64, 0), vec![WireType::ZeroTag as u8]);
    assert_eq!(head_type(&encoded(&100i64, 0)), WireType::Byte);
    assert_eq!(head_type(&encoded(&-128i32, 0)), WireType::Byte);
    assert_eq!(head_type(&encoded(&300i64, 0)), WireType::Short);
    assert_eq!(head_type(&encoded(&70_000i64, 0)), WireType::Int);
    assert_eq!(head_type(&encoded(&(1i64 << 40), 0)), WireType::Long);
    // unsigned widening still shrinks
    assert_eq!(head_type(&encoded(&200u8, 0)), WireType::Short);
    assert_eq!(head_type(&encoded(&7u32, 0)), WireType::Byte);
    assert_eq!(encoded(&100i64, 1), vec![0x10, 100]);
}

#[test]
fn test_floats() {
    assert_eq!(encoded(&0.0f32, 0), vec![WireType::ZeroTag as u8]);
    assert_eq!(decoded::<f32>(&encoded(&1.5f32, 2), 2), 1.5);
    assert_eq!(decoded::<f64>(&encoded(&-2.25f64, 2), 2), -2.25);
    // a float field widens into a double
    assert_eq!(decoded::<f64>(&encoded(&0.5f32, 2), 2), 0.5);
    assert!(decoded::<bool>(&encoded(&true, 0), 0));
}

#[test]
fn test_strings_pick_length_prefix() {
    let empty = String::new();
    let bytes = encoded(&empty, 1);
    assert_eq!(bytes, vec![0x10 | WireType::String1 as u8, 0]);
    assert_eq!(decoded::<String>(&bytes, 1), "");

    let s255 = "x".repeat(255);
    let bytes = encoded(&s255, 1);
    assert_eq!(head_type(&bytes), WireType::String1);
    assert_eq!(decoded::<String>(&bytes, 1), s255);

    let s300 = "y".repeat(300);
    let bytes = encoded(&s300, 1);
    assert_eq!(head_type(&bytes), WireType::String4);
    assert_eq!(&bytes[1..5], &300u32.to_be_bytes());
    assert_eq!(decoded::<String>(&bytes, 1), s300);
}

#[test]
fn test_large_tag_uses_second_byte() {
    let bytes = encoded(&5i32, 200);
    assert_eq!(bytes, vec![0xF0 | WireType::Byte as u8, 200, 5]);
    assert_eq!(decoded::<i32>(&bytes, 200), 5);

    let bytes = encoded(&5i32, 14);
    assert_eq!(bytes[0] >> 4, 14);
    assert_eq!(bytes.len(), 2);
}

#[test]
fn test_skip_to_positions_on_next_tag() {
    let mut w = TarsWriter::new();
    w.write_i32(11, 1);
    w.write_string("three", 3);
    w.write_i64(55, 5);
    let bytes = w.into_bytes();

    let mut r = TarsReader::new(&bytes);
    assert_eq!(r.skip_to(3, true).unwrap(), Some(WireType::String1));
    r.skip_field(WireType::String1).unwrap();
    assert_eq!(r.peek_head().unwrap().1, 5);
    assert_eq!(r.read_i64(5, true).unwrap(), Some(55));

    let mut r = TarsReader::new(&bytes);
    assert_eq!(r.skip_to(4, true), Err(DecodeError::MissingTag(4)));

    // optional miss leaves the cursor on the higher tag
    let mut r = TarsReader::new(&bytes);
    assert_eq!(r.read_i32(2, false).unwrap(), None);
    assert_eq!(r.read_string(3, true).unwrap(), Some("three".into()));
}

#[test]
fn test_type_mismatch_is_error() {
    let bytes = encoded(&(1i64 << 40), 1);
    let err = TarsReader::new(&bytes).read_i32(1, true).unwrap_err();
    assert_eq!(
        err,
        DecodeError::TypeMismatch {
            tag: 1,
            expected: "int32",
            found: WireType::Long,
        }
    );

    let bytes = encoded(&"text".to_string(), 1);
    assert!(matches!(
        TarsReader::new(&bytes).read_i64(1, true),
        Err(DecodeError::TypeMismatch { .. })
    ));
}

#[test]
fn test_truncated_payload() {
    let mut bytes = encoded(&"hello".to_string(), 0);
    bytes.truncate(4);
    assert!(matches!(
        TarsReader::new(&bytes).read_string(0, true),
        Err(DecodeError::UnexpectedEof { .. })
    ));
}

#[test]
fn test_simple_list_bytes() {
    let payload: Vec<u8> = (0..=255).collect();
    let bytes = encoded(&payload, 7);
    assert_eq!(head_type(&bytes), WireType::SimpleList);
    assert_eq!(decoded::<Vec<u8>>(&bytes, 7), payload);

    // simple list refused for a wider element type
    let err = Vec::<i32>::decode_field(&mut TarsReader::new(&bytes), 7, true).unwrap_err();
    assert_eq!(err, DecodeError::SimpleListElement(7));
}

#[test]
fn test_byte_list_accepts_plain_list() {
    let mut w = TarsWriter::new();
    w.write_list_header(3, 0);
    for b in [1i8, 2, 3] {
        w.write_i8(b, 0);
    }
    let bytes = w.into_bytes();
    assert_eq!(decoded::<Vec<u8>>(&bytes, 0), vec![1, 2, 3]);
}

#[test]
fn test_list_and_map() {
    let list = vec![1i32, 300, -70_000, 0];
    assert_eq!(decoded::<Vec<i32>>(&encoded(&list, 2), 2), list);

    let mut map = BTreeMap::new();
    map.insert("a".to_string(), "1".to_string());
    map.insert("b".to_string(), String::new());
    let bytes = encoded(&map, 9);
    assert_eq!(head_type(&bytes), WireType::Map);
    assert_eq!(decoded::<BTreeMap<String, String>>(&bytes, 9), map);

    let nested = vec![vec!["x".to_string()], vec![]];
    assert_eq!(decoded::<Vec<Vec<String>>>(&encoded(&nested, 0), 0), nested);
}

#[derive(Debug, Default, Clone, PartialEq)]
struct PointV1 {
    x: i32,
    y: i32,
}

impl TarsStruct for PointV1 {
    fn write_to(&self, w: &mut TarsWriter) {
        w.write_i32(self.x, 0);
        w.write_i32(self.y, 1);
    }

    fn read_from(r: &mut TarsReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            x: i32::decode_field(r, 0, true)?,
            y: i32::decode_field(r, 1, true)?,
        })
    }
}

#[derive(Debug, Default, PartialEq)]
struct PointV2 {
    x: i32,
    y: i32,
    label: String,
    tags: Vec<PointV1>,
}

impl TarsStruct for PointV2 {
    fn write_to(&self, w: &mut TarsWriter) {
        w.write_i32(self.x, 0);
        w.write_i32(self.y, 1);
        self.label.encode_field(w, 2);
        self.tags.encode_field(w, 3);
    }

    fn read_from(r: &mut TarsReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            x: i32::decode_field(r, 0, true)?,
            y: i32::decode_field(r, 1, true)?,
            label: String::decode_field(r, 2, false)?,
            tags: Vec::decode_field(r, 3, false)?,
        })
    }
}

crate::impl_tars_struct!(PointV1, PointV2);

#[test]
fn test_struct_forward_compatibility() {
    let newer = PointV2 {
        x: 3,
        y: -4,
        label: "origin".into(),
        tags: vec![PointV1 { x: 1, y: 2 }],
    };
    let mut w = TarsWriter::new();
    newer.encode_field(&mut w, 1);
    w.write_string("after", 2);
    let bytes = w.into_bytes();

    // an older reader sees only the fields it knows, then keeps going
    let mut r = TarsReader::new(&bytes);
    let older = PointV1::decode_field(&mut r, 1, true).unwrap();
    assert_eq!(older, PointV1 { x: 3, y: -4 });
    assert_eq!(r.read_string(2, true).unwrap(), Some("after".into()));

    let mut r = TarsReader::new(&bytes);
    assert_eq!(PointV2::decode_field(&mut r, 1, true).unwrap(), newer);
}

#[test]
fn test_optional_struct_absent() {
    let bytes = encoded(&7i32, 5);
    let mut r = TarsReader::new(&bytes);
    assert_eq!(PointV1::decode_field(&mut r, 2, false).unwrap(), PointV1::default());
    assert_eq!(r.read_i32(5, true).unwrap(), Some(7));
}

#[test]
fn test_skip_over_struct_and_collections() {
    let mut w = TarsWriter::new();
    PointV2 {
        x: 1,
        y: 2,
        label: "l".into(),
        tags: vec![PointV1::default(); 2],
    }
    .encode_field(&mut w, 0);
    vec![1u8, 2, 3].encode_field(&mut w, 1);
    let mut m = BTreeMap::new();
    m.insert(1i32, vec!["a".to_string()]);
    m.encode_field(&mut w, 2);
    w.write_f64(9.5, 3);
    let bytes = w.into_bytes();

    let mut r = TarsReader::new(&bytes);
    assert_eq!(r.read_f64(3, true).unwrap(), Some(9.5));
    assert!(r.is_empty());
}

#[test]
fn test_invalid_type_code() {
    let bytes = [0x0E, 0x00];
    assert_eq!(
        TarsReader::new(&bytes).read_head(),
        Err(DecodeError::InvalidType(14))
    );
}

#[test]
fn test_negative_length_rejected() {
    let mut w = TarsWriter::new();
    w.write_head(WireType::List, 0);
    w.write_i32(-1, 0);
    let bytes = w.into_bytes();
    assert!(matches!(
        Vec::<i32>::decode_field(&mut TarsReader::new(&bytes), 0, true),
        Err(DecodeError::InvalidLength { .. })
    ));
}

#[test]
fn test_deep_nesting_bounded() {
    let mut bytes = Vec::new();
    for _ in 0..200 {
        bytes.push(WireType::StructBegin as u8);
    }
    let mut r = TarsReader::new(&bytes);
    assert_eq!(
        r.skip_any_field(),
        Err(DecodeError::TooDeep(MAX_NESTING_DEPTH))
    );
}

#[test]
fn test_value_tree() {
    let mut w = TarsWriter::new();
    w.write_i32(42, 0);
    w.write_string("name", 1);
    vec![1u8, 2].encode_field(&mut w, 2);
    PointV1 { x: 0, y: 9 }.encode_field(&mut w, 3);
    let bytes = w.into_bytes();

    let fields = Value::decode_fields(&bytes).unwrap();
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[0].value, Value::Int(42));
    assert_eq!(fields[1].value, Value::String("name".into()));
    assert_eq!(fields[2].value, Value::Bytes(vec![1, 2]));
    assert_eq!(
        fields[3].value,
        Value::Struct(vec![
            Field {
                tag: 0,
                value: Value::Int(0)
            },
            Field {
                tag: 1,
                value: Value::Int(9)
            },
        ])
    );

    let text = Value::render_fields(&fields);
    assert!(text.contains("[1] \"name\""));
    assert!(text.contains("bytes(2) 0102"));
    assert!(text.contains("struct"));
}

#[test]
fn test_unsigned_out_of_range_rejected() {
    fn decode<T: TarsDecode>(bytes: &[u8]) -> DecodeResult<T> {
        T::decode_field(&mut TarsReader::new(bytes), 0, true)
    }

    let err = decode::<u8>(&encoded(&(i16::from(u8::MAX) + 1), 0)).unwrap_err();
    assert_eq!(
        err,
        DecodeError::OutOfRange {
            tag: 0,
            value: 256,
            target: "uint8"
        }
    );
    assert!(matches!(
        decode::<u16>(&encoded(&(i32::from(u16::MAX) + 1), 0)),
        Err(DecodeError::OutOfRange { value: 65536, .. })
    ));
    assert!(matches!(
        decode::<u32>(&encoded(&(i64::from(u32::MAX) + 1), 0)),
        Err(DecodeError::OutOfRange { value: 4_294_967_296, .. })
    ));
    assert!(matches!(
        decode::<u8>(&encoded(&-1i16, 0)),
        Err(DecodeError::OutOfRange { value: -1, .. })
    ));
    assert!(matches!(
        decode::<u32>(&encoded(&-5i64, 0)),
        Err(DecodeError::OutOfRange { value: -5, .. })
    ));

    // the widest in-range values still decode
    assert_eq!(decode::<u8>(&encoded(&255i16, 0)).unwrap(), 255);
    assert_eq!(decode::<u32>(&encoded(&i64::from(u32::MAX), 0)).unwrap(), u32::MAX);
}
