use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian};
use proptest::prelude::*;

use xcdr::schema::{FieldDescriptor as F, TypeDescriptor as T};
use xcdr::{
    Bounded, CdrBe, CdrLe, Error, Extensibility, Infinite, Representation, Schema, SchemaSet,
    StructValue, TypeId, UnionValue, Value, ENCAPSULATION_HEADER_SIZE, MAX_DEPTH,
};

use Representation::{Xcdr1, Xcdr2};

fn check(schema: &Schema, ty: TypeId, element: &Value, repr: Representation, maybe_size: Option<u64>) {
    if let Some(size) = maybe_size {
        assert!(size >= ENCAPSULATION_HEADER_SIZE);
    }

    check_serialized_size(schema, ty, element, repr, maybe_size);
    check_round_trip(schema, ty, element, repr, maybe_size);
    check_capacity_shortage(schema, ty, element, repr, maybe_size);
    check_size_limit(schema, ty, element, repr, maybe_size);
}

fn check_serialized_size(
    schema: &Schema,
    ty: TypeId,
    element: &Value,
    repr: Representation,
    maybe_size: Option<u64>,
) {
    if let Some(serialized_size) = maybe_size {
        let size = xcdr::calc_serialized_size(schema, ty, element, repr).unwrap();
        assert_eq!(serialized_size, size);
    }
}

fn check_round_trip(
    schema: &Schema,
    ty: TypeId,
    element: &Value,
    repr: Representation,
    maybe_size: Option<u64>,
) {
    let size = match maybe_size {
        Some(v) => v,
        None => xcdr::calc_serialized_size(schema, ty, element, repr).unwrap(),
    };
    {
        let encoded = xcdr::serialize::<_, CdrBe>(schema, ty, element, repr, Infinite).unwrap();
        let decoded = xcdr::deserialize(schema, ty, &encoded).unwrap();

        assert_eq!(*element, decoded);
        assert_eq!(size, encoded.len() as u64);
    }
    {
        let encoded = xcdr::serialize::<_, CdrLe>(schema, ty, element, repr, Infinite).unwrap();
        let decoded = xcdr::deserialize(schema, ty, &encoded).unwrap();

        assert_eq!(*element, decoded);
        assert_eq!(size, encoded.len() as u64);
    }
}

fn check_capacity_shortage(
    schema: &Schema,
    ty: TypeId,
    element: &Value,
    repr: Representation,
    maybe_size: Option<u64>,
) {
    let bound = calc_invalid_size(schema, ty, element, repr, maybe_size);
    let mut buf = [0u8; 2000];
    {
        let mut buf = Cursor::new(&mut buf[0..bound as usize]);
        assert!(
            xcdr::serialize_into::<_, _, CdrBe>(&mut buf, schema, ty, element, repr, Infinite)
                .is_err()
        );
    }
    {
        let mut buf = Cursor::new(&mut buf[0..bound as usize]);
        assert!(
            xcdr::serialize_into::<_, _, CdrLe>(&mut buf, schema, ty, element, repr, Infinite)
                .is_err()
        );
    }
}

fn check_size_limit(
    schema: &Schema,
    ty: TypeId,
    element: &Value,
    repr: Representation,
    maybe_size: Option<u64>,
) {
    let bound = calc_invalid_size(schema, ty, element, repr, maybe_size);

    assert!(xcdr::serialize::<_, CdrBe>(schema, ty, element, repr, Bounded(bound)).is_err());
    assert!(xcdr::serialize::<_, CdrLe>(schema, ty, element, repr, Bounded(bound)).is_err());
    {
        let encoded = xcdr::serialize::<_, CdrBe>(schema, ty, element, repr, Infinite).unwrap();
        assert!(xcdr::deserialize_from(schema, ty, &encoded, Bounded(bound)).is_err());
    }
    {
        let encoded = xcdr::serialize::<_, CdrLe>(schema, ty, element, repr, Infinite).unwrap();
        assert!(xcdr::deserialize_from(schema, ty, &encoded, Bounded(bound)).is_err());
    }
}

fn calc_invalid_size(
    schema: &Schema,
    ty: TypeId,
    element: &Value,
    repr: Representation,
    maybe_size: Option<u64>,
) -> u64 {
    match maybe_size {
        Some(v) if v > 0 => v - 1,
        _ => xcdr::calc_serialized_size(schema, ty, element, repr).unwrap() - 1,
    }
}

/// A final struct holding one member `v` of `wire_type`.
fn single(wire_type: &str) -> (Schema, TypeId) {
    let schema = SchemaSet::new()
        .with(T::structure("Single").field(F::new("v", wire_type)))
        .compile()
        .unwrap();
    let id = schema.type_id("Single").unwrap();
    (schema, id)
}

fn check_single(wire_type: &str, v: impl Into<Value>, body: u64) {
    let (schema, id) = single(wire_type);
    let element = StructValue::new().with("v", v).into();
    check(&schema, id, &element, Xcdr1, Some(4 + body));
    check(&schema, id, &element, Xcdr2, Some(4 + body));
}

fn body<E: byteorder::ByteOrder>(
    schema: &Schema,
    ty: TypeId,
    element: &Value,
    repr: Representation,
) -> Vec<u8> {
    let mut out = Vec::new();
    let n = xcdr::serialize_data::<_, E>(&mut out, schema, ty, element, 0, repr).unwrap();
    assert_eq!(n, out.len() as u64);
    assert_eq!(n, xcdr::compute_size(schema, ty, element, 0, repr).unwrap());
    out
}

fn hex(text: &str) -> Vec<u8> {
    let digits: Vec<u8> = text.bytes().filter(u8::is_ascii_hexdigit).collect();
    digits
        .chunks(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
        .collect()
}

#[test]
fn test_octet() {
    check_single("octet", u8::MIN, 1);
    check_single("octet", u8::MAX, 1);
}

#[test]
fn test_int8() {
    check_single("int8", i8::MIN, 1);
    check_single("int8", i8::MAX, 1);
}

#[test]
fn test_char() {
    check_single("char", 'a', 1);
    check_single("char", 'Z', 1);
}

#[test]
fn test_unsigned_short() {
    check_single("unsigned short", u16::MIN, 2);
    check_single("uint16", u16::MAX, 2);
}

#[test]
fn test_short() {
    check_single("short", i16::MIN, 2);
    check_single("int16", i16::MAX, 2);
}

#[test]
fn test_unsigned_long() {
    check_single("unsigned long", u32::MIN, 4);
    check_single("uint32", u32::MAX, 4);
}

#[test]
fn test_int32() {
    check_single("int", i32::MIN, 4);
    check_single("int32", i32::MAX, 4);
}

#[test]
fn test_unsigned_long_long() {
    check_single("unsigned long long", u64::MIN, 8);
    check_single("uint64", u64::MAX, 8);
}

#[test]
fn test_long_long() {
    check_single("long long", i64::MIN, 8);
    check_single("int64", i64::MAX, 8);
    check_single("long", i64::MIN, 8);
}

#[test]
fn test_float() {
    check_single("float", f32::MIN, 4);
    check_single("float32", f32::MAX, 4);
}

#[test]
fn test_double() {
    check_single("double", f64::MIN, 8);
    check_single("float64", f64::MAX, 8);
}

#[test]
fn test_bool() {
    check_single("bool", false, 1);
    check_single("boolean", true, 1);
}

#[test]
fn test_string() {
    check_single("string", "", 4 + 1);
    check_single("string", "a", 4 + 2);
    check_single("string<8>", "12345678", 4 + 9);
}

#[test]
fn test_fixed_string() {
    check_single("FixedString4", "", 4);
    check_single("FixedString4", "abcd", 4);
}

#[test]
fn test_enum() {
    let schema = SchemaSet::new()
        .with(T::enumeration("Side", ["Buy", "Sell"]))
        .with(T::structure("Quote").field(F::new("side", "Side")))
        .compile()
        .unwrap();
    let id = schema.type_id("Quote").unwrap();
    let element = StructValue::new().with("side", Value::Enum(1)).into();
    check(&schema, id, &element, Xcdr1, Some(4 + 4));
    check(&schema, id, &element, Xcdr2, Some(4 + 4));
}

#[test]
fn test_alignment() {
    let schema = SchemaSet::new()
        .with(
            T::structure("Aligned")
                .field(F::new("a", "octet"))
                .field(F::new("b", "int64"))
                .field(F::new("c", "int16"))
                .field(F::new("d", "double")),
        )
        .compile()
        .unwrap();
    let id = schema.type_id("Aligned").unwrap();
    let element = StructValue::new()
        .with("a", 1u8)
        .with("b", 2i64)
        .with("c", 3i16)
        .with("d", 4.0f64)
        .into();

    // 1 + 7 + 8 + 2 + 6 + 8
    check(&schema, id, &element, Xcdr1, Some(4 + 32));
    // 1 + 3 + 8 + 2 + 2 + 8
    check(&schema, id, &element, Xcdr2, Some(4 + 24));
}

#[test]
fn test_final_struct_bytes() {
    let schema = SchemaSet::new()
        .with(
            T::structure("Reading")
                .field(F::new("Id", "int32"))
                .field(F::new("Value", "float64")),
        )
        .compile()
        .unwrap();
    let id = schema.type_id("Reading").unwrap();
    let element = StructValue::new()
        .with("Id", 123456789i32)
        .with("Value", 123.456f64)
        .into();

    assert_eq!(
        body::<LittleEndian>(&schema, id, &element, Xcdr1),
        hex("15 CD 5B 07 00 00 00 00 77 BE 9F 1A 2F DD 5E 40")
    );
    assert_eq!(
        body::<LittleEndian>(&schema, id, &element, Xcdr2),
        hex("15 CD 5B 07 77 BE 9F 1A 2F DD 5E 40")
    );
    assert_eq!(
        body::<BigEndian>(&schema, id, &element, Xcdr1),
        hex("07 5B CD 15 00 00 00 00 40 5E DD 2F 1A 9F BE 77")
    );

    let encoded = xcdr::serialize::<_, CdrLe>(&schema, id, &element, Xcdr1, Infinite).unwrap();
    assert_eq!(&encoded[..4], &[0x00, 0x01, 0x00, 0x00]);
    let encoded = xcdr::serialize::<_, CdrBe>(&schema, id, &element, Xcdr2, Infinite).unwrap();
    assert_eq!(&encoded[..4], &[0x00, 0x06, 0x00, 0x00]);

    check(&schema, id, &element, Xcdr1, Some(4 + 16));
    check(&schema, id, &element, Xcdr2, Some(4 + 12));
}

#[test]
fn test_bounded_sequence_bytes() {
    let (schema, id) = single("sequence<int32, 5>");
    let element: Value = StructValue::new()
        .with("v", [10i32, 20, 30, 40, 50].into_iter().collect::<Value>())
        .into();

    let expected = hex("05 00 00 00 0A 00 00 00 14 00 00 00 1E 00 00 00 28 00 00 00 32 00 00 00");
    assert_eq!(body::<LittleEndian>(&schema, id, &element, Xcdr2), expected);
    assert_eq!(body::<LittleEndian>(&schema, id, &element, Xcdr1), expected);
    check(&schema, id, &element, Xcdr2, Some(4 + 24));
}

#[test]
fn test_bound_exceeded() {
    let (schema, id) = single("BoundedSeq<int32, 3>");
    let bytes = hex("04 00 00 00 01 00 00 00 02 00 00 00 03 00 00 00 04 00 00 00");
    match xcdr::deserialize_data::<LittleEndian>(&schema, id, &bytes, 0, Xcdr2) {
        Err(Error::BoundExceeded { field, count, bound }) => {
            assert_eq!(field, "v");
            assert_eq!((count, bound), (4, 3));
        }
        r => panic!("unexpected result: {:?}", r),
    }

    let element = StructValue::new()
        .with("v", [1i32, 2, 3, 4].into_iter().collect::<Value>())
        .into();
    assert!(matches!(
        xcdr::compute_size(&schema, id, &element, 0, Xcdr2),
        Err(Error::BoundExceeded { count: 4, bound: 3, .. })
    ));
    assert!(matches!(
        xcdr::serialize::<_, CdrLe>(&schema, id, &element, Xcdr2, Infinite),
        Err(Error::BoundExceeded { .. })
    ));
}

#[test]
fn test_string_bound() {
    let (schema, id) = single("string<3>");
    let element = StructValue::new().with("v", "abcd").into();
    assert!(matches!(
        xcdr::compute_size(&schema, id, &element, 0, Xcdr2),
        Err(Error::BoundExceeded { count: 4, bound: 3, .. })
    ));
    assert!(matches!(
        xcdr::deserialize_data::<LittleEndian>(&schema, id, &hex("05000000 61626364 00"), 0, Xcdr2),
        Err(Error::BoundExceeded { count: 4, bound: 3, .. })
    ));
}

fn order_union(extensibility: Extensibility, arms: &[(&str, &str, i64)]) -> (Schema, TypeId) {
    let mut desc = T::union("Order")
        .extensibility(extensibility)
        .field(F::new("kind", "int32").discriminator());
    for &(name, wire_type, label) in arms {
        desc = desc.field(F::new(name, wire_type).case([label]));
    }
    let schema = SchemaSet::new().with(desc).compile().unwrap();
    let id = schema.type_id("Order").unwrap();
    (schema, id)
}

#[test]
fn test_union_bytes() {
    let (schema, id) = order_union(
        Extensibility::Final,
        &[("Buy", "int32", 1), ("Side", "int32", 2)],
    );
    let element = Value::Union(UnionValue::new(2, "Side", 55i32));

    assert_eq!(
        body::<LittleEndian>(&schema, id, &element, Xcdr2),
        hex("02 00 00 00 37 00 00 00")
    );
    check(&schema, id, &element, Xcdr1, Some(4 + 8));
    check(&schema, id, &element, Xcdr2, Some(4 + 8));
}

#[test]
fn test_union_unknown_discriminator() {
    let (schema, id) = order_union(
        Extensibility::Final,
        &[("Buy", "int32", 1), ("Side", "int32", 2)],
    );

    let (decoded, consumed) = xcdr::deserialize_data::<LittleEndian>(
        &schema,
        id,
        &hex("03 00 00 00 FF FF FF FF"),
        0,
        Xcdr2,
    )
    .unwrap();
    assert_eq!(decoded, Value::Union(UnionValue::empty(3)));
    assert_eq!(consumed, 4);

    let element = Value::Union(UnionValue::empty(3));
    check(&schema, id, &element, Xcdr2, Some(4 + 4));
}

#[test]
fn test_union_arm_skipped() {
    let (newer, newer_id) = order_union(
        Extensibility::Appendable,
        &[("Buy", "int32", 1), ("Note", "string", 2)],
    );
    let (older, older_id) = order_union(Extensibility::Appendable, &[("Buy", "int32", 1)]);

    let element = Value::Union(UnionValue::new(2, "Note", "xyz"));
    let bytes = body::<LittleEndian>(&newer, newer_id, &element, Xcdr2);
    assert_eq!(bytes, hex("0C000000 02000000 04000000 78797A00"));

    let (decoded, consumed) =
        xcdr::deserialize_data::<LittleEndian>(&older, older_id, &bytes, 0, Xcdr2).unwrap();
    assert_eq!(decoded, Value::Union(UnionValue::empty(2)));
    assert_eq!(consumed, bytes.len());
}

fn appendable_versions() -> (Schema, TypeId, Schema, TypeId) {
    let v1 = SchemaSet::new()
        .with(
            T::structure("Record")
                .extensibility(Extensibility::Appendable)
                .field(F::new("Id", "int32")),
        )
        .compile()
        .unwrap();
    let v2 = SchemaSet::new()
        .with(
            T::structure("Record")
                .extensibility(Extensibility::Appendable)
                .field(F::new("Id", "int32"))
                .field(F::new("Required", "int32")),
        )
        .compile()
        .unwrap();
    let v1_id = v1.type_id("Record").unwrap();
    let v2_id = v2.type_id("Record").unwrap();
    (v1, v1_id, v2, v2_id)
}

#[test]
fn test_older_reader() {
    let (v1, v1_id, v2, v2_id) = appendable_versions();
    let element = StructValue::new().with("Id", 5i32).with("Required", 999i32).into();

    let mut bytes = body::<LittleEndian>(&v2, v2_id, &element, Xcdr2);
    assert_eq!(bytes, hex("08000000 05000000 E7030000"));
    bytes.push(0xaa);

    let (decoded, consumed) =
        xcdr::deserialize_data::<LittleEndian>(&v1, v1_id, &bytes, 0, Xcdr2).unwrap();
    assert_eq!(decoded, Value::Struct(StructValue::new().with("Id", 5i32)));
    assert_eq!(consumed, 12);
}

#[test]
fn test_newer_reader() {
    let (v1, v1_id, v2, v2_id) = appendable_versions();
    let element = StructValue::new().with("Id", 5i32).into();

    let bytes = body::<BigEndian>(&v1, v1_id, &element, Xcdr2);
    assert_eq!(bytes, [0, 0, 0, 4, 0, 0, 0, 5]);

    let (decoded, consumed) =
        xcdr::deserialize_data::<BigEndian>(&v2, v2_id, &bytes, 0, Xcdr2).unwrap();
    assert_eq!(
        decoded,
        Value::Struct(StructValue::new().with("Id", 5i32).with("Required", 0i32))
    );
    assert_eq!(consumed, 8);
}

#[test]
fn test_appendable_bytes() {
    let schema = SchemaSet::new()
        .with(
            T::structure("Named")
                .extensibility(Extensibility::Appendable)
                .field(F::new("Id", "int32"))
                .field(F::new("Name", "string")),
        )
        .compile()
        .unwrap();
    let id = schema.type_id("Named").unwrap();
    let element = StructValue::new()
        .with("Id", 999i32)
        .with("Name", "Appendable")
        .into();

    assert_eq!(
        body::<LittleEndian>(&schema, id, &element, Xcdr2),
        hex("13000000 E7030000 0B000000 417070656E6461626C6500")
    );
    let encoded = xcdr::serialize::<_, CdrLe>(&schema, id, &element, Xcdr2, Infinite).unwrap();
    assert_eq!(&encoded[..4], &[0x00, 0x09, 0x00, 0x00]);

    // No DHEADER under XCDR1.
    check(&schema, id, &element, Xcdr1, Some(4 + 4 + 15));
    check(&schema, id, &element, Xcdr2, Some(4 + 4 + 4 + 15));
}

#[test]
fn test_mutable_framing() {
    let schema = SchemaSet::new()
        .with(
            T::structure("Settings")
                .extensibility(Extensibility::Mutable)
                .field(F::new("level", "uint16"))
                .field(F::new("scale", "double")),
        )
        .compile()
        .unwrap();
    let id = schema.type_id("Settings").unwrap();
    let element = StructValue::new().with("level", 3u16).with("scale", 0.5f64).into();

    // DHEADER, level, 2 bytes of padding, scale
    assert_eq!(
        body::<LittleEndian>(&schema, id, &element, Xcdr2),
        hex("0C000000 0300 0000 000000000000E03F")
    );
    check(&schema, id, &element, Xcdr2, Some(4 + 16));
    check(&schema, id, &element, Xcdr1, Some(4 + 16));
}

fn optional_schema() -> (Schema, TypeId) {
    let schema = SchemaSet::new()
        .with(
            T::structure("Tagged")
                .field(F::new("a", "int32"))
                .field(F::new("note", "string").optional()),
        )
        .compile()
        .unwrap();
    let id = schema.type_id("Tagged").unwrap();
    (schema, id)
}

#[test]
fn test_optional_member() {
    let (schema, id) = optional_schema();

    let absent = StructValue::new().with("a", 1i32).into();
    let present = StructValue::new().with("a", 1i32).with("note", "hi").into();

    let absent_bytes = body::<LittleEndian>(&schema, id, &absent, Xcdr2);
    let present_bytes = body::<LittleEndian>(&schema, id, &present, Xcdr2);
    assert_eq!(absent_bytes, hex("01000000"));
    // EMHEADER (7 << 3) | 1
    assert_eq!(present_bytes, hex("01000000 39000000 03000000 686900"));
    assert!(absent_bytes.len() < present_bytes.len());

    check(&schema, id, &absent, Xcdr2, Some(4 + 4));
    check(&schema, id, &present, Xcdr2, Some(4 + 15));
    check(&schema, id, &present, Xcdr1, Some(4 + 15));
}

#[test]
fn test_optional_before_required() {
    let schema = SchemaSet::new()
        .with(
            T::structure("Leading")
                .field(F::new("note", "double?"))
                .field(F::new("count", "int32")),
        )
        .compile()
        .unwrap();
    let id = schema.type_id("Leading").unwrap();

    let absent = StructValue::new().with("count", 5i32).into();
    assert_eq!(body::<LittleEndian>(&schema, id, &absent, Xcdr2), hex("05000000"));
    check(&schema, id, &absent, Xcdr2, Some(4 + 4));

    let present = StructValue::new().with("note", 1.0f64).with("count", 5i32).into();
    check(&schema, id, &present, Xcdr2, Some(4 + 4 + 8 + 4));

    // `count` reads as an EMHEADER for id 0 announcing a byte that is not there.
    let lookalike = StructValue::new().with("count", 8i32).into();
    assert_eq!(body::<LittleEndian>(&schema, id, &lookalike, Xcdr2), hex("08000000"));
    check(&schema, id, &lookalike, Xcdr2, Some(4 + 4));
    check(&schema, id, &lookalike, Xcdr1, Some(4 + 4));
}

#[test]
fn test_optional_header_length() {
    let schema = SchemaSet::new()
        .with(
            T::structure("Counted")
                .extensibility(Extensibility::Appendable)
                .field(F::new("note", "int32?"))
                .field(F::new("count", "int32")),
        )
        .with(
            T::structure("Tallied")
                .extensibility(Extensibility::Appendable)
                .field(F::new("note", "int32?"))
                .field(F::new("count", "int32"))
                .field(F::new("more", "int32")),
        )
        .compile()
        .unwrap();

    // The announced body runs past the DHEADER end.
    let counted = schema.type_id("Counted").unwrap();
    let absent = StructValue::new().with("count", 8i32).into();
    assert_eq!(
        body::<LittleEndian>(&schema, counted, &absent, Xcdr2),
        hex("04000000 08000000")
    );
    check(&schema, counted, &absent, Xcdr2, Some(4 + 8));
    check(&schema, counted, &absent, Xcdr1, Some(4 + 4));

    let present = StructValue::new().with("note", 3i32).with("count", 8i32).into();
    // EMHEADER (4 << 3) | 0
    assert_eq!(
        body::<LittleEndian>(&schema, counted, &present, Xcdr2),
        hex("0C000000 20000000 03000000 08000000")
    );
    check(&schema, counted, &present, Xcdr2, Some(4 + 16));

    // The announced body fits, but the value does not fit in it.
    let tallied = schema.type_id("Tallied").unwrap();
    let absent = StructValue::new().with("count", 8i32).with("more", 5i32).into();
    check(&schema, tallied, &absent, Xcdr2, Some(4 + 12));
    check(&schema, tallied, &absent, Xcdr1, Some(4 + 8));
}

#[test]
fn test_managed_types() {
    let schema = SchemaSet::new()
        .with(
            T::structure("Pose")
                .field(F::new("id", "Guid"))
                .field(F::new("stamp", "DateTime"))
                .field(F::new("position", "System.Numerics.Vector3"))
                .field(F::new("rotation", "Quaternion")),
        )
        .compile()
        .unwrap();
    let id = schema.type_id("Pose").unwrap();
    let stamp = 638_000_000_000_000_000i64;
    let element = StructValue::new()
        .with("id", (0..16u8).collect::<Value>())
        .with("stamp", stamp)
        .with("position", [1.0f32, 2.0, 3.0].into_iter().collect::<Value>())
        .with("rotation", [0.0f32, 0.0, 0.0, 1.0].into_iter().collect::<Value>())
        .into();

    let bytes = body::<LittleEndian>(&schema, id, &element, Xcdr1);
    assert_eq!(bytes[..16], (0..16u8).collect::<Vec<_>>()[..]);
    assert_eq!(bytes[16..24], stamp.to_le_bytes());
    assert_eq!(bytes[24..28], 1.0f32.to_le_bytes());

    // 16 + 8 + 12 + 16, every run already aligned
    check(&schema, id, &element, Xcdr1, Some(4 + 52));
    check(&schema, id, &element, Xcdr2, Some(4 + 52));

    let short = StructValue::new()
        .with("id", (0..15u8).collect::<Value>())
        .with("stamp", stamp)
        .with("position", [1.0f32, 2.0, 3.0].into_iter().collect::<Value>())
        .with("rotation", [0.0f32, 0.0, 0.0, 1.0].into_iter().collect::<Value>())
        .into();
    assert!(matches!(
        xcdr::compute_size(&schema, id, &short, 0, Xcdr2),
        Err(Error::ArrayLength { expected: 16, found: 15, .. })
    ));
}

fn tree_schema() -> (Schema, TypeId) {
    let schema = SchemaSet::new()
        .with(T::structure("Node").field(F::new("children", "sequence<Node>")))
        .compile()
        .unwrap();
    let id = schema.type_id("Node").unwrap();
    (schema, id)
}

/// A chain of `depth` nodes, each holding the next as its only child.
fn chain(depth: usize) -> Value {
    let mut node: Value = StructValue::new().with("children", Value::Sequence(Vec::new())).into();
    for _ in 1..depth {
        node = StructValue::new().with("children", vec![node]).into();
    }
    node
}

#[test]
fn test_nesting_depth() {
    let (schema, id) = tree_schema();

    let deepest = chain(MAX_DEPTH);
    check(&schema, id, &deepest, Xcdr2, None);

    let too_deep = chain(MAX_DEPTH + 1);
    match xcdr::compute_size(&schema, id, &too_deep, 0, Xcdr2) {
        Err(Error::DepthExceeded { field, limit }) => {
            assert_eq!(field, "children");
            assert_eq!(limit, MAX_DEPTH);
        }
        r => panic!("unexpected result: {:?}", r),
    }
    let mut out = Vec::new();
    assert!(matches!(
        xcdr::serialize_data::<_, LittleEndian>(&mut out, &schema, id, &too_deep, 0, Xcdr2),
        Err(Error::DepthExceeded { .. })
    ));
}

#[test]
fn test_member_id_order() {
    let schema = SchemaSet::new()
        .with(
            T::structure("Reordered")
                .field(F::new("c", "int8").with_id(3))
                .field(F::new("a", "int32").with_id(1))
                .field(F::new("b", "int16").with_id(2)),
        )
        .compile()
        .unwrap();
    let id = schema.type_id("Reordered").unwrap();
    let element = StructValue::new()
        .with("c", 3i8)
        .with("a", 1i32)
        .with("b", 2i16)
        .into();

    assert_eq!(
        body::<LittleEndian>(&schema, id, &element, Xcdr2),
        [1, 0, 0, 0, 2, 0, 3]
    );
    check(&schema, id, &element, Xcdr2, Some(4 + 7));
}

fn trading_schema() -> Schema {
    SchemaSet::new()
        .with(T::enumeration("Side", ["Buy", "Sell"]).namespace("Trading"))
        .with(
            T::structure("Leg")
                .namespace("Trading")
                .field(F::new("price", "double"))
                .field(F::new("qty", "uint32")),
        )
        .with(
            T::structure("Order")
                .namespace("Trading")
                .extensibility(Extensibility::Appendable)
                .field(F::new("id", "int32").key())
                .field(F::new("side", "Side"))
                .field(F::new("legs", "sequence<Leg, 4>"))
                .field(F::new("tags", "string[2]"))
                .field(F::new("code", "FixedString4"))
                .field(F::new("note", "string?")),
        )
        .compile()
        .unwrap()
}

fn leg(price: f64, qty: u32) -> Value {
    StructValue::new().with("price", price).with("qty", qty).into()
}

fn order() -> Value {
    StructValue::new()
        .with("id", 7i32)
        .with("side", Value::Enum(1))
        .with("legs", vec![leg(1.5, 10), leg(2.5, 20)])
        .with("tags", vec![Value::from("a"), Value::from("bc")])
        .with("code", "XY")
        .into()
}

#[test]
fn test_nested() {
    let schema = trading_schema();
    let id = schema.type_id("Trading.Order").unwrap();
    let element = order();

    check(&schema, id, &element, Xcdr1, Some(4 + 63));
    check(&schema, id, &element, Xcdr2, Some(4 + 59));

    let mut with_note = element.as_struct().unwrap().clone();
    with_note.insert("note", "rush");
    check(&schema, id, &Value::Struct(with_note), Xcdr2, None);
}

#[test]
fn test_array_length() {
    let schema = trading_schema();
    let id = schema.type_id("Trading.Order").unwrap();
    let mut element = order().as_struct().unwrap().clone();
    element.insert("tags", vec![Value::from("a")]);

    match xcdr::compute_size(&schema, id, &Value::Struct(element), 0, Xcdr2) {
        Err(Error::ArrayLength {
            field,
            expected,
            found,
        }) => {
            assert_eq!(field, "tags");
            assert_eq!((expected, found), (2, 1));
        }
        r => panic!("unexpected result: {:?}", r),
    }
}

#[test]
fn test_multidimensional_array() {
    let (schema, id) = single("int16[2][3]");
    let row = |a: i16, b: i16| Value::Sequence(vec![Value::Int16(a), Value::Int16(b)]);
    let element = StructValue::new()
        .with("v", vec![row(1, 2), row(3, 4), row(5, 6)])
        .into();

    assert_eq!(
        body::<LittleEndian>(&schema, id, &element, Xcdr2),
        [1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0]
    );
    check(&schema, id, &element, Xcdr1, Some(4 + 12));
}

#[test]
fn test_start_offset() {
    let (schema, id) = single("int64");
    let element = StructValue::new().with("v", 1i64).into();

    assert_eq!(xcdr::compute_size(&schema, id, &element, 2, Xcdr1).unwrap(), 6 + 8);
    assert_eq!(xcdr::compute_size(&schema, id, &element, 2, Xcdr2).unwrap(), 2 + 8);

    let mut out = Vec::new();
    xcdr::serialize_data::<_, LittleEndian>(&mut out, &schema, id, &element, 2, Xcdr1).unwrap();
    assert_eq!(out.len(), 14);

    let (decoded, consumed) =
        xcdr::deserialize_data::<LittleEndian>(&schema, id, &out, 2, Xcdr1).unwrap();
    assert_eq!(decoded, element);
    assert_eq!(consumed, 14);
}

#[test]
fn test_encapsulation_header() {
    let (schema, id) = single("int32");
    assert!(matches!(
        xcdr::deserialize(&schema, id, &[0x00, 0x02, 0x00, 0x00, 1, 0, 0, 0]),
        Err(Error::InvalidEncapsulation([0x00, 0x02]))
    ));
    assert!(matches!(
        xcdr::deserialize(&schema, id, &[0x00, 0x01]),
        Err(Error::Truncated { .. })
    ));
    assert_eq!(
        xcdr::deserialize(&schema, id, &[0x00, 0x00, 0x00, 0x00, 0, 0, 0, 9]).unwrap(),
        Value::Struct(StructValue::new().with("v", 9i32))
    );
}

#[test]
fn test_type_mismatch() {
    let (schema, id) = single("string");
    let element = StructValue::new().with("v", 1.0f32).into();
    match xcdr::serialize::<_, CdrLe>(&schema, id, &element, Xcdr2, Infinite) {
        Err(Error::TypeMismatch { field, found, .. }) => {
            assert_eq!(field, "v");
            assert_eq!(found, "float");
        }
        r => panic!("unexpected result: {:?}", r),
    }
    assert!(xcdr::compute_size(&schema, id, &Value::Int32(0), 0, Xcdr2).is_err());
}

#[test]
fn test_json_schema() {
    let set = SchemaSet::from_json(
        r#"{
            "types": [
                {
                    "name": "Sample",
                    "fields": [
                        { "name": "id", "type": "int32" },
                        { "name": "values", "type": "List<double>", "attributes": { "bound": 2 } }
                    ]
                }
            ]
        }"#,
    )
    .unwrap();
    let schema = set.compile().unwrap();
    let id = schema.type_id("Sample").unwrap();
    let element = StructValue::new()
        .with("id", 1i32)
        .with("values", vec![Value::Float64(0.25), Value::Float64(-8.0)])
        .into();

    check(&schema, id, &element, Xcdr1, Some(4 + 4 + 4 + 16));
    check(&schema, id, &element, Xcdr2, Some(4 + 4 + 4 + 16));
}

#[test]
fn test_schema_error_conversion() {
    fn lookup(schema: &Schema) -> xcdr::Result<TypeId> {
        Ok(schema.type_id("Missing")?)
    }

    let (schema, _) = single("int32");
    assert!(matches!(lookup(&schema), Err(Error::Schema(_))));
}

fn sample_schema() -> (Schema, TypeId) {
    let schema = SchemaSet::new()
        .with(
            T::structure("Sample")
                .extensibility(Extensibility::Appendable)
                .field(F::new("a", "octet"))
                .field(F::new("b", "int64"))
                .field(F::new("c", "string"))
                .field(F::new("d", "sequence<int16>"))
                .field(F::new("e", "double?")),
        )
        .compile()
        .unwrap();
    let id = schema.type_id("Sample").unwrap();
    (schema, id)
}

prop_compose! {
    fn sample_value()(
        a in any::<u8>(),
        b in any::<i64>(),
        c in "[a-z]{0,16}",
        d in prop::collection::vec(any::<i16>(), 0..20),
        e in prop::option::of(-1.0e9f64..1.0e9),
    ) -> Value {
        let mut value = StructValue::new()
            .with("a", a)
            .with("b", b)
            .with("c", c)
            .with("d", d.into_iter().collect::<Value>());
        if let Some(e) = e {
            value.insert("e", e);
        }
        value.into()
    }
}

proptest! {
    #[test]
    fn prop_size_matches_written_bytes(value in sample_value(), offset in 0u64..8, xcdr2 in any::<bool>()) {
        let (schema, id) = sample_schema();
        let repr = if xcdr2 { Xcdr2 } else { Xcdr1 };

        let size = xcdr::compute_size(&schema, id, &value, offset, repr).unwrap();
        let mut out = Vec::new();
        let written = xcdr::serialize_data::<_, LittleEndian>(&mut out, &schema, id, &value, offset, repr).unwrap();
        prop_assert_eq!(size, written);
        prop_assert_eq!(size, out.len() as u64);

        let (decoded, consumed) = xcdr::deserialize_data::<LittleEndian>(&schema, id, &out, offset, repr).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(consumed, out.len());
    }
}
