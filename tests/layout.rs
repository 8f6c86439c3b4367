//! Native layouts checked against what rustc lays out for the same
//! `#[repr(C)]` definitions.

#![allow(dead_code)]

use std::mem::{align_of, offset_of, size_of};

use xcdr::schema::{FieldDescriptor as F, TypeDescriptor as T};
use xcdr::{NativeLayout, Schema, SchemaSet};

#[repr(C)]
struct Sequence {
    maximum: u32,
    length: u32,
    buffer: *mut u8,
    release: bool,
}

#[repr(C)]
struct Point {
    x: i32,
    y: i32,
}

#[repr(C)]
struct Order {
    flag: bool,
    price: f64,
    name: *const u8,
    tags: Sequence,
    code: [u8; 5],
    qty: i16,
    note: *const f64,
    side: i32,
    origin: Point,
    grid: [[i16; 2]; 3],
    tail: u8,
}

#[repr(C)]
struct Pose {
    id: [u8; 16],
    flag: bool,
    stamp: i64,
    offset: [i64; 2],
    position: [f32; 3],
    rotation: [f32; 4],
    transform: [f32; 16],
}

#[repr(C)]
union Arms {
    small: u8,
    big: f64,
    point: std::mem::ManuallyDrop<Point>,
    code: [u8; 3],
}

#[repr(C)]
struct Tagged {
    kind: i16,
    arms: Arms,
}

#[repr(C)]
union SmallArms {
    a: u8,
    b: u16,
}

#[repr(C)]
struct SmallTagged {
    kind: i32,
    arms: SmallArms,
}

fn schema() -> Schema {
    SchemaSet::new()
        .with(T::enumeration("Side", ["Buy", "Sell"]))
        .with(
            T::structure("Point")
                .field(F::new("x", "int32"))
                .field(F::new("y", "int32")),
        )
        .with(
            T::structure("Order")
                .field(F::new("flag", "bool"))
                .field(F::new("price", "double"))
                .field(F::new("name", "string"))
                .field(F::new("tags", "sequence<string>"))
                .field(F::new("code", "FixedString5"))
                .field(F::new("qty", "int16"))
                .field(F::new("note", "double?"))
                .field(F::new("side", "Side"))
                .field(F::new("origin", "Point"))
                .field(F::new("grid", "int16[2][3]"))
                .field(F::new("tail", "octet")),
        )
        .with(
            T::structure("Pose")
                .field(F::new("id", "Guid"))
                .field(F::new("flag", "bool"))
                .field(F::new("stamp", "DateTime"))
                .field(F::new("offset", "DateTimeOffset"))
                .field(F::new("position", "Vector3"))
                .field(F::new("rotation", "Quaternion"))
                .field(F::new("transform", "Matrix4x4")),
        )
        .with(
            T::union("Tagged")
                .field(F::new("kind", "int16").discriminator())
                .field(F::new("small", "octet").case([1]))
                .field(F::new("big", "double").case([2]))
                .field(F::new("point", "Point").case([3]))
                .field(F::new("code", "FixedString3").default_case()),
        )
        .with(
            T::union("SmallTagged")
                .field(F::new("kind", "int32").discriminator())
                .field(F::new("a", "octet").case([1]))
                .field(F::new("b", "uint16").case([2])),
        )
        .compile()
        .unwrap()
}

fn layout<'s>(schema: &'s Schema, name: &str) -> &'s NativeLayout {
    &schema.get(schema.type_id(name).unwrap()).layout
}

fn offset(layout: &NativeLayout, field: &str) -> usize {
    layout.field(field).unwrap().offset
}

#[test]
fn test_struct_layout() {
    let schema = schema();
    let order = layout(&schema, "Order");

    assert_eq!(order.size, size_of::<Order>());
    assert_eq!(order.alignment, align_of::<Order>());
    assert_eq!(offset(order, "flag"), offset_of!(Order, flag));
    assert_eq!(offset(order, "price"), offset_of!(Order, price));
    assert_eq!(offset(order, "name"), offset_of!(Order, name));
    assert_eq!(offset(order, "tags"), offset_of!(Order, tags));
    assert_eq!(offset(order, "code"), offset_of!(Order, code));
    assert_eq!(offset(order, "qty"), offset_of!(Order, qty));
    assert_eq!(offset(order, "note"), offset_of!(Order, note));
    assert_eq!(offset(order, "side"), offset_of!(Order, side));
    assert_eq!(offset(order, "origin"), offset_of!(Order, origin));
    assert_eq!(offset(order, "grid"), offset_of!(Order, grid));
    assert_eq!(offset(order, "tail"), offset_of!(Order, tail));

    let padding: usize = order.padding.iter().map(|p| p.size).sum();
    let fields: usize = order.fields.iter().map(|f| f.size).sum();
    assert_eq!(padding + fields, order.size);
}

#[test]
fn test_managed_type_layout() {
    let schema = schema();
    let pose = layout(&schema, "Pose");

    assert_eq!(pose.size, size_of::<Pose>());
    assert_eq!(pose.alignment, align_of::<Pose>());
    assert_eq!(offset(pose, "flag"), offset_of!(Pose, flag));
    assert_eq!(offset(pose, "stamp"), offset_of!(Pose, stamp));
    assert_eq!(offset(pose, "offset"), offset_of!(Pose, offset));
    assert_eq!(offset(pose, "position"), offset_of!(Pose, position));
    assert_eq!(offset(pose, "rotation"), offset_of!(Pose, rotation));
    assert_eq!(offset(pose, "transform"), offset_of!(Pose, transform));
}

#[test]
fn test_union_layout() {
    let schema = schema();

    let tagged = layout(&schema, "Tagged");
    assert_eq!(tagged.size, size_of::<Tagged>());
    assert_eq!(tagged.alignment, align_of::<Tagged>());
    assert_eq!(tagged.payload_offset, Some(offset_of!(Tagged, arms)));
    assert_eq!(offset(tagged, "kind"), offset_of!(Tagged, kind));
    assert_eq!(offset(tagged, "point"), offset_of!(Tagged, arms));

    let small = layout(&schema, "SmallTagged");
    assert_eq!(small.size, size_of::<SmallTagged>());
    assert_eq!(small.alignment, align_of::<SmallTagged>());
    assert_eq!(small.payload_offset, Some(offset_of!(SmallTagged, arms)));
}

#[test]
fn test_enum_layout() {
    let schema = schema();
    let side = layout(&schema, "Side");
    assert_eq!((side.size, side.alignment), (4, 4));
    assert!(side.fields.is_empty());
}

#[test]
fn test_bridge_layout_json() {
    let schema = schema();
    let bridge = schema.bridge_layout(schema.type_id("Order").unwrap());
    let json: serde_json::Value = serde_json::from_str(&bridge.to_json().unwrap()).unwrap();

    assert_eq!(json["type_name"], "Order");
    assert_eq!(json["total_size"], size_of::<Order>());
    assert_eq!(json["offsets"]["price"], offset_of!(Order, price));
    assert_eq!(json["keys"], serde_json::json!([]));
}
