//! A schema-driven serialization compiler for the OMG Common Data
//! Representation, in its XCDR1 and XCDR2 variants.
//!
//! Types are described once as a [`SchemaSet`], compiled into an immutable
//! [`Schema`], and instances are moved as dynamic [`Value`]s:
//!
//! ```
//! use xcdr::{CdrLe, FieldDescriptor, Infinite, Representation, SchemaSet, StructValue, TypeDescriptor};
//!
//! let schema = SchemaSet::new()
//!     .with(
//!         TypeDescriptor::structure("Point")
//!             .field(FieldDescriptor::new("x", "int32"))
//!             .field(FieldDescriptor::new("y", "int32")),
//!     )
//!     .compile()
//!     .unwrap();
//! let point = schema.type_id("Point").unwrap();
//!
//! let value = StructValue::new().with("x", 1i32).with("y", -1i32).into();
//! let encoded = xcdr::serialize::<_, CdrLe>(&schema, point, &value, Representation::Xcdr2, Infinite).unwrap();
//! assert_eq!(encoded, [0, 7, 0, 0, 1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
//!
//! let decoded = xcdr::deserialize(&schema, point, &encoded).unwrap();
//! assert_eq!(decoded, value);
//! ```

pub mod align;
pub use align::Representation;

pub mod de;
pub use de::{deserialize, deserialize_data, deserialize_data_from, deserialize_from, Deserializer};

mod encapsulation;
pub use encapsulation::{CdrBe, CdrLe, Encapsulation, Header, ENCAPSULATION_HEADER_SIZE};

mod error;
pub use error::{Error, Result, SchemaError};

pub mod idl;
pub use idl::emit_idl;

pub mod layout;
pub use layout::{BridgeLayout, NativeLayout};

pub mod schema;
pub use schema::{
    Extensibility, FieldDescriptor, FieldType, Kind, Schema, SchemaSet, TypeDescriptor, TypeId,
};

pub mod ser;
pub use ser::{serialize, serialize_data, serialize_into, PatchWrite, Serializer};

mod size;
pub use size::{
    calc_serialized_size, calc_serialized_size_bounded, compute_size, Bounded, Infinite, SizeLimit,
    MAX_DEPTH,
};

pub mod types;
pub use types::Primitive;

mod union;

pub mod value;
pub use value::{StructValue, UnionValue, Value};
