//! Type schemas: the descriptor model, wire type parsing and compilation into
//! an immutable dispatch table.

mod compile;
mod model;
mod wire_type;

pub use self::compile::{
    CompiledType, EnumType, FieldType, Member, Schema, StructType, TypeId, TypeKind, UnionArm,
    UnionType,
};
pub use self::model::{
    Attributes, EnumMember, Extensibility, FieldDescriptor, Kind, SchemaSet, TypeDescriptor,
};
pub use self::wire_type::WireType;
