//! Dynamic instances of compiled types.

use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::schema::{FieldType, Schema, TypeKind};
use crate::types::Primitive;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Char(char),
    Octet(u8),
    Int8(i8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Enum(i32),
    /// Sequences, lists and arrays.
    Sequence(Vec<Value>),
    Struct(StructValue),
    Union(UnionValue),
}

/// Member values by name. An optional member is absent iff it has no entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructValue {
    pub fields: BTreeMap<String, Value>,
}

impl StructValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UnionValue {
    pub discriminator: i64,
    /// The active arm; `None` when the discriminator selects no arm.
    pub arm: Option<(String, Box<Value>)>,
}

impl UnionValue {
    pub fn new(discriminator: i64, arm: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            discriminator,
            arm: Some((arm.into(), Box::new(value.into()))),
        }
    }

    pub fn empty(discriminator: i64) -> Self {
        Self {
            discriminator,
            arm: None,
        }
    }

    pub fn arm_name(&self) -> Option<&str> {
        self.arm.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn arm_value(&self) -> Option<&Value> {
        self.arm.as_ref().map(|(_, value)| &**value)
    }
}

impl Value {
    /// Short variant name used in type mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Char(_) => "char",
            Value::Octet(_) => "octet",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "short",
            Value::UInt16(_) => "unsigned short",
            Value::Int32(_) => "long",
            Value::UInt32(_) => "unsigned long",
            Value::Int64(_) => "long long",
            Value::UInt64(_) => "unsigned long long",
            Value::Float32(_) => "float",
            Value::Float64(_) => "double",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
            Value::Sequence(_) => "sequence",
            Value::Struct(_) => "struct",
            Value::Union(_) => "union",
        }
    }

    /// The primitive this value encodes as, if it is a scalar.
    pub fn primitive(&self) -> Option<Primitive> {
        let p = match self {
            Value::Bool(_) => Primitive::Bool,
            Value::Char(_) => Primitive::Char,
            Value::Octet(_) => Primitive::Octet,
            Value::Int8(_) => Primitive::Int8,
            Value::Int16(_) => Primitive::Int16,
            Value::UInt16(_) => Primitive::UInt16,
            Value::Int32(_) => Primitive::Int32,
            Value::UInt32(_) => Primitive::UInt32,
            Value::Int64(_) => Primitive::Int64,
            Value::UInt64(_) => Primitive::UInt64,
            Value::Float32(_) => Primitive::Float32,
            Value::Float64(_) => Primitive::Float64,
            _ => return None,
        };
        Some(p)
    }

    /// The value a member of type `ty` takes when it is missing from a
    /// delimited body.
    pub fn default_for(schema: &Schema, ty: &FieldType) -> Value {
        match ty {
            FieldType::Primitive(p) => p.default_value(),
            FieldType::String { .. } | FieldType::FixedString(_) => Value::String(String::new()),
            FieldType::Sequence { .. } => Value::Sequence(Vec::new()),
            FieldType::Array { element, length } => {
                let element = Value::default_for(schema, element);
                Value::Sequence(vec![element; *length as usize])
            }
            FieldType::Type(id) => match &schema.get(*id).kind {
                TypeKind::Struct(s) => Value::Struct(StructValue {
                    fields: s
                        .members()
                        .iter()
                        .filter(|m| !m.optional)
                        .map(|m| (m.name.clone(), Value::default_for(schema, &m.ty)))
                        .collect(),
                }),
                TypeKind::Union(_) => Value::Union(UnionValue::empty(0)),
                TypeKind::Enum(e) => Value::Enum(e.default_value()),
            },
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_union(&self) -> Option<&UnionValue> {
        match self {
            Value::Union(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    char => Char,
    u8 => Octet,
    i8 => Int8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<Value> => Sequence,
    StructValue => Struct,
    UnionValue => Union,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::Sequence(iter.into_iter().map(Into::into).collect())
    }
}
