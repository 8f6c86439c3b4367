//! Mapping primitive type identifiers onto wire operations.

use std::fmt;

use crate::value::Value;

/// A fixed-width scalar that has a direct wire encoding.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Primitive {
    Bool,
    Char,
    Octet,
    Int8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

/// The static facts about a primitive needed by the size, write and read passes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WireOp {
    pub primitive: Primitive,
    pub size: usize,
    pub alignment: usize,
    pub blittable: bool,
}

impl Primitive {
    /// Width on the wire and in native memory.
    pub fn size(self) -> usize {
        use Primitive::*;

        match self {
            Bool | Char | Octet | Int8 => 1,
            Int16 | UInt16 => 2,
            Int32 | UInt32 | Float32 => 4,
            Int64 | UInt64 | Float64 => 8,
        }
    }

    /// Numeric types whose wire bytes equal the raw memory of a `[T]` run.
    ///
    /// `bool` and `char` are excluded: reading them validates every byte.
    pub fn is_blittable(self) -> bool {
        !matches!(self, Primitive::Bool | Primitive::Char)
    }

    pub fn is_integral(self) -> bool {
        !matches!(self, Primitive::Float32 | Primitive::Float64)
    }

    pub fn wire_op(self) -> WireOp {
        WireOp {
            primitive: self,
            size: self.size(),
            alignment: self.size(),
            blittable: self.is_blittable(),
        }
    }

    /// The IDL spelling, used by the IDL emitter and in error messages.
    pub fn idl_name(self) -> &'static str {
        use Primitive::*;

        match self {
            Bool => "boolean",
            Char => "char",
            Octet => "octet",
            Int8 => "int8",
            Int16 => "short",
            UInt16 => "unsigned short",
            Int32 => "long",
            UInt32 => "unsigned long",
            Int64 => "long long",
            UInt64 => "unsigned long long",
            Float32 => "float",
            Float64 => "double",
        }
    }

    pub fn default_value(self) -> Value {
        use Primitive::*;

        match self {
            Bool => Value::Bool(false),
            Char => Value::Char('\0'),
            Octet => Value::Octet(0),
            Int8 => Value::Int8(0),
            Int16 => Value::Int16(0),
            UInt16 => Value::UInt16(0),
            Int32 => Value::Int32(0),
            UInt32 => Value::UInt32(0),
            Int64 => Value::Int64(0),
            UInt64 => Value::UInt64(0),
            Float32 => Value::Float32(0.0),
            Float64 => Value::Float64(0.0),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.idl_name())
    }
}

/// A managed value type carried on the wire as a fixed run of one primitive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Composite {
    pub element: Primitive,
    pub count: u32,
    /// Whether the managed value's memory is the run itself.
    pub blittable: bool,
}

impl Composite {
    pub fn wire_op(self) -> WireOp {
        WireOp {
            primitive: self.element,
            size: self.element.size() * self.count as usize,
            alignment: self.element.size(),
            blittable: self.blittable,
        }
    }
}

/// Looks up a primitive by any of its accepted spellings.
///
/// `long` and `ulong` follow the managed convention and name 64-bit integers.
/// Use `int32` or `int` for the 32-bit integer IDL calls `long`.
pub fn primitive(name: &str) -> Option<Primitive> {
    use Primitive::*;

    let p = match name.trim() {
        "bool" | "boolean" | "Boolean" => Bool,
        "char" | "char8" | "Char" => Char,
        "octet" | "byte" | "uint8" | "u8" | "Byte" => Octet,
        "int8" | "sbyte" | "i8" | "SByte" => Int8,
        "short" | "int16" | "i16" | "Int16" => Int16,
        "unsigned short" | "ushort" | "uint16" | "u16" | "UInt16" => UInt16,
        "int" | "int32" | "i32" | "Int32" => Int32,
        "unsigned long" | "uint" | "uint32" | "u32" | "UInt32" => UInt32,
        "long" | "long long" | "int64" | "i64" | "Int64" => Int64,
        "unsigned long long" | "ulong" | "uint64" | "u64" | "UInt64" => UInt64,
        "float" | "float32" | "f32" | "Single" => Float32,
        "double" | "float64" | "f64" | "Double" => Float64,
        _ => return None,
    };
    Some(p)
}

/// Looks up a managed value type. `Guid` is sixteen octets, `DateTime` and
/// `TimeSpan` are 64-bit tick counts, `DateTimeOffset` is the ticks followed
/// by the offset in minutes, and the `System.Numerics` types are runs of
/// `float`.
pub fn composite(name: &str) -> Option<Composite> {
    use Primitive::*;

    let (element, count, blittable) = match name.trim() {
        "Guid" | "System.Guid" => (Octet, 16, true),
        "DateTime" | "System.DateTime" => (Int64, 1, false),
        "TimeSpan" | "System.TimeSpan" => (Int64, 1, false),
        "DateTimeOffset" | "System.DateTimeOffset" => (Int64, 2, false),
        "Vector2" | "System.Numerics.Vector2" => (Float32, 2, true),
        "Vector3" | "System.Numerics.Vector3" => (Float32, 3, true),
        "Vector4" | "System.Numerics.Vector4" => (Float32, 4, true),
        "Quaternion" | "System.Numerics.Quaternion" => (Float32, 4, true),
        "Matrix4x4" | "System.Numerics.Matrix4x4" => (Float32, 16, true),
        _ => return None,
    };
    Some(Composite {
        element,
        count,
        blittable,
    })
}

/// Returns the wire operation for `name`, or `None` when the name refers to a
/// type that has its own codec.
pub fn wire_op(name: &str) -> Option<WireOp> {
    primitive(name)
        .map(Primitive::wire_op)
        .or_else(|| composite(name).map(Composite::wire_op))
}

pub fn is_blittable(name: &str) -> bool {
    wire_op(name).map_or(false, |op| op.blittable)
}
