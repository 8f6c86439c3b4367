//! Measuring the size of serialized data.

use crate::align::{padding, Representation};
use crate::encapsulation::ENCAPSULATION_HEADER_SIZE;
use crate::error::{Error, Result};
use crate::schema::{CompiledType, FieldType, Schema, StructType, TypeId, TypeKind};
use crate::types::Primitive;
use crate::value::{StructValue, Value};

/// Limits the number of bytes a (de)serialization may touch.
pub trait SizeLimit {
    fn add(&mut self, n: u64) -> Result<()>;
    fn limit(&self) -> Option<u64>;
}

/// A `SizeLimit` that fails once `n` bytes have been charged.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Bounded(pub u64);

impl SizeLimit for Bounded {
    #[inline]
    fn add(&mut self, n: u64) -> Result<()> {
        if self.0 >= n {
            self.0 -= n;
            Ok(())
        } else {
            Err(Error::SizeLimit)
        }
    }

    #[inline]
    fn limit(&self) -> Option<u64> {
        Some(self.0)
    }
}

/// A `SizeLimit` without a limit.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Infinite;

impl SizeLimit for Infinite {
    #[inline]
    fn add(&mut self, _: u64) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn limit(&self) -> Option<u64> {
        None
    }
}

/// How many struct, union and enum values deep a size, write or read pass
/// may descend before it fails with `Error::DepthExceeded`.
pub const MAX_DEPTH: usize = 100;

pub(crate) fn check_depth(field: &str, depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        Err(Error::DepthExceeded {
            field: field.to_string(),
            limit: MAX_DEPTH,
        })
    } else {
        Ok(())
    }
}

/// A virtual write cursor that only counts bytes.
pub(crate) struct SizeChecker<'s> {
    pub(crate) schema: &'s Schema,
    pub(crate) repr: Representation,
    pos: u64,
    total: u64,
    limit: Option<u64>,
    depth: usize,
}

impl<'s> SizeChecker<'s> {
    pub(crate) fn new(
        schema: &'s Schema,
        repr: Representation,
        start_offset: u64,
        limit: Option<u64>,
    ) -> Self {
        Self {
            schema,
            repr,
            pos: start_offset,
            total: 0,
            limit,
            depth: 0,
        }
    }

    pub(crate) fn add_padding(&mut self, alignment: usize) -> Result<()> {
        let amt = padding(self.pos, alignment);
        self.add_size(amt as u64)
    }

    pub(crate) fn add_size(&mut self, size: u64) -> Result<()> {
        self.pos += size;
        if let Some(limit) = self.limit {
            if self.total + size > limit {
                return Err(Error::SizeLimit);
            }
        }

        self.total += size;

        Ok(())
    }

    pub(crate) fn add_primitive(&mut self, p: Primitive) -> Result<()> {
        self.add_padding(self.repr.alignment_of(p.size()))?;
        self.add_size(p.size() as u64)
    }

    fn add_u32(&mut self) -> Result<()> {
        self.add_primitive(Primitive::UInt32)
    }

    /// Reserves the DHEADER of an appendable or mutable body.
    pub(crate) fn add_delimiter(&mut self, ty: &CompiledType) -> Result<()> {
        if self.repr.is_delimited(ty.extensibility) {
            self.add_u32()?;
        }
        Ok(())
    }

    pub(crate) fn add_value(&mut self, field: &str, ty: &FieldType, value: &Value) -> Result<()> {
        match (ty, value) {
            (&FieldType::Primitive(p), v) if v.primitive() == Some(p) => self.add_primitive(p),
            (FieldType::String { bound }, Value::String(s)) => {
                check_bound(field, s.len(), *bound)?;
                self.add_u32()?;
                self.add_size(s.len() as u64 + 1) // adds the length 1 of a terminating character
            }
            (&FieldType::FixedString(len), Value::String(s)) => {
                if s.len() > len as usize {
                    return Err(Error::FixedStringOverflow {
                        field: field.to_string(),
                        capacity: len,
                        found: s.len(),
                    });
                }
                self.add_size(u64::from(len))
            }
            (FieldType::Sequence { element, bound }, Value::Sequence(items)) => {
                check_bound(field, items.len(), *bound)?;
                self.add_u32()?;
                self.add_elements(field, element, items)
            }
            (FieldType::Array { element, length }, Value::Sequence(items)) => {
                check_length(field, items.len(), *length)?;
                self.add_elements(field, element, items)
            }
            (&FieldType::Type(id), v) => self.add_type(field, id, v),
            (ty, v) => Err(Error::mismatch(field, describe(self.schema, ty), v.kind_name())),
        }
    }

    fn add_elements(&mut self, field: &str, element: &FieldType, items: &[Value]) -> Result<()> {
        match element.blittable() {
            Some(p) if !items.is_empty() => {
                if let Some(v) = items.iter().find(|v| v.primitive() != Some(p)) {
                    return Err(Error::mismatch(field, p.idl_name(), v.kind_name()));
                }
                self.add_padding(self.repr.alignment_of(p.size()))?;
                self.add_size((p.size() * items.len()) as u64)
            }
            _ => items
                .iter()
                .try_for_each(|item| self.add_value(field, element, item)),
        }
    }

    fn add_type(&mut self, field: &str, id: TypeId, value: &Value) -> Result<()> {
        check_depth(field, self.depth)?;
        self.depth += 1;
        let result = self.add_type_body(field, id, value);
        self.depth -= 1;
        result
    }

    fn add_type_body(&mut self, field: &str, id: TypeId, value: &Value) -> Result<()> {
        let schema = self.schema;
        let ty = schema.get(id);
        match (&ty.kind, value) {
            (TypeKind::Struct(s), Value::Struct(v)) => self.add_struct(ty, s, v),
            (TypeKind::Union(u), Value::Union(v)) => self.add_union(ty, u, v),
            (TypeKind::Enum(_), Value::Enum(_)) => self.add_primitive(Primitive::Int32),
            (_, v) => Err(Error::mismatch(field, ty.full_name.clone(), v.kind_name())),
        }
    }

    fn add_struct(
        &mut self,
        ty: &CompiledType,
        st: &StructType,
        value: &StructValue,
    ) -> Result<()> {
        self.add_delimiter(ty)?;

        for member in st.wire_members() {
            match value.get(&member.name) {
                Some(v) if member.optional => {
                    // EMHEADER
                    self.add_padding(4)?;
                    self.add_size(4)?;
                    self.add_value(&member.name, &member.ty, v)?;
                }
                Some(v) => self.add_value(&member.name, &member.ty, v)?,
                None if member.optional => (),
                None => {
                    return Err(Error::MissingField {
                        type_name: ty.full_name.clone(),
                        field: member.name.clone(),
                    })
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn check_bound(field: &str, count: usize, bound: Option<u32>) -> Result<()> {
    match bound {
        Some(bound) if count > bound as usize => Err(Error::BoundExceeded {
            field: field.to_string(),
            count: count as u64,
            bound,
        }),
        _ => Ok(()),
    }
}

pub(crate) fn check_length(field: &str, found: usize, expected: u32) -> Result<()> {
    if found == expected as usize {
        Ok(())
    } else {
        Err(Error::ArrayLength {
            field: field.to_string(),
            expected,
            found,
        })
    }
}

/// The fewest bytes a value of `ty` occupies on the wire, padding aside.
///
/// Optional members and union arms may be absent and count as nothing. A
/// delimited body may stop right after its DHEADER.
pub(crate) fn min_wire_size(schema: &Schema, ty: &FieldType, repr: Representation) -> u64 {
    match ty {
        FieldType::Primitive(p) => p.size() as u64,
        FieldType::String { .. } | FieldType::Sequence { .. } => 4,
        FieldType::FixedString(len) => u64::from(*len),
        FieldType::Array { element, length } => {
            min_wire_size(schema, element, repr).saturating_mul(u64::from(*length))
        }
        FieldType::Type(id) => {
            let ty = schema.get(*id);
            if repr.is_delimited(ty.extensibility) {
                return 4;
            }
            match &ty.kind {
                TypeKind::Struct(s) => s
                    .members()
                    .iter()
                    .filter(|m| !m.optional)
                    .map(|m| min_wire_size(schema, &m.ty, repr))
                    .fold(0, u64::saturating_add),
                TypeKind::Union(u) => min_wire_size(schema, &u.discriminator.ty, repr),
                TypeKind::Enum(_) => 4,
            }
        }
    }
}

/// Human-readable name of a member type for error messages.
pub(crate) fn describe(schema: &Schema, ty: &FieldType) -> String {
    match ty {
        FieldType::Primitive(p) => p.idl_name().to_string(),
        FieldType::String { .. } | FieldType::FixedString(_) => "string".to_string(),
        FieldType::Sequence { .. } | FieldType::Array { .. } => "sequence".to_string(),
        FieldType::Type(id) => schema.get(*id).full_name.clone(),
    }
}

/// Returns the number of bytes `value` occupies when written at `start_offset`
/// of a payload body.
pub fn compute_size(
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    start_offset: u64,
    repr: Representation,
) -> Result<u64> {
    let mut checker = SizeChecker::new(schema, repr, start_offset, None);
    checker.add_type("", ty, value)?;
    Ok(checker.total)
}

/// Returns the size of `value` behind an encapsulation header.
pub fn calc_serialized_size(
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    repr: Representation,
) -> Result<u64> {
    let body = compute_size(schema, ty, value, 0, repr)?;
    Ok(ENCAPSULATION_HEADER_SIZE + body)
}

/// Given a maximum size limit, check how large an object would be if it were
/// to be serialized.
pub fn calc_serialized_size_bounded(
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    repr: Representation,
    max: u64,
) -> Result<u64> {
    if max < ENCAPSULATION_HEADER_SIZE {
        return Err(Error::SizeLimit);
    }
    let mut checker = SizeChecker::new(schema, repr, 0, Some(max - ENCAPSULATION_HEADER_SIZE));
    checker.add_type("", ty, value)?;
    Ok(ENCAPSULATION_HEADER_SIZE + checker.total)
}
