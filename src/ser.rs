//! Serializing dynamic values into CDR.

use std::io::{self, Cursor, Write};
use std::marker::PhantomData;

use byteorder::{ByteOrder, WriteBytesExt};

use crate::align::{padding, Representation};
use crate::encapsulation::Encapsulation;
use crate::error::{Error, Result};
use crate::schema::{CompiledType, FieldType, Schema, StructType, TypeId, TypeKind};
use crate::size::{
    calc_serialized_size, calc_serialized_size_bounded, check_bound, check_depth, check_length,
    describe, Infinite, SizeLimit,
};
use crate::types::Primitive;
use crate::value::{StructValue, Value};

/// A byte sink that can rewrite bytes it has already emitted.
///
/// Length prefixes are written as placeholders and patched once the body
/// behind them is complete.
pub trait PatchWrite: Write {
    /// Overwrites `bytes` starting `back` bytes before the current position.
    fn patch(&mut self, back: u64, bytes: &[u8]) -> io::Result<()>;
}

fn patch_slice(buf: &mut [u8], head: u64, back: u64, bytes: &[u8]) -> io::Result<()> {
    let start = head
        .checked_sub(back)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "patch before start"))?
        as usize;
    buf.get_mut(start..start + bytes.len())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "patch past end"))?
        .copy_from_slice(bytes);
    Ok(())
}

impl PatchWrite for Vec<u8> {
    fn patch(&mut self, back: u64, bytes: &[u8]) -> io::Result<()> {
        let head = self.len() as u64;
        patch_slice(self, head, back, bytes)
    }
}

impl PatchWrite for Cursor<&mut [u8]> {
    fn patch(&mut self, back: u64, bytes: &[u8]) -> io::Result<()> {
        let head = self.position();
        patch_slice(self.get_mut(), head, back, bytes)
    }
}

impl PatchWrite for Cursor<Vec<u8>> {
    fn patch(&mut self, back: u64, bytes: &[u8]) -> io::Result<()> {
        let head = self.position();
        patch_slice(self.get_mut(), head, back, bytes)
    }
}

impl<W: PatchWrite + ?Sized> PatchWrite for &mut W {
    fn patch(&mut self, back: u64, bytes: &[u8]) -> io::Result<()> {
        (**self).patch(back, bytes)
    }
}

/// Bytes staged on the stack per bulk write of a blittable run.
const CHUNK: usize = 256;

pub struct Serializer<'s, W, E> {
    writer: W,
    pub(crate) schema: &'s Schema,
    repr: Representation,
    pos: u64,
    depth: usize,
    phantom: PhantomData<E>,
}

impl<'s, W, E> Serializer<'s, W, E>
where
    W: PatchWrite,
    E: ByteOrder,
{
    /// A serializer whose alignment origin lies `start_offset` bytes before
    /// the writer's current position.
    pub fn new(writer: W, schema: &'s Schema, repr: Representation, start_offset: u64) -> Self {
        Self {
            writer,
            schema,
            repr,
            pos: start_offset,
            depth: 0,
            phantom: PhantomData,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_padding(&mut self, alignment: usize) -> Result<()> {
        let amt = padding(self.pos, alignment);
        if amt > 0 {
            self.writer.write_all(&[0u8; 8][..amt])?;
            self.pos += amt as u64;
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    pub(crate) fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_padding(self.repr.alignment_of(4))?;
        self.writer.write_u32::<E>(v)?;
        self.pos += 4;
        Ok(())
    }

    fn write_usize_as_u32(&mut self, v: usize) -> Result<()> {
        let v = u32::try_from(v).map_err(|_| Error::NumberOutOfRange)?;
        self.write_u32(v)
    }

    /// Rewrites the placeholder that starts `back` bytes before the head.
    fn patch_u32(&mut self, back: u64, v: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        E::write_u32(&mut buf, v);
        self.writer.patch(back, &buf).map_err(Into::into)
    }

    pub(crate) fn write_primitive(&mut self, field: &str, p: Primitive, value: &Value) -> Result<()> {
        self.write_padding(self.repr.alignment_of(p.size()))?;
        let w = &mut self.writer;
        match (p, value) {
            (Primitive::Bool, &Value::Bool(v)) => w.write_u8(v as u8)?,
            (Primitive::Char, &Value::Char(v)) => {
                if !v.is_ascii() {
                    return Err(Error::InvalidChar(v));
                }
                w.write_u8(v as u8)?
            }
            (Primitive::Octet, &Value::Octet(v)) => w.write_u8(v)?,
            (Primitive::Int8, &Value::Int8(v)) => w.write_i8(v)?,
            (Primitive::Int16, &Value::Int16(v)) => w.write_i16::<E>(v)?,
            (Primitive::UInt16, &Value::UInt16(v)) => w.write_u16::<E>(v)?,
            (Primitive::Int32, &Value::Int32(v)) => w.write_i32::<E>(v)?,
            (Primitive::UInt32, &Value::UInt32(v)) => w.write_u32::<E>(v)?,
            (Primitive::Int64, &Value::Int64(v)) => w.write_i64::<E>(v)?,
            (Primitive::UInt64, &Value::UInt64(v)) => w.write_u64::<E>(v)?,
            (Primitive::Float32, &Value::Float32(v)) => w.write_f32::<E>(v)?,
            (Primitive::Float64, &Value::Float64(v)) => w.write_f64::<E>(v)?,
            (p, v) => return Err(Error::mismatch(field, p.idl_name(), v.kind_name())),
        }
        self.pos += p.size() as u64;
        Ok(())
    }

    pub fn serialize_value(&mut self, field: &str, ty: &FieldType, value: &Value) -> Result<()> {
        match (ty, value) {
            (&FieldType::Primitive(p), v) => self.write_primitive(field, p, v),
            (FieldType::String { bound }, Value::String(s)) => {
                check_bound(field, s.len(), *bound)?;
                self.write_usize_as_u32(s.len() + 1)?;
                self.write_bytes(s.as_bytes())?;
                self.write_bytes(&[0])
            }
            (&FieldType::FixedString(len), Value::String(s)) => {
                let len = len as usize;
                if s.len() > len {
                    return Err(Error::FixedStringOverflow {
                        field: field.to_string(),
                        capacity: len as u32,
                        found: s.len(),
                    });
                }
                self.write_bytes(s.as_bytes())?;
                let mut rest = len - s.len();
                while rest > 0 {
                    let n = rest.min(CHUNK);
                    self.write_bytes(&[0u8; CHUNK][..n])?;
                    rest -= n;
                }
                Ok(())
            }
            (FieldType::Sequence { element, bound }, Value::Sequence(items)) => {
                check_bound(field, items.len(), *bound)?;
                self.write_usize_as_u32(items.len())?;
                self.write_elements(field, element, items)
            }
            (FieldType::Array { element, length }, Value::Sequence(items)) => {
                check_length(field, items.len(), *length)?;
                self.write_elements(field, element, items)
            }
            (&FieldType::Type(id), v) => self.serialize_type(field, id, v),
            (ty, v) => Err(Error::mismatch(field, describe(self.schema, ty), v.kind_name())),
        }
    }

    fn write_elements(&mut self, field: &str, element: &FieldType, items: &[Value]) -> Result<()> {
        match element.blittable() {
            Some(p) if !items.is_empty() => self.write_blittable(field, p, items),
            _ => items
                .iter()
                .try_for_each(|item| self.serialize_value(field, element, item)),
        }
    }

    /// Encodes a run of fixed-width numbers through a stack buffer. Elements
    /// of one run are contiguous, so only the first one is padded.
    fn write_blittable(&mut self, field: &str, p: Primitive, items: &[Value]) -> Result<()> {
        self.write_padding(self.repr.alignment_of(p.size()))?;

        let size = p.size();
        let per_chunk = CHUNK / size;
        let mut buf = [0u8; CHUNK];
        for chunk in items.chunks(per_chunk) {
            for (item, out) in chunk.iter().zip(buf.chunks_exact_mut(size)) {
                match (p, item) {
                    (Primitive::Octet, &Value::Octet(v)) => out[0] = v,
                    (Primitive::Int8, &Value::Int8(v)) => out[0] = v as u8,
                    (Primitive::Int16, &Value::Int16(v)) => E::write_i16(out, v),
                    (Primitive::UInt16, &Value::UInt16(v)) => E::write_u16(out, v),
                    (Primitive::Int32, &Value::Int32(v)) => E::write_i32(out, v),
                    (Primitive::UInt32, &Value::UInt32(v)) => E::write_u32(out, v),
                    (Primitive::Int64, &Value::Int64(v)) => E::write_i64(out, v),
                    (Primitive::UInt64, &Value::UInt64(v)) => E::write_u64(out, v),
                    (Primitive::Float32, &Value::Float32(v)) => E::write_f32(out, v),
                    (Primitive::Float64, &Value::Float64(v)) => E::write_f64(out, v),
                    (p, v) => return Err(Error::mismatch(field, p.idl_name(), v.kind_name())),
                }
            }
            self.write_bytes(&buf[..chunk.len() * size])?;
        }
        Ok(())
    }

    pub fn serialize_type(&mut self, field: &str, id: TypeId, value: &Value) -> Result<()> {
        check_depth(field, self.depth)?;
        self.depth += 1;
        let result = self.write_type(field, id, value);
        self.depth -= 1;
        result
    }

    fn write_type(&mut self, field: &str, id: TypeId, value: &Value) -> Result<()> {
        let schema = self.schema;
        let ty = schema.get(id);
        match (&ty.kind, value) {
            (TypeKind::Struct(s), Value::Struct(v)) => self.serialize_struct(ty, s, v),
            (TypeKind::Union(u), Value::Union(v)) => self.serialize_union(ty, u, v),
            (TypeKind::Enum(_), &Value::Enum(v)) => {
                self.write_primitive(field, Primitive::Int32, &Value::Int32(v))
            }
            (_, v) => Err(Error::mismatch(field, ty.full_name.clone(), v.kind_name())),
        }
    }

    /// Opens a DHEADER for a delimited body and returns the body start.
    pub(crate) fn begin_delimited(&mut self, ty: &CompiledType) -> Result<Option<u64>> {
        if self.repr.is_delimited(ty.extensibility) {
            self.write_u32(0)?;
            Ok(Some(self.pos))
        } else {
            Ok(None)
        }
    }

    /// Patches the DHEADER opened at `start` with the body length.
    pub(crate) fn end_delimited(&mut self, start: Option<u64>) -> Result<()> {
        match start {
            Some(start) => {
                let len = u32::try_from(self.pos - start).map_err(|_| Error::NumberOutOfRange)?;
                self.patch_u32(self.pos - start + 4, len)
            }
            None => Ok(()),
        }
    }

    fn serialize_struct(&mut self, ty: &CompiledType, st: &StructType, value: &StructValue) -> Result<()> {
        let start = self.begin_delimited(ty)?;

        for member in st.wire_members() {
            match value.get(&member.name) {
                Some(v) if member.optional => {
                    self.write_u32(0)?;
                    let body = self.pos;
                    self.serialize_value(&member.name, &member.ty, v)?;
                    let len = self.pos - body;
                    if len >= 1 << 29 {
                        return Err(Error::NumberOutOfRange);
                    }
                    let emheader = ((len as u32) << 3) | (member.id & 0x7);
                    self.patch_u32(len + 4, emheader)?;
                }
                Some(v) => self.serialize_value(&member.name, &member.ty, v)?,
                None if member.optional => (),
                None => {
                    return Err(Error::MissingField {
                        type_name: ty.full_name.clone(),
                        field: member.name.clone(),
                    })
                }
            }
        }

        self.end_delimited(start)
    }
}

/// Writes the payload body of `value` into `writer`, aligned as if the body
/// began `start_offset` bytes earlier. Returns the number of bytes written.
pub fn serialize_data<W, E>(
    writer: W,
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    start_offset: u64,
    repr: Representation,
) -> Result<u64>
where
    W: PatchWrite,
    E: ByteOrder,
{
    let mut serializer = Serializer::<_, E>::new(writer, schema, repr, start_offset);
    serializer.serialize_type("", ty, value)?;
    Ok(serializer.pos - start_offset)
}

/// Serializes `value` behind an encapsulation header into an exactly sized buffer.
pub fn serialize<S, C>(
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    repr: Representation,
    size_limit: S,
) -> Result<Vec<u8>>
where
    S: SizeLimit,
    C: Encapsulation,
{
    let size = match size_limit.limit() {
        Some(limit) => calc_serialized_size_bounded(schema, ty, value, repr, limit)?,
        None => calc_serialized_size(schema, ty, value, repr)?,
    };
    let mut writer = Vec::with_capacity(size as usize);

    serialize_into::<_, _, C>(&mut writer, schema, ty, value, repr, Infinite)?;
    Ok(writer)
}

pub fn serialize_into<W, S, C>(
    writer: &mut W,
    schema: &Schema,
    ty: TypeId,
    value: &Value,
    repr: Representation,
    size_limit: S,
) -> Result<()>
where
    W: PatchWrite + ?Sized,
    S: SizeLimit,
    C: Encapsulation,
{
    if let Some(limit) = size_limit.limit() {
        calc_serialized_size_bounded(schema, ty, value, repr, limit)?;
    }

    let extensibility = schema.get(ty).extensibility;
    writer.write_all(&C::id(repr, extensibility))?;
    writer.write_all(&C::OPTION)?;
    serialize_data::<_, C::E>(writer, schema, ty, value, 0, repr)?;
    Ok(())
}
