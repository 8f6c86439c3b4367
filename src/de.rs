//! Deserializing CDR into dynamic values.

use std::marker::PhantomData;
use std::str;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::trace;

use crate::align::{padding, Representation};
use crate::encapsulation::{Header, ENCAPSULATION_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::schema::{CompiledType, FieldType, Member, Schema, StructType, TypeId, TypeKind};
use crate::size::{check_bound, check_depth, min_wire_size, Infinite, SizeLimit};
use crate::types::Primitive;
use crate::value::{StructValue, Value};

/// The extent of a DHEADER-delimited body being read.
pub(crate) struct Frame<'s> {
    end: usize,
    parent_end: usize,
    parent_owner: Option<&'s str>,
}

/// A deserializer that reads bytes from a buffer.
pub struct Deserializer<'a, 's, S, E> {
    bytes: &'a [u8],
    pub(crate) schema: &'s Schema,
    repr: Representation,
    origin: u64,
    pos: usize,
    end: usize,
    /// The type whose delimited body ends at `end`.
    owner: Option<&'s str>,
    high_water: usize,
    depth: usize,
    size_limit: S,
    phantom: PhantomData<E>,
}

impl<'a, 's, S, E> Deserializer<'a, 's, S, E>
where
    S: SizeLimit,
    E: ByteOrder,
{
    /// A deserializer over `bytes`, whose first byte sits `start_offset` bytes
    /// past the alignment origin.
    pub fn new(
        bytes: &'a [u8],
        schema: &'s Schema,
        repr: Representation,
        start_offset: u64,
        size_limit: S,
    ) -> Self {
        Self {
            bytes,
            schema,
            repr,
            origin: start_offset,
            pos: 0,
            end: bytes.len(),
            owner: None,
            high_water: 0,
            depth: 0,
            size_limit,
            phantom: PhantomData,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left before the end of the innermost delimited body.
    fn remaining(&self) -> usize {
        self.end.saturating_sub(self.pos)
    }

    /// Whether the innermost delimited body has been fully consumed.
    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    fn charge(&mut self) -> Result<()> {
        if self.pos > self.high_water {
            self.size_limit.add((self.pos - self.high_water) as u64)?;
            self.high_water = self.pos;
        }
        Ok(())
    }

    fn read_size(&mut self, field: &str, size: usize) -> Result<&'a [u8]> {
        if size > self.remaining() {
            return Err(self.short_read(field, size));
        }
        let bytes = self.bytes;
        let slice = &bytes[self.pos..self.pos + size];
        self.pos += size;
        self.charge()?;
        Ok(slice)
    }

    /// A read that does not fit overruns the delimited body when the buffer
    /// still holds the bytes, and is truncated otherwise.
    fn short_read(&self, field: &str, size: usize) -> Error {
        match self.owner {
            Some(type_name) if size <= self.bytes.len() - self.pos => Error::DelimiterOverrun {
                type_name: type_name.to_string(),
                end: self.end as u64,
                position: (self.pos + size) as u64,
            },
            _ => Error::Truncated {
                field: field.to_string(),
                offset: self.pos as u64,
                needed: size as u64,
                remaining: self.remaining() as u64,
            },
        }
    }

    fn read_padding(&mut self, field: &str, alignment: usize) -> Result<()> {
        let amt = padding(self.origin + self.pos as u64, alignment);
        self.read_size(field, amt).map(|_| ())
    }

    pub(crate) fn read_primitive(&mut self, field: &str, p: Primitive) -> Result<Value> {
        self.read_padding(field, self.repr.alignment_of(p.size()))?;
        let raw = self.read_size(field, p.size())?;
        decode::<E>(p, raw)
    }

    fn read_u32(&mut self, field: &str) -> Result<u32> {
        self.read_padding(field, self.repr.alignment_of(4))?;
        let raw = self.read_size(field, 4)?;
        Ok(E::read_u32(raw))
    }

    pub fn deserialize_value(&mut self, field: &str, ty: &FieldType) -> Result<Value> {
        match ty {
            &FieldType::Primitive(p) => self.read_primitive(field, p),
            FieldType::String { bound } => {
                let count = self.read_u32(field)? as usize;
                if count == 0 {
                    return Ok(Value::String(String::new()));
                }
                check_bound(field, count - 1, *bound)?;
                let raw = self.read_size(field, count)?;
                let raw = raw.strip_suffix(&[0u8]).unwrap_or(raw); // removes a terminating null character
                Ok(Value::String(str::from_utf8(raw)?.to_string()))
            }
            &FieldType::FixedString(len) => {
                let raw = self.read_size(field, len as usize)?;
                let raw = match raw.iter().position(|&b| b == 0) {
                    Some(nul) => &raw[..nul],
                    None => raw,
                };
                Ok(Value::String(str::from_utf8(raw)?.to_string()))
            }
            FieldType::Sequence { element, bound } => {
                let count = self.read_u32(field)? as usize;
                check_bound(field, count, *bound)?;
                self.check_count(field, element, count)?;
                self.read_elements(field, element, count)
            }
            FieldType::Array { element, length } => {
                self.read_elements(field, element, *length as usize)
            }
            &FieldType::Type(id) => self.deserialize_type(field, id),
        }
    }

    /// Rejects a sequence count the rest of the body cannot hold. Elements
    /// that take no wire bytes are counted as one byte each.
    fn check_count(&self, field: &str, element: &FieldType, count: usize) -> Result<()> {
        let each = min_wire_size(self.schema, element, self.repr).max(1);
        let needed = (count as u64).saturating_mul(each);
        let remaining = self.remaining() as u64;
        if needed > remaining {
            return Err(Error::Truncated {
                field: field.to_string(),
                offset: self.pos as u64,
                needed,
                remaining,
            });
        }
        Ok(())
    }

    fn read_elements(&mut self, field: &str, element: &FieldType, count: usize) -> Result<Value> {
        match element.blittable() {
            Some(p) if count > 0 => {
                self.read_padding(field, self.repr.alignment_of(p.size()))?;
                let total = count.checked_mul(p.size()).ok_or(Error::NumberOutOfRange)?;
                let raw = self.read_size(field, total)?;
                raw.chunks_exact(p.size())
                    .map(|b| decode::<E>(p, b))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Sequence)
            }
            _ => {
                let mut items = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    items.push(self.deserialize_value(field, element)?);
                }
                Ok(Value::Sequence(items))
            }
        }
    }

    pub fn deserialize_type(&mut self, field: &str, id: TypeId) -> Result<Value> {
        check_depth(field, self.depth)?;
        self.depth += 1;
        let value = self.read_type(field, id);
        self.depth -= 1;
        value
    }

    fn read_type(&mut self, field: &str, id: TypeId) -> Result<Value> {
        let schema = self.schema;
        let ty = schema.get(id);
        match &ty.kind {
            TypeKind::Struct(s) => self.deserialize_struct(ty, s),
            TypeKind::Union(u) => self.deserialize_union(ty, u),
            TypeKind::Enum(_) => match self.read_primitive(field, Primitive::Int32)? {
                Value::Int32(v) => Ok(Value::Enum(v)),
                v => Err(Error::mismatch(field, "long", v.kind_name())),
            },
        }
    }

    /// Reads the DHEADER of a delimited body and narrows the readable end.
    pub(crate) fn begin_delimited(&mut self, ty: &'s CompiledType) -> Result<Option<Frame<'s>>> {
        if !self.repr.is_delimited(ty.extensibility) {
            return Ok(None);
        }

        let len = self.read_u32(&ty.full_name)? as usize;
        let available = self.remaining();
        if len > available {
            return Err(Error::Truncated {
                field: ty.full_name.clone(),
                offset: self.pos as u64,
                needed: len as u64,
                remaining: available as u64,
            });
        }

        let frame = Frame {
            end: self.pos + len,
            parent_end: self.end,
            parent_owner: self.owner,
        };
        self.end = frame.end;
        self.owner = Some(ty.full_name.as_str());
        Ok(Some(frame))
    }

    /// Skips whatever the body holds past the known members.
    pub(crate) fn end_delimited(
        &mut self,
        ty: &CompiledType,
        frame: Option<Frame<'s>>,
    ) -> Result<()> {
        let frame = match frame {
            Some(frame) => frame,
            None => return Ok(()),
        };

        if self.pos > frame.end {
            return Err(Error::DelimiterOverrun {
                type_name: ty.full_name.clone(),
                end: frame.end as u64,
                position: self.pos as u64,
            });
        }
        if self.pos < frame.end {
            trace!(
                "[de] skipping {} unknown bytes at the end of `{}`",
                frame.end - self.pos,
                ty.full_name
            );
            self.pos = frame.end;
            self.charge()?;
        }
        self.end = frame.parent_end;
        self.owner = frame.parent_owner;
        Ok(())
    }

    fn deserialize_struct(&mut self, ty: &'s CompiledType, st: &StructType) -> Result<Value> {
        let frame = self.begin_delimited(ty)?;
        let mut value = StructValue::new();

        for member in st.wire_members() {
            if frame.is_some() && self.at_end() {
                if !member.optional {
                    value.insert(
                        member.name.clone(),
                        Value::default_for(self.schema, &member.ty),
                    );
                }
                continue;
            }

            if member.optional {
                if let Some(v) = self.read_optional(member)? {
                    value.insert(member.name.clone(), v);
                }
            } else {
                let v = self.deserialize_value(&member.name, &member.ty)?;
                value.insert(member.name.clone(), v);
            }
        }

        self.end_delimited(ty, frame)?;
        Ok(Value::Struct(value))
    }

    /// An optional member is present when an EMHEADER carrying its id follows
    /// and its value fills exactly the length the EMHEADER announces;
    /// otherwise the reader rewinds and the member stays absent.
    fn read_optional(&mut self, member: &Member) -> Result<Option<Value>> {
        let mark = self.pos;
        let header_at = mark + padding(self.origin + mark as u64, 4);

        if header_at + 4 <= self.end {
            let emheader = self.read_u32(&member.name)?;
            let len = (emheader >> 3) as usize;
            if emheader & 0x7 == member.id & 0x7 && len <= self.remaining() {
                let end = self.pos + len;
                if let Some(v) = self.read_member_body(member, end)? {
                    return Ok(Some(v));
                }
            }
        }

        self.pos = mark;
        trace!("[de] optional `{}` is absent at offset {}", member.name, mark);
        Ok(None)
    }

    /// Reads `member` with the readable end narrowed to `end`. A value that
    /// runs short of `end` or past it yields `None`.
    fn read_member_body(&mut self, member: &Member, end: usize) -> Result<Option<Value>> {
        let (outer_end, outer_owner) = (self.end, self.owner);
        self.end = end;
        let read = self.deserialize_value(&member.name, &member.ty);
        self.end = outer_end;
        self.owner = outer_owner;

        match read {
            Ok(v) if self.pos == end => Ok(Some(v)),
            Ok(_) | Err(Error::Truncated { .. } | Error::DelimiterOverrun { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn decode<E: ByteOrder>(p: Primitive, raw: &[u8]) -> Result<Value> {
    let v = match p {
        Primitive::Bool => match raw[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            v => return Err(Error::InvalidBoolEncoding(v)),
        },
        Primitive::Char => match raw[0] {
            c if c.is_ascii() => Value::Char(c as char),
            c => return Err(Error::InvalidCharEncoding(c)),
        },
        Primitive::Octet => Value::Octet(raw[0]),
        Primitive::Int8 => Value::Int8(raw[0] as i8),
        Primitive::Int16 => Value::Int16(E::read_i16(raw)),
        Primitive::UInt16 => Value::UInt16(E::read_u16(raw)),
        Primitive::Int32 => Value::Int32(E::read_i32(raw)),
        Primitive::UInt32 => Value::UInt32(E::read_u32(raw)),
        Primitive::Int64 => Value::Int64(E::read_i64(raw)),
        Primitive::UInt64 => Value::UInt64(E::read_u64(raw)),
        Primitive::Float32 => Value::Float32(E::read_f32(raw)),
        Primitive::Float64 => Value::Float64(E::read_f64(raw)),
    };
    Ok(v)
}

/// Deserializes a payload body. Returns the value and the number of bytes
/// consumed; bytes after the value are left untouched.
pub fn deserialize_data<E>(
    schema: &Schema,
    ty: TypeId,
    bytes: &[u8],
    start_offset: u64,
    repr: Representation,
) -> Result<(Value, usize)>
where
    E: ByteOrder,
{
    deserialize_data_from::<_, E>(schema, ty, bytes, start_offset, repr, Infinite)
}

pub fn deserialize_data_from<S, E>(
    schema: &Schema,
    ty: TypeId,
    bytes: &[u8],
    start_offset: u64,
    repr: Representation,
    size_limit: S,
) -> Result<(Value, usize)>
where
    S: SizeLimit,
    E: ByteOrder,
{
    let mut deserializer = Deserializer::<_, E>::new(bytes, schema, repr, start_offset, size_limit);
    let value = deserializer.deserialize_type("", ty)?;
    Ok((value, deserializer.position()))
}

/// Deserializes an encapsulated payload; byte order and representation come
/// from its header.
pub fn deserialize(schema: &Schema, ty: TypeId, bytes: &[u8]) -> Result<Value> {
    deserialize_from(schema, ty, bytes, Infinite)
}

pub fn deserialize_from<S>(
    schema: &Schema,
    ty: TypeId,
    bytes: &[u8],
    mut size_limit: S,
) -> Result<Value>
where
    S: SizeLimit,
{
    let header = Header::parse(bytes)?;
    size_limit.add(ENCAPSULATION_HEADER_SIZE)?;

    let body = &bytes[ENCAPSULATION_HEADER_SIZE as usize..];
    let (value, _) = if header.little_endian {
        deserialize_data_from::<_, LittleEndian>(schema, ty, body, 0, header.repr, size_limit)?
    } else {
        deserialize_data_from::<_, BigEndian>(schema, ty, body, 0, header.repr, size_limit)?
    };
    Ok(value)
}
