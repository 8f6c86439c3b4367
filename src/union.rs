//! Discriminated unions: the discriminator first, then only the selected arm.

use std::borrow::Cow;

use byteorder::ByteOrder;
use log::debug;

use crate::de::Deserializer;
use crate::error::{Error, Result};
use crate::schema::{CompiledType, FieldType, Member, Schema, UnionArm, UnionType};
use crate::ser::{PatchWrite, Serializer};
use crate::size::{SizeChecker, SizeLimit};
use crate::types::Primitive;
use crate::value::{UnionValue, Value};

impl UnionType {
    /// The arm labelled with `discriminator`, else the default arm. `None`
    /// means the union holds no arm, which is not an error.
    pub fn select(&self, discriminator: i64) -> Option<&UnionArm> {
        self.arms
            .iter()
            .find(|arm| arm.labels.contains(&discriminator))
            .or_else(|| self.arms.iter().find(|arm| arm.is_default))
    }
}

/// Converts a discriminator to the wire value of its declared type.
///
/// 64-bit unsigned discriminators carry the bits of the `i64`.
fn discriminator_value(member: &Member, discriminator: i64) -> Result<Value> {
    fn narrow<T: TryFrom<i64>>(v: i64) -> Result<T> {
        T::try_from(v).map_err(|_| Error::NumberOutOfRange)
    }

    let value = match member.ty {
        FieldType::Primitive(p) => match p {
            Primitive::Bool => match discriminator {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                _ => return Err(Error::NumberOutOfRange),
            },
            Primitive::Char => {
                let c = narrow::<u8>(discriminator)?;
                if !c.is_ascii() {
                    return Err(Error::NumberOutOfRange);
                }
                Value::Char(c as char)
            }
            Primitive::Octet => Value::Octet(narrow(discriminator)?),
            Primitive::Int8 => Value::Int8(narrow(discriminator)?),
            Primitive::Int16 => Value::Int16(narrow(discriminator)?),
            Primitive::UInt16 => Value::UInt16(narrow(discriminator)?),
            Primitive::Int32 => Value::Int32(narrow(discriminator)?),
            Primitive::UInt32 => Value::UInt32(narrow(discriminator)?),
            Primitive::Int64 => Value::Int64(discriminator),
            Primitive::UInt64 => Value::UInt64(discriminator as u64),
            Primitive::Float32 | Primitive::Float64 => {
                return Err(Error::mismatch(&member.name, "integral discriminator", p.idl_name()))
            }
        },
        FieldType::Type(_) => Value::Enum(narrow(discriminator)?),
        _ => {
            return Err(Error::mismatch(
                &member.name,
                "integral discriminator",
                "container",
            ))
        }
    };
    Ok(value)
}

/// The `i64` form of a discriminator read off the wire.
fn discriminator_of(value: &Value) -> Option<i64> {
    let v = match *value {
        Value::Bool(v) => v as i64,
        Value::Char(v) => v as i64,
        Value::Octet(v) => v as i64,
        Value::Int8(v) => v as i64,
        Value::Int16(v) => v as i64,
        Value::UInt16(v) => v as i64,
        Value::Int32(v) => v as i64,
        Value::UInt32(v) => v as i64,
        Value::Int64(v) => v,
        Value::UInt64(v) => v as i64,
        Value::Enum(v) => v as i64,
        _ => return None,
    };
    Some(v)
}

/// The member and value written after the discriminator, if any. A selected
/// arm without a value is written with its default.
fn active_arm<'u>(
    schema: &Schema,
    un: &'u UnionType,
    value: &'u UnionValue,
) -> Result<Option<(&'u Member, Cow<'u, Value>)>> {
    match (un.select(value.discriminator), &value.arm) {
        (Some(arm), Some((name, v))) if *name == arm.member.name => {
            Ok(Some((&arm.member, Cow::Borrowed(&**v))))
        }
        (Some(arm), Some((name, _))) => Err(Error::mismatch(
            name,
            format!("arm `{}`", arm.member.name),
            "another union arm",
        )),
        (Some(arm), None) => Ok(Some((
            &arm.member,
            Cow::Owned(Value::default_for(schema, &arm.member.ty)),
        ))),
        (None, Some((name, _))) => Err(Error::mismatch(
            name,
            format!("no arm for discriminator {}", value.discriminator),
            "union arm",
        )),
        (None, None) => Ok(None),
    }
}

impl<'s> SizeChecker<'s> {
    pub(crate) fn add_union(
        &mut self,
        ty: &CompiledType,
        un: &UnionType,
        value: &UnionValue,
    ) -> Result<()> {
        self.add_delimiter(ty)?;

        let disc = discriminator_value(&un.discriminator, value.discriminator)?;
        self.add_value(&un.discriminator.name, &un.discriminator.ty, &disc)?;
        if let Some((member, v)) = active_arm(self.schema, un, value)? {
            self.add_value(&member.name, &member.ty, &v)?;
        }
        Ok(())
    }
}

impl<'s, W, E> Serializer<'s, W, E>
where
    W: PatchWrite,
    E: ByteOrder,
{
    pub(crate) fn serialize_union(
        &mut self,
        ty: &CompiledType,
        un: &UnionType,
        value: &UnionValue,
    ) -> Result<()> {
        let start = self.begin_delimited(ty)?;

        let disc = discriminator_value(&un.discriminator, value.discriminator)?;
        self.serialize_value(&un.discriminator.name, &un.discriminator.ty, &disc)?;
        if let Some((member, v)) = active_arm(self.schema, un, value)? {
            self.serialize_value(&member.name, &member.ty, &v)?;
        }

        self.end_delimited(start)
    }
}

impl<'a, 's, S, E> Deserializer<'a, 's, S, E>
where
    S: SizeLimit,
    E: ByteOrder,
{
    pub(crate) fn deserialize_union(
        &mut self,
        ty: &'s CompiledType,
        un: &UnionType,
    ) -> Result<Value> {
        let frame = self.begin_delimited(ty)?;
        let delimited = frame.is_some();
        if delimited && self.at_end() {
            self.end_delimited(ty, frame)?;
            return Ok(Value::Union(UnionValue::empty(0)));
        }

        let disc_member = &un.discriminator;
        let disc = self.deserialize_value(&disc_member.name, &disc_member.ty)?;
        let discriminator = discriminator_of(&disc)
            .ok_or_else(|| Error::mismatch(&disc_member.name, "discriminator", disc.kind_name()))?;

        let arm = match un.select(discriminator) {
            Some(arm) if delimited && self.at_end() => Some((
                arm.member.name.clone(),
                Box::new(Value::default_for(self.schema, &arm.member.ty)),
            )),
            Some(arm) => {
                let v = self.deserialize_value(&arm.member.name, &arm.member.ty)?;
                Some((arm.member.name.clone(), Box::new(v)))
            }
            None => {
                debug!(
                    "[de] discriminator {} of `{}` selects no arm",
                    discriminator, ty.full_name
                );
                None
            }
        };

        self.end_delimited(ty, frame)?;
        Ok(Value::Union(UnionValue { discriminator, arm }))
    }
}
