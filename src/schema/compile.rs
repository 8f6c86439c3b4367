//! Validating a `SchemaSet` and resolving it into a `Schema`.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;

use super::model::{Extensibility, FieldDescriptor, Kind, SchemaSet, TypeDescriptor};
use super::wire_type::WireType;
use crate::error::SchemaError;
use crate::layout::{BridgeLayout, Extent, NativeLayout};
use crate::types::{self, Composite, Primitive};

/// Index of a compiled type inside the `Schema` that produced it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TypeId(usize);

impl TypeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A member type with every reference resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldType {
    Primitive(Primitive),
    String {
        bound: Option<u32>,
    },
    FixedString(u32),
    /// Sequences and lists; `bound` is the maximum element count.
    Sequence {
        element: Box<FieldType>,
        bound: Option<u32>,
    },
    Array {
        element: Box<FieldType>,
        length: u32,
    },
    Type(TypeId),
}

impl FieldType {
    /// The element primitive when `self` can be moved as a raw memory run.
    pub fn blittable(&self) -> Option<Primitive> {
        match *self {
            FieldType::Primitive(p) if p.is_blittable() => Some(p),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Member {
    pub name: String,
    pub id: u32,
    pub ty: FieldType,
    pub optional: bool,
    pub key: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StructType {
    members: Vec<Member>,
    order: Vec<usize>,
}

impl StructType {
    /// Members in declaration order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Members in the order they appear on the wire, ascending by id.
    pub fn wire_members(&self) -> impl Iterator<Item = &Member> {
        self.order.iter().map(move |&i| &self.members[i])
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnionArm {
    pub member: Member,
    pub labels: Vec<i64>,
    pub is_default: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnionType {
    pub discriminator: Member,
    pub arms: Vec<UnionArm>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnumType {
    pub members: Vec<(String, i32)>,
}

impl EnumType {
    pub fn name_of(&self, value: i32) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }

    /// The value an enum field takes when it is not on the wire.
    pub fn default_value(&self) -> i32 {
        self.members.first().map_or(0, |(_, v)| *v)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeKind {
    Struct(StructType),
    Union(UnionType),
    Enum(EnumType),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompiledType {
    pub name: String,
    pub namespace: String,
    pub full_name: String,
    pub extensibility: Extensibility,
    pub kind: TypeKind,
    pub layout: NativeLayout,
}

/// The immutable dispatch table every codec pass runs against.
#[derive(Clone, Debug)]
pub struct Schema {
    types: Vec<CompiledType>,
    by_name: HashMap<String, TypeId>,
    by_simple_name: HashMap<String, Vec<TypeId>>,
}

impl Schema {
    pub fn compile(set: &SchemaSet) -> Result<Schema, SchemaError> {
        let compiler = Compiler::new(&set.types)?;
        let kinds = set
            .types
            .iter()
            .map(|desc| compiler.compile_kind(desc))
            .collect::<Result<Vec<_>, _>>()?;

        let order = dependency_order(&set.types, &kinds)?;
        let mut layouts: Vec<Option<NativeLayout>> = vec![None; kinds.len()];
        for &i in &order {
            let layout = native_layout(&kinds[i], &layouts);
            layouts[i] = Some(layout);
        }

        let types = set
            .types
            .iter()
            .zip(kinds)
            .zip(layouts)
            .map(|((desc, kind), layout)| CompiledType {
                name: desc.name.clone(),
                namespace: desc.namespace.clone(),
                full_name: desc.full_name(),
                extensibility: desc.extensibility,
                kind,
                layout: layout.unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        debug!("[schema] compiled {} types", types.len());
        Ok(Schema {
            types,
            by_name: compiler.by_name,
            by_simple_name: compiler.by_simple_name,
        })
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// # Panics
    ///
    /// When `id` was produced by a different `Schema`.
    pub fn get(&self, id: TypeId) -> &CompiledType {
        &self.types[id.0]
    }

    pub fn types(&self) -> impl Iterator<Item = (TypeId, &CompiledType)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i), t))
    }

    /// Looks a type up by its full name, or by its simple name when that is
    /// unambiguous.
    pub fn type_id(&self, name: &str) -> Result<TypeId, SchemaError> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        match self.by_simple_name.get(name).map(Vec::as_slice) {
            Some(&[id]) => Ok(id),
            _ => Err(SchemaError::UnknownType(name.to_string())),
        }
    }

    pub fn bridge_layout(&self, id: TypeId) -> BridgeLayout {
        let ty = self.get(id);
        let offsets = ty
            .layout
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.offset))
            .collect::<BTreeMap<_, _>>();
        let keys = match &ty.kind {
            TypeKind::Struct(s) => s
                .members()
                .iter()
                .filter(|m| m.key)
                .map(|m| m.name.clone())
                .collect(),
            _ => Vec::new(),
        };

        BridgeLayout {
            type_name: ty.full_name.clone(),
            total_size: ty.layout.size,
            offsets,
            keys,
        }
    }
}

impl SchemaSet {
    pub fn compile(&self) -> Result<Schema, SchemaError> {
        Schema::compile(self)
    }
}

struct Compiler<'a> {
    descs: &'a [TypeDescriptor],
    by_name: HashMap<String, TypeId>,
    by_simple_name: HashMap<String, Vec<TypeId>>,
}

impl<'a> Compiler<'a> {
    fn new(descs: &'a [TypeDescriptor]) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::new();
        let mut by_simple_name: HashMap<String, Vec<TypeId>> = HashMap::new();

        for (i, desc) in descs.iter().enumerate() {
            let full_name = desc.full_name();
            if by_name.insert(full_name.clone(), TypeId(i)).is_some() {
                return Err(SchemaError::DuplicateType(full_name));
            }
            by_simple_name
                .entry(desc.name.clone())
                .or_default()
                .push(TypeId(i));
        }

        Ok(Self {
            descs,
            by_name,
            by_simple_name,
        })
    }

    fn resolve(&self, owner: &TypeDescriptor, name: &str) -> Option<TypeId> {
        if !owner.namespace.is_empty() {
            let scoped = format!("{}.{}", owner.namespace, name);
            if let Some(&id) = self.by_name.get(&scoped) {
                return Some(id);
            }
        }
        if let Some(&id) = self.by_name.get(name) {
            return Some(id);
        }
        match self.by_simple_name.get(name).map(Vec::as_slice) {
            Some(&[id]) => Some(id),
            _ => None,
        }
    }

    fn compile_kind(&self, desc: &TypeDescriptor) -> Result<TypeKind, SchemaError> {
        match desc.kind {
            Kind::Struct => self.compile_struct(desc).map(TypeKind::Struct),
            Kind::Union => self.compile_union(desc).map(TypeKind::Union),
            Kind::Enum => compile_enum(desc).map(TypeKind::Enum),
        }
    }

    fn compile_struct(&self, desc: &TypeDescriptor) -> Result<StructType, SchemaError> {
        let mut ids = HashSet::new();
        let mut members = Vec::with_capacity(desc.fields.len());

        for (i, field) in desc.fields.iter().enumerate() {
            if field.attributes.discriminator {
                return Err(SchemaError::UnexpectedDiscriminator {
                    type_name: desc.full_name(),
                    field: field.name.clone(),
                });
            }
            let member = self.member(desc, i, field)?;
            if !ids.insert(member.id) {
                return Err(SchemaError::DuplicateFieldId {
                    type_name: desc.full_name(),
                    id: member.id,
                });
            }
            members.push(member);
        }

        let mut order: Vec<usize> = (0..members.len()).collect();
        order.sort_by_key(|&i| members[i].id);
        Ok(StructType { members, order })
    }

    fn compile_union(&self, desc: &TypeDescriptor) -> Result<UnionType, SchemaError> {
        let mut discriminators = desc
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.attributes.discriminator);
        let (disc_index, disc_field) = discriminators
            .next()
            .ok_or_else(|| SchemaError::MissingDiscriminator(desc.full_name()))?;
        if discriminators.next().is_some() {
            return Err(SchemaError::MultipleDiscriminators(desc.full_name()));
        }

        let discriminator = self.member(desc, disc_index, disc_field)?;
        if discriminator.optional || !self.is_discriminator_type(&discriminator.ty) {
            return Err(SchemaError::InvalidDiscriminatorType {
                type_name: desc.full_name(),
                field: disc_field.name.clone(),
                wire_type: disc_field.wire_type.clone(),
            });
        }

        let mut ids = HashSet::from([discriminator.id]);
        let mut labels = HashSet::new();
        let mut has_default = false;
        let mut arms = Vec::new();

        for (i, field) in desc.fields.iter().enumerate() {
            if i == disc_index {
                continue;
            }
            let member = self.member(desc, i, field)?;
            if member.optional {
                return Err(invalid_wire_type(
                    desc,
                    field,
                    "union members cannot be optional",
                ));
            }
            if !ids.insert(member.id) {
                return Err(SchemaError::DuplicateFieldId {
                    type_name: desc.full_name(),
                    id: member.id,
                });
            }

            let attrs = &field.attributes;
            if attrs.case.is_empty() && !attrs.default_case {
                return Err(SchemaError::UnlabeledUnionMember {
                    type_name: desc.full_name(),
                    field: field.name.clone(),
                });
            }
            for &value in &attrs.case {
                if !labels.insert(value) {
                    return Err(SchemaError::DuplicateCaseValue {
                        type_name: desc.full_name(),
                        value,
                    });
                }
            }
            if attrs.default_case {
                if has_default {
                    return Err(SchemaError::MultipleDefaultCases(desc.full_name()));
                }
                has_default = true;
            }

            arms.push(UnionArm {
                member,
                labels: attrs.case.clone(),
                is_default: attrs.default_case,
            });
        }

        Ok(UnionType {
            discriminator,
            arms,
        })
    }

    fn is_discriminator_type(&self, ty: &FieldType) -> bool {
        match *ty {
            FieldType::Primitive(p) => p.is_integral(),
            FieldType::Type(id) => self.descs[id.0].kind == Kind::Enum,
            _ => false,
        }
    }

    fn member(
        &self,
        owner: &TypeDescriptor,
        index: usize,
        field: &FieldDescriptor,
    ) -> Result<Member, SchemaError> {
        let wire = WireType::parse(&field.wire_type)
            .map_err(|reason| invalid_wire_type(owner, field, reason))?
            .with_attributes(&field.attributes);
        let (optional, wire) = match wire {
            WireType::Optional(inner) => (true, *inner),
            wire => (false, wire),
        };

        Ok(Member {
            name: field.name.clone(),
            id: field.id.unwrap_or(index as u32),
            ty: self.field_type(owner, field, &wire)?,
            optional,
            key: field.attributes.key,
        })
    }

    fn field_type(
        &self,
        owner: &TypeDescriptor,
        field: &FieldDescriptor,
        wire: &WireType,
    ) -> Result<FieldType, SchemaError> {
        let ty = match wire {
            WireType::Named(name) => {
                if let Some(p) = types::primitive(name) {
                    FieldType::Primitive(p)
                } else if let Some(id) = self.resolve(owner, name) {
                    FieldType::Type(id)
                } else if let Some(c) = types::composite(name) {
                    composite_type(c)
                } else {
                    return Err(SchemaError::UnresolvedType {
                        type_name: owner.full_name(),
                        field: field.name.clone(),
                        wire_type: name.clone(),
                    });
                }
            }
            WireType::String { bound } => FieldType::String { bound: *bound },
            WireType::FixedString(len) => FieldType::FixedString(*len),
            WireType::Sequence { element, bound } => FieldType::Sequence {
                element: Box::new(self.field_type(owner, field, element)?),
                bound: *bound,
            },
            WireType::List(element) => FieldType::Sequence {
                element: Box::new(self.field_type(owner, field, element)?),
                bound: None,
            },
            WireType::Array { length: 0, .. } => {
                return Err(invalid_wire_type(owner, field, "array length must be positive"))
            }
            WireType::Array { element, length } => FieldType::Array {
                element: Box::new(self.field_type(owner, field, element)?),
                length: *length,
            },
            WireType::Optional(_) => {
                return Err(invalid_wire_type(
                    owner,
                    field,
                    "optional is only allowed on a member",
                ))
            }
        };
        Ok(ty)
    }
}

/// A managed value type is its element, or an array of it. Declared types
/// of the same name take precedence.
fn composite_type(c: Composite) -> FieldType {
    let element = FieldType::Primitive(c.element);
    match c.count {
        1 => element,
        length => FieldType::Array {
            element: Box::new(element),
            length,
        },
    }
}

fn compile_enum(desc: &TypeDescriptor) -> Result<EnumType, SchemaError> {
    let mut seen = HashSet::new();
    let mut next = 0i32;
    let mut members = Vec::with_capacity(desc.enum_members.len());

    for m in &desc.enum_members {
        let value = m.value.unwrap_or(next);
        if !seen.insert(value) {
            return Err(SchemaError::DuplicateEnumValue {
                type_name: desc.full_name(),
                value,
            });
        }
        members.push((m.name.clone(), value));
        next = value.wrapping_add(1);
    }
    Ok(EnumType { members })
}

fn invalid_wire_type(
    owner: &TypeDescriptor,
    field: &FieldDescriptor,
    reason: impl Into<String>,
) -> SchemaError {
    SchemaError::InvalidWireType {
        type_name: owner.full_name(),
        field: field.name.clone(),
        wire_type: field.wire_type.clone(),
        reason: reason.into(),
    }
}

/// Types a value of `kind` embeds by value. References through sequences,
/// strings and optional members are heap indirections and break cycles.
fn inline_dependencies(kind: &TypeKind) -> Vec<TypeId> {
    fn walk(ty: &FieldType, out: &mut Vec<TypeId>) {
        match ty {
            FieldType::Type(id) => out.push(*id),
            FieldType::Array { element, .. } => walk(element, out),
            _ => (),
        }
    }

    let mut out = Vec::new();
    match kind {
        TypeKind::Struct(s) => s
            .members()
            .iter()
            .filter(|m| !m.optional)
            .for_each(|m| walk(&m.ty, &mut out)),
        TypeKind::Union(u) => {
            walk(&u.discriminator.ty, &mut out);
            u.arms.iter().for_each(|a| walk(&a.member.ty, &mut out));
        }
        TypeKind::Enum(_) => (),
    }
    out
}

/// Post-order over inline dependencies; every type follows the types it embeds.
fn dependency_order(
    descs: &[TypeDescriptor],
    kinds: &[TypeKind],
) -> Result<Vec<usize>, SchemaError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Visiting,
        Done,
    }

    fn visit(
        i: usize,
        deps: &[Vec<TypeId>],
        marks: &mut [Mark],
        order: &mut Vec<usize>,
        descs: &[TypeDescriptor],
    ) -> Result<(), SchemaError> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::Visiting => return Err(SchemaError::CircularDependency(descs[i].full_name())),
            Mark::New => (),
        }
        marks[i] = Mark::Visiting;
        for dep in &deps[i] {
            visit(dep.0, deps, marks, order, descs)?;
        }
        marks[i] = Mark::Done;
        order.push(i);
        Ok(())
    }

    let deps: Vec<_> = kinds.iter().map(inline_dependencies).collect();
    let mut marks = vec![Mark::New; kinds.len()];
    let mut order = Vec::with_capacity(kinds.len());
    for i in 0..kinds.len() {
        visit(i, &deps, &mut marks, &mut order, descs)?;
    }
    Ok(order)
}

fn extent_of(ty: &FieldType, layouts: &[Option<NativeLayout>]) -> Extent {
    match ty {
        FieldType::Primitive(p) => Extent::new(p.size(), p.size()),
        FieldType::String { .. } => Extent::pointer(),
        FieldType::FixedString(len) => Extent::new(*len as usize, 1),
        FieldType::Sequence { .. } => Extent::sequence(),
        FieldType::Array { element, length } => Extent::array(extent_of(element, layouts), *length),
        FieldType::Type(id) => layouts[id.0]
            .as_ref()
            .map_or(Extent::new(0, 1), NativeLayout::extent),
    }
}

fn member_extent(member: &Member, layouts: &[Option<NativeLayout>]) -> Extent {
    if member.optional {
        Extent::pointer()
    } else {
        extent_of(&member.ty, layouts)
    }
}

fn native_layout(kind: &TypeKind, layouts: &[Option<NativeLayout>]) -> NativeLayout {
    match kind {
        TypeKind::Struct(s) => NativeLayout::structure(
            s.members()
                .iter()
                .map(|m| (m.name.as_str(), member_extent(m, layouts))),
        ),
        TypeKind::Union(u) => NativeLayout::union(
            (
                u.discriminator.name.as_str(),
                member_extent(&u.discriminator, layouts),
            ),
            u.arms
                .iter()
                .map(|a| (a.member.name.as_str(), member_extent(&a.member, layouts))),
        ),
        TypeKind::Enum(_) => NativeLayout::enumeration(),
    }
}
