//! Rendering a compiled schema as OMG IDL.

use std::fmt::Write;

use crate::schema::{
    CompiledType, EnumType, Extensibility, FieldType, Member, Schema, StructType, TypeId,
    TypeKind, UnionType,
};
use crate::types::Primitive;

const INDENT: &str = "    ";

/// Emits every type of `schema`, each after the types it references.
pub fn emit_idl(schema: &Schema) -> String {
    let mut out = String::new();
    let mut open: Vec<&str> = Vec::new();

    for id in emission_order(schema) {
        let ty = schema.get(id);
        let path: Vec<&str> = if ty.namespace.is_empty() {
            Vec::new()
        } else {
            ty.namespace.split('.').collect()
        };

        let common = open
            .iter()
            .zip(&path)
            .take_while(|(a, b)| a == b)
            .count();
        while open.len() > common {
            open.pop();
            let _ = writeln!(out, "{}}};", INDENT.repeat(open.len()));
        }
        for module in &path[common..] {
            let _ = writeln!(out, "{}module {} {{", INDENT.repeat(open.len()), module);
            open.push(module);
        }

        emit_type(&mut out, schema, ty, open.len());
    }

    while !open.is_empty() {
        open.pop();
        let _ = writeln!(out, "{}}};", INDENT.repeat(open.len()));
    }
    out
}

/// Depth-first over every reference, so a type follows what it names.
fn emission_order(schema: &Schema) -> Vec<TypeId> {
    fn refs(ty: &FieldType, out: &mut Vec<TypeId>) {
        match ty {
            FieldType::Type(id) => out.push(*id),
            FieldType::Sequence { element, .. } | FieldType::Array { element, .. } => {
                refs(element, out)
            }
            _ => (),
        }
    }

    fn visit(schema: &Schema, id: TypeId, seen: &mut [bool], order: &mut Vec<TypeId>) {
        if seen[id.index()] {
            return;
        }
        seen[id.index()] = true;

        let mut deps = Vec::new();
        match &schema.get(id).kind {
            TypeKind::Struct(s) => s.members().iter().for_each(|m| refs(&m.ty, &mut deps)),
            TypeKind::Union(u) => {
                refs(&u.discriminator.ty, &mut deps);
                u.arms.iter().for_each(|a| refs(&a.member.ty, &mut deps));
            }
            TypeKind::Enum(_) => (),
        }
        for dep in deps {
            visit(schema, dep, seen, order);
        }
        order.push(id);
    }

    let mut seen = vec![false; schema.len()];
    let mut order = Vec::with_capacity(schema.len());
    for (id, _) in schema.types() {
        visit(schema, id, &mut seen, &mut order);
    }
    order
}

fn emit_type(out: &mut String, schema: &Schema, ty: &CompiledType, depth: usize) {
    let pad = INDENT.repeat(depth);
    match &ty.kind {
        TypeKind::Struct(s) => {
            emit_extensibility(out, &pad, ty.extensibility);
            let _ = writeln!(out, "{}struct {} {{", pad, ty.name);
            emit_struct_members(out, schema, ty, s, depth + 1);
            let _ = writeln!(out, "{}}};", pad);
        }
        TypeKind::Union(u) => {
            emit_extensibility(out, &pad, ty.extensibility);
            let _ = writeln!(
                out,
                "{}union {} switch ({}) {{",
                pad,
                ty.name,
                type_name(schema, ty, &u.discriminator.ty)
            );
            emit_union_arms(out, schema, ty, u, depth + 1);
            let _ = writeln!(out, "{}}};", pad);
        }
        TypeKind::Enum(e) => {
            let _ = writeln!(out, "{}enum {} {{", pad, ty.name);
            emit_enumerators(out, e, depth + 1);
            let _ = writeln!(out, "{}}};", pad);
        }
    }
}

fn emit_extensibility(out: &mut String, pad: &str, extensibility: Extensibility) {
    let annotation = match extensibility {
        Extensibility::Final => "@final",
        Extensibility::Appendable => "@appendable",
        Extensibility::Mutable => "@mutable",
    };
    let _ = writeln!(out, "{}{}", pad, annotation);
}

fn emit_struct_members(
    out: &mut String,
    schema: &Schema,
    owner: &CompiledType,
    st: &StructType,
    depth: usize,
) {
    let pad = INDENT.repeat(depth);
    for (index, member) in st.members().iter().enumerate() {
        let mut annotations = String::new();
        if member.key {
            annotations.push_str("@key ");
        }
        if member.optional {
            annotations.push_str("@optional ");
        }
        if member.id as usize != index {
            let _ = write!(annotations, "@id({}) ", member.id);
        }
        let _ = writeln!(
            out,
            "{}{}{};",
            pad,
            annotations,
            declarator(schema, owner, member)
        );
    }
}

fn emit_union_arms(
    out: &mut String,
    schema: &Schema,
    owner: &CompiledType,
    un: &UnionType,
    depth: usize,
) {
    let pad = INDENT.repeat(depth);
    let enum_type = match un.discriminator.ty {
        FieldType::Type(id) => match &schema.get(id).kind {
            TypeKind::Enum(e) => Some(e),
            _ => None,
        },
        _ => None,
    };

    for arm in &un.arms {
        let mut labels = String::new();
        for &label in &arm.labels {
            let _ = write!(
                labels,
                "case {}: ",
                case_label(&un.discriminator.ty, enum_type, label)
            );
        }
        if arm.is_default {
            labels.push_str("default: ");
        }
        let _ = writeln!(
            out,
            "{}{}{};",
            pad,
            labels,
            declarator(schema, owner, &arm.member)
        );
    }
}

fn case_label(ty: &FieldType, enum_type: Option<&EnumType>, label: i64) -> String {
    let enumerator = enum_type.and_then(|e| i32::try_from(label).ok().and_then(|v| e.name_of(v)));
    if let Some(name) = enumerator {
        return name.to_string();
    }
    match ty {
        FieldType::Primitive(Primitive::Bool) => {
            if label == 0 {
                "FALSE".to_string()
            } else {
                "TRUE".to_string()
            }
        }
        FieldType::Primitive(Primitive::Char) => match u8::try_from(label) {
            Ok(c) if c.is_ascii_graphic() => format!("'{}'", c as char),
            _ => label.to_string(),
        },
        _ => label.to_string(),
    }
}

fn emit_enumerators(out: &mut String, e: &EnumType, depth: usize) {
    let pad = INDENT.repeat(depth);
    let mut next = 0i32;
    for (i, (name, value)) in e.members.iter().enumerate() {
        let separator = if i + 1 < e.members.len() { "," } else { "" };
        if *value == next {
            let _ = writeln!(out, "{}{}{}", pad, name, separator);
        } else {
            let _ = writeln!(out, "{}@value({}) {}{}", pad, value, name, separator);
        }
        next = value.wrapping_add(1);
    }
}

/// `type name` with array dimensions moved behind the name.
fn declarator(schema: &Schema, owner: &CompiledType, member: &Member) -> String {
    let mut ty = &member.ty;
    let mut dims = String::new();
    loop {
        match ty {
            FieldType::Array { element, length } => {
                let _ = write!(dims, "[{}]", length);
                ty = element;
            }
            FieldType::FixedString(len) => {
                let _ = write!(dims, "[{}]", len);
                return format!("char {}{}", member.name, dims);
            }
            _ => break,
        }
    }
    format!("{} {}{}", type_name(schema, owner, ty), member.name, dims)
}

fn type_name(schema: &Schema, owner: &CompiledType, ty: &FieldType) -> String {
    match ty {
        FieldType::Primitive(p) => p.idl_name().to_string(),
        FieldType::String { bound: None } => "string".to_string(),
        FieldType::String { bound: Some(n) } => format!("string<{}>", n),
        FieldType::FixedString(len) => format!("char[{}]", len),
        FieldType::Sequence { element, bound } => {
            let element = type_name(schema, owner, element);
            match bound {
                Some(n) => format!("sequence<{}, {}>", element, n),
                None => format!("sequence<{}>", element),
            }
        }
        FieldType::Array { element, length } => {
            format!("{}[{}]", type_name(schema, owner, element), length)
        }
        FieldType::Type(id) => {
            let target = schema.get(*id);
            if target.namespace == owner.namespace {
                target.name.clone()
            } else {
                format!("::{}", target.full_name.replace('.', "::"))
            }
        }
    }
}
