//! The schema graph as supplied by discovery, before compilation.

use serde_derive::{Deserialize, Serialize};

use crate::error::SchemaError;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    #[default]
    Struct,
    Union,
    Enum,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extensibility {
    #[default]
    Final,
    Appendable,
    Mutable,
}

/// Field-level annotations.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Attributes {
    pub key: bool,
    pub optional: bool,
    /// Case labels selecting this union member.
    pub case: Vec<i64>,
    pub default_case: bool,
    pub discriminator: bool,
    /// Maximum element count of a sequence, or byte length of a string.
    pub bound: Option<u32>,
    /// Byte length of a fixed-size string.
    pub fixed_length: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub wire_type: String,
    /// Explicit member id; the declaration index when absent.
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, wire_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wire_type: wire_type.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn key(mut self) -> Self {
        self.attributes.key = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.attributes.optional = true;
        self
    }

    pub fn bound(mut self, bound: u32) -> Self {
        self.attributes.bound = Some(bound);
        self
    }

    pub fn fixed_length(mut self, len: u32) -> Self {
        self.attributes.fixed_length = Some(len);
        self
    }

    pub fn discriminator(mut self) -> Self {
        self.attributes.discriminator = true;
        self
    }

    pub fn case(mut self, labels: impl IntoIterator<Item = i64>) -> Self {
        self.attributes.case.extend(labels);
        self
    }

    pub fn default_case(mut self) -> Self {
        self.attributes.default_case = true;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    /// Explicit value; otherwise one past the previous member, starting at 0.
    #[serde(default)]
    pub value: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub kind: Kind,
    #[serde(default)]
    pub extensibility: Extensibility,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub enum_members: Vec<EnumMember>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, Kind::Struct)
    }

    pub fn union(name: impl Into<String>) -> Self {
        Self::new(name, Kind::Union)
    }

    pub fn enumeration<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut desc = Self::new(name, Kind::Enum);
        desc.enum_members = members
            .into_iter()
            .map(|name| EnumMember {
                name: name.into(),
                value: None,
            })
            .collect();
        desc
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn extensibility(mut self, extensibility: Extensibility) -> Self {
        self.extensibility = extensibility;
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// `Namespace.Name`, or just the name outside a namespace.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// A set of type descriptors compiled together.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSet {
    pub types: Vec<TypeDescriptor>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, desc: TypeDescriptor) -> Self {
        self.types.push(desc);
        self
    }

    /// Parses a JSON document of the form `{"types": [...]}`.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(text).map_err(|e| SchemaError::Document(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        serde_json::to_string_pretty(self).map_err(|e| SchemaError::Document(e.to_string()))
    }
}

impl FromIterator<TypeDescriptor> for SchemaSet {
    fn from_iter<I: IntoIterator<Item = TypeDescriptor>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().collect(),
        }
    }
}
