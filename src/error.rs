use std::{io, str::Utf8Error};

use thiserror::Error;

/// Convenient wrapper around `std::Result`.
pub type Result<T> = std::result::Result<T, Error>;

/// The Error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("expected 0 or 1, found {0}")]
    InvalidBoolEncoding(u8),
    #[error("expected char of width 1, found {0}")]
    InvalidChar(char),
    #[error("char is not valid ASCII, found {0:#04x}")]
    InvalidCharEncoding(u8),
    #[error("encapsulation {0:02x?} is not valid")]
    InvalidEncapsulation([u8; 2]),
    #[error(transparent)]
    InvalidUtf8Encoding(#[from] Utf8Error),
    #[error("number is out of range")]
    NumberOutOfRange,
    #[error("the size limit has been reached")]
    SizeLimit,
    #[error("truncated buffer: `{field}` needs {needed} bytes at offset {offset}, {remaining} remaining")]
    Truncated {
        field: String,
        offset: u64,
        needed: u64,
        remaining: u64,
    },
    #[error("`{field}` holds {count} elements, exceeding its bound of {bound}")]
    BoundExceeded {
        field: String,
        count: u64,
        bound: u32,
    },
    #[error("`{type_name}` body ends at {end} but reading reached {position}")]
    DelimiterOverrun {
        type_name: String,
        end: u64,
        position: u64,
    },
    #[error("`{field}` nests more than {limit} types deep")]
    DepthExceeded { field: String, limit: usize },
    #[error("missing field `{field}` in `{type_name}`")]
    MissingField { type_name: String, field: String },
    #[error("`{field}` expects {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: &'static str,
    },
    #[error("array `{field}` expects {expected} elements, found {found}")]
    ArrayLength {
        field: String,
        expected: u32,
        found: usize,
    },
    #[error("fixed string `{field}` holds at most {capacity} bytes, found {found}")]
    FixedStringOverflow {
        field: String,
        capacity: u32,
        found: usize,
    },
}

impl Error {
    pub(crate) fn mismatch(field: &str, expected: impl Into<String>, found: &'static str) -> Self {
        Error::TypeMismatch {
            field: field.to_string(),
            expected: expected.into(),
            found,
        }
    }
}

/// Problems found while compiling a schema, before any instance is touched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("type `{0}` is declared more than once")]
    DuplicateType(String),
    #[error("unknown type `{0}`")]
    UnknownType(String),
    #[error("union `{0}` has no discriminator")]
    MissingDiscriminator(String),
    #[error("union `{0}` declares more than one discriminator")]
    MultipleDiscriminators(String),
    #[error("`{type_name}.{field}` is a discriminator outside of a union")]
    UnexpectedDiscriminator { type_name: String, field: String },
    #[error("discriminator `{type_name}.{field}` has unsupported type `{wire_type}`")]
    InvalidDiscriminatorType {
        type_name: String,
        field: String,
        wire_type: String,
    },
    #[error("duplicate case value {value} in union `{type_name}`")]
    DuplicateCaseValue { type_name: String, value: i64 },
    #[error("union `{0}` declares more than one default case")]
    MultipleDefaultCases(String),
    #[error("union member `{type_name}.{field}` has neither a case value nor the default case")]
    UnlabeledUnionMember { type_name: String, field: String },
    #[error("field id {id} is used more than once in `{type_name}`")]
    DuplicateFieldId { type_name: String, id: u32 },
    #[error("enum `{type_name}` assigns value {value} more than once")]
    DuplicateEnumValue { type_name: String, value: i32 },
    #[error("`{type_name}.{field}` uses `{wire_type}`, which is not a known type")]
    UnresolvedType {
        type_name: String,
        field: String,
        wire_type: String,
    },
    #[error("`{type_name}.{field}` has invalid type `{wire_type}`: {reason}")]
    InvalidWireType {
        type_name: String,
        field: String,
        wire_type: String,
        reason: String,
    },
    #[error("circular dependency detected in `{0}`")]
    CircularDependency(String),
    #[error("invalid schema document: {0}")]
    Document(String),
}
