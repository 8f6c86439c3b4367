//! Parsing a field's type text into a container tree.
//!
//! Accepted spellings:
//!
//! * primitives and type references: `int32`, `unsigned long`, `Trading.Order`
//! * `string`, `string<N>`, `FixedStringN`, `fixed_string<N>`
//! * `sequence<T>`, `sequence<T, N>`, `BoundedSeq<T, N>`, `List<T>`
//! * `T[N]` for arrays
//! * `T?` and `optional<T>`

use super::model::Attributes;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WireType {
    /// A primitive or a reference to another type; resolved at compile time.
    Named(String),
    String { bound: Option<u32> },
    FixedString(u32),
    Sequence {
        element: Box<WireType>,
        bound: Option<u32>,
    },
    List(Box<WireType>),
    Array {
        element: Box<WireType>,
        length: u32,
    },
    Optional(Box<WireType>),
}

impl WireType {
    pub fn parse(text: &str) -> Result<WireType, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("empty type name".to_string());
        }

        if let Some(inner) = text.strip_suffix('?') {
            return Ok(WireType::Optional(Box::new(WireType::parse(inner)?)));
        }

        if text.ends_with(']') {
            let open = text
                .rfind('[')
                .ok_or_else(|| "unbalanced `]`".to_string())?;
            let length = parse_number(&text[open + 1..text.len() - 1])?;
            let element = WireType::parse(&text[..open])?;
            return Ok(WireType::Array {
                element: Box::new(element),
                length,
            });
        }

        if text.ends_with('>') {
            let open = text
                .find('<')
                .ok_or_else(|| "unbalanced `>`".to_string())?;
            let head = text[..open].trim();
            let args = split_top_level(&text[open + 1..text.len() - 1])?;
            return parse_generic(head, &args);
        }

        if text == "string" || text == "String" {
            return Ok(WireType::String { bound: None });
        }

        if let Some(len) = text.strip_prefix("FixedString") {
            return Ok(WireType::FixedString(parse_number(len)?));
        }

        if !text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == ' ')
        {
            return Err(format!("unexpected character in `{}`", text));
        }
        Ok(WireType::Named(text.to_string()))
    }

    /// Folds the `optional`, `bound` and `fixed_length` annotations into the
    /// parsed type. An explicit bound in the type text wins over the attribute.
    pub fn with_attributes(self, attributes: &Attributes) -> WireType {
        let ty = match self {
            WireType::Optional(inner) => {
                return WireType::Optional(Box::new(inner.with_attributes(&Attributes {
                    optional: false,
                    ..attributes.clone()
                })))
            }
            WireType::String { .. } if attributes.fixed_length.is_some() => {
                WireType::FixedString(attributes.fixed_length.unwrap_or_default())
            }
            WireType::String { bound: None } => WireType::String {
                bound: attributes.bound,
            },
            WireType::Sequence {
                element,
                bound: None,
            } => WireType::Sequence {
                element,
                bound: attributes.bound,
            },
            WireType::List(element) if attributes.bound.is_some() => WireType::Sequence {
                element,
                bound: attributes.bound,
            },
            ty => ty,
        };

        if attributes.optional {
            WireType::Optional(Box::new(ty))
        } else {
            ty
        }
    }
}

fn parse_generic(head: &str, args: &[&str]) -> Result<WireType, String> {
    let arity = |expected: &[usize]| {
        if expected.contains(&args.len()) {
            Ok(())
        } else {
            Err(format!(
                "`{}` takes {:?} type arguments, found {}",
                head,
                expected,
                args.len()
            ))
        }
    };

    match head {
        "optional" | "Optional" => {
            arity(&[1])?;
            Ok(WireType::Optional(Box::new(WireType::parse(args[0])?)))
        }
        "sequence" | "Sequence" | "BoundedSeq" | "bounded_sequence" => {
            arity(&[1, 2])?;
            let element = Box::new(WireType::parse(args[0])?);
            let bound = match args.get(1) {
                Some(n) => Some(parse_number(n)?),
                None => None,
            };
            Ok(WireType::Sequence { element, bound })
        }
        "List" | "list" => {
            arity(&[1])?;
            Ok(WireType::List(Box::new(WireType::parse(args[0])?)))
        }
        "string" | "String" => {
            arity(&[1])?;
            Ok(WireType::String {
                bound: Some(parse_number(args[0])?),
            })
        }
        "fixed_string" | "FixedString" => {
            arity(&[1])?;
            Ok(WireType::FixedString(parse_number(args[0])?))
        }
        _ => Err(format!("unknown generic type `{}`", head)),
    }
}

fn parse_number(text: &str) -> Result<u32, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("`{}` is not a valid length", text.trim()))
}

/// Splits generic arguments on commas that are not nested inside `<>` or `[]`.
fn split_top_level(text: &str) -> Result<Vec<&str>, String> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '<' | '[' => depth += 1,
            '>' | ']' => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("unbalanced brackets in `{}`", text));
                }
            }
            ',' if depth == 0 => {
                args.push(text[start..i].trim());
                start = i + 1;
            }
            _ => (),
        }
    }
    if depth != 0 {
        return Err(format!("unbalanced brackets in `{}`", text));
    }
    args.push(text[start..].trim());
    Ok(args)
}
