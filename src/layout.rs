//! Native C-ABI memory layout of compiled types.
//!
//! Offsets describe the `#[repr(C)]` image a foreign runtime uses for the
//! same type: strings and optional members are pointers, sequences are
//! `{ u32 maximum; u32 length; void *buffer; bool release }` and fixed strings
//! are inline byte arrays.

use std::collections::BTreeMap;
use std::mem;

use serde_derive::Serialize;

use crate::align::align_up;

const POINTER: usize = mem::size_of::<usize>();

/// Size and alignment of one native value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Extent {
    pub size: usize,
    pub alignment: usize,
}

impl Extent {
    pub const fn new(size: usize, alignment: usize) -> Self {
        Self { size, alignment }
    }

    pub const fn pointer() -> Self {
        Self::new(POINTER, POINTER)
    }

    /// The sequence header `{ u32, u32, void *, bool }`.
    pub fn sequence() -> Self {
        let buffer = align_up(8, POINTER) as usize;
        let release = buffer + POINTER;
        Self::new(align_up(release as u64 + 1, POINTER) as usize, POINTER)
    }

    pub fn array(element: Extent, length: u32) -> Self {
        Self::new(element.size * length as usize, element.alignment)
    }

    pub const fn enumeration() -> Self {
        Self::new(4, 4)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldLayout {
    pub name: String,
    pub offset: usize,
    pub size: usize,
    pub alignment: usize,
}

/// Gap bytes the compiler inserts between members or at the tail.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Padding {
    pub offset: usize,
    pub size: usize,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct NativeLayout {
    pub size: usize,
    pub alignment: usize,
    pub fields: Vec<FieldLayout>,
    pub padding: Vec<Padding>,
    /// Offset shared by every union arm; `None` for structs and enums.
    pub payload_offset: Option<usize>,
}

impl NativeLayout {
    pub fn extent(&self) -> Extent {
        Extent::new(self.size, self.alignment)
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn enumeration() -> Self {
        let extent = Extent::enumeration();
        NativeLayout {
            size: extent.size,
            alignment: extent.alignment,
            ..Default::default()
        }
    }

    /// Sequential placement in declaration order.
    pub fn structure<'a, I>(members: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Extent)>,
    {
        let mut layout = NativeLayout {
            alignment: 1,
            ..Default::default()
        };
        let mut cursor = 0;

        for (name, extent) in members {
            let offset = align_up(cursor as u64, extent.alignment) as usize;
            layout.gap(cursor, offset);
            layout.fields.push(FieldLayout {
                name: name.to_string(),
                offset,
                size: extent.size,
                alignment: extent.alignment,
            });
            layout.alignment = layout.alignment.max(extent.alignment);
            cursor = offset + extent.size;
        }

        layout.size = align_up(cursor as u64, layout.alignment) as usize;
        layout.gap(cursor, layout.size);
        layout
    }

    /// Discriminator at offset 0, every arm overlaid at the payload offset.
    pub fn union<'a, I>(discriminator: (&'a str, Extent), arms: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Extent)>,
    {
        let (disc_name, disc) = discriminator;
        let arms: Vec<_> = arms.into_iter().collect();
        let arm_alignment = arms.iter().map(|(_, e)| e.alignment).max().unwrap_or(1);
        let arm_size = arms.iter().map(|(_, e)| e.size).max().unwrap_or(0);
        let payload = align_up(disc.size as u64, arm_alignment) as usize;

        let mut layout = NativeLayout {
            alignment: disc.alignment.max(arm_alignment),
            payload_offset: Some(payload),
            ..Default::default()
        };
        layout.fields.push(FieldLayout {
            name: disc_name.to_string(),
            offset: 0,
            size: disc.size,
            alignment: disc.alignment,
        });
        layout.gap(disc.size, payload);
        for (name, extent) in arms {
            layout.fields.push(FieldLayout {
                name: name.to_string(),
                offset: payload,
                size: extent.size,
                alignment: extent.alignment,
            });
        }

        let end = payload + arm_size;
        layout.size = align_up(end as u64, layout.alignment) as usize;
        layout.gap(end, layout.size);
        layout
    }

    fn gap(&mut self, from: usize, to: usize) {
        if to > from {
            self.padding.push(Padding {
                offset: from,
                size: to - from,
            });
        }
    }
}

/// The layout summary handed across the bridge boundary.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BridgeLayout {
    pub type_name: String,
    pub total_size: usize,
    pub offsets: BTreeMap<String, usize>,
    pub keys: Vec<String>,
}

impl BridgeLayout {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
