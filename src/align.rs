//! Alignment arithmetic shared by the wire passes and the native layout.

use serde_derive::{Deserialize, Serialize};

use crate::schema::Extensibility;

/// The data representation a payload is encoded with.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Representation {
    /// Classic CDR: scalars align to their width, no length delimiters.
    Xcdr1,
    /// Extended CDR version 2: alignment capped at 4, DHEADER framing for
    /// appendable and mutable types.
    #[default]
    Xcdr2,
}

impl Representation {
    /// Maximum alignment any scalar is padded to.
    pub fn max_alignment(self) -> usize {
        match self {
            Representation::Xcdr1 => 8,
            Representation::Xcdr2 => 4,
        }
    }

    /// Whether a body of the given extensibility carries a DHEADER.
    pub fn is_delimited(self, extensibility: Extensibility) -> bool {
        self == Representation::Xcdr2 && extensibility != Extensibility::Final
    }

    /// Wire alignment of a scalar of width `width`.
    #[inline]
    pub fn alignment_of(self, width: usize) -> usize {
        width.clamp(1, self.max_alignment())
    }
}

/// Rounds `pos` up to the next multiple of `alignment` (a power of two).
#[inline]
pub fn align_up(pos: u64, alignment: usize) -> u64 {
    let mask = alignment as u64 - 1;
    (pos + mask) & !mask
}

/// Padding bytes needed to move `pos` onto an `alignment` boundary.
#[inline]
pub fn padding(pos: u64, alignment: usize) -> usize {
    // Bit masking instead of the slower modulo; alignment is 1, 2, 4 or 8.
    let rem_mask = alignment - 1;
    match (pos as usize) & rem_mask {
        0 => 0,
        n => alignment - n,
    }
}
