use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::align::Representation;
use crate::error::{Error, Result};
use crate::schema::Extensibility;

pub const ENCAPSULATION_HEADER_SIZE: u64 = 4;

const CDR: u8 = 0x00;
const CDR2: u8 = 0x06;
const D_CDR2: u8 = 0x08;

/// Data encapsulation scheme identifiers.
pub trait Encapsulation {
    type E: ByteOrder;
    const LITTLE_ENDIAN: bool;
    const OPTION: [u8; 2] = [0; 2];

    /// The representation identifier for a top-level type of the given
    /// extensibility.
    fn id(repr: Representation, extensibility: Extensibility) -> [u8; 2] {
        let scheme = match repr {
            Representation::Xcdr1 => CDR,
            Representation::Xcdr2 if repr.is_delimited(extensibility) => D_CDR2,
            Representation::Xcdr2 => CDR2,
        };
        [0, scheme | Self::LITTLE_ENDIAN as u8]
    }
}

/// OMG CDR big-endian encapsulation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CdrBe {}

impl Encapsulation for CdrBe {
    type E = BigEndian;
    const LITTLE_ENDIAN: bool = false;
}

/// OMG CDR little-endian encapsulation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CdrLe {}

impl Encapsulation for CdrLe {
    type E = LittleEndian;
    const LITTLE_ENDIAN: bool = true;
}

/// What the 4-byte encapsulation header says about the payload behind it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Header {
    pub repr: Representation,
    pub little_endian: bool,
    pub options: [u8; 2],
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Header> {
        if bytes.len() < ENCAPSULATION_HEADER_SIZE as usize {
            return Err(Error::Truncated {
                field: "encapsulation".to_string(),
                offset: 0,
                needed: ENCAPSULATION_HEADER_SIZE,
                remaining: bytes.len() as u64,
            });
        }

        let id = [bytes[0], bytes[1]];
        let repr = match id {
            [0, 0x00] | [0, 0x01] => Representation::Xcdr1,
            [0, 0x06..=0x09] => Representation::Xcdr2,
            _ => return Err(Error::InvalidEncapsulation(id)),
        };

        Ok(Header {
            repr,
            little_endian: id[1] & 1 == 1,
            options: [bytes[2], bytes[3]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        assert_eq!(
            ENCAPSULATION_HEADER_SIZE,
            (CdrBe::id(Representation::Xcdr1, Extensibility::Final).len() + CdrBe::OPTION.len())
                as u64
        );
        assert_eq!(
            ENCAPSULATION_HEADER_SIZE,
            (CdrLe::id(Representation::Xcdr2, Extensibility::Final).len() + CdrLe::OPTION.len())
                as u64
        );
    }

    #[test]
    fn test_ids() {
        use Extensibility::*;
        use Representation::*;

        assert_eq!(CdrBe::id(Xcdr1, Final), [0x00, 0x00]);
        assert_eq!(CdrLe::id(Xcdr1, Mutable), [0x00, 0x01]);
        assert_eq!(CdrBe::id(Xcdr2, Final), [0x00, 0x06]);
        assert_eq!(CdrLe::id(Xcdr2, Final), [0x00, 0x07]);
        assert_eq!(CdrBe::id(Xcdr2, Appendable), [0x00, 0x08]);
        assert_eq!(CdrLe::id(Xcdr2, Mutable), [0x00, 0x09]);
    }

    #[test]
    fn test_parse() {
        let header = Header::parse(&[0x00, 0x09, 0x00, 0x00]).unwrap();
        assert_eq!(header.repr, Representation::Xcdr2);
        assert!(header.little_endian);

        let header = Header::parse(&[0x00, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(header.repr, Representation::Xcdr1);
        assert!(!header.little_endian);

        match Header::parse(&[0x00, 0x02, 0x00, 0x00]) {
            Err(Error::InvalidEncapsulation(id)) => assert_eq!(id, [0x00, 0x02]),
            r => panic!("unexpected result: {:?}", r),
        }
        assert!(matches!(
            Header::parse(&[0x00]),
            Err(Error::Truncated { .. })
        ));
    }
}
