pub mod chunk;
pub mod modl;
pub mod msh;
pub mod mtrl;
pub mod odf;
pub mod ucfb;
pub mod unknown;
pub mod vbuf;

use std::fmt::{Debug, Display, Formatter, Write};

use zerocopy::{AsBytes, FromBytes, FromZeroes, LittleEndian, Unaligned};

/// Little-endian field types used by every fixed-layout record in munged files.
pub type U16 = zerocopy::U16<LittleEndian>;
pub type I16 = zerocopy::I16<LittleEndian>;
pub type U32 = zerocopy::U32<LittleEndian>;
pub type I32 = zerocopy::I32<LittleEndian>;
pub type F32 = zerocopy::F32<LittleEndian>;

/// Platform a munged file was built for. Selects the segment decoder; nothing in the data
/// identifies it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    #[default]
    Pc,
    Xbox,
    Ps2,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Default, FromBytes, FromZeroes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    #[inline]
    pub const fn from_u32(value: u32) -> Self { Self(value.to_le_bytes()) }

    #[inline]
    pub const fn as_u32(&self) -> u32 { u32::from_le_bytes(self.0) }

    /// Whether every byte is printable ASCII, as real tags are.
    #[inline]
    pub fn is_printable(&self) -> bool { self.0.iter().all(|c| c.is_ascii_graphic() || *c == b' ') }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for c in self.0 {
            f.write_char(c as char)?;
        }
        Ok(())
    }
}

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_char('"')?;
        for c in self.0 {
            f.write_char(c as char)?;
        }
        f.write_char('"')?;
        Ok(())
    }
}

impl PartialEq<[u8; 4]> for FourCC {
    fn eq(&self, other: &[u8; 4]) -> bool { &self.0 == other }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_cc_compares_as_u32() {
        let tag = FourCC(*b"modl");
        assert_eq!(FourCC::from_u32(tag.as_u32()), tag);
        assert_eq!(tag.as_u32(), u32::from_le_bytes(*b"modl"));
        assert_ne!(tag, FourCC(*b"MODL"));
        assert_eq!(format!("{tag}"), "modl");
        assert_eq!(format!("{tag:?}"), "\"modl\"");
    }

    #[test]
    fn platform_names() {
        assert_eq!("ps2".parse::<Platform>().unwrap(), Platform::Ps2);
        assert_eq!(Platform::Xbox.to_string(), "xbox");
        assert!("gamecube".parse::<Platform>().is_err());
    }

    #[test]
    fn printable_tags() {
        assert!(FourCC(*b"TEX0").is_printable());
        assert!(!FourCC([0, 1, 2, 3]).is_printable());
    }
}
