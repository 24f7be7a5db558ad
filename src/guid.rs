use std::{fmt::Display, io::Cursor, str::FromStr};

use binrw::prelude::*;

/// A standard 16-byte GUID in the Microsoft wire layout: the first three
/// fields little-endian, the trailing eight bytes as-is.
#[derive(BinRead, BinWrite, Clone, Copy, PartialEq, Eq, Default)]
#[brw(little)]
pub struct Guid(u32, u16, u16, [u8; 8]);

impl Guid {
    /// Builds a GUID from its four record fields, as printed in the
    /// canonical string form (`data4` covers the last two dash groups).
    pub const fn from_parts(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self(data1, data2, data3, data4)
    }
}

impl From<[u8; 16]> for Guid {
    fn from(value: [u8; 16]) -> Self {
        // a 16-byte cursor read cannot fail
        Self::try_from(&value).unwrap()
    }
}

impl TryFrom<&[u8; 16]> for Guid {
    type Error = binrw::Error;

    fn try_from(value: &[u8; 16]) -> Result<Self, Self::Error> {
        let mut cursor = Cursor::new(value);
        Guid::read(&mut cursor)
    }
}

impl FromStr for Guid {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s.split('-').collect::<Vec<&str>>();
        if components.len() != 5 || components[4].len() != 12 {
            return Err(());
        }

        let data1 = u32::from_str_radix(components[0], 16).map_err(|_| ())?;
        let data2 = u16::from_str_radix(components[1], 16).map_err(|_| ())?;
        let data3 = u16::from_str_radix(components[2], 16).map_err(|_| ())?;

        // last two groups are plain bytes, big-endian as written
        let mut data4 = [0u8; 8];
        data4[..2].copy_from_slice(
            &u16::from_str_radix(components[3], 16)
                .map_err(|_| ())?
                .to_be_bytes(),
        );
        for i in 0..6 {
            data4[i + 2] =
                u8::from_str_radix(&components[4][i * 2..i * 2 + 2], 16).map_err(|_| ())?;
        }
        Ok(Self(data1, data2, data3, data4))
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:012x}",
            self.0,
            self.1,
            self.2,
            self.3[0],
            self.3[1],
            self.3[2..]
                .iter()
                .fold(0u64, |acc, &x| (acc << 8) + x as u64)
        )
    }
}

impl std::fmt::Debug for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
