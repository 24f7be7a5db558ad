//! MS-DTYP 2.4.2: SID

use std::io::Cursor;
use std::str::FromStr;

use binrw::prelude::*;

use crate::binrw_util::prelude::*;
use crate::{Error, Result};

/// Identifier authorities a SID may carry (MS-DTYP 2.4.1.1).
pub const KNOWN_AUTHORITIES: [u16; 8] = [0, 1, 2, 3, 4, 5, 15, 16];

/// A SID may hold at most this many sub-authorities.
pub const MAX_SUB_AUTHORITIES: usize = 15;

fn authority_is_known(authority: u64) -> bool {
    authority >> 16 == 0 && KNOWN_AUTHORITIES.contains(&(authority as u16))
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\x{b:02X}")).collect()
}

/// A security identifier. Serialized length is `8 + 4 * sub_authority.len()`
/// bytes; the identifier authority is big-endian on the wire, everything
/// else little-endian.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct Sid {
    #[bw(calc = 1)]
    #[br(assert(revision == 1))]
    revision: u8,
    #[bw(try_calc = sub_authority.len().try_into())]
    #[br(assert(sub_authority_count as usize <= MAX_SUB_AUTHORITIES))]
    sub_authority_count: u8,
    #[brw(big)]
    #[br(parse_with = read_u48)]
    #[bw(write_with = write_u48)]
    #[br(assert(authority_is_known(identifier_authority)))]
    pub identifier_authority: u64,
    #[br(count = sub_authority_count)]
    pub sub_authority: Vec<u32>,
}

impl Sid {
    pub const EVERYONE: &'static str = "S-1-1-0";
    pub const SELF: &'static str = "S-1-5-10";
    pub const LOCAL_SYSTEM: &'static str = "S-1-5-18";
    pub const ADMINISTRATORS: &'static str = "S-1-5-32-544";

    /// Serialized length in bytes.
    pub fn byte_len(&self) -> usize {
        8 + 4 * self.sub_authority.len()
    }

    /// Parses a binary SID. The buffer must contain exactly one SID;
    /// trailing bytes violate the length equation.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let sid = Self::read(&mut cursor).map_err(|_| Error::MalformedSid(hex_dump(bytes)))?;
        if cursor.position() as usize != bytes.len() {
            return Err(Error::MalformedSid(hex_dump(bytes)));
        }
        Ok(sid)
    }

    /// Serializes to the binary wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut cursor = Cursor::new(Vec::with_capacity(self.byte_len()));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Checks the structural rules the wire format cannot enforce on a
    /// value built from public fields.
    pub fn validate(&self) -> Result<()> {
        if self.sub_authority.len() > MAX_SUB_AUTHORITIES
            || !authority_is_known(self.identifier_authority)
        {
            return Err(Error::MalformedSid(self.to_string()));
        }
        Ok(())
    }

    /// Renders the SID in the escaped-hex form LDAP filters expect,
    /// e.g. `\01\01\00\00\00\00\00\05\12\00\00\00`.
    pub fn to_ldap_filter(&self) -> Result<String> {
        Ok(ldap_escape(&self.to_bytes()?))
    }
}

/// Returns true when `bytes` hold a structurally valid SID: revision 1,
/// at most 15 sub-authorities, the four high authority bytes zero, a known
/// authority value, and a length matching the declared count.
pub fn is_valid(bytes: &[u8]) -> bool {
    if bytes.len() < 8 || bytes[0] != 1 {
        return false;
    }
    let count = bytes[1] as usize;
    if count > MAX_SUB_AUTHORITIES || bytes[2..6] != [0, 0, 0, 0] {
        return false;
    }
    if !KNOWN_AUTHORITIES.contains(&u16::from_be_bytes([bytes[6], bytes[7]])) {
        return false;
    }
    bytes.len() == 8 + 4 * count
}

/// LDAP filter escape of a binary SID.
pub fn ldap_filter(bytes: &[u8]) -> Result<String> {
    if !is_valid(bytes) {
        return Err(Error::MalformedSid(hex_dump(bytes)));
    }
    Ok(ldap_escape(bytes))
}

fn ldap_escape(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{b:02X}")).collect()
}

impl FromStr for Sid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::MalformedSid(s.to_string());
        let mut parts = s.split('-');
        if parts.next() != Some("S") {
            return Err(malformed());
        }
        let revision: u8 = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(malformed)?;
        if revision != 1 {
            return Err(malformed());
        }
        let identifier_authority: u64 = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(malformed)?;
        let sub_authority = parts
            .map(|t| t.parse::<u32>().map_err(|_| malformed()))
            .collect::<Result<Vec<_>>>()?;
        let sid = Sid {
            identifier_authority,
            sub_authority,
        };
        sid.validate()?;
        Ok(sid)
    }
}

impl std::fmt::Display for Sid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S-1-{}", self.identifier_authority)?;
        for sub_authority in &self.sub_authority {
            write!(f, "-{sub_authority}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SID_STRING: &str = "S-1-5-21-782712087-4182988437-2163400469-1002";

    const LOCAL_SYSTEM_BYTES: &[u8] = &[
        0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x12, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_sid_to_from_string() {
        let sid_value = Sid {
            identifier_authority: 5,
            sub_authority: vec![21, 782712087, 4182988437, 2163400469, 1002],
        };
        assert_eq!(SID_STRING.parse::<Sid>().unwrap(), sid_value);
        assert_eq!(sid_value.to_string(), SID_STRING);
    }

    #[test]
    fn test_local_system_bytes() {
        let sid: Sid = Sid::LOCAL_SYSTEM.parse().unwrap();
        assert_eq!(sid.to_bytes().unwrap(), LOCAL_SYSTEM_BYTES);
        assert_eq!(Sid::parse(LOCAL_SYSTEM_BYTES).unwrap(), sid);
    }

    #[test]
    fn test_readable_rejects_garbage() {
        assert!("X-1-5-18".parse::<Sid>().is_err());
        assert!("S-2-5-18".parse::<Sid>().is_err());
        assert!("S-1-9-18".parse::<Sid>().is_err());
        assert!("S-1-5-pancake".parse::<Sid>().is_err());
        assert!("S-1-5-21-1-2-3-4-5-6-7-8-9-10-11-12-13-14-15-16"
            .parse::<Sid>()
            .is_err());
    }

    #[test]
    fn test_is_valid_rejections() {
        // wrong revision
        assert!(!is_valid(&[0x02, 0x00, 0, 0, 0, 0, 0x00, 0x05]));
        // authority outside the documented set
        assert!(!is_valid(&[0x01, 0x00, 0, 0, 0, 0, 0x00, 0x09]));
        // nonzero high authority bytes
        assert!(!is_valid(&[0x01, 0x00, 1, 0, 0, 0, 0x00, 0x05]));
        // declared count disagrees with the length
        assert!(!is_valid(&[0x01, 0x02, 0, 0, 0, 0, 0x00, 0x05, 1, 0, 0, 0]));
        // too short for a header
        assert!(!is_valid(&[0x01, 0x00]));
        // minimal valid SID: no sub-authorities
        assert!(is_valid(&[0x01, 0x00, 0, 0, 0, 0, 0x00, 0x05]));
    }

    #[test]
    fn test_parse_rejects_trailing_bytes() {
        let mut bytes = LOCAL_SYSTEM_BYTES.to_vec();
        bytes.push(0);
        assert!(matches!(
            Sid::parse(&bytes),
            Err(crate::Error::MalformedSid(_))
        ));
    }

    #[test]
    fn test_ldap_filter() {
        assert_eq!(
            ldap_filter(LOCAL_SYSTEM_BYTES).unwrap(),
            "\\01\\01\\00\\00\\00\\00\\00\\05\\12\\00\\00\\00"
        );
        let sid: Sid = Sid::LOCAL_SYSTEM.parse().unwrap();
        assert_eq!(
            sid.to_ldap_filter().unwrap(),
            ldap_filter(LOCAL_SYSTEM_BYTES).unwrap()
        );
    }

    #[test]
    fn test_validate_catches_handcrafted_values() {
        let sid = Sid {
            identifier_authority: 9,
            sub_authority: vec![1],
        };
        assert!(sid.to_bytes().is_err());
        let sid = Sid {
            identifier_authority: 5,
            sub_authority: vec![0; 16],
        };
        assert!(sid.to_bytes().is_err());
    }
}
