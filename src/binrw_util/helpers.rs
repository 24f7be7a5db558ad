use binrw::{prelude::*, Endian};

/// Writes the low 48 bits of `value` as six bytes in the requested endian.
/// The SID identifier authority is the one big-endian island in an
/// otherwise little-endian format.
#[binrw::writer(writer, endian)]
pub fn write_u48(value: &u64) -> binrw::BinResult<()> {
    let le = value.to_le_bytes();
    let mut raw = [le[0], le[1], le[2], le[3], le[4], le[5]];
    if endian == Endian::Big {
        raw.reverse();
    }
    writer.write_all(&raw).map_err(Into::into)
}

/// Reads six bytes as a 48-bit integer in the requested endian.
#[binrw::parser(reader, endian)]
pub fn read_u48() -> binrw::BinResult<u64> {
    let mut raw = [0u8; 6];
    reader.read_exact(&mut raw)?;
    if endian == Endian::Little {
        raw.reverse();
    }
    Ok(raw.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

#[cfg(test)]
mod tests {
    use binrw::{BinRead, BinWrite};
    use std::io::Cursor;

    #[binrw::binrw]
    #[derive(Debug, PartialEq, Eq)]
    #[brw(big)]
    struct Authority {
        #[br(parse_with = super::read_u48)]
        #[bw(write_with = super::write_u48)]
        value: u64,
    }

    const AUTHORITY_NT: &[u8] = &[0x00, 0x00, 0x00, 0x00, 0x00, 0x05];

    #[test]
    fn test_read_u48_big_endian() {
        let parsed = Authority::read(&mut Cursor::new(AUTHORITY_NT)).unwrap();
        assert_eq!(parsed, Authority { value: 5 });
    }

    #[test]
    fn test_write_u48_big_endian() {
        let mut cursor = Cursor::new(Vec::new());
        Authority { value: 5 }.write(&mut cursor).unwrap();
        assert_eq!(cursor.into_inner(), AUTHORITY_NT);
    }
}
