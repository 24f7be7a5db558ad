use std::{fmt::Debug, io::SeekFrom};

use binrw::{BinRead, BinResult, BinWrite, Endian};

/// A placeholder for a size or offset field whose value is only known once
/// the data it describes has been written.
///
/// Reading records the field's stream position next to its value. Writing
/// emits a default placeholder and records where it went, so a later
/// writer can seek back and fill the real value in.
pub struct PosMarker<T> {
    pub pos: core::cell::Cell<u64>,
    pub value: T,
}

/// The ACL and ACE headers both place their 16-bit size at byte 2 of the
/// structure; the size they declare is measured from the structure start.
const SIZE_FIELD_OFFSET: u64 = 2;

impl<T> BinRead for PosMarker<T>
where
    T: BinRead,
{
    type Args<'a> = T::Args<'a>;

    fn read_options<R: binrw::io::Read + binrw::io::Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        T::read_options(reader, endian, args).map(|value| Self {
            pos: core::cell::Cell::new(pos),
            value,
        })
    }
}

impl<T> BinWrite for PosMarker<T>
where
    T: BinWrite<Args<'static> = ()> + Default,
{
    type Args<'a> = ();

    fn write_options<W: binrw::io::Write + binrw::io::Seek>(
        &self,
        writer: &mut W,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.pos.set(writer.stream_position()?);
        T::default().write_options(writer, endian, args)
    }
}

impl<T> PosMarker<T>
where
    T: BinWrite<Args<'static> = ()> + TryFrom<u64>,
    T::Error: binrw::error::CustomError + 'static,
{
    /// Seek back to the marker, write the final value, and return to the
    /// end of the stream.
    pub fn write_back<V, W>(&self, value: V, writer: &mut W, endian: Endian) -> BinResult<()>
    where
        V: TryInto<T>,
        W: binrw::io::Write + binrw::io::Seek,
    {
        let return_to = writer.stream_position()?;
        writer.seek(SeekFrom::Start(self.pos.get()))?;
        value
            .try_into()
            .map_err(|_| binrw::error::Error::Custom {
                pos: self.pos.get(),
                err: Box::new("Error converting value to T"),
            })?
            .write_options(writer, endian, ())?;
        writer.seek(SeekFrom::Start(return_to))?;
        Ok(())
    }

    /// Writer for a structure body whose size field sits at byte 2 of the
    /// structure: writes `value`, then backpatches the distance from the
    /// structure start to the end of the body into `size_dest`.
    #[binrw::writer(writer, endian)]
    pub fn write_struct_size<U>(value: &U, size_dest: &Self) -> BinResult<()>
    where
        U: BinWrite<Args<'static> = ()>,
    {
        value.write_options(writer, endian, ())?;
        let start = size_dest.pos.get() - SIZE_FIELD_OFFSET;
        let total = writer.stream_position()? - start;
        size_dest.write_back(total, writer, endian)
    }

    /// Like [`Self::write_struct_size`], but pads the structure with zero
    /// bytes to the next 4-byte boundary first. The stored size covers the
    /// padding, so the declared size equals the serialized length.
    #[binrw::writer(writer, endian)]
    pub fn write_struct_size_padded4<U>(value: &U, size_dest: &Self) -> BinResult<()>
    where
        U: BinWrite<Args<'static> = ()>,
    {
        value.write_options(writer, endian, ())?;
        let start = size_dest.pos.get() - SIZE_FIELD_OFFSET;
        let mut total = writer.stream_position()? - start;
        let pad = (4 - total % 4) % 4;
        if pad != 0 {
            writer.write_all(&[0u8; 3][..pad as usize])?;
            total += pad;
        }
        size_dest.write_back(total, writer, endian)
    }

    /// Writer for an optional offset-addressed body: a present body is
    /// written at the current position and its absolute offset backpatched
    /// into `offset_dest`; an absent one keeps the zero placeholder.
    ///
    /// Offsets are measured from the start of the stream, so the enclosing
    /// structure must be serialized from position 0 (self-relative form).
    #[binrw::writer(writer, endian)]
    pub fn write_opt_aoff<U>(value: &Option<U>, offset_dest: &Self) -> BinResult<()>
    where
        U: BinWrite<Args<'static> = ()>,
    {
        match value {
            None => Ok(()),
            Some(body) => {
                let pos = writer.stream_position()?;
                offset_dest.write_back(pos, writer, endian)?;
                body.write_options(writer, endian, ())
            }
        }
    }
}

impl<T> Debug for PosMarker<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PosMarker")
            .field("pos", &self.pos)
            .field("value", &self.value)
            .finish()
    }
}

impl<T> Default for PosMarker<T>
where
    T: Default,
{
    fn default() -> Self {
        Self {
            pos: core::cell::Cell::new(u64::MAX),
            value: T::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[binrw::binrw]
    #[derive(Debug, PartialEq, Eq)]
    #[brw(little)]
    struct SizedBlob {
        tag: u8,
        kind: u8,
        #[bw(calc = PosMarker::default())]
        _size: PosMarker<u16>,
        #[br(count = _size.value.saturating_sub(4))]
        #[bw(write_with = PosMarker::write_struct_size_padded4, args(&_size))]
        body: Vec<u8>,
    }

    #[test]
    fn test_padded_size_is_backpatched() {
        let blob = SizedBlob {
            tag: 0xaa,
            kind: 0x01,
            body: vec![1, 2, 3, 4, 5],
        };
        let mut cursor = Cursor::new(Vec::new());
        blob.write(&mut cursor).unwrap();
        let out = cursor.into_inner();
        // 4 header + 5 body -> padded to 12
        assert_eq!(out.len(), 12);
        assert_eq!(u16::from_le_bytes([out[2], out[3]]), 12);
        assert_eq!(&out[9..], &[0, 0, 0]);
    }

    #[test]
    fn test_aligned_body_needs_no_pad() {
        let blob = SizedBlob {
            tag: 0xaa,
            kind: 0x02,
            body: vec![1, 2, 3, 4],
        };
        let mut cursor = Cursor::new(Vec::new());
        blob.write(&mut cursor).unwrap();
        let out = cursor.into_inner();
        assert_eq!(out.len(), 8);
        assert_eq!(u16::from_le_bytes([out[2], out[3]]), 8);
    }
}
