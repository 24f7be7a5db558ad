//! MS-DTYP 2.4.5: ACL

use std::io::Cursor;

use binrw::prelude::*;
use log::debug;

use crate::ace::{Ace, AceType, RawAce};
use crate::binrw_util::prelude::*;
use crate::{Error, Result};

/// Revision, sbz1, size, ace count, sbz2.
pub const ACL_HEADER_LEN: usize = 8;

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[brw(repr(u8))]
pub enum AclRevision {
    /// Windows NT 4.0
    Nt4 = 2,
    /// Active Directory: required once object or mandatory-label ACEs
    /// are present.
    Ds = 4,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
#[brw(little)]
pub struct Acl {
    pub revision: AclRevision,
    #[bw(calc = 0)]
    #[br(assert(sbz1 == 0))]
    sbz1: u8,
    #[bw(calc = PosMarker::default())]
    _size: PosMarker<u16>,
    #[bw(try_calc = aces.len().try_into())]
    ace_count: u16,
    #[bw(calc = 0)]
    #[br(assert(sbz2 == 0))]
    sbz2: u16,
    #[br(count = ace_count)]
    #[bw(write_with = PosMarker::write_struct_size, args(&_size))]
    pub aces: Vec<Ace>,
}

impl Acl {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self::read(&mut Cursor::new(bytes))?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// Borrowing view over a serialized ACL.
#[derive(Debug, Clone, Copy)]
pub struct RawAcl<'a>(&'a [u8]);

impl<'a> RawAcl<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < ACL_HEADER_LEN {
            return Err(Error::Truncated {
                needed: ACL_HEADER_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }

    pub fn revision(&self) -> u8 {
        self.0[0]
    }

    pub fn size(&self) -> u16 {
        u16::from_le_bytes([self.0[2], self.0[3]])
    }

    /// The header's ACE count. The walk below does not depend on it; it is
    /// cross-checked against the walk only when the ACL is mutated.
    pub fn ace_count(&self) -> u16 {
        u16::from_le_bytes([self.0[4], self.0[5]])
    }

    /// Spans of the contained ACEs, walking each ACE's declared size from
    /// the end of the header to the end of the buffer.
    pub fn ace_positions(&self) -> Result<Vec<(usize, usize)>> {
        let mut spans = Vec::new();
        let mut cursor = ACL_HEADER_LEN;
        while cursor < self.0.len() {
            if self.0.len() < cursor + 4 {
                return Err(Error::Truncated {
                    needed: cursor + 4,
                    got: self.0.len(),
                });
            }
            let size = u16::from_le_bytes([self.0[cursor + 2], self.0[cursor + 3]]);
            if size == 0 || size % 4 != 0 {
                return Err(Error::InvalidAceSize(size));
            }
            let size = size as usize;
            if self.0.len() < cursor + size {
                return Err(Error::Truncated {
                    needed: cursor + size,
                    got: self.0.len(),
                });
            }
            spans.push((cursor, size));
            cursor += size;
        }
        Ok(spans)
    }

    /// The contained ACEs as raw slices, in stored order.
    pub fn aces(&self) -> Result<Vec<&'a [u8]>> {
        Ok(self
            .ace_positions()?
            .into_iter()
            .map(|(offset, size)| &self.0[offset..offset + size])
            .collect())
    }

    /// Byte-equality search for `ace` among the contained ACEs.
    pub fn index_of(&self, ace: &[u8]) -> Result<Option<usize>> {
        Ok(self.aces()?.into_iter().position(|a| a == ace))
    }

    /// Diagnostic summaries for every contained ACE.
    pub fn info(&self) -> Result<Vec<Vec<(&'static str, String)>>> {
        self.aces()?
            .into_iter()
            .map(|ace| RawAce::new(ace).and_then(|raw| raw.info()))
            .collect()
    }

    /// Checks that the header's size and count agree with the walk, and
    /// returns the walked spans.
    fn validated_positions(&self) -> Result<Vec<(usize, usize)>> {
        let spans = self.ace_positions()?;
        if spans.len() != self.ace_count() as usize {
            return Err(Error::CorruptAcl(format!(
                "header declares {} ACEs, walk found {}",
                self.ace_count(),
                spans.len()
            )));
        }
        let total = ACL_HEADER_LEN + spans.iter().map(|(_, size)| size).sum::<usize>();
        if self.size() as usize != total {
            return Err(Error::CorruptAcl(format!(
                "header declares {} bytes, walk found {}",
                self.size(),
                total
            )));
        }
        Ok(spans)
    }
}

/// Whether canonical placement sub-orders inherited entries by ancestor
/// depth. It does not yet; inherited ACEs all share one rank band and keep
/// their stored order.
pub const fn supports_inheritance_ordering() -> bool {
    false
}

/// Builds a fresh ACL holding exactly `ace`. The ACE bytes are trusted to
/// be well formed; [`insert`] is the checked path for everything after the
/// first entry.
pub fn create(ace: &[u8], is_ds_acl: bool) -> Vec<u8> {
    debug_assert!(ACL_HEADER_LEN + ace.len() <= u16::MAX as usize);
    let revision = if is_ds_acl {
        AclRevision::Ds
    } else {
        AclRevision::Nt4
    };
    let size = (ACL_HEADER_LEN + ace.len()) as u16;
    let mut acl = Vec::with_capacity(ACL_HEADER_LEN + ace.len());
    acl.push(revision as u8);
    acl.push(0);
    acl.extend_from_slice(&size.to_le_bytes());
    acl.extend_from_slice(&1u16.to_le_bytes());
    acl.extend_from_slice(&0u16.to_le_bytes());
    acl.extend_from_slice(ace);
    acl
}

/// Inserts `ace` into `acl` at its canonical position and returns the new
/// ACL. The position is the first index whose existing rank does not
/// exceed the new ACE's; an ACE ranked below every existing entry goes
/// last. Inherited and inheritable ACEs are rejected until inheritance
/// ordering is supported.
pub fn insert(acl: &[u8], ace: &[u8]) -> Result<Vec<u8>> {
    if acl.is_empty() {
        return Err(Error::AclEmpty);
    }
    let raw = RawAcl::new(acl)?;
    let new = RawAce::new(ace)?;
    if new.is_inherited() || new.is_inheritable() {
        return Err(Error::Unimplemented(
            "insertion of inherited or inheritable ACEs",
        ));
    }

    let existing = raw.validated_positions()?;
    let rank = new.rank();
    let mut index = existing.len();
    for (i, &(offset, size)) in existing.iter().enumerate() {
        if rank >= RawAce::new(&acl[offset..offset + size])?.rank() {
            index = i;
            break;
        }
    }
    debug!(
        "inserting ACE (rank {rank}) at index {index} of {}",
        existing.len()
    );

    // Object and mandatory-label ACEs force the DS revision; an ACL that
    // already has it keeps it.
    let revision = if AceType::from_u8(new.type_byte()).is_some_and(AceType::requires_ds_revision) {
        AclRevision::Ds as u8
    } else {
        raw.revision()
    };
    let total = raw.size() as usize + ace.len();
    let size = u16::try_from(total).map_err(|_| Error::Oversized(total))?;
    let count = existing.len() as u16 + 1;

    let mut out = Vec::with_capacity(total);
    out.push(revision);
    out.push(acl[1]);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&acl[6..8]);
    let split = existing
        .get(index)
        .map(|&(offset, _)| offset)
        .unwrap_or(acl.len());
    out.extend_from_slice(&acl[ACL_HEADER_LEN..split]);
    out.extend_from_slice(ace);
    out.extend_from_slice(&acl[split..]);
    Ok(out)
}

/// Removes the ACE at `index` and returns the new ACL. Removing the last
/// remaining ACE yields an empty buffer, signalling that the ACL itself
/// should be dropped.
pub fn remove(acl: &[u8], index: usize) -> Result<Vec<u8>> {
    let raw = RawAcl::new(acl)?;
    let count = raw.ace_count() as usize;
    if index >= count {
        return Err(Error::OutOfRange { index, count });
    }
    if count == 1 {
        debug!("removing the only ACE; dropping the ACL");
        return Ok(Vec::new());
    }

    let spans = raw.validated_positions()?;
    let (offset, size) = spans[index];
    debug!("removing ACE at index {index} ({size} bytes)");
    let new_size = raw.size() - size as u16;
    let new_count = (count - 1) as u16;

    let mut out = Vec::with_capacity(acl.len() - size);
    out.extend_from_slice(&acl[..2]);
    out.extend_from_slice(&new_size.to_le_bytes());
    out.extend_from_slice(&new_count.to_le_bytes());
    out.extend_from_slice(&acl[6..8]);
    out.extend_from_slice(&acl[ACL_HEADER_LEN..offset]);
    out.extend_from_slice(&acl[offset + size..]);
    Ok(out)
}
