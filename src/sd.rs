//! MS-DTYP 2.4.6: Security descriptor, self-relative form

use std::io::{Cursor, SeekFrom};

use binrw::prelude::*;
use log::debug;
use modular_bitfield::prelude::*;

use crate::acl::Acl;
use crate::binrw_util::prelude::*;
use crate::sid::Sid;
use crate::{Error, Result};

/// Revision, sbz1, control, and the four body offsets.
pub const SD_HEADER_LEN: usize = 20;

/// Which of a descriptor's two ACLs an operation addresses. The ACL bytes
/// themselves are indistinguishable; only the position in the descriptor
/// tells a DACL from a SACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclKind {
    Sacl,
    Dacl,
}

#[bitfield]
#[derive(BinWrite, BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct SdControl {
    pub owner_defaulted: bool,
    pub group_defaulted: bool,
    pub dacl_present: bool,
    pub dacl_defaulted: bool,

    pub sacl_present: bool,
    pub sacl_defaulted: bool,
    pub server_security: bool,
    pub dacl_trusted: bool,

    pub dacl_computed_inheritance_reqd: bool,
    pub sacl_computed_inheritance_reqd: bool,
    pub dacl_auto_inherited: bool,
    pub sacl_auto_inherited: bool,

    pub dacl_protected: bool,
    pub sacl_protected: bool,
    pub rm_control_valid: bool,
    pub self_relative: bool,
}

/// Typed model of a self-relative security descriptor. Reading follows the
/// declared offsets wherever they point; writing lays the bodies out in
/// declaration order after the header and backpatches the offsets, so the
/// stream must start at the descriptor's first byte.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq)]
#[brw(little)]
pub struct SecurityDescriptor {
    #[bw(calc = 1)]
    #[br(assert(revision == 1))]
    revision: u8,
    pub sbz1: u8,
    #[brw(assert(control.self_relative()))]
    pub control: SdControl,
    #[bw(calc = PosMarker::default())]
    offset_owner: PosMarker<u32>,
    #[bw(calc = PosMarker::default())]
    offset_group: PosMarker<u32>,
    #[bw(calc = PosMarker::default())]
    offset_sacl: PosMarker<u32>,
    #[bw(calc = PosMarker::default())]
    offset_dacl: PosMarker<u32>,
    #[br(if(offset_owner.value != 0))]
    #[br(seek_before = SeekFrom::Start(offset_owner.value.into()), restore_position)]
    #[bw(write_with = PosMarker::write_opt_aoff, args(&offset_owner))]
    pub owner_sid: Option<Sid>,
    #[br(if(offset_group.value != 0))]
    #[br(seek_before = SeekFrom::Start(offset_group.value.into()), restore_position)]
    #[bw(write_with = PosMarker::write_opt_aoff, args(&offset_group))]
    pub group_sid: Option<Sid>,
    #[br(assert((offset_sacl.value != 0) == control.sacl_present()))]
    #[br(if(offset_sacl.value != 0))]
    #[br(seek_before = SeekFrom::Start(offset_sacl.value.into()), restore_position)]
    #[bw(assert(sacl.is_some() == control.sacl_present()))]
    #[bw(write_with = PosMarker::write_opt_aoff, args(&offset_sacl))]
    pub sacl: Option<Acl>,
    #[br(assert((offset_dacl.value != 0) == control.dacl_present()))]
    #[br(if(offset_dacl.value != 0))]
    #[br(seek_before = SeekFrom::Start(offset_dacl.value.into()), restore_position)]
    #[bw(assert(dacl.is_some() == control.dacl_present()))]
    #[bw(write_with = PosMarker::write_opt_aoff, args(&offset_dacl))]
    pub dacl: Option<Acl>,
}

impl SecurityDescriptor {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self::read(&mut Cursor::new(bytes))?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// Borrowing view over a serialized security descriptor.
#[derive(Debug, Clone, Copy)]
pub struct RawSecurityDescriptor<'a>(&'a [u8]);

impl<'a> RawSecurityDescriptor<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < SD_HEADER_LEN {
            return Err(Error::Truncated {
                needed: SD_HEADER_LEN,
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

    pub fn control(&self) -> u16 {
        u16::from_le_bytes([self.0[2], self.0[3]])
    }

    pub fn control_flags(&self) -> SdControl {
        SdControl::from_bytes([self.0[2], self.0[3]])
    }

    pub fn owner_offset(&self) -> u32 {
        self.offset_at(4)
    }

    pub fn group_offset(&self) -> u32 {
        self.offset_at(8)
    }

    pub fn sacl_offset(&self) -> u32 {
        self.offset_at(12)
    }

    pub fn dacl_offset(&self) -> u32 {
        self.offset_at(16)
    }

    fn offset_at(&self, at: usize) -> u32 {
        u32::from_le_bytes([self.0[at], self.0[at + 1], self.0[at + 2], self.0[at + 3]])
    }

    /// The owner SID slice, or `None` when the descriptor carries none.
    pub fn owner_sid(&self) -> Result<Option<&'a [u8]>> {
        self.sid_at(self.owner_offset())
    }

    /// The group SID slice, or `None` when the descriptor carries none.
    pub fn group_sid(&self) -> Result<Option<&'a [u8]>> {
        self.sid_at(self.group_offset())
    }

    fn sid_at(&self, offset: u32) -> Result<Option<&'a [u8]>> {
        if offset == 0 {
            return Ok(None);
        }
        let offset = offset as usize;
        if self.0.len() < offset + 8 {
            return Err(Error::Truncated {
                needed: offset + 8,
                got: self.0.len(),
            });
        }
        let len = 8 + 4 * self.0[offset + 1] as usize;
        if self.0.len() < offset + len {
            return Err(Error::Truncated {
                needed: offset + len,
                got: self.0.len(),
            });
        }
        Ok(Some(&self.0[offset..offset + len]))
    }

    /// The requested ACL's slice, delimited by its own size field, or
    /// `None` when the descriptor carries no ACL of that kind.
    pub fn acl(&self, kind: AclKind) -> Result<Option<&'a [u8]>> {
        let offset = match kind {
            AclKind::Sacl => self.sacl_offset(),
            AclKind::Dacl => self.dacl_offset(),
        };
        if offset == 0 {
            return Ok(None);
        }
        let offset = offset as usize;
        if self.0.len() < offset + 8 {
            return Err(Error::Truncated {
                needed: offset + 8,
                got: self.0.len(),
            });
        }
        let size = u16::from_le_bytes([self.0[offset + 2], self.0[offset + 3]]) as usize;
        if size < 8 {
            return Err(Error::CorruptAcl(format!(
                "declared ACL size {size} is smaller than its header"
            )));
        }
        if self.0.len() < offset + size {
            return Err(Error::Truncated {
                needed: offset + size,
                got: self.0.len(),
            });
        }
        Ok(Some(&self.0[offset..offset + size]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Owner = 0,
    Group = 1,
    Sacl = 2,
    Dacl = 3,
}

/// Replaces one of the descriptor's ACLs and returns the rebuilt
/// descriptor. An empty `new_acl` removes the ACL: its offset becomes 0
/// and the PRESENT control bit is cleared; a non-empty one sets the bit.
/// The four bodies keep the relative order they had in the source buffer
/// (producers disagree on it, so it is preserved rather than normalized),
/// and every offset is recomputed from the end of the header. All other
/// control bits carry over unchanged.
pub fn replace_acl(sd: &[u8], kind: AclKind, new_acl: &[u8]) -> Result<Vec<u8>> {
    let raw = RawSecurityDescriptor::new(sd)?;
    let mut bodies = [
        (Slot::Owner, raw.owner_offset(), raw.owner_sid()?.unwrap_or(&[])),
        (Slot::Group, raw.group_offset(), raw.group_sid()?.unwrap_or(&[])),
        (
            Slot::Sacl,
            raw.sacl_offset(),
            raw.acl(AclKind::Sacl)?.unwrap_or(&[]),
        ),
        (
            Slot::Dacl,
            raw.dacl_offset(),
            raw.acl(AclKind::Dacl)?.unwrap_or(&[]),
        ),
    ];
    bodies.sort_by_key(|&(_, offset, _)| offset);

    let target = match kind {
        AclKind::Sacl => Slot::Sacl,
        AclKind::Dacl => Slot::Dacl,
    };
    let mut old_len = 0;
    for (slot, _, bytes) in bodies.iter_mut() {
        if *slot == target {
            old_len = bytes.len();
            *bytes = new_acl;
        }
    }

    let mut control = raw.control_flags();
    match kind {
        AclKind::Sacl => control.set_sacl_present(!new_acl.is_empty()),
        AclKind::Dacl => control.set_dacl_present(!new_acl.is_empty()),
    }

    // Offsets accumulate over the present bodies in their preserved order;
    // absent bodies stay at 0.
    let mut offsets = [0u32; 4];
    let mut cursor = SD_HEADER_LEN;
    for (slot, _, bytes) in bodies.iter() {
        if bytes.is_empty() {
            continue;
        }
        offsets[*slot as usize] = cursor as u32;
        cursor += bytes.len();
    }

    let mut out = Vec::with_capacity(cursor);
    out.push(raw.revision());
    out.push(sd[1]);
    out.extend_from_slice(&control.into_bytes());
    for offset in offsets {
        out.extend_from_slice(&offset.to_le_bytes());
    }
    for (_, _, bytes) in bodies.iter() {
        out.extend_from_slice(bytes);
    }

    // A mutation must never yield an internally inconsistent descriptor.
    SecurityDescriptor::parse(&out)?;
    debug!(
        "replaced {kind:?} ({old_len} -> {} bytes), descriptor now {} bytes",
        new_acl.len(),
        out.len()
    );
    Ok(out)
}

const CONTROL_FLAG_NAMES: [(u16, &str); 16] = [
    (0x8000, "SD_CONTROL_SELF_RELATIVE"),
    (0x4000, "SD_CONTROL_RM_CONTROL_VALID"),
    (0x2000, "SD_CONTROL_SACL_PROTECTED"),
    (0x1000, "SD_CONTROL_DACL_PROTECTED"),
    (0x0800, "SD_CONTROL_SACL_AUTOINHERITED"),
    (0x0400, "SD_CONTROL_DACL_AUTOINHERITED"),
    (0x0200, "SD_CONTROL_SACL_COMPUTED_INHERITANCE_REQD"),
    (0x0100, "SD_CONTROL_DACL_COMPUTED_INHERITANCE_REQD"),
    (0x0080, "SD_CONTROL_DACL_TRUSTED"),
    (0x0040, "SD_CONTROL_SERVER_SECURITY"),
    (0x0020, "SD_CONTROL_SACL_DEFAULTED"),
    (0x0010, "SD_CONTROL_SACL_PRESENT"),
    (0x0008, "SD_CONTROL_DACL_DEFAULTED"),
    (0x0004, "SD_CONTROL_DACL_PRESENT"),
    (0x0002, "SD_CONTROL_GROUP_DEFAULTED"),
    (0x0001, "SD_CONTROL_OWNER_DEFAULTED"),
];

/// Names of the control bits set in `flags`, highest bit first.
pub fn control_flag_names(flags: u16) -> Vec<&'static str> {
    CONTROL_FLAG_NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|&(_, name)| name)
        .collect()
}
