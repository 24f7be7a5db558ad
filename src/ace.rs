//! MS-DTYP 2.4.4: ACE

use std::io::Cursor;

use binrw::io::TakeSeekExt;
use binrw::prelude::*;
use modular_bitfield::prelude::*;

use crate::binrw_util::prelude::*;
use crate::guid::Guid;
use crate::sid::Sid;
use crate::{Error, Result};

/// Access-mask bit values (MS-DTYP 2.4.3) and the directory-service
/// object rights carried by object ACEs.
pub mod mask {
    pub const DELETE: u32 = 0x0001_0000;
    pub const READ_CONTROL: u32 = 0x0002_0000;
    pub const WRITE_DACL: u32 = 0x0004_0000;
    pub const WRITE_OWNER: u32 = 0x0008_0000;
    pub const SYNCHRONIZE: u32 = 0x0010_0000;
    pub const ACCESS_SYSTEM_SECURITY: u32 = 0x0100_0000;
    pub const MAXIMUM_ALLOWED: u32 = 0x0200_0000;
    pub const GENERIC_ALL: u32 = 0x1000_0000;
    pub const GENERIC_EXECUTE: u32 = 0x2000_0000;
    pub const GENERIC_WRITE: u32 = 0x4000_0000;
    pub const GENERIC_READ: u32 = 0x8000_0000;

    pub const DS_CREATE_CHILD: u32 = 0x0001;
    pub const DS_DELETE_CHILD: u32 = 0x0002;
    pub const DS_SELF: u32 = 0x0008;
    pub const DS_READ_PROP: u32 = 0x0010;
    pub const DS_WRITE_PROP: u32 = 0x0020;
    pub const DS_CONTROL_ACCESS: u32 = 0x0100;

    /// The DS rights, of which an object ACE carries exactly one.
    pub const DS_RIGHTS: [u32; 6] = [
        DS_CREATE_CHILD,
        DS_DELETE_CHILD,
        DS_SELF,
        DS_READ_PROP,
        DS_WRITE_PROP,
        DS_CONTROL_ACCESS,
    ];

    /// Bounds of the standard/generic bitfield interpretation accepted for
    /// simple and callback ACEs.
    pub(crate) const STANDARD_MIN: u32 = DELETE;
    pub(crate) const STANDARD_MAX: u32 = 0xF300_0000;
}

/// Sort bands for canonical ACL placement. Higher ranks sort earlier:
/// explicit entries precede inherited ones, denies precede allows, and
/// object rights precede property rights within a polarity.
pub const RANK_INHERITED: u32 = 1_000_000;
pub const RANK_EXPLICIT: u32 = 2_000_000;
pub const RANK_DENY: u32 = 200_000;
pub const RANK_ALLOW: u32 = 100_000;
pub const RANK_OBJECT_RIGHTS: u32 = 20_000;
pub const RANK_PROPERTY_RIGHTS: u32 = 10_000;

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[brw(repr(u8))]
pub enum AceType {
    AccessAllowed = 0,
    AccessDenied = 1,
    SystemAudit = 2,
    SystemAlarm = 3,
    AccessAllowedCompound = 4,
    AccessAllowedObject = 5,
    AccessDeniedObject = 6,
    SystemAuditObject = 7,
    SystemAlarmObject = 8,
    AccessAllowedCallback = 9,
    AccessDeniedCallback = 10,
    AccessAllowedCallbackObject = 11,
    AccessDeniedCallbackObject = 12,
    SystemAuditCallback = 13,
    SystemAlarmCallback = 14,
    SystemAuditCallbackObject = 15,
    SystemAlarmCallbackObject = 16,
    SystemMandatoryLabel = 17,
    SystemResourceAttribute = 18,
    SystemScopedPolicyId = 19,
}

impl AceType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::AccessAllowed,
            1 => Self::AccessDenied,
            2 => Self::SystemAudit,
            3 => Self::SystemAlarm,
            4 => Self::AccessAllowedCompound,
            5 => Self::AccessAllowedObject,
            6 => Self::AccessDeniedObject,
            7 => Self::SystemAuditObject,
            8 => Self::SystemAlarmObject,
            9 => Self::AccessAllowedCallback,
            10 => Self::AccessDeniedCallback,
            11 => Self::AccessAllowedCallbackObject,
            12 => Self::AccessDeniedCallbackObject,
            13 => Self::SystemAuditCallback,
            14 => Self::SystemAlarmCallback,
            15 => Self::SystemAuditCallbackObject,
            16 => Self::SystemAlarmCallbackObject,
            17 => Self::SystemMandatoryLabel,
            18 => Self::SystemResourceAttribute,
            19 => Self::SystemScopedPolicyId,
            _ => return None,
        })
    }

    /// Types whose tail starts with object flags and optional type GUIDs.
    pub fn is_object_shaped(self) -> bool {
        matches!(
            self,
            Self::AccessAllowedObject
                | Self::AccessDeniedObject
                | Self::SystemAuditObject
                | Self::AccessAllowedCallbackObject
                | Self::AccessDeniedCallbackObject
                | Self::SystemAuditCallbackObject
        )
    }

    pub fn is_deny(self) -> bool {
        matches!(
            self,
            Self::AccessDenied
                | Self::AccessDeniedObject
                | Self::AccessDeniedCallback
                | Self::AccessDeniedCallbackObject
        )
    }

    /// Types that force the containing ACL to the DS revision.
    pub fn requires_ds_revision(self) -> bool {
        self.is_object_shaped() || matches!(self, Self::SystemMandatoryLabel)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AccessAllowed => "ACCESS_ALLOWED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::SystemAudit => "SYSTEM_AUDIT",
            Self::SystemAlarm => "SYSTEM_ALARM",
            Self::AccessAllowedCompound => "ACCESS_ALLOWED_COMPOUND",
            Self::AccessAllowedObject => "ACCESS_ALLOWED_OBJECT",
            Self::AccessDeniedObject => "ACCESS_DENIED_OBJECT",
            Self::SystemAuditObject => "SYSTEM_AUDIT_OBJECT",
            Self::SystemAlarmObject => "SYSTEM_ALARM_OBJECT",
            Self::AccessAllowedCallback => "ACCESS_ALLOWED_CALLBACK",
            Self::AccessDeniedCallback => "ACCESS_DENIED_CALLBACK",
            Self::AccessAllowedCallbackObject => "ACCESS_ALLOWED_CALLBACK_OBJECT",
            Self::AccessDeniedCallbackObject => "ACCESS_DENIED_CALLBACK_OBJECT",
            Self::SystemAuditCallback => "SYSTEM_AUDIT_CALLBACK",
            Self::SystemAlarmCallback => "SYSTEM_ALARM_CALLBACK",
            Self::SystemAuditCallbackObject => "SYSTEM_AUDIT_CALLBACK_OBJECT",
            Self::SystemAlarmCallbackObject => "SYSTEM_ALARM_CALLBACK_OBJECT",
            Self::SystemMandatoryLabel => "SYSTEM_MANDATORY_LABEL",
            Self::SystemResourceAttribute => "SYSTEM_RESOURCE_ATTRIBUTE",
            Self::SystemScopedPolicyId => "SYSTEM_SCOPED_POLICY_ID",
        }
    }
}

impl std::fmt::Display for AceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[bitfield]
#[derive(BinWrite, BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct AceFlags {
    pub object_inherit: bool,
    pub container_inherit: bool,
    pub no_propagate_inherit: bool,
    pub inherit_only: bool,

    pub inherited: bool,
    pub critical: bool,
    pub successful_access: bool,
    pub failed_access: bool,
}

#[bitfield]
#[derive(BinWrite, BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[bw(map = |&x| Self::into_bytes(x))]
#[br(map = Self::from_bytes)]
pub struct ObjectAceFlags {
    pub object_type_present: bool,
    pub inherited_object_type_present: bool,
    #[skip]
    __: B30,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[brw(little)]
pub struct Ace {
    #[bw(calc = value.ace_type())]
    ace_type: AceType,
    pub flags: AceFlags,
    #[bw(calc = PosMarker::default())]
    _size: PosMarker<u16>,
    #[br(args(ace_type))]
    #[br(map_stream = |s| s.take_seek(u64::from(_size.value.saturating_sub(4))))]
    #[br(pad_size_to = u64::from(_size.value.saturating_sub(4)))]
    #[bw(write_with = PosMarker::write_struct_size_padded4, args(&_size))]
    pub value: AceValue,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
#[br(import(ace_type: AceType))]
pub enum AceValue {
    #[br(pre_assert(matches!(ace_type, AceType::AccessAllowed)))]
    AccessAllowed(AccessAce),
    #[br(pre_assert(matches!(ace_type, AceType::AccessDenied)))]
    AccessDenied(AccessAce),
    #[br(pre_assert(matches!(ace_type, AceType::SystemAudit)))]
    SystemAudit(AccessAce),

    #[br(pre_assert(matches!(ace_type, AceType::AccessAllowedObject)))]
    AccessAllowedObject(ObjectAce),
    #[br(pre_assert(matches!(ace_type, AceType::AccessDeniedObject)))]
    AccessDeniedObject(ObjectAce),

    #[br(pre_assert(matches!(ace_type, AceType::AccessAllowedCallback)))]
    AccessAllowedCallback(CallbackAce),
    #[br(pre_assert(matches!(ace_type, AceType::AccessDeniedCallback)))]
    AccessDeniedCallback(CallbackAce),
    #[br(pre_assert(matches!(ace_type, AceType::SystemAuditCallback)))]
    SystemAuditCallback(CallbackAce),

    #[br(pre_assert(matches!(ace_type, AceType::AccessAllowedCallbackObject)))]
    AccessAllowedCallbackObject(ObjectCallbackAce),
    #[br(pre_assert(matches!(ace_type, AceType::AccessDeniedCallbackObject)))]
    AccessDeniedCallbackObject(ObjectCallbackAce),
    #[br(pre_assert(matches!(ace_type, AceType::SystemAuditObject)))]
    SystemAuditObject(ObjectCallbackAce),
    #[br(pre_assert(matches!(ace_type, AceType::SystemAuditCallbackObject)))]
    SystemAuditCallbackObject(ObjectCallbackAce),

    #[br(pre_assert(matches!(ace_type, AceType::SystemMandatoryLabel)))]
    SystemMandatoryLabel(MandatoryLabelAce),
    #[br(pre_assert(matches!(ace_type, AceType::SystemResourceAttribute)))]
    SystemResourceAttribute(ResourceAttributeAce),
    #[br(pre_assert(matches!(ace_type, AceType::SystemScopedPolicyId)))]
    SystemScopedPolicyId(AccessAce),
}

impl AceValue {
    pub fn ace_type(&self) -> AceType {
        match self {
            AceValue::AccessAllowed(_) => AceType::AccessAllowed,
            AceValue::AccessDenied(_) => AceType::AccessDenied,
            AceValue::SystemAudit(_) => AceType::SystemAudit,
            AceValue::AccessAllowedObject(_) => AceType::AccessAllowedObject,
            AceValue::AccessDeniedObject(_) => AceType::AccessDeniedObject,
            AceValue::AccessAllowedCallback(_) => AceType::AccessAllowedCallback,
            AceValue::AccessDeniedCallback(_) => AceType::AccessDeniedCallback,
            AceValue::SystemAuditCallback(_) => AceType::SystemAuditCallback,
            AceValue::AccessAllowedCallbackObject(_) => AceType::AccessAllowedCallbackObject,
            AceValue::AccessDeniedCallbackObject(_) => AceType::AccessDeniedCallbackObject,
            AceValue::SystemAuditObject(_) => AceType::SystemAuditObject,
            AceValue::SystemAuditCallbackObject(_) => AceType::SystemAuditCallbackObject,
            AceValue::SystemMandatoryLabel(_) => AceType::SystemMandatoryLabel,
            AceValue::SystemResourceAttribute(_) => AceType::SystemResourceAttribute,
            AceValue::SystemScopedPolicyId(_) => AceType::SystemScopedPolicyId,
        }
    }
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AccessAce {
    pub mask: u32,
    pub sid: Sid,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ObjectAce {
    pub mask: u32,
    #[bw(calc = ObjectAceFlags::new().with_object_type_present(object_type.is_some()).with_inherited_object_type_present(inherited_object_type.is_some()))]
    flags: ObjectAceFlags,
    #[br(if(flags.object_type_present()))]
    pub object_type: Option<Guid>,
    #[br(if(flags.inherited_object_type_present()))]
    pub inherited_object_type: Option<Guid>,
    pub sid: Sid,
}

/// Application data is opaque and runs to the end of the ACE. On the wire
/// it is indistinguishable from alignment padding, so parsed data may
/// carry trailing zero bytes; callers that need exact round-trips should
/// supply data whose length is a multiple of 4.
#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CallbackAce {
    pub mask: u32,
    pub sid: Sid,
    #[br(parse_with = binrw::helpers::until_eof)]
    pub application_data: Vec<u8>,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ObjectCallbackAce {
    pub mask: u32,
    #[bw(calc = ObjectAceFlags::new().with_object_type_present(object_type.is_some()).with_inherited_object_type_present(inherited_object_type.is_some()))]
    flags: ObjectAceFlags,
    #[br(if(flags.object_type_present()))]
    pub object_type: Option<Guid>,
    #[br(if(flags.inherited_object_type_present()))]
    pub inherited_object_type: Option<Guid>,
    pub sid: Sid,
    #[br(parse_with = binrw::helpers::until_eof)]
    pub application_data: Vec<u8>,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MandatoryLabelAce {
    pub mask: u32,
    pub sid: Sid,
}

#[binrw::binrw]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ResourceAttributeAce {
    pub mask: u32,
    pub sid: Sid,
    #[br(parse_with = binrw::helpers::until_eof)]
    pub attribute_data: Vec<u8>,
}

fn check_standard_mask(mask: u32) -> Result<()> {
    if !(mask::STANDARD_MIN..=mask::STANDARD_MAX).contains(&mask) {
        return Err(Error::InvalidMask {
            mask,
            context: "expected standard/generic rights in DELETE..=0xF3000000",
        });
    }
    Ok(())
}

fn check_ds_mask(mask: u32) -> Result<()> {
    if !mask::DS_RIGHTS.contains(&mask) {
        return Err(Error::InvalidMask {
            mask,
            context: "expected exactly one directory-service right",
        });
    }
    Ok(())
}

impl Ace {
    /// Builds a simple ACE: header, mask, trustee SID.
    pub fn simple(ace_type: AceType, flags: AceFlags, mask: u32, sid: Sid) -> Result<Self> {
        check_standard_mask(mask)?;
        sid.validate()?;
        let value = match ace_type {
            AceType::AccessAllowed => AceValue::AccessAllowed(AccessAce { mask, sid }),
            AceType::AccessDenied => AceValue::AccessDenied(AccessAce { mask, sid }),
            AceType::SystemAudit => AceValue::SystemAudit(AccessAce { mask, sid }),
            AceType::SystemMandatoryLabel => {
                AceValue::SystemMandatoryLabel(MandatoryLabelAce { mask, sid })
            }
            AceType::SystemScopedPolicyId => {
                AceValue::SystemScopedPolicyId(AccessAce { mask, sid })
            }
            other => {
                return Err(Error::InvalidAceType {
                    value: other as u8,
                    context: "a simple ACE",
                })
            }
        };
        Ok(Self { flags, value })
    }

    /// Builds an object ACE carrying exactly one directory-service right,
    /// optionally scoped to an object type and an inherited object type.
    pub fn object(
        ace_type: AceType,
        flags: AceFlags,
        mask: u32,
        sid: Sid,
        object_type: Option<Guid>,
        inherited_object_type: Option<Guid>,
    ) -> Result<Self> {
        check_ds_mask(mask)?;
        sid.validate()?;
        let ace = ObjectAce {
            mask,
            object_type,
            inherited_object_type,
            sid,
        };
        let value = match ace_type {
            AceType::AccessAllowedObject => AceValue::AccessAllowedObject(ace),
            AceType::AccessDeniedObject => AceValue::AccessDeniedObject(ace),
            other => {
                return Err(Error::InvalidAceType {
                    value: other as u8,
                    context: "an object ACE",
                })
            }
        };
        Ok(Self { flags, value })
    }

    /// Builds a callback ACE with opaque application data.
    pub fn app_data(
        ace_type: AceType,
        flags: AceFlags,
        mask: u32,
        sid: Sid,
        application_data: Vec<u8>,
    ) -> Result<Self> {
        check_standard_mask(mask)?;
        sid.validate()?;
        let ace = CallbackAce {
            mask,
            sid,
            application_data,
        };
        let value = match ace_type {
            AceType::AccessAllowedCallback => AceValue::AccessAllowedCallback(ace),
            AceType::AccessDeniedCallback => AceValue::AccessDeniedCallback(ace),
            AceType::SystemAuditCallback => AceValue::SystemAuditCallback(ace),
            other => {
                return Err(Error::InvalidAceType {
                    value: other as u8,
                    context: "a callback ACE",
                })
            }
        };
        Ok(Self { flags, value })
    }

    /// Builds an object ACE with opaque application data.
    pub fn object_app_data(
        ace_type: AceType,
        flags: AceFlags,
        mask: u32,
        sid: Sid,
        object_type: Option<Guid>,
        inherited_object_type: Option<Guid>,
        application_data: Vec<u8>,
    ) -> Result<Self> {
        check_ds_mask(mask)?;
        sid.validate()?;
        let ace = ObjectCallbackAce {
            mask,
            object_type,
            inherited_object_type,
            sid,
            application_data,
        };
        let value = match ace_type {
            AceType::AccessAllowedCallbackObject => AceValue::AccessAllowedCallbackObject(ace),
            AceType::AccessDeniedCallbackObject => AceValue::AccessDeniedCallbackObject(ace),
            AceType::SystemAuditObject => AceValue::SystemAuditObject(ace),
            AceType::SystemAuditCallbackObject => AceValue::SystemAuditCallbackObject(ace),
            other => {
                return Err(Error::InvalidAceType {
                    value: other as u8,
                    context: "an object callback ACE",
                })
            }
        };
        Ok(Self { flags, value })
    }

    pub fn mandatory_label(_flags: AceFlags, _mask: u32, _sid: Sid) -> Result<Self> {
        Err(Error::Unimplemented("mandatory-label ACE construction"))
    }

    pub fn resource_attribute(
        _flags: AceFlags,
        _mask: u32,
        _sid: Sid,
        _attribute_data: Vec<u8>,
    ) -> Result<Self> {
        Err(Error::Unimplemented("resource-attribute ACE construction"))
    }

    pub fn scoped_policy_id(_flags: AceFlags, _mask: u32, _sid: Sid) -> Result<Self> {
        Err(Error::Unimplemented("scoped-policy-id ACE construction"))
    }

    pub fn ace_type(&self) -> AceType {
        self.value.ace_type()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self::read(&mut Cursor::new(bytes))?)
    }

    /// Serialized wire form, zero-padded to a 4-byte boundary so the
    /// declared size equals the buffer length.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

const ACE_FLAG_NAMES: [(u8, &str); 8] = [
    (0x01, "OBJECT_INHERIT"),
    (0x02, "CONTAINER_INHERIT"),
    (0x04, "NO_PROPAGATE_INHERIT"),
    (0x08, "INHERIT_ONLY"),
    (0x10, "INHERITED"),
    (0x20, "CRITICAL"),
    (0x40, "SUCCESSFUL_ACCESS"),
    (0x80, "FAILED_ACCESS"),
];

/// Names of the flag bits set in `flags`, in ascending bit order.
pub fn flag_names(flags: u8) -> Vec<&'static str> {
    ACE_FLAG_NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|&(_, name)| name)
        .collect()
}

const ACE_MASK_NAMES: [(u32, &str); 17] = [
    (mask::GENERIC_READ, "GENERIC_READ"),
    (mask::GENERIC_WRITE, "GENERIC_WRITE"),
    (mask::GENERIC_EXECUTE, "GENERIC_EXECUTE"),
    (mask::GENERIC_ALL, "GENERIC_ALL"),
    (mask::MAXIMUM_ALLOWED, "MAXIMUM_ALLOWED"),
    (mask::ACCESS_SYSTEM_SECURITY, "ACCESS_SYSTEM_SECURITY"),
    (mask::SYNCHRONIZE, "SYNCHRONIZE"),
    (mask::WRITE_OWNER, "WRITE_OWNER"),
    (mask::WRITE_DACL, "WRITE_DACL"),
    (mask::READ_CONTROL, "READ_CONTROL"),
    (mask::DELETE, "DELETE"),
    (mask::DS_CREATE_CHILD, "DS_CREATE_CHILD"),
    (mask::DS_DELETE_CHILD, "DS_DELETE_CHILD"),
    (mask::DS_SELF, "DS_SELF"),
    (mask::DS_READ_PROP, "DS_READ_PROP"),
    (mask::DS_WRITE_PROP, "DS_WRITE_PROP"),
    (mask::DS_CONTROL_ACCESS, "DS_CONTROL_ACCESS"),
];

/// Names of the known access-mask bits set in `mask`.
pub fn mask_names(mask: u32) -> Vec<&'static str> {
    ACE_MASK_NAMES
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|&(_, name)| name)
        .collect()
}

/// Borrowing view over one serialized ACE. Field reads work off the fixed
/// wire offsets without materializing the typed model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAce<'a>(&'a [u8]);

impl<'a> RawAce<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(Error::Truncated {
                needed: 8,
                got: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }

    pub fn type_byte(&self) -> u8 {
        self.0[0]
    }

    pub fn ace_type(&self) -> Result<AceType> {
        AceType::from_u8(self.0[0]).ok_or(Error::InvalidAceType {
            value: self.0[0],
            context: "raw ACE inspection",
        })
    }

    pub fn flags(&self) -> AceFlags {
        AceFlags::from_bytes([self.0[1]])
    }

    pub fn size(&self) -> u16 {
        u16::from_le_bytes([self.0[2], self.0[3]])
    }

    pub fn mask(&self) -> u32 {
        u32::from_le_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }

    /// Object flags, valid only for object-shaped types.
    pub fn object_flags(&self) -> Result<ObjectAceFlags> {
        let ty = self.ace_type()?;
        if !ty.is_object_shaped() {
            return Err(Error::UnsupportedForType(ty));
        }
        if self.0.len() < 12 {
            return Err(Error::Truncated {
                needed: 12,
                got: self.0.len(),
            });
        }
        Ok(ObjectAceFlags::from_bytes([
            self.0[8], self.0[9], self.0[10], self.0[11],
        ]))
    }

    pub fn object_type(&self) -> Result<Guid> {
        let flags = self.object_flags()?;
        if !flags.object_type_present() {
            return Err(Error::UnsupportedForType(self.ace_type()?));
        }
        self.guid_at(12)
    }

    pub fn inherited_object_type(&self) -> Result<Guid> {
        let flags = self.object_flags()?;
        if !flags.inherited_object_type_present() {
            return Err(Error::UnsupportedForType(self.ace_type()?));
        }
        let offset = if flags.object_type_present() { 28 } else { 12 };
        self.guid_at(offset)
    }

    fn guid_at(&self, offset: usize) -> Result<Guid> {
        let end = offset + 16;
        if self.0.len() < end {
            return Err(Error::Truncated {
                needed: end,
                got: self.0.len(),
            });
        }
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&self.0[offset..end]);
        Ok(Guid::from(raw))
    }

    /// The trustee SID slice. Its position depends on the ACE shape and,
    /// for object shapes, on which type GUIDs are present; its length
    /// comes from the SID's own sub-authority count byte.
    pub fn trustee_sid(&self) -> Result<&'a [u8]> {
        let ty = self.ace_type()?;
        let offset = if ty.is_object_shaped() {
            let flags = self.object_flags()?;
            match (
                flags.object_type_present(),
                flags.inherited_object_type_present(),
            ) {
                (false, false) => 12,
                (true, true) => 44,
                _ => 28,
            }
        } else {
            8
        };
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
        Ok(&self.0[offset..offset + len])
    }

    pub fn trustee(&self) -> Result<Sid> {
        Sid::parse(self.trustee_sid()?)
    }

    pub fn is_inherited(&self) -> bool {
        self.flags().inherited()
    }

    pub fn is_inheritable(&self) -> bool {
        let flags = self.flags();
        flags.object_inherit() || flags.container_inherit() || flags.inherit_only()
    }

    pub fn is_deny(&self) -> bool {
        AceType::from_u8(self.0[0]).is_some_and(AceType::is_deny)
    }

    /// True when the ACE grants rights on a specific object type rather
    /// than on properties or child objects generally.
    pub fn defines_object_rights(&self) -> bool {
        self.object_flags()
            .map_or(false, |flags| flags.object_type_present())
    }

    /// Canonical sort key. Inherited entries are not sub-ordered by
    /// ancestor depth; they all share one band.
    pub fn rank(&self) -> u32 {
        if self.is_inherited() {
            return RANK_INHERITED;
        }
        let polarity = if self.is_deny() { RANK_DENY } else { RANK_ALLOW };
        let specificity = if self.defines_object_rights() {
            RANK_OBJECT_RIGHTS
        } else {
            RANK_PROPERTY_RIGHTS
        };
        RANK_EXPLICIT + polarity + specificity
    }

    /// Human-readable summary of the ACE for diagnostics.
    pub fn info(&self) -> Result<Vec<(&'static str, String)>> {
        let ty = self.ace_type()?;
        let mut details = vec![
            ("type", ty.name().to_string()),
            ("flags", flag_names(self.0[1]).join(" | ")),
            ("mask", mask_names(self.mask()).join(" | ")),
            ("trustee", self.trustee()?.to_string()),
            ("inherited", self.is_inherited().to_string()),
            ("rank", self.rank().to_string()),
        ];
        if ty.is_object_shaped() {
            let flags = self.object_flags()?;
            if flags.object_type_present() {
                details.push(("object type", self.object_type()?.to_string()));
            }
            if flags.inherited_object_type_present() {
                details.push(("inherited object type", self.inherited_object_type()?.to_string()));
            }
        }
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn everyone() -> Sid {
        Sid::EVERYONE.parse().unwrap()
    }

    #[test]
    fn test_simple_ace_wire_form() {
        let ace = Ace::simple(
            AceType::AccessAllowed,
            AceFlags::new(),
            mask::READ_CONTROL,
            everyone(),
        )
        .unwrap();
        let bytes = ace.to_bytes().unwrap();
        // 4 header + 4 mask + 12 SID
        assert_eq!(bytes.len(), 20);
        let raw = RawAce::new(&bytes).unwrap();
        assert_eq!(raw.ace_type().unwrap(), AceType::AccessAllowed);
        assert_eq!(raw.size(), 20);
        assert_eq!(raw.mask(), mask::READ_CONTROL);
        assert_eq!(raw.trustee().unwrap(), everyone());
        assert_eq!(Ace::parse(&bytes).unwrap(), ace);
    }

    #[test]
    fn test_simple_rejects_object_types() {
        let err = Ace::simple(
            AceType::AccessAllowedObject,
            AceFlags::new(),
            mask::DELETE,
            everyone(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidAceType { value: 5, .. }));
    }

    #[test]
    fn test_mask_validation() {
        assert!(matches!(
            Ace::simple(AceType::AccessAllowed, AceFlags::new(), 0x100, everyone()),
            Err(Error::InvalidMask { .. })
        ));
        // object masks must be a DS-right singleton
        assert!(matches!(
            Ace::object(
                AceType::AccessDeniedObject,
                AceFlags::new(),
                mask::DS_CREATE_CHILD | mask::DS_DELETE_CHILD,
                everyone(),
                None,
                None,
            ),
            Err(Error::InvalidMask { .. })
        ));
        assert!(matches!(
            Ace::object(
                AceType::AccessDeniedObject,
                AceFlags::new(),
                mask::DELETE,
                everyone(),
                None,
                None,
            ),
            Err(Error::InvalidMask { .. })
        ));
    }

    #[test]
    fn test_object_ace_guid_layout() {
        let object_type: Guid = "ab721a53-1e2f-11d0-9819-00aa0040529b".parse().unwrap();
        let inherited: Guid = "bf967aba-0de6-11d0-a285-00aa003049e2".parse().unwrap();
        let ace = Ace::object(
            AceType::AccessAllowedObject,
            AceFlags::new(),
            mask::DS_WRITE_PROP,
            everyone(),
            Some(object_type),
            Some(inherited),
        )
        .unwrap();
        let bytes = ace.to_bytes().unwrap();
        // 4 header + 4 mask + 4 object flags + 2 GUIDs + 12 SID
        assert_eq!(bytes.len(), 56);
        let raw = RawAce::new(&bytes).unwrap();
        assert_eq!(raw.object_type().unwrap(), object_type);
        assert_eq!(raw.inherited_object_type().unwrap(), inherited);
        assert_eq!(raw.trustee_sid().unwrap(), &bytes[44..56]);
        assert_eq!(Ace::parse(&bytes).unwrap(), ace);
    }

    #[test]
    fn test_single_guid_moves_trustee() {
        let object_type: Guid = "ab721a53-1e2f-11d0-9819-00aa0040529b".parse().unwrap();
        let ace = Ace::object(
            AceType::AccessDeniedObject,
            AceFlags::new(),
            mask::DS_CONTROL_ACCESS,
            everyone(),
            Some(object_type),
            None,
        )
        .unwrap();
        let bytes = ace.to_bytes().unwrap();
        assert_eq!(bytes.len(), 40);
        let raw = RawAce::new(&bytes).unwrap();
        assert_eq!(raw.trustee_sid().unwrap(), &bytes[28..40]);
        assert!(raw.is_deny());
        assert!(raw.defines_object_rights());
    }

    #[test]
    fn test_app_data_is_padded_to_alignment() {
        let ace = Ace::app_data(
            AceType::AccessAllowedCallback,
            AceFlags::new(),
            mask::DELETE,
            everyone(),
            vec![0xde, 0xad, 0xbe],
        )
        .unwrap();
        let bytes = ace.to_bytes().unwrap();
        // 4 header + 4 mask + 12 SID + 3 data -> padded to 24
        assert_eq!(bytes.len(), 24);
        assert_eq!(RawAce::new(&bytes).unwrap().size(), 24);
        assert_eq!(bytes[23], 0);
    }

    #[test]
    fn test_object_callback_round_trip() {
        let object_type: Guid = "ab721a53-1e2f-11d0-9819-00aa0040529b".parse().unwrap();
        let ace = Ace::object_app_data(
            AceType::SystemAuditObject,
            AceFlags::new().with_successful_access(true),
            mask::DS_READ_PROP,
            everyone(),
            Some(object_type),
            None,
            vec![1, 2, 3, 4],
        )
        .unwrap();
        let bytes = ace.to_bytes().unwrap();
        assert_eq!(Ace::parse(&bytes).unwrap(), ace);
    }

    #[test]
    fn test_reserved_constructors_are_unimplemented() {
        assert!(matches!(
            Ace::mandatory_label(AceFlags::new(), 1, everyone()),
            Err(Error::Unimplemented(_))
        ));
        assert!(matches!(
            Ace::resource_attribute(AceFlags::new(), mask::DELETE, everyone(), vec![]),
            Err(Error::Unimplemented(_))
        ));
        assert!(matches!(
            Ace::scoped_policy_id(AceFlags::new(), mask::DELETE, everyone()),
            Err(Error::Unimplemented(_))
        ));
    }

    #[test]
    fn test_object_inspectors_reject_simple_aces() {
        let bytes = Ace::simple(
            AceType::AccessDenied,
            AceFlags::new(),
            mask::DELETE,
            everyone(),
        )
        .unwrap()
        .to_bytes()
        .unwrap();
        let raw = RawAce::new(&bytes).unwrap();
        assert!(matches!(
            raw.object_flags(),
            Err(Error::UnsupportedForType(AceType::AccessDenied))
        ));
        assert!(raw.object_type().is_err());
        assert!(!raw.defines_object_rights());
    }

    #[test]
    fn test_rank_bands() {
        let deny_object = Ace::object(
            AceType::AccessDeniedObject,
            AceFlags::new(),
            mask::DS_CONTROL_ACCESS,
            everyone(),
            Some("ab721a53-1e2f-11d0-9819-00aa0040529b".parse().unwrap()),
            None,
        )
        .unwrap()
        .to_bytes()
        .unwrap();
        let allow_simple = Ace::simple(
            AceType::AccessAllowed,
            AceFlags::new(),
            mask::DELETE,
            everyone(),
        )
        .unwrap()
        .to_bytes()
        .unwrap();
        let inherited = Ace::simple(
            AceType::AccessAllowed,
            AceFlags::new().with_inherited(true),
            mask::DELETE,
            everyone(),
        )
        .unwrap()
        .to_bytes()
        .unwrap();

        assert_eq!(RawAce::new(&deny_object).unwrap().rank(), 2_220_000);
        assert_eq!(RawAce::new(&allow_simple).unwrap().rank(), 2_110_000);
        assert_eq!(RawAce::new(&inherited).unwrap().rank(), 1_000_000);
    }

    #[test]
    fn test_info_lists_object_details() {
        let bytes = Ace::object(
            AceType::AccessDeniedObject,
            AceFlags::new(),
            mask::DS_CONTROL_ACCESS,
            everyone(),
            Some("ab721a53-1e2f-11d0-9819-00aa0040529b".parse().unwrap()),
            None,
        )
        .unwrap()
        .to_bytes()
        .unwrap();
        let info = RawAce::new(&bytes).unwrap().info().unwrap();
        assert!(info.contains(&("type", "ACCESS_DENIED_OBJECT".to_string())));
        assert!(info.contains(&("mask", "DS_CONTROL_ACCESS".to_string())));
        assert!(info.contains(&("trustee", "S-1-1-0".to_string())));
        assert!(info
            .contains(&("object type", "ab721a53-1e2f-11d0-9819-00aa0040529b".to_string())));
    }
}
