//! Active Directory "user cannot change password" DACL editing.
//!
//! AD models the checkbox as three object ACEs on the user's security
//! descriptor, all carrying the User-Change-Password extended right:
//! denies for Everyone and Self when the flag is on, an allow for
//! Everyone when it is off. This module performs that DACL rewrite over
//! descriptor bytes; reading and writing `nTSecurityDescriptor` through a
//! directory connection is the caller's business.

use log::debug;

use crate::ace::{mask, Ace, AceFlags, AceType};
use crate::acl::{self, RawAcl};
use crate::guid::Guid;
use crate::sd::{self, AclKind, RawSecurityDescriptor};
use crate::sid::Sid;
use crate::Result;

/// The User-Change-Password control-access right
/// (`ab721a53-1e2f-11d0-9819-00aa0040529b`).
pub const USER_CHANGE_PASSWORD: Guid = Guid::from_parts(
    0xab721a53,
    0x1e2f,
    0x11d0,
    [0x98, 0x19, 0x00, 0xaa, 0x00, 0x40, 0x52, 0x9b],
);

fn change_password_ace(ace_type: AceType, trustee: &str) -> Result<Vec<u8>> {
    let sid: Sid = trustee.parse()?;
    Ace::object(
        ace_type,
        AceFlags::new(),
        mask::DS_CONTROL_ACCESS,
        sid,
        Some(USER_CHANGE_PASSWORD),
        None,
    )?
    .to_bytes()
}

fn index_of(dacl: &[u8], ace: &[u8]) -> Result<Option<usize>> {
    if dacl.is_empty() {
        return Ok(None);
    }
    RawAcl::new(dacl)?.index_of(ace)
}

/// Rewrites the descriptor's DACL to enable (`deny = true`) or disable
/// the "user cannot change password" flag, mirroring what AD itself does
/// when the checkbox is toggled. Note that disabling must add an explicit
/// allow for Everyone: with the denies gone and no allow, the right would
/// still default to denied. Returns the input unchanged when the DACL is
/// already in the requested state; the operation is idempotent.
pub fn set_cannot_change_password(sd: &[u8], deny: bool) -> Result<Vec<u8>> {
    let deny_everyone = change_password_ace(AceType::AccessDeniedObject, Sid::EVERYONE)?;
    let deny_self = change_password_ace(AceType::AccessDeniedObject, Sid::SELF)?;
    let allow_everyone = change_password_ace(AceType::AccessAllowedObject, Sid::EVERYONE)?;

    let raw = RawSecurityDescriptor::new(sd)?;
    let mut dacl: Vec<u8> = raw
        .acl(AclKind::Dacl)?
        .map(|bytes| bytes.to_vec())
        .unwrap_or_default();
    let mut changed = false;

    let (to_remove, to_add) = if deny {
        (vec![&allow_everyone], vec![&deny_everyone, &deny_self])
    } else {
        (vec![&deny_everyone, &deny_self], vec![&allow_everyone])
    };

    for ace in to_remove {
        if let Some(index) = index_of(&dacl, ace)? {
            debug!("removing change-password ACE at index {index}");
            dacl = acl::remove(&dacl, index)?;
            changed = true;
        }
    }
    for ace in to_add {
        if index_of(&dacl, ace)?.is_none() {
            debug!("adding change-password ACE");
            dacl = if dacl.is_empty() {
                acl::create(ace, true)
            } else {
                acl::insert(&dacl, ace)?
            };
            changed = true;
        }
    }

    if !changed {
        debug!("DACL already in the requested state");
        return Ok(sd.to_vec());
    }
    sd::replace_acl(sd, AclKind::Dacl, &dacl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::AclRevision;
    use crate::sd::{SdControl, SecurityDescriptor};
    use crate::Acl;

    fn user_sd() -> Vec<u8> {
        let owner: Sid = Sid::ADMINISTRATORS.parse().unwrap();
        let dacl = Acl {
            revision: AclRevision::Ds,
            aces: vec![
                Ace::object(
                    AceType::AccessAllowedObject,
                    AceFlags::new(),
                    mask::DS_CONTROL_ACCESS,
                    Sid::EVERYONE.parse().unwrap(),
                    Some(USER_CHANGE_PASSWORD),
                    None,
                )
                .unwrap(),
                Ace::simple(
                    AceType::AccessAllowed,
                    AceFlags::new(),
                    mask::GENERIC_READ,
                    Sid::ADMINISTRATORS.parse().unwrap(),
                )
                .unwrap(),
            ],
        };
        SecurityDescriptor {
            sbz1: 0,
            control: SdControl::new()
                .with_self_relative(true)
                .with_dacl_present(true),
            owner_sid: Some(owner.clone()),
            group_sid: Some(owner),
            sacl: None,
            dacl: Some(dacl),
        }
        .to_bytes()
        .unwrap()
    }

    fn dacl_state(sd: &[u8]) -> (bool, bool, bool) {
        let deny_everyone =
            change_password_ace(AceType::AccessDeniedObject, Sid::EVERYONE).unwrap();
        let deny_self = change_password_ace(AceType::AccessDeniedObject, Sid::SELF).unwrap();
        let allow_everyone =
            change_password_ace(AceType::AccessAllowedObject, Sid::EVERYONE).unwrap();
        let raw = RawSecurityDescriptor::new(sd).unwrap();
        let dacl = raw.acl(AclKind::Dacl).unwrap().unwrap().to_vec();
        let acl = RawAcl::new(&dacl).unwrap();
        (
            acl.index_of(&deny_everyone).unwrap().is_some(),
            acl.index_of(&deny_self).unwrap().is_some(),
            acl.index_of(&allow_everyone).unwrap().is_some(),
        )
    }

    #[test]
    fn test_enable_swaps_allow_for_denies() {
        let sd = user_sd();
        let denied = set_cannot_change_password(&sd, true).unwrap();
        assert_eq!(dacl_state(&denied), (true, true, false));
    }

    #[test]
    fn test_enable_is_idempotent() {
        let sd = user_sd();
        let once = set_cannot_change_password(&sd, true).unwrap();
        let twice = set_cannot_change_password(&once, true).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_enable_then_disable_restores_allow() {
        let sd = user_sd();
        let denied = set_cannot_change_password(&sd, true).unwrap();
        let restored = set_cannot_change_password(&denied, false).unwrap();
        assert_eq!(dacl_state(&restored), (false, false, true));
    }

    #[test]
    fn test_disable_on_clean_descriptor_is_a_no_op() {
        let sd = user_sd();
        assert_eq!(set_cannot_change_password(&sd, false).unwrap(), sd);
    }

    #[test]
    fn test_denies_sort_before_existing_allows() {
        let sd = user_sd();
        let denied = set_cannot_change_password(&sd, true).unwrap();
        let raw = RawSecurityDescriptor::new(&denied).unwrap();
        let dacl = raw.acl(AclKind::Dacl).unwrap().unwrap();
        let aces = RawAcl::new(dacl).unwrap().aces().unwrap();
        let first = crate::ace::RawAce::new(aces[0]).unwrap();
        assert!(first.is_deny());
    }
}
