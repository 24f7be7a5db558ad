//! Codec for Windows NT self-relative security descriptors, as carried by
//! the Active Directory `nTSecurityDescriptor` attribute and by other
//! NT-kernel securable objects.
//!
//! The crate works on the raw wire form (MS-DTYP 2.4.x): security
//! identifiers, access control entries, access control lists, and the
//! enclosing descriptor. Parsing is read-only over borrowed buffers;
//! every mutation produces a fresh buffer and leaves its input untouched.

pub mod ace;
pub mod acl;
pub mod binrw_util;
pub mod error;
pub mod guid;
pub mod policy;
pub mod sd;
pub mod sid;

pub use ace::{Ace, AceFlags, AceType, RawAce};
pub use acl::{Acl, AclRevision, RawAcl};
pub use error::Error;
pub use guid::Guid;
pub use sd::{AclKind, RawSecurityDescriptor, SdControl, SecurityDescriptor};
pub use sid::Sid;

pub type Result<T> = std::result::Result<T, crate::Error>;
