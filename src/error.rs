use thiserror::Error;

use crate::ace::AceType;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed SID: {0}")]
    MalformedSid(String),
    #[error("ACE type {value} is not valid for {context}")]
    InvalidAceType { value: u8, context: &'static str },
    #[error("Invalid ACE mask {mask:#010x}: {context}")]
    InvalidMask { mask: u32, context: &'static str },
    #[error("Operation is not supported for ACE type {0}")]
    UnsupportedForType(AceType),
    #[error("ACE index {index} is out of range for an ACL holding {count} ACEs")]
    OutOfRange { index: usize, count: usize },
    #[error("The ACL is empty; use acl::create to build a new one instead")]
    AclEmpty,
    #[error("Not implemented: {0}")]
    Unimplemented(&'static str),
    #[error("ACE size {0} is not a positive multiple of 4")]
    InvalidAceSize(u16),
    #[error("Buffer truncated: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("ACL header disagrees with its contents: {0}")]
    CorruptAcl(String),
    #[error("Structure size {0} exceeds the 16-bit wire limit")]
    Oversized(usize),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Binrw Error: {0}")]
    BinRw(#[from] binrw::Error),
}
