//! Shared vocabulary of the namespace manager: status codes, identifiers,
//! subjects, access masks, and file attributes.

#[allow(non_snake_case)]
pub mod status_code;

pub mod result;
pub mod status;

#[macro_use]
pub mod strong_type;

pub mod access;
pub mod attributes;
pub mod enum_set;
pub mod ids;
pub mod subject;

// Re-export commonly used items at the crate root.
pub use access::{AccessMask, AccessMasks};
pub use attributes::{
    AccessLatency, Ace, AceKind, AceWho, Acl, AttributeKind, AttributeKinds, Checksum,
    ChecksumType, FileAttributes, FileType, FileTypes, RetentionPolicy, StorageInfo,
};
pub use enum_set::EnumSet;
pub use ids::{DatabaseId, EntityId, Gid, Uid, Uoid};
pub use result::{make_error, make_error_msg, Result};
pub use status::Status;
pub use status_code::*;
pub use subject::Subject;
