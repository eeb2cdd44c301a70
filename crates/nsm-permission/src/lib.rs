//! Access decisions for namespace operations.
//!
//! A [`PermissionHandler`] answers a fixed set of questions about a subject
//! and the attributes of an entry. Handlers are tri-state: a handler that has
//! no opinion (e.g. an ACL handler looking at an entry without an ACL)
//! answers [`AccessType::Undefined`] and a [`ChainedPermissionHandler`]
//! moves on to the next one.

mod acl;
mod posix;

pub use acl::AclPermissionHandler;
pub use posix::PosixPermissionHandler;

use nsm_types::{AccessMask, AccessMasks, AttributeKinds, FileAttributes, Subject};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Allowed,
    Denied,
    Undefined,
}

impl AccessType {
    pub fn from_bool(allowed: bool) -> Self {
        if allowed {
            AccessType::Allowed
        } else {
            AccessType::Denied
        }
    }

    /// Conjunction where `Denied` wins and `Undefined` is neutral.
    pub fn and(self, other: AccessType) -> AccessType {
        match (self, other) {
            (AccessType::Denied, _) | (_, AccessType::Denied) => AccessType::Denied,
            (AccessType::Undefined, x) | (x, AccessType::Undefined) => x,
            (AccessType::Allowed, AccessType::Allowed) => AccessType::Allowed,
        }
    }

    pub fn is_denied(self) -> bool {
        self == AccessType::Denied
    }
}

/// Decides whether a subject may act on an entry, given the entry's
/// attributes. The `create` and `list` checks take the parent directory's
/// attributes.
pub trait PermissionHandler: Send + Sync {
    /// Attributes the checks below need to see.
    fn required_attributes(&self) -> AttributeKinds;

    fn can_read_file(&self, subject: &Subject, attrs: &FileAttributes) -> AccessType;

    fn can_write_file(&self, subject: &Subject, attrs: &FileAttributes) -> AccessType;

    fn can_create_file(&self, subject: &Subject, parent: &FileAttributes) -> AccessType;

    fn can_create_sub_dir(&self, subject: &Subject, parent: &FileAttributes) -> AccessType;

    fn can_list_dir(&self, subject: &Subject, dir: &FileAttributes) -> AccessType;

    fn can_lookup(&self, subject: &Subject, dir: &FileAttributes) -> AccessType;
}

/// Asks each handler in turn; the first answer other than `Undefined` wins.
pub struct ChainedPermissionHandler {
    chain: Vec<Box<dyn PermissionHandler>>,
}

impl ChainedPermissionHandler {
    pub fn new(chain: Vec<Box<dyn PermissionHandler>>) -> Self {
        Self { chain }
    }

    fn first_defined(&self, check: impl Fn(&dyn PermissionHandler) -> AccessType) -> AccessType {
        self.chain
            .iter()
            .map(|h| check(h.as_ref()))
            .find(|access| *access != AccessType::Undefined)
            .unwrap_or(AccessType::Undefined)
    }
}

impl Default for ChainedPermissionHandler {
    /// ACL first, then POSIX mode bits.
    fn default() -> Self {
        Self::new(vec![
            Box::new(AclPermissionHandler),
            Box::new(PosixPermissionHandler),
        ])
    }
}

impl PermissionHandler for ChainedPermissionHandler {
    fn required_attributes(&self) -> AttributeKinds {
        self.chain
            .iter()
            .fold(AttributeKinds::empty(), |acc, h| acc.union(&h.required_attributes()))
    }

    fn can_read_file(&self, subject: &Subject, attrs: &FileAttributes) -> AccessType {
        self.first_defined(|h| h.can_read_file(subject, attrs))
    }

    fn can_write_file(&self, subject: &Subject, attrs: &FileAttributes) -> AccessType {
        self.first_defined(|h| h.can_write_file(subject, attrs))
    }

    fn can_create_file(&self, subject: &Subject, parent: &FileAttributes) -> AccessType {
        self.first_defined(|h| h.can_create_file(subject, parent))
    }

    fn can_create_sub_dir(&self, subject: &Subject, parent: &FileAttributes) -> AccessType {
        self.first_defined(|h| h.can_create_sub_dir(subject, parent))
    }

    fn can_list_dir(&self, subject: &Subject, dir: &FileAttributes) -> AccessType {
        self.first_defined(|h| h.can_list_dir(subject, dir))
    }

    fn can_lookup(&self, subject: &Subject, dir: &FileAttributes) -> AccessType {
        self.first_defined(|h| h.can_lookup(subject, dir))
    }
}

/// Evaluates every mask in `masks` against `attrs`.
///
/// Root and an empty mask set are always allowed. Masks without a matching
/// check contribute `Undefined`.
pub fn check_mask(
    handler: &dyn PermissionHandler,
    subject: &Subject,
    masks: &AccessMasks,
    attrs: &FileAttributes,
) -> AccessType {
    if subject.is_root() || masks.is_empty() {
        return AccessType::Allowed;
    }
    let mut result = AccessType::Undefined;
    for mask in masks.iter() {
        let access = match mask {
            AccessMask::ReadData => handler.can_read_file(subject, attrs),
            AccessMask::ListDirectory => handler.can_list_dir(subject, attrs),
            AccessMask::WriteData | AccessMask::AppendData => handler.can_write_file(subject, attrs),
            AccessMask::AddFile => handler.can_create_file(subject, attrs),
            AccessMask::AddSubdirectory => handler.can_create_sub_dir(subject, attrs),
            AccessMask::Execute => handler.can_lookup(subject, attrs),
            _ => AccessType::Undefined,
        };
        trace!(%subject, ?mask, ?access, "mask checked");
        result = result.and(access);
        if result.is_denied() {
            break;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsm_types::{access::parse_masks, Ace, AceKind, AceWho, Acl, FileType, Gid, Uid};

    fn file(owner: u32, group: u32, mode: u32) -> FileAttributes {
        FileAttributes {
            file_type: Some(FileType::Regular),
            owner: Some(Uid(owner)),
            group: Some(Gid(group)),
            mode: Some(mode),
            ..Default::default()
        }
    }

    #[test]
    fn test_and() {
        use AccessType::*;
        assert_eq!(Allowed.and(Denied), Denied);
        assert_eq!(Undefined.and(Allowed), Allowed);
        assert_eq!(Denied.and(Undefined), Denied);
        assert_eq!(Undefined.and(Undefined), Undefined);
    }

    #[test]
    fn test_root_and_empty_mask_allowed() {
        let handler = ChainedPermissionHandler::default();
        let attrs = file(1, 1, 0o000);
        let masks = parse_masks("rw").unwrap();
        assert_eq!(
            check_mask(&handler, &Subject::root(), &masks, &attrs),
            AccessType::Allowed
        );
        assert_eq!(
            check_mask(&handler, &Subject::new(5, 5), &AccessMasks::empty(), &attrs),
            AccessType::Allowed
        );
    }

    #[test]
    fn test_mask_denied_short_circuits() {
        let handler = ChainedPermissionHandler::default();
        let attrs = file(1000, 100, 0o644);
        let owner = Subject::new(1000, 100);
        let other = Subject::new(2000, 200);

        assert_eq!(
            check_mask(&handler, &owner, &parse_masks("rw").unwrap(), &attrs),
            AccessType::Allowed
        );
        assert_eq!(
            check_mask(&handler, &other, &parse_masks("rw").unwrap(), &attrs),
            AccessType::Denied
        );
        assert_eq!(
            check_mask(&handler, &other, &parse_masks("r").unwrap(), &attrs),
            AccessType::Allowed
        );
    }

    #[test]
    fn test_unmapped_mask_passes_through() {
        let handler = ChainedPermissionHandler::default();
        let attrs = file(1000, 100, 0o000);
        let subject = Subject::new(2000, 200);
        assert_eq!(
            check_mask(&handler, &subject, &parse_masks("o").unwrap(), &attrs),
            AccessType::Undefined
        );
    }

    #[test]
    fn test_acl_takes_precedence() {
        let handler = ChainedPermissionHandler::default();
        let mut attrs = file(1000, 100, 0o600);
        attrs.acl = Some(Acl {
            entries: vec![Ace {
                who: AceWho::User(Uid(2000)),
                kind: AceKind::Allow,
                masks: parse_masks("r").unwrap(),
            }],
        });
        let subject = Subject::new(2000, 200);
        assert_eq!(handler.can_read_file(&subject, &attrs), AccessType::Allowed);
        // No ACE covers writing, so the mode bits decide.
        assert_eq!(handler.can_write_file(&subject, &attrs), AccessType::Denied);
    }

    #[test]
    fn test_required_attributes_union() {
        let required = ChainedPermissionHandler::default().required_attributes();
        assert!(required.contains(nsm_types::AttributeKind::Acl));
        assert!(required.contains(nsm_types::AttributeKind::Mode));
        assert!(required.contains(nsm_types::AttributeKind::Owner));
    }
}
