use nsm_types::{
    AccessMask, Ace, AceKind, AceWho, AttributeKind, AttributeKinds, FileAttributes, Subject,
};

use crate::{AccessType, PermissionHandler};

/// NFSv4-style access control lists.
///
/// Entries are scanned in order and the first one that names the subject
/// and covers the requested mask decides. Without an ACL, or when no entry
/// matches, the answer is `Undefined`.
pub struct AclPermissionHandler;

fn applies(ace: &Ace, subject: &Subject, attrs: &FileAttributes) -> bool {
    match ace.who {
        AceWho::Everyone => true,
        AceWho::Owner => attrs.owner == Some(subject.uid),
        AceWho::OwnerGroup => attrs.group.is_some_and(|g| subject.in_group(g)),
        AceWho::User(uid) => subject.uid == uid,
        AceWho::Group(gid) => subject.in_group(gid),
    }
}

fn evaluate(subject: &Subject, attrs: &FileAttributes, mask: AccessMask) -> AccessType {
    let Some(acl) = attrs.acl.as_ref() else {
        return AccessType::Undefined;
    };
    acl.entries
        .iter()
        .find(|ace| ace.masks.contains(mask) && applies(ace, subject, attrs))
        .map(|ace| AccessType::from_bool(ace.kind == AceKind::Allow))
        .unwrap_or(AccessType::Undefined)
}

impl PermissionHandler for AclPermissionHandler {
    fn required_attributes(&self) -> AttributeKinds {
        AttributeKinds::of([
            AttributeKind::Acl,
            AttributeKind::Owner,
            AttributeKind::OwnerGroup,
        ])
    }

    fn can_read_file(&self, subject: &Subject, attrs: &FileAttributes) -> AccessType {
        evaluate(subject, attrs, AccessMask::ReadData)
    }

    fn can_write_file(&self, subject: &Subject, attrs: &FileAttributes) -> AccessType {
        evaluate(subject, attrs, AccessMask::WriteData)
    }

    fn can_create_file(&self, subject: &Subject, parent: &FileAttributes) -> AccessType {
        evaluate(subject, parent, AccessMask::AddFile)
    }

    fn can_create_sub_dir(&self, subject: &Subject, parent: &FileAttributes) -> AccessType {
        evaluate(subject, parent, AccessMask::AddSubdirectory)
    }

    fn can_list_dir(&self, subject: &Subject, dir: &FileAttributes) -> AccessType {
        evaluate(subject, dir, AccessMask::ListDirectory)
    }

    fn can_lookup(&self, subject: &Subject, dir: &FileAttributes) -> AccessType {
        evaluate(subject, dir, AccessMask::Execute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsm_types::{access::parse_masks, Acl, Gid, Uid};

    fn ace(who: AceWho, kind: AceKind, masks: &str) -> Ace {
        Ace {
            who,
            kind,
            masks: parse_masks(masks).unwrap(),
        }
    }

    fn with_acl(entries: Vec<Ace>) -> FileAttributes {
        FileAttributes {
            owner: Some(Uid(1000)),
            group: Some(Gid(100)),
            acl: Some(Acl { entries }),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_matching_entry_wins() {
        let attrs = with_acl(vec![
            ace(AceWho::User(Uid(5)), AceKind::Deny, "w"),
            ace(AceWho::Everyone, AceKind::Allow, "rw"),
        ]);
        let h = AclPermissionHandler;
        assert_eq!(h.can_write_file(&Subject::new(5, 5), &attrs), AccessType::Denied);
        assert_eq!(h.can_write_file(&Subject::new(6, 5), &attrs), AccessType::Allowed);
        assert_eq!(h.can_read_file(&Subject::new(5, 5), &attrs), AccessType::Allowed);
    }

    #[test]
    fn test_owner_and_group_principals() {
        let attrs = with_acl(vec![
            ace(AceWho::Owner, AceKind::Allow, "f"),
            ace(AceWho::OwnerGroup, AceKind::Allow, "l"),
        ]);
        let h = AclPermissionHandler;
        assert_eq!(h.can_create_file(&Subject::new(1000, 1), &attrs), AccessType::Allowed);
        assert_eq!(h.can_create_file(&Subject::new(1, 100), &attrs), AccessType::Undefined);
        assert_eq!(h.can_list_dir(&Subject::new(1, 100), &attrs), AccessType::Allowed);
    }

    #[test]
    fn test_no_acl_is_undefined() {
        let h = AclPermissionHandler;
        assert_eq!(
            h.can_lookup(&Subject::new(1, 1), &FileAttributes::default()),
            AccessType::Undefined
        );
    }
}
