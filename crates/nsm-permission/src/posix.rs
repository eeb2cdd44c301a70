use nsm_types::{AttributeKind, AttributeKinds, FileAttributes, FileType, Subject};

use crate::{AccessType, PermissionHandler};

const READ: u32 = 0o4;
const WRITE: u32 = 0o2;
const EXEC: u32 = 0o1;

/// Classic owner/group/other mode bits.
///
/// The class is picked first (owner, then group, then other) and only that
/// class's bits are consulted. Entries without owner, group and mode are
/// left undecided.
pub struct PosixPermissionHandler;

impl PosixPermissionHandler {
    fn class_bits(subject: &Subject, attrs: &FileAttributes) -> Option<u32> {
        let (owner, group, mode) = (attrs.owner?, attrs.group?, attrs.mode?);
        let shift = if subject.uid == owner {
            6
        } else if subject.in_group(group) {
            3
        } else {
            0
        };
        Some((mode >> shift) & 0o7)
    }

    fn check(subject: &Subject, attrs: &FileAttributes, wanted: u32) -> AccessType {
        if subject.is_root() {
            return AccessType::Allowed;
        }
        match Self::class_bits(subject, attrs) {
            Some(bits) => AccessType::from_bool(bits & wanted == wanted),
            None => AccessType::Undefined,
        }
    }

    fn check_dir(subject: &Subject, attrs: &FileAttributes, wanted: u32) -> AccessType {
        match attrs.file_type {
            Some(FileType::Dir) | None => Self::check(subject, attrs, wanted),
            Some(_) => AccessType::Denied,
        }
    }
}

impl PermissionHandler for PosixPermissionHandler {
    fn required_attributes(&self) -> AttributeKinds {
        AttributeKinds::of([
            AttributeKind::Owner,
            AttributeKind::OwnerGroup,
            AttributeKind::Mode,
            AttributeKind::Type,
        ])
    }

    fn can_read_file(&self, subject: &Subject, attrs: &FileAttributes) -> AccessType {
        Self::check(subject, attrs, READ)
    }

    fn can_write_file(&self, subject: &Subject, attrs: &FileAttributes) -> AccessType {
        Self::check(subject, attrs, WRITE)
    }

    fn can_create_file(&self, subject: &Subject, parent: &FileAttributes) -> AccessType {
        Self::check_dir(subject, parent, WRITE | EXEC)
    }

    fn can_create_sub_dir(&self, subject: &Subject, parent: &FileAttributes) -> AccessType {
        Self::check_dir(subject, parent, WRITE | EXEC)
    }

    fn can_list_dir(&self, subject: &Subject, dir: &FileAttributes) -> AccessType {
        Self::check_dir(subject, dir, READ)
    }

    fn can_lookup(&self, subject: &Subject, dir: &FileAttributes) -> AccessType {
        Self::check_dir(subject, dir, EXEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsm_types::{Gid, Uid};

    fn dir(mode: u32) -> FileAttributes {
        FileAttributes {
            file_type: Some(FileType::Dir),
            owner: Some(Uid(1000)),
            group: Some(Gid(100)),
            mode: Some(mode),
            ..Default::default()
        }
    }

    #[test]
    fn test_class_selection() {
        let h = PosixPermissionHandler;
        let attrs = dir(0o075);
        // The owner class has no bits even though group and other do.
        assert_eq!(h.can_list_dir(&Subject::new(1000, 100), &attrs), AccessType::Denied);
        assert_eq!(h.can_list_dir(&Subject::new(1, 100), &attrs), AccessType::Allowed);
        assert_eq!(
            h.can_create_file(&Subject::new(1, 7).with_groups([100]), &attrs),
            AccessType::Allowed
        );
        assert_eq!(h.can_create_file(&Subject::new(1, 1), &attrs), AccessType::Denied);
        assert_eq!(h.can_lookup(&Subject::new(1, 1), &attrs), AccessType::Allowed);
    }

    #[test]
    fn test_directory_checks_need_a_directory() {
        let h = PosixPermissionHandler;
        let mut attrs = dir(0o777);
        attrs.file_type = Some(FileType::Regular);
        assert_eq!(h.can_lookup(&Subject::new(1000, 100), &attrs), AccessType::Denied);
        assert_eq!(h.can_read_file(&Subject::new(1000, 100), &attrs), AccessType::Allowed);
    }

    #[test]
    fn test_missing_attributes_undecided() {
        let h = PosixPermissionHandler;
        let attrs = FileAttributes::default();
        assert_eq!(h.can_read_file(&Subject::new(1, 1), &attrs), AccessType::Undefined);
        assert_eq!(h.can_read_file(&Subject::root(), &attrs), AccessType::Allowed);
    }
}
