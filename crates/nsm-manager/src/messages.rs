//! Requests and replies understood by the namespace manager.
//!
//! A [`NamespaceMessage`] is both the request and, once the manager filled
//! in the result fields of its [`Operation`] and the error slot, the reply.

use std::fmt;

use nsm_cells::Message;
use nsm_provider::ListRange;
use nsm_types::{
    status_code_t, AccessMasks, AttributeKinds, Checksum, ChecksumType, EntityId, FileAttributes,
    FileTypes, Gid, Status, StatusCode, Subject, Uid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    AddCacheLocation,
    ClearCacheLocation,
    GetCacheLocations,
    CreateSymLink,
    CreateDirectory,
    CreateEntry,
    DeleteEntry,
    Rename,
    MapPath,
    GetParent,
    GetFileAttributes,
    SetFileAttributes,
    SetChecksum,
    RemoveChecksum,
    Flag,
    FileFlushed,
    ListDirectory,
}

impl OperationKind {
    pub const ALL: [OperationKind; 17] = [
        OperationKind::AddCacheLocation,
        OperationKind::ClearCacheLocation,
        OperationKind::GetCacheLocations,
        OperationKind::CreateSymLink,
        OperationKind::CreateDirectory,
        OperationKind::CreateEntry,
        OperationKind::DeleteEntry,
        OperationKind::Rename,
        OperationKind::MapPath,
        OperationKind::GetParent,
        OperationKind::GetFileAttributes,
        OperationKind::SetFileAttributes,
        OperationKind::SetChecksum,
        OperationKind::RemoveChecksum,
        OperationKind::Flag,
        OperationKind::FileFlushed,
        OperationKind::ListDirectory,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::AddCacheLocation => "AddCacheLocation",
            OperationKind::ClearCacheLocation => "ClearCacheLocation",
            OperationKind::GetCacheLocations => "GetCacheLocations",
            OperationKind::CreateSymLink => "CreateSymLink",
            OperationKind::CreateDirectory => "CreateDirectory",
            OperationKind::CreateEntry => "CreateEntry",
            OperationKind::DeleteEntry => "DeleteEntry",
            OperationKind::Rename => "Rename",
            OperationKind::MapPath => "MapPath",
            OperationKind::GetParent => "GetParent",
            OperationKind::GetFileAttributes => "GetFileAttributes",
            OperationKind::SetFileAttributes => "SetFileAttributes",
            OperationKind::SetChecksum => "SetChecksum",
            OperationKind::RemoveChecksum => "RemoveChecksum",
            OperationKind::Flag => "Flag",
            OperationKind::FileFlushed => "FileFlushed",
            OperationKind::ListDirectory => "ListDirectory",
        }
    }

    /// Cheap to retry: a request of this kind that outlived its TTL in the
    /// queue is answered with a timeout instead of being executed.
    pub fn discard_early(&self) -> bool {
        matches!(
            self,
            OperationKind::GetCacheLocations
                | OperationKind::MapPath
                | OperationKind::GetParent
                | OperationKind::CreateEntry
                | OperationKind::CreateDirectory
                | OperationKind::GetFileAttributes
                | OperationKind::ListDirectory
        )
    }

    /// Never changes the namespace, so never invalidates a queued request
    /// and may be folded into an identical completed one.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            OperationKind::GetCacheLocations
                | OperationKind::MapPath
                | OperationKind::GetParent
                | OperationKind::GetFileAttributes
        )
    }

    pub fn uses_cache_location_pool(&self) -> bool {
        matches!(
            self,
            OperationKind::AddCacheLocation
                | OperationKind::ClearCacheLocation
                | OperationKind::GetCacheLocations
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOp {
    Set,
    /// Set unless the flag already exists.
    SetNoOverwrite,
    Get,
    Remove,
}

/// One directory entry of a listing reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub name: String,
    pub attributes: FileAttributes,
}

/// Request parameters and, once answered, results of each operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AddCacheLocation {
        location: String,
    },
    ClearCacheLocation {
        location: String,
        remove_if_last: bool,
    },
    GetCacheLocations {
        locations: Vec<String>,
    },
    CreateSymLink {
        destination: String,
        owner: Option<Uid>,
        group: Option<Gid>,
    },
    CreateDirectory {
        owner: Option<Uid>,
        group: Option<Gid>,
        mode: u32,
        requested: AttributeKinds,
        attributes: FileAttributes,
    },
    CreateEntry {
        owner: Option<Uid>,
        group: Option<Gid>,
        mode: u32,
        requested: AttributeKinds,
        attributes: FileAttributes,
    },
    DeleteEntry {
        allowed: FileTypes,
    },
    Rename {
        new_name: String,
        overwrite: bool,
    },
    /// Fills whichever of id and path is missing.
    MapPath {
        follow_links: bool,
    },
    GetParent {
        parent: Option<EntityId>,
    },
    GetFileAttributes {
        requested: AttributeKinds,
        attributes: FileAttributes,
    },
    SetFileAttributes {
        attributes: FileAttributes,
        acquire: AttributeKinds,
        acquired: FileAttributes,
    },
    SetChecksum {
        checksum: Checksum,
    },
    RemoveChecksum {
        kind: ChecksumType,
    },
    Flag {
        op: FlagOp,
        name: String,
        value: Option<String>,
    },
    /// A pool finished writing the file to the storage backend.
    FileFlushed {
        attributes: FileAttributes,
    },
    ListDirectory {
        pattern: Option<String>,
        range: ListRange,
        requested: AttributeKinds,
        entries: Vec<ListEntry>,
        is_final: bool,
        message_count: u32,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::AddCacheLocation { .. } => OperationKind::AddCacheLocation,
            Operation::ClearCacheLocation { .. } => OperationKind::ClearCacheLocation,
            Operation::GetCacheLocations { .. } => OperationKind::GetCacheLocations,
            Operation::CreateSymLink { .. } => OperationKind::CreateSymLink,
            Operation::CreateDirectory { .. } => OperationKind::CreateDirectory,
            Operation::CreateEntry { .. } => OperationKind::CreateEntry,
            Operation::DeleteEntry { .. } => OperationKind::DeleteEntry,
            Operation::Rename { .. } => OperationKind::Rename,
            Operation::MapPath { .. } => OperationKind::MapPath,
            Operation::GetParent { .. } => OperationKind::GetParent,
            Operation::GetFileAttributes { .. } => OperationKind::GetFileAttributes,
            Operation::SetFileAttributes { .. } => OperationKind::SetFileAttributes,
            Operation::SetChecksum { .. } => OperationKind::SetChecksum,
            Operation::RemoveChecksum { .. } => OperationKind::RemoveChecksum,
            Operation::Flag { .. } => OperationKind::Flag,
            Operation::FileFlushed { .. } => OperationKind::FileFlushed,
            Operation::ListDirectory { .. } => OperationKind::ListDirectory,
        }
    }

    pub fn add_cache_location(location: impl Into<String>) -> Self {
        Operation::AddCacheLocation {
            location: location.into(),
        }
    }

    pub fn clear_cache_location(location: impl Into<String>, remove_if_last: bool) -> Self {
        Operation::ClearCacheLocation {
            location: location.into(),
            remove_if_last,
        }
    }

    pub fn get_cache_locations() -> Self {
        Operation::GetCacheLocations {
            locations: Vec::new(),
        }
    }

    pub fn create_symlink(destination: impl Into<String>) -> Self {
        Operation::CreateSymLink {
            destination: destination.into(),
            owner: None,
            group: None,
        }
    }

    pub fn create_directory(mode: u32, requested: AttributeKinds) -> Self {
        Operation::CreateDirectory {
            owner: None,
            group: None,
            mode,
            requested,
            attributes: FileAttributes::default(),
        }
    }

    pub fn create_entry(mode: u32, requested: AttributeKinds) -> Self {
        Operation::CreateEntry {
            owner: None,
            group: None,
            mode,
            requested,
            attributes: FileAttributes::default(),
        }
    }

    pub fn delete_entry(allowed: FileTypes) -> Self {
        Operation::DeleteEntry { allowed }
    }

    pub fn rename(new_name: impl Into<String>, overwrite: bool) -> Self {
        Operation::Rename {
            new_name: new_name.into(),
            overwrite,
        }
    }

    pub fn map_path(follow_links: bool) -> Self {
        Operation::MapPath { follow_links }
    }

    pub fn get_parent() -> Self {
        Operation::GetParent { parent: None }
    }

    pub fn get_file_attributes(requested: AttributeKinds) -> Self {
        Operation::GetFileAttributes {
            requested,
            attributes: FileAttributes::default(),
        }
    }

    pub fn set_file_attributes(attributes: FileAttributes, acquire: AttributeKinds) -> Self {
        Operation::SetFileAttributes {
            attributes,
            acquire,
            acquired: FileAttributes::default(),
        }
    }

    pub fn set_checksum(checksum: Checksum) -> Self {
        Operation::SetChecksum { checksum }
    }

    pub fn remove_checksum(kind: ChecksumType) -> Self {
        Operation::RemoveChecksum { kind }
    }

    pub fn flag(op: FlagOp, name: impl Into<String>, value: Option<String>) -> Self {
        Operation::Flag {
            op,
            name: name.into(),
            value,
        }
    }

    pub fn file_flushed(attributes: FileAttributes) -> Self {
        Operation::FileFlushed { attributes }
    }

    pub fn list_directory(pattern: Option<String>, range: ListRange, requested: AttributeKinds) -> Self {
        Operation::ListDirectory {
            pattern,
            range,
            requested,
            entries: Vec::new(),
            is_final: false,
            message_count: 0,
        }
    }

    /// Whether both carry the same request parameters, results aside.
    fn same_request(&self, other: &Operation) -> bool {
        match (self, other) {
            (Operation::GetCacheLocations { .. }, Operation::GetCacheLocations { .. }) => true,
            (Operation::MapPath { follow_links: a }, Operation::MapPath { follow_links: b }) => {
                a == b
            }
            (Operation::GetParent { .. }, Operation::GetParent { .. }) => true,
            (
                Operation::GetFileAttributes { requested: a, .. },
                Operation::GetFileAttributes { requested: b, .. },
            ) => a == b,
            _ => false,
        }
    }

    /// Copy the results of `done` into `self`.
    fn take_results(&mut self, done: &Operation) {
        match (self, done) {
            (
                Operation::GetCacheLocations { locations },
                Operation::GetCacheLocations { locations: result },
            ) => locations.clone_from(result),
            (Operation::GetParent { parent }, Operation::GetParent { parent: result }) => {
                *parent = *result
            }
            (
                Operation::GetFileAttributes { attributes, .. },
                Operation::GetFileAttributes {
                    attributes: result, ..
                },
            ) => attributes.clone_from(result),
            _ => {}
        }
    }
}

/// A namespace request, answered in place.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceMessage {
    pub id: Option<EntityId>,
    pub path: Option<String>,
    pub subject: Subject,
    /// Rights the subject must hold on the target.
    pub access_mask: AccessMasks,
    pub reply_required: bool,
    pub return_code: status_code_t,
    pub error: Option<String>,
    pub op: Operation,
}

impl NamespaceMessage {
    pub fn new(op: Operation) -> Self {
        Self {
            id: None,
            path: None,
            subject: Subject::root(),
            access_mask: AccessMasks::empty(),
            reply_required: true,
            return_code: StatusCode::OK,
            error: None,
            op,
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    pub fn with_access_mask(mut self, masks: AccessMasks) -> Self {
        self.access_mask = masks;
        self
    }

    pub fn without_reply(mut self) -> Self {
        self.reply_required = false;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.return_code == StatusCode::OK
    }

    /// Whether executing `self` could change the outcome of `other`.
    ///
    /// Read-only requests never do. Anything else does when both address
    /// the same entry, or when that cannot be told because one of them
    /// lacks the identity the other carries.
    pub fn invalidates(&self, other: &NamespaceMessage) -> bool {
        if self.kind().is_read_only() {
            return false;
        }
        if let (Some(a), Some(b)) = (self.id, other.id) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.path, &other.path) {
            return a == b;
        }
        true
    }

    /// Answer `self` with the result of the completed request `done`.
    ///
    /// Succeeds only for read-only requests of the same kind, issued by the
    /// same subject with the same access mask and parameters. Every
    /// identity `self` carries must match `done`; an id or path `self`
    /// lacks is filled in from `done`.
    pub fn fold(&mut self, done: &NamespaceMessage) -> bool {
        if !self.kind().is_read_only() || self.kind() != done.kind() || !done.is_ok() {
            return false;
        }
        if self.subject != done.subject
            || self.access_mask != done.access_mask
            || !self.op.same_request(&done.op)
        {
            return false;
        }
        if self.id.is_none() && self.path.is_none() {
            return false;
        }
        let same_id = self.id.map_or(true, |id| done.id == Some(id));
        let same_path = self
            .path
            .as_ref()
            .map_or(true, |path| done.path.as_ref() == Some(path));
        if !same_id || !same_path {
            return false;
        }
        if self.id.is_none() {
            self.id = done.id;
        }
        if self.path.is_none() {
            self.path.clone_from(&done.path);
        }
        self.op.take_results(&done.op);
        self.set_succeeded();
        true
    }
}

impl Message for NamespaceMessage {
    type Kind = OperationKind;

    fn kind(&self) -> OperationKind {
        self.op.kind()
    }

    fn reply_required(&self) -> bool {
        self.reply_required
    }

    fn return_code(&self) -> status_code_t {
        self.return_code
    }

    fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn set_failed(&mut self, status: Status) {
        let (code, message) = status.into_parts();
        self.return_code = code;
        self.error = message;
    }

    fn set_succeeded(&mut self) {
        self.return_code = StatusCode::OK;
        self.error = None;
    }
}

impl fmt::Display for NamespaceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.kind())?;
        if let Some(id) = self.id {
            write!(f, "id={}", id)?;
        }
        if let Some(path) = &self.path {
            if self.id.is_some() {
                f.write_str(" ")?;
            }
            write!(f, "path={}", path)?;
        }
        write!(f, "] {}", self.subject)
    }
}
