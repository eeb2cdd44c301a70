//! Storage seam of the namespace manager.
//!
//! The manager never touches the namespace directly; every operation ends in
//! a call on a [`NameSpaceProvider`] (entries and attributes) or a
//! [`CacheLocationProvider`] (where replicas live). Both are synchronous and
//! called from worker threads. [`MemoryNameSpaceProvider`] implements both
//! over an in-process tree.

pub mod memory;
pub mod path;

pub use memory::MemoryNameSpaceProvider;

use nsm_types::{
    AttributeKinds, ChecksumType, EntityId, FileAttributes, FileTypes, Gid, Result, Subject, Uid,
};

/// A window over the (sorted, filtered) entries of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListRange {
    pub start: usize,
    /// Exclusive; `None` lists to the end.
    pub end: Option<usize>,
}

impl ListRange {
    pub const ALL: ListRange = ListRange {
        start: 0,
        end: None,
    };

    pub fn new(start: usize, end: Option<usize>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && self.end.map_or(true, |end| index < end)
    }
}

/// Receives directory entries from [`NameSpaceProvider::list`] one at a time.
pub trait ListHandler {
    fn add_entry(&mut self, name: &str, attrs: FileAttributes) -> Result<()>;
}

impl<F> ListHandler for F
where
    F: FnMut(&str, FileAttributes) -> Result<()>,
{
    fn add_entry(&mut self, name: &str, attrs: FileAttributes) -> Result<()> {
        self(name, attrs)
    }
}

pub trait NameSpaceProvider: Send + Sync {
    /// Create a regular file and return the `requested` attributes of it.
    fn create_file(
        &self,
        subject: &Subject,
        path: &str,
        owner: Option<Uid>,
        group: Option<Gid>,
        mode: u32,
        requested: &AttributeKinds,
    ) -> Result<FileAttributes>;

    fn create_directory(
        &self,
        subject: &Subject,
        path: &str,
        owner: Option<Uid>,
        group: Option<Gid>,
        mode: u32,
    ) -> Result<EntityId>;

    fn create_symlink(
        &self,
        subject: &Subject,
        path: &str,
        destination: &str,
        owner: Option<Uid>,
        group: Option<Gid>,
    ) -> Result<EntityId>;

    /// Delete the entry if its type is in `allowed`; returns its
    /// `requested` attributes as they were before deletion.
    fn delete_entry(
        &self,
        subject: &Subject,
        allowed: &FileTypes,
        id: EntityId,
        requested: &AttributeKinds,
    ) -> Result<FileAttributes>;

    fn delete_entry_by_path(
        &self,
        subject: &Subject,
        allowed: &FileTypes,
        path: &str,
        requested: &AttributeKinds,
    ) -> Result<FileAttributes>;

    /// Move the entry to the absolute path `new_name`.
    fn rename(&self, subject: &Subject, id: EntityId, new_name: &str, overwrite: bool)
        -> Result<()>;

    fn path_to_id(&self, subject: &Subject, path: &str, follow_links: bool) -> Result<EntityId>;

    fn id_to_path(&self, subject: &Subject, id: EntityId) -> Result<String>;

    fn parent_of(&self, subject: &Subject, id: EntityId) -> Result<EntityId>;

    fn get_file_attributes(
        &self,
        subject: &Subject,
        id: EntityId,
        requested: &AttributeKinds,
    ) -> Result<FileAttributes>;

    /// Apply every defined attribute of `attrs`, then return the `acquire`
    /// attributes.
    fn set_file_attributes(
        &self,
        subject: &Subject,
        id: EntityId,
        attrs: FileAttributes,
        acquire: &AttributeKinds,
    ) -> Result<FileAttributes>;

    /// Remove the named flag.
    fn remove_file_attribute(&self, subject: &Subject, id: EntityId, name: &str) -> Result<()>;

    fn remove_checksum(&self, subject: &Subject, id: EntityId, kind: ChecksumType) -> Result<()>;

    /// Feed the entries of the directory at `path` whose names match the
    /// glob `pattern` to `handler`, in name order, restricted to `range`.
    fn list(
        &self,
        subject: &Subject,
        path: &str,
        pattern: Option<&str>,
        range: ListRange,
        requested: &AttributeKinds,
        handler: &mut dyn ListHandler,
    ) -> Result<()>;
}

pub trait CacheLocationProvider: Send + Sync {
    fn add_cache_location(&self, subject: &Subject, id: EntityId, location: &str) -> Result<()>;

    /// With `remove_if_last`, a file left without any location is deleted.
    fn clear_cache_location(
        &self,
        subject: &Subject,
        id: EntityId,
        location: &str,
        remove_if_last: bool,
    ) -> Result<()>;

    fn get_cache_locations(&self, subject: &Subject, id: EntityId) -> Result<Vec<String>>;
}
