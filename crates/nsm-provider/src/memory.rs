//! In-memory namespace.
//!
//! The whole tree lives behind one `parking_lot::RwLock`. Entries are keyed
//! by [`EntityId`]; directories keep their children in a `BTreeMap` so
//! listings come out sorted. Paths below a configured prefix draw their ids
//! from that prefix's database, which is what lets the manager route path
//! requests to the right thread group.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nsm_types::{
    AccessLatency, Acl, AttributeKind, AttributeKinds, Checksum, ChecksumType, DatabaseId,
    EntityId, FileAttributes, FileType, FileTypes, Gid, NamespaceCode, Result, RetentionPolicy,
    Status, StorageInfo, Subject, Uid,
};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::path::{components, is_under, join, normalize, split_last};
use crate::{CacheLocationProvider, ListHandler, ListRange, NameSpaceProvider};

const MAX_LINK_DEPTH: usize = 32;
const ROOT_MODE: u32 = 0o755;

struct Entry {
    parent: Option<EntityId>,
    name: String,
    file_type: FileType,
    owner: Uid,
    group: Gid,
    mode: u32,
    size: u64,
    acl: Option<Acl>,
    checksums: Vec<Checksum>,
    storage_info: Option<StorageInfo>,
    locations: Vec<String>,
    access_latency: Option<AccessLatency>,
    retention_policy: Option<RetentionPolicy>,
    flags: BTreeMap<String, String>,
    link_target: Option<String>,
    children: BTreeMap<String, EntityId>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    accessed: DateTime<Utc>,
}

impl Entry {
    fn new(
        parent: Option<EntityId>,
        name: String,
        file_type: FileType,
        owner: Uid,
        group: Gid,
        mode: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            parent,
            name,
            file_type,
            owner,
            group,
            mode: mode & 0o7777,
            size: 0,
            acl: None,
            checksums: Vec::new(),
            storage_info: None,
            locations: Vec::new(),
            access_latency: None,
            retention_policy: None,
            flags: BTreeMap::new(),
            link_target: None,
            children: BTreeMap::new(),
            created: now,
            modified: now,
            accessed: now,
        }
    }

    fn is_dir(&self) -> bool {
        self.file_type == FileType::Dir
    }

    fn attributes(&self, id: EntityId, requested: &AttributeKinds) -> FileAttributes {
        let mut attrs = FileAttributes {
            entity_id: Some(id),
            file_type: Some(self.file_type),
            size: Some(self.size),
            owner: Some(self.owner),
            group: Some(self.group),
            mode: Some(self.mode),
            acl: self.acl.clone(),
            checksums: (!self.checksums.is_empty()).then(|| self.checksums.clone()),
            storage_info: self.storage_info.clone(),
            locations: Some(self.locations.clone()),
            parent: self.parent,
            access_latency: self.access_latency,
            retention_policy: self.retention_policy,
            flags: Some(self.flags.clone()),
            creation_time: Some(self.created),
            modification_time: Some(self.modified),
            access_time: Some(self.accessed),
        };
        attrs.retain(requested);
        attrs
    }
}

struct Tree {
    root: EntityId,
    entries: HashMap<EntityId, Entry>,
    sequences: HashMap<DatabaseId, u64>,
}

fn not_found(what: impl std::fmt::Display) -> Status {
    Status::not_found(format!("no such entry: {}", what))
}

impl Tree {
    fn new() -> Self {
        let root = EntityId::new(DatabaseId(0), 0);
        let mut entries = HashMap::new();
        entries.insert(
            root,
            Entry::new(None, String::new(), FileType::Dir, Uid(0), Gid(0), ROOT_MODE),
        );
        Self {
            root,
            entries,
            sequences: HashMap::new(),
        }
    }

    fn get(&self, id: EntityId) -> Result<&Entry> {
        self.entries.get(&id).ok_or_else(|| not_found(id))
    }

    fn get_mut(&mut self, id: EntityId) -> Result<&mut Entry> {
        self.entries.get_mut(&id).ok_or_else(|| not_found(id))
    }

    fn allocate(&mut self, db: DatabaseId) -> EntityId {
        let seq = self.sequences.entry(db).or_insert(0);
        *seq += 1;
        EntityId::new(db, *seq)
    }

    fn path_of(&self, id: EntityId) -> Result<String> {
        let mut names = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.get(parent)?;
        }
        names.reverse();
        Ok(join(&names))
    }

    fn resolve(&self, path: &str, follow_last: bool, depth: usize) -> Result<EntityId> {
        if depth > MAX_LINK_DEPTH {
            return Err(Status::with_message(
                NamespaceCode::INVALID_PATH,
                format!("too many levels of symbolic links: {}", path),
            ));
        }
        let parts = components(path)?;
        let mut current = self.root;
        for (i, name) in parts.iter().enumerate() {
            let dir = self.get(current)?;
            if !dir.is_dir() {
                return Err(Status::not_directory(join(&parts[..i])));
            }
            let child_id = *dir.children.get(*name).ok_or_else(|| not_found(path))?;
            let child = self.get(child_id)?;
            let last = i + 1 == parts.len();
            current = match (&child.link_target, last && !follow_last) {
                (Some(target), false) => {
                    let target = if target.starts_with('/') {
                        target.clone()
                    } else {
                        format!("{}/{}", join(&parts[..i]), target)
                    };
                    self.resolve(&target, true, depth + 1)?
                }
                _ => child_id,
            };
        }
        Ok(current)
    }

    fn create(
        &mut self,
        path: &str,
        db: DatabaseId,
        file_type: FileType,
        owner: Uid,
        group: Gid,
        mode: u32,
    ) -> Result<EntityId> {
        let (parent_path, name) = split_last(path)?;
        let parent_id = self.resolve(&parent_path, true, 0)?;
        let parent = self.get(parent_id)?;
        if !parent.is_dir() {
            return Err(Status::not_directory(parent_path));
        }
        if parent.children.contains_key(&name) {
            return Err(Status::exists(path.to_string()));
        }
        let id = self.allocate(db);
        let entry = Entry::new(Some(parent_id), name.clone(), file_type, owner, group, mode);
        self.entries.insert(id, entry);
        let parent = self.get_mut(parent_id)?;
        parent.children.insert(name, id);
        parent.modified = Utc::now();
        Ok(id)
    }

    fn unlink(&mut self, id: EntityId) -> Result<Entry> {
        let entry = self.entries.remove(&id).ok_or_else(|| not_found(id))?;
        if let Some(parent) = entry.parent.and_then(|p| self.entries.get_mut(&p)) {
            parent.children.remove(&entry.name);
            parent.modified = Utc::now();
        }
        Ok(entry)
    }

    fn delete(
        &mut self,
        allowed: &FileTypes,
        id: EntityId,
        requested: &AttributeKinds,
    ) -> Result<FileAttributes> {
        if id == self.root {
            return Err(Status::invalid_arg("the root cannot be deleted"));
        }
        let entry = self.get(id)?;
        if !allowed.contains(entry.file_type) {
            return Err(if entry.is_dir() {
                Status::not_file(format!("{} is a directory", id))
            } else {
                Status::not_directory(format!("{} is not a directory", id))
            });
        }
        if entry.is_dir() && !entry.children.is_empty() {
            return Err(Status::with_message(
                NamespaceCode::NOT_EMPTY,
                format!("directory {} is not empty", id),
            ));
        }
        let attrs = entry.attributes(id, requested);
        self.unlink(id)?;
        Ok(attrs)
    }

    fn is_ancestor(&self, ancestor: EntityId, mut id: EntityId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.entries.get(&id).and_then(|e| e.parent) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }
}

/// A namespace held entirely in memory.
pub struct MemoryNameSpaceProvider {
    tree: RwLock<Tree>,
    /// Normalized prefixes, longest first.
    databases: Vec<(String, DatabaseId)>,
    hsm: String,
    storage_class: String,
    calls: AtomicU64,
    latency_us: AtomicU64,
}

impl Default for MemoryNameSpaceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNameSpaceProvider {
    /// An empty namespace holding only `/`, all in database 0.
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Tree::new()),
            databases: Vec::new(),
            hsm: "osm".to_string(),
            storage_class: "default:none".to_string(),
            calls: AtomicU64::new(0),
            latency_us: AtomicU64::new(0),
        }
    }

    /// Entries created at or below `prefix` get ids from `db`.
    pub fn with_database(mut self, prefix: &str, db: DatabaseId) -> Result<Self> {
        self.databases.push((normalize(prefix)?, db));
        self.databases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(self)
    }

    /// Storage class stamped on new files.
    pub fn with_storage_class(mut self, hsm: &str, storage_class: &str) -> Self {
        self.hsm = hsm.to_string();
        self.storage_class = storage_class.to_string();
        self
    }

    pub fn root_id(&self) -> EntityId {
        self.tree.read().root
    }

    /// Number of entries, the root included.
    pub fn len(&self) -> usize {
        self.tree.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Total provider calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Make every call take at least `latency`. Used to build up queues.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_us
            .store(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn database_of(&self, path: &str) -> DatabaseId {
        self.databases
            .iter()
            .find(|(prefix, _)| is_under(path, prefix))
            .map(|(_, db)| *db)
            .unwrap_or(DatabaseId(0))
    }

    fn enter(&self, op: &str) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        trace!(op, "provider call");
        let latency = self.latency_us.load(Ordering::Relaxed);
        if latency > 0 {
            std::thread::sleep(Duration::from_micros(latency));
        }
    }

    fn create_entry(
        &self,
        subject: &Subject,
        path: &str,
        file_type: FileType,
        owner: Option<Uid>,
        group: Option<Gid>,
        mode: u32,
    ) -> Result<(EntityId, String)> {
        let path = normalize(path)?;
        let db = self.database_of(&path);
        let id = self.tree.write().create(
            &path,
            db,
            file_type,
            owner.unwrap_or(subject.uid),
            group.unwrap_or(subject.gid),
            mode,
        )?;
        debug!(%path, %id, ?file_type, "entry created");
        Ok((id, path))
    }
}

impl NameSpaceProvider for MemoryNameSpaceProvider {
    fn create_file(
        &self,
        subject: &Subject,
        path: &str,
        owner: Option<Uid>,
        group: Option<Gid>,
        mode: u32,
        requested: &AttributeKinds,
    ) -> Result<FileAttributes> {
        self.enter("create_file");
        let (id, _) = self.create_entry(subject, path, FileType::Regular, owner, group, mode)?;
        let mut tree = self.tree.write();
        let entry = tree.get_mut(id)?;
        entry.storage_info = Some(StorageInfo::new(&self.hsm, &self.storage_class));
        Ok(entry.attributes(id, requested))
    }

    fn create_directory(
        &self,
        subject: &Subject,
        path: &str,
        owner: Option<Uid>,
        group: Option<Gid>,
        mode: u32,
    ) -> Result<EntityId> {
        self.enter("create_directory");
        self.create_entry(subject, path, FileType::Dir, owner, group, mode)
            .map(|(id, _)| id)
    }

    fn create_symlink(
        &self,
        subject: &Subject,
        path: &str,
        destination: &str,
        owner: Option<Uid>,
        group: Option<Gid>,
    ) -> Result<EntityId> {
        self.enter("create_symlink");
        if destination.is_empty() {
            return Err(Status::invalid_arg("symbolic link needs a destination"));
        }
        let (id, _) = self.create_entry(subject, path, FileType::Link, owner, group, 0o777)?;
        let mut tree = self.tree.write();
        let entry = tree.get_mut(id)?;
        entry.link_target = Some(destination.to_string());
        entry.size = destination.len() as u64;
        Ok(id)
    }

    fn delete_entry(
        &self,
        _subject: &Subject,
        allowed: &FileTypes,
        id: EntityId,
        requested: &AttributeKinds,
    ) -> Result<FileAttributes> {
        self.enter("delete_entry");
        let attrs = self.tree.write().delete(allowed, id, requested)?;
        debug!(%id, "entry deleted");
        Ok(attrs)
    }

    fn delete_entry_by_path(
        &self,
        _subject: &Subject,
        allowed: &FileTypes,
        path: &str,
        requested: &AttributeKinds,
    ) -> Result<FileAttributes> {
        self.enter("delete_entry_by_path");
        let mut tree = self.tree.write();
        let id = tree.resolve(path, false, 0)?;
        let attrs = tree.delete(allowed, id, requested)?;
        debug!(path, %id, "entry deleted");
        Ok(attrs)
    }

    fn rename(
        &self,
        _subject: &Subject,
        id: EntityId,
        new_name: &str,
        overwrite: bool,
    ) -> Result<()> {
        self.enter("rename");
        let new_name = normalize(new_name)?;
        let (parent_path, name) = split_last(&new_name)?;
        let mut tree = self.tree.write();
        if id == tree.root {
            return Err(Status::invalid_arg("the root cannot be renamed"));
        }
        let moving_dir = tree.get(id)?.is_dir();
        let new_parent = tree.resolve(&parent_path, true, 0)?;
        if !tree.get(new_parent)?.is_dir() {
            return Err(Status::not_directory(parent_path));
        }
        if moving_dir && tree.is_ancestor(id, new_parent) {
            return Err(Status::invalid_arg(format!(
                "cannot move {} below itself",
                id
            )));
        }

        let existing = tree.get(new_parent)?.children.get(&name).copied();
        if let Some(existing) = existing {
            if existing == id {
                return Ok(());
            }
            if !overwrite {
                return Err(Status::exists(new_name));
            }
            let target = tree.get(existing)?;
            if target.is_dir() != moving_dir {
                return Err(Status::exists(format!(
                    "{} exists and is of a different type",
                    new_name
                )));
            }
            if !target.children.is_empty() {
                return Err(Status::with_message(
                    NamespaceCode::NOT_EMPTY,
                    format!("directory {} is not empty", new_name),
                ));
            }
            tree.unlink(existing)?;
        }

        let old_parent = tree.get(id)?.parent;
        let old_name = tree.get(id)?.name.clone();
        if let Some(parent) = old_parent {
            let parent = tree.get_mut(parent)?;
            parent.children.remove(&old_name);
            parent.modified = Utc::now();
        }
        let parent = tree.get_mut(new_parent)?;
        parent.children.insert(name.clone(), id);
        parent.modified = Utc::now();
        let entry = tree.get_mut(id)?;
        entry.parent = Some(new_parent);
        entry.name = name;
        debug!(%id, to = %new_name, "entry renamed");
        Ok(())
    }

    fn path_to_id(&self, _subject: &Subject, path: &str, follow_links: bool) -> Result<EntityId> {
        self.enter("path_to_id");
        self.tree.read().resolve(path, follow_links, 0)
    }

    fn id_to_path(&self, _subject: &Subject, id: EntityId) -> Result<String> {
        self.enter("id_to_path");
        self.tree.read().path_of(id)
    }

    fn parent_of(&self, _subject: &Subject, id: EntityId) -> Result<EntityId> {
        self.enter("parent_of");
        self.tree
            .read()
            .get(id)?
            .parent
            .ok_or_else(|| Status::not_found("the root has no parent"))
    }

    fn get_file_attributes(
        &self,
        _subject: &Subject,
        id: EntityId,
        requested: &AttributeKinds,
    ) -> Result<FileAttributes> {
        self.enter("get_file_attributes");
        Ok(self.tree.read().get(id)?.attributes(id, requested))
    }

    fn set_file_attributes(
        &self,
        _subject: &Subject,
        id: EntityId,
        attrs: FileAttributes,
        acquire: &AttributeKinds,
    ) -> Result<FileAttributes> {
        self.enter("set_file_attributes");
        for kind in [AttributeKind::EntityId, AttributeKind::Type, AttributeKind::Parent] {
            if attrs.is_defined(kind) {
                return Err(Status::invalid_arg(format!("{:?} cannot be modified", kind)));
            }
        }

        let mut tree = self.tree.write();
        let entry = tree.get_mut(id)?;

        if let Some(checksums) = &attrs.checksums {
            for checksum in checksums {
                match entry.checksums.iter().find(|c| c.kind == checksum.kind) {
                    Some(current) if current.value != checksum.value => {
                        return Err(Status::with_message(
                            NamespaceCode::ATTRIBUTE_EXISTS,
                            format!("checksum mismatch: have {}, got {}", current, checksum),
                        ));
                    }
                    Some(_) => {}
                    None => entry.checksums.push(checksum.clone()),
                }
            }
        }

        let FileAttributes {
            size,
            owner,
            group,
            mode,
            acl,
            storage_info,
            locations,
            access_latency,
            retention_policy,
            flags,
            creation_time,
            modification_time,
            access_time,
            ..
        } = attrs;

        if let Some(size) = size {
            entry.size = size;
            entry.modified = Utc::now();
        }
        if let Some(owner) = owner {
            entry.owner = owner;
        }
        if let Some(group) = group {
            entry.group = group;
        }
        if let Some(mode) = mode {
            entry.mode = mode & 0o7777;
        }
        if let Some(acl) = acl {
            entry.acl = (!acl.is_empty()).then_some(acl);
        }
        if let Some(info) = storage_info {
            entry.storage_info = Some(info);
        }
        for location in locations.into_iter().flatten() {
            if !entry.locations.contains(&location) {
                entry.locations.push(location);
            }
        }
        if access_latency.is_some() {
            entry.access_latency = access_latency;
        }
        if retention_policy.is_some() {
            entry.retention_policy = retention_policy;
        }
        if let Some(flags) = flags {
            entry.flags.extend(flags);
        }
        if let Some(t) = creation_time {
            entry.created = t;
        }
        if let Some(t) = modification_time {
            entry.modified = t;
        }
        if let Some(t) = access_time {
            entry.accessed = t;
        }
        Ok(entry.attributes(id, acquire))
    }

    fn remove_file_attribute(&self, _subject: &Subject, id: EntityId, name: &str) -> Result<()> {
        self.enter("remove_file_attribute");
        let mut tree = self.tree.write();
        match tree.get_mut(id)?.flags.remove(name) {
            Some(_) => Ok(()),
            None => Err(Status::with_message(
                NamespaceCode::ATTRIBUTE_NOT_FOUND,
                format!("no flag {} on {}", name, id),
            )),
        }
    }

    fn remove_checksum(&self, _subject: &Subject, id: EntityId, kind: ChecksumType) -> Result<()> {
        self.enter("remove_checksum");
        let mut tree = self.tree.write();
        tree.get_mut(id)?.checksums.retain(|c| c.kind != kind);
        Ok(())
    }

    /// Snapshots the matching entries before handing them out, so the whole
    /// directory is held in memory at once. A persistent provider should
    /// feed the handler while it walks the directory instead.
    fn list(
        &self,
        _subject: &Subject,
        path: &str,
        pattern: Option<&str>,
        range: ListRange,
        requested: &AttributeKinds,
        handler: &mut dyn ListHandler,
    ) -> Result<()> {
        self.enter("list");
        let pattern = pattern
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| Status::invalid_arg(format!("bad pattern: {}", e)))?;

        // Collected first so the handler runs without the lock.
        let entries: Vec<(String, FileAttributes)> = {
            let tree = self.tree.read();
            let dir_id = tree.resolve(path, true, 0)?;
            let dir = tree.get(dir_id)?;
            if !dir.is_dir() {
                return Err(Status::not_directory(path.to_string()));
            }
            dir.children
                .iter()
                .filter(|(name, _)| pattern.as_ref().map_or(true, |p| p.matches(name)))
                .enumerate()
                .filter(|(i, _)| range.contains(*i))
                .map(|(_, (name, id))| {
                    let attrs = tree
                        .get(*id)
                        .map(|e| e.attributes(*id, requested))
                        .unwrap_or_default();
                    (name.clone(), attrs)
                })
                .collect()
        };

        for (name, attrs) in entries {
            handler.add_entry(&name, attrs)?;
        }
        Ok(())
    }
}

impl CacheLocationProvider for MemoryNameSpaceProvider {
    fn add_cache_location(&self, _subject: &Subject, id: EntityId, location: &str) -> Result<()> {
        self.enter("add_cache_location");
        let mut tree = self.tree.write();
        let entry = tree.get_mut(id)?;
        if !entry.locations.iter().any(|l| l == location) {
            entry.locations.push(location.to_string());
        }
        Ok(())
    }

    fn clear_cache_location(
        &self,
        _subject: &Subject,
        id: EntityId,
        location: &str,
        remove_if_last: bool,
    ) -> Result<()> {
        self.enter("clear_cache_location");
        let mut tree = self.tree.write();
        let entry = tree.get_mut(id)?;
        entry.locations.retain(|l| l != location);
        if remove_if_last && entry.locations.is_empty() && entry.file_type == FileType::Regular {
            tree.unlink(id)?;
            debug!(%id, "last location cleared, entry removed");
        }
        Ok(())
    }

    fn get_cache_locations(&self, _subject: &Subject, id: EntityId) -> Result<Vec<String>> {
        self.enter("get_cache_locations");
        Ok(self.tree.read().get(id)?.locations.clone())
    }
}
