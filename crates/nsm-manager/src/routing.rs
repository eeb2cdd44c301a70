//! Queue selection.
//!
//! Main queue index = `group * threads + hash % threads`, where the group
//! comes from the database id of the addressed entry. Requests for one
//! entry therefore always meet the same worker, which is what orders them.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use nsm_types::{EntityId, Result, Status};
use rand::Rng;
use tracing::debug;

use crate::messages::{NamespaceMessage, OperationKind};
use crate::path_cache::PathCache;

/// Which queue a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSelection {
    Main(usize),
    Location(usize),
    List(usize),
}

fn hash_of<K: Hash + ?Sized>(key: &K) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() as usize
}

pub struct ShardRouting {
    threads: usize,
    groups: usize,
    location_threads: usize,
    cache: PathCache,
}

impl ShardRouting {
    pub fn new(threads: usize, groups: usize, location_threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            groups: groups.max(1),
            location_threads,
            cache: PathCache::new(),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn path_cache(&self) -> &PathCache {
        &self.cache
    }

    /// Whether the path cache is in use at all.
    pub fn caches_paths(&self) -> bool {
        self.groups > 1
    }

    pub fn group_of_id(&self, id: EntityId) -> usize {
        id.database_id().get() as usize % self.groups
    }

    pub fn group_of_path(&self, path: &str) -> usize {
        if self.groups == 1 {
            return 0;
        }
        match self.cache.get(path) {
            Some(db) => db.get() as usize % self.groups,
            None => {
                debug!(path, "path cache miss");
                hash_of(path) % self.groups
            }
        }
    }

    pub fn select(&self, msg: &NamespaceMessage) -> Result<QueueSelection> {
        let kind = msg.op.kind();
        if kind == OperationKind::ListDirectory {
            let group = match (msg.id, msg.path.as_deref()) {
                (Some(id), _) => self.group_of_id(id),
                (None, Some(path)) => self.group_of_path(path),
                (None, None) => return Err(Status::invalid_arg("Missing id and path")),
            };
            debug!(group, "using list queue");
            return Ok(QueueSelection::List(group));
        }

        if kind.uses_cache_location_pool() && self.location_threads > 0 {
            let index = match (msg.id, msg.path.as_deref()) {
                (Some(id), _) => hash_of(&id) % self.location_threads,
                (None, Some(path)) => hash_of(path) % self.location_threads,
                (None, None) => rand::thread_rng().gen_range(0..self.location_threads),
            };
            debug!(index, "using location queue");
            return Ok(QueueSelection::Location(index));
        }

        let index = match (msg.id, msg.path.as_deref()) {
            (Some(id), _) => self.group_of_id(id) * self.threads + hash_of(&id) % self.threads,
            (None, Some(path)) => {
                self.group_of_path(path) * self.threads + hash_of(path) % self.threads
            }
            (None, None) => rand::thread_rng().gen_range(0..self.threads * self.groups),
        };
        debug!(index, "using main queue");
        Ok(QueueSelection::Main(index))
    }
}
