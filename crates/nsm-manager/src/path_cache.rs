//! Path prefix to database id cache.
//!
//! Only consulted (and only filled) when there is more than one thread
//! group. A miss is harmless: the path is then hashed onto a group.

use std::collections::BTreeMap;

use nsm_provider::path::{components, join};
use nsm_provider::NameSpaceProvider;
use nsm_types::{DatabaseId, Result, Subject};
use parking_lot::RwLock;
use tracing::{info, warn};

#[derive(Default)]
pub struct PathCache {
    prefixes: RwLock<BTreeMap<String, DatabaseId>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database id of the longest cached prefix of `path`.
    pub fn get(&self, path: &str) -> Option<DatabaseId> {
        let parts = components(path).ok()?;
        let prefixes = self.prefixes.read();
        (0..=parts.len())
            .rev()
            .find_map(|n| prefixes.get(&join(&parts[..n])).copied())
    }

    pub fn insert(&self, prefix: &str, db: DatabaseId) {
        let Ok(parts) = components(prefix) else {
            return;
        };
        self.prefixes.write().insert(join(&parts), db);
    }

    pub fn entries(&self) -> Vec<(String, DatabaseId)> {
        self.prefixes
            .read()
            .iter()
            .map(|(prefix, db)| (prefix.clone(), *db))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.prefixes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record that `path` lives in `db`, unless the cache already says so.
    ///
    /// The cached prefix is the database root: the topmost ancestor of
    /// `path` that still belongs to `db`.
    pub fn learn(&self, provider: &dyn NameSpaceProvider, path: &str, db: DatabaseId) {
        if self.get(path) == Some(db) {
            return;
        }
        match database_root(provider, path) {
            Ok(root) => {
                info!(%root, %db, "path cache updated");
                self.insert(&root, db);
            }
            Err(e) => warn!(path, "cannot determine database root: {}", e),
        }
    }
}

/// Walk up from `path` while the parent stays in the same database.
fn database_root(provider: &dyn NameSpaceProvider, path: &str) -> Result<String> {
    let root = Subject::root();
    let mut parts = components(path)?;

    // The entry itself may be gone; its nearest existing ancestor decides.
    let db = loop {
        match provider.path_to_id(&root, &join(&parts), true) {
            Ok(id) => break id.database_id(),
            Err(e) if parts.is_empty() => return Err(e),
            Err(_) => {
                parts.pop();
            }
        }
    };

    while !parts.is_empty() {
        let parent = join(&parts[..parts.len() - 1]);
        match provider.path_to_id(&root, &parent, true) {
            Ok(id) if id.database_id() == db => {
                parts.pop();
            }
            _ => break,
        }
    }
    Ok(join(&parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsm_provider::MemoryNameSpaceProvider;

    #[test]
    fn test_longest_prefix_wins() {
        let cache = PathCache::new();
        cache.insert("/pnfs", DatabaseId(1));
        cache.insert("/pnfs/data/", DatabaseId(2));
        assert_eq!(cache.get("/pnfs/data/f"), Some(DatabaseId(2)));
        assert_eq!(cache.get("/pnfs/other"), Some(DatabaseId(1)));
        assert_eq!(cache.get("/pnfs"), Some(DatabaseId(1)));
        assert_eq!(cache.get("/elsewhere"), None);
        assert_eq!(cache.get("relative"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_learn_finds_database_root() {
        let subject = Subject::root();
        let provider = MemoryNameSpaceProvider::new()
            .with_database("/data", DatabaseId(3))
            .unwrap();
        provider.create_directory(&subject, "/data", None, None, 0o755).unwrap();
        provider.create_directory(&subject, "/data/a", None, None, 0o755).unwrap();

        let cache = PathCache::new();
        cache.learn(&provider, "/data/a/missing", DatabaseId(3));
        assert_eq!(cache.entries(), vec![("/data".to_string(), DatabaseId(3))]);
        assert_eq!(cache.get("/data/b"), Some(DatabaseId(3)));

        // Already known: no further lookups.
        let calls = provider.calls();
        cache.learn(&provider, "/data/a", DatabaseId(3));
        assert_eq!(provider.calls(), calls);
    }
}
