use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{Gid, Uid};

/// The identity on whose behalf a namespace operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub uid: Uid,
    pub gid: Gid,
    /// Supplementary groups.
    #[serde(default)]
    pub gids: Vec<Gid>,
}

impl Subject {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid: Uid(uid),
            gid: Gid(gid),
            gids: Vec::new(),
        }
    }

    pub fn with_groups(mut self, gids: impl IntoIterator<Item = u32>) -> Self {
        self.gids = gids.into_iter().map(Gid).collect();
        self
    }

    /// The superuser identity, used for internal lookups.
    pub fn root() -> Self {
        Self::new(0, 0)
    }

    pub fn is_root(&self) -> bool {
        self.uid.get() == 0
    }

    /// Whether the subject is a member of `gid`, primary or supplementary.
    pub fn in_group(&self, gid: Gid) -> bool {
        self.gid == gid || self.gids.contains(&gid)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid={} gid={}", self.uid, self.gid)
    }
}
