use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::status::Status;
use crate::status_code::StatusCode;

strong_type!(Uid, u32);
strong_type!(Gid, u32);
strong_type!(
    /// Identifies the metadata partition that owns an entry.
    DatabaseId,
    u16
);
strong_type!(
    /// Unique operation id used to correlate replies with requests.
    Uoid,
    u64
);

static NEXT_UOID: AtomicU64 = AtomicU64::new(1);

impl Uoid {
    /// Allocate a fresh process-wide unique id.
    pub fn next() -> Self {
        Uoid(NEXT_UOID.fetch_add(1, Ordering::Relaxed))
    }
}

const SEQUENCE_BITS: u32 = 48;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Globally unique, lifetime-stable id of a namespace entry.
///
/// The leading 16 bits carry the [`DatabaseId`] of the owning partition, the
/// remaining 48 bits a per-partition sequence. The textual form is sixteen
/// upper-case hex digits, database id first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EntityId(u64);

impl EntityId {
    pub const TEXT_LEN: usize = 16;

    pub fn new(database: DatabaseId, sequence: u64) -> Self {
        EntityId(((database.get() as u64) << SEQUENCE_BITS) | (sequence & SEQUENCE_MASK))
    }

    pub fn database_id(&self) -> DatabaseId {
        DatabaseId((self.0 >> SEQUENCE_BITS) as u16)
    }

    pub fn sequence(&self) -> u64 {
        self.0 & SEQUENCE_MASK
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Whether `s` has the textual shape of an entity id.
    pub fn is_valid(s: &str) -> bool {
        s.len() == Self::TEXT_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({:016X})", self.0)
    }
}

impl FromStr for EntityId {
    type Err = Status;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_valid(s) {
            return Err(Status::with_message(
                StatusCode::INVALID_ARG,
                format!("invalid entity id: {}", s),
            ));
        }
        u64::from_str_radix(s, 16)
            .map(EntityId)
            .map_err(|e| Status::with_message(StatusCode::INVALID_ARG, e.to_string()))
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for EntityId {
    type Error = Status;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_embeds_database() {
        let id = EntityId::new(DatabaseId(3), 0xA1);
        assert_eq!(id.database_id(), DatabaseId(3));
        assert_eq!(id.sequence(), 0xA1);
        assert_eq!(id.to_string(), "00030000000000A1");
    }

    #[test]
    fn test_entity_id_parse() {
        let id: EntityId = "00030000000000A1".parse().unwrap();
        assert_eq!(id, EntityId::new(DatabaseId(3), 0xA1));
        assert!("0003".parse::<EntityId>().is_err());
        assert!("/pnfs/data/file".parse::<EntityId>().is_err());
        assert!(EntityId::is_valid("00030000000000a1"));
    }

    #[test]
    fn test_entity_id_serde_uses_text() {
        let id = EntityId::new(DatabaseId(1), 7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0001000000000007\"");
        assert_eq!(serde_json::from_str::<EntityId>(&json).unwrap(), id);
    }

    #[test]
    fn test_uoid_is_unique() {
        let a = Uoid::next();
        let b = Uoid::next();
        assert!(b > a);
    }
}
