//! File attributes and the vocabulary used to request them.
//!
//! A [`FileAttributes`] value only carries the kinds that were requested and
//! available; every field is optional and [`FileAttributes::defined`] tells
//! which ones are present, so "requested but absent" stays distinguishable
//! from "defined".

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::access::{format_masks, AccessMasks};
use crate::enum_set::EnumSet;
use crate::ids::{EntityId, Gid, Uid};
use crate::status::Status;

/// Every attribute a namespace entry may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AttributeKind {
    EntityId = 0,
    Type = 1,
    Size = 2,
    Owner = 3,
    OwnerGroup = 4,
    Mode = 5,
    Acl = 6,
    Checksum = 7,
    StorageInfo = 8,
    Locations = 9,
    Parent = 10,
    AccessLatency = 11,
    RetentionPolicy = 12,
    Flags = 13,
    CreationTime = 14,
    ModificationTime = 15,
    AccessTime = 16,
}

pub type AttributeKinds = EnumSet<AttributeKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FileType {
    Regular = 0,
    Dir = 1,
    Link = 2,
    Special = 3,
}

pub type FileTypes = EnumSet<FileType>;

impl FileType {
    /// The leading character of an `ls -l` style mode string.
    pub fn type_char(&self) -> char {
        match self {
            FileType::Regular => '-',
            FileType::Dir => 'd',
            FileType::Link => 'l',
            FileType::Special => 'x',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChecksumType {
    Adler32 = 1,
    Md5 = 2,
    Md4 = 3,
}

impl ChecksumType {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChecksumType::Adler32 => "ADLER32",
            ChecksumType::Md5 => "MD5",
            ChecksumType::Md4 => "MD4",
        }
    }

    /// Number of hex digits in a value of this type.
    pub fn hex_len(&self) -> usize {
        match self {
            ChecksumType::Adler32 => 8,
            ChecksumType::Md5 | ChecksumType::Md4 => 32,
        }
    }
}

impl FromStr for ChecksumType {
    type Err = Status;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "1" | "ADLER32" => Ok(ChecksumType::Adler32),
            "2" | "MD5" | "MD5_TYPE" => Ok(ChecksumType::Md5),
            "3" | "MD4" | "MD4_TYPE" => Ok(ChecksumType::Md4),
            _ => Err(Status::invalid_arg(format!("unsupported checksum type: {}", s))),
        }
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum {
    pub kind: ChecksumType,
    pub value: String,
}

impl Checksum {
    /// Build a checksum, normalising the value to lower-case hex.
    pub fn new(kind: ChecksumType, value: &str) -> Result<Self, Status> {
        let value = value.trim().to_ascii_lowercase();
        if value.len() != kind.hex_len() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Status::invalid_arg(format!(
                "invalid {} checksum value: {}",
                kind, value
            )));
        }
        Ok(Self { kind, value })
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.code(), self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessLatency {
    Online,
    Nearline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionPolicy {
    Replica,
    Output,
    Custodial,
}

/// Describes where the storage backend keeps (or will keep) the file's data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageInfo {
    pub hsm: String,
    pub storage_class: String,
    pub stored: bool,
    pub keys: BTreeMap<String, String>,
}

impl StorageInfo {
    pub fn new(hsm: impl Into<String>, storage_class: impl Into<String>) -> Self {
        Self {
            hsm: hsm.into(),
            storage_class: storage_class.into(),
            ..Default::default()
        }
    }

    pub fn set_key(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.keys.insert(key.into(), value.into());
    }

    pub fn key(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }
}

impl fmt::Display for StorageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{};stored={}", self.storage_class, self.hsm, self.stored)?;
        for (k, v) in &self.keys {
            write!(f, ";{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Whom an ACL entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AceWho {
    Owner,
    OwnerGroup,
    Everyone,
    User(Uid),
    Group(Gid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AceKind {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub who: AceWho,
    pub kind: AceKind,
    pub masks: AccessMasks,
}

impl fmt::Display for Ace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = match self.who {
            AceWho::Owner => "OWNER@".to_string(),
            AceWho::OwnerGroup => "GROUP@".to_string(),
            AceWho::Everyone => "EVERYONE@".to_string(),
            AceWho::User(uid) => format!("USER:{}", uid),
            AceWho::Group(gid) => format!("GROUP:{}", gid),
        };
        let kind = match self.kind {
            AceKind::Allow => 'A',
            AceKind::Deny => 'D',
        };
        write!(f, "{}:{}:{}", who, format_masks(&self.masks), kind)
    }
}

/// Ordered access control list; the first entry matching both subject and
/// mask decides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    pub entries: Vec<Ace>,
}

impl Acl {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A partially populated attribute set for one entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileAttributes {
    pub entity_id: Option<EntityId>,
    pub file_type: Option<FileType>,
    pub size: Option<u64>,
    pub owner: Option<Uid>,
    pub group: Option<Gid>,
    pub mode: Option<u32>,
    pub acl: Option<Acl>,
    pub checksums: Option<Vec<Checksum>>,
    pub storage_info: Option<StorageInfo>,
    pub locations: Option<Vec<String>>,
    pub parent: Option<EntityId>,
    pub access_latency: Option<AccessLatency>,
    pub retention_policy: Option<RetentionPolicy>,
    pub flags: Option<BTreeMap<String, String>>,
    pub creation_time: Option<DateTime<Utc>>,
    pub modification_time: Option<DateTime<Utc>>,
    pub access_time: Option<DateTime<Utc>>,
}

impl FileAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set of kinds currently present.
    pub fn defined(&self) -> AttributeKinds {
        let mut kinds = EnumSet::empty();
        let mut mark = |present: bool, kind| {
            if present {
                kinds.insert(kind);
            }
        };
        mark(self.entity_id.is_some(), AttributeKind::EntityId);
        mark(self.file_type.is_some(), AttributeKind::Type);
        mark(self.size.is_some(), AttributeKind::Size);
        mark(self.owner.is_some(), AttributeKind::Owner);
        mark(self.group.is_some(), AttributeKind::OwnerGroup);
        mark(self.mode.is_some(), AttributeKind::Mode);
        mark(self.acl.is_some(), AttributeKind::Acl);
        mark(self.checksums.is_some(), AttributeKind::Checksum);
        mark(self.storage_info.is_some(), AttributeKind::StorageInfo);
        mark(self.locations.is_some(), AttributeKind::Locations);
        mark(self.parent.is_some(), AttributeKind::Parent);
        mark(self.access_latency.is_some(), AttributeKind::AccessLatency);
        mark(self.retention_policy.is_some(), AttributeKind::RetentionPolicy);
        mark(self.flags.is_some(), AttributeKind::Flags);
        mark(self.creation_time.is_some(), AttributeKind::CreationTime);
        mark(self.modification_time.is_some(), AttributeKind::ModificationTime);
        mark(self.access_time.is_some(), AttributeKind::AccessTime);
        kinds
    }

    pub fn is_defined(&self, kind: AttributeKind) -> bool {
        self.defined().contains(kind)
    }

    /// Drop every attribute not in `kinds`.
    pub fn retain(&mut self, kinds: &AttributeKinds) {
        for kind in self.defined().difference(kinds).iter() {
            self.undefine(kind);
        }
    }

    /// Clear one attribute.
    pub fn undefine(&mut self, kind: AttributeKind) {
        match kind {
            AttributeKind::EntityId => self.entity_id = None,
            AttributeKind::Type => self.file_type = None,
            AttributeKind::Size => self.size = None,
            AttributeKind::Owner => self.owner = None,
            AttributeKind::OwnerGroup => self.group = None,
            AttributeKind::Mode => self.mode = None,
            AttributeKind::Acl => self.acl = None,
            AttributeKind::Checksum => self.checksums = None,
            AttributeKind::StorageInfo => self.storage_info = None,
            AttributeKind::Locations => self.locations = None,
            AttributeKind::Parent => self.parent = None,
            AttributeKind::AccessLatency => self.access_latency = None,
            AttributeKind::RetentionPolicy => self.retention_policy = None,
            AttributeKind::Flags => self.flags = None,
            AttributeKind::CreationTime => self.creation_time = None,
            AttributeKind::ModificationTime => self.modification_time = None,
            AttributeKind::AccessTime => self.access_time = None,
        }
    }

    /// Rendered `ls -l` style permission string, e.g. `-rwxr-x---`.
    pub fn mode_string(&self) -> Option<String> {
        let mode = self.mode?;
        let mut out = String::with_capacity(10);
        out.push(self.file_type.map(|t| t.type_char()).unwrap_or('x'));
        for shift in [6u32, 3, 0] {
            let bits = (mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        Some(out)
    }
}
