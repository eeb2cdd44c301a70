//! Administrative console of the namespace manager.
//!
//! Every command line is parsed with clap and answered with a printable
//! string; failures are rendered into that string as well. Multi-word
//! commands (`set log slow threshold`, `add file checksum`, ...) are joined
//! into their hyphenated subcommand names before parsing.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use nsm_types::{
    AttributeKind, AttributeKinds, Checksum, ChecksumType, EntityId, FileAttributes, Gid, Result,
    Status, Subject, Uid,
};

use crate::manager::NamespaceManager;
use crate::ops::OpContext;

const PHRASES: &[&str] = &[
    "set log slow threshold",
    "get log slow threshold",
    "show path cache",
    "add file cache location",
    "clear file cache location",
    "add file checksum",
    "clear file checksum",
    "get file checksum",
    "set file size",
    "set meta",
];

#[derive(Debug, Parser)]
#[command(name = "nsm", no_binary_name = true)]
struct AdminLine {
    #[command(subcommand)]
    command: AdminCommand,
}

#[derive(Debug, Subcommand)]
enum AdminCommand {
    /// Queue sizes and per-operation statistics.
    Info,

    /// Log the requests waiting in one or all queues.
    #[command(name = "dumpthreadqueues")]
    DumpThreadQueues { queue: Option<usize> },

    /// Known path prefix to database mappings.
    ShowPathCache,

    /// Warn about operations slower than this many milliseconds.
    SetLogSlowThreshold {
        /// Milliseconds, or `disabled`.
        value: String,
    },

    GetLogSlowThreshold,

    /// Resolve a path to its id.
    #[command(name = "pnfsidof")]
    IdOf { path: String },

    /// List the cache locations of a file.
    #[command(name = "cacheinfoof")]
    CacheInfoOf { target: String },

    /// Resolve an id to its path.
    #[command(name = "pathfinder")]
    PathFinder { id: EntityId },

    Rename { target: String, new_name: String },

    /// Change owner, group and permission bits.
    SetMeta {
        target: String,
        uid: u32,
        gid: u32,
        /// Octal permission bits, e.g. `644`.
        mode: String,
    },

    #[command(name = "storageinfoof")]
    StorageInfoOf {
        target: String,
        /// Also print access latency, retention policy and locations.
        #[arg(short = 'v')]
        verbose: bool,
    },

    /// Type, permissions, ownership and timestamps.
    #[command(name = "metadataof")]
    MetadataOf { target: String },

    #[command(subcommand)]
    Flags(FlagsCommand),

    SetFileSize { id: EntityId, size: u64 },

    AddFileCacheLocation { id: EntityId, location: String },

    ClearFileCacheLocation {
        id: EntityId,
        location: String,
        /// Delete the file once it has no location left.
        #[arg(long)]
        remove_if_last: bool,
    },

    AddFileChecksum(ChecksumArgs),

    ClearFileChecksum { id: EntityId, kind: ChecksumType },

    GetFileChecksum { id: EntityId, kind: ChecksumType },
}

#[derive(Debug, Args)]
struct ChecksumArgs {
    id: EntityId,
    kind: ChecksumType,
    value: String,
}

#[derive(Debug, Subcommand)]
enum FlagsCommand {
    /// Set flags given as `key=value`.
    Set {
        target: String,
        #[arg(required = true)]
        flags: Vec<String>,
    },
    Remove {
        target: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    Ls { target: String },
}

impl AdminCommand {
    fn name(&self) -> &'static str {
        match self {
            AdminCommand::Info => "info",
            AdminCommand::DumpThreadQueues { .. } => "dumpthreadqueues",
            AdminCommand::ShowPathCache => "show path cache",
            AdminCommand::SetLogSlowThreshold { .. } => "set log slow threshold",
            AdminCommand::GetLogSlowThreshold => "get log slow threshold",
            AdminCommand::IdOf { .. } => "pnfsidof",
            AdminCommand::CacheInfoOf { .. } => "cacheinfoof",
            AdminCommand::PathFinder { .. } => "pathfinder",
            AdminCommand::Rename { .. } => "rename",
            AdminCommand::SetMeta { .. } => "set meta",
            AdminCommand::StorageInfoOf { .. } => "storageinfoof",
            AdminCommand::MetadataOf { .. } => "metadataof",
            AdminCommand::Flags(_) => "flags",
            AdminCommand::SetFileSize { .. } => "set file size",
            AdminCommand::AddFileCacheLocation { .. } => "add file cache location",
            AdminCommand::ClearFileCacheLocation { .. } => "clear file cache location",
            AdminCommand::AddFileChecksum(_) => "add file checksum",
            AdminCommand::ClearFileChecksum { .. } => "clear file checksum",
            AdminCommand::GetFileChecksum { .. } => "get file checksum",
        }
    }
}

/// Join the words of a known multi-word command into its subcommand name.
fn normalize(line: &str) -> Vec<String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    for phrase in PHRASES {
        let parts: Vec<&str> = phrase.split(' ').collect();
        if words.len() >= parts.len() && words[..parts.len()] == parts[..] {
            let mut args = vec![parts.join("-")];
            args.extend(words[parts.len()..].iter().map(|w| w.to_string()));
            return args;
        }
    }
    words.into_iter().map(str::to_string).collect()
}

pub struct AdminConsole {
    manager: Arc<NamespaceManager>,
    root: Subject,
}

impl AdminConsole {
    pub fn new(manager: Arc<NamespaceManager>) -> Self {
        Self {
            manager,
            root: Subject::root(),
        }
    }

    /// Run one command line and return what to print.
    pub fn execute(&self, line: &str) -> String {
        let line = match AdminLine::try_parse_from(normalize(line)) {
            Ok(line) => line,
            Err(e) => return e.to_string(),
        };
        let name = line.command.name();
        match self.run(line.command) {
            Ok(out) => out,
            Err(status) => format!("{} failed: {}", name, status),
        }
    }

    fn ctx(&self) -> &OpContext {
        self.manager.context()
    }

    /// An id, or a path resolved to one.
    fn resolve(&self, target: &str) -> Result<EntityId> {
        if EntityId::is_valid(target) {
            target.parse()
        } else {
            self.ctx().provider.path_to_id(&self.root, target, true)
        }
    }

    fn attributes(&self, id: EntityId, kinds: impl IntoIterator<Item = AttributeKind>) -> Result<FileAttributes> {
        self.ctx()
            .provider
            .get_file_attributes(&self.root, id, &AttributeKinds::of(kinds))
    }

    fn update(&self, id: EntityId, attrs: FileAttributes) -> Result<String> {
        self.ctx()
            .provider
            .set_file_attributes(&self.root, id, attrs, &AttributeKinds::empty())?;
        Ok("Ok".to_string())
    }

    fn run(&self, command: AdminCommand) -> Result<String> {
        let provider = &self.ctx().provider;
        match command {
            AdminCommand::Info => Ok(self.manager.info()),
            AdminCommand::DumpThreadQueues { queue } => {
                self.manager.dump_queues(queue)?;
                Ok("dumped".to_string())
            }
            AdminCommand::ShowPathCache => {
                let mut out = String::new();
                for (prefix, db) in self.manager.routing().path_cache().entries() {
                    let _ = writeln!(out, "{} -> {}", prefix, db);
                }
                Ok(out)
            }
            AdminCommand::SetLogSlowThreshold { value } => {
                if value == "disabled" {
                    self.manager.set_slow_threshold(None);
                    return Ok(String::new());
                }
                let Ok(ms) = value.parse::<u64>() else {
                    return Ok(format!("Badly formatted number {}", value));
                };
                if ms == 0 {
                    return Ok("Timeout must be greater than zero".to_string());
                }
                self.manager.set_slow_threshold(Some(Duration::from_millis(ms)));
                Ok(String::new())
            }
            AdminCommand::GetLogSlowThreshold => Ok(match self.manager.slow_threshold() {
                Some(threshold) => threshold.as_millis().to_string(),
                None => "disabled".to_string(),
            }),
            AdminCommand::IdOf { path } => {
                Ok(provider.path_to_id(&self.root, &path, true)?.to_string())
            }
            AdminCommand::CacheInfoOf { target } => {
                let id = self.resolve(&target)?;
                let mut out = String::new();
                for location in self.ctx().locations.get_cache_locations(&self.root, id)? {
                    out.push(' ');
                    out.push_str(&location);
                }
                out.push('\n');
                Ok(out)
            }
            AdminCommand::PathFinder { id } => provider.id_to_path(&self.root, id),
            AdminCommand::Rename { target, new_name } => {
                let id = self.resolve(&target)?;
                provider.rename(&self.root, id, &new_name, true)?;
                Ok("Ok".to_string())
            }
            AdminCommand::SetMeta {
                target,
                uid,
                gid,
                mode,
            } => {
                let id = self.resolve(&target)?;
                let mode = u32::from_str_radix(&mode, 8)
                    .map_err(|_| Status::invalid_arg(format!("Badly formatted mode {}", mode)))?;
                self.update(
                    id,
                    FileAttributes {
                        owner: Some(Uid(uid)),
                        group: Some(Gid(gid)),
                        mode: Some(mode & 0o7777),
                        ..Default::default()
                    },
                )
            }
            AdminCommand::StorageInfoOf { target, verbose } => {
                let id = self.resolve(&target)?;
                let attrs = self.attributes(
                    id,
                    [
                        AttributeKind::StorageInfo,
                        AttributeKind::AccessLatency,
                        AttributeKind::RetentionPolicy,
                        AttributeKind::Locations,
                    ],
                )?;
                let info = attrs
                    .storage_info
                    .ok_or_else(|| Status::not_file(format!("{} has no storage info", target)))?;
                if !verbose {
                    return Ok(info.to_string());
                }
                let mut out = String::new();
                let _ = writeln!(out, " Storage Info     : {}", info);
                let _ = writeln!(out, " Access Latency   : {:?}", attrs.access_latency);
                let _ = writeln!(out, " Retention Policy : {:?}", attrs.retention_policy);
                let _ = writeln!(
                    out,
                    " Locations        : {}",
                    attrs.locations.unwrap_or_default().join(",")
                );
                Ok(out)
            }
            AdminCommand::MetadataOf { target } => {
                let id = self.resolve(&target)?;
                let attrs = self.attributes(
                    id,
                    [
                        AttributeKind::Type,
                        AttributeKind::Mode,
                        AttributeKind::Owner,
                        AttributeKind::OwnerGroup,
                        AttributeKind::CreationTime,
                        AttributeKind::ModificationTime,
                        AttributeKind::AccessTime,
                    ],
                )?;
                let mut out = format!(
                    "{};{};{}",
                    attrs.mode_string().unwrap_or_default(),
                    attrs.owner.map(|u| u.to_string()).unwrap_or_default(),
                    attrs.group.map(|g| g.to_string()).unwrap_or_default(),
                );
                let times: Vec<String> = [
                    ("c", attrs.creation_time),
                    ("m", attrs.modification_time),
                    ("a", attrs.access_time),
                ]
                .into_iter()
                .filter_map(|(tag, t)| t.map(|t| format!("{}={}", tag, t.format("%Y-%m-%d %H:%M:%S"))))
                .collect();
                if !times.is_empty() {
                    let _ = write!(out, "[{}]", times.join(";"));
                }
                Ok(out)
            }
            AdminCommand::Flags(command) => self.flags(command),
            AdminCommand::SetFileSize { id, size } => self.update(
                id,
                FileAttributes {
                    size: Some(size),
                    ..Default::default()
                },
            ),
            AdminCommand::AddFileCacheLocation { id, location } => {
                self.ctx().locations.add_cache_location(&self.root, id, &location)?;
                Ok("Ok".to_string())
            }
            AdminCommand::ClearFileCacheLocation {
                id,
                location,
                remove_if_last,
            } => {
                self.ctx()
                    .locations
                    .clear_cache_location(&self.root, id, &location, remove_if_last)?;
                Ok("Ok".to_string())
            }
            AdminCommand::AddFileChecksum(ChecksumArgs { id, kind, value }) => self.update(
                id,
                FileAttributes {
                    checksums: Some(vec![Checksum::new(kind, &value)?]),
                    ..Default::default()
                },
            ),
            AdminCommand::ClearFileChecksum { id, kind } => {
                provider.remove_checksum(&self.root, id, kind)?;
                Ok("Ok".to_string())
            }
            AdminCommand::GetFileChecksum { id, kind } => {
                let attrs = self.attributes(id, [AttributeKind::Checksum])?;
                Ok(attrs
                    .checksums
                    .unwrap_or_default()
                    .into_iter()
                    .find(|c| c.kind == kind)
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| format!("No {} checksum", kind)))
            }
        }
    }

    fn flags(&self, command: FlagsCommand) -> Result<String> {
        let provider = &self.ctx().provider;
        match command {
            FlagsCommand::Set { target, flags } => {
                let id = self.resolve(&target)?;
                let mut parsed = BTreeMap::new();
                for flag in flags {
                    let (key, value) = flag
                        .split_once('=')
                        .ok_or_else(|| Status::invalid_arg(format!("Badly formatted flag {}", flag)))?;
                    parsed.insert(key.to_string(), value.to_string());
                }
                self.update(
                    id,
                    FileAttributes {
                        flags: Some(parsed),
                        ..Default::default()
                    },
                )
            }
            FlagsCommand::Remove { target, keys } => {
                let id = self.resolve(&target)?;
                for key in keys {
                    provider.remove_file_attribute(&self.root, id, &key)?;
                }
                Ok("Ok".to_string())
            }
            FlagsCommand::Ls { target } => {
                let id = self.resolve(&target)?;
                let flags = self.attributes(id, [AttributeKind::Flags])?.flags.unwrap_or_default();
                let mut out = String::new();
                for (key, value) in flags {
                    let _ = writeln!(out, "{} -> {}", key, value);
                }
                Ok(out)
            }
        }
    }
}
