//! Namespace operations.
//!
//! Each operation is a free function over an [`OpContext`] (the backends
//! and manager-wide state) and a [`Request`] (the addressing part of the
//! message). [`execute`] picks the function for the message's operation;
//! failures come back as a [`Status`] for the worker to put into the reply.

mod attributes;
mod cache_location;
mod checksum;
mod create;
mod delete;
mod flags;
pub(crate) mod list;
mod map_path;
mod rename;

use std::sync::Arc;

use nsm_permission::PermissionHandler;
use nsm_provider::{CacheLocationProvider, NameSpaceProvider};
use nsm_types::{AccessMasks, EntityId, Result, Status, Subject};
use tracing::debug;

use crate::messages::{NamespaceMessage, Operation};
use crate::relay::Relay;
use crate::routing::ShardRouting;

/// What every operation may touch.
pub struct OpContext {
    pub provider: Arc<dyn NameSpaceProvider>,
    pub locations: Arc<dyn CacheLocationProvider>,
    pub permission: Arc<dyn PermissionHandler>,
    pub routing: Arc<ShardRouting>,
    pub cache_modification_relay: Option<Relay>,
    pub delete_notification_relay: Option<Relay>,
}

impl OpContext {
    /// Resolve `path`, teaching the path cache which database it lives in.
    pub fn path_to_id(&self, subject: &Subject, path: &str, follow_links: bool) -> Result<EntityId> {
        let id = self.provider.path_to_id(subject, path, follow_links)?;
        if self.routing.caches_paths() {
            self.routing
                .path_cache()
                .learn(self.provider.as_ref(), path, id.database_id());
        }
        Ok(id)
    }

    /// Fail with permission denied unless `subject` holds `masks` on `id`.
    pub fn check_mask(&self, subject: &Subject, id: EntityId, masks: &AccessMasks) -> Result<()> {
        if subject.is_root() || masks.is_empty() {
            return Ok(());
        }
        let required = self.permission.required_attributes();
        let attrs = self.provider.get_file_attributes(subject, id, &required)?;
        let access = nsm_permission::check_mask(self.permission.as_ref(), subject, masks, &attrs);
        if access.is_denied() {
            debug!(%subject, %id, "access denied");
            return Err(Status::permission_denied("Access denied"));
        }
        Ok(())
    }

    /// Like [`check_mask`](Self::check_mask), for the entry at `path`. The
    /// path is resolved as root and without following a final link.
    pub fn check_mask_on_path(&self, subject: &Subject, path: &str, masks: &AccessMasks) -> Result<()> {
        if subject.is_root() || masks.is_empty() {
            return Ok(());
        }
        let id = self.path_to_id(&Subject::root(), path, false)?;
        self.check_mask(subject, id, masks)
    }

    pub fn relay_cache_modification(&self, msg: NamespaceMessage) {
        if let Some(relay) = &self.cache_modification_relay {
            relay.forward(msg);
        }
    }

    pub fn notify_deleted(&self, msg: NamespaceMessage) {
        if let Some(relay) = &self.delete_notification_relay {
            relay.forward(msg);
        }
    }
}

/// The addressing part of a message, borrowed apart from its operation so
/// operations can fill in a missing id or path.
pub struct Request<'a> {
    pub id: &'a mut Option<EntityId>,
    pub path: &'a mut Option<String>,
    pub subject: &'a Subject,
    pub access_mask: &'a AccessMasks,
}

impl Request<'_> {
    /// The entry's id, resolved (following links) from the path if needed.
    pub fn populate_id(&mut self, ctx: &OpContext) -> Result<EntityId> {
        if let Some(id) = *self.id {
            return Ok(id);
        }
        let Some(path) = self.path.as_deref() else {
            return Err(Status::invalid_arg("no id or path defined"));
        };
        let id = ctx.path_to_id(self.subject, path, true)?;
        *self.id = Some(id);
        Ok(id)
    }

    pub fn require_path(&self) -> Result<&str> {
        self.path
            .as_deref()
            .ok_or_else(|| Status::invalid_arg("no path defined"))
    }

    /// Check the request's access mask against the entry `id`.
    pub fn check_mask(&self, ctx: &OpContext, id: EntityId) -> Result<()> {
        ctx.check_mask(self.subject, id, self.access_mask)
    }
}

/// Run the operation of `msg` and store its results in place.
///
/// Directory listings stream their answer and go through
/// [`list::execute`] instead.
pub fn execute(ctx: &OpContext, msg: &mut NamespaceMessage) -> Result<()> {
    let NamespaceMessage {
        id,
        path,
        subject,
        access_mask,
        op,
        ..
    } = msg;
    let mut req = Request {
        id,
        path,
        subject,
        access_mask,
    };

    match op {
        Operation::AddCacheLocation { location } => cache_location::add(ctx, &mut req, location),
        Operation::ClearCacheLocation {
            location,
            remove_if_last,
        } => cache_location::clear(ctx, &mut req, location, *remove_if_last),
        Operation::GetCacheLocations { locations } => {
            *locations = cache_location::get(ctx, &mut req)?;
            Ok(())
        }
        Operation::CreateSymLink {
            destination,
            owner,
            group,
        } => create::symlink(ctx, &mut req, destination, *owner, *group),
        Operation::CreateDirectory {
            owner,
            group,
            mode,
            requested,
            attributes,
        } => create::directory(ctx, &mut req, *owner, *group, *mode, requested, attributes),
        Operation::CreateEntry {
            owner,
            group,
            mode,
            requested,
            attributes,
        } => create::entry(ctx, &mut req, *owner, *group, *mode, requested, attributes),
        Operation::DeleteEntry { allowed } => delete::execute(ctx, &mut req, allowed),
        Operation::Rename {
            new_name,
            overwrite,
        } => rename::execute(ctx, &mut req, new_name, *overwrite),
        Operation::MapPath { follow_links } => map_path::map_path(ctx, &mut req, *follow_links),
        Operation::GetParent { parent } => {
            *parent = Some(map_path::get_parent(ctx, &mut req)?);
            Ok(())
        }
        Operation::GetFileAttributes {
            requested,
            attributes,
        } => {
            *attributes = attributes::get(ctx, &mut req, requested)?;
            Ok(())
        }
        Operation::SetFileAttributes {
            attributes,
            acquire,
            acquired,
        } => {
            *acquired = attributes::set(ctx, &mut req, attributes, acquire)?;
            Ok(())
        }
        Operation::SetChecksum { checksum } => checksum::set(ctx, &mut req, checksum),
        Operation::RemoveChecksum { kind } => checksum::remove(ctx, &mut req, *kind),
        Operation::Flag { op, name, value } => flags::execute(ctx, &mut req, *op, name, value),
        Operation::FileFlushed { attributes } => attributes::flushed(ctx, &mut req, attributes),
        Operation::ListDirectory { .. } => Err(Status::unexpected(
            "directory listings are served by the list workers",
        )),
    }
}
