//! Delete operation: remove a file, link or empty directory.

use nsm_types::{AttributeKind, AttributeKinds, EntityId, FileType, FileTypes, Result, Status};
use tracing::info;

use super::{OpContext, Request};
use crate::messages::{NamespaceMessage, Operation};

fn check_type(ctx: &OpContext, req: &Request<'_>, id: EntityId, allowed: &FileTypes) -> Result<()> {
    let attrs = ctx
        .provider
        .get_file_attributes(req.subject, id, &AttributeKinds::of([AttributeKind::Type]))?;
    match attrs.file_type {
        Some(t) if !allowed.contains(t) => {
            let msg = "Path exists but is not of the expected type";
            Err(if allowed.contains(FileType::Dir) {
                Status::not_directory(msg)
            } else {
                Status::not_file(msg)
            })
        }
        _ => Ok(()),
    }
}

/// Execute a delete operation.
///
/// A path names the entry itself (a trailing link is not followed). When
/// both an id and a path are given they must name the same entry.
pub fn execute(ctx: &OpContext, req: &mut Request<'_>, allowed: &FileTypes) -> Result<()> {
    let none = AttributeKinds::empty();
    match (req.path.clone(), *req.id) {
        (Some(path), given) => {
            let id = ctx.path_to_id(req.subject, &path, false)?;
            req.check_mask(ctx, id)?;
            if given.is_some_and(|given| given != id) {
                return Err(Status::not_found("id does not correspond to the given path"));
            }
            *req.id = Some(id);
            check_type(ctx, req, id, allowed)?;
            ctx.provider
                .delete_entry_by_path(req.subject, allowed, &path, &none)?;
        }
        (None, Some(id)) => {
            check_type(ctx, req, id, allowed)?;
            req.check_mask(ctx, id)?;
            ctx.provider.delete_entry(req.subject, allowed, id, &none)?;
        }
        (None, None) => return Err(Status::invalid_arg("id or path has to be defined")),
    }

    info!(id = ?req.id, path = ?req.path, "entry deleted");
    let mut notification = NamespaceMessage::new(Operation::delete_entry(*allowed))
        .with_subject(req.subject.clone());
    notification.id = *req.id;
    notification.path = req.path.clone();
    ctx.notify_deleted(notification);
    Ok(())
}
