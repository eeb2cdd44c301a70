//! Attribute operations: read, update, and record a completed flush.

use nsm_types::{AttributeKind, AttributeKinds, FileAttributes, Result};
use tracing::info;

use super::{OpContext, Request};
use crate::messages::{NamespaceMessage, Operation};

/// Fetch the `requested` attributes.
///
/// Asking for the storage info also brings in owner and group, which are
/// stamped into the storage info as `uid`/`gid` keys along with the path.
pub fn get(ctx: &OpContext, req: &mut Request<'_>, requested: &AttributeKinds) -> Result<FileAttributes> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;

    let mut fetch = *requested;
    if requested.contains(AttributeKind::StorageInfo) {
        fetch.insert(AttributeKind::Owner);
        fetch.insert(AttributeKind::OwnerGroup);
    }
    let mut attrs = ctx.provider.get_file_attributes(req.subject, id, &fetch)?;

    let (owner, group) = (attrs.owner, attrs.group);
    if let Some(info) = attrs.storage_info.as_mut() {
        if info.key("path").is_none() {
            if let Some(path) = req.path.as_deref() {
                info.set_key("path", path);
            }
        }
        if let Some(owner) = owner {
            info.set_key("uid", owner.to_string());
        }
        if let Some(group) = group {
            info.set_key("gid", group.to_string());
        }
    }
    Ok(attrs)
}

/// Apply `attributes` and return the `acquire` ones afterwards. New
/// locations are also announced to the cache modification relay.
pub fn set(
    ctx: &OpContext,
    req: &mut Request<'_>,
    attributes: &FileAttributes,
    acquire: &AttributeKinds,
) -> Result<FileAttributes> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;

    for location in attributes.locations.iter().flatten() {
        ctx.relay_cache_modification(
            NamespaceMessage::new(Operation::add_cache_location(location.clone()))
                .with_id(id)
                .with_subject(req.subject.clone()),
        );
    }

    ctx.provider
        .set_file_attributes(req.subject, id, attributes.clone(), acquire)
}

/// Persist the storage info a pool reported after flushing the file.
pub fn flushed(ctx: &OpContext, req: &mut Request<'_>, attributes: &FileAttributes) -> Result<()> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;
    info!(%id, "file flushed");
    let update = FileAttributes {
        storage_info: attributes.storage_info.clone(),
        ..Default::default()
    };
    ctx.provider
        .set_file_attributes(req.subject, id, update, &AttributeKinds::empty())?;
    Ok(())
}
