//! Path and id translation.

use nsm_types::{EntityId, Result, Status};

use super::{OpContext, Request};

/// Fill in whichever of id and path the request lacks. A path always wins
/// over an id when both are given.
pub fn map_path(ctx: &OpContext, req: &mut Request<'_>, follow_links: bool) -> Result<()> {
    let id = match (req.path.clone(), *req.id) {
        (None, None) => return Err(Status::invalid_arg("no id or path defined")),
        (None, Some(id)) => {
            *req.path = Some(ctx.provider.id_to_path(req.subject, id)?);
            id
        }
        (Some(path), _) => {
            let id = ctx.path_to_id(req.subject, &path, follow_links)?;
            *req.id = Some(id);
            id
        }
    };
    req.check_mask(ctx, id)
}

pub fn get_parent(ctx: &OpContext, req: &mut Request<'_>) -> Result<EntityId> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;
    ctx.provider.parent_of(req.subject, id)
}
