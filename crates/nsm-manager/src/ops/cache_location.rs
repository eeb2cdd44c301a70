//! Cache location operations: record, drop and report where replicas live.

use nsm_types::Result;

use super::{OpContext, Request};

/// Record a new replica.
pub fn add(ctx: &OpContext, req: &mut Request<'_>, location: &str) -> Result<()> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;
    ctx.locations.add_cache_location(req.subject, id, location)
}

pub fn clear(ctx: &OpContext, req: &mut Request<'_>, location: &str, remove_if_last: bool) -> Result<()> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;
    ctx.locations
        .clear_cache_location(req.subject, id, location, remove_if_last)
}

pub fn get(ctx: &OpContext, req: &mut Request<'_>) -> Result<Vec<String>> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;
    ctx.locations.get_cache_locations(req.subject, id)
}
