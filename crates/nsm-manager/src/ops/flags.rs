//! Flag operations: named string attributes on an entry.

use std::collections::BTreeMap;

use nsm_types::{AttributeKind, AttributeKinds, EntityId, FileAttributes, Result, Status};
use tracing::info;

use super::{OpContext, Request};
use crate::messages::FlagOp;

fn current(ctx: &OpContext, req: &Request<'_>, id: EntityId, name: &str) -> Result<Option<String>> {
    let attrs = ctx
        .provider
        .get_file_attributes(req.subject, id, &AttributeKinds::of([AttributeKind::Flags]))?;
    Ok(attrs.flags.and_then(|mut flags| flags.remove(name)))
}

fn store(ctx: &OpContext, req: &Request<'_>, id: EntityId, name: &str, value: &str) -> Result<()> {
    let update = FileAttributes {
        flags: Some(BTreeMap::from([(name.to_string(), value.to_string())])),
        ..Default::default()
    };
    ctx.provider
        .set_file_attributes(req.subject, id, update, &AttributeKinds::empty())?;
    Ok(())
}

/// Execute a flag operation. `Get` leaves the flag's value (if any) in
/// `value`; the setters read it from there.
pub fn execute(
    ctx: &OpContext,
    req: &mut Request<'_>,
    op: FlagOp,
    name: &str,
    value: &mut Option<String>,
) -> Result<()> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;
    info!(%id, ?op, flag = name, value = ?value, "update flag");

    match op {
        FlagOp::Set => {
            let new = value.as_deref().ok_or_else(|| Status::invalid_arg("no flag value"))?;
            store(ctx, req, id, name, new)
        }
        FlagOp::SetNoOverwrite => {
            let new = value.as_deref().ok_or_else(|| Status::invalid_arg("no flag value"))?;
            match current(ctx, req, id, name)? {
                Some(_) => Ok(()),
                None => store(ctx, req, id, name, new),
            }
        }
        FlagOp::Get => {
            *value = current(ctx, req, id, name)?;
            Ok(())
        }
        FlagOp::Remove => ctx.provider.remove_file_attribute(req.subject, id, name),
    }
}
