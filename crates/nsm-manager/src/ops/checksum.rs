//! Checksum operations.

use nsm_types::{AttributeKinds, Checksum, ChecksumType, FileAttributes, Result};

use super::{OpContext, Request};

/// Store `checksum`. Storing a different value for a type that already has
/// one fails with attribute-exists.
pub fn set(ctx: &OpContext, req: &mut Request<'_>, checksum: &Checksum) -> Result<()> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;
    let update = FileAttributes {
        checksums: Some(vec![checksum.clone()]),
        ..Default::default()
    };
    ctx.provider
        .set_file_attributes(req.subject, id, update, &AttributeKinds::empty())?;
    Ok(())
}

pub fn remove(ctx: &OpContext, req: &mut Request<'_>, kind: ChecksumType) -> Result<()> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;
    ctx.provider.remove_checksum(req.subject, id, kind)
}
