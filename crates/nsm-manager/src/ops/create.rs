//! Create operations: files, directories and symbolic links.
//!
//! The access mask of a create request is checked against the parent
//! directory, since the entry does not exist yet.

use nsm_provider::path::split_last;
use nsm_types::{AttributeKind, AttributeKinds, FileAttributes, Gid, Result, Subject, Uid};
use tracing::{info, warn};

use super::{OpContext, Request};

fn check_parent(ctx: &OpContext, req: &Request<'_>, path: &str) -> Result<()> {
    let (parent, _) = split_last(path)?;
    ctx.check_mask_on_path(req.subject, &parent, req.access_mask)
}

/// Execute a symbolic link creation
pub fn symlink(
    ctx: &OpContext,
    req: &mut Request<'_>,
    destination: &str,
    owner: Option<Uid>,
    group: Option<Gid>,
) -> Result<()> {
    let path = req.require_path()?.to_string();
    check_parent(ctx, req, &path)?;
    let id = ctx
        .provider
        .create_symlink(req.subject, &path, destination, owner, group)?;
    info!(%path, %id, destination, "symbolic link created");
    *req.id = Some(id);
    Ok(())
}

/// Execute a directory creation.
///
/// A failure to read back the `requested` attributes does not undo the
/// creation; the reply then carries none.
pub fn directory(
    ctx: &OpContext,
    req: &mut Request<'_>,
    owner: Option<Uid>,
    group: Option<Gid>,
    mode: u32,
    requested: &AttributeKinds,
    attributes: &mut FileAttributes,
) -> Result<()> {
    let path = req.require_path()?.to_string();
    check_parent(ctx, req, &path)?;
    let id = ctx
        .provider
        .create_directory(req.subject, &path, owner, group, mode)?;
    *req.id = Some(id);

    if !requested.is_empty() {
        match ctx
            .provider
            .get_file_attributes(&Subject::root(), id, requested)
        {
            Ok(attrs) => *attributes = attrs,
            Err(e) => warn!(%path, %id, "Can't determine storageInfo: {}", e),
        }
    }
    Ok(())
}

/// Execute a regular file creation.
///
/// The returned storage info always carries the `path`, `uid` and `gid`
/// keys the pools expect.
pub fn entry(
    ctx: &OpContext,
    req: &mut Request<'_>,
    owner: Option<Uid>,
    group: Option<Gid>,
    mode: u32,
    requested: &AttributeKinds,
    attributes: &mut FileAttributes,
) -> Result<()> {
    let path = req.require_path()?.to_string();
    check_parent(ctx, req, &path)?;

    let fetch = requested
        .with(AttributeKind::StorageInfo)
        .with(AttributeKind::EntityId);
    let mut attrs = ctx
        .provider
        .create_file(req.subject, &path, owner, group, mode, &fetch)?;

    if let Some(info) = attrs.storage_info.as_mut() {
        if info.key("path").is_none() {
            info.set_key("path", path.as_str());
        }
        info.set_key("uid", owner.unwrap_or(req.subject.uid).to_string());
        info.set_key("gid", group.unwrap_or(req.subject.gid).to_string());
    }
    *req.id = attrs.entity_id;
    *attributes = attrs;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::messages::{NamespaceMessage, Operation};
    use nsm_provider::NameSpaceProvider;
    use nsm_types::{
        access::parse_masks, AttributeKind, AttributeKinds, FileType, Gid, NamespaceCode,
        StatusCode, Subject, Uid,
    };

    #[test]
    fn test_create_entry_stamps_storage_info() {
        let (ctx, provider) = context();
        let msg = NamespaceMessage::new(Operation::create_entry(
            0o600,
            AttributeKinds::of([AttributeKind::Mode]),
        ))
        .with_path("/data/new")
        .with_subject(user())
        .with_access_mask(parse_masks("f").unwrap());
        let (msg, result) = run(&ctx, msg);
        result.unwrap();

        let id = provider.path_to_id(&Subject::root(), "/data/new", true).unwrap();
        assert_eq!(msg.id, Some(id));
        let Operation::CreateEntry { attributes, .. } = msg.op else {
            panic!("unexpected operation");
        };
        assert_eq!(attributes.mode, Some(0o600));
        assert_eq!(attributes.entity_id, Some(id));
        let info = attributes.storage_info.unwrap();
        assert_eq!(info.key("path"), Some("/data/new"));
        assert_eq!(info.key("uid"), Some("1000"));
        assert_eq!(info.key("gid"), Some("100"));
    }

    #[test]
    fn test_create_entry_with_explicit_owner() {
        let (ctx, _) = context();
        let mut op = Operation::create_entry(0o644, AttributeKinds::empty());
        if let Operation::CreateEntry { owner, group, .. } = &mut op {
            *owner = Some(Uid(42));
            *group = Some(Gid(43));
        }
        let (msg, result) = run(&ctx, NamespaceMessage::new(op).with_path("/data/owned"));
        result.unwrap();
        let Operation::CreateEntry { attributes, .. } = msg.op else {
            panic!("unexpected operation");
        };
        let info = attributes.storage_info.unwrap();
        assert_eq!(info.key("uid"), Some("42"));
        assert_eq!(info.key("gid"), Some("43"));
    }

    #[test]
    fn test_create_checks_parent() {
        let (ctx, provider) = context();
        let before = provider.len();
        let msg = NamespaceMessage::new(Operation::create_entry(0o644, AttributeKinds::empty()))
            .with_path("/data/intruder")
            .with_subject(stranger())
            .with_access_mask(parse_masks("f").unwrap());
        let (_, result) = run(&ctx, msg);
        assert_eq!(result.unwrap_err().code(), NamespaceCode::PERMISSION_DENIED);
        assert_eq!(provider.len(), before);
    }

    #[test]
    fn test_create_existing() {
        let (ctx, _) = context();
        let msg = NamespaceMessage::new(Operation::create_entry(0o644, AttributeKinds::empty()))
            .with_path("/data/f");
        let (_, result) = run(&ctx, msg);
        assert_eq!(result.unwrap_err().code(), NamespaceCode::EXISTS);
    }

    #[test]
    fn test_create_needs_path() {
        let (ctx, _) = context();
        let msg = NamespaceMessage::new(Operation::create_directory(0o755, AttributeKinds::empty()));
        let (_, result) = run(&ctx, msg);
        assert_eq!(result.unwrap_err().code(), StatusCode::INVALID_ARG);
    }

    #[test]
    fn test_create_directory_returns_requested() {
        let (ctx, provider) = context();
        let msg = NamespaceMessage::new(Operation::create_directory(
            0o750,
            AttributeKinds::of([AttributeKind::Type, AttributeKind::Mode]),
        ))
        .with_path("/data/sub")
        .with_subject(user());
        let (msg, result) = run(&ctx, msg);
        result.unwrap();
        let id = provider.path_to_id(&Subject::root(), "/data/sub", true).unwrap();
        assert_eq!(msg.id, Some(id));
        let Operation::CreateDirectory { attributes, .. } = msg.op else {
            panic!("unexpected operation");
        };
        assert_eq!(attributes.file_type, Some(FileType::Dir));
        assert_eq!(attributes.mode, Some(0o750));
        assert_eq!(attributes.size, None);
    }

    #[test]
    fn test_create_symlink() {
        let (ctx, provider) = context();
        let msg = NamespaceMessage::new(Operation::create_symlink("/data/f")).with_path("/data/l");
        let (msg, result) = run(&ctx, msg);
        result.unwrap();

        let link = provider.path_to_id(&Subject::root(), "/data/l", false).unwrap();
        let target = provider.path_to_id(&Subject::root(), "/data/l", true).unwrap();
        assert_eq!(msg.id, Some(link));
        assert_eq!(target, provider.path_to_id(&Subject::root(), "/data/f", true).unwrap());
    }
}
