//! Rename operation: move an entry to a new absolute path.

use nsm_types::Result;
use tracing::info;

use super::{OpContext, Request};

/// Execute a rename operation
pub fn execute(ctx: &OpContext, req: &mut Request<'_>, new_name: &str, overwrite: bool) -> Result<()> {
    let id = req.populate_id(ctx)?;
    req.check_mask(ctx, id)?;
    ctx.provider.rename(req.subject, id, new_name, overwrite)?;
    info!(%id, to = new_name, "entry renamed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::messages::{NamespaceMessage, Operation};
    use nsm_provider::NameSpaceProvider;
    use nsm_types::{access::parse_masks, NamespaceCode, Subject};

    #[test]
    fn test_rename_moves_entry() {
        let (ctx, provider) = context();
        let id = provider.path_to_id(&Subject::root(), "/data/f", true).unwrap();
        let msg = NamespaceMessage::new(Operation::rename("/data/g", false)).with_path("/data/f");
        run(&ctx, msg).1.unwrap();
        assert_eq!(provider.id_to_path(&Subject::root(), id).unwrap(), "/data/g");
    }

    #[test]
    fn test_rename_without_overwrite() {
        let (ctx, provider) = context();
        provider
            .create_file(&Subject::root(), "/data/g", None, None, 0o644, &Default::default())
            .unwrap();
        let msg = NamespaceMessage::new(Operation::rename("/data/g", false)).with_path("/data/f");
        let (_, result) = run(&ctx, msg);
        assert_eq!(result.unwrap_err().code(), NamespaceCode::EXISTS);

        let msg = NamespaceMessage::new(Operation::rename("/data/g", true)).with_path("/data/f");
        run(&ctx, msg).1.unwrap();
        assert!(provider.path_to_id(&Subject::root(), "/data/f", true).is_err());
    }

    #[test]
    fn test_rename_checks_mask() {
        let (ctx, _) = context();
        let msg = NamespaceMessage::new(Operation::rename("/data/g", false))
            .with_path("/data/f")
            .with_subject(stranger())
            .with_access_mask(parse_masks("w").unwrap());
        let (_, result) = run(&ctx, msg);
        assert_eq!(result.unwrap_err().code(), NamespaceCode::PERMISSION_DENIED);
    }
}
