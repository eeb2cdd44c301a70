//! Absolute namespace paths.

use nsm_types::{NamespaceCode, Result, Status};

/// Split an absolute path into its components, resolving `.` and `..`.
pub fn components(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(Status::with_message(
            NamespaceCode::INVALID_PATH,
            format!("path is not absolute: {}", path),
        ));
    }
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    Ok(parts)
}

/// The normalized form of `path`.
pub fn normalize(path: &str) -> Result<String> {
    Ok(join(&components(path)?))
}

pub fn join(parts: &[&str]) -> String {
    if parts.is_empty() {
        return "/".to_string();
    }
    parts.iter().fold(String::new(), |mut acc, p| {
        acc.push('/');
        acc.push_str(p);
        acc
    })
}

/// Split into parent path and final name. The root has no name.
pub fn split_last(path: &str) -> Result<(String, String)> {
    let mut parts = components(path)?;
    match parts.pop() {
        Some(name) => Ok((join(&parts), name.to_string())),
        None => Err(Status::with_message(
            NamespaceCode::INVALID_PATH,
            "the root has no parent",
        )),
    }
}

/// Whether `path` equals `prefix` or lies below it. Both must be normalized.
pub fn is_under(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a//b/./c/").unwrap(), "/a/b/c");
        assert_eq!(normalize("/a/b/../c").unwrap(), "/a/c");
        assert_eq!(normalize("/..").unwrap(), "/");
        assert_eq!(
            normalize("a/b").unwrap_err().code(),
            NamespaceCode::INVALID_PATH
        );
    }

    #[test]
    fn test_split_last() {
        assert_eq!(
            split_last("/pnfs/data/f").unwrap(),
            ("/pnfs/data".to_string(), "f".to_string())
        );
        assert_eq!(split_last("/f").unwrap(), ("/".to_string(), "f".to_string()));
        assert!(split_last("/").is_err());
    }

    #[test]
    fn test_is_under() {
        assert!(is_under("/pnfs/data", "/pnfs"));
        assert!(is_under("/pnfs", "/pnfs"));
        assert!(!is_under("/pnfsx", "/pnfs"));
        assert!(is_under("/anything", "/"));
    }
}
