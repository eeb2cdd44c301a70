use nsm_types::{CellCode, Status, StatusCode};

use crate::address::CellPath;

/// Failures of the messaging layer itself, as opposed to failures reported
/// by the remote handler.
#[derive(Debug, thiserror::Error)]
pub enum CellError {
    #[error("no route to {0}")]
    NoRoute(CellPath),

    #[error("timed out waiting for {0}")]
    Timeout(CellPath),

    #[error("unexpected reply: expected {expected}, got {actual}")]
    UnexpectedReply { expected: String, actual: String },

    #[error("router is shutting down")]
    ShuttingDown,

    #[error("remote error: {0}")]
    Remote(#[from] Status),
}

impl From<CellError> for Status {
    fn from(err: CellError) -> Self {
        match err {
            CellError::NoRoute(path) => Status::no_route(path.to_string()),
            CellError::Timeout(path) => {
                Status::with_message(StatusCode::TIMEOUT, format!("no reply from {}", path))
            }
            e @ CellError::UnexpectedReply { .. } => {
                Status::with_message(CellCode::UNEXPECTED_REPLY, e.to_string())
            }
            CellError::ShuttingDown => Status::new(CellCode::SHUTTING_DOWN),
            CellError::Remote(status) => status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::CellAddress;

    #[test]
    fn test_display() {
        let e = CellError::NoRoute(CellAddress::local("pool").into());
        assert_eq!(e.to_string(), "no route to [pool@local]");

        let e = CellError::UnexpectedReply {
            expected: "GetParent".into(),
            actual: "MapPath".into(),
        };
        assert_eq!(e.to_string(), "unexpected reply: expected GetParent, got MapPath");
    }

    #[test]
    fn test_into_status() {
        let s: Status = CellError::Timeout(CellAddress::local("x").into()).into();
        assert_eq!(s.code(), StatusCode::TIMEOUT);

        let s: Status = CellError::Remote(Status::not_found("f")).into();
        assert_eq!(s, Status::not_found("f"));
    }
}
