use std::fmt;
use std::hash::Hash;

use nsm_types::{status_code_t, Status, StatusCode};

/// A payload that can travel inside an [`Envelope`](crate::Envelope).
///
/// Payloads are a sum type; `kind` names the variant and is what the
/// dispatcher keys its handler registry on. The same value is used as both
/// request and reply: handlers fill in results and the error slot in place.
pub trait Message: Send + 'static {
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;

    /// Whether the sender expects an answer.
    fn reply_required(&self) -> bool;

    fn return_code(&self) -> status_code_t;

    fn error_message(&self) -> Option<&str>;

    /// Record a failure in the error slot.
    fn set_failed(&mut self, status: Status);

    /// Clear the error slot.
    fn set_succeeded(&mut self);

    /// The error slot as a `Result`.
    fn status(&self) -> Result<(), Status> {
        match (self.return_code(), self.error_message()) {
            (StatusCode::OK, _) => Ok(()),
            (code, Some(msg)) => Err(Status::with_message(code, msg)),
            (code, None) => Err(Status::new(code)),
        }
    }
}
