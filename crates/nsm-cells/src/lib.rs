//! Actor-style messaging between named cells.
//!
//! Cells exchange [`Envelope`]s through a [`CellRouter`]. A request's reply
//! carries the request's UOID, which is how the router finds the party
//! waiting for it. On top of the router sit a kind-keyed
//! [`CellMessageDispatcher`], a blocking or callback-based [`CellStub`], and
//! [`DeferredReply`] for answering a request from another thread.

pub mod address;
pub mod backoff;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod message;
pub mod reply;
pub mod router;
pub mod stub;

pub use address::{CellAddress, CellPath};
pub use backoff::ExponentialBackoff;
pub use dispatcher::{
    CellMessageDispatcher, DispatchError, DispatchingReceiver, HandlerError, MessageHandler,
};
pub use envelope::Envelope;
pub use error::CellError;
pub use message::Message;
pub use reply::{DeferredReply, ReplyCell};
pub use router::{CellEndpoint, CellReceiver, CellRouter, ReplyHandler};
pub use stub::{CellStub, MessageCallback};
