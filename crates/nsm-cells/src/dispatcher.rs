//! Kind-based dispatch of arriving payloads to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use nsm_types::{Status, StatusCode};
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::envelope::Envelope;
use crate::message::Message;
use crate::router::{CellEndpoint, CellReceiver};

/// How a handler can fail.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// An expected failure; becomes the delivery result and reaches the
    /// requester as a status.
    #[error("{0}")]
    Checked(Status),

    /// A bug or unexpected system condition; aborts delivery.
    #[error(transparent)]
    Unchecked(#[from] anyhow::Error),
}

impl From<Status> for HandlerError {
    fn from(status: Status) -> Self {
        HandlerError::Checked(status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("handler {handler} failed: {source}")]
    Unchecked {
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{kind} produced replies from several handlers: {}", .handlers.join(", "))]
    MultipleReplies { kind: String, handlers: Vec<String> },
}

/// Handles one or more payload kinds. `Ok(None)` means the handler either
/// had nothing to say or will answer later.
pub trait MessageHandler<M, R>: Send + Sync {
    fn handle(&self, envelope: &Envelope<M>) -> Result<Option<R>, HandlerError>;
}

impl<M, R, F> MessageHandler<M, R> for F
where
    F: Fn(&Envelope<M>) -> Result<Option<R>, HandlerError> + Send + Sync,
{
    fn handle(&self, envelope: &Envelope<M>) -> Result<Option<R>, HandlerError> {
        self(envelope)
    }
}

struct Registered<M, R> {
    name: String,
    handler: Arc<dyn MessageHandler<M, R>>,
}

impl<M, R> Clone for Registered<M, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Maps payload kinds to the handlers interested in them.
pub struct CellMessageDispatcher<M: Message, R = M> {
    handlers: RwLock<HashMap<M::Kind, Vec<Registered<M, R>>>>,
}

impl<M: Message, R> Default for CellMessageDispatcher<M, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message, R> CellMessageDispatcher<M, R> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        kind: M::Kind,
        name: impl Into<String>,
        handler: Arc<dyn MessageHandler<M, R>>,
    ) {
        let name = name.into();
        debug!(?kind, handler = %name, "handler registered");
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Registered { name, handler });
    }

    pub fn register_all(
        &self,
        kinds: impl IntoIterator<Item = M::Kind>,
        name: impl Into<String>,
        handler: Arc<dyn MessageHandler<M, R>>,
    ) {
        let name = name.into();
        for kind in kinds {
            self.register(kind, name.clone(), Arc::clone(&handler));
        }
    }

    /// Removes every handler registered under `name`.
    pub fn unregister(&self, name: &str) -> usize {
        let mut handlers = self.handlers.write();
        let mut removed = 0;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|r| r.name != name);
            removed += before - list.len();
        }
        handlers.retain(|_, list| !list.is_empty());
        removed
    }

    pub fn handles(&self, kind: M::Kind) -> bool {
        self.handlers.read().contains_key(&kind)
    }

    /// Run every handler registered for the payload's kind.
    ///
    /// Returns `Ok(None)` when no handler produced a result, and the single
    /// result or checked error otherwise.
    pub fn deliver(
        &self,
        envelope: &Envelope<M>,
    ) -> Result<Option<Result<R, Status>>, DispatchError> {
        let kind = envelope.payload().kind();
        // Handlers run outside the lock so they may register others.
        let handlers = match self.handlers.read().get(&kind) {
            Some(list) => list.clone(),
            None => {
                debug!(?kind, "no handler registered");
                return Ok(None);
            }
        };

        let mut outcome: Option<Result<R, Status>> = None;
        let mut answered_by: Vec<String> = Vec::new();

        for Registered { name, handler } in handlers {
            let result = match handler.handle(envelope) {
                Ok(None) => continue,
                Ok(Some(reply)) => Ok(reply),
                Err(HandlerError::Checked(status)) => Err(status),
                Err(HandlerError::Unchecked(source)) => {
                    return Err(DispatchError::Unchecked {
                        handler: name,
                        source,
                    })
                }
            };
            answered_by.push(name);
            if outcome.is_none() {
                outcome = Some(result);
            }
        }

        if answered_by.len() > 1 {
            let err = DispatchError::MultipleReplies {
                kind: format!("{:?}", kind),
                handlers: answered_by,
            };
            error!("{}", err);
            return Err(err);
        }
        Ok(outcome)
    }
}

/// Adapts a dispatcher into a router-facing receiver that answers requests
/// with whatever the handlers produce.
pub struct DispatchingReceiver<M: Message> {
    dispatcher: Arc<CellMessageDispatcher<M, M>>,
    endpoint: CellEndpoint<M>,
}

impl<M: Message> DispatchingReceiver<M> {
    pub fn new(dispatcher: Arc<CellMessageDispatcher<M, M>>, endpoint: CellEndpoint<M>) -> Self {
        Self {
            dispatcher,
            endpoint,
        }
    }

    pub fn dispatcher(&self) -> &Arc<CellMessageDispatcher<M, M>> {
        &self.dispatcher
    }

    fn answer(&self, mut envelope: Envelope<M>) {
        if !envelope.payload().reply_required() {
            return;
        }
        envelope.revert_direction();
        if let Err(e) = self.endpoint.send(envelope) {
            warn!("failed to deliver reply: {}", e);
        }
    }
}

impl<M: Message> CellReceiver<M> for DispatchingReceiver<M> {
    fn message_arrived(&self, mut envelope: Envelope<M>) {
        if envelope.is_reply() {
            debug!(uoid = %envelope.uoid(), "dropping reply nobody waits for");
            return;
        }
        match self.dispatcher.deliver(&envelope) {
            Ok(None) => {}
            Ok(Some(Ok(reply))) => {
                envelope.set_payload(reply);
                self.answer(envelope);
            }
            Ok(Some(Err(status))) => {
                envelope.payload_mut().set_failed(status);
                self.answer(envelope);
            }
            Err(e) => {
                if let DispatchError::Unchecked { .. } = e {
                    error!(uoid = %envelope.uoid(), "delivery aborted: {}", e);
                }
                envelope.payload_mut().set_failed(Status::with_message(
                    StatusCode::UNEXPECTED_SYSTEM_ERROR,
                    e.to_string(),
                ));
                self.answer(envelope);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::CellAddress;
    use crate::router::CellRouter;
    use crate::testing::{Echo, EchoKind};
    use anyhow::anyhow;
    use crossbeam::channel::unbounded;
    use std::time::Duration;

    fn request(text: &str) -> Envelope<Echo> {
        let mut env = Envelope::new(CellAddress::new("server", "test"), Echo::new(text));
        env.add_source_hop(CellAddress::new("client", "test"));
        env
    }

    fn upper() -> Arc<dyn MessageHandler<Echo, Echo>> {
        Arc::new(|env: &Envelope<Echo>| Ok(Some(Echo::new(&env.payload().text.to_uppercase()))))
    }

    fn silent() -> Arc<dyn MessageHandler<Echo, Echo>> {
        Arc::new(|_: &Envelope<Echo>| Ok(None))
    }

    #[test]
    fn test_single_result() {
        let d = CellMessageDispatcher::new();
        d.register(EchoKind::Echo, "upper", upper());
        d.register(EchoKind::Echo, "audit", silent());
        let reply = d.deliver(&request("abc")).unwrap().unwrap().unwrap();
        assert_eq!(reply.text, "ABC");
    }

    #[test]
    fn test_no_handler_means_no_result() {
        let d = CellMessageDispatcher::<Echo>::new();
        d.register(EchoKind::Other, "upper", upper());
        assert!(d.deliver(&request("abc")).unwrap().is_none());
        assert!(!d.handles(EchoKind::Echo));
    }

    #[test]
    fn test_checked_error_is_the_result() {
        let d = CellMessageDispatcher::<Echo>::new();
        d.register(
            EchoKind::Echo,
            "missing",
            Arc::new(|_: &Envelope<Echo>| Err(Status::not_found("gone").into())),
        );
        let result = d.deliver(&request("abc")).unwrap().unwrap();
        assert_eq!(result.unwrap_err(), Status::not_found("gone"));
    }

    #[test]
    fn test_multiple_replies_rejected() {
        let d = CellMessageDispatcher::new();
        d.register(EchoKind::Echo, "first", upper());
        d.register(
            EchoKind::Echo,
            "second",
            Arc::new(|_: &Envelope<Echo>| Err(Status::exists("x").into())),
        );
        match d.deliver(&request("abc")) {
            Err(DispatchError::MultipleReplies { handlers, .. }) => {
                assert_eq!(handlers, vec!["first", "second"]);
            }
            other => panic!("unexpected outcome {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unchecked_error_aborts() {
        let d = CellMessageDispatcher::new();
        d.register(
            EchoKind::Echo,
            "broken",
            Arc::new(|_: &Envelope<Echo>| Err(HandlerError::Unchecked(anyhow!("boom")))),
        );
        d.register(EchoKind::Echo, "upper", upper());
        let err = d.deliver(&request("abc")).unwrap_err();
        assert!(matches!(err, DispatchError::Unchecked { ref handler, .. } if handler == "broken"));
    }

    #[test]
    fn test_unregister() {
        let d = CellMessageDispatcher::<Echo>::new();
        d.register_all([EchoKind::Echo, EchoKind::Other], "upper", upper());
        assert_eq!(d.unregister("upper"), 2);
        assert!(!d.handles(EchoKind::Other));
    }

    #[test]
    fn test_receiver_answers_requests() {
        let router = CellRouter::new("test");
        let dispatcher = Arc::new(CellMessageDispatcher::new());
        dispatcher.register(EchoKind::Echo, "upper", upper());
        dispatcher.register(
            EchoKind::Other,
            "broken",
            Arc::new(|_: &Envelope<Echo>| Err(HandlerError::Unchecked(anyhow!("boom")))),
        );
        router.register(
            "server",
            Arc::new(DispatchingReceiver::new(dispatcher, router.endpoint("server"))),
        );
        let (tx, rx) = unbounded();
        router.register(
            "client",
            Arc::new(move |env: Envelope<Echo>| {
                let _ = tx.send(env);
            }),
        );

        let client = router.endpoint("client");
        client
            .send(Envelope::new(CellAddress::new("server", "test"), Echo::new("hi")))
            .unwrap();
        let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply.payload().text, "HI");

        client
            .send(Envelope::new(
                CellAddress::new("server", "test"),
                Echo::of_kind(EchoKind::Other, "hi"),
            ))
            .unwrap();
        let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            reply.payload().return_code(),
            StatusCode::UNEXPECTED_SYSTEM_ERROR
        );
    }
}
