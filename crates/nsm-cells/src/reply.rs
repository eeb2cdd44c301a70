//! Deferred replies.
//!
//! [`ReplyCell`] is a single-assignment result slot shared between the party
//! that produces an answer and the party waiting for it. [`DeferredReply`]
//! is the server-side counterpart: it owns an accepted request until a
//! worker answers it, so accepting a request and answering it can happen on
//! different threads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nsm_types::{Status, StatusCode};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::message::Message;
use crate::router::CellEndpoint;

struct Slot<T> {
    value: Option<Result<T, Status>>,
    assigned: bool,
}

/// A promise that is completed or failed exactly once.
pub struct ReplyCell<T> {
    inner: Arc<(Mutex<Slot<T>>, Condvar)>,
}

impl<T> Clone for ReplyCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ReplyCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReplyCell<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(Slot {
                    value: None,
                    assigned: false,
                }),
                Condvar::new(),
            )),
        }
    }

    fn assign(&self, result: Result<T, Status>) -> bool {
        let (slot, ready) = &*self.inner;
        let mut slot = slot.lock();
        if slot.assigned {
            return false;
        }
        slot.assigned = true;
        slot.value = Some(result);
        ready.notify_all();
        true
    }

    /// Returns `false` if the cell was already assigned.
    pub fn complete(&self, value: T) -> bool {
        self.assign(Ok(value))
    }

    /// Returns `false` if the cell was already assigned.
    pub fn fail(&self, status: Status) -> bool {
        self.assign(Err(status))
    }

    pub fn is_assigned(&self) -> bool {
        self.inner.0.lock().assigned
    }

    /// Block until the cell is assigned or `timeout` elapses, then take the
    /// result. Only one waiter receives the value.
    pub fn wait(&self, timeout: Duration) -> Result<T, Status> {
        let deadline = Instant::now() + timeout;
        let (slot, ready) = &*self.inner;
        let mut slot = slot.lock();
        while !slot.assigned {
            if ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        match slot.value.take() {
            Some(result) => result,
            None if slot.assigned => Err(Status::with_message(
                nsm_types::CellCode::ALREADY_COMPLETED,
                "reply already taken",
            )),
            None => Err(Status::timeout(format!(
                "no reply within {} ms",
                timeout.as_millis()
            ))),
        }
    }
}

/// An accepted request whose answer is produced later.
///
/// `reply` and `fail` consume the value, so a request is answered at most
/// once. Dropping it unanswered sends an unexpected-error reply if the
/// requester asked for one.
pub struct DeferredReply<M: Message> {
    envelope: Option<Envelope<M>>,
    endpoint: CellEndpoint<M>,
}

impl<M: Message> DeferredReply<M> {
    pub fn new(envelope: Envelope<M>, endpoint: CellEndpoint<M>) -> Self {
        Self {
            envelope: Some(envelope),
            endpoint,
        }
    }

    fn envelope_ref(&self) -> &Envelope<M> {
        match &self.envelope {
            Some(envelope) => envelope,
            None => unreachable!("envelope is only taken when the reply is consumed"),
        }
    }

    pub fn envelope(&self) -> &Envelope<M> {
        self.envelope_ref()
    }

    pub fn request(&self) -> &M {
        self.envelope_ref().payload()
    }

    pub fn request_mut(&mut self) -> &mut M {
        match &mut self.envelope {
            Some(envelope) => envelope.payload_mut(),
            None => unreachable!("envelope is only taken when the reply is consumed"),
        }
    }

    /// Send one chunk of a streamed answer; the request stays open.
    pub fn send_partial(&self, payload: M) -> Result<(), crate::CellError> {
        self.endpoint
            .send(Envelope::answering(self.envelope_ref(), payload))
    }

    /// Answer with the request payload as modified in place.
    pub fn reply_in_place(mut self) {
        if let Some(envelope) = self.envelope.take() {
            self.deliver(envelope);
        }
    }

    /// Answer with `payload`.
    pub fn reply(mut self, payload: M) {
        if let Some(mut envelope) = self.envelope.take() {
            envelope.set_payload(payload);
            self.deliver(envelope);
        }
    }

    /// Answer with a failure in the error slot.
    pub fn fail(mut self, status: Status) {
        if let Some(mut envelope) = self.envelope.take() {
            envelope.payload_mut().set_failed(status);
            self.deliver(envelope);
        }
    }

    fn deliver(&self, mut envelope: Envelope<M>) {
        if !envelope.payload().reply_required() {
            return;
        }
        envelope.revert_direction();
        let destination = envelope.destination().clone();
        if let Err(e) = self.endpoint.send(envelope) {
            warn!(%destination, "failed to send reply: {}", e);
        }
    }
}

impl<M: Message> Drop for DeferredReply<M> {
    fn drop(&mut self) {
        if let Some(mut envelope) = self.envelope.take() {
            debug!(uoid = %envelope.uoid(), "request dropped without an answer");
            envelope.payload_mut().set_failed(Status::with_message(
                StatusCode::UNEXPECTED_SYSTEM_ERROR,
                "request was dropped without a reply",
            ));
            self.deliver(envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::CellAddress;
    use crate::router::CellRouter;
    use crate::testing::Echo;
    use crossbeam::channel::unbounded;
    use std::thread;

    #[test]
    fn test_complete_then_wait() {
        let cell = ReplyCell::new();
        let producer = cell.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            assert!(producer.complete(7));
        });
        assert_eq!(cell.wait(Duration::from_secs(5)).unwrap(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn test_single_assignment() {
        let cell = ReplyCell::new();
        assert!(cell.fail(Status::not_found("x")));
        assert!(!cell.complete(1));
        assert_eq!(
            cell.wait(Duration::ZERO).unwrap_err(),
            Status::not_found("x")
        );
        assert!(cell.is_assigned());
    }

    #[test]
    fn test_wait_times_out() {
        let cell: ReplyCell<u8> = ReplyCell::new();
        let err = cell.wait(Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.code(), StatusCode::TIMEOUT);
    }

    fn accepted(router: &CellRouter<Echo>, payload: Echo) -> (DeferredReply<Echo>, crossbeam::channel::Receiver<Envelope<Echo>>) {
        let (tx, rx) = unbounded();
        router.register(
            "client",
            Arc::new(move |env: Envelope<Echo>| {
                let _ = tx.send(env);
            }),
        );
        let mut request = Envelope::new(CellAddress::new("server", "test"), payload);
        request.add_source_hop(CellAddress::new("client", "test"));
        (DeferredReply::new(request, router.endpoint("server")), rx)
    }

    #[test]
    fn test_deferred_reply_reaches_requester() {
        let router = CellRouter::new("test");
        let (deferred, rx) = accepted(&router, Echo::new("hello"));
        let uoid = deferred.envelope().uoid();
        deferred.reply(Echo::new("world"));

        let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(reply.is_reply());
        assert_eq!(reply.last_uoid(), Some(uoid));
        assert_eq!(reply.payload().text, "world");
    }

    #[test]
    fn test_partial_replies_share_uoid() {
        let router = CellRouter::new("test");
        let (deferred, rx) = accepted(&router, Echo::new("list"));
        let uoid = deferred.envelope().uoid();
        deferred.send_partial(Echo::new("a")).unwrap();
        deferred.send_partial(Echo::new("b")).unwrap();
        deferred.reply_in_place();

        let texts: Vec<String> = (0..3)
            .map(|_| {
                let env = rx.recv_timeout(Duration::from_secs(5)).unwrap();
                assert_eq!(env.last_uoid(), Some(uoid));
                env.into_payload().text
            })
            .collect();
        assert_eq!(texts, vec!["a", "b", "list"]);
    }

    #[test]
    fn test_drop_sends_failure() {
        let router = CellRouter::new("test");
        let (deferred, rx) = accepted(&router, Echo::new("lost"));
        drop(deferred);
        let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            reply.payload().return_code(),
            StatusCode::UNEXPECTED_SYSTEM_ERROR
        );
    }

    #[test]
    fn test_no_reply_when_not_required() {
        let router = CellRouter::new("test");
        let mut quiet = Echo::new("quiet");
        quiet.reply_required = false;
        let (deferred, rx) = accepted(&router, quiet);
        deferred.fail(Status::not_found("x"));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
