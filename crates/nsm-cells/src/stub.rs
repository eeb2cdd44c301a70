//! Request/reply client over a [`CellEndpoint`].

use std::time::Duration;

use nsm_types::{status_code_t, CellCode, Status, StatusCode};
use tracing::debug;

use crate::address::CellPath;
use crate::envelope::Envelope;
use crate::error::CellError;
use crate::message::Message;
use crate::reply::ReplyCell;
use crate::router::{CellEndpoint, ReplyHandler};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Receives the outcome of [`CellStub::send`]. Exactly one method is called.
pub trait MessageCallback<M>: Send {
    fn success(self: Box<Self>, reply: M);

    fn failure(self: Box<Self>, code: status_code_t, message: Option<String>);

    fn no_route(self: Box<Self>, destination: &CellPath);

    fn timeout(self: Box<Self>, destination: &CellPath);
}

struct StubReplyHandler<M: Message> {
    expected: M::Kind,
    callback: Option<Box<dyn MessageCallback<M>>>,
}

impl<M: Message> ReplyHandler<M> for StubReplyHandler<M> {
    fn reply_arrived(&mut self, envelope: Envelope<M>) -> bool {
        let Some(callback) = self.callback.take() else {
            return true;
        };
        let reply = envelope.into_payload();
        if reply.kind() != self.expected {
            let err = CellError::UnexpectedReply {
                expected: format!("{:?}", self.expected),
                actual: format!("{:?}", reply.kind()),
            };
            callback.failure(CellCode::UNEXPECTED_REPLY, Some(err.to_string()));
        } else if reply.return_code() != StatusCode::OK {
            let message = reply.error_message().map(str::to_owned);
            callback.failure(reply.return_code(), message);
        } else {
            callback.success(reply);
        }
        true
    }

    fn no_route(&mut self, destination: &CellPath) {
        if let Some(callback) = self.callback.take() {
            callback.no_route(destination);
        }
    }

    fn timed_out(&mut self, destination: &CellPath) {
        if let Some(callback) = self.callback.take() {
            callback.timeout(destination);
        }
    }
}

/// Completes a [`ReplyCell`] with the outcome of a blocking call.
struct CompleteCell<M>(ReplyCell<M>);

impl<M: Send> MessageCallback<M> for CompleteCell<M> {
    fn success(self: Box<Self>, reply: M) {
        self.0.complete(reply);
    }

    fn failure(self: Box<Self>, code: status_code_t, message: Option<String>) {
        let status = match message {
            Some(msg) => Status::with_message(code, msg),
            None => Status::new(code),
        };
        self.0.fail(status);
    }

    fn no_route(self: Box<Self>, destination: &CellPath) {
        self.0.fail(CellError::Timeout(destination.clone()).into());
    }

    fn timeout(self: Box<Self>, destination: &CellPath) {
        self.0.fail(CellError::Timeout(destination.clone()).into());
    }
}

/// Sends requests to a cell and checks the answers.
pub struct CellStub<M: Message> {
    endpoint: CellEndpoint<M>,
    destination: Option<CellPath>,
    timeout: Duration,
    retry_on_no_route: bool,
}

impl<M: Message> Clone for CellStub<M> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            destination: self.destination.clone(),
            timeout: self.timeout,
            retry_on_no_route: self.retry_on_no_route,
        }
    }
}

impl<M: Message> CellStub<M> {
    pub fn new(endpoint: CellEndpoint<M>) -> Self {
        Self {
            endpoint,
            destination: None,
            timeout: DEFAULT_TIMEOUT,
            retry_on_no_route: false,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<CellPath>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_on_no_route(mut self, retry: bool) -> Self {
        self.retry_on_no_route = retry;
        self
    }

    pub fn destination(&self) -> Option<&CellPath> {
        self.destination.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn default_destination(&self) -> Result<CellPath, Status> {
        self.destination
            .clone()
            .ok_or_else(|| Status::invalid_arg("stub has no default destination"))
    }

    /// Blocking request to the default destination.
    pub fn send_and_wait(&self, payload: M) -> Result<M, Status> {
        let destination = self.default_destination()?;
        self.send_and_wait_to(destination, payload, self.timeout)
    }

    /// Blocking request. A missing route and a missing answer both come
    /// back as a timeout.
    pub fn send_and_wait_to(
        &self,
        destination: impl Into<CellPath>,
        payload: M,
        timeout: Duration,
    ) -> Result<M, Status> {
        let cell = ReplyCell::new();
        self.send_to(destination, payload, timeout, Box::new(CompleteCell(cell.clone())));
        cell.wait(timeout)
    }

    /// Asynchronous request to the default destination.
    pub fn send(&self, payload: M, callback: Box<dyn MessageCallback<M>>) {
        match self.default_destination() {
            Ok(destination) => self.send_to(destination, payload, self.timeout, callback),
            Err(status) => callback.failure(status.code(), status.message().map(str::to_owned)),
        }
    }

    /// Asynchronous request; the outcome is reported to `callback`.
    pub fn send_to(
        &self,
        destination: impl Into<CellPath>,
        payload: M,
        timeout: Duration,
        callback: Box<dyn MessageCallback<M>>,
    ) {
        let handler = StubReplyHandler {
            expected: payload.kind(),
            callback: Some(callback),
        };
        let envelope = Envelope::new(destination, payload);
        self.endpoint.send_with_reply_handler(
            envelope,
            timeout,
            Box::new(handler),
            self.retry_on_no_route,
        );
    }

    /// Fire-and-forget. Delivery failures are only logged.
    pub fn notify(&self, destination: impl Into<CellPath>, payload: M) {
        let envelope = Envelope::new(destination, payload);
        let uoid = envelope.uoid();
        if let Err(e) = self.endpoint.send(envelope) {
            debug!(%uoid, "notification not delivered: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::CellAddress;
    use crate::router::CellRouter;
    use crate::testing::{Echo, EchoKind};
    use crossbeam::channel::{unbounded, Sender};
    use std::sync::Arc;

    fn server(router: &CellRouter<Echo>, respond: fn(Echo) -> Echo) {
        let endpoint = router.endpoint("server");
        router.register(
            "server",
            Arc::new(move |mut env: Envelope<Echo>| {
                let reply = respond(env.payload().clone());
                env.set_payload(reply);
                env.revert_direction();
                let _ = endpoint.send(env);
            }),
        );
    }

    fn stub(router: &CellRouter<Echo>) -> CellStub<Echo> {
        CellStub::new(router.endpoint("client"))
            .with_destination(CellAddress::new("server", "test"))
            .with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_send_and_wait() {
        let router = CellRouter::new("test");
        server(&router, |mut m| {
            m.text.push('!');
            m
        });
        let reply = stub(&router).send_and_wait(Echo::new("hey")).unwrap();
        assert_eq!(reply.text, "hey!");
    }

    #[test]
    fn test_error_reply_becomes_status() {
        let router = CellRouter::new("test");
        server(&router, |mut m| {
            m.set_failed(Status::not_found("/a"));
            m
        });
        let err = stub(&router).send_and_wait(Echo::new("x")).unwrap_err();
        assert_eq!(err, Status::not_found("/a"));
    }

    #[test]
    fn test_reply_of_other_kind_is_rejected() {
        let router = CellRouter::new("test");
        server(&router, |m| Echo::of_kind(EchoKind::Other, &m.text));
        let err = stub(&router).send_and_wait(Echo::new("x")).unwrap_err();
        assert_eq!(err.code(), CellCode::UNEXPECTED_REPLY);
    }

    #[test]
    fn test_unreachable_is_timeout() {
        let router = CellRouter::<Echo>::new("test");
        let err = stub(&router).send_and_wait(Echo::new("x")).unwrap_err();
        assert_eq!(err.code(), StatusCode::TIMEOUT);
    }

    #[test]
    fn test_missing_destination() {
        let router = CellRouter::<Echo>::new("test");
        let stub = CellStub::new(router.endpoint("client"));
        let err = stub.send_and_wait(Echo::new("x")).unwrap_err();
        assert_eq!(err.code(), StatusCode::INVALID_ARG);
    }

    #[derive(Debug, PartialEq)]
    enum Outcome {
        Success(String),
        Failure(status_code_t),
        NoRoute,
        Timeout,
    }

    struct Report(Sender<Outcome>);

    impl MessageCallback<Echo> for Report {
        fn success(self: Box<Self>, reply: Echo) {
            let _ = self.0.send(Outcome::Success(reply.text));
        }

        fn failure(self: Box<Self>, code: status_code_t, _: Option<String>) {
            let _ = self.0.send(Outcome::Failure(code));
        }

        fn no_route(self: Box<Self>, _: &CellPath) {
            let _ = self.0.send(Outcome::NoRoute);
        }

        fn timeout(self: Box<Self>, _: &CellPath) {
            let _ = self.0.send(Outcome::Timeout);
        }
    }

    #[test]
    fn test_callback_outcomes() {
        let router = CellRouter::with_tick("test", Duration::from_millis(5));
        server(&router, |m| m);
        router.register("sink", Arc::new(|_env: Envelope<Echo>| {}));
        let stub = stub(&router);
        let (tx, rx) = unbounded();

        stub.send(Echo::new("a"), Box::new(Report(tx.clone())));
        assert_eq!(rx.recv().unwrap(), Outcome::Success("a".into()));

        stub.send_to(
            CellAddress::new("nowhere", "test"),
            Echo::new("b"),
            Duration::from_secs(5),
            Box::new(Report(tx.clone())),
        );
        assert_eq!(rx.recv().unwrap(), Outcome::NoRoute);

        stub.send_to(
            CellAddress::new("sink", "test"),
            Echo::new("c"),
            Duration::from_millis(20),
            Box::new(Report(tx)),
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Outcome::Timeout
        );
    }

    #[test]
    fn test_retry_reaches_late_cell() {
        let router = CellRouter::with_tick("test", Duration::from_millis(5));
        let stub = stub(&router).with_retry_on_no_route(true);
        let waiter = std::thread::spawn(move || stub.send_and_wait(Echo::new("late")));
        std::thread::sleep(Duration::from_millis(30));
        server(&router, |m| m);
        assert_eq!(waiter.join().unwrap().unwrap().text, "late");
    }

    #[test]
    fn test_notify_does_not_wait() {
        let router = CellRouter::new("test");
        let (tx, rx) = unbounded();
        router.register(
            "sink",
            Arc::new(move |env: Envelope<Echo>| {
                let _ = tx.send(env.into_payload().text);
            }),
        );
        stub(&router).notify(CellAddress::new("sink", "test"), Echo::new("n"));
        stub(&router).notify(CellAddress::new("missing", "test"), Echo::new("m"));
        assert_eq!(rx.recv().unwrap(), "n");
    }
}
