//! In-process message routing between cells.
//!
//! A [`CellRouter`] owns the table of named receivers and the table of
//! requests still waiting for an answer. Delivery is synchronous: the
//! receiver's `message_arrived` runs on the sender's thread and is expected
//! to hand the envelope off quickly (e.g. onto a queue).
//!
//! Replies are matched to waiting requests by `last_uoid`. A background
//! reaper thread expires requests whose timeout passed and re-attempts
//! delivery of requests that found no route when they were sent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use nsm_types::Uoid;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::address::{CellAddress, CellPath};
use crate::backoff::ExponentialBackoff;
use crate::envelope::Envelope;
use crate::error::CellError;

const DEFAULT_TICK: Duration = Duration::from_millis(10);
const REDELIVERY_INIT_WAIT: Duration = Duration::from_millis(10);
const REDELIVERY_MAX_WAIT: Duration = Duration::from_secs(1);

/// Something that accepts envelopes addressed to a cell.
pub trait CellReceiver<M>: Send + Sync {
    fn message_arrived(&self, envelope: Envelope<M>);
}

impl<M, F> CellReceiver<M> for F
where
    F: Fn(Envelope<M>) + Send + Sync,
{
    fn message_arrived(&self, envelope: Envelope<M>) {
        self(envelope)
    }
}

/// Observer of a request sent with a reply expectation.
///
/// Exactly one of `no_route` / `timed_out` is called, or `reply_arrived`
/// until it returns `true`.
pub trait ReplyHandler<M>: Send {
    /// Return `true` once no further replies are expected.
    fn reply_arrived(&mut self, envelope: Envelope<M>) -> bool;

    fn no_route(&mut self, destination: &CellPath);

    fn timed_out(&mut self, destination: &CellPath);
}

struct Redelivery<M> {
    envelope: Envelope<M>,
    backoff: ExponentialBackoff,
    next_attempt: Instant,
}

struct Pending<M> {
    handler: Box<dyn ReplyHandler<M>>,
    destination: CellPath,
    deadline: Instant,
    redelivery: Option<Redelivery<M>>,
}

struct RouterInner<M> {
    domain: String,
    cells: DashMap<String, Arc<dyn CellReceiver<M>>>,
    pending: Mutex<HashMap<Uoid, Pending<M>>>,
    shutdown: AtomicBool,
}

type Undeliverable<M> = (CellError, Envelope<M>);

impl<M: Send + 'static> RouterInner<M> {
    fn route(&self, mut envelope: Envelope<M>) -> Result<(), Undeliverable<M>> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err((CellError::ShuttingDown, envelope));
        }

        if envelope.is_reply() {
            let waiting = envelope
                .last_uoid()
                .and_then(|uoid| self.pending.lock().remove(&uoid).map(|p| (uoid, p)));
            if let Some((uoid, mut pending)) = waiting {
                if !pending.handler.reply_arrived(envelope) {
                    self.pending.lock().insert(uoid, pending);
                }
                return Ok(());
            }
        }

        let receiver = envelope
            .destination()
            .target()
            .filter(|target| target.domain() == self.domain)
            .and_then(|target| self.cells.get(target.cell()))
            .map(|entry| Arc::clone(entry.value()));

        match receiver {
            Some(receiver) => {
                envelope.mark_arrived();
                receiver.message_arrived(envelope);
                Ok(())
            }
            None => {
                let destination = envelope.destination().clone();
                Err((CellError::NoRoute(destination), envelope))
            }
        }
    }

    fn reap(&self) {
        let now = Instant::now();

        let (expired, due) = {
            let mut pending = self.pending.lock();
            let expired_ids: Vec<Uoid> = pending
                .iter()
                .filter(|(_, p)| p.deadline <= now)
                .map(|(uoid, _)| *uoid)
                .collect();
            let expired: Vec<(Uoid, Pending<M>)> = expired_ids
                .into_iter()
                .filter_map(|uoid| pending.remove(&uoid).map(|p| (uoid, p)))
                .collect();
            let due: Vec<(Uoid, Redelivery<M>)> = pending
                .iter_mut()
                .filter(|(_, p)| p.redelivery.as_ref().is_some_and(|r| r.next_attempt <= now))
                .filter_map(|(uoid, p)| p.redelivery.take().map(|r| (*uoid, r)))
                .collect();
            (expired, due)
        };

        for (uoid, mut pending) in expired {
            debug!(%uoid, destination = %pending.destination, "request timed out");
            pending.handler.timed_out(&pending.destination);
        }

        for (uoid, redelivery) in due {
            let Redelivery {
                envelope,
                mut backoff,
                ..
            } = redelivery;
            match self.route(envelope) {
                Ok(()) => debug!(%uoid, "redelivered after missing route"),
                Err((CellError::NoRoute(_), envelope)) => {
                    // An exhausted backoff leaves the request to its deadline.
                    if let Some(wait) = backoff.next_wait() {
                        if let Some(p) = self.pending.lock().get_mut(&uoid) {
                            p.redelivery = Some(Redelivery {
                                envelope,
                                backoff,
                                next_attempt: Instant::now() + wait,
                            });
                        }
                    }
                }
                Err((_, _)) => {
                    let removed = self.pending.lock().remove(&uoid);
                    if let Some(mut pending) = removed {
                        pending.handler.no_route(&pending.destination);
                    }
                }
            }
        }
    }

    fn take_pending(&self, uoid: &Uoid) -> Option<Pending<M>> {
        self.pending.lock().remove(uoid)
    }
}

/// A cell's handle for sending messages through a router.
pub struct CellEndpoint<M> {
    address: CellAddress,
    inner: Arc<RouterInner<M>>,
}

impl<M> Clone for CellEndpoint<M> {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Send + 'static> CellEndpoint<M> {
    pub fn address(&self) -> &CellAddress {
        &self.address
    }

    /// Send without expecting an answer. Replies travel this way too.
    pub fn send(&self, mut envelope: Envelope<M>) -> Result<(), CellError> {
        envelope.add_source_hop(self.address.clone());
        self.inner.route(envelope).map_err(|(e, _)| e)
    }

    /// Send a request and report its outcome to `handler`.
    ///
    /// With `retry_on_no_route`, a missing destination is retried with
    /// back-off until `timeout`, after which the handler sees `timed_out`.
    pub fn send_with_reply_handler(
        &self,
        mut envelope: Envelope<M>,
        timeout: Duration,
        handler: Box<dyn ReplyHandler<M>>,
        retry_on_no_route: bool,
    ) {
        envelope.add_source_hop(self.address.clone());
        envelope.set_ttl(Some(timeout));
        let uoid = envelope.uoid();
        let destination = envelope.destination().clone();

        // Registered before delivery: the receiver may answer synchronously.
        self.inner.pending.lock().insert(
            uoid,
            Pending {
                handler,
                destination: destination.clone(),
                deadline: Instant::now() + timeout,
                redelivery: None,
            },
        );

        let (error, envelope) = match self.inner.route(envelope) {
            Ok(()) => return,
            Err(undeliverable) => undeliverable,
        };

        if matches!(error, CellError::NoRoute(_)) && retry_on_no_route {
            let mut backoff =
                ExponentialBackoff::new(REDELIVERY_INIT_WAIT, REDELIVERY_MAX_WAIT, timeout);
            if let Some(wait) = backoff.next_wait() {
                if let Some(p) = self.inner.pending.lock().get_mut(&uoid) {
                    debug!(%uoid, %destination, "no route, will retry");
                    p.redelivery = Some(Redelivery {
                        envelope,
                        backoff,
                        next_attempt: Instant::now() + wait,
                    });
                }
            }
            return;
        }

        if let Some(mut pending) = self.inner.take_pending(&uoid) {
            pending.handler.no_route(&destination);
        }
    }
}

/// Routes envelopes between the cells of one domain.
pub struct CellRouter<M: Send + 'static> {
    inner: Arc<RouterInner<M>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Send + 'static> CellRouter<M> {
    pub fn new(domain: impl Into<String>) -> Self {
        Self::with_tick(domain, DEFAULT_TICK)
    }

    /// `tick` is how often timeouts and redeliveries are checked.
    pub fn with_tick(domain: impl Into<String>, tick: Duration) -> Self {
        let inner = Arc::new(RouterInner {
            domain: domain.into(),
            cells: DashMap::new(),
            pending: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        });
        let weak: Weak<RouterInner<M>> = Arc::downgrade(&inner);
        let reaper = thread::Builder::new()
            .name("cell-reaper".into())
            .spawn(move || loop {
                thread::sleep(tick);
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.shutdown.load(Ordering::Acquire) {
                    break;
                }
                inner.reap();
            });
        let reaper = match reaper {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("cannot start reaper thread, request timeouts are disabled: {}", e);
                None
            }
        };
        Self {
            inner,
            reaper: Mutex::new(reaper),
        }
    }

    pub fn domain(&self) -> &str {
        &self.inner.domain
    }

    /// A sending handle for the cell named `cell`.
    pub fn endpoint(&self, cell: impl Into<String>) -> CellEndpoint<M> {
        CellEndpoint {
            address: CellAddress::new(cell, self.inner.domain.clone()),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Route envelopes addressed to `cell` to `receiver`.
    pub fn register(&self, cell: impl Into<String>, receiver: Arc<dyn CellReceiver<M>>) {
        let cell = cell.into();
        info!(cell = %cell, domain = %self.inner.domain, "cell registered");
        self.inner.cells.insert(cell, receiver);
    }

    pub fn unregister(&self, cell: &str) -> bool {
        self.inner.cells.remove(cell).is_some()
    }

    pub fn is_registered(&self, cell: &str) -> bool {
        self.inner.cells.contains_key(cell)
    }

    /// Requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Stop routing. Waiting requests are reported as timed out.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.reaper.lock().take() {
            let _ = handle.join();
        }
        let waiting: Vec<Pending<M>> = self.inner.pending.lock().drain().map(|(_, p)| p).collect();
        for mut pending in waiting {
            pending.handler.timed_out(&pending.destination);
        }
        info!(domain = %self.inner.domain, "router stopped");
    }
}

impl<M: Send + 'static> Drop for CellRouter<M> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{unbounded, Sender};

    #[derive(Debug, PartialEq)]
    enum Outcome {
        Reply(u32),
        NoRoute,
        TimedOut,
    }

    struct Collect(Sender<Outcome>);

    impl ReplyHandler<u32> for Collect {
        fn reply_arrived(&mut self, envelope: Envelope<u32>) -> bool {
            let value = envelope.into_payload();
            let _ = self.0.send(Outcome::Reply(value));
            value == 0
        }

        fn no_route(&mut self, _: &CellPath) {
            let _ = self.0.send(Outcome::NoRoute);
        }

        fn timed_out(&mut self, _: &CellPath) {
            let _ = self.0.send(Outcome::TimedOut);
        }
    }

    /// Answers each request with `payload - 1`, then `0`.
    fn countdown(endpoint: CellEndpoint<u32>) -> Arc<dyn CellReceiver<u32>> {
        Arc::new(move |env: Envelope<u32>| {
            let n = *env.payload();
            if n > 0 {
                let _ = endpoint.send(Envelope::answering(&env, n - 1));
            }
            let mut last = env;
            last.set_payload(0);
            last.revert_direction();
            let _ = endpoint.send(last);
        })
    }

    #[test]
    fn test_reply_correlation() {
        let router = CellRouter::new("test");
        let server = router.endpoint("server");
        router.register("server", countdown(server));

        let (tx, rx) = unbounded();
        let client = router.endpoint("client");
        client.send_with_reply_handler(
            Envelope::new(CellAddress::new("server", "test"), 5),
            Duration::from_secs(5),
            Box::new(Collect(tx)),
            false,
        );
        assert_eq!(rx.recv().unwrap(), Outcome::Reply(4));
        assert_eq!(rx.recv().unwrap(), Outcome::Reply(0));
        assert_eq!(router.pending_requests(), 0);
    }

    #[test]
    fn test_no_route_is_reported() {
        let router = CellRouter::<u32>::new("test");
        let (tx, rx) = unbounded();
        router.endpoint("client").send_with_reply_handler(
            Envelope::new(CellAddress::new("missing", "test"), 1),
            Duration::from_secs(5),
            Box::new(Collect(tx)),
            false,
        );
        assert_eq!(rx.recv().unwrap(), Outcome::NoRoute);
        assert!(matches!(
            router
                .endpoint("client")
                .send(Envelope::new(CellAddress::new("missing", "test"), 1)),
            Err(CellError::NoRoute(_))
        ));
    }

    #[test]
    fn test_timeout_when_nobody_answers() {
        let router = CellRouter::with_tick("test", Duration::from_millis(5));
        router.register("sink", Arc::new(|_env: Envelope<u32>| {}));
        let (tx, rx) = unbounded();
        router.endpoint("client").send_with_reply_handler(
            Envelope::new(CellAddress::new("sink", "test"), 1),
            Duration::from_millis(30),
            Box::new(Collect(tx)),
            false,
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Outcome::TimedOut
        );
    }

    #[test]
    fn test_retry_delivers_once_route_appears() {
        let router = CellRouter::with_tick("test", Duration::from_millis(5));
        let (tx, rx) = unbounded();
        router.endpoint("client").send_with_reply_handler(
            Envelope::new(CellAddress::new("late", "test"), 0),
            Duration::from_secs(5),
            Box::new(Collect(tx)),
            true,
        );
        thread::sleep(Duration::from_millis(30));
        router.register("late", countdown(router.endpoint("late")));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Outcome::Reply(0)
        );
    }

    #[test]
    fn test_retry_ends_in_timeout() {
        let router = CellRouter::<u32>::with_tick("test", Duration::from_millis(5));
        let (tx, rx) = unbounded();
        router.endpoint("client").send_with_reply_handler(
            Envelope::new(CellAddress::new("never", "test"), 0),
            Duration::from_millis(50),
            Box::new(Collect(tx)),
            true,
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Outcome::TimedOut
        );
    }

    #[test]
    fn test_foreign_domain_has_no_route() {
        let router = CellRouter::new("here");
        router.register("server", Arc::new(|_env: Envelope<u32>| {}));
        let err = router
            .endpoint("client")
            .send(Envelope::new(CellAddress::new("server", "elsewhere"), 1))
            .unwrap_err();
        assert!(matches!(err, CellError::NoRoute(_)));
    }

    #[test]
    fn test_shutdown_times_out_waiting_requests() {
        let router = CellRouter::new("test");
        router.register("sink", Arc::new(|_env: Envelope<u32>| {}));
        let (tx, rx) = unbounded();
        router.endpoint("client").send_with_reply_handler(
            Envelope::new(CellAddress::new("sink", "test"), 1),
            Duration::from_secs(60),
            Box::new(Collect(tx)),
            false,
        );
        router.shutdown();
        assert_eq!(rx.recv().unwrap(), Outcome::TimedOut);
        assert!(matches!(
            router
                .endpoint("client")
                .send(Envelope::new(CellAddress::new("sink", "test"), 1)),
            Err(CellError::ShuttingDown)
        ));
    }
}
