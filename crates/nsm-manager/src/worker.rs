//! The worker loop.
//!
//! Each main and location queue has exactly one worker, which is what keeps
//! the requests for one entry in arrival order. Listing queues are served
//! by several workers at once, since listings carry no ordering promise.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use nsm_cells::{DeferredReply, Message};
use nsm_types::{Status, StatusCode};
use tracing::{debug, error, info, warn};

use crate::messages::{NamespaceMessage, OperationKind};
use crate::ops::{self, OpContext};
use crate::queue::{ScanStep, ShardQueue};
use crate::stats::ManagerStats;

pub type Request = DeferredReply<NamespaceMessage>;
pub type RequestQueue = ShardQueue<Request>;

/// State every worker reads.
pub struct WorkerShared {
    pub ctx: OpContext,
    pub stats: ManagerStats,
    /// Zero disables slow-request warnings.
    pub slow_threshold_ms: AtomicU64,
    pub folding: bool,
    pub list_limit: usize,
    pub list_flush_interval: Duration,
}

impl WorkerShared {
    pub fn slow_threshold(&self) -> Option<Duration> {
        match self.slow_threshold_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn set_slow_threshold(&self, threshold: Option<Duration>) {
        let ms = threshold.map_or(0, |t| t.as_millis().max(1) as u64);
        self.slow_threshold_ms.store(ms, Ordering::Relaxed);
    }

    fn record(&self, kind: OperationKind, elapsed: Duration, msg: &NamespaceMessage) {
        self.stats.record_execution(kind, elapsed, msg.is_ok());
        let ms = elapsed.as_millis();
        match self.slow_threshold() {
            Some(threshold) if elapsed > threshold => {
                warn!("{} processed in {} ms", msg, ms)
            }
            _ => debug!("{} processed in {} ms", msg, ms),
        }
        if msg.return_code() == StatusCode::INVALID_ARG {
            error!(
                "Inconsistent message {} returned {}",
                msg,
                msg.error_message().unwrap_or("no message")
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `f`, turning a panic into an unexpected-error status.
fn guarded(kind: OperationKind, f: impl FnOnce() -> nsm_types::Result<()>) -> nsm_types::Result<()> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("{} failed with a panic: {}", kind, message);
            Err(Status::unexpected(message))
        }
    }
}

/// Answer with a timeout if the request waited past its TTL. Returns the
/// request when it should still be executed.
fn discard_expired(shared: &WorkerShared, request: Request) -> Option<Request> {
    let kind = request.request().kind();
    if kind.discard_early() && request.envelope().is_expired() {
        warn!(
            "Discarding {} because its time to live has been exceeded",
            kind
        );
        shared.stats.record_discarded(kind);
        request.fail(Status::timeout("TTL exceeded"));
        return None;
    }
    Some(request)
}

/// Serve one main or location queue until it is closed.
pub fn run(shared: &WorkerShared, queue: &RequestQueue) {
    while let Some(request) = queue.take() {
        let Some(mut request) = discard_expired(shared, request) else {
            continue;
        };
        let kind = request.request().kind();
        let started = Instant::now();
        let result = guarded(kind, || ops::execute(&shared.ctx, request.request_mut()));
        match result {
            Ok(()) => request.request_mut().set_succeeded(),
            Err(status) => request.request_mut().set_failed(status),
        }
        shared.record(kind, started.elapsed(), request.request());

        if shared.folding && request.request().is_ok() {
            fold(shared, queue, request.request());
        }
        request.reply_in_place();
    }
    debug!("worker stopped");
}

/// Answer queued duplicates of `done` from its result. The scan stops at
/// the first queued request that could change that result.
fn fold(shared: &WorkerShared, queue: &RequestQueue, done: &NamespaceMessage) {
    let kind = done.kind();
    if !kind.is_read_only() {
        return;
    }
    let folded = queue.fold_scan(|queued| {
        if queued.request().invalidates(done) {
            ScanStep::Stop
        } else if queued.request_mut().fold(done) {
            ScanStep::Remove
        } else {
            ScanStep::Keep
        }
    });
    if folded.is_empty() {
        return;
    }
    shared.stats.record_folded(kind, folded.len() as u64);
    for request in folded {
        info!("Folded {}", request.request());
        request.reply_in_place();
    }
}

/// Serve one listing queue until it is closed.
pub fn run_lists(shared: &WorkerShared, queue: &RequestQueue) {
    while let Some(request) = queue.take() {
        let Some(mut request) = discard_expired(shared, request) else {
            continue;
        };
        let kind = request.request().kind();
        let started = Instant::now();
        let result = guarded(kind, || {
            ops::list::execute(
                &shared.ctx,
                &mut request,
                shared.list_limit,
                shared.list_flush_interval,
            )
        });
        match result {
            Ok(()) => request.request_mut().set_succeeded(),
            Err(status) => request.request_mut().set_failed(status),
        }
        shared.record(kind, started.elapsed(), request.request());
        request.reply_in_place();
    }
    debug!("list worker stopped");
}
