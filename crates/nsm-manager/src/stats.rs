//! Per-operation counters and execution-time gauges.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::messages::OperationKind;

#[derive(Default)]
struct KindStats {
    requests: AtomicU64,
    failed: AtomicU64,
    folded: AtomicU64,
    discarded: AtomicU64,
    exec_total_us: AtomicU64,
    exec_max_us: AtomicU64,
    exec_last_us: AtomicU64,
}

/// Point-in-time copy of the counters of one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindSnapshot {
    pub requests: u64,
    pub failed: u64,
    pub folded: u64,
    pub discarded: u64,
    pub exec_total: Duration,
    pub exec_max: Duration,
    pub exec_last: Duration,
}

impl KindSnapshot {
    pub fn exec_average(&self) -> Duration {
        match self.requests {
            0 => Duration::ZERO,
            n => Duration::from_nanos((self.exec_total.as_nanos() / n as u128) as u64),
        }
    }
}

#[derive(Default)]
pub struct ManagerStats {
    kinds: DashMap<OperationKind, KindStats>,
}

impl ManagerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// An executed request and how long it took.
    pub fn record_execution(&self, kind: OperationKind, elapsed: Duration, ok: bool) {
        let us = elapsed.as_micros() as u64;
        let stats = self.kinds.entry(kind).or_default();
        stats.requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        stats.exec_total_us.fetch_add(us, Ordering::Relaxed);
        stats.exec_max_us.fetch_max(us, Ordering::Relaxed);
        stats.exec_last_us.store(us, Ordering::Relaxed);
    }

    /// `kind` was answered from the result of another request.
    pub fn record_folded(&self, kind: OperationKind, count: u64) {
        if count > 0 {
            self.kinds
                .entry(kind)
                .or_default()
                .folded
                .fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_discarded(&self, kind: OperationKind) {
        self.kinds
            .entry(kind)
            .or_default()
            .discarded
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, kind: OperationKind) -> KindSnapshot {
        let Some(stats) = self.kinds.get(&kind) else {
            return KindSnapshot::default();
        };
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        KindSnapshot {
            requests: load(&stats.requests),
            failed: load(&stats.failed),
            folded: load(&stats.folded),
            discarded: load(&stats.discarded),
            exec_total: Duration::from_micros(load(&stats.exec_total_us)),
            exec_max: Duration::from_micros(load(&stats.exec_max_us)),
            exec_last: Duration::from_micros(load(&stats.exec_last_us)),
        }
    }

    /// Table of every kind seen so far, in declaration order.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{:<20} {:>10} {:>8} {:>8} {:>9} {:>10} {:>10}\n",
            "operation", "requests", "failed", "folded", "discarded", "avg(ms)", "max(ms)"
        );
        for kind in OperationKind::ALL {
            if !self.kinds.contains_key(&kind) {
                continue;
            }
            let s = self.snapshot(kind);
            let _ = writeln!(
                out,
                "{:<20} {:>10} {:>8} {:>8} {:>9} {:>10.3} {:>10.3}",
                kind.name(),
                s.requests,
                s.failed,
                s.folded,
                s.discarded,
                s.exec_average().as_secs_f64() * 1000.0,
                s.exec_max.as_secs_f64() * 1000.0,
            );
        }
        out
    }
}
