//! The namespace manager cell.
//!
//! [`NamespaceManager::start`] builds the queues and spawns one OS thread
//! per main and location queue plus the listing workers of every group.
//! [`NamespaceManager::receiver`] is what gets registered with the router:
//! it admits arriving requests onto the queue chosen by [`ShardRouting`]
//! and returns immediately, leaving the answer to the worker.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use nsm_cells::{
    CellEndpoint, CellMessageDispatcher, CellReceiver, DeferredReply, DispatchingReceiver,
    Envelope, HandlerError, Message,
};
use nsm_config::{Config, ConfigError};
use nsm_permission::{ChainedPermissionHandler, PermissionHandler};
use nsm_provider::{CacheLocationProvider, MemoryNameSpaceProvider, NameSpaceProvider};
use nsm_types::{CellCode, Status};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::NamespaceManagerConfig;
use crate::messages::{NamespaceMessage, OperationKind};
use crate::ops::OpContext;
use crate::relay::Relay;
use crate::routing::{QueueSelection, ShardRouting};
use crate::stats::ManagerStats;
use crate::worker::{self, RequestQueue, WorkerShared};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// The storage and policy the manager delegates to.
#[derive(Clone)]
pub struct Backends {
    pub provider: Arc<dyn NameSpaceProvider>,
    pub locations: Arc<dyn CacheLocationProvider>,
    pub permission: Arc<dyn PermissionHandler>,
}

impl Backends {
    /// Everything served by one in-memory namespace, with ACL-then-POSIX
    /// permission checks.
    pub fn in_memory(provider: Arc<MemoryNameSpaceProvider>) -> Self {
        Self {
            provider: provider.clone(),
            locations: provider,
            permission: Arc::new(ChainedPermissionHandler::default()),
        }
    }
}

fn shutting_down() -> Status {
    Status::with_message(CellCode::SHUTTING_DOWN, "namespace manager is shutting down")
}

pub struct NamespaceManager {
    shared: Arc<WorkerShared>,
    main: Vec<Arc<RequestQueue>>,
    locations: Vec<Arc<RequestQueue>>,
    lists: Vec<Arc<RequestQueue>>,
    endpoint: CellEndpoint<NamespaceMessage>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl NamespaceManager {
    pub fn start(
        config: NamespaceManagerConfig,
        backends: Backends,
        endpoint: CellEndpoint<NamespaceMessage>,
    ) -> Result<Arc<Self>, ManagerError> {
        config.validate()?;
        let relay = |destination| Relay::new(endpoint.clone(), destination);
        let cache_modification_relay = config.cache_modification_relay()?.map(relay);
        let delete_notification_relay = config.delete_notification_relay()?.map(relay);

        let routing = Arc::new(ShardRouting::new(
            config.threads,
            config.thread_groups,
            config.cache_location_threads,
        ));
        let shared = Arc::new(WorkerShared {
            ctx: OpContext {
                provider: backends.provider,
                locations: backends.locations,
                permission: backends.permission,
                routing,
                cache_modification_relay,
                delete_notification_relay,
            },
            stats: ManagerStats::new(),
            slow_threshold_ms: AtomicU64::new(0),
            folding: config.folding,
            list_limit: config.directory_list_limit,
            list_flush_interval: config.directory_list_flush_interval,
        });
        shared.set_slow_threshold(Some(config.log_slow_threshold).filter(|t| !t.is_zero()));

        let queue = || Arc::new(RequestQueue::new(config.queue_max_size));
        let main: Vec<_> = (0..config.shard_count()).map(|_| queue()).collect();
        let locations: Vec<_> = (0..config.cache_location_threads).map(|_| queue()).collect();
        let lists: Vec<_> = (0..config.thread_groups).map(|_| queue()).collect();

        let mut workers = Vec::new();
        let spawn = |name: String, queue: &Arc<RequestQueue>, serve: fn(&WorkerShared, &RequestQueue)| {
            let shared = Arc::clone(&shared);
            let queue = Arc::clone(queue);
            std::thread::Builder::new()
                .name(name)
                .spawn(move || serve(&shared, &queue))
        };
        for (index, q) in main.iter().enumerate() {
            let name = format!("nsm-{}-{}", index / config.threads, index % config.threads);
            workers.push(spawn(name, q, worker::run)?);
        }
        for (index, q) in locations.iter().enumerate() {
            workers.push(spawn(format!("nsm-loc-{}", index), q, worker::run)?);
        }
        for (group, q) in lists.iter().enumerate() {
            for index in 0..config.list_threads {
                let name = format!("nsm-list-{}-{}", group, index);
                workers.push(spawn(name, q, worker::run_lists)?);
            }
        }

        info!(
            threads = config.threads,
            groups = config.thread_groups,
            location_threads = config.cache_location_threads,
            list_threads = config.list_threads,
            folding = config.folding,
            "namespace manager started"
        );
        Ok(Arc::new(Self {
            shared,
            main,
            locations,
            lists,
            endpoint,
            workers: Mutex::new(workers),
            stopped: AtomicBool::new(false),
        }))
    }

    /// The receiver to register with the router under this cell's name.
    pub fn receiver(self: &Arc<Self>) -> Arc<dyn CellReceiver<NamespaceMessage>> {
        let dispatcher = CellMessageDispatcher::<NamespaceMessage>::new();
        let manager: Weak<Self> = Arc::downgrade(self);
        dispatcher.register_all(
            OperationKind::ALL,
            "namespace-manager",
            Arc::new(move |env: &Envelope<NamespaceMessage>| -> Result<Option<NamespaceMessage>, HandlerError> {
                let Some(manager) = manager.upgrade() else {
                    return Err(HandlerError::Checked(shutting_down()));
                };
                manager.admit(env)?;
                Ok(None)
            }),
        );
        Arc::new(DispatchingReceiver::new(
            Arc::new(dispatcher),
            self.endpoint.clone(),
        ))
    }

    /// Put an arriving request on its queue. Errors are answered by the
    /// dispatcher; a full queue is answered here.
    fn admit(&self, env: &Envelope<NamespaceMessage>) -> Result<(), Status> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(shutting_down());
        }
        let msg = env.payload();
        if matches!(
            msg.kind(),
            OperationKind::AddCacheLocation | OperationKind::ClearCacheLocation
        ) {
            self.shared.ctx.relay_cache_modification(msg.clone());
        }

        let queue = match self.shared.ctx.routing.select(msg)? {
            QueueSelection::Main(i) => &self.main[i],
            QueueSelection::Location(i) => &self.locations[i],
            QueueSelection::List(i) => &self.lists[i],
        };
        let request = DeferredReply::new(env.clone(), self.endpoint.clone());
        if let Err(rejected) = queue.offer(request) {
            if self.stopped.load(Ordering::Acquire) {
                rejected.fail(shutting_down());
            } else {
                debug!("queue full, rejecting {}", msg);
                rejected.fail(Status::resource_exhausted("queue limit exceeded"));
            }
        }
        Ok(())
    }

    pub fn context(&self) -> &OpContext {
        &self.shared.ctx
    }

    pub fn stats(&self) -> &ManagerStats {
        &self.shared.stats
    }

    pub fn routing(&self) -> &ShardRouting {
        &self.shared.ctx.routing
    }

    pub fn slow_threshold(&self) -> Option<std::time::Duration> {
        self.shared.slow_threshold()
    }

    /// `None` disables slow-request warnings.
    pub fn set_slow_threshold(&self, threshold: Option<std::time::Duration>) {
        self.shared.set_slow_threshold(threshold);
        info!(?threshold, "slow request threshold changed");
    }

    /// Apply the hot-reloadable part of `config`.
    pub fn apply_config(&self, config: &NamespaceManagerConfig) {
        let threshold = Some(config.log_slow_threshold).filter(|t| !t.is_zero());
        if threshold != self.slow_threshold() {
            self.set_slow_threshold(threshold);
        }
    }

    /// Queue lengths of every queue, main queues indexed globally.
    pub fn queue_lengths(&self) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
        let lengths = |qs: &[Arc<RequestQueue>]| qs.iter().map(|q| q.len()).collect();
        (lengths(&self.main), lengths(&self.locations), lengths(&self.lists))
    }

    /// Queue overview followed by the per-operation statistics.
    pub fn info(&self) -> String {
        let routing = self.routing();
        let (main, locations, lists) = self.queue_lengths();
        let mut out = String::new();
        let _ = writeln!(out, "List queues (per group) : {:?}", lists);
        let _ = writeln!(out, "Threads ({}) Queue sizes", routing.threads());
        for (group, sizes) in main.chunks(routing.threads()).enumerate() {
            let total: usize = sizes.iter().sum();
            let _ = writeln!(out, "    [{}] {:?} total {}", group, sizes, total);
        }
        let _ = writeln!(out, "Thread groups ({})", routing.groups());
        if !locations.is_empty() {
            let _ = writeln!(out, "Cache location queues : {:?}", locations);
        }
        let _ = writeln!(out, "Folding : {}", if self.shared.folding { "on" } else { "off" });
        let _ = writeln!(out);
        let _ = writeln!(out, "Statistics:");
        out.push_str(&self.stats().render());
        out
    }

    /// Log the queued requests of main queue `index`, or of every queue.
    pub fn dump_queues(&self, index: Option<usize>) -> Result<(), Status> {
        let selected: Vec<(String, &Arc<RequestQueue>)> = match index {
            Some(i) => {
                let queue = self.main.get(i).ok_or_else(|| {
                    Status::invalid_arg(format!("no queue {} (have {})", i, self.main.len()))
                })?;
                vec![(format!("queue {}", i), queue)]
            }
            None => self
                .main
                .iter()
                .enumerate()
                .map(|(i, q)| (format!("queue {}", i), q))
                .chain(
                    self.locations
                        .iter()
                        .enumerate()
                        .map(|(i, q)| (format!("location queue {}", i), q)),
                )
                .chain(
                    self.lists
                        .iter()
                        .enumerate()
                        .map(|(i, q)| (format!("list queue {}", i), q)),
                )
                .collect(),
        };
        for (name, queue) in selected {
            let entries = queue.snapshot(|request| request.request().to_string());
            warn!("{} ({} queued): {}", name, entries.len(), entries.join(", "));
        }
        Ok(())
    }

    /// Stop admitting, fail whatever is still queued, and wait for the
    /// workers to finish their current request.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut abandoned = 0;
        for queue in self.main.iter().chain(&self.locations).chain(&self.lists) {
            for request in queue.close() {
                request.fail(shutting_down());
                abandoned += 1;
            }
        }
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
        info!(abandoned, "namespace manager stopped");
    }
}

impl Drop for NamespaceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Operation;
    use crossbeam::channel::{unbounded, Receiver};
    use nsm_cells::{CellAddress, CellRouter, CellStub};
    use nsm_provider::{ListRange, NameSpaceProvider};
    use nsm_types::{
        access::parse_masks, AttributeKind, AttributeKinds, DatabaseId, FileAttributes, FileType,
        FileTypes, NamespaceCode, StatusCode, Subject,
    };
    use std::collections::HashMap;
    use std::time::Duration;

    struct Harness {
        router: CellRouter<NamespaceMessage>,
        provider: Arc<MemoryNameSpaceProvider>,
        manager: Arc<NamespaceManager>,
        replies: Receiver<NamespaceMessage>,
    }

    impl Harness {
        fn new(config: NamespaceManagerConfig) -> Self {
            let provider = crate::ops::testing::provider();
            let router = CellRouter::new("test");
            let manager = NamespaceManager::start(
                config,
                Backends::in_memory(provider.clone()),
                router.endpoint("nsm"),
            )
            .unwrap();
            router.register("nsm", manager.receiver());
            let (tx, rx) = unbounded();
            router.register(
                "client",
                Arc::new(move |env: Envelope<NamespaceMessage>| {
                    let _ = tx.send(env.into_payload());
                }),
            );
            Self {
                router,
                provider,
                manager,
                replies: rx,
            }
        }

        fn send(&self, msg: NamespaceMessage) {
            self.router
                .endpoint("client")
                .send(Envelope::new(CellAddress::new("nsm", "test"), msg))
                .unwrap();
        }

        fn reply(&self) -> NamespaceMessage {
            self.replies.recv_timeout(Duration::from_secs(10)).unwrap()
        }

        fn stub(&self) -> CellStub<NamespaceMessage> {
            CellStub::new(self.router.endpoint("caller"))
                .with_destination(CellAddress::new("nsm", "test"))
                .with_timeout(Duration::from_secs(10))
        }
    }

    fn get_size(path: &str) -> NamespaceMessage {
        NamespaceMessage::new(Operation::get_file_attributes(AttributeKinds::of([
            AttributeKind::Size,
        ])))
        .with_path(path)
    }

    fn set_size(path: &str, size: u64) -> NamespaceMessage {
        let update = FileAttributes {
            size: Some(size),
            ..Default::default()
        };
        NamespaceMessage::new(Operation::set_file_attributes(
            update,
            AttributeKinds::of([AttributeKind::Size]),
        ))
        .with_path(path)
    }

    #[test]
    fn test_requests_for_one_entry_stay_ordered() {
        let h = Harness::new(NamespaceManagerConfig::default());
        for size in 0..50 {
            h.send(set_size("/data/f", size));
        }
        let sizes: Vec<Option<u64>> = (0..50)
            .map(|_| match h.reply().op {
                Operation::SetFileAttributes { acquired, .. } => acquired.size,
                other => panic!("unexpected reply {:?}", other),
            })
            .collect();
        assert_eq!(sizes, (0..50).map(Some).collect::<Vec<_>>());
    }

    #[test]
    fn test_interleaved_entries_stay_ordered() {
        let config = NamespaceManagerConfig {
            threads: 4,
            ..Default::default()
        };
        let h = Harness::new(config);
        let paths: Vec<String> = (0..8).map(|i| format!("/data/e{}", i)).collect();
        for path in &paths {
            h.provider
                .create_file(&Subject::root(), path, None, None, 0o644, &AttributeKinds::empty())
                .unwrap();
        }

        for size in 0..30 {
            for path in &paths {
                h.send(set_size(path, size));
            }
        }
        let mut seen: HashMap<String, Vec<u64>> = HashMap::new();
        for _ in 0..30 * paths.len() {
            let reply = h.reply();
            assert!(reply.is_ok(), "{:?}", reply);
            let Operation::SetFileAttributes { acquired, .. } = &reply.op else {
                panic!("unexpected reply {:?}", reply);
            };
            let path = reply.path.clone().unwrap();
            seen.entry(path).or_default().push(acquired.size.unwrap());
        }
        assert_eq!(seen.len(), paths.len());
        for (path, sizes) in seen {
            assert_eq!(sizes, (0..30).collect::<Vec<_>>(), "{}", path);
        }
    }

    #[test]
    fn test_blocking_round_trip() {
        let h = Harness::new(NamespaceManagerConfig::default());
        let reply = h
            .stub()
            .send_and_wait(NamespaceMessage::new(Operation::map_path(true)).with_path("/data/f"))
            .unwrap();
        let expected = h.provider.path_to_id(&Subject::root(), "/data/f", true).unwrap();
        assert_eq!(reply.id, Some(expected));

        let err = h.stub().send_and_wait(get_size("/data/missing")).unwrap_err();
        assert_eq!(err.code(), NamespaceCode::NOT_FOUND);
    }

    #[test]
    fn test_identical_reads_are_folded() {
        let config = NamespaceManagerConfig {
            threads: 1,
            ..Default::default()
        };
        let h = Harness::new(config);
        let id = h.provider.path_to_id(&Subject::root(), "/data/f", true).unwrap();
        h.provider.set_latency(Duration::from_millis(300));
        let calls = h.provider.calls();

        let request = NamespaceMessage::new(Operation::get_file_attributes(AttributeKinds::of([
            AttributeKind::Size,
            AttributeKind::Owner,
        ])))
        .with_id(id);
        for _ in 0..100 {
            h.send(request.clone());
        }
        let replies: Vec<NamespaceMessage> = (0..100).map(|_| h.reply()).collect();
        assert_eq!(h.provider.calls() - calls, 1);
        assert!(replies.iter().all(|r| r == &replies[0]));
        assert!(replies[0].is_ok());
        assert_eq!(
            h.manager.stats().snapshot(OperationKind::GetFileAttributes).folded,
            99
        );
    }

    #[test]
    fn test_delete_then_get_attributes() {
        let h = Harness::new(NamespaceManagerConfig::default());
        let all = FileTypes::of([FileType::Regular, FileType::Dir, FileType::Link, FileType::Special]);
        h.send(NamespaceMessage::new(Operation::delete_entry(all)).with_path("/data/f"));
        h.send(get_size("/data/f"));

        assert!(h.reply().is_ok());
        assert_eq!(h.reply().return_code, NamespaceCode::NOT_FOUND);
    }

    #[test]
    fn test_permission_denied() {
        let h = Harness::new(NamespaceManagerConfig::default());
        let msg = set_size("/data/f", 1)
            .with_subject(Subject::new(2000, 200))
            .with_access_mask(parse_masks("w").unwrap());
        let err = h.stub().send_and_wait(msg).unwrap_err();
        assert_eq!(err.code(), NamespaceCode::PERMISSION_DENIED);
    }

    #[test]
    fn test_full_queue_rejects() {
        let config = NamespaceManagerConfig {
            threads: 1,
            queue_max_size: 1,
            ..Default::default()
        };
        let h = Harness::new(config);
        h.provider.set_latency(Duration::from_millis(200));
        for size in 0..3 {
            h.send(set_size("/data/f", size));
        }
        let codes: Vec<_> = (0..3).map(|_| h.reply().return_code).collect();
        assert!(codes.contains(&StatusCode::RESOURCE_EXHAUSTED), "{:?}", codes);
        assert!(codes.contains(&StatusCode::OK), "{:?}", codes);
    }

    #[test]
    fn test_listing_is_streamed() {
        let h = Harness::new(NamespaceManagerConfig::default());
        for i in 0..150 {
            h.provider
                .create_file(
                    &Subject::root(),
                    &format!("/data/n{:03}", i),
                    None,
                    None,
                    0o644,
                    &AttributeKinds::empty(),
                )
                .unwrap();
        }
        h.send(
            NamespaceMessage::new(Operation::list_directory(
                Some("n*".to_string()),
                ListRange::ALL,
                AttributeKinds::empty(),
            ))
            .with_path("/data"),
        );
        let first = h.reply();
        let last = h.reply();
        let count = |m: &NamespaceMessage| match &m.op {
            Operation::ListDirectory { entries, .. } => entries.len(),
            _ => 0,
        };
        assert_eq!(count(&first) + count(&last), 150);
        assert!(matches!(
            last.op,
            Operation::ListDirectory { is_final: true, message_count: 2, .. }
        ));
    }

    #[test]
    fn test_listing_without_target_is_rejected_at_admission() {
        let h = Harness::new(NamespaceManagerConfig::default());
        h.send(NamespaceMessage::new(Operation::list_directory(
            None,
            ListRange::ALL,
            AttributeKinds::empty(),
        )));
        assert_eq!(h.reply().return_code, StatusCode::INVALID_ARG);
    }

    #[test]
    fn test_groups_learn_paths() {
        let config = NamespaceManagerConfig {
            thread_groups: 2,
            ..Default::default()
        };
        let h = Harness::new(config);
        h.stub().send_and_wait(get_size("/data/f")).unwrap();
        assert_eq!(h.manager.routing().path_cache().get("/data/g"), Some(DatabaseId(3)));
    }

    #[test]
    fn test_cache_modifications_are_relayed() {
        let config = NamespaceManagerConfig {
            cache_modification_relay: Some("replica@test".to_string()),
            ..Default::default()
        };
        let h = Harness::new(config);
        let (tx, relayed) = unbounded();
        h.router.register(
            "replica",
            Arc::new(move |env: Envelope<NamespaceMessage>| {
                let _ = tx.send(env.into_payload());
            }),
        );
        h.stub()
            .send_and_wait(
                NamespaceMessage::new(Operation::add_cache_location("pool1")).with_path("/data/f"),
            )
            .unwrap();
        let copy = relayed.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!copy.reply_required());
        assert!(matches!(copy.op, Operation::AddCacheLocation { ref location } if location == "pool1"));
    }

    #[test]
    fn test_shutdown_fails_queued_requests() {
        let config = NamespaceManagerConfig {
            threads: 1,
            ..Default::default()
        };
        let h = Harness::new(config);
        h.provider.set_latency(Duration::from_millis(100));
        for size in 0..3 {
            h.send(set_size("/data/f", size));
        }
        h.manager.shutdown();
        let codes: Vec<_> = (0..3).map(|_| h.reply().return_code).collect();
        assert!(codes
            .iter()
            .all(|c| *c == StatusCode::OK || *c == CellCode::SHUTTING_DOWN));
        assert!(codes.contains(&CellCode::SHUTTING_DOWN));

        h.send(get_size("/data/f"));
        assert_eq!(h.reply().return_code, CellCode::SHUTTING_DOWN);
    }

    #[test]
    fn test_info_and_threshold() {
        let h = Harness::new(NamespaceManagerConfig::default());
        h.stub().send_and_wait(get_size("/data/f")).unwrap();
        let info = h.manager.info();
        assert!(info.contains("Threads (4)"));
        assert!(info.contains("Statistics:"));
        assert!(info.contains("GetFileAttributes"));

        assert_eq!(h.manager.slow_threshold(), None);
        let config = NamespaceManagerConfig {
            log_slow_threshold: Duration::from_millis(500),
            ..Default::default()
        };
        h.manager.apply_config(&config);
        assert_eq!(h.manager.slow_threshold(), Some(Duration::from_millis(500)));
        assert!(h.manager.dump_queues(Some(99)).is_err());
        assert!(h.manager.dump_queues(None).is_ok());
    }
}
