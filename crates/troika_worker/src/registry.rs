//! Worker registry
//!
//! The registry owns the worker threads, tracks which modules have been
//! registered on which worker, and correlates responses to outstanding
//! requests by message id.
//!
//! Responses are delivered by [`WorkerRegistry::pump`], on whichever thread
//! calls it; a frame loop typically pumps once per frame so that thenable
//! listeners run on the same thread that mutates the scene.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use serde_json::{json, Value};
//! use troika_worker::{
//!     define_worker_module, ModuleDeps, ModuleInstance, RegistryConfig, WorkerModuleOptions,
//!     WorkerRegistry,
//! };
//!
//! fn init_square(_deps: &ModuleDeps) -> Result<ModuleInstance, String> {
//!     Ok(ModuleInstance::function(|args: Value| {
//!         let n = args.as_f64().ok_or("expected a number")?;
//!         Ok(json!(n * n))
//!     }))
//! }
//!
//! let registry = WorkerRegistry::new(RegistryConfig::default());
//! let square = define_worker_module(WorkerModuleOptions::new("square", init_square));
//! let result = square.call(&registry, json!(3.0));
//! registry.wait_idle(Duration::from_secs(5));
//! assert_eq!(result.try_result(), Some(Ok(json!(9.0))));
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkerError;
use crate::host::{run_worker, WorkerHost};
use crate::module::{ModuleId, WorkerId, WorkerModule};
use crate::protocol::{ModuleCall, ModuleRegistration, WorkerAction, WorkerRequest, WorkerResponse};
use crate::thenable::{Resolver, Thenable};

/// Outstanding request count above which a leak warning is logged
pub const DEFAULT_LEAK_WARNING_THRESHOLD: usize = 1000;

/// Where worker modules execute
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One persistent thread per worker id
    #[default]
    Threaded,
    /// Run modules on the calling thread (no worker support)
    MainThread,
}

/// Registry configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub mode: ExecutionMode,
    pub leak_warning_threshold: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Threaded,
            leak_warning_threshold: DEFAULT_LEAK_WARNING_THRESHOLD,
        }
    }
}

impl RegistryConfig {
    /// Main-thread fallback configuration
    pub fn main_thread() -> Self {
        Self {
            mode: ExecutionMode::MainThread,
            ..Self::default()
        }
    }
}

enum Transport {
    Thread {
        sender: flume::Sender<WorkerRequest>,
        handle: Option<JoinHandle<()>>,
    },
    Local(Arc<Mutex<WorkerHost>>),
}

struct WorkerSlot {
    transport: Transport,
    registered: FxHashSet<ModuleId>,
}

enum PendingKind {
    Registration,
    Call(Resolver<Value>),
}

struct PendingRequest {
    worker_id: WorkerId,
    module: &'static str,
    kind: PendingKind,
}

struct RegistryInner {
    config: RegistryConfig,
    next_message_id: u64,
    workers: FxHashMap<WorkerId, WorkerSlot>,
    pending: FxHashMap<u64, PendingRequest>,
    responses_tx: flume::Sender<WorkerResponse>,
    responses_rx: flume::Receiver<WorkerResponse>,
    /// Main-thread requests, handled once the registry lock is released
    local_queue: VecDeque<(Arc<Mutex<WorkerHost>>, WorkerRequest)>,
    leak_warned: bool,
}

/// Handle to the worker registry (cheap to clone)
///
/// All clones share the same workers and correlation state. Worker threads
/// are shut down when the last handle is dropped or on [`terminate`].
///
/// [`terminate`]: WorkerRegistry::terminate
#[derive(Clone)]
pub struct WorkerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("WorkerRegistry")
            .field("mode", &inner.config.mode)
            .field("workers", &inner.workers.len())
            .field("pending", &inner.pending.len())
            .finish()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl WorkerRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let (responses_tx, responses_rx) = flume::unbounded();
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                config,
                next_message_id: 0,
                workers: FxHashMap::default(),
                pending: FxHashMap::default(),
                responses_tx,
                responses_rx,
                local_queue: VecDeque::new(),
                leak_warned: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> ExecutionMode {
        self.lock().config.mode
    }

    /// Number of requests still awaiting a response
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether `module` has been registered on its worker
    pub fn is_registered(&self, module: &WorkerModule) -> bool {
        self.lock()
            .workers
            .get(&module.worker_id())
            .is_some_and(|slot| slot.registered.contains(&module.id()))
    }

    /// Call a worker module
    ///
    /// Registers the module and its dependencies on first use, then sends
    /// the call. The returned thenable settles when the correlated response
    /// is delivered by [`pump`](Self::pump).
    pub fn call(&self, module: &WorkerModule, args: Value) -> Thenable<Value> {
        let (thenable, resolver) = Thenable::pending();
        let mut inner = self.lock();

        inner.ensure_registered(module);

        let message_id = inner.next_id();
        inner.pending.insert(
            message_id,
            PendingRequest {
                worker_id: module.worker_id(),
                module: module.name(),
                kind: PendingKind::Call(resolver),
            },
        );
        inner.check_leaks();

        let request = WorkerRequest {
            message_id,
            action: WorkerAction::CallModule(ModuleCall {
                module_id: module.id(),
                args,
            }),
        };
        if let Err(error) = inner.send(module.worker_id(), request) {
            let removed = inner.pending.remove(&message_id);
            drop(inner);
            if let Some(PendingRequest {
                kind: PendingKind::Call(resolver),
                ..
            }) = removed
            {
                resolver.reject(error);
            }
        } else {
            drop(inner);
        }
        self.run_local();
        thenable
    }

    /// Handle queued main-thread requests outside the registry lock, so
    /// modules may call back into the registry
    ///
    /// A host that is already busy further up the stack is left to its
    /// running caller, which keeps draining until the queue is empty.
    fn run_local(&self) {
        loop {
            let (host, request, responses) = {
                let mut inner = self.lock();
                let Some((host, request)) = inner.local_queue.pop_front() else {
                    return;
                };
                (host, request, inner.responses_tx.clone())
            };
            let mut guard = match host.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    self.lock().local_queue.push_front((Arc::clone(&host), request));
                    return;
                }
            };
            if let Some(response) = guard.handle(request) {
                // Queued, not settled: delivery happens on the next pump
                let _ = responses.send(response);
            }
        }
    }

    /// Deliver every response that has arrived so far
    ///
    /// Returns the number of responses delivered.
    pub fn pump(&self) -> usize {
        let responses = self.lock().responses_rx.clone();
        let mut delivered = 0;
        while let Ok(response) = responses.try_recv() {
            self.deliver(response);
            delivered += 1;
        }
        delivered
    }

    /// Block until no requests are outstanding, delivering responses as they
    /// arrive. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let responses = self.lock().responses_rx.clone();
        loop {
            self.pump();
            if self.pending_count() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match responses.recv_timeout(deadline - now) {
                Ok(response) => self.deliver(response),
                Err(flume::RecvTimeoutError::Timeout) => return false,
                Err(flume::RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    fn deliver(&self, response: WorkerResponse) {
        let pending = self.lock().pending.remove(&response.message_id);
        let Some(pending) = pending else {
            tracing::debug!(
                message_id = response.message_id,
                "discarding response for unknown request"
            );
            return;
        };

        match pending.kind {
            PendingKind::Registration => {
                if !response.success {
                    tracing::warn!(
                        worker = %pending.worker_id,
                        module = pending.module,
                        error = response.error.as_deref().unwrap_or("unknown error"),
                        "worker module registration failed"
                    );
                }
            }
            PendingKind::Call(resolver) => {
                if response.success {
                    resolver.resolve(response.result.unwrap_or(Value::Null));
                } else {
                    resolver.reject(WorkerError::Call {
                        module: pending.module.to_string(),
                        message: response.error.unwrap_or_else(|| "unknown error".to_string()),
                    });
                }
            }
        }
    }

    /// Shut down all worker threads
    ///
    /// Outstanding requests are rejected with [`WorkerError::Abandoned`].
    /// Later calls start fresh workers.
    pub fn terminate(&self) {
        let (workers, pending) = {
            let mut inner = self.lock();
            inner.leak_warned = false;
            inner.local_queue.clear();
            (
                std::mem::take(&mut inner.workers),
                std::mem::take(&mut inner.pending),
            )
        };
        for (_, slot) in workers {
            slot.shutdown();
        }
        // Dropping the resolvers rejects their thenables
        drop(pending);
    }
}

impl RegistryInner {
    fn next_id(&mut self) -> u64 {
        self.next_message_id += 1;
        self.next_message_id
    }

    fn check_leaks(&mut self) {
        let threshold = self.config.leak_warning_threshold;
        if self.pending.len() > threshold {
            if !self.leak_warned {
                tracing::warn!(
                    outstanding = self.pending.len(),
                    threshold,
                    "more than {threshold} worker requests are outstanding; responses may be leaking"
                );
                self.leak_warned = true;
            }
        } else {
            self.leak_warned = false;
        }
    }

    fn slot(&mut self, worker_id: WorkerId) -> &mut WorkerSlot {
        let mode = self.config.mode;
        let responses = self.responses_tx.clone();
        self.workers
            .entry(worker_id)
            .or_insert_with(|| WorkerSlot::spawn(worker_id, mode, responses))
    }

    /// Register `module` (dependencies first) on its own worker
    fn ensure_registered(&mut self, module: &WorkerModule) {
        self.register_on(module.worker_id(), module);
    }

    fn register_on(&mut self, worker_id: WorkerId, module: &WorkerModule) {
        if self.slot(worker_id).registered.contains(&module.id()) {
            return;
        }
        for dependency in module.dependencies() {
            self.register_on(worker_id, dependency);
        }

        let message_id = self.next_id();
        let request = WorkerRequest {
            message_id,
            action: WorkerAction::RegisterModule(ModuleRegistration {
                module_id: module.id(),
                name: module.name(),
                dependency_ids: module.dependencies().iter().map(WorkerModule::id).collect(),
                init: module.init(),
            }),
        };
        self.pending.insert(
            message_id,
            PendingRequest {
                worker_id,
                module: module.name(),
                kind: PendingKind::Registration,
            },
        );
        // Marked before the response arrives; requests are processed in order,
        // so the call that follows always sees the module realized.
        self.slot(worker_id).registered.insert(module.id());
        if let Err(error) = self.send(worker_id, request) {
            self.pending.remove(&message_id);
            tracing::warn!(worker = %worker_id, module = module.name(), %error, "registration not sent");
        }
    }

    fn send(&mut self, worker_id: WorkerId, request: WorkerRequest) -> Result<(), WorkerError> {
        let slot = self.slot(worker_id);
        match &mut slot.transport {
            Transport::Thread { sender, .. } => sender
                .send(request)
                .map_err(|_| WorkerError::WorkerUnavailable(worker_id.to_string())),
            Transport::Local(host) => {
                let host = Arc::clone(host);
                self.local_queue.push_back((host, request));
                Ok(())
            }
        }
    }
}

impl WorkerSlot {
    fn spawn(
        worker_id: WorkerId,
        mode: ExecutionMode,
        responses: flume::Sender<WorkerResponse>,
    ) -> Self {
        let label = format!("troika-worker-{worker_id}");
        let transport = match mode {
            ExecutionMode::MainThread => Transport::Local(Arc::new(Mutex::new(WorkerHost::new(label)))),
            ExecutionMode::Threaded => {
                let (sender, requests) = flume::unbounded();
                let thread_label = label.clone();
                match std::thread::Builder::new()
                    .name(label.clone())
                    .spawn(move || run_worker(thread_label, requests, responses))
                {
                    Ok(handle) => {
                        tracing::debug!(worker = %worker_id, "spawned worker thread");
                        Transport::Thread {
                            sender,
                            handle: Some(handle),
                        }
                    }
                    Err(error) => {
                        tracing::warn!(
                            worker = %worker_id,
                            %error,
                            "worker thread unavailable, running modules on the main thread"
                        );
                        Transport::Local(Arc::new(Mutex::new(WorkerHost::new(label))))
                    }
                }
            }
        };
        Self {
            transport,
            registered: FxHashSet::default(),
        }
    }

    fn shutdown(mut self) {
        if let Transport::Thread { sender, handle } = &mut self.transport {
            let _ = sender.send(WorkerRequest {
                message_id: 0,
                action: WorkerAction::Terminate,
            });
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    tracing::warn!("worker thread panicked during shutdown");
                }
            }
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for (_, slot) in self.workers.drain() {
            slot.shutdown();
        }
    }
}
