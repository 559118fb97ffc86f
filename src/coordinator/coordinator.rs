// ABOUTME: Completion coordinator for a keyed bundle of async operations.
// ABOUTME: Tracks pending/resolved/rejected ids and fires one continuation per satisfied check.

use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::continuation::{Continuation, Outcome};
use super::handle::{OperationHandle, Reporter, Source, source};
use super::policy::{Dispatch, Strictness, decide};
use super::state::{OperationSet, OperationState, Results, Settled};
use crate::config::BundleConfig;
use crate::error::OperationError;
use crate::payload::{Coerce, JsonCoercer, Payload};

/// Copy of the settled results at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub resolved: Results,
    pub rejected: Results,
}

/// Mutable coordinator state, always accessed under the lock.
struct Inner {
    operations: OperationSet<OperationHandle>,
    fetch_enabled: bool,
    armed: bool,
    strictness: Strictness,
    send_data: bool,
    continuation: Option<Continuation>,
    next_ticket: u64,
}

/// State shared between coordinator clones and reported into by handles.
pub(super) struct Shared {
    state: Mutex<Inner>,
    /// Held from a dispatch decision through the continuation call, so
    /// continuations run one at a time. Reentrant for continuations that
    /// call back into the coordinator.
    dispatching: ReentrantMutex<()>,
    coercer: Arc<dyn Coerce>,
    runtime: Option<Handle>,
}

/// A continuation call decided under the lock, made after releasing it.
struct Fire {
    continuation: Continuation,
    outcome: Outcome,
    results: Option<Results>,
}

/// Completion coordinator for a keyed set of async operations.
///
/// Operations are registered under unique ids. Each one is awaited on its own
/// tokio task once the fetch gate is open. Every state change re-runs the
/// dispatch check, and while the coordinator is armed the continuation fires
/// with the resolved or rejected results according to the strictness policy.
///
/// # Semantics
///
/// - **No auto-disarm:** a later state change that satisfies the check again
///   fires again. Disarm after the first dispatch for single-shot use.
/// - **Cancel-and-replace:** re-registering an id aborts the previous task and
///   puts the id back to pending.
/// - **Detach on unregister:** the source keeps running; its outcome is ignored.
/// - **Never fails:** anomalies are logged, operation failures are stored as data.
/// - **Serial dispatch:** continuation calls never overlap, and a dispatch
///   decided before a `disarm()` from another continuation is dropped.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    /// Create a coordinator with the default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a coordinator from a configuration.
    pub fn with_config(config: BundleConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    pub(super) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// A handle that does not keep the coordinator alive.
    ///
    /// Bind this rather than a clone as the context of a continuation that
    /// calls back into the coordinator, or the two keep each other alive.
    pub fn downgrade(&self) -> WeakCoordinator {
        WeakCoordinator {
            shared: Arc::downgrade(&self.shared),
        }
    }

    // Operations

    /// Register operations under their ids.
    ///
    /// An id that is already registered is replaced: a pending handle is
    /// cancelled and a settled result is discarded. When the fetch gate is
    /// open each new operation starts right away.
    pub fn register<I, K, S, R, E>(&self, operations: I) -> &Self
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: Future<Output = Result<R, E>> + Send + 'static,
        R: Into<Payload> + Send + 'static,
        E: Into<Payload> + Send + 'static,
    {
        let mut inner = self.shared.state.lock();
        for (id, future) in operations {
            self.insert(&mut inner, id.into(), source(future));
        }
        self
    }

    /// Register a single already-boxed source.
    pub fn register_source(&self, id: impl Into<String>, source: Source) -> &Self {
        let mut inner = self.shared.state.lock();
        self.insert(&mut inner, id.into(), source);
        self
    }

    fn insert(&self, inner: &mut Inner, id: String, source: Source) {
        inner.next_ticket += 1;
        let ticket = inner.next_ticket;

        if inner.operations.contains(&id) && inner.operations.pending(&id).is_none() {
            debug!(%id, "Coordinator::register: discarding settled result");
        }

        let handle = OperationHandle::new(id.clone(), ticket, source);
        if let Some(previous) = inner.operations.insert_pending(id.clone(), handle) {
            debug!(%id, previous = previous.ticket(), ticket, "Coordinator::register: replacing pending operation");
            previous.cancel();
        }
        debug!(%id, ticket, "Coordinator::register: registered");

        if inner.fetch_enabled {
            if let Err(err) = self.start_locked(inner, &id) {
                warn!(%err, "Coordinator::register: could not start operation");
            }
        }
    }

    /// Stop tracking pending operations.
    ///
    /// The underlying sources are not cancelled; their outcomes are ignored.
    /// Settled ids are left alone. Re-evaluates dispatch afterwards.
    pub fn unregister<I, K>(&self, ids: I) -> &Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let _dispatching = self.shared.dispatching.lock();
        let fire = {
            let mut inner = self.shared.state.lock();
            for id in ids {
                let id = id.as_ref();
                if inner.operations.remove_pending(id).is_some() {
                    debug!(%id, "Coordinator::unregister: detached");
                } else if inner.operations.contains(id) {
                    debug!(err = %OperationError::NotPending(id.to_string()), "Coordinator::unregister: ignored");
                } else {
                    warn!(err = %OperationError::Unknown(id.to_string()), "Coordinator::unregister: ignored");
                }
            }
            reevaluate(&inner)
        };
        self.dispatch(fire);
        self
    }

    /// Start awaiting one pending operation, even while the fetch gate is closed.
    pub fn start(&self, id: &str) -> &Self {
        let mut inner = self.shared.state.lock();
        match self.start_locked(&mut inner, id) {
            Ok(true) => {}
            Ok(false) => debug!(%id, "Coordinator::start: already started"),
            Err(err) => warn!(%err, "Coordinator::start: could not start operation"),
        }
        self
    }

    fn start_locked(&self, inner: &mut Inner, id: &str) -> Result<bool, OperationError> {
        if inner.operations.pending(id).is_none() {
            return Err(if inner.operations.contains(id) {
                OperationError::NotPending(id.to_string())
            } else {
                OperationError::Unknown(id.to_string())
            });
        }
        let runtime = self
            .runtime()
            .ok_or_else(|| OperationError::NoRuntime(id.to_string()))?;
        let Some(handle) = inner.operations.pending_mut(id) else {
            return Err(OperationError::Unknown(id.to_string()));
        };
        Ok(handle.begin_await(&runtime, Arc::clone(&self.shared.coercer), self.reporter()))
    }

    /// Record a settlement reported by a handle.
    ///
    /// Dropped unless `id` is still pending under the same ticket. Recording,
    /// removal from pending and re-evaluation happen under one lock. Waits
    /// for a running continuation to return first.
    pub(super) fn settle(&self, id: &str, ticket: u64, outcome: Settled) {
        let _dispatching = self.shared.dispatching.lock();
        let fire = {
            let mut inner = self.shared.state.lock();
            match inner.operations.pending(id) {
                Some(handle) if handle.ticket() == ticket => {}
                Some(handle) => {
                    debug!(%id, ticket, current = handle.ticket(), "Coordinator::settle: stale ticket, ignoring");
                    return;
                }
                None => {
                    debug!(%id, ticket, "Coordinator::settle: no longer pending, ignoring");
                    return;
                }
            }
            debug!(%id, ticket, ?outcome, "Coordinator::settle: recorded");
            inner.operations.settle(id, outcome);
            reevaluate(&inner)
        };
        self.dispatch(fire);
    }

    /// Invoke a decided continuation.
    ///
    /// Called with `dispatching` held and the state lock released.
    fn dispatch(&self, fire: Option<Fire>) {
        let Some(fire) = fire else {
            return;
        };
        if !self.shared.state.lock().armed {
            debug!(outcome = ?fire.outcome, "Coordinator::dispatch: disarmed since decision, dropping");
            return;
        }
        info!(
            outcome = ?fire.outcome,
            results = fire.results.as_ref().map(|r| r.len()),
            "Coordinator::dispatch: firing continuation"
        );
        fire.continuation.invoke(fire.outcome, fire.results);
    }

    fn runtime(&self) -> Option<Handle> {
        self.shared
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    fn reporter(&self) -> Reporter {
        Reporter::new(Arc::downgrade(&self.shared))
    }

    // Gating

    /// Allow handles to await their sources, starting every pending one.
    ///
    /// Without a tokio runtime nothing can start and the gate keeps its state.
    pub fn open_gate(&self) -> &Self {
        let mut inner = self.shared.state.lock();
        let Some(runtime) = self.runtime() else {
            warn!(pending = inner.operations.pending_ids().len(), "Coordinator::open_gate: no tokio runtime, gate left as is");
            return self;
        };
        inner.fetch_enabled = true;

        let mut started = 0;
        for (_, handle) in inner.operations.pending_entries_mut() {
            if handle.begin_await(&runtime, Arc::clone(&self.shared.coercer), self.reporter()) {
                started += 1;
            }
        }
        debug!(started, "Coordinator::open_gate: gate open");
        self
    }

    /// Stop new operations from starting. Running ones are unaffected.
    pub fn close_gate(&self) -> &Self {
        self.shared.state.lock().fetch_enabled = false;
        debug!("Coordinator::close_gate: gate closed");
        self
    }

    /// Allow the continuation to fire and re-evaluate right away.
    pub fn arm(&self) -> &Self {
        let _dispatching = self.shared.dispatching.lock();
        let fire = {
            let mut inner = self.shared.state.lock();
            inner.armed = true;
            reevaluate(&inner)
        };
        self.dispatch(fire);
        self
    }

    pub fn disarm(&self) -> &Self {
        self.shared.state.lock().armed = false;
        self
    }

    /// Any rejection fires the continuation with the rejected set.
    pub fn set_strict(&self) -> &Self {
        self.shared.state.lock().strictness = Strictness::Strict;
        self
    }

    /// Wait for every operation. Re-evaluates, since loosening may unblock dispatch.
    pub fn set_lax(&self) -> &Self {
        let _dispatching = self.shared.dispatching.lock();
        let fire = {
            let mut inner = self.shared.state.lock();
            inner.strictness = Strictness::Lax;
            reevaluate(&inner)
        };
        self.dispatch(fire);
        self
    }

    /// Replace the continuation.
    pub fn set_continuation(&self, continuation: Continuation) -> &Self {
        self.shared.state.lock().continuation = Some(continuation);
        self
    }

    pub fn clear_continuation(&self) -> &Self {
        self.shared.state.lock().continuation = None;
        self
    }

    /// Whether the continuation receives the aggregated results.
    pub fn set_send_data(&self, send_data: bool) -> &Self {
        self.shared.state.lock().send_data = send_data;
        self
    }

    // Inspection

    /// Current resolved and rejected results.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.shared.state.lock();
        Snapshot {
            resolved: inner.operations.resolved().clone(),
            rejected: inner.operations.rejected().clone(),
        }
    }

    pub fn resolved(&self) -> Results {
        self.shared.state.lock().operations.resolved().clone()
    }

    pub fn rejected(&self) -> Results {
        self.shared.state.lock().operations.rejected().clone()
    }

    /// Drop stored resolved results; all of them when `ids` is empty.
    pub fn clear_resolved(&self, ids: &[String]) -> &Self {
        self.shared.state.lock().operations.clear_resolved(ids);
        self
    }

    /// Drop stored rejected results; all of them when `ids` is empty.
    pub fn clear_rejected(&self, ids: &[String]) -> &Self {
        self.shared.state.lock().operations.clear_rejected(ids);
        self
    }

    pub fn status(&self, id: &str) -> Option<OperationState> {
        self.shared.state.lock().operations.state(id)
    }

    /// Pending ids, sorted.
    pub fn pending_ids(&self) -> Vec<String> {
        self.shared.state.lock().operations.pending_ids()
    }

    pub fn is_gate_open(&self) -> bool {
        self.shared.state.lock().fetch_enabled
    }

    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().armed
    }

    pub fn strictness(&self) -> Strictness {
        self.shared.state.lock().strictness
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.state.lock();
        f.debug_struct("Coordinator")
            .field("operations", &inner.operations)
            .field("fetch_enabled", &inner.fetch_enabled)
            .field("armed", &inner.armed)
            .field("strictness", &inner.strictness)
            .finish_non_exhaustive()
    }
}

/// Run the dispatch check and, if it fires, capture what to call.
fn reevaluate(inner: &Inner) -> Option<Fire> {
    let decision = decide(&inner.operations, inner.armed, inner.strictness);
    let outcome = match decision {
        Dispatch::Resolved => Outcome::Resolved,
        Dispatch::Rejected => Outcome::Rejected,
        Dispatch::Disarmed | Dispatch::Waiting | Dispatch::Idle => {
            debug!(?decision, "reevaluate: no dispatch");
            return None;
        }
    };

    let Some(continuation) = inner.continuation.clone() else {
        debug!(?outcome, "reevaluate: no continuation set");
        return None;
    };

    // Copied so the continuation can re-enter the coordinator.
    let results = inner.send_data.then(|| match outcome {
        Outcome::Resolved => inner.operations.resolved().clone(),
        Outcome::Rejected => inner.operations.rejected().clone(),
    });

    Some(Fire {
        continuation,
        outcome,
        results,
    })
}


/// Non-owning handle to a coordinator, from [`Coordinator::downgrade`].
#[derive(Clone, Default)]
pub struct WeakCoordinator {
    shared: Weak<Shared>,
}

impl WeakCoordinator {
    /// The coordinator, unless every clone has been dropped.
    pub fn upgrade(&self) -> Option<Coordinator> {
        self.shared.upgrade().map(Coordinator::from_shared)
    }
}

impl std::fmt::Debug for WeakCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakCoordinator")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

/// Builder for coordinators.
pub struct CoordinatorBuilder {
    config: BundleConfig,
    coercer: Option<Arc<dyn Coerce>>,
    continuation: Option<Continuation>,
    runtime: Option<Handle>,
    operations: Vec<(String, Source)>,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            config: BundleConfig::default(),
            coercer: None,
            continuation: None,
            runtime: None,
            operations: Vec::new(),
        }
    }

    pub fn config(mut self, config: BundleConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom coercion hook instead of the JSON default.
    pub fn coercer(mut self, coercer: impl Coerce + 'static) -> Self {
        self.coercer = Some(Arc::new(coercer));
        self
    }

    pub fn continuation(mut self, continuation: Continuation) -> Self {
        self.continuation = Some(continuation);
        self
    }

    /// Spawn handles on this runtime rather than the ambient one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Add an operation to register on build.
    pub fn operation<S, R, E>(mut self, id: impl Into<String>, future: S) -> Self
    where
        S: Future<Output = Result<R, E>> + Send + 'static,
        R: Into<Payload> + Send + 'static,
        E: Into<Payload> + Send + 'static,
    {
        self.operations.push((id.into(), source(future)));
        self
    }

    pub fn build(self) -> Coordinator {
        let coercer = self
            .coercer
            .unwrap_or_else(|| Arc::new(JsonCoercer::new(self.config.text_fallback)));
        let runtime = self.runtime.or_else(|| Handle::try_current().ok());

        let coordinator = Coordinator {
            shared: Arc::new(Shared {
                dispatching: ReentrantMutex::new(()),
                state: Mutex::new(Inner {
                    operations: OperationSet::new(),
                    fetch_enabled: self.config.fetch_enabled,
                    armed: self.config.armed,
                    strictness: self.config.strictness,
                    send_data: self.config.send_data,
                    continuation: self.continuation,
                    next_ticket: 0,
                }),
                coercer,
                runtime,
            }),
        };

        for (id, source) in self.operations {
            coordinator.register_source(id, source);
        }
        coordinator
    }
}
