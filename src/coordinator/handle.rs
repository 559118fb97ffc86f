// ABOUTME: OperationHandle binds one source future to one id inside a coordinator.
// ABOUTME: Settlement is reported through a Reporter capability, never a direct map write.

use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::debug;

use super::coordinator::{Coordinator, Shared};
use super::state::Settled;
use crate::payload::{Coerce, Payload};

/// A source value: eventually resolves or rejects with a payload.
pub type Source = BoxFuture<'static, Result<Payload, Payload>>;

/// Box any fallible future into a `Source`.
pub fn source<S, R, E>(future: S) -> Source
where
    S: Future<Output = Result<R, E>> + Send + 'static,
    R: Into<Payload> + Send + 'static,
    E: Into<Payload> + Send + 'static,
{
    Box::pin(async move {
        let outcome: Result<Payload, Payload> = match future.await {
            Ok(raw) => Ok(raw.into()),
            Err(raw) => Err(raw.into()),
        };
        outcome
    })
}

/// Capability to report a settlement back to the coordinator that issued it.
///
/// Holds only a weak reference: once every coordinator clone is gone,
/// reports are dropped.
#[derive(Clone)]
pub(super) struct Reporter {
    shared: Weak<Shared>,
}

impl Reporter {
    pub(super) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }

    pub(super) fn report(&self, id: &str, ticket: u64, outcome: Settled) {
        match self.shared.upgrade() {
            Some(shared) => Coordinator::from_shared(shared).settle(id, ticket, outcome),
            None => debug!(%id, ticket, "Reporter::report: coordinator dropped, ignoring"),
        }
    }
}

/// One registered operation.
///
/// The handle starts inert. `begin_await` spawns the task that awaits the
/// source; it runs at most once per handle.
pub struct OperationHandle {
    id: String,
    ticket: u64,
    source: Option<Source>,
    task: Option<AbortHandle>,
}

impl OperationHandle {
    pub(super) fn new(id: String, ticket: u64, source: Source) -> Self {
        Self {
            id,
            ticket,
            source: Some(source),
            task: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registration ticket; a later registration of the same id gets a larger one.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Whether the source is being awaited.
    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }

    /// Spawn the task awaiting the source.
    ///
    /// Returns false if the handle was already started.
    pub(super) fn begin_await(
        &mut self,
        runtime: &Handle,
        coercer: Arc<dyn Coerce>,
        reporter: Reporter,
    ) -> bool {
        let Some(source) = self.source.take() else {
            return false;
        };

        let id = self.id.clone();
        let ticket = self.ticket;
        debug!(%id, ticket, "OperationHandle::begin_await: spawning");

        let task = runtime.spawn(async move {
            let outcome = match source.await {
                Ok(raw) => Settled::Resolved(coercer.coerce(raw).await),
                Err(raw) => Settled::Rejected(coercer.coerce(raw).await),
            };
            reporter.report(&id, ticket, outcome);
        });
        self.task = Some(task.abort_handle());
        true
    }

    /// Abort the awaiting task, if any. Used when the id is re-registered.
    pub(super) fn cancel(self) {
        if let Some(task) = self.task {
            debug!(id = %self.id, ticket = self.ticket, "OperationHandle::cancel: aborting");
            task.abort();
        }
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.id)
            .field("ticket", &self.ticket)
            .field("started", &self.is_started())
            .finish()
    }
}
