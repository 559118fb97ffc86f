// ABOUTME: Coordinator module - tracks a keyed bundle of async operations.
// ABOUTME: Contains the state maps, dispatch policy, handles and the coordinator itself.

mod continuation;
mod coordinator;
mod handle;
mod policy;
mod state;

pub use continuation::{Callback, Continuation, Invocation, Outcome};
pub use coordinator::{Coordinator, CoordinatorBuilder, Snapshot, WeakCoordinator};
pub use handle::{OperationHandle, Source, source};
pub use policy::{Dispatch, Strictness, decide};
pub use state::{OperationSet, OperationState, Results, Settled};
