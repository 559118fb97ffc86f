// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use gather::prelude::*;` to get started quickly.

pub use crate::config::{BundleConfig, TextFallback};
pub use crate::coordinator::{
    Continuation, Coordinator, CoordinatorBuilder, Invocation, OperationState, Outcome, Results,
    Snapshot, Strictness, WeakCoordinator,
};
pub use crate::error::{ConfigError, DecodeError, GatherError, OperationError};
pub use crate::payload::{Coerce, Decodable, FnCoercer, JsonCoercer, Payload};
