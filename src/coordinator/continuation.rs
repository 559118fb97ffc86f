// ABOUTME: The continuation invoked when a bundle of operations completes.
// ABOUTME: Bundles the callback with its fixed extra arguments.

use std::sync::Arc;

use serde_json::Value;

use super::state::Results;

/// Which result set a dispatch carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Resolved,
    Rejected,
}

/// Arguments handed to a continuation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Which result set triggered the dispatch.
    pub outcome: Outcome,
    /// A copy of the aggregated results, unless data sending is disabled.
    pub results: Option<Results>,
    /// The fixed extra arguments given when the continuation was set.
    pub args: Vec<Value>,
}

impl Invocation {
    /// Positional parameters: the results object first (when sent), then the
    /// extra arguments.
    pub fn params(&self) -> Vec<Value> {
        let mut params = Vec::with_capacity(self.args.len() + 1);
        if let Some(results) = &self.results {
            params.push(Value::Object(
                results.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ));
        }
        params.extend(self.args.iter().cloned());
        params
    }
}

/// Callback signature for continuations.
pub type Callback = Arc<dyn Fn(Invocation) + Send + Sync>;

/// A completion handler plus the extra arguments it is always called with.
#[derive(Clone)]
pub struct Continuation {
    callback: Callback,
    args: Vec<Value>,
}

impl Continuation {
    /// Create a continuation with no extra arguments.
    pub fn new(callback: impl Fn(Invocation) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
            args: Vec::new(),
        }
    }

    /// Create a continuation bound to a receiver.
    ///
    /// The receiver is shared with the callback on every invocation. The
    /// continuation owns it, so a coordinator bound here through a clone is
    /// kept alive by its own continuation until `clear_continuation()`. Bind
    /// a [`WeakCoordinator`](super::WeakCoordinator) instead.
    pub fn bound<C>(context: Arc<C>, callback: impl Fn(&C, Invocation) + Send + Sync + 'static) -> Self
    where
        C: Send + Sync + 'static,
    {
        Self::new(move |invocation| callback(context.as_ref(), invocation))
    }

    /// Set the extra arguments passed after the results.
    pub fn with_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub(crate) fn invoke(&self, outcome: Outcome, results: Option<Results>) {
        (self.callback)(Invocation {
            outcome,
            results,
            args: self.args.clone(),
        });
    }
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}
