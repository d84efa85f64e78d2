//! Per-job cancellation tokens.
//!
//! Every claimed job registers a child of the process-level token here, so
//! an external stop reaches exactly one job while a process shutdown
//! reaches all of them. A stop that lands before the worker has registered
//! the job is remembered, and `register` hands back an already-cancelled
//! token — the pipeline then unwinds at its first suspension point instead
//! of running to completion.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use cartograph_protocol::JobId;

#[derive(Default)]
struct Registry {
    tokens: HashMap<JobId, CancellationToken>,
    /// Stops that arrived before the job registered.
    pending: HashSet<JobId>,
}

pub struct StopRegistry {
    parent: CancellationToken,
    inner: Mutex<Registry>,
}

impl StopRegistry {
    pub fn new(parent: CancellationToken) -> Self {
        Self {
            parent,
            inner: Mutex::new(Registry::default()),
        }
    }

    /// Register a job and get its cancellation token. If a stop already
    /// arrived for this id, the returned token is cancelled.
    pub fn register(&self, id: &JobId) -> CancellationToken {
        let token = self.parent.child_token();
        let mut inner = self.inner.lock().expect("stop registry");
        if inner.pending.remove(id) {
            token.cancel();
        }
        inner.tokens.insert(id.clone(), token.clone());
        token
    }

    /// Drop a finished job's token and any stale pending stop.
    pub fn deregister(&self, id: &JobId) {
        let mut inner = self.inner.lock().expect("stop registry");
        inner.tokens.remove(id);
        inner.pending.remove(id);
    }

    /// Cancel one job. Returns false when the job is not registered yet;
    /// the stop is remembered so a later `register` observes it.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut inner = self.inner.lock().expect("stop registry");
        match inner.tokens.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => {
                inner.pending.insert(id.clone());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_reaches_only_the_registered_job() {
        let registry = StopRegistry::new(CancellationToken::new());
        let a = JobId::new();
        let b = JobId::new();
        let token_a = registry.register(&a);
        let token_b = registry.register(&b);

        assert!(registry.cancel(&a));
        assert!(token_a.is_cancelled());
        assert!(!token_b.is_cancelled());
    }

    #[test]
    fn parent_cancellation_reaches_every_job() {
        let parent = CancellationToken::new();
        let registry = StopRegistry::new(parent.clone());
        let token = registry.register(&JobId::new());

        parent.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn stop_before_register_yields_a_cancelled_token() {
        let registry = StopRegistry::new(CancellationToken::new());
        let id = JobId::new();

        assert!(!registry.cancel(&id));
        let token = registry.register(&id);
        assert!(token.is_cancelled());
    }

    #[test]
    fn deregister_clears_tokens_and_pending_stops() {
        let registry = StopRegistry::new(CancellationToken::new());
        let id = JobId::new();
        registry.register(&id);
        registry.deregister(&id);

        // the stop is recorded as pending again, not delivered
        assert!(!registry.cancel(&id));

        registry.deregister(&id);
        let token = registry.register(&id);
        assert!(!token.is_cancelled());
    }
}
