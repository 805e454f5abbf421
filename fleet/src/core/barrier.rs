//! Readiness barrier
//!
//! Tracks which launched workers have not yet announced readiness. Every
//! launch arms the barrier with its generation; only a signal carrying that
//! same generation releases it, so duplicates and signals from killed
//! incarnations are ignored.

use shared::VmId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
struct BarrierState {
    /// Workers launched but not yet ready, with the generation expected
    pending: HashMap<VmId, u64>,
    closed: bool,
}

/// Re-armable "wait until every launched worker is ready" barrier
pub struct ReadinessBarrier {
    state: watch::Sender<BarrierState>,
}

impl Default for ReadinessBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessBarrier {
    pub fn new() -> Self {
        let (state, _) = watch::channel(BarrierState::default());
        Self { state }
    }

    /// Expect a signal from `id` carrying `generation`
    ///
    /// Re-arming an id replaces the generation it waits for.
    pub fn arm(&self, id: VmId, generation: u64) {
        self.state.send_modify(|state| {
            state.pending.insert(id, generation);
        });
    }

    /// Stop waiting for `id`
    pub fn disarm(&self, id: VmId) {
        self.state.send_if_modified(|state| state.pending.remove(&id).is_some());
    }

    /// Record readiness; returns whether the signal released anything
    pub fn signal(&self, id: VmId, generation: u64) -> bool {
        self.state.send_if_modified(|state| {
            if state.closed || state.pending.get(&id) != Some(&generation) {
                return false;
            }
            state.pending.remove(&id);
            true
        })
    }

    /// Wait until nothing is pending; `false` on timeout or close
    pub async fn wait_all(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.pending.is_empty()).await
    }

    /// Wait until `id` is no longer pending; `false` on timeout or close
    pub async fn wait_for(&self, id: VmId, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| !state.pending.contains_key(&id)).await
    }

    async fn wait_until<F>(&self, timeout: Duration, ready: F) -> bool
    where
        F: Fn(&BarrierState) -> bool,
    {
        let mut rx = self.state.subscribe();
        let outcome = tokio::time::timeout(timeout, rx.wait_for(|state| state.closed || ready(state))).await;
        match outcome {
            Ok(Ok(state)) => !state.closed,
            _ => false,
        }
    }

    /// Release every waiter with `false` and refuse further signals
    pub fn close(&self) {
        self.state.send_modify(|state| {
            state.closed = true;
            state.pending.clear();
        });
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn is_pending(&self, id: VmId) -> bool {
        self.state.borrow().pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }
}
