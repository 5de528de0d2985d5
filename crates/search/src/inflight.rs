use std::collections::BTreeMap;

use foundation::ids::Epoch;
use tokio_util::sync::CancellationToken;

/// Abort signals for requests that have been dispatched but not yet resolved.
///
/// Cancelling here is best effort: a transport may already be committed to
/// delivering a response. Stale responses must still be rejected by epoch.
#[derive(Debug, Default)]
pub struct InFlight {
    pending: BTreeMap<Epoch, CancellationToken>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, epoch: Epoch) -> bool {
        self.pending.contains_key(&epoch)
    }

    /// Track a new request and hand back the token its task should watch.
    pub fn register(&mut self, epoch: Epoch) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.pending.insert(epoch, token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Send the abort signal for `epoch`.
    ///
    /// Returns `true` if the request was still tracked.
    pub fn cancel(&mut self, epoch: Epoch) -> bool {
        match self.pending.remove(&epoch) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        let n = self.pending.len();
        for (_, token) in std::mem::take(&mut self.pending) {
            token.cancel();
        }
        n
    }

    /// Forget a request that reached a terminal outcome.
    pub fn complete(&mut self, epoch: Epoch) -> bool {
        self.pending.remove(&epoch).is_some()
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
