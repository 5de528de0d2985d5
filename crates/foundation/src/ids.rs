/// Monotonic token tagging one dispatched request.
///
/// Epochs only ever grow within a counter, so "is this the latest?" is a plain
/// equality check against the counter's current value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct EpochCounter {
    latest: Option<Epoch>,
}

impl EpochCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh epoch and record it as the latest.
    pub fn advance(&mut self) -> Epoch {
        let next = match self.latest {
            Some(Epoch(n)) => Epoch(n + 1),
            None => Epoch(0),
        };
        self.latest = Some(next);
        next
    }

    pub fn latest(&self) -> Option<Epoch> {
        self.latest
    }

    pub fn is_latest(&self, epoch: Epoch) -> bool {
        self.latest == Some(epoch)
    }
}
