use foundation::ids::{Epoch, EpochCounter};

/// Scheduling state of one coordinator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SchedulerState {
    /// No timer armed, nothing authoritative in flight.
    #[default]
    Idle,
    /// Timer armed; nothing was dispatched during this burst.
    Debouncing,
    /// The latest epoch is outstanding.
    InFlight,
    /// Timer armed after the outstanding request was superseded. Behaves like
    /// `Debouncing`, but results are still considered loading.
    InFlightWithPendingChange,
}

/// Side effect the driver must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start the debounce timer, replacing any armed one.
    ArmTimer,
    DisarmTimer,
    /// Send the abort signal for a request. Best effort only.
    Abort(Epoch),
    /// Normalize the current filters against the viewport just read and send
    /// the request tagged with this epoch.
    Dispatch(Epoch),
    /// Reset the published result to "no query".
    ClearResult,
}

/// What to do with a response that reached the driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Latest epoch, terminal: publish its result or error.
    Publish,
    /// Latest epoch but cancelled: terminal, nothing to publish.
    Suppress,
    /// Superseded epoch: no state change at all.
    Discard,
}

/// Debounce / supersession state machine.
///
/// Pure and synchronous: it never touches timers or the network, it only
/// decides. Every trigger returns the effects to apply, which keeps the
/// transitions testable without a runtime.
#[derive(Debug, Default)]
pub struct QueryScheduler {
    state: SchedulerState,
    epochs: EpochCounter,
}

impl QueryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn latest_epoch(&self) -> Option<Epoch> {
        self.epochs.latest()
    }

    /// True from dispatch until the latest epoch reaches a terminal outcome,
    /// including while a superseded request is being replaced.
    pub fn is_loading(&self) -> bool {
        matches!(
            self.state,
            SchedulerState::InFlight | SchedulerState::InFlightWithPendingChange
        )
    }

    pub fn is_timer_armed(&self) -> bool {
        matches!(
            self.state,
            SchedulerState::Debouncing | SchedulerState::InFlightWithPendingChange
        )
    }

    /// A filter edit or viewport move happened. `active` is whether any
    /// filter differs from its default after the change.
    pub fn on_change(&mut self, active: bool) -> Vec<Effect> {
        if !active {
            return self.deactivate();
        }

        match self.state {
            SchedulerState::Idle => {
                self.state = SchedulerState::Debouncing;
                vec![Effect::ArmTimer]
            }
            SchedulerState::Debouncing | SchedulerState::InFlightWithPendingChange => {
                vec![Effect::ArmTimer]
            }
            SchedulerState::InFlight => {
                self.state = SchedulerState::InFlightWithPendingChange;
                let mut effects = Vec::with_capacity(2);
                if let Some(epoch) = self.epochs.latest() {
                    effects.push(Effect::Abort(epoch));
                }
                effects.push(Effect::ArmTimer);
                effects
            }
        }
    }

    /// The debounce timer elapsed. `viewport_ready` is whether a viewport
    /// could be read right now.
    pub fn on_timer_fired(&mut self, viewport_ready: bool) -> Vec<Effect> {
        if !self.is_timer_armed() {
            // A timer that was disarmed in the same tick.
            return Vec::new();
        }

        if !viewport_ready {
            self.state = SchedulerState::Idle;
            return Vec::new();
        }

        let epoch = self.epochs.advance();
        self.state = SchedulerState::InFlight;
        vec![Effect::Dispatch(epoch)]
    }

    /// A request tagged `epoch` resolved.
    pub fn on_response(&mut self, epoch: Epoch, cancelled: bool) -> Verdict {
        if self.state != SchedulerState::InFlight || !self.epochs.is_latest(epoch) {
            return Verdict::Discard;
        }

        self.state = SchedulerState::Idle;
        if cancelled {
            Verdict::Suppress
        } else {
            Verdict::Publish
        }
    }

    /// Coordinator teardown: drop pending work without touching the result.
    pub fn shutdown(&mut self) -> Vec<Effect> {
        let effects = self.cancel_pending();
        self.state = SchedulerState::Idle;
        effects
    }

    fn deactivate(&mut self) -> Vec<Effect> {
        let mut effects = self.cancel_pending();
        effects.push(Effect::ClearResult);
        self.state = SchedulerState::Idle;
        effects
    }

    fn cancel_pending(&self) -> Vec<Effect> {
        match self.state {
            SchedulerState::Idle => Vec::new(),
            SchedulerState::Debouncing | SchedulerState::InFlightWithPendingChange => {
                vec![Effect::DisarmTimer]
            }
            SchedulerState::InFlight => self
                .epochs
                .latest()
                .map(|epoch| vec![Effect::Abort(epoch)])
                .unwrap_or_default(),
        }
    }
}
