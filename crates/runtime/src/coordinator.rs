//! Filter query coordinator.
//!
//! One tokio task owns the filter store, the scheduler, the result publisher
//! and the in-flight registry. Every trigger (command from the UI, timer,
//! move-end, response) is handled to completion before the next one, so no
//! transition interleaves with another and no locks are needed. Results are
//! observed through a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use filters::error::InvalidFieldError;
use filters::normalize::normalize;
use filters::schema::FilterSchema;
use filters::store::{FilterState, FilterStore};
use filters::value::FilterValue;
use foundation::bounds::GeoBounds;
use foundation::ids::Epoch;
use search::client::{SearchBackend, SearchError};
use search::inflight::InFlight;
use search::protocol::{PropertyId, PropertyRecord, QueryResult};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics::{self, Metrics, MetricsSnapshot};
use crate::publisher::{ResultPublisher, ResultSnapshot};
use crate::scheduler::{Effect, QueryScheduler, SchedulerState, Verdict};
use crate::viewport::{MapHandle, MoveEnd, read_viewport};

/// Quiet period before a burst of changes is turned into a request.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

const COMMAND_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub debounce: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    InvalidField(#[from] InvalidFieldError),

    #[error("filter coordinator has shut down")]
    Closed,
}

/// Everything the UI layer reads from the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorView {
    pub filters: FilterState,
    pub has_active_filters: bool,
    pub active_filter_count: usize,
    pub result: ResultSnapshot,
    pub state: SchedulerState,
}

impl CoordinatorView {
    pub fn count(&self) -> Option<u64> {
        self.result.count()
    }

    pub fn properties(&self) -> &[PropertyRecord] {
        self.result.properties()
    }

    pub fn property_ids(&self) -> Vec<PropertyId> {
        self.result.property_ids()
    }

    pub fn loading(&self) -> bool {
        self.result.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.result.error()
    }
}

enum Command {
    SetFilter {
        name: String,
        value: FilterValue,
        reply: oneshot::Sender<Result<(), InvalidFieldError>>,
    },
    ToggleArrayFilter {
        name: String,
        id: String,
        reply: oneshot::Sender<Result<(), InvalidFieldError>>,
    },
    ClearFilters {
        reply: oneshot::Sender<()>,
    },
    AttachMap {
        map: Arc<dyn MapHandle>,
        reply: oneshot::Sender<()>,
    },
    DetachMap {
        reply: oneshot::Sender<()>,
    },
    Metrics {
        reply: oneshot::Sender<MetricsSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running coordinator.
///
/// The coordinator tears down when `shutdown` is called or every handle has
/// been dropped.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<CoordinatorView>,
}

impl CoordinatorHandle {
    pub async fn set_filter(
        &self,
        name: impl Into<String>,
        value: FilterValue,
    ) -> Result<(), CoordinatorError> {
        let name = name.into();
        let res = self
            .request(|reply| Command::SetFilter { name, value, reply })
            .await?;
        Ok(res?)
    }

    pub async fn toggle_array_filter(
        &self,
        name: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<(), CoordinatorError> {
        let (name, id) = (name.into(), id.into());
        let res = self
            .request(|reply| Command::ToggleArrayFilter { name, id, reply })
            .await?;
        Ok(res?)
    }

    pub async fn clear_filters(&self) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::ClearFilters { reply }).await
    }

    pub async fn attach_map(&self, map: Arc<dyn MapHandle>) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::AttachMap { map, reply }).await
    }

    pub async fn detach_map(&self) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::DetachMap { reply }).await
    }

    pub async fn metrics(&self) -> Result<MetricsSnapshot, CoordinatorError> {
        self.request(|reply| Command::Metrics { reply }).await
    }

    /// Tear the coordinator down. Calling this on a coordinator that is
    /// already gone is a no-op.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Err(CoordinatorError::Closed) => Ok(()),
            other => other,
        }
    }

    pub fn snapshot(&self) -> CoordinatorView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorView> {
        self.view.clone()
    }

    /// Wait until the published view satisfies `pred`.
    pub async fn wait_for(
        &self,
        mut pred: impl FnMut(&CoordinatorView) -> bool,
    ) -> Result<CoordinatorView, CoordinatorError> {
        let mut rx = self.view.clone();
        let view = rx
            .wait_for(|v| pred(v))
            .await
            .map_err(|_| CoordinatorError::Closed)?;
        Ok(view.clone())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| CoordinatorError::Closed)?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }
}

type Resolved = (Epoch, Result<QueryResult, SearchError>);

pub struct Coordinator {
    store: FilterStore,
    scheduler: QueryScheduler,
    publisher: ResultPublisher,
    inflight: InFlight,
    metrics: Metrics,
    backend: Arc<dyn SearchBackend>,
    config: CoordinatorConfig,
    map: Option<Arc<dyn MapHandle>>,
    move_end: Option<broadcast::Receiver<MoveEnd>>,
    deadline: Option<Instant>,
    outcomes_tx: mpsc::UnboundedSender<Resolved>,
    view_tx: watch::Sender<CoordinatorView>,
}

impl Coordinator {
    /// Start a coordinator on the current tokio runtime.
    pub fn spawn(
        schema: Arc<FilterSchema>,
        backend: Arc<dyn SearchBackend>,
        config: CoordinatorConfig,
    ) -> CoordinatorHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        let store = FilterStore::new(schema);
        let scheduler = QueryScheduler::new();
        let publisher = ResultPublisher::new();
        let (view_tx, view_rx) = watch::channel(build_view(&store, &scheduler, &publisher));

        let coordinator = Coordinator {
            store,
            scheduler,
            publisher,
            inflight: InFlight::new(),
            metrics: Metrics::new(),
            backend,
            config,
            map: None,
            move_end: None,
            deadline: None,
            outcomes_tx,
            view_tx,
        };
        tokio::spawn(coordinator.run(commands_rx, outcomes_rx));

        CoordinatorHandle {
            commands: commands_tx,
            view: view_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut outcomes: mpsc::UnboundedReceiver<Resolved>,
    ) {
        debug!(
            "filter coordinator started (debounce {:?})",
            self.config.debounce
        );

        loop {
            let deadline = self.deadline;
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd) {
                            return;
                        }
                    }
                    None => break,
                },
                Some((epoch, outcome)) = outcomes.recv() => self.handle_outcome(epoch, outcome),
                _ = sleep_until(deadline), if deadline.is_some() => self.handle_timer(),
                event = next_move_end(&mut self.move_end) => self.handle_move_end(event),
            }
            self.publish_view();
        }

        self.teardown();
    }

    /// Returns `false` once the coordinator has shut down.
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::SetFilter { name, value, reply } => {
                let res = self.store.set_field(&name, value).map(|changed| {
                    if changed {
                        self.filters_changed();
                    }
                });
                self.publish_view();
                let _ = reply.send(res);
            }
            Command::ToggleArrayFilter { name, id, reply } => {
                let res = self.store.toggle_set_member(&name, &id);
                if res.is_ok() {
                    self.filters_changed();
                }
                self.publish_view();
                let _ = reply.send(res);
            }
            Command::ClearFilters { reply } => {
                self.store.clear();
                self.filters_changed();
                self.publish_view();
                let _ = reply.send(());
            }
            Command::AttachMap { map, reply } => {
                self.move_end = Some(map.subscribe_move_end());
                self.map = Some(map);
                // The viewport just went from unknown to known.
                self.viewport_changed();
                self.publish_view();
                let _ = reply.send(());
            }
            Command::DetachMap { reply } => {
                self.move_end = None;
                self.map = None;
                let _ = reply.send(());
            }
            Command::Metrics { reply } => {
                let _ = reply.send(self.metrics.snapshot());
            }
            Command::Shutdown { reply } => {
                self.teardown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn filters_changed(&mut self) {
        let active = self.store.has_active_filters();
        let effects = self.scheduler.on_change(active);
        self.apply(effects, None);
    }

    /// Move-end and map attach: only schedule when filters are active.
    fn viewport_changed(&mut self) {
        if !self.store.has_active_filters() {
            return;
        }
        let effects = self.scheduler.on_change(true);
        self.apply(effects, None);
    }

    fn handle_move_end(&mut self, event: Result<MoveEnd, RecvError>) {
        match event {
            Ok(MoveEnd) | Err(RecvError::Lagged(_)) => self.viewport_changed(),
            Err(RecvError::Closed) => {
                debug!("map closed its move-end channel");
                self.move_end = None;
            }
        }
    }

    fn handle_timer(&mut self) {
        self.deadline = None;
        let viewport = read_viewport(self.map.as_deref());
        if viewport.is_none() {
            self.metrics.inc(metrics::DISPATCH_SKIPPED_NO_VIEWPORT);
        }
        let effects = self.scheduler.on_timer_fired(viewport.is_some());
        self.apply(effects, viewport);
    }

    fn handle_outcome(&mut self, epoch: Epoch, outcome: Result<QueryResult, SearchError>) {
        self.inflight.complete(epoch);
        self.metrics
            .set_gauge(metrics::REQUESTS_IN_FLIGHT, self.inflight.len() as i64);

        let cancelled = matches!(&outcome, Err(e) if e.is_cancelled());
        match self.scheduler.on_response(epoch, cancelled) {
            Verdict::Discard => {
                debug!("discarding response for superseded request {epoch}");
                self.metrics.inc(metrics::RESPONSES_DISCARDED);
            }
            Verdict::Suppress => {
                debug!("request {epoch} was cancelled");
            }
            Verdict::Publish => match outcome {
                Ok(result) => {
                    info!(
                        "request {epoch}: {} properties ({} returned)",
                        result.count,
                        result.properties.len()
                    );
                    self.metrics.inc(metrics::RESPONSES_PUBLISHED);
                    self.publisher.publish_result(result);
                }
                Err(e) => {
                    warn!("request {epoch} failed: {e}");
                    self.metrics.inc(metrics::ERRORS_PUBLISHED);
                    self.publisher.publish_error(e.to_string());
                }
            },
        }
    }

    fn apply(&mut self, effects: Vec<Effect>, viewport: Option<GeoBounds>) {
        for effect in effects {
            match effect {
                Effect::ArmTimer => {
                    self.deadline = Some(Instant::now() + self.config.debounce);
                }
                Effect::DisarmTimer => {
                    self.deadline = None;
                }
                Effect::Abort(epoch) => {
                    if self.inflight.cancel(epoch) {
                        debug!("aborted request {epoch}");
                        self.metrics.inc(metrics::REQUESTS_ABORTED);
                    }
                }
                Effect::Dispatch(epoch) => match viewport {
                    Some(viewport) => self.dispatch(epoch, viewport),
                    None => warn!("dispatch {epoch} requested without a viewport"),
                },
                Effect::ClearResult => self.publisher.clear(),
            }
        }
        self.metrics
            .set_gauge(metrics::REQUESTS_IN_FLIGHT, self.inflight.len() as i64);
    }

    fn dispatch(&mut self, epoch: Epoch, viewport: GeoBounds) {
        let payload = normalize(self.store.schema(), self.store.get(), viewport);
        debug!(
            "dispatching request {epoch} with {} filters",
            payload.filters.len()
        );

        let cancel = self.inflight.register(epoch);
        let backend = Arc::clone(&self.backend);
        let outcomes = self.outcomes_tx.clone();
        tokio::spawn(async move {
            let outcome = backend.search(payload, cancel).await;
            let _ = outcomes.send((epoch, outcome));
        });
        self.metrics.inc(metrics::REQUESTS_DISPATCHED);
    }

    fn teardown(&mut self) {
        let effects = self.scheduler.shutdown();
        self.apply(effects, None);
        self.deadline = None;
        let cancelled = self.inflight.cancel_all();
        self.move_end = None;
        self.map = None;
        self.publish_view();
        debug!("filter coordinator stopped ({cancelled} requests cancelled)");
    }

    fn publish_view(&mut self) {
        self.publisher.set_loading(self.scheduler.is_loading());
        let view = build_view(&self.store, &self.scheduler, &self.publisher);
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

fn build_view(
    store: &FilterStore,
    scheduler: &QueryScheduler,
    publisher: &ResultPublisher,
) -> CoordinatorView {
    CoordinatorView {
        filters: store.get().clone(),
        has_active_filters: store.has_active_filters(),
        active_filter_count: store.active_filter_count(),
        result: publisher.snapshot().clone(),
        state: scheduler.state(),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_move_end(
    rx: &mut Option<broadcast::Receiver<MoveEnd>>,
) -> Result<MoveEnd, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use filters::normalize::QueryPayload;
    use pretty_assertions::assert_eq;
    use filters::schema::property_schema;
    use filters::value::RangeValue;
    use search::client::BoxFuture;
    use search::protocol::PropertyRecord;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::viewport::StaticMap;

    /// One request seen by the scripted backend, resolved by the test.
    struct Call {
        payload: QueryPayload,
        cancel: CancellationToken,
        respond: oneshot::Sender<Result<QueryResult, SearchError>>,
    }

    impl Call {
        fn ok(self, ids: &[i64]) {
            let result = QueryResult {
                count: ids.len() as u64,
                properties: ids
                    .iter()
                    .map(|id| PropertyRecord::new(PropertyId::Num(*id)))
                    .collect(),
            };
            let _ = self.respond.send(Ok(result));
        }

        fn fail(self, err: SearchError) {
            let _ = self.respond.send(Err(err));
        }
    }

    /// Backend whose transport ignores abort signals, so stale responses can
    /// still arrive after supersession.
    struct ScriptedBackend {
        calls: mpsc::UnboundedSender<Call>,
    }

    impl SearchBackend for ScriptedBackend {
        fn search(
            &self,
            payload: QueryPayload,
            cancel: CancellationToken,
        ) -> BoxFuture<'_, Result<QueryResult, SearchError>> {
            let (respond, rx) = oneshot::channel();
            let _ = self.calls.send(Call {
                payload,
                cancel,
                respond,
            });
            Box::pin(async move { rx.await.unwrap_or(Err(SearchError::Cancelled)) })
        }
    }

    fn austin() -> GeoBounds {
        GeoBounds::new(-97.8, 30.2, -97.7, 30.3)
    }

    fn start() -> (CoordinatorHandle, mpsc::UnboundedReceiver<Call>) {
        let (calls, rx) = mpsc::unbounded_channel();
        let handle = Coordinator::spawn(
            Arc::new(property_schema()),
            Arc::new(ScriptedBackend { calls }),
            CoordinatorConfig::default(),
        );
        (handle, rx)
    }

    async fn start_with_map() -> (CoordinatorHandle, mpsc::UnboundedReceiver<Call>, Arc<StaticMap>) {
        let (handle, rx) = start();
        let map = Arc::new(StaticMap::with_bounds(austin()));
        handle.attach_map(map.clone()).await.unwrap();
        (handle, rx, map)
    }

    async fn next_call(rx: &mut mpsc::UnboundedReceiver<Call>) -> Call {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("a request should have been dispatched")
            .expect("backend dropped")
    }

    async fn settle(handle: &CoordinatorHandle) -> CoordinatorView {
        tokio::time::timeout(Duration::from_secs(5), handle.wait_for(|v| !v.loading()))
            .await
            .expect("coordinator should settle")
            .unwrap()
    }

    async fn assert_no_call(rx: &mut mpsc::UnboundedReceiver<Call>) {
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_dispatches_once_with_latest_state() {
        let (handle, mut calls, _map) = start_with_map().await;

        handle.toggle_array_filter("assetClass", "retail").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.toggle_array_filter("assetClass", "office").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle
            .set_filter("salePrice", FilterValue::Range(RangeValue::min("250000")))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(matches!(calls.try_recv(), Err(TryRecvError::Empty)));

        let call = next_call(&mut calls).await;
        assert_eq!(call.payload.filter("assetClass"), Some(&json!(["retail", "office"])));
        assert_eq!(call.payload.filter("salePrice"), Some(&json!({"min": 250000})));
        assert!(handle.snapshot().loading());

        call.ok(&[1, 2, 3]);
        let view = settle(&handle).await;
        assert_eq!(view.count(), Some(3));
        assert_eq!(view.property_ids().len(), 3);
        assert_eq!(view.state, SchedulerState::Idle);

        assert_no_call(&mut calls).await;
        let m = handle.metrics().await.unwrap();
        assert_eq!(m.counter(metrics::REQUESTS_DISPATCHED), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn asset_class_scenario_payload() {
        let (handle, mut calls, _map) = start_with_map().await;
        handle.toggle_array_filter("assetClass", "retail").await.unwrap();
        handle.toggle_array_filter("assetClass", "office").await.unwrap();

        let call = next_call(&mut calls).await;
        assert_eq!(
            serde_json::to_value(&call.payload).unwrap(),
            json!({
                "bbox": {"west": -97.8, "south": 30.2, "east": -97.7, "north": 30.3},
                "assetClass": ["retail", "office"],
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn change_during_flight_aborts_and_ignores_stale_response() {
        let (handle, mut calls, _map) = start_with_map().await;

        handle.toggle_array_filter("assetClass", "retail").await.unwrap();
        let first = next_call(&mut calls).await;

        handle.toggle_array_filter("assetClass", "land").await.unwrap();
        assert!(first.cancel.is_cancelled());
        assert_eq!(
            handle.snapshot().state,
            SchedulerState::InFlightWithPendingChange
        );
        assert!(handle.snapshot().loading());

        // Transport delivered the old response anyway.
        first.ok(&[100]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.snapshot().count(), None);

        let second = next_call(&mut calls).await;
        assert_eq!(second.payload.filter("assetClass"), Some(&json!(["retail", "land"])));
        second.ok(&[7, 8]);

        let view = settle(&handle).await;
        assert_eq!(view.count(), Some(2));
        assert_eq!(view.property_ids(), vec![PropertyId::Num(7), PropertyId::Num(8)]);

        let m = handle.metrics().await.unwrap();
        assert_eq!(m.counter(metrics::REQUESTS_ABORTED), 1);
        assert_eq!(m.counter(metrics::RESPONSES_DISCARDED), 1);
        assert_eq!(m.counter(metrics::RESPONSES_PUBLISHED), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_after_newer_result_is_discarded() {
        let (handle, mut calls, _map) = start_with_map().await;

        handle.set_filter("ownerName", FilterValue::text("Acme")).await.unwrap();
        let first = next_call(&mut calls).await;
        handle.set_filter("ownerName", FilterValue::text("Acme Holdings")).await.unwrap();
        let second = next_call(&mut calls).await;

        second.ok(&[2]);
        let view = settle(&handle).await;
        assert_eq!(view.property_ids(), vec![PropertyId::Num(2)]);

        first.ok(&[1, 1, 1]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.snapshot().count(), Some(1));
        assert_eq!(handle.snapshot().property_ids(), vec![PropertyId::Num(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_viewport_never_dispatches() {
        let (handle, mut calls) = start();

        handle.toggle_array_filter("assetClass", "office").await.unwrap();
        assert_no_call(&mut calls).await;

        let view = handle.snapshot();
        assert_eq!(view.state, SchedulerState::Idle);
        assert!(view.has_active_filters);
        assert!(!view.loading());
        let m = handle.metrics().await.unwrap();
        assert_eq!(m.counter(metrics::DISPATCH_SKIPPED_NO_VIEWPORT), 1);

        // An unloaded map behaves the same.
        let map = Arc::new(StaticMap::new());
        handle.attach_map(map.clone()).await.unwrap();
        assert_no_call(&mut calls).await;

        map.move_to(austin());
        let call = next_call(&mut calls).await;
        assert_eq!(call.payload.filter("assetClass"), Some(&json!(["office"])));
    }

    #[tokio::test(start_paused = true)]
    async fn move_end_without_filters_is_a_noop() {
        let (handle, mut calls, map) = start_with_map().await;
        map.move_to(GeoBounds::new(-98.0, 30.0, -97.0, 31.0));
        assert_no_call(&mut calls).await;
        assert_eq!(handle.snapshot().state, SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn move_end_with_filters_requeries_new_viewport() {
        let (handle, mut calls, map) = start_with_map().await;
        handle.set_filter("distressedOnly", FilterValue::Toggle(true)).await.unwrap();
        next_call(&mut calls).await.ok(&[1]);
        settle(&handle).await;

        let moved = GeoBounds::new(-98.0, 30.0, -97.0, 31.0);
        map.move_to(moved);
        let call = next_call(&mut calls).await;
        assert_eq!(call.payload.bbox.west, -98.0);
        assert_eq!(call.payload.bbox.north, 31.0);
        assert_eq!(call.payload.filter("distressedOnly"), Some(&json!(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn move_end_during_flight_supersedes_with_new_viewport() {
        let (handle, mut calls, map) = start_with_map().await;
        handle.toggle_array_filter("assetClass", "retail").await.unwrap();
        let first = next_call(&mut calls).await;
        assert_eq!(first.payload.bbox.west, -97.8);

        map.move_to(GeoBounds::new(-98.0, 30.0, -97.0, 31.0));
        let view = handle
            .wait_for(|v| v.state == SchedulerState::InFlightWithPendingChange)
            .await
            .unwrap();
        assert!(view.loading());
        assert!(first.cancel.is_cancelled());

        first.ok(&[1]);
        let second = next_call(&mut calls).await;
        assert_eq!(second.payload.bbox.west, -98.0);
        assert_eq!(second.payload.filter("assetClass"), Some(&json!(["retail"])));
        second.ok(&[2]);

        let view = settle(&handle).await;
        assert_eq!(view.property_ids(), vec![PropertyId::Num(2)]);
        let m = handle.metrics().await.unwrap();
        assert_eq!(m.counter(metrics::REQUESTS_ABORTED), 1);
        assert_eq!(m.counter(metrics::RESPONSES_DISCARDED), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn arms_length_default_true_scenario() {
        let (handle, mut calls, _map) = start_with_map().await;

        handle.set_filter("armsLengthOnly", FilterValue::Toggle(false)).await.unwrap();
        assert!(handle.snapshot().has_active_filters);
        assert_eq!(handle.snapshot().active_filter_count, 1);
        let call = next_call(&mut calls).await;
        assert_eq!(call.payload.filter("armsLengthOnly"), Some(&json!(false)));
        call.ok(&[5]);
        settle(&handle).await;

        handle.set_filter("armsLengthOnly", FilterValue::Toggle(true)).await.unwrap();
        let view = handle.snapshot();
        assert!(!view.has_active_filters);
        assert_eq!(view.count(), None);
        assert_no_call(&mut calls).await;
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_in_flight_and_is_idempotent() {
        let (handle, mut calls, _map) = start_with_map().await;
        handle.toggle_array_filter("assetClass", "retail").await.unwrap();
        let call = next_call(&mut calls).await;

        handle.clear_filters().await.unwrap();
        assert!(call.cancel.is_cancelled());
        let once = handle.snapshot();
        assert_eq!(once.state, SchedulerState::Idle);
        assert!(!once.loading());
        assert!(!once.has_active_filters);
        assert_eq!(once.count(), None);
        assert_eq!(once.error(), None);

        handle.clear_filters().await.unwrap();
        assert_eq!(handle.snapshot(), once);

        call.ok(&[1]);
        assert_no_call(&mut calls).await;
        assert_eq!(handle.snapshot(), once);

        let m = handle.metrics().await.unwrap();
        assert_eq!(m.counter(metrics::REQUESTS_ABORTED), 1);
        assert_eq!(m.counter(metrics::RESPONSES_DISCARDED), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_is_published_and_cleared_by_next_success() {
        let (handle, mut calls, _map) = start_with_map().await;
        handle.set_filter("zoning", FilterValue::choice("mixed")).await.unwrap();
        next_call(&mut calls).await.fail(SearchError::Server {
            status: 500,
            body: "boom".to_string(),
        });

        let view = settle(&handle).await;
        assert_eq!(view.error(), Some("search failed with status 500: boom"));
        assert_eq!(view.count(), None);

        handle.set_filter("zoning", FilterValue::choice("commercial")).await.unwrap();
        next_call(&mut calls).await.ok(&[3]);
        let view = handle
            .wait_for(|v| v.count().is_some())
            .await
            .unwrap();
        assert_eq!(view.error(), None);
        assert_eq!(view.count(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_of_latest_is_not_an_error() {
        let (handle, mut calls, _map) = start_with_map().await;
        handle.set_filter("ownerType", FilterValue::choice("reit")).await.unwrap();
        next_call(&mut calls).await.fail(SearchError::Cancelled);

        let view = settle(&handle).await;
        assert_eq!(view.error(), None);
        assert_eq!(view.count(), None);
        assert_eq!(view.state, SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_field_fails_without_scheduling() {
        let (handle, mut calls, _map) = start_with_map().await;
        let err = handle
            .set_filter("cap_rate", FilterValue::Toggle(true))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::InvalidField(InvalidFieldError::UnknownField("cap_rate".to_string()))
        );
        assert!(handle.toggle_array_filter("ownerName", "x").await.is_err());
        assert_no_call(&mut calls).await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_work_and_unsubscribes() {
        let (handle, mut calls, map) = start_with_map().await;
        assert_eq!(map.subscriber_count(), 1);

        handle.toggle_array_filter("assetClass", "retail").await.unwrap();
        let call = next_call(&mut calls).await;
        handle.shutdown().await.unwrap();

        assert!(call.cancel.is_cancelled());
        assert_eq!(map.subscriber_count(), 0);
        assert_eq!(
            handle.set_filter("ownerName", FilterValue::text("x")).await,
            Err(CoordinatorError::Closed)
        );
        assert_eq!(handle.shutdown().await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_debouncing_never_dispatches() {
        let (handle, mut calls, _map) = start_with_map().await;
        handle.toggle_array_filter("assetClass", "retail").await.unwrap();
        handle.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(
            calls.try_recv(),
            Err(TryRecvError::Empty | TryRecvError::Disconnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_tears_down() {
        let (handle, mut calls, map) = start_with_map().await;
        handle.toggle_array_filter("assetClass", "retail").await.unwrap();
        let call = next_call(&mut calls).await;

        drop(handle);
        tokio::time::timeout(Duration::from_secs(5), call.cancel.cancelled())
            .await
            .expect("in-flight request should be cancelled on teardown");
        assert_eq!(map.subscriber_count(), 0);
    }
}
