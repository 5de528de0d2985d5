use std::collections::BTreeMap;

pub const REQUESTS_DISPATCHED: &str = "requests.dispatched";
pub const REQUESTS_ABORTED: &str = "requests.aborted";
pub const RESPONSES_DISCARDED: &str = "responses.discarded";
pub const RESPONSES_PUBLISHED: &str = "responses.published";
pub const ERRORS_PUBLISHED: &str = "errors.published";
pub const DISPATCH_SKIPPED_NO_VIEWPORT: &str = "dispatch.skipped_no_viewport";
pub const REQUESTS_IN_FLIGHT: &str = "requests.in_flight";

/// Coordinator counters and gauges.
///
/// Sorted maps keep snapshots in a stable order for logs and assertions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    counters: BTreeMap<&'static str, u64>,
    gauges: BTreeMap<&'static str, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub counters: Vec<(&'static str, u64)>,
    pub gauges: Vec<(&'static str, i64)>,
}

impl MetricsSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, name: &'static str) {
        *self.counters.entry(name).or_insert(0) += 1;
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).copied()
    }

    pub fn set_gauge(&mut self, name: &'static str, value: i64) {
        self.gauges.insert(name, value);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.iter().map(|(k, v)| (*k, *v)).collect(),
            gauges: self.gauges.iter().map(|(k, v)| (*k, *v)).collect(),
        }
    }
}
