use std::sync::Arc;

use search::protocol::{PropertyId, PropertyRecord, QueryResult};

/// What the last terminal attempt produced.
///
/// Exactly one of these holds at a time, so a result and an error can never
/// be observed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Outcome {
    #[default]
    NoQuery,
    Result(Arc<QueryResult>),
    Error(String),
}

/// Externally observable `{count, properties, loading, error}` snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSnapshot {
    pub outcome: Outcome,
    pub loading: bool,
}

impl ResultSnapshot {
    pub fn count(&self) -> Option<u64> {
        match &self.outcome {
            Outcome::Result(r) => Some(r.count),
            _ => None,
        }
    }

    pub fn properties(&self) -> &[PropertyRecord] {
        match &self.outcome {
            Outcome::Result(r) => &r.properties,
            _ => &[],
        }
    }

    pub fn property_ids(&self) -> Vec<PropertyId> {
        self.properties().iter().filter_map(|p| p.id.clone()).collect()
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResultPublisher {
    snapshot: ResultSnapshot,
}

impl ResultPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &ResultSnapshot {
        &self.snapshot
    }

    /// Count and records land together; any previous error is cleared.
    pub fn publish_result(&mut self, result: QueryResult) {
        self.snapshot.outcome = Outcome::Result(Arc::new(result));
    }

    /// Replaces any previous result.
    pub fn publish_error(&mut self, message: impl Into<String>) {
        self.snapshot.outcome = Outcome::Error(message.into());
    }

    pub fn clear(&mut self) {
        self.snapshot.outcome = Outcome::NoQuery;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.snapshot.loading = loading;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search::protocol::PropertyRecord;

    fn result(count: u64, ids: &[i64]) -> QueryResult {
        QueryResult {
            count,
            properties: ids
                .iter()
                .map(|id| PropertyRecord::new(PropertyId::Num(*id)))
                .collect(),
        }
    }

    #[test]
    fn starts_with_no_query() {
        let p = ResultPublisher::new();
        assert_eq!(p.snapshot().outcome, Outcome::NoQuery);
        assert_eq!(p.snapshot().count(), None);
        assert!(p.snapshot().properties().is_empty());
        assert_eq!(p.snapshot().error(), None);
        assert!(!p.snapshot().loading);
    }

    #[test]
    fn result_and_error_replace_each_other() {
        let mut p = ResultPublisher::new();
        p.publish_result(result(2, &[1, 2]));
        assert_eq!(p.snapshot().count(), Some(2));
        assert_eq!(
            p.snapshot().property_ids(),
            vec![PropertyId::Num(1), PropertyId::Num(2)]
        );

        p.publish_error("search failed with status 500: boom");
        assert_eq!(p.snapshot().count(), None);
        assert!(p.snapshot().properties().is_empty());
        assert_eq!(p.snapshot().error(), Some("search failed with status 500: boom"));

        p.publish_result(result(0, &[]));
        assert_eq!(p.snapshot().error(), None);
        assert_eq!(p.snapshot().count(), Some(0));
    }

    #[test]
    fn clear_resets_to_no_query_keeping_loading() {
        let mut p = ResultPublisher::new();
        p.set_loading(true);
        p.publish_result(result(1, &[9]));
        p.clear();
        assert_eq!(p.snapshot().outcome, Outcome::NoQuery);
        assert!(p.snapshot().loading);
    }
}
