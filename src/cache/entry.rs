//! Per-key cache entry state.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;

use super::keys::QueryKey;
use crate::application::gateway::GatewayError;

/// Error stored on a failed entry.
pub type QueryError = GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Idle => "idle",
            QueryStatus::Loading => "loading",
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
        }
    }
}

/// Snapshot of one cache entry.
///
/// `Success` always carries data and no error. `Error` carries the error and
/// keeps the last successful data, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub data: Option<Arc<Value>>,
    pub error: Option<QueryError>,
    pub last_fetched_at: Option<OffsetDateTime>,
    pub subscriber_count: usize,
    /// Data is retained but a refresh has been requested.
    pub is_stale: bool,
    /// A fetch for this key is outstanding.
    pub is_fetching: bool,
}

impl CacheEntry {
    pub(crate) fn idle(key: QueryKey) -> Self {
        Self {
            key,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            last_fetched_at: None,
            subscriber_count: 0,
            is_stale: false,
            is_fetching: false,
        }
    }

    pub(crate) fn commit_success(&mut self, data: Value) {
        self.status = QueryStatus::Success;
        self.data = Some(Arc::new(data));
        self.error = None;
        self.last_fetched_at = Some(OffsetDateTime::now_utc());
        self.is_stale = false;
        self.is_fetching = false;
    }

    pub(crate) fn commit_error(&mut self, error: QueryError) {
        self.status = QueryStatus::Error;
        self.error = Some(error);
        self.is_fetching = false;
    }

    pub fn state(&self) -> QueryState {
        QueryState {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            is_stale: self.is_stale,
            is_fetching: self.is_fetching,
        }
    }
}

/// What a view reads for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub status: QueryStatus,
    pub data: Option<Arc<Value>>,
    pub error: Option<QueryError>,
    pub is_stale: bool,
    pub is_fetching: bool,
}

impl QueryState {
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_stale: false,
            is_fetching: false,
        }
    }

    /// Decode the cached payload into a typed value. `None` when nothing is cached yet.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<Result<T, QueryError>> {
        self.data.as_deref().map(|value| {
            T::deserialize(value).map_err(|err| GatewayError::Decode(err.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn error_keeps_previous_data() {
        let mut entry = CacheEntry::idle(QueryKey::new(["products"]));
        entry.commit_success(json!([1, 2]));
        entry.commit_error(GatewayError::Network("offline".into()));

        assert_eq!(entry.status, QueryStatus::Error);
        assert_eq!(entry.data.as_deref(), Some(&json!([1, 2])));
        assert!(entry.error.is_some());
    }

    #[test]
    fn success_clears_error_and_staleness() {
        let mut entry = CacheEntry::idle(QueryKey::new(["products"]));
        entry.commit_error(GatewayError::Timeout);
        entry.is_stale = true;
        entry.commit_success(json!([]));

        assert_eq!(entry.status, QueryStatus::Success);
        assert!(entry.error.is_none());
        assert!(!entry.is_stale);
        assert!(entry.last_fetched_at.is_some());
    }

    #[test]
    fn decode_reports_shape_mismatch() {
        let mut entry = CacheEntry::idle(QueryKey::new(["products"]));
        entry.commit_success(json!({"not": "a list"}));

        let decoded = entry.state().decode::<Vec<u32>>().expect("data present");
        assert!(matches!(decoded, Err(GatewayError::Decode(_))));
        assert!(QueryState::idle().decode::<Vec<u32>>().is_none());
    }
}
