//! Contract for the hosted backend: rows, object storage and authentication.
//!
//! Implementations only shape requests and normalize errors. Everything with
//! ordering or consistency rules lives in the cache and the mutation pipeline.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use patisserie_records::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

use crate::cache::lock::mutex_lock;
use crate::domain::entities::PendingBlob;

const SOURCE: &str = "application::gateway";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("no matching rows")]
    NotFound,
    #[error("not authenticated")]
    Unauthorized,
    #[error("invalid backend response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }
}

/// Rows returned by a query, as opaque JSON objects.
pub type RowSet = Vec<Value>;

/// Row filter: column equality constraints plus an optional projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub select: Option<String>,
    pub eq: Vec<(String, String)>,
}

impl RowFilter {
    pub fn select(projection: impl Into<String>) -> Self {
        Self {
            select: Some(projection.into()),
            eq: Vec::new(),
        }
    }

    pub fn by_id(id: &RecordId) -> Self {
        Self::default().and_eq("id", id.as_str())
    }

    pub fn and_eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.eq.push((column.into(), value.into()));
        self
    }
}

/// Backend acknowledgement of a write, carrying the affected rows when returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ack {
    pub rows: RowSet,
}

/// Location of an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRef {
    pub bucket: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub user: Identity,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

pub type AuthCallback = Arc<dyn Fn(AuthEvent, Option<&Session>) + Send + Sync>;

/// Handle to an auth-event registration. Dropping it releases the listener.
pub struct AuthSubscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl AuthSubscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for AuthSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSubscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Listener registry shared by gateway implementations that emit auth events locally.
#[derive(Default)]
pub struct AuthListeners {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, AuthCallback>>,
}

impl AuthListeners {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `callback` and deliver `initial` to it before returning.
    pub fn register(
        self: &Arc<Self>,
        callback: AuthCallback,
        initial: Option<&Session>,
    ) -> AuthSubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        mutex_lock(&self.callbacks, SOURCE, "register").insert(id, callback.clone());
        debug!(listener_id = id, "Auth listener registered");

        callback(AuthEvent::InitialSession, initial);

        let registry: Weak<Self> = Arc::downgrade(self);
        AuthSubscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                mutex_lock(&registry.callbacks, SOURCE, "release").remove(&id);
                debug!(listener_id = id, "Auth listener released");
            }
        })
    }

    /// Invoke every registered callback. Callbacks run outside the registry lock.
    pub fn emit(&self, event: AuthEvent, session: Option<&Session>) {
        let callbacks: Vec<AuthCallback> = mutex_lock(&self.callbacks, SOURCE, "emit")
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback(event, session);
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.callbacks, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn query_rows(&self, table: &str, filter: &RowFilter) -> Result<RowSet, GatewayError>;

    /// Update the row identified by `id`, or insert when `id` is `None`.
    async fn upsert_row(
        &self,
        table: &str,
        id: Option<&RecordId>,
        record: Value,
    ) -> Result<Ack, GatewayError>;

    async fn delete_row(&self, table: &str, id: &RecordId) -> Result<Ack, GatewayError>;

    async fn upload_blob(
        &self,
        bucket: &str,
        path: &str,
        blob: &PendingBlob,
    ) -> Result<StoredRef, GatewayError>;

    fn resolve_public_url(&self, bucket: &str, path: &str) -> Url;

    async fn current_user(&self) -> Result<Option<Identity>, GatewayError>;

    /// Register for auth events. The callback first receives
    /// [`AuthEvent::InitialSession`] with the current session (or `None`).
    fn subscribe_auth_events(&self, callback: AuthCallback) -> AuthSubscription;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, GatewayError>;

    async fn sign_out(&self) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn listeners_receive_initial_event_and_release_on_drop() {
        let listeners = AuthListeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let subscription = listeners.register(
            Arc::new(move |event: AuthEvent, session: Option<&Session>| {
                sink.lock().expect("sink").push((event, session.is_some()));
            }),
            None,
        );
        assert_eq!(listeners.len(), 1);

        listeners.emit(AuthEvent::SignedOut, None);
        drop(subscription);
        listeners.emit(AuthEvent::SignedOut, None);

        assert!(listeners.is_empty());
        assert_eq!(
            *seen.lock().expect("seen"),
            vec![
                (AuthEvent::InitialSession, false),
                (AuthEvent::SignedOut, false)
            ]
        );
    }

    #[test]
    fn explicit_unsubscribe_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let subscription = AuthSubscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscription.unsubscribe();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn row_filter_builder_collects_constraints() {
        let filter = RowFilter::select("*").and_eq("slug", "tortas");
        assert_eq!(filter.select.as_deref(), Some("*"));
        assert_eq!(filter.eq, vec![("slug".to_string(), "tortas".to_string())]);

        let by_id = RowFilter::by_id(&RecordId::new("4"));
        assert_eq!(by_id.eq, vec![("id".to_string(), "4".to_string())]);
    }
}
