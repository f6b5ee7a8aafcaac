//! Wiring of the core services and the accessors views use.

use std::fmt;
use std::sync::Arc;

use patisserie_records::{CategoryRecord, RecordId};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::debug;

use crate::application::error::{AppError, MutationError, SessionError};
use crate::application::gateway::{Gateway, GatewayError};
use crate::application::mutation::{MutationCoordinator, MutationRecord, MutationStatus};
use crate::application::queries::NamedQuery;
use crate::application::session::{AccessDecision, AuthListener, SessionState, SessionStore};
use crate::cache::{CacheConfig, QueryCache, QueryState, Subscription};
use crate::config::{Settings, TableSettings};
use crate::domain::entities::{EntityKind, EntityPayload};
use crate::domain::error::DomainError;
use crate::domain::images::ImagePolicy;
use crate::domain::slug::generate_unique_slug;

/// Owns the single cache, coordinator and session store of a process.
#[derive(Clone)]
pub struct AdminContext {
    gateway: Arc<dyn Gateway>,
    cache: QueryCache,
    coordinator: Arc<MutationCoordinator>,
    session: Arc<SessionStore>,
    tables: TableSettings,
}

impl AdminContext {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        cache: CacheConfig,
        tables: TableSettings,
        bucket: impl Into<String>,
        images: ImagePolicy,
    ) -> Self {
        let cache = QueryCache::new(cache);
        let coordinator = Arc::new(MutationCoordinator::new(
            gateway.clone(),
            cache.clone(),
            tables.clone(),
            bucket,
            images,
        ));
        Self {
            gateway,
            cache,
            coordinator,
            session: SessionStore::new(),
            tables,
        }
    }

    pub fn from_settings(gateway: Arc<dyn Gateway>, settings: &Settings) -> Self {
        Self::new(
            gateway,
            CacheConfig::from(&settings.cache),
            settings.tables.clone(),
            settings.storage.bucket.clone(),
            ImagePolicy::from(&settings.images),
        )
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Subscribe to a named query.
    pub fn use_query(&self, query: NamedQuery) -> QueryHandle {
        let fetcher = query.fetcher(self.gateway.clone(), &self.tables);
        let subscription = self.cache.subscribe(query.key(), fetcher);
        QueryHandle {
            query,
            subscription,
        }
    }

    pub fn use_mutation(&self, entity: EntityKind) -> MutationHandle {
        let (last, _) = watch::channel(None);
        MutationHandle {
            entity,
            coordinator: self.coordinator.clone(),
            last,
        }
    }

    pub fn use_session(&self) -> SessionState {
        self.session.snapshot()
    }

    /// Start feeding gateway auth events into the session store.
    pub fn listen_auth(&self) -> Result<AuthListener, SessionError> {
        self.session.listen(self.gateway.as_ref())
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        match self.session.access() {
            AccessDecision::Granted => Ok(()),
            AccessDecision::Pending | AccessDecision::RedirectToLogin => Err(AppError::Forbidden),
        }
    }

    /// Fetch a named query through the cache and decode it.
    pub async fn load<T: DeserializeOwned>(&self, query: NamedQuery) -> Result<T, GatewayError> {
        let mut handle = self.use_query(query);
        handle.settled().await;
        handle.data()
    }

    /// Suggest a category slug for `name` that no cached category uses yet.
    pub async fn suggest_category_slug(
        &self,
        name: &str,
        editing: Option<&RecordId>,
    ) -> Result<String, AppError> {
        let categories: Vec<CategoryRecord> = self.load(NamedQuery::CategoriesList).await?;
        let taken: Vec<&str> = categories
            .iter()
            .filter(|category| Some(&category.id) != editing)
            .map(|category| category.slug.as_str())
            .collect();

        generate_unique_slug(name, |candidate| !taken.contains(&candidate))
            .map_err(|err| AppError::from(DomainError::validation(err.to_string())))
    }
}

impl fmt::Debug for AdminContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminContext")
            .field("cache", &self.cache)
            .field("session", &self.session)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

/// A view's subscription to one named query.
#[derive(Debug)]
pub struct QueryHandle {
    query: NamedQuery,
    subscription: Subscription,
}

impl QueryHandle {
    pub fn query(&self) -> &NamedQuery {
        &self.query
    }

    pub fn state(&self) -> QueryState {
        self.subscription.state()
    }

    /// Wait for the outstanding fetch, if any.
    pub async fn settled(&mut self) -> QueryState {
        self.subscription.settled().await.state()
    }

    /// Decode the current data, or return the stored error when there is none.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        let state = self.state();
        match state.decode::<T>() {
            Some(decoded) => decoded,
            None => Err(state.error.unwrap_or(GatewayError::NotFound)),
        }
    }
}

/// A view's handle for writes to one entity kind. Tracks the latest mutation.
pub struct MutationHandle {
    entity: EntityKind,
    coordinator: Arc<MutationCoordinator>,
    last: watch::Sender<Option<MutationRecord>>,
}

impl MutationHandle {
    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub async fn execute(
        &self,
        target: Option<RecordId>,
        payload: EntityPayload,
    ) -> Result<MutationRecord, MutationError> {
        let observer = |record: &MutationRecord| {
            self.last.send_replace(Some(record.clone()));
        };
        self.coordinator
            .execute_observed(self.entity, target, payload, &observer)
            .await
    }

    pub async fn delete(&self, id: RecordId) -> Result<MutationRecord, MutationError> {
        let observer = |record: &MutationRecord| {
            self.last.send_replace(Some(record.clone()));
        };
        debug!(entity = %self.entity, id = %id, "Delete requested");
        self.coordinator
            .delete_observed(self.entity, id, &observer)
            .await
    }

    pub fn status(&self) -> MutationStatus {
        self.last
            .borrow()
            .as_ref()
            .map(|record| record.status)
            .unwrap_or(MutationStatus::Idle)
    }

    pub fn error(&self) -> Option<MutationError> {
        self.last
            .borrow()
            .as_ref()
            .and_then(|record| record.error.clone())
    }

    pub fn last(&self) -> Option<MutationRecord> {
        self.last.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<MutationRecord>> {
        self.last.subscribe()
    }
}

impl fmt::Debug for MutationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationHandle")
            .field("entity", &self.entity)
            .field("status", &self.status())
            .finish()
    }
}
