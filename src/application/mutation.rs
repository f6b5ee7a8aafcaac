//! Upload-then-write mutation pipeline.
//!
//! A mutation runs as a linear state machine:
//! `Validating → Uploading → Writing → Invalidating → Done`, or `Failed` from
//! any step. All uploads finish before the row write starts, the row write
//! only happens when every upload succeeded, and the cache is invalidated only
//! after a committed write.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::join_all;
use metrics::{counter, histogram};
use patisserie_records::RecordId;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::error::MutationError;
use crate::application::gateway::{Gateway, StoredRef};
use crate::cache::lock::mutex_lock;
use crate::cache::{QueryCache, QueryKey};
use crate::config::TableSettings;
use crate::domain::entities::{EntityKind, EntityPayload, PendingBlob};
use crate::domain::error::DomainError;
use crate::domain::images::{ImageIssue, ImagePolicy};

const SOURCE: &str = "application::mutation";

const METRIC_MUTATION_TOTAL: &str = "patisserie_mutation_total";
const METRIC_MUTATION_MS: &str = "patisserie_mutation_ms";
const METRIC_UPLOAD_TOTAL: &str = "patisserie_upload_total";

/// Upload owner segment used when no user is signed in.
const ANONYMOUS_OWNER: &str = "anon";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPhase {
    Validating,
    Uploading,
    Writing,
    Invalidating,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperation {
    Create,
    Update,
    Delete,
}

impl MutationOperation {
    fn for_target(target: Option<&RecordId>) -> Self {
        if target.is_some() {
            MutationOperation::Update
        } else {
            MutationOperation::Create
        }
    }
}

/// Advisory issue raised for one blob. The blob was still uploaded unless the
/// policy drops warned blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadWarning {
    pub file_name: String,
    pub issue: ImageIssue,
    pub dropped: bool,
}

/// Lifecycle tracker for one write operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationRecord {
    pub id: Uuid,
    pub entity: EntityKind,
    pub target: Option<RecordId>,
    pub operation: MutationOperation,
    pub status: MutationStatus,
    pub phase: MutationPhase,
    /// Structured fields; after the upload step, the row exactly as written.
    pub payload: Value,
    pub affected_keys: BTreeSet<QueryKey>,
    pub warnings: Vec<UploadWarning>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<MutationError>,
    #[serde(serialize_with = "time::serde::rfc3339::serialize")]
    pub started_at: OffsetDateTime,
    #[serde(serialize_with = "time::serde::rfc3339::option::serialize")]
    pub finished_at: Option<OffsetDateTime>,
}

fn serialize_error<S: Serializer>(
    error: &Option<MutationError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.collect_str(error),
        None => serializer.serialize_none(),
    }
}

impl MutationRecord {
    fn start(
        entity: EntityKind,
        target: Option<RecordId>,
        operation: MutationOperation,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity,
            target,
            operation,
            status: MutationStatus::Pending,
            phase: MutationPhase::Validating,
            payload,
            affected_keys: BTreeSet::new(),
            warnings: Vec::new(),
            error: None,
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
        }
    }

    fn succeed(&mut self) {
        self.status = MutationStatus::Success;
        self.phase = MutationPhase::Done;
        self.finished_at = Some(OffsetDateTime::now_utc());
    }

    fn fail(&mut self, error: MutationError) {
        self.status = MutationStatus::Error;
        self.phase = MutationPhase::Failed;
        self.error = Some(error);
        self.finished_at = Some(OffsetDateTime::now_utc());
    }
}

type PendingTarget = (EntityKind, Option<RecordId>);

/// Marks a target as pending for as long as it lives.
struct PendingClaim<'a> {
    pending: &'a Mutex<HashSet<PendingTarget>>,
    target: PendingTarget,
}

impl Drop for PendingClaim<'_> {
    fn drop(&mut self) {
        mutex_lock(self.pending, SOURCE, "release_claim").remove(&self.target);
    }
}

/// Receives every state transition of a running mutation.
pub type MutationObserver<'a> = &'a (dyn Fn(&MutationRecord) + Send + Sync);

fn ignore_transitions(_: &MutationRecord) {}

pub struct MutationCoordinator {
    gateway: Arc<dyn Gateway>,
    cache: QueryCache,
    tables: TableSettings,
    bucket: String,
    images: ImagePolicy,
    pending: Mutex<HashSet<PendingTarget>>,
}

impl fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("tables", &self.tables)
            .field("bucket", &self.bucket)
            .field("images", &self.images)
            .finish_non_exhaustive()
    }
}

impl MutationCoordinator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        cache: QueryCache,
        tables: TableSettings,
        bucket: impl Into<String>,
        images: ImagePolicy,
    ) -> Self {
        Self {
            gateway,
            cache,
            tables,
            bucket: bucket.into(),
            images,
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn is_pending(&self, entity: EntityKind, target: Option<&RecordId>) -> bool {
        mutex_lock(&self.pending, SOURCE, "is_pending").contains(&(entity, target.cloned()))
    }

    /// Create (`target` is `None`) or update an entity.
    pub async fn execute(
        &self,
        entity: EntityKind,
        target: Option<RecordId>,
        payload: EntityPayload,
    ) -> Result<MutationRecord, MutationError> {
        self.execute_observed(entity, target, payload, &ignore_transitions)
            .await
    }

    /// Like [`MutationCoordinator::execute`], reporting each transition to `observer`.
    pub async fn execute_observed(
        &self,
        entity: EntityKind,
        target: Option<RecordId>,
        payload: EntityPayload,
        observer: MutationObserver<'_>,
    ) -> Result<MutationRecord, MutationError> {
        let _claim = self.claim(entity, target.clone())?;
        let started = Instant::now();

        let operation = MutationOperation::for_target(target.as_ref());
        let mut record = MutationRecord::start(
            entity,
            target,
            operation,
            Value::Object(payload.fields.clone()),
        );
        debug!(mutation_id = %record.id, entity = %entity, operation = ?operation, "Mutation started");
        observer(&record);

        let outcome = self.run_upsert(&mut record, payload, observer).await;
        self.finish(record, outcome, started, observer)
    }

    /// Delete an entity row. On success the list is invalidated and the detail entry removed.
    pub async fn delete(
        &self,
        entity: EntityKind,
        id: RecordId,
    ) -> Result<MutationRecord, MutationError> {
        self.delete_observed(entity, id, &ignore_transitions).await
    }

    pub async fn delete_observed(
        &self,
        entity: EntityKind,
        id: RecordId,
        observer: MutationObserver<'_>,
    ) -> Result<MutationRecord, MutationError> {
        let _claim = self.claim(entity, Some(id.clone()))?;
        let started = Instant::now();

        let mut record = MutationRecord::start(
            entity,
            Some(id.clone()),
            MutationOperation::Delete,
            json!({ "id": id }),
        );
        record.phase = MutationPhase::Writing;
        observer(&record);

        let table = self.tables.for_kind(entity);
        let outcome = match self.gateway.delete_row(table, &id).await {
            Ok(_) => {
                record.phase = MutationPhase::Invalidating;
                observer(&record);

                let list = QueryKey::list(entity);
                let detail = QueryKey::detail(entity, &id);
                self.cache.invalidate([&list]);
                self.cache.remove([&detail]);
                record.affected_keys = BTreeSet::from([list, detail]);
                Ok(())
            }
            Err(err) => Err(MutationError::from(err)),
        };

        self.finish(record, outcome, started, observer)
    }

    fn claim(
        &self,
        entity: EntityKind,
        target: Option<RecordId>,
    ) -> Result<PendingClaim<'_>, MutationError> {
        let key = (entity, target);
        let mut pending = mutex_lock(&self.pending, SOURCE, "claim");
        if !pending.insert(key.clone()) {
            counter!(METRIC_MUTATION_TOTAL, "entity" => entity.as_str(), "outcome" => "conflict")
                .increment(1);
            warn!(entity = %entity, target = ?key.1, "Rejected overlapping mutation");
            return Err(MutationError::Conflict {
                entity,
                target: key.1,
            });
        }
        Ok(PendingClaim {
            pending: &self.pending,
            target: key,
        })
    }

    fn finish(
        &self,
        mut record: MutationRecord,
        outcome: Result<(), MutationError>,
        started: Instant,
        observer: MutationObserver<'_>,
    ) -> Result<MutationRecord, MutationError> {
        let entity = record.entity.as_str();
        histogram!(METRIC_MUTATION_MS, "entity" => entity)
            .record(started.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(()) => {
                record.succeed();
                counter!(METRIC_MUTATION_TOTAL, "entity" => entity, "outcome" => "success")
                    .increment(1);
                info!(
                    mutation_id = %record.id,
                    entity,
                    target = ?record.target,
                    operation = ?record.operation,
                    affected_keys = record.affected_keys.len(),
                    warnings = record.warnings.len(),
                    "Mutation committed"
                );
                observer(&record);
                Ok(record)
            }
            Err(err) => {
                counter!(METRIC_MUTATION_TOTAL, "entity" => entity, "outcome" => err.kind())
                    .increment(1);
                error!(
                    mutation_id = %record.id,
                    entity,
                    target = ?record.target,
                    phase = ?record.phase,
                    error = %err,
                    "Mutation failed"
                );
                record.fail(err.clone());
                observer(&record);
                Err(err)
            }
        }
    }

    async fn run_upsert(
        &self,
        record: &mut MutationRecord,
        payload: EntityPayload,
        observer: MutationObserver<'_>,
    ) -> Result<(), MutationError> {
        let entity = record.entity;
        let column = entity.attachment_column();
        if column.is_none() && !payload.attachments.is_empty() {
            return Err(DomainError::invariant(format!("{entity} does not accept attachments")).into());
        }

        let (mut references, pending) = payload.partition_attachments();
        let accepted = self.screen_blobs(record, pending)?;

        record.phase = MutationPhase::Uploading;
        observer(record);
        let stored = self.upload_all(&accepted).await?;
        references.extend(
            stored
                .iter()
                .map(|stored| self.gateway.resolve_public_url(&stored.bucket, &stored.path).to_string()),
        );

        if entity.requires_images() && references.is_empty() {
            return Err(DomainError::invariant("at least one image required").into());
        }

        let mut fields = payload.fields;
        if let Some(column) = column {
            fields.insert(column.to_string(), json!(references));
        }
        let row = Value::Object(fields);
        record.payload = row.clone();

        record.phase = MutationPhase::Writing;
        observer(record);
        let table = self.tables.for_kind(entity);
        self.gateway
            .upsert_row(table, record.target.as_ref(), row)
            .await
            .map_err(MutationError::from)?;

        record.phase = MutationPhase::Invalidating;
        observer(record);
        let mut keys = BTreeSet::from([QueryKey::list(entity)]);
        if let Some(target) = record.target.as_ref() {
            keys.insert(QueryKey::detail(entity, target));
        }
        self.cache.invalidate(keys.iter());
        record.affected_keys = keys;

        Ok(())
    }

    /// Apply the image policy. Hard rejections fail the mutation before any upload.
    fn screen_blobs(
        &self,
        record: &mut MutationRecord,
        blobs: Vec<PendingBlob>,
    ) -> Result<Vec<PendingBlob>, MutationError> {
        let mut accepted = Vec::with_capacity(blobs.len());
        for blob in blobs {
            let inspection = self.images.inspect(&blob);
            if let Some(issue) = inspection.rejections.first() {
                return Err(MutationError::validation(format!(
                    "{}: {issue}",
                    blob.file_name
                )));
            }

            let dropped = self.images.drop_warned && !inspection.warnings.is_empty();
            for issue in inspection.warnings {
                warn!(
                    mutation_id = %record.id,
                    file_name = %blob.file_name,
                    issue = %issue,
                    dropped,
                    "Upload constraint warning"
                );
                record.warnings.push(UploadWarning {
                    file_name: blob.file_name.clone(),
                    issue,
                    dropped,
                });
            }
            if !dropped {
                accepted.push(blob);
            }
        }
        Ok(accepted)
    }

    /// Upload every blob concurrently and wait for all of them.
    async fn upload_all(&self, blobs: &[PendingBlob]) -> Result<Vec<StoredRef>, MutationError> {
        if blobs.is_empty() {
            return Ok(Vec::new());
        }

        let owner = match self.gateway.current_user().await {
            Ok(Some(user)) => user.id,
            Ok(None) => ANONYMOUS_OWNER.to_string(),
            Err(err) => {
                debug!(error = %err, "Could not resolve upload owner; using anonymous prefix");
                ANONYMOUS_OWNER.to_string()
            }
        };

        let uploads = blobs.iter().map(|blob| {
            let path = format!("{owner}/{}.{}", Uuid::new_v4(), blob.extension());
            async move { self.gateway.upload_blob(&self.bucket, &path, blob).await }
        });
        let results = join_all(uploads).await;

        let total = results.len();
        let mut stored = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (blob, result) in blobs.iter().zip(results) {
            match result {
                Ok(reference) => {
                    counter!(METRIC_UPLOAD_TOTAL, "outcome" => "success").increment(1);
                    stored.push(reference);
                }
                Err(err) => {
                    counter!(METRIC_UPLOAD_TOTAL, "outcome" => "error").increment(1);
                    warn!(file_name = %blob.file_name, error = %err, "Upload failed");
                    failures.push(format!("{}: {err}", blob.file_name));
                }
            }
        }

        if failures.is_empty() {
            Ok(stored)
        } else {
            Err(MutationError::Upload {
                failed: failures.len(),
                total,
                message: failures.join("; "),
            })
        }
    }
}
