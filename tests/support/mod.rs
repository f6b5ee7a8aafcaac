#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use patisserie::application::context::AdminContext;
use patisserie::application::gateway::{
    Ack, AuthCallback, AuthEvent, AuthListeners, AuthSubscription, Gateway, GatewayError,
    Identity, RowFilter, RowSet, Session, StoredRef,
};
use patisserie::cache::CacheConfig;
use patisserie::config::TableSettings;
use patisserie::domain::entities::PendingBlob;
use patisserie::domain::images::ImagePolicy;
use patisserie_records::RecordId;
use serde_json::{Value, json};
use tokio::sync::watch;
use url::Url;

pub const PASSWORD: &str = "secret";

/// In-memory backend with call counters and failure injection.
pub struct FakeGateway {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    next_id: AtomicUsize,
    pub queries: AtomicUsize,
    pub upserts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub uploads: AtomicUsize,
    uploaded_paths: Mutex<Vec<String>>,
    failing_uploads: Mutex<HashSet<String>>,
    query_error: Mutex<Option<GatewayError>>,
    writes_open: watch::Sender<bool>,
    session: Mutex<Option<Session>>,
    listeners: Arc<AuthListeners>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        let (writes_open, _) = watch::channel(true);
        Arc::new(Self {
            tables: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(100),
            queries: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            uploaded_paths: Mutex::new(Vec::new()),
            failing_uploads: Mutex::new(HashSet::new()),
            query_error: Mutex::new(None),
            writes_open,
            session: Mutex::new(None),
            listeners: AuthListeners::new(),
        })
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables
            .lock()
            .expect("tables")
            .insert(table.to_string(), rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .expect("tables")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_upload_of(&self, file_name: &str) {
        self.failing_uploads
            .lock()
            .expect("failing uploads")
            .insert(file_name.to_string());
    }

    pub fn fail_queries_with(&self, error: Option<GatewayError>) {
        *self.query_error.lock().expect("query error") = error;
    }

    /// Park row writes and deletes until [`FakeGateway::open_writes`].
    pub fn hold_writes(&self) {
        self.writes_open.send_replace(false);
    }

    pub fn open_writes(&self) {
        self.writes_open.send_replace(true);
    }

    pub fn uploaded_paths(&self) -> Vec<String> {
        self.uploaded_paths.lock().expect("paths").clone()
    }

    pub fn emit(&self, event: AuthEvent, session: Option<&Session>) {
        self.listeners.emit(event, session);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn wait_for_writes(&self) {
        let mut open = self.writes_open.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }
}

fn matches(row: &Value, column: &str, expected: &str) -> bool {
    match row.get(column) {
        Some(Value::String(text)) => text == expected,
        Some(Value::Number(number)) => number.to_string() == expected,
        Some(Value::Bool(flag)) => flag.to_string() == expected,
        _ => false,
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn query_rows(&self, table: &str, filter: &RowFilter) -> Result<RowSet, GatewayError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if let Some(error) = self.query_error.lock().expect("query error").clone() {
            return Err(error);
        }
        Ok(self
            .rows(table)
            .into_iter()
            .filter(|row| {
                filter
                    .eq
                    .iter()
                    .all(|(column, value)| matches(row, column, value))
            })
            .collect())
    }

    async fn upsert_row(
        &self,
        table: &str,
        id: Option<&RecordId>,
        record: Value,
    ) -> Result<Ack, GatewayError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.wait_for_writes().await;

        let mut tables = self.tables.lock().expect("tables");
        let rows = tables.entry(table.to_string()).or_default();
        let row = match id {
            Some(id) => {
                let existing = rows
                    .iter_mut()
                    .find(|row| matches(row, "id", id.as_str()))
                    .ok_or(GatewayError::NotFound)?;
                if let (Some(target), Value::Object(fields)) = (existing.as_object_mut(), record) {
                    target.extend(fields);
                }
                existing.clone()
            }
            None => {
                let mut row = record;
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                if let Some(fields) = row.as_object_mut() {
                    fields.insert("id".into(), json!(id));
                }
                rows.push(row.clone());
                row
            }
        };
        Ok(Ack { rows: vec![row] })
    }

    async fn delete_row(&self, table: &str, id: &RecordId) -> Result<Ack, GatewayError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.wait_for_writes().await;

        let mut tables = self.tables.lock().expect("tables");
        let rows = tables.entry(table.to_string()).or_default();
        let (removed, kept): (Vec<Value>, Vec<Value>) = rows
            .drain(..)
            .partition(|row| matches(row, "id", id.as_str()));
        *rows = kept;
        Ok(Ack { rows: removed })
    }

    async fn upload_blob(
        &self,
        bucket: &str,
        path: &str,
        blob: &PendingBlob,
    ) -> Result<StoredRef, GatewayError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self
            .failing_uploads
            .lock()
            .expect("failing uploads")
            .contains(&blob.file_name)
        {
            return Err(GatewayError::Network("connection reset by peer".into()));
        }
        self.uploaded_paths
            .lock()
            .expect("paths")
            .push(path.to_string());
        Ok(StoredRef {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    fn resolve_public_url(&self, bucket: &str, path: &str) -> Url {
        Url::parse(&format!("https://cdn.test/{bucket}/{path}")).expect("public url")
    }

    async fn current_user(&self) -> Result<Option<Identity>, GatewayError> {
        Ok(self
            .session
            .lock()
            .expect("session")
            .as_ref()
            .map(|session| session.user.clone()))
    }

    fn subscribe_auth_events(&self, callback: AuthCallback) -> AuthSubscription {
        let session = self.session.lock().expect("session").clone();
        self.listeners.register(callback, session.as_ref())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, GatewayError> {
        if password != PASSWORD {
            return Err(GatewayError::rejected(400, "Invalid login credentials"));
        }
        let session = session_for(email);
        *self.session.lock().expect("session") = Some(session.clone());
        self.listeners.emit(AuthEvent::SignedIn, Some(&session));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        *self.session.lock().expect("session") = None;
        self.listeners.emit(AuthEvent::SignedOut, None);
        Ok(())
    }
}

pub fn session_for(email: &str) -> Session {
    Session {
        user: Identity {
            id: "admin-1".into(),
            email: Some(email.to_string()),
        },
        access_token: "token".into(),
        refresh_token: None,
        expires_at: None,
    }
}

pub fn context(gateway: Arc<FakeGateway>) -> AdminContext {
    context_with(gateway, ImagePolicy::default())
}

pub fn context_with(gateway: Arc<FakeGateway>, images: ImagePolicy) -> AdminContext {
    AdminContext::new(
        gateway,
        CacheConfig::default(),
        TableSettings::default(),
        "product_images",
        images,
    )
}

/// Minimal PNG carrying only the IHDR dimensions.
pub fn png(file_name: &str, width: u32, height: u32) -> PendingBlob {
    let mut data = Vec::with_capacity(33);
    data.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    data.extend_from_slice(&13u32.to_be_bytes());
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[8, 6, 0, 0, 0, 0, 0, 0, 0]);
    PendingBlob::new(file_name, "image/png", Bytes::from(data))
}

pub fn product_row(id: u64, name: &str, category_id: u64) -> Value {
    json!({
        "id": id,
        "nombre": name,
        "descripcion_corta": format!("{name} casera"),
        "descripcion_larga": null,
        "precio": 12990.0,
        "categoria_id": category_id,
        "imagen_url": [format!("https://cdn.test/product_images/seed/{id}.webp")],
        "ingredientes": ["harina", "mantequilla"],
        "porciones": [{ "size": "20 cm", "servings": 10 }],
        "es_destacado": false,
        "categorias": { "nombre": "Tortas" }
    })
}

pub fn category_row(id: u64, name: &str, slug: &str) -> Value {
    json!({ "id": id, "nombre": name, "slug": slug })
}
