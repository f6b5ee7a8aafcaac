//! [`Gateway`] over the hosted backend's HTTP APIs.
//!
//! Rows go through the PostgREST-style `rest/v1` endpoints, blobs through
//! `storage/v1`, and password sign-in through `auth/v1`. Auth events are
//! emitted locally to registered listeners when this client signs in or out.

use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use patisserie_records::RecordId;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use url::Url;

use crate::application::gateway::{
    Ack, AuthCallback, AuthEvent, AuthListeners, AuthSubscription, Gateway, GatewayError,
    Identity, RowFilter, RowSet, Session, StoredRef,
};
use crate::cache::lock::{rw_read, rw_write};
use crate::config::BackendSettings;
use crate::domain::entities::PendingBlob;
use crate::infra::error::InfraError;

const SOURCE: &str = "infra::rest";
const PREFER_REPRESENTATION: &str = "return=representation";

pub struct RestGateway {
    client: Client,
    base: Url,
    anon_key: String,
    session: RwLock<Option<Session>>,
    listeners: Arc<AuthListeners>,
}

impl fmt::Debug for RestGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestGateway")
            .field("base", &self.base.as_str())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl RestGateway {
    pub fn new(settings: &BackendSettings) -> Result<Self, InfraError> {
        let base = settings.url.clone().ok_or_else(|| {
            InfraError::configuration("backend.url is required (set PATISSERIE__BACKEND__URL)")
        })?;
        let anon_key = settings.anon_key.clone().ok_or_else(|| {
            InfraError::configuration(
                "backend.anon_key is required (set PATISSERIE__BACKEND__ANON_KEY)",
            )
        })?;
        if base.cannot_be_a_base() {
            return Err(InfraError::configuration(
                "backend.url must be a hierarchical URL",
            ));
        }

        let client = Client::builder()
            .user_agent(concat!("patisserie/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;

        Ok(Self {
            client,
            base,
            anon_key,
            session: RwLock::new(None),
            listeners: AuthListeners::new(),
        })
    }

    /// Build `{base}/{segments...}`. Segments are percent-encoded individually.
    fn endpoint<'a, I>(&self, segments: I) -> Url
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn rows_url(&self, table: &str, filter: &RowFilter) -> Url {
        let mut url = self.endpoint(["rest", "v1", table]);
        {
            let mut query = url.query_pairs_mut();
            if let Some(select) = filter.select.as_deref() {
                query.append_pair("select", select);
            }
            for (column, value) in &filter.eq {
                query.append_pair(column, &format!("eq.{value}"));
            }
        }
        url
    }

    fn access_token(&self) -> Option<String> {
        rw_read(&self.session, SOURCE, "access_token")
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let token = self
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await.unwrap_or_default();
        Err(rejection(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&bytes).map_err(|err| GatewayError::Decode(err.to_string()))
    }

    fn current_session(&self) -> Option<Session> {
        rw_read(&self.session, SOURCE, "current_session").clone()
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Network(err.to_string())
    }
}

/// Normalize an error response. The backend reports its message under one of
/// several keys depending on the service.
fn rejection(status: StatusCode, body: &[u8]) -> GatewayError {
    let message = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                text
            }
        });
    GatewayError::rejected(status.as_u16(), message)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: Identity,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            user: self.user,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_in
                .map(|seconds| OffsetDateTime::now_utc() + time::Duration::seconds(seconds)),
        }
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn query_rows(&self, table: &str, filter: &RowFilter) -> Result<RowSet, GatewayError> {
        let url = self.rows_url(table, filter);
        debug!(table, "Querying rows");
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn upsert_row(
        &self,
        table: &str,
        id: Option<&RecordId>,
        record: Value,
    ) -> Result<Ack, GatewayError> {
        let request = match id {
            Some(id) => {
                let url = self.rows_url(table, &RowFilter::by_id(id));
                self.request(Method::PATCH, url)
            }
            None => {
                let url = self.rows_url(table, &RowFilter::default());
                self.request(Method::POST, url)
            }
        };
        let rows: RowSet = self
            .send_json(request.header("Prefer", PREFER_REPRESENTATION).json(&record))
            .await?;
        debug!(table, id = ?id, rows = rows.len(), "Row written");
        Ok(Ack { rows })
    }

    async fn delete_row(&self, table: &str, id: &RecordId) -> Result<Ack, GatewayError> {
        let url = self.rows_url(table, &RowFilter::by_id(id));
        let rows: RowSet = self
            .send_json(
                self.request(Method::DELETE, url)
                    .header("Prefer", PREFER_REPRESENTATION),
            )
            .await?;
        debug!(table, id = %id, rows = rows.len(), "Row deleted");
        Ok(Ack { rows })
    }

    async fn upload_blob(
        &self,
        bucket: &str,
        path: &str,
        blob: &PendingBlob,
    ) -> Result<StoredRef, GatewayError> {
        let url = self.endpoint(
            ["storage", "v1", "object", bucket]
                .into_iter()
                .chain(path.split('/')),
        );
        let request = self
            .request(Method::POST, url)
            .header(reqwest::header::CONTENT_TYPE, blob.content_type.as_str())
            .header("x-upsert", "false")
            .body(blob.bytes.clone());
        self.send(request).await?;
        debug!(bucket, path, size_bytes = blob.size_bytes(), "Blob uploaded");
        Ok(StoredRef {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    fn resolve_public_url(&self, bucket: &str, path: &str) -> Url {
        self.endpoint(
            ["storage", "v1", "object", "public", bucket]
                .into_iter()
                .chain(path.split('/')),
        )
    }

    async fn current_user(&self) -> Result<Option<Identity>, GatewayError> {
        if self.access_token().is_none() {
            return Ok(None);
        }
        let url = self.endpoint(["auth", "v1", "user"]);
        match self.send_json(self.request(Method::GET, url)).await {
            Ok(identity) => Ok(Some(identity)),
            Err(GatewayError::Rejected { status: 401, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn subscribe_auth_events(&self, callback: AuthCallback) -> AuthSubscription {
        let session = self.current_session();
        self.listeners.register(callback, session.as_ref())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, GatewayError> {
        let mut url = self.endpoint(["auth", "v1", "token"]);
        url.query_pairs_mut().append_pair("grant_type", "password");

        let request = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }));
        let token: TokenResponse = self.send_json(request).await?;
        let session = token.into_session();

        *rw_write(&self.session, SOURCE, "sign_in") = Some(session.clone());
        info!(user_id = %session.user.id, "Signed in");
        self.listeners.emit(AuthEvent::SignedIn, Some(&session));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        let Some(session) = self.current_session() else {
            return Ok(());
        };

        let url = self.endpoint(["auth", "v1", "logout"]);
        let result = self
            .send(
                self.client
                    .post(url)
                    .header("apikey", &self.anon_key)
                    .bearer_auth(&session.access_token),
            )
            .await
            .map(|_| ());
        if let Err(err) = &result {
            warn!(error = %err, "Backend logout failed");
        }

        *rw_write(&self.session, SOURCE, "sign_out") = None;
        self.listeners.emit(AuthEvent::SignedOut, None);
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn gateway() -> RestGateway {
        RestGateway::new(&BackendSettings {
            url: Some(Url::parse("https://demo.backend.example").expect("url")),
            anon_key: Some("anon".into()),
            timeout: Duration::from_secs(5),
        })
        .expect("gateway")
    }

    #[test]
    fn missing_url_is_a_configuration_error() {
        let error = RestGateway::new(&BackendSettings {
            url: None,
            anon_key: Some("anon".into()),
            timeout: Duration::from_secs(5),
        })
        .expect_err("url required");
        assert!(matches!(error, InfraError::Configuration { .. }));
    }

    #[test]
    fn row_urls_carry_projection_and_filters() {
        let filter = RowFilter::select("*,categorias(nombre)").and_eq("id", "7");
        let url = gateway().rows_url("productos", &filter);
        assert_eq!(
            url.as_str(),
            "https://demo.backend.example/rest/v1/productos?select=*%2Ccategorias%28nombre%29&id=eq.7"
        );
    }

    #[test]
    fn public_url_keeps_path_segments() {
        let url = gateway().resolve_public_url("product_images", "user-1/abc.webp");
        assert_eq!(
            url.as_str(),
            "https://demo.backend.example/storage/v1/object/public/product_images/user-1/abc.webp"
        );
    }

    #[test]
    fn rejection_prefers_backend_message() {
        let error = rejection(
            StatusCode::BAD_REQUEST,
            br#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(
            error,
            GatewayError::rejected(400, "Invalid login credentials")
        );

        let plain = rejection(StatusCode::BAD_GATEWAY, b"");
        assert_eq!(plain, GatewayError::rejected(502, "Bad Gateway"));
    }

    #[test]
    fn subscribing_without_session_reports_none() {
        let gateway = gateway();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription =
            gateway.subscribe_auth_events(Arc::new(move |event: AuthEvent, session: Option<&Session>| {
                sink.lock().expect("sink").push((event, session.is_some()));
            }));
        assert_eq!(
            *seen.lock().expect("seen"),
            vec![(AuthEvent::InitialSession, false)]
        );
    }
}
