//! REST backend client.
//!
//! Talks to a PostgREST-style table at `{url}/rest/v1/{table}` holding one
//! row per share with the columns `share_id`, `share_key`, `payload`,
//! `created_at` and `updated_at`.

use crate::backend::{RemoteBackend, ShareRecord};
use crate::config::BackendConfig;
use crate::credentials::ShareCredentials;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

const HEADER_API_KEY: &str = "apikey";
const HEADER_SHARE_KEY: &str = "X-Share-Key";
const HEADER_PREFER: &str = "Prefer";
const RETURN_REPRESENTATION: &str = "return=representation";

/// Row shape on the wire. The secret column is never selected.
#[derive(Debug, Deserialize)]
struct Row {
    share_id: Option<String>,
    #[serde(default)]
    payload: Value,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Row {
    fn into_record(self, credentials: &ShareCredentials) -> ShareRecord {
        ShareRecord {
            share_id: self
                .share_id
                .unwrap_or_else(|| credentials.share_id().to_string()),
            payload: self.payload,
            created_at: self.created_at,
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        }
    }
}

/// [`RemoteBackend`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct RestBackend {
    endpoint: Url,
    api_key: String,
    client: reqwest::Client,
}

impl RestBackend {
    /// Creates a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConfigured`] if the address or API key is
    /// missing or the address is not a valid URL.
    pub fn new(config: &BackendConfig, timeout: Duration) -> SyncResult<Self> {
        if !config.is_enabled() {
            return Err(SyncError::NotConfigured(
                "backend url and api key are required".into(),
            ));
        }

        let endpoint = resource_url(config)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::NotConfigured(e.to_string()))?;

        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            client,
        })
    }

    /// The table endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn filtered(&self, credentials: &ShareCredentials, extra: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in extra {
                query.append_pair(name, value);
            }
            query
                .append_pair("share_id", &format!("eq.{}", credentials.share_id()))
                .append_pair("share_key", &format!("eq.{}", credentials.secret()));
        }
        url
    }

    fn request(&self, method: Method, url: Url, credentials: &ShareCredentials) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(HEADER_API_KEY, &self.api_key)
            .bearer_auth(&self.api_key)
            .header(HEADER_SHARE_KEY, credentials.secret())
    }

    async fn rows(&self, request: RequestBuilder) -> SyncResult<Vec<Row>> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        Ok(response.json::<Vec<Row>>().await?)
    }
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn create(
        &self,
        credentials: &ShareCredentials,
        payload: &Value,
    ) -> SyncResult<ShareRecord> {
        let now = Utc::now();
        let body = json!({
            "share_id": credentials.share_id(),
            "share_key": credentials.secret(),
            "payload": payload,
            "created_at": now,
            "updated_at": now,
        });

        debug!(share_id = credentials.share_id(), "creating share row");
        let request = self
            .request(Method::POST, self.endpoint.clone(), credentials)
            .header(HEADER_PREFER, RETURN_REPRESENTATION)
            .json(&body);

        let record = self
            .rows(request)
            .await?
            .into_iter()
            .next()
            .map(|row| row.into_record(credentials))
            .unwrap_or_else(|| ShareRecord {
                share_id: credentials.share_id().to_string(),
                payload: payload.clone(),
                created_at: Some(now),
                updated_at: now,
            });
        Ok(record)
    }

    async fn fetch(&self, credentials: &ShareCredentials) -> SyncResult<Option<ShareRecord>> {
        let url = self.filtered(
            credentials,
            &[
                ("select", "share_id,payload,created_at,updated_at"),
                ("limit", "1"),
            ],
        );

        debug!(share_id = credentials.share_id(), "fetching share row");
        let request = self.request(Method::GET, url, credentials);
        Ok(self
            .rows(request)
            .await?
            .into_iter()
            .next()
            .map(|row| row.into_record(credentials)))
    }

    async fn update(
        &self,
        credentials: &ShareCredentials,
        payload: &Value,
    ) -> SyncResult<ShareRecord> {
        let url = self.filtered(credentials, &[]);
        let body = json!({
            "payload": payload,
            "updated_at": Utc::now(),
        });

        debug!(share_id = credentials.share_id(), "updating share row");
        let request = self
            .request(Method::PATCH, url, credentials)
            .header(HEADER_PREFER, RETURN_REPRESENTATION)
            .json(&body);

        self.rows(request)
            .await?
            .into_iter()
            .next()
            .map(|row| row.into_record(credentials))
            .ok_or(SyncError::NotFound)
    }
}

fn resource_url(config: &BackendConfig) -> SyncResult<Url> {
    let mut url = Url::parse(config.url.trim())
        .map_err(|e| SyncError::NotConfigured(format!("invalid backend url: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| SyncError::NotConfigured("backend url cannot be a base".into()))?
        .pop_if_empty()
        .extend(["rest", "v1", config.table.as_str()]);
    Ok(url)
}

/// Maps a non-success status to an error.
///
/// Server errors, timeouts and rate limiting are retryable; any other
/// client error is not.
fn status_error(status: StatusCode, body: &str) -> SyncError {
    let message = format!("backend responded {}: {}", status.as_u16(), body.trim());
    let retryable = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS;
    if retryable {
        SyncError::transport_retryable(message)
    } else {
        SyncError::transport_fatal(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RestBackend {
        RestBackend::new(
            &BackendConfig::new("https://demo.supabase.co", "anon"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn endpoint_layout() {
        assert_eq!(
            backend().endpoint().as_str(),
            "https://demo.supabase.co/rest/v1/a_medias_shares"
        );

        let trailing = RestBackend::new(
            &BackendConfig::new("https://demo.supabase.co/", "anon").with_table("shares"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            trailing.endpoint().as_str(),
            "https://demo.supabase.co/rest/v1/shares"
        );
    }

    #[test]
    fn filters_match_exact_pair() {
        let creds = ShareCredentials::new("abc", "xyz");
        let url = backend().filtered(&creds, &[("limit", "1")]);
        assert_eq!(
            url.query(),
            Some("limit=1&share_id=eq.abc&share_key=eq.xyz")
        );
    }

    #[test]
    fn unconfigured_backend_rejected() {
        let result = RestBackend::new(&BackendConfig::default(), Duration::from_secs(5));
        assert!(matches!(result, Err(SyncError::NotConfigured(_))));

        let result = RestBackend::new(
            &BackendConfig::new("not a url", "anon"),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(SyncError::NotConfigured(_))));
    }

    #[test]
    fn status_classification() {
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(status_error(StatusCode::REQUEST_TIMEOUT, "").is_retryable());
        assert!(!status_error(StatusCode::UNAUTHORIZED, "bad key").is_retryable());
        assert!(!status_error(StatusCode::BAD_REQUEST, "").is_retryable());
    }

    #[test]
    fn row_without_share_id_uses_credentials() {
        let row: Row = serde_json::from_str(
            r#"{"payload": {"a": 1}, "updated_at": "2024-03-01T10:00:00.123456+00:00"}"#,
        )
        .unwrap();
        let record = row.into_record(&ShareCredentials::new("abc", "xyz"));
        assert_eq!(record.share_id, "abc");
        assert_eq!(record.payload["a"], 1);
        assert_eq!(record.updated_at.to_rfc3339(), "2024-03-01T10:00:00.123456+00:00");
    }
}
