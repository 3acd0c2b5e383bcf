use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Url};
use serde_json::Value;
use tracing::debug;

const REST_PREFIX: &str = "rest/v1/";
const RETURN_REPRESENTATION: &str = "return=representation";
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=representation";

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("invalid endpoint {0}")]
    InvalidUrl(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct PostgrestConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Session token; requests fall back to the api key when absent.
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl PostgrestConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            access_token: None,
            timeout: studysync_config::HTTP_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Column equality filter, sent as `column=eq.value`.
#[derive(Debug, Clone, Copy)]
pub struct Filter<'a> {
    column: &'a str,
    value: &'a str,
}

impl<'a> Filter<'a> {
    pub fn eq(column: &'a str, value: &'a str) -> Self {
        Self { column, value }
    }
}

/// Thin JSON client for a PostgREST-style table API.
#[derive(Clone)]
pub struct PostgrestClient {
    client: Client,
    base: Url,
    api_key: String,
    token: Option<String>,
}

impl PostgrestClient {
    pub fn new(config: PostgrestConfig) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Self::with_client(client, config)
    }

    pub fn with_client(client: Client, config: PostgrestConfig) -> Result<Self, HttpError> {
        let mut base = Url::parse(&config.endpoint)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {e}", config.endpoint)))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let base = base
            .join(REST_PREFIX)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {e}", config.endpoint)))?;
        Ok(Self {
            client,
            base,
            api_key: config.api_key,
            token: config.access_token,
        })
    }

    pub fn has_session(&self) -> bool {
        self.token.is_some()
    }

    fn request(
        &self,
        method: Method,
        table: &str,
        filters: &[Filter<'_>],
    ) -> Result<RequestBuilder, HttpError> {
        let url = self
            .base
            .join(table)
            .map_err(|e| HttpError::InvalidUrl(format!("table {table}: {e}")))?;
        let query: Vec<(&str, String)> = filters
            .iter()
            .map(|f| (f.column, format!("eq.{}", f.value)))
            .collect();
        debug!(%method, %url, ?query, "postgrest request");
        let bearer = self.token.as_deref().unwrap_or(&self.api_key);
        Ok(self
            .client
            .request(method, url)
            .query(&query)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer))
    }

    async fn rows(request: RequestBuilder) -> Result<Vec<Value>, HttpError> {
        let resp = request
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&body).map_err(|e| HttpError::Decode(e.to_string()))? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            single => Ok(vec![single]),
        }
    }

    pub async fn select(&self, table: &str, filters: &[Filter<'_>]) -> Result<Vec<Value>, HttpError> {
        let req = self
            .request(Method::GET, table, filters)?
            .query(&[("select", "*")]);
        Self::rows(req).await
    }

    pub async fn insert(&self, table: &str, rows: &[Value]) -> Result<Vec<Value>, HttpError> {
        let req = self
            .request(Method::POST, table, &[])?
            .header("Prefer", RETURN_REPRESENTATION)
            .json(rows);
        Self::rows(req).await
    }

    /// Insert or merge on the `on_conflict` column.
    pub async fn upsert(
        &self,
        table: &str,
        rows: &[Value],
        on_conflict: &str,
    ) -> Result<Vec<Value>, HttpError> {
        let req = self
            .request(Method::POST, table, &[])?
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", MERGE_DUPLICATES)
            .json(rows);
        Self::rows(req).await
    }

    pub async fn patch(
        &self,
        table: &str,
        filters: &[Filter<'_>],
        body: &Value,
    ) -> Result<Vec<Value>, HttpError> {
        let req = self
            .request(Method::PATCH, table, filters)?
            .header("Prefer", RETURN_REPRESENTATION)
            .json(body);
        Self::rows(req).await
    }

    pub async fn delete(&self, table: &str, filters: &[Filter<'_>]) -> Result<(), HttpError> {
        let req = self.request(Method::DELETE, table, filters)?;
        Self::rows(req).await.map(|_| ())
    }
}
