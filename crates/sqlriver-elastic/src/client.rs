//! HTTP client for a single Elasticsearch cluster

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder};
use sqlriver_core::{Batch, BackendError, IndexBackend, IndexCreation};

use crate::bulk::{classify_create_response, excerpt, parse_bulk_response, render_bulk};

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ElasticSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Send `_type` in bulk action lines (clusters before 7.x)
    pub legacy_types: bool,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl Default for ElasticSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            legacy_types: false,
            timeout: Duration::from_secs(60),
        }
    }
}

fn from_reqwest(e: &reqwest::Error) -> BackendError {
    BackendError::Http {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

pub struct ElasticClient {
    http: reqwest::Client,
    base: String,
    username: Option<String>,
    password: Option<String>,
    legacy_types: bool,
}

impl std::fmt::Debug for ElasticClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticClient")
            .field("base", &self.base)
            .field("username", &self.username)
            .field("legacy_types", &self.legacy_types)
            .finish_non_exhaustive()
    }
}

impl ElasticClient {
    pub fn new(settings: &ElasticSettings) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(settings.timeout)
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| from_reqwest(&e))?;
        Ok(Self {
            http,
            base: settings.url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            legacy_types: settings.legacy_types,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}/{path}", self.base));
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<(u16, String), BackendError> {
        let response = builder.send().await.map_err(|e| from_reqwest(&e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| from_reqwest(&e))?;
        Ok((status, body))
    }
}

impl IndexBackend for ElasticClient {
    async fn create_index(&self, name: &str) -> Result<IndexCreation, BackendError> {
        let (status, body) = self.send(self.request(Method::PUT, name)).await?;
        log::debug!("PUT /{name} -> {status}");
        classify_create_response(name, status, &body)
    }

    async fn submit_batch(&self, batch: &Batch) -> Result<(), BackendError> {
        if batch.is_empty() {
            return Ok(());
        }
        let body = render_bulk(batch, self.legacy_types)?;
        let request = self
            .request(Method::POST, "_bulk")
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let (status, text) = self.send(request).await?;
        if !(200..300).contains(&status) {
            return Err(BackendError::Http {
                status: Some(status),
                message: excerpt(&text),
            });
        }
        parse_bulk_response(&text)
    }
}
