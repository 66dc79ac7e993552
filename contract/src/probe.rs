//! HTTP probe: one JSON request against one target.
//!
//! The probe never interprets status codes; callers decide which statuses they expect.
//! Every request carries `Accept: application/json`, bodies are sent as JSON, and the
//! response body is read in full as text before being parsed.

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
pub use reqwest::Method;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::capture::{build_client_with_capture, CaptureMiddleware};

/// Upper bound on how much of a non-JSON body ends up in an error message.
pub const BODY_PREFIX_CHARS: usize = 200;

/// Status and parsed JSON body of one response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub json: Value,
}

impl HttpResponse {
    /// Field lookup on an object body; `None` for other shapes.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.json.get(key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },
    #[error("non-JSON response: {url} status={status} body={body}")]
    NonJson { url: String, status: u16, body: String },
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ProbeError::Transport { source, .. } => match source {
                reqwest_middleware::Error::Reqwest(e) => e.is_timeout(),
                reqwest_middleware::Error::Middleware(_) => false,
            },
            ProbeError::NonJson { .. } => false,
        }
    }
}

/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct Probe {
    http: ClientWithMiddleware,
}

impl Probe {
    /// Build a probe with an optional per-request timeout and optional capture.
    pub fn new(
        timeout: Option<Duration>,
        capture: Option<CaptureMiddleware>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: build_client_with_capture(builder, capture)?,
        })
    }

    pub async fn get_json(&self, url: &str) -> Result<HttpResponse, ProbeError> {
        self.send(Method::GET, url, None, None).await
    }

    pub async fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse, ProbeError> {
        self.send(Method::POST, url, Some(body), None).await
    }

    pub async fn get_json_bearer(&self, url: &str, token: &str) -> Result<HttpResponse, ProbeError> {
        self.send(Method::GET, url, None, Some(token)).await
    }

    pub async fn post_json_bearer(
        &self,
        url: &str,
        body: &Value,
        token: &str,
    ) -> Result<HttpResponse, ProbeError> {
        self.send(Method::POST, url, Some(body), Some(token)).await
    }

    pub async fn patch_json_bearer(
        &self,
        url: &str,
        body: &Value,
        token: &str,
    ) -> Result<HttpResponse, ProbeError> {
        self.send(Method::PATCH, url, Some(body), Some(token)).await
    }

    pub async fn put_json_bearer(
        &self,
        url: &str,
        body: &Value,
        token: &str,
    ) -> Result<HttpResponse, ProbeError> {
        self.send(Method::PUT, url, Some(body), Some(token)).await
    }

    /// DELETE; a `204 No Content` (or any empty body) yields `Value::Null`.
    pub async fn delete_json_bearer(&self, url: &str, token: &str) -> Result<HttpResponse, ProbeError> {
        self.send(Method::DELETE, url, None, Some(token)).await
    }

    /// Issue one request and parse the whole body as JSON.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, ProbeError> {
        debug!("[PROBE] {} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.to_string());
        }
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let transport = |source: reqwest_middleware::Error| ProbeError::Transport {
            method: method.clone(),
            url: url.to_string(),
            source,
        };

        let response = request.send().await.map_err(&transport)?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| transport(reqwest_middleware::Error::Reqwest(e)))?;

        debug!("[PROBE] {} {} -> {} ({} bytes)", method, url, status, text.len());

        if method == Method::DELETE && text.trim().is_empty() {
            return Ok(HttpResponse {
                status,
                json: Value::Null,
            });
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(json) => Ok(HttpResponse { status, json }),
            Err(_) => Err(ProbeError::NonJson {
                url: url.to_string(),
                status,
                body: body_prefix(&text),
            }),
        }
    }
}

fn body_prefix(text: &str) -> String {
    text.chars().take(BODY_PREFIX_CHARS).collect()
}
