//! HTTP capture middleware recording every probe exchange to disk.
//!
//! Enabled by the runner when `CAPTURE_DIR` is set. Each matching exchange is written as
//! one pretty-printed JSON file named `{sequence}_{method}_{target}_{endpoint}.json`,
//! where `target` is the label (`golden`, `candidate`) whose base URL prefixes the request
//! URL. A `manifest.json` next to the files lists them in capture order.
//!
//! # File Format
//!
//! - `captured_at`: RFC 3339 timestamp
//! - `latency_ms`: request duration in milliseconds
//! - `request`: method, URL, headers (sensitive excluded), JSON body
//! - `response`: status, headers, raw body, parsed body
//!
//! Capture never fails a request: write errors are logged and the response is handed back
//! to the caller byte for byte.

use async_trait::async_trait;
use chrono::{Local, Utc};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

// ============================================================================
// SESSION INITIALIZATION
// ============================================================================

/// Prepare a timestamped session directory below `base_dir`.
///
/// Creates `base_dir/session_<YYYY-mm-dd_HH-MM-SS>/`, checks that it is writable and
/// returns its absolute path.
pub fn init_capture_session(base_dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(base_dir)?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let session_dir = base_dir.join(format!("session_{}", timestamp));
    std::fs::create_dir_all(&session_dir)?;

    let probe_file = session_dir.join(".write_test");
    std::fs::write(&probe_file, b"test")?;
    std::fs::remove_file(&probe_file)?;

    let session_dir = session_dir.canonicalize().unwrap_or(session_dir);
    info!("[CAPTURE] Session initialized: {}", session_dir.display());
    Ok(session_dir)
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Captured HTTP exchange (request + response pair)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedExchange {
    pub captured_at: String,
    /// Monotonic sequence number for ordering
    pub sequence: u32,
    pub latency_ms: u64,
    /// Which target served the request (`golden`, `candidate`, `unknown`)
    pub target: String,
    pub request: CapturedRequest,
    pub response: CapturedResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub method: String,
    pub url: String,
    /// Request headers (sensitive headers excluded)
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body_raw: String,
    pub body_parsed: Option<serde_json::Value>,
}

/// Manifest tracking capture session metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureManifest {
    pub started_at: String,
    pub capture_filter: String,
    /// Captured filenames in order
    pub files: Vec<String>,
}

impl CaptureManifest {
    pub fn new(capture_filter: String) -> Self {
        Self {
            started_at: Utc::now().to_rfc3339(),
            capture_filter,
            files: Vec::new(),
        }
    }

    pub fn add_file(&mut self, filename: String) {
        self.files.push(filename);
    }
}

/// Filter for which requests to capture
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CaptureFilter {
    /// Capture requests whose URL contains any of these substrings
    UrlContains(Vec<String>),
    #[default]
    All,
}

impl CaptureFilter {
    pub fn matches(&self, url: &str) -> bool {
        match self {
            CaptureFilter::UrlContains(patterns) => patterns.iter().any(|p| url.contains(p)),
            CaptureFilter::All => true,
        }
    }

    /// Parse a `CAPTURE_FILTER` value.
    ///
    /// - empty or `all` -> [`CaptureFilter::All`]
    /// - comma-separated substrings -> [`CaptureFilter::UrlContains`]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            return CaptureFilter::All;
        }
        let patterns: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if patterns.is_empty() {
            CaptureFilter::All
        } else {
            CaptureFilter::UrlContains(patterns)
        }
    }

    pub fn description(&self) -> String {
        match self {
            CaptureFilter::All => "all".to_string(),
            CaptureFilter::UrlContains(patterns) => patterns.join(","),
        }
    }
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Middleware that captures HTTP traffic to JSON files
pub struct CaptureMiddleware {
    output_dir: PathBuf,
    filter: CaptureFilter,
    /// (label, base URL) pairs used to name the target of each request
    targets: Vec<(String, String)>,
    manifest: Arc<Mutex<CaptureManifest>>,
    /// Per-instance sequence counter (starts at 1)
    sequence: Arc<AtomicU32>,
}

impl CaptureMiddleware {
    /// Create a capture middleware writing into `output_dir`.
    ///
    /// Directory creation and the initial manifest write use blocking I/O since this runs
    /// once at startup. Captures themselves are written with async I/O.
    pub fn new(output_dir: PathBuf, filter: CaptureFilter) -> Self {
        if let Err(e) = std::fs::create_dir_all(&output_dir) {
            error!(
                "[CAPTURE] Failed to create output directory {:?}: {}",
                output_dir, e
            );
        } else {
            info!("[CAPTURE] Capturing HTTP traffic to {:?}", output_dir);
        }

        let manifest = Arc::new(Mutex::new(CaptureManifest::new(filter.description())));
        Self::write_manifest_to_disk_sync(&output_dir, &manifest);

        Self {
            output_dir,
            filter,
            targets: Vec::new(),
            manifest,
            sequence: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Register a labelled base URL so captures can be attributed to a target.
    pub fn with_target(mut self, label: &str, base_url: &str) -> Self {
        self.targets
            .push((label.to_string(), base_url.trim_end_matches('/').to_string()));
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn target_label(&self, url: &str) -> &str {
        self.targets
            .iter()
            .filter(|(_, base)| url.starts_with(base.as_str()))
            .max_by_key(|(_, base)| base.len())
            .map(|(label, _)| label.as_str())
            .unwrap_or("unknown")
    }

    /// Format: `{sequence}_{method}_{target}_{endpoint}.json`, e.g. `004_POST_golden_login.json`
    fn generate_filename(&self, exchange: &CapturedExchange) -> String {
        let endpoint = exchange
            .request
            .url
            .split('?')
            .next()
            .unwrap_or("")
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("unknown")
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .take(30)
            .collect::<String>();
        let endpoint = if endpoint.is_empty() { "root".to_string() } else { endpoint };

        format!(
            "{:03}_{}_{}_{}.json",
            exchange.sequence, exchange.request.method, exchange.target, endpoint
        )
    }

    async fn save_capture(&self, exchange: &CapturedExchange) {
        let filename = self.generate_filename(exchange);
        let filepath = self.output_dir.join(&filename);

        match serde_json::to_string_pretty(exchange) {
            Ok(json) => {
                if let Err(e) = tokio::fs::write(&filepath, json).await {
                    error!("[CAPTURE] Failed to write {:?}: {}", filepath, e);
                } else {
                    debug!("[CAPTURE] Saved {}", filename);
                    if let Ok(mut manifest) = self.manifest.lock() {
                        manifest.add_file(filename);
                    }
                    self.write_manifest_to_disk_async().await;
                }
            }
            Err(e) => error!("[CAPTURE] Failed to serialize capture: {}", e),
        }
    }

    async fn write_manifest_to_disk_async(&self) {
        let manifest_path = self.output_dir.join("manifest.json");
        // Serialize under the lock, write after releasing it
        let json_result = match self.manifest.lock() {
            Ok(manifest) => serde_json::to_string_pretty(&*manifest),
            Err(e) => {
                warn!("[CAPTURE] Failed to lock manifest for writing: {}", e);
                return;
            }
        };
        match json_result {
            Ok(json) => {
                if let Err(e) = tokio::fs::write(&manifest_path, json).await {
                    warn!("[CAPTURE] Failed to write manifest: {}", e);
                }
            }
            Err(e) => warn!("[CAPTURE] Failed to serialize manifest: {}", e),
        }
    }

    fn write_manifest_to_disk_sync(output_dir: &Path, manifest: &Arc<Mutex<CaptureManifest>>) {
        let manifest_path = output_dir.join("manifest.json");
        match manifest.lock() {
            Ok(manifest) => match serde_json::to_string_pretty(&*manifest) {
                Ok(json) => {
                    if let Err(e) = std::fs::write(&manifest_path, json) {
                        warn!("[CAPTURE] Failed to write manifest: {}", e);
                    }
                }
                Err(e) => warn!("[CAPTURE] Failed to serialize manifest: {}", e),
            },
            Err(e) => warn!("[CAPTURE] Failed to lock manifest for writing: {}", e),
        }
    }

    fn is_sensitive_header(name: &str) -> bool {
        let lower = name.to_lowercase();
        lower.contains("authorization")
            || lower.contains("cookie")
            || lower.contains("api-key")
            || lower.contains("api_key")
            || lower.contains("secret")
            || lower.contains("password")
            || lower.contains("token")
    }

    fn extract_request_headers(req: &Request) -> HashMap<String, String> {
        req.headers()
            .iter()
            .filter(|(k, _)| !Self::is_sensitive_header(k.as_str()))
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect()
    }

    fn extract_response_headers(resp: &Response) -> HashMap<String, String> {
        resp.headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect()
    }
}

#[async_trait]
impl Middleware for CaptureMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let url = req.url().to_string();
        if !self.filter.matches(&url) {
            return next.run(req, extensions).await;
        }

        let method = req.method().to_string();
        let request_headers = Self::extract_request_headers(&req);
        let request_body: Option<serde_json::Value> = req
            .body()
            .and_then(|b| b.as_bytes())
            .and_then(|b| serde_json::from_slice(b).ok());

        let start = std::time::Instant::now();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let response = next.run(req, extensions).await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status();
        let version = response.version();
        let response_headers = response.headers().clone();
        let captured_headers = Self::extract_response_headers(&response);

        // Reading the body consumes the response; it is rebuilt below
        let body_bytes = response.bytes().await?;
        let body_raw = String::from_utf8_lossy(&body_bytes).to_string();
        let body_parsed: Option<serde_json::Value> = serde_json::from_slice(&body_bytes).ok();

        let exchange = CapturedExchange {
            captured_at: Utc::now().to_rfc3339(),
            sequence,
            latency_ms,
            target: self.target_label(&url).to_string(),
            request: CapturedRequest {
                method,
                url,
                headers: request_headers,
                body: request_body,
            },
            response: CapturedResponse {
                status: status.as_u16(),
                headers: captured_headers,
                body_raw,
                body_parsed,
            },
        };
        self.save_capture(&exchange).await;

        let mut builder = http::Response::builder().status(status).version(version);
        if let Some(headers) = builder.headers_mut() {
            *headers = response_headers;
        }
        let http_response = builder.body(body_bytes).map_err(|e| {
            reqwest_middleware::Error::Middleware(anyhow::anyhow!(
                "Failed to rebuild response: {}",
                e
            ))
        })?;

        Ok(Response::from(http_response))
    }
}

/// Build a reqwest client, adding capture middleware when one is supplied.
pub fn build_client_with_capture(
    base_builder: reqwest::ClientBuilder,
    capture: Option<CaptureMiddleware>,
) -> Result<reqwest_middleware::ClientWithMiddleware, reqwest::Error> {
    let client = base_builder.build()?;
    let mut builder = reqwest_middleware::ClientBuilder::new(client);
    if let Some(capture) = capture {
        builder = builder.with(capture);
    }
    Ok(builder.build())
}
