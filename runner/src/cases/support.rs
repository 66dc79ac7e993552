//! Shared plumbing for cases: both-target calls, status and body assertions, admin login.

use std::ops::Index;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use rand::Rng;
use serde_json::{json, Value};
use tracing::info;

use contract::capture::{init_capture_session, CaptureMiddleware};
use contract::probe::Method;
use contract::{assert_same_schema, assert_same_shape, HttpResponse, JsonPath, Probe, ToleranceSet};

use crate::config::Config;

/// Which backend a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Golden,
    Candidate,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Golden => "golden",
            Side::Candidate => "candidate",
        }
    }
}

/// The same thing observed on both targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair<T> {
    pub golden: T,
    pub candidate: T,
}

impl<T> Pair<T> {
    pub fn new(golden: T, candidate: T) -> Self {
        Self { golden, candidate }
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Pair<U> {
        Pair::new(f(&self.golden), f(&self.candidate))
    }

    pub fn try_map<U>(&self, f: impl Fn(Side, &T) -> Result<U>) -> Result<Pair<U>> {
        Ok(Pair::new(
            f(Side::Golden, &self.golden)?,
            f(Side::Candidate, &self.candidate)?,
        ))
    }
}

impl<T> Index<Side> for Pair<T> {
    type Output = T;

    fn index(&self, side: Side) -> &T {
        match side {
            Side::Golden => &self.golden,
            Side::Candidate => &self.candidate,
        }
    }
}

impl Pair<HttpResponse> {
    /// Common status code, or a status mismatch naming both.
    pub fn same_status(&self, step: &str) -> Result<u16> {
        if self.golden.status != self.candidate.status {
            bail!(
                "{} status mismatch: golden={} candidate={}",
                step,
                self.golden.status,
                self.candidate.status
            );
        }
        Ok(self.golden.status)
    }

    /// Equal statuses, and equal to `expected`.
    pub fn expect_status(&self, step: &str, expected: u16) -> Result<()> {
        let status = self.same_status(step)?;
        if status != expected {
            bail!("{} status is not {}: {}", step, expected, status);
        }
        Ok(())
    }

    /// Shape and values must match, except values at `tolerated` paths.
    pub fn same_shape(&self, step: &str, tolerated: &[&str]) -> Result<()> {
        same_shape(step, &self.golden.json, &self.candidate.json, tolerated)
    }

    /// Types and key sets must match; values are ignored.
    pub fn same_schema(&self, step: &str) -> Result<()> {
        assert_same_schema(&self.golden.json, &self.candidate.json, &JsonPath::root())
            .with_context(|| step.to_string())
    }

    pub fn json(&self) -> Pair<&Value> {
        Pair::new(&self.golden.json, &self.candidate.json)
    }
}

/// Structural comparison of two arbitrary payloads, e.g. after normalising.
pub fn same_shape(step: &str, golden: &Value, candidate: &Value, tolerated: &[&str]) -> Result<()> {
    assert_same_shape(
        golden,
        candidate,
        &JsonPath::root(),
        &ToleranceSet::of(tolerated.iter().copied()),
    )
    .with_context(|| step.to_string())
}

/// One request, before it is bound to a target.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    body: Option<Value>,
    bearer: Option<String>,
}

impl Request {
    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path, Some(body))
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path, Some(body))
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path, Some(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, None)
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }
}

/// Tokens from one successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
}

impl AuthSession {
    pub fn from_login(login: &HttpResponse) -> Result<Self> {
        Ok(Self {
            access_token: str_field(&login.json, "access_token")?,
            refresh_token: str_field(&login.json, "refresh_token").unwrap_or_default(),
        })
    }
}

/// Everything a case needs to drive both targets.
pub struct CaseContext {
    pub golden_base: String,
    pub candidate_base: String,
    pub probe: Probe,
    /// `ENABLE_DB_CASES`
    pub db_cases: bool,
    /// Seeding ran before this run
    pub db_seeded: bool,
    pub admin_username: String,
    pub admin_password: String,
}

impl CaseContext {
    /// Context with default flags and credentials and a capture-free probe.
    pub fn for_targets(golden_base: &str, candidate_base: &str) -> Result<Self> {
        Ok(Self {
            golden_base: golden_base.trim_end_matches('/').to_string(),
            candidate_base: candidate_base.trim_end_matches('/').to_string(),
            probe: Probe::new(None, None).context("Failed to build HTTP client")?,
            db_cases: false,
            db_seeded: false,
            admin_username: "admin".to_string(),
            admin_password: "admin123".to_string(),
        })
    }

    /// Build the probe (with capture when `CAPTURE_DIR` is set) and carry over the flags.
    pub fn from_config(config: &Config) -> Result<Self> {
        let capture = match &config.capture_dir {
            Some(dir) => {
                let session_dir = init_capture_session(dir).with_context(|| {
                    format!("Failed to initialize capture session in {}", dir.display())
                })?;
                info!(
                    "[RUNNER] Capture mode active: {} (filter: {})",
                    session_dir.display(),
                    config.capture_filter.description()
                );
                Some(
                    CaptureMiddleware::new(session_dir, config.capture_filter.clone())
                        .with_target("golden", &config.golden_base)
                        .with_target("candidate", &config.candidate_base),
                )
            }
            None => None,
        };

        Ok(Self {
            golden_base: config.golden_base.clone(),
            candidate_base: config.candidate_base.clone(),
            probe: Probe::new(config.http_timeout, capture)
                .context("Failed to build HTTP client")?,
            db_cases: config.db_cases,
            db_seeded: config.seeding_enabled(),
            admin_username: config.admin_username.clone(),
            admin_password: config.admin_password.clone(),
        })
    }

    pub fn base(&self, side: Side) -> &str {
        match side {
            Side::Golden => &self.golden_base,
            Side::Candidate => &self.candidate_base,
        }
    }

    pub async fn send(&self, side: Side, request: &Request) -> Result<HttpResponse> {
        let url = format!("{}{}", self.base(side), request.path);
        Ok(self
            .probe
            .send(
                request.method.clone(),
                &url,
                request.body.as_ref(),
                request.bearer.as_deref(),
            )
            .await?)
    }

    /// Issue the request built for each side, golden first, then candidate.
    pub async fn each<F>(&self, step: &str, build: F) -> Result<Pair<HttpResponse>>
    where
        F: Fn(Side) -> Request,
    {
        let golden = self
            .send(Side::Golden, &build(Side::Golden))
            .await
            .with_context(|| format!("{} (golden)", step))?;
        let candidate = self
            .send(Side::Candidate, &build(Side::Candidate))
            .await
            .with_context(|| format!("{} (candidate)", step))?;
        Ok(Pair::new(golden, candidate))
    }

    /// Issue an identical request against both targets.
    pub async fn both(&self, step: &str, request: Request) -> Result<Pair<HttpResponse>> {
        self.each(step, |_| request.clone()).await
    }

    /// Same as [`CaseContext::each`], with each side's access token attached.
    pub async fn each_authed<F>(
        &self,
        step: &str,
        sessions: &Pair<AuthSession>,
        build: F,
    ) -> Result<Pair<HttpResponse>>
    where
        F: Fn(Side) -> Request,
    {
        self.each(step, |side| build(side).bearer(&sessions[side].access_token))
            .await
    }

    /// Identical request on both targets, each with its own access token.
    pub async fn both_authed(
        &self,
        step: &str,
        sessions: &Pair<AuthSession>,
        request: Request,
    ) -> Result<Pair<HttpResponse>> {
        self.each_authed(step, sessions, |_| request.clone()).await
    }

    /// `system_initialized` as reported by each target's health endpoint.
    pub async fn initialized_flags(&self) -> Result<Pair<Value>> {
        let health = self.both("health", Request::get("/api/health/")).await?;
        Ok(health.map(|r| r.field("system_initialized").cloned().unwrap_or(Value::Null)))
    }

    /// True when both targets report `system_initialized == true`; logs the skip otherwise.
    pub async fn both_initialized(&self, case: &str) -> Result<bool> {
        let flags = self.initialized_flags().await?;
        let ready = flags.golden == Value::Bool(true) && flags.candidate == Value::Bool(true);
        if !ready {
            info!(
                "[CASE:{}] skipped: system not initialized (golden={} candidate={})",
                case, flags.golden, flags.candidate
            );
        }
        Ok(ready)
    }

    /// Admin login on both targets. Statuses must agree.
    pub async fn login(&self, step: &str) -> Result<Pair<HttpResponse>> {
        let login = self
            .both(
                step,
                Request::post(
                    "/api/auth/login",
                    json!({
                        "username": self.admin_username,
                        "password": self.admin_password,
                    }),
                ),
            )
            .await?;
        login.same_status(step)?;
        Ok(login)
    }

    /// Admin sessions on both targets, or `None` (logged) when login is not 200.
    pub async fn admin_sessions(&self, case: &str) -> Result<Option<Pair<AuthSession>>> {
        let login = self.login("login").await?;
        if login.golden.status != 200 {
            info!(
                "[CASE:{}] skipped: admin login returned {}",
                case, login.golden.status
            );
            return Ok(None);
        }
        Ok(Some(login.try_map(|side, response| {
            AuthSession::from_login(response)
                .with_context(|| format!("login ({})", side.label()))
        })?))
    }
}

/// `<prefix>_<epoch-ms>_<random 0..1e6>`
pub fn unique_name(prefix: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{}_{}_{}", prefix, millis, suffix)
}

/// A string field of an object payload.
pub fn str_field(value: &Value, key: &str) -> Result<String> {
    match value.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => bail!("{} is not a string: {}", key, other),
        None => bail!("{} is missing", key),
    }
}

/// Form-encode one query value; space becomes `+`.
pub fn encode_query(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// Percent-encode one path segment; space becomes `%20`.
pub fn encode_segment(raw: &str) -> String {
    // A literal `+` is already escaped as `%2B`, so every remaining `+` is a space
    encode_query(raw).replace('+', "%20")
}

/// Array length of a payload, or an error naming the step.
pub fn array_len(step: &str, value: &Value) -> Result<usize> {
    value
        .as_array()
        .map(Vec::len)
        .with_context(|| format!("{} response is not an array", step))
}
