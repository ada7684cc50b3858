//! Client abstraction for talking to a planner.
//!
//! `PlannerClient` wraps either a local `Arc<Planner>` or an HTTP connection
//! to a `lifeplanned` instance. The CLI resolves which variant to use at
//! startup via [`discover_server`].

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use miette::Diagnostic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::LifeplanPaths;
use crate::plan::DailyPlan;
use crate::planner::{Planner, PlannerInfo};
use crate::session::Session;
use crate::settings::{SettingsPatch, UserSettings};
use crate::suggest::Suggestion;
use crate::task::{NewTask, Task, TaskFilter, TaskPage, TaskPatch};

// ---------------------------------------------------------------------------
// Server discovery
// ---------------------------------------------------------------------------

/// Information about a running lifeplanned instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub pid: u32,
    pub port: u16,
    pub bind: String,
}

impl ServerInfo {
    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        let host = if self.bind == "0.0.0.0" {
            "127.0.0.1"
        } else {
            &self.bind
        };
        format!("http://{host}:{}", self.port)
    }
}

/// Discover a running lifeplanned via its PID file.
///
/// Returns `Some(ServerInfo)` when the PID file parses, the process is alive
/// (`kill(pid, 0)` succeeds) and the server answers `GET /health`.
pub fn discover_server(paths: &LifeplanPaths) -> Option<ServerInfo> {
    let pid_path = paths.pid_file();
    let contents = std::fs::read_to_string(&pid_path).ok()?;
    let info: ServerInfo = serde_json::from_str(&contents).ok()?;

    if !process_alive(info.pid) {
        // Stale PID file.
        let _ = std::fs::remove_file(&pid_path);
        return None;
    }

    let url = format!("{}/health", info.base_url());
    match ureq::get(&url).timeout(Duration::from_secs(2)).call() {
        Ok(resp) if resp.status() == 200 => Some(info),
        _ => None,
    }
}

/// Write a PID file for the current lifeplanned process.
pub fn write_pid_file(paths: &LifeplanPaths, port: u16, bind: &str) -> std::io::Result<()> {
    let info = ServerInfo {
        pid: std::process::id(),
        port,
        bind: bind.to_string(),
    };
    let json = serde_json::to_string_pretty(&info).map_err(std::io::Error::other)?;
    std::fs::write(paths.pid_file(), json)
}

/// Remove the PID file on shutdown.
pub fn remove_pid_file(paths: &LifeplanPaths) {
    let _ = std::fs::remove_file(paths.pid_file());
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs the existence check without sending anything.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

// ---------------------------------------------------------------------------
// Client error
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ClientError {
    #[error("remote request failed: {message}")]
    #[diagnostic(code(lifeplan::client::request), help("Is lifeplanned running?"))]
    Request { message: String },

    #[error("unexpected response from server: {message}")]
    #[diagnostic(code(lifeplan::client::response), help("Server version mismatch?"))]
    Response { message: String },

    #[error("server rejected request ({status} {code}): {message}")]
    #[diagnostic(code(lifeplan::client::api))]
    Api {
        status: u16,
        code: String,
        message: String,
        retryable: bool,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Planner(#[from] crate::error::PlannerError),
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(default)]
    retryable: bool,
}

impl ClientError {
    fn from_ureq(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, resp) => match resp.into_json::<ErrorBody>() {
                Ok(body) => ClientError::Api {
                    status,
                    code: body.error,
                    message: body.message,
                    retryable: body.retryable,
                },
                Err(_) => ClientError::Api {
                    status,
                    code: "unknown".into(),
                    message: format!("HTTP {status}"),
                    retryable: status >= 500,
                },
            },
            ureq::Error::Transport(t) => ClientError::Request {
                message: t.to_string(),
            },
        }
    }

    /// Transport failures and 5xx responses may succeed on a later attempt.
    fn is_transient(&self) -> bool {
        match self {
            ClientError::Request { .. } => true,
            ClientError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Retry settings for idempotent reads. Mutations are never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub read_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            read_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

// ---------------------------------------------------------------------------
// PlannerClient
// ---------------------------------------------------------------------------

/// Either a local planner or a remote HTTP connection to lifeplanned.
pub enum PlannerClient {
    /// Direct local planner access.
    Local {
        planner: Arc<Planner>,
        session: Session,
    },
    /// HTTP client to a running lifeplanned.
    Remote {
        base_url: String,
        session: Session,
        http: ureq::Agent,
        retry: RetryPolicy,
    },
}

impl PlannerClient {
    /// Connect to a discovered server.
    pub fn remote(info: &ServerInfo, session: Session) -> Self {
        Self::remote_url(info.base_url(), session)
    }

    /// Connect to an explicit base URL.
    pub fn remote_url(base_url: impl Into<String>, session: Session) -> Self {
        PlannerClient::Remote {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            http: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
            retry: RetryPolicy::default(),
        }
    }

    /// Wrap a local planner.
    pub fn local(planner: Arc<Planner>, session: Session) -> Self {
        PlannerClient::Local { planner, session }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        if let PlannerClient::Remote { retry, .. } = &mut self {
            *retry = policy;
        }
        self
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, PlannerClient::Remote { .. })
    }

    pub fn session(&self) -> &Session {
        match self {
            PlannerClient::Local { session, .. } | PlannerClient::Remote { session, .. } => session,
        }
    }

    // -- helpers for remote calls --

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let PlannerClient::Remote {
            base_url,
            session,
            http,
            ..
        } = self
        else {
            unreachable!("request called on local client");
        };
        http.request(method, &format!("{base_url}{path}"))
            .set(crate::session::USER_HEADER, session.user_id())
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ClientResult<T> {
        let attempts = match self {
            PlannerClient::Remote { retry, .. } => retry.read_attempts.max(1),
            PlannerClient::Local { .. } => 1,
        };
        let backoff = match self {
            PlannerClient::Remote { retry, .. } => retry.backoff,
            PlannerClient::Local { .. } => Duration::ZERO,
        };

        let mut attempt = 1;
        loop {
            let mut req = self.request("GET", path);
            for (k, v) in query {
                req = req.query(k, v);
            }
            let result = req.call().map_err(ClientError::from_ureq).and_then(|resp| {
                resp.into_json().map_err(|e| ClientError::Response {
                    message: format!("failed to parse JSON: {e}"),
                })
            });
            match result {
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::debug!(path, attempt, error = %e, "retrying read");
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let resp = self
            .request(method, path)
            .send_json(body)
            .map_err(ClientError::from_ureq)?;
        resp.into_json().map_err(|e| ClientError::Response {
            message: format!("failed to parse JSON: {e}"),
        })
    }

    fn send_empty(&self, method: &str, path: &str) -> ClientResult<()> {
        self.request(method, path)
            .call()
            .map_err(ClientError::from_ureq)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Plans
    // -----------------------------------------------------------------------

    pub fn today(&self) -> ClientResult<DailyPlan> {
        match self {
            PlannerClient::Local { planner, session } => {
                Ok(DailyPlan::clone(&*planner.today(session)?))
            }
            PlannerClient::Remote { .. } => self.get_json("/plans/today", &[]),
        }
    }

    pub fn plan_for(&self, date: NaiveDate) -> ClientResult<DailyPlan> {
        match self {
            PlannerClient::Local { planner, session } => {
                Ok(DailyPlan::clone(&*planner.plan_for(session, date)?))
            }
            PlannerClient::Remote { .. } => self.get_json(&format!("/plans/{date}"), &[]),
        }
    }

    pub fn regenerate(&self, date: Option<NaiveDate>) -> ClientResult<DailyPlan> {
        match self {
            PlannerClient::Local { planner, session } => {
                Ok(DailyPlan::clone(&*planner.regenerate(session, date)?))
            }
            PlannerClient::Remote { .. } => {
                let path = match date {
                    Some(d) => format!("/plans/regenerate?date={d}"),
                    None => "/plans/regenerate".to_string(),
                };
                self.send_json("POST", &path, &serde_json::json!({}))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Suggestions
    // -----------------------------------------------------------------------

    pub fn suggestions(&self) -> ClientResult<Vec<Suggestion>> {
        match self {
            PlannerClient::Local { planner, session } => Ok(planner.suggestions(session)?),
            PlannerClient::Remote { .. } => self.get_json("/ai-los/suggestions", &[]),
        }
    }

    pub fn dismiss_suggestion(&self, id: &str) -> ClientResult<()> {
        match self {
            PlannerClient::Local { planner, session } => {
                Ok(planner.dismiss_suggestion(session, id)?)
            }
            PlannerClient::Remote { .. } => {
                self.send_empty("POST", &format!("/ai-los/suggestions/{id}/dismiss"))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub fn list_tasks(&self, filter: &TaskFilter) -> ClientResult<TaskPage> {
        match self {
            PlannerClient::Local { planner, session } => Ok(planner.list_tasks(session, filter)?),
            PlannerClient::Remote { .. } => {
                let mut query = Vec::new();
                if let Some(status) = filter.status {
                    query.push(("status", status.as_str().to_string()));
                }
                if let Some(approved) = filter.is_approved {
                    query.push(("is_approved", approved.to_string()));
                }
                if let Some(page) = filter.page {
                    query.push(("page", page.to_string()));
                }
                if let Some(size) = filter.page_size {
                    query.push(("page_size", size.to_string()));
                }
                self.get_json("/tasks", &query)
            }
        }
    }

    pub fn get_task(&self, id: &str) -> ClientResult<Task> {
        match self {
            PlannerClient::Local { planner, session } => Ok(planner.get_task(session, id)?),
            PlannerClient::Remote { .. } => self.get_json(&format!("/tasks/{id}"), &[]),
        }
    }

    pub fn create_task(&self, new: &NewTask) -> ClientResult<Task> {
        match self {
            PlannerClient::Local { planner, session } => {
                Ok(planner.create_task(session, new.clone())?)
            }
            PlannerClient::Remote { .. } => self.send_json("POST", "/tasks", new),
        }
    }

    pub fn update_task(&self, id: &str, patch: &TaskPatch) -> ClientResult<Task> {
        match self {
            PlannerClient::Local { planner, session } => {
                Ok(planner.update_task(session, id, patch.clone())?)
            }
            PlannerClient::Remote { .. } => self.send_json("PUT", &format!("/tasks/{id}"), patch),
        }
    }

    pub fn approve_task(&self, id: &str) -> ClientResult<Task> {
        match self {
            PlannerClient::Local { planner, session } => Ok(planner.approve_task(session, id)?),
            PlannerClient::Remote { .. } => self.send_json(
                "POST",
                &format!("/tasks/{id}/approve"),
                &serde_json::json!({}),
            ),
        }
    }

    pub fn complete_task(&self, id: &str) -> ClientResult<Task> {
        match self {
            PlannerClient::Local { planner, session } => Ok(planner.complete_task(session, id)?),
            PlannerClient::Remote { .. } => self.send_json(
                "POST",
                &format!("/tasks/{id}/complete"),
                &serde_json::json!({}),
            ),
        }
    }

    pub fn delete_task(&self, id: &str) -> ClientResult<()> {
        match self {
            PlannerClient::Local { planner, session } => Ok(planner.delete_task(session, id)?),
            PlannerClient::Remote { .. } => self.send_empty("DELETE", &format!("/tasks/{id}")),
        }
    }

    // -----------------------------------------------------------------------
    // Settings and info
    // -----------------------------------------------------------------------

    pub fn settings(&self) -> ClientResult<UserSettings> {
        match self {
            PlannerClient::Local { planner, session } => Ok(planner.settings(session)?),
            PlannerClient::Remote { .. } => self.get_json("/settings", &[]),
        }
    }

    pub fn update_settings(&self, patch: &SettingsPatch) -> ClientResult<UserSettings> {
        match self {
            PlannerClient::Local { planner, session } => {
                Ok(planner.update_settings(session, patch.clone())?)
            }
            PlannerClient::Remote { .. } => self.send_json("PUT", "/settings", patch),
        }
    }

    pub fn info(&self) -> ClientResult<PlannerInfo> {
        match self {
            PlannerClient::Local { planner, .. } => Ok(planner.info()?),
            PlannerClient::Remote { .. } => self.get_json("/info", &[]),
        }
    }
}
