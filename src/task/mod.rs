//! Task records: the unit of work the planner schedules.
//!
//! A task carries its own duration, priority, deadline and risk metadata. The
//! only lifecycle rule is that `completed` is terminal; everything else about a
//! task may be edited freely. Validation happens here, before anything reaches
//! the risk scorer or the plan builder.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TaskError;

/// Result type for task validation and lifecycle operations.
pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Longest accepted title, in characters.
pub const MAX_TITLE_CHARS: usize = 500;
/// Longest accepted estimate: one day.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;
/// Estimate used when none is given.
pub const DEFAULT_DURATION_MINUTES: u32 = 60;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn is_open(self) -> bool {
        self != Self::Completed
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(TaskError::invalid(
                "status",
                format!("expected pending, in_progress or completed, got {other:?}"),
            )),
        }
    }
}

/// Where a task came from. Ingestion pipelines set this on their drafts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    #[default]
    Manual,
    Email,
    Document,
    Calendar,
}

impl TaskSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Email => "email",
            Self::Document => "document",
            Self::Calendar => "calendar",
        }
    }
}

impl std::str::FromStr for TaskSource {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "email" => Ok(Self::Email),
            "document" => Ok(Self::Document),
            "calendar" => Ok(Self::Calendar),
            other => Err(TaskError::invalid(
                "source",
                format!("expected manual, email, document or calendar, got {other:?}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A stored task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub description: Option<String>,
    /// 0-100, higher is more important.
    pub priority: u8,
    /// Minutes.
    pub estimated_duration: u32,
    pub due_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    /// Only approved tasks are eligible for planning.
    pub is_approved: bool,
    /// 0-100, maintained by the risk scorer.
    pub risk_level: u8,
    /// User-provided statement of what happens if the task is missed.
    pub consequences: Option<String>,
    /// Start time in the owner's latest committed plan, if the task is in it.
    pub scheduled_time: Option<DateTime<Utc>>,
    pub goal_id: Option<String>,
    pub source: TaskSource,
    pub ai_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Store-wide creation sequence; final ranking tie-break.
    pub seq: u64,
}

impl Task {
    /// Build a validated task from creation input.
    ///
    /// `risk_level` starts at zero; the caller scores it before persisting.
    pub fn from_new(
        new: NewTask,
        owner: &str,
        id: String,
        seq: u64,
        now: DateTime<Utc>,
    ) -> TaskResult<Self> {
        let title = validate_title(&new.title)?;
        let estimated_duration = match new.estimated_duration {
            Some(d) => validate_duration(d)?,
            None => DEFAULT_DURATION_MINUTES,
        };
        let source = new.source.unwrap_or_default();
        let priority = match new.priority {
            Some(p) => validate_priority(p)?,
            None => crate::risk::suggest_priority(new.due_date, source, now),
        };
        let status = new.status.unwrap_or(TaskStatus::Pending);
        let is_approved = new.is_approved.unwrap_or(!new.ai_generated);

        Ok(Self {
            id,
            owner: owner.to_string(),
            title,
            description: non_blank(new.description),
            priority,
            estimated_duration,
            due_date: new.due_date,
            status,
            is_approved,
            risk_level: 0,
            consequences: non_blank(new.consequences),
            scheduled_time: None,
            goal_id: non_blank(new.goal_id),
            source,
            ai_generated: new.ai_generated,
            created_at: now,
            updated_at: now,
            completed_at: (status == TaskStatus::Completed).then_some(now),
            seq,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Approved and not completed.
    pub fn qualifies_for_plan(&self) -> bool {
        self.is_approved && self.is_open()
    }

    /// Open with a deadline strictly before `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_date.is_some_and(|due| due < now)
    }

    /// Move to `to`. Returns whether the status changed.
    pub fn transition(&mut self, to: TaskStatus, now: DateTime<Utc>) -> TaskResult<bool> {
        if self.status == to {
            return Ok(false);
        }
        if self.status == TaskStatus::Completed {
            return Err(TaskError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        if to == TaskStatus::Completed {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
        Ok(true)
    }

    /// Pass the approval gate.
    pub fn approve(&mut self, now: DateTime<Utc>) -> TaskResult<()> {
        if self.status == TaskStatus::Completed {
            return Err(TaskError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: "approved".into(),
            });
        }
        if !self.is_approved {
            self.is_approved = true;
            self.updated_at = now;
        }
        Ok(())
    }

    /// Apply a partial update.
    ///
    /// Returns `true` when a risk input (deadline, priority, duration or
    /// status) changed. Nothing is modified if any field fails validation.
    pub fn apply_patch(&mut self, patch: TaskPatch, now: DateTime<Utc>) -> TaskResult<bool> {
        let title = patch.title.as_deref().map(validate_title).transpose()?;
        let priority = patch.priority.map(validate_priority).transpose()?;
        let duration = patch.estimated_duration.map(validate_duration).transpose()?;

        let mut next = self.clone();
        let mut risk_inputs_changed = false;

        if let Some(status) = patch.status {
            risk_inputs_changed |= next.transition(status, now)?;
        }
        if let Some(title) = title {
            next.title = title;
        }
        if let Some(description) = patch.description {
            next.description = non_blank(description);
        }
        if let Some(priority) = priority {
            risk_inputs_changed |= next.priority != priority;
            next.priority = priority;
        }
        if let Some(duration) = duration {
            risk_inputs_changed |= next.estimated_duration != duration;
            next.estimated_duration = duration;
        }
        if let Some(due) = patch.due_date {
            risk_inputs_changed |= next.due_date != due;
            next.due_date = due;
        }
        if let Some(consequences) = patch.consequences {
            next.consequences = non_blank(consequences);
        }
        if let Some(goal_id) = patch.goal_id {
            next.goal_id = non_blank(goal_id);
        }

        next.updated_at = now;
        *self = next;
        Ok(risk_inputs_changed)
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Creation payload (`POST /tasks`).
///
/// Numeric fields are accepted as wide integers so out-of-range values get a
/// validation error naming the field rather than a generic parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Derived from deadline and source when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Defaults to `true` for manual tasks and `false` for AI drafts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequences: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TaskSource>,
    #[serde(default)]
    pub ai_generated: bool,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update payload (`PUT /tasks/{id}`).
///
/// Nullable fields use `Option<Option<T>>`: absent leaves the field alone,
/// `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<i64>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub consequences: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub goal_id: Option<Option<String>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Query for `GET /tasks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| task.status == s)
            && self.is_approved.is_none_or(|a| task.is_approved == a)
    }

    /// Resolved `(page, page_size)`, 1-based.
    pub fn paging(&self) -> TaskResult<(u32, u32)> {
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 {
            return Err(TaskError::invalid("page", "pages start at 1"));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(TaskError::invalid(
                "page_size",
                format!("must be within 1-{MAX_PAGE_SIZE}"),
            ));
        }
        Ok((page, page_size))
    }
}

/// One page of a task listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate_title(raw: &str) -> TaskResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(TaskError::invalid("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(TaskError::invalid(
            "title",
            format!("must be at most {MAX_TITLE_CHARS} characters"),
        ));
    }
    Ok(title.to_string())
}

pub fn validate_priority(raw: i64) -> TaskResult<u8> {
    u8::try_from(raw)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| TaskError::invalid("priority", format!("must be within 0-100, got {raw}")))
}

pub fn validate_duration(raw: i64) -> TaskResult<u32> {
    u32::try_from(raw)
        .ok()
        .filter(|d| (1..=MAX_DURATION_MINUTES).contains(d))
        .ok_or_else(|| {
            TaskError::invalid(
                "estimated_duration",
                format!("must be within 1-{MAX_DURATION_MINUTES} minutes, got {raw}"),
            )
        })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
    }

    fn task(new: NewTask) -> Task {
        Task::from_new(new, "alice", "t1".into(), 1, now()).unwrap()
    }

    #[test]
    fn defaults_on_create() {
        let t = task(NewTask::titled("  Pay rent  "));
        assert_eq!(t.title, "Pay rent");
        assert_eq!(t.estimated_duration, DEFAULT_DURATION_MINUTES);
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.is_approved);
        assert_eq!(t.priority, 50, "undated manual tasks get the base priority");
        assert!(t.completed_at.is_none());
    }

    #[test]
    fn ai_drafts_start_unapproved() {
        let t = task(NewTask {
            ai_generated: true,
            source: Some(TaskSource::Email),
            ..NewTask::titled("Reply to bank")
        });
        assert!(!t.is_approved);
        assert!(!t.qualifies_for_plan());
    }

    #[test]
    fn validation_rejects_bad_fields() {
        let bad = |new: NewTask| Task::from_new(new, "u", "x".into(), 0, now()).unwrap_err();

        let err = bad(NewTask::titled("   "));
        assert!(matches!(err, TaskError::Validation { ref field, .. } if field == "title"));

        let err = bad(NewTask::titled("x".repeat(501)));
        assert!(matches!(err, TaskError::Validation { ref field, .. } if field == "title"));

        let err = bad(NewTask {
            priority: Some(101),
            ..NewTask::titled("t")
        });
        assert!(matches!(err, TaskError::Validation { ref field, .. } if field == "priority"));

        for d in [0, -5, 1441] {
            let err = bad(NewTask {
                estimated_duration: Some(d),
                ..NewTask::titled("t")
            });
            assert!(
                matches!(err, TaskError::Validation { ref field, .. } if field == "estimated_duration")
            );
        }
    }

    #[test]
    fn title_limit_counts_characters() {
        assert!(validate_title(&"é".repeat(500)).is_ok());
    }

    #[test]
    fn completed_is_terminal() {
        let mut t = task(NewTask::titled("t"));
        assert!(t.transition(TaskStatus::InProgress, now()).unwrap());
        assert!(t.transition(TaskStatus::Completed, now()).unwrap());
        assert_eq!(t.completed_at, Some(now()));
        assert!(!t.transition(TaskStatus::Completed, now()).unwrap());
        assert!(matches!(
            t.transition(TaskStatus::Pending, now()),
            Err(TaskError::InvalidTransition { .. })
        ));
        assert!(t.approve(now()).is_err());
    }

    #[test]
    fn patch_reports_risk_inputs_and_is_all_or_nothing() {
        let mut t = task(NewTask::titled("t"));
        let changed = t
            .apply_patch(
                TaskPatch {
                    title: Some("renamed".into()),
                    ..TaskPatch::default()
                },
                now(),
            )
            .unwrap();
        assert!(!changed);
        assert_eq!(t.title, "renamed");

        let before = t.clone();
        let err = t.apply_patch(
            TaskPatch {
                title: Some("new".into()),
                priority: Some(300),
                ..TaskPatch::default()
            },
            now(),
        );
        assert!(err.is_err());
        assert_eq!(t, before);

        let changed = t
            .apply_patch(
                TaskPatch {
                    due_date: Some(Some(now() + Duration::days(1))),
                    ..TaskPatch::default()
                },
                now(),
            )
            .unwrap();
        assert!(changed);

        let changed = t
            .apply_patch(
                TaskPatch {
                    estimated_duration: Some(240),
                    ..TaskPatch::default()
                },
                now(),
            )
            .unwrap();
        assert!(changed);
        let changed = t
            .apply_patch(
                TaskPatch {
                    estimated_duration: Some(240),
                    ..TaskPatch::default()
                },
                now(),
            )
            .unwrap();
        assert!(!changed);
    }

    #[test]
    fn patch_null_clears_nullable_fields() {
        let patch: TaskPatch =
            serde_json::from_str(r#"{"due_date": null, "consequences": "late fee"}"#).unwrap();
        assert_eq!(patch.due_date, Some(None));
        assert_eq!(patch.consequences, Some(Some("late fee".into())));
        assert_eq!(patch.description, None);
    }

    #[test]
    fn overdue_requires_open_task() {
        let mut t = task(NewTask {
            due_date: Some(now() - Duration::hours(1)),
            ..NewTask::titled("t")
        });
        assert!(t.is_overdue(now()));
        t.transition(TaskStatus::Completed, now()).unwrap();
        assert!(!t.is_overdue(now()));
    }

    #[test]
    fn filter_paging_bounds() {
        assert_eq!(TaskFilter::default().paging().unwrap(), (1, 20));
        let f = TaskFilter {
            page: Some(0),
            ..TaskFilter::default()
        };
        assert!(f.paging().is_err());
        let f = TaskFilter {
            page_size: Some(101),
            ..TaskFilter::default()
        };
        assert!(f.paging().is_err());
    }
}
