//! Daily plans: a time-boxed, ordered selection of a user's tasks.
//!
//! - [`builder`] ranks qualifying tasks and packs them into the day's budget
//! - [`registry`] holds committed plans and serializes rebuilds per (user, date)
//!
//! Plans are stored under `plan/<user>/<YYYY-MM-DD>`, one per user and date.

pub mod builder;
pub mod registry;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::load::OverloadInfo;
use crate::task::TaskSource;

/// One scheduled block in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub task_id: String,
    pub title: String,
    pub priority: u8,
    pub risk_level: u8,
    pub consequences: String,
    /// The task's full estimate in minutes.
    pub estimated_duration: u32,
    /// Minutes actually booked today. Lower than the estimate iff `partial`.
    pub scheduled_duration: u32,
    pub scheduled_time: DateTime<Utc>,
    pub partial: bool,
    pub source: TaskSource,
}

/// Scheduled entries by priority band (≥70 high, ≥40 medium).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityBreakdown {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl PriorityBreakdown {
    pub fn of(entries: &[PlanEntry]) -> Self {
        let mut b = Self::default();
        for e in entries {
            match e.priority {
                70.. => b.high += 1,
                40.. => b.medium += 1,
                _ => b.low += 1,
            }
        }
        b
    }
}

/// A committed plan for one user and date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPlan {
    pub date: NaiveDate,
    /// Build id; strictly increasing across all commits of a store.
    pub generation: u64,
    pub generated_at: DateTime<Utc>,
    pub budget_minutes: u32,
    pub tasks: Vec<PlanEntry>,
    /// Sum of `scheduled_duration`.
    pub total_duration: u32,
    pub priority_breakdown: PriorityBreakdown,
    /// Qualifying tasks that did not fit, in rank order.
    pub deferred: Vec<String>,
    pub ai_recommendations: Option<String>,
    pub overload_info: Option<OverloadInfo>,
}

impl DailyPlan {
    pub fn entry(&self, task_id: &str) -> Option<&PlanEntry> {
        self.tasks.iter().find(|e| e.task_id == task_id)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop scheduled and deferred tasks for which `keep` is false, keeping
    /// `total_duration` and `priority_breakdown` in step. Returns the number
    /// of entries removed from the schedule.
    pub fn retain_tasks(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|e| keep(&e.task_id));
        self.deferred.retain(|id| keep(id));
        self.total_duration = self.tasks.iter().map(|e| e.scheduled_duration).sum();
        self.priority_breakdown = PriorityBreakdown::of(&self.tasks);
        before - self.tasks.len()
    }

    /// Load percentage recorded at commit time, if analyzed.
    pub fn load_percentage(&self) -> Option<f64> {
        self.overload_info.as_ref().map(|o| o.load_percentage)
    }
}

/// Everything the builder needs to know about the user's day.
#[derive(Debug, Clone)]
pub struct PlanParams {
    pub date: NaiveDate,
    pub timezone: Tz,
    pub day_start: NaiveTime,
    pub budget_minutes: u32,
    pub allow_partial: bool,
    pub min_partial_minutes: u32,
}

impl PlanParams {
    /// Start of the work window: `day_start` on `date` in the user's timezone.
    pub fn anchor(&self) -> DateTime<Utc> {
        local_to_utc(self.timezone, self.date.and_time(self.day_start))
    }
}

/// Resolve a local wall-clock time to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// DST gap move forward by an hour.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(local + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&local))
}

/// The calendar date at `now` in `tz`.
pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate, PlanError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| PlanError::InvalidDate {
        input: input.to_string(),
    })
}

pub fn plan_key(user: &str, date: NaiveDate) -> Vec<u8> {
    format!("plan/{user}/{}", date.format("%Y-%m-%d")).into_bytes()
}

pub fn plan_prefix(user: &str) -> Vec<u8> {
    format!("plan/{user}/").into_bytes()
}
