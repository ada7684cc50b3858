//! Risk & consequence scoring.
//!
//! `risk_level` (0-100) estimates how likely a task is to be missed and how
//! much that would hurt. The score is integer arithmetic over four inputs:
//! deadline proximity, priority, the owner's record of late completions, and
//! task size. It only ever grows as a deadline approaches.
//!
//! | hours to deadline | base |
//! |---|---|
//! | > 168 | 5 |
//! | ≤ 168 | 10 |
//! | ≤ 72 | 20 |
//! | ≤ 48 | 30 |
//! | ≤ 24 | 40 |
//! | ≤ 8 | 50 |
//! | ≤ 2 | 60 |
//! | overdue | 60 + min(2 × days overdue, 10) |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskSource, TaskStatus};

/// Open overdue tasks never score below this.
pub const OVERDUE_FLOOR: u8 = 70;

/// Weight of the owner's late-completion rate.
const HISTORY_WEIGHT: f64 = 15.0;
/// Tasks longer than this (minutes) get the complexity bump.
const LONG_TASK_MINUTES: u32 = 120;
const LONG_TASK_BONUS: u32 = 5;

/// Consequence text used when nothing better is known. Plan entries show it.
pub const GENERIC_CONSEQUENCE: &str = "Missing this might impact your daily goals.";

/// Outcome of scoring one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: u8,
    /// The task's own consequences, or a default derived from the risk band.
    pub consequences: Option<String>,
}

/// How reliably an owner meets deadlines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerHistory {
    /// Completed tasks that had a deadline.
    pub completed_with_deadline: u32,
    /// Of those, completed after the deadline.
    pub completed_late: u32,
}

impl OwnerHistory {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut history = Self::default();
        for task in tasks {
            if task.status != TaskStatus::Completed {
                continue;
            }
            let (Some(due), Some(done)) = (task.due_date, task.completed_at) else {
                continue;
            };
            history.completed_with_deadline += 1;
            if done > due {
                history.completed_late += 1;
            }
        }
        history
    }

    /// Fraction of deadline-bearing completions that were late; 0 without history.
    pub fn missed_rate(&self) -> f64 {
        if self.completed_with_deadline == 0 {
            0.0
        } else {
            f64::from(self.completed_late) / f64::from(self.completed_with_deadline)
        }
    }
}

/// Deadline proximity component.
fn proximity_base(due: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let minutes_left = (due - now).num_minutes();
    if due < now {
        let days_overdue = u32::try_from((now - due).num_days()).unwrap_or(u32::MAX);
        return 60 + days_overdue.saturating_mul(2).min(10);
    }
    match minutes_left {
        m if m <= 2 * 60 => 60,
        m if m <= 8 * 60 => 50,
        m if m <= 24 * 60 => 40,
        m if m <= 48 * 60 => 30,
        m if m <= 72 * 60 => 20,
        m if m <= 168 * 60 => 10,
        _ => 5,
    }
}

/// Risk level of `task` at `now`.
///
/// Completed tasks return their stored value unchanged.
pub fn risk_level(task: &Task, history: &OwnerHistory, now: DateTime<Utc>) -> u8 {
    if task.status == TaskStatus::Completed {
        return task.risk_level;
    }
    let priority = u32::from(task.priority);
    let Some(due) = task.due_date else {
        return (priority / 5).min(100) as u8;
    };

    let history_bonus = (history.missed_rate() * HISTORY_WEIGHT).round() as u32;
    let complexity = if task.estimated_duration > LONG_TASK_MINUTES {
        LONG_TASK_BONUS
    } else {
        0
    };
    let score = (proximity_base(due, now) + priority / 4 + history_bonus + complexity).min(100);
    let score = score as u8;
    if due < now { score.max(OVERDUE_FLOOR) } else { score }
}

/// Default consequence statement for a risk band.
pub fn default_consequence(risk_level: u8, overdue: bool) -> &'static str {
    if overdue {
        "Overdue: further delay compounds the impact."
    } else if risk_level >= 70 {
        "High chance of missing the deadline; slipping this has visible consequences."
    } else if risk_level >= 40 {
        GENERIC_CONSEQUENCE
    } else {
        "Low impact if postponed."
    }
}

/// Score a task and resolve its consequence text.
pub fn score(task: &Task, history: &OwnerHistory, now: DateTime<Utc>) -> RiskAssessment {
    let risk_level = risk_level(task, history, now);
    let consequences = task.consequences.clone().unwrap_or_else(|| {
        default_consequence(risk_level, task.is_overdue(now)).to_string()
    });
    RiskAssessment {
        risk_level,
        consequences: Some(consequences),
    }
}

/// Priority for a task created without one.
///
/// Base 50, adjusted by deadline urgency and by where the task came from.
pub fn suggest_priority(
    due: Option<DateTime<Utc>>,
    source: TaskSource,
    now: DateTime<Utc>,
) -> u8 {
    let mut score: i64 = 50;
    if let Some(due) = due {
        let hours_left = (due - now).num_minutes() as f64 / 60.0;
        score += if hours_left < 0.0 {
            let days_overdue = (now - due).num_days();
            35 + (days_overdue * 2).min(15)
        } else if hours_left < 6.0 {
            30
        } else if hours_left < 24.0 {
            25
        } else if hours_left < 48.0 {
            20
        } else if hours_left < 72.0 {
            15
        } else if hours_left < 168.0 {
            5
        } else {
            -10
        };
    }
    score += match source {
        TaskSource::Manual => 0,
        TaskSource::Document => 5,
        TaskSource::Email => 8,
        TaskSource::Calendar => 10,
    };
    score.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewTask;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
    }

    fn task(priority: i64, due: Option<DateTime<Utc>>, minutes: i64) -> Task {
        Task::from_new(
            NewTask {
                priority: Some(priority),
                due_date: due,
                estimated_duration: Some(minutes),
                ..NewTask::titled("t")
            },
            "u",
            "id".into(),
            0,
            now(),
        )
        .unwrap()
    }

    #[test]
    fn proximity_table() {
        let at = |h: i64| proximity_base(now() + Duration::hours(h), now());
        assert_eq!(at(200), 5);
        assert_eq!(at(168), 10);
        assert_eq!(at(72), 20);
        assert_eq!(at(48), 30);
        assert_eq!(at(24), 40);
        assert_eq!(at(8), 50);
        assert_eq!(at(2), 60);
        assert_eq!(at(0), 60);
        assert_eq!(at(-1), 60);
        assert_eq!(at(-24 * 3), 66);
        assert_eq!(at(-24 * 30), 70);
    }

    #[test]
    fn monotone_as_deadline_approaches() {
        let t = task(50, Some(now() + Duration::days(10)), 30);
        let h = OwnerHistory::default();
        let mut last = 0;
        for hours in 0..=24 * 12 {
            let at = now() + Duration::hours(hours);
            let r = risk_level(&t, &h, at);
            assert!(r >= last, "risk dropped at +{hours}h: {last} -> {r}");
            last = r;
        }
    }

    #[test]
    fn overdue_open_tasks_hit_the_floor() {
        let t = task(0, Some(now() - Duration::minutes(1)), 10);
        assert_eq!(risk_level(&t, &OwnerHistory::default(), now()), OVERDUE_FLOOR);
        let t = task(100, Some(now() - Duration::days(10)), 300);
        assert_eq!(
            risk_level(&t, &OwnerHistory::default(), now()),
            100,
            "70 + 25 + 5, clamped"
        );
    }

    #[test]
    fn undated_scores_below_any_dated_task_of_equal_priority() {
        let h = OwnerHistory::default();
        for p in [0, 20, 50, 80, 100] {
            let undated = risk_level(&task(p, None, 300), &h, now());
            let far = risk_level(&task(p, Some(now() + Duration::days(365)), 10), &h, now());
            assert!(undated < far, "priority {p}: {undated} !< {far}");
        }
    }

    #[test]
    fn history_raises_risk() {
        let t = task(40, Some(now() + Duration::hours(30)), 60);
        let clean = risk_level(&t, &OwnerHistory::default(), now());
        let sloppy = OwnerHistory {
            completed_with_deadline: 4,
            completed_late: 2,
        };
        assert_eq!(risk_level(&t, &sloppy, now()), clean + 8);
    }

    #[test]
    fn history_counts_late_completions() {
        let mut on_time = task(50, Some(now()), 10);
        on_time.transition(TaskStatus::Completed, now() - Duration::hours(1)).unwrap();
        let mut late = task(50, Some(now()), 10);
        late.transition(TaskStatus::Completed, now() + Duration::hours(1)).unwrap();
        let undated = {
            let mut t = task(50, None, 10);
            t.transition(TaskStatus::Completed, now()).unwrap();
            t
        };
        let open = task(50, Some(now()), 10);
        let h = OwnerHistory::from_tasks([&on_time, &late, &undated, &open]);
        assert_eq!(h.completed_with_deadline, 2);
        assert_eq!(h.completed_late, 1);
        assert!((h.missed_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn completed_tasks_are_frozen() {
        let mut t = task(90, Some(now() + Duration::hours(1)), 60);
        t.risk_level = 42;
        t.transition(TaskStatus::Completed, now()).unwrap();
        let later = now() + Duration::days(30);
        assert_eq!(risk_level(&t, &OwnerHistory::default(), later), 42);
    }

    #[test]
    fn user_consequences_are_kept() {
        let mut t = task(50, Some(now() - Duration::hours(2)), 60);
        let s = score(&t, &OwnerHistory::default(), now());
        assert_eq!(
            s.consequences.as_deref(),
            Some("Overdue: further delay compounds the impact.")
        );
        t.consequences = Some("Late fee of 40 EUR".into());
        let s = score(&t, &OwnerHistory::default(), now());
        assert_eq!(s.consequences.as_deref(), Some("Late fee of 40 EUR"));
    }

    #[test]
    fn suggested_priority_rewards_urgency_and_source() {
        assert_eq!(suggest_priority(None, TaskSource::Manual, now()), 50);
        assert_eq!(
            suggest_priority(Some(now() + Duration::hours(3)), TaskSource::Email, now()),
            88
        );
        assert_eq!(
            suggest_priority(Some(now() + Duration::days(30)), TaskSource::Manual, now()),
            40
        );
        assert_eq!(
            suggest_priority(Some(now() - Duration::days(20)), TaskSource::Calendar, now()),
            100
        );
    }
}
