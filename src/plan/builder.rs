//! Daily plan builder: rank, pack, schedule.
//!
//! Qualifying tasks (approved, not completed) are ranked by
//! `(urgency tier, priority desc, risk desc, created_at, seq)`. Risk for ranking
//! is evaluated at the plan's anchor instant, so rebuilding the same day later
//! produces the same order.
//!
//! Packing is greedy first-fit: a task that does not fit the remaining budget
//! is skipped and smaller tasks further down still get their chance. Leftover
//! budget can go to the best skipped task as a partial block. Entries are then
//! laid out back-to-back from the day start.

use std::cmp::Reverse;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use super::{PlanEntry, PlanParams};
use crate::risk::{self, OwnerHistory};
use crate::task::Task;

/// Builder output before load analysis and commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub entries: Vec<PlanEntry>,
    /// Ids of qualifying tasks left out, in rank order.
    pub deferred: Vec<String>,
    pub total_duration: u32,
    pub anchor: DateTime<Utc>,
}

// ── Ranking ───────────────────────────────────────────────────────────────

/// Coarse urgency by local calendar days until due.
///
/// 0 overdue, 1 today, 2 tomorrow, 3 within a week, 4 later, 5 no deadline.
pub fn urgency_tier(due: Option<DateTime<Utc>>, date: NaiveDate, tz: Tz) -> u8 {
    let Some(due) = due else {
        return 5;
    };
    let days = (due.with_timezone(&tz).date_naive() - date).num_days();
    match days {
        d if d < 0 => 0,
        0 => 1,
        1 => 2,
        2..=7 => 3,
        _ => 4,
    }
}

/// Qualifying tasks in plan order.
pub fn rank<'a>(tasks: &'a [Task], history: &OwnerHistory, params: &PlanParams) -> Vec<&'a Task> {
    let anchor = params.anchor();
    let mut keyed: Vec<_> = tasks
        .iter()
        .filter(|t| t.qualifies_for_plan())
        .map(|t| {
            let key = (
                urgency_tier(t.due_date, params.date, params.timezone),
                Reverse(t.priority),
                Reverse(risk::risk_level(t, history, anchor)),
                t.created_at,
                t.seq,
            );
            (key, t)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, t)| t).collect()
}

// ── Packing ───────────────────────────────────────────────────────────────

/// Build a draft plan from the owner's tasks.
///
/// Tasks that do not qualify are ignored. `risk_level` on each entry is taken
/// from the task as given; callers refresh it first.
pub fn build(tasks: &[Task], history: &OwnerHistory, params: &PlanParams) -> Draft {
    let ranked = rank(tasks, history, params);
    let anchor = params.anchor();

    // (rank index, booked minutes)
    let mut admitted: Vec<(usize, u32)> = Vec::new();
    let mut skipped: Vec<usize> = Vec::new();
    let mut remaining = params.budget_minutes;

    for (idx, task) in ranked.iter().enumerate() {
        if task.estimated_duration <= remaining {
            remaining -= task.estimated_duration;
            admitted.push((idx, task.estimated_duration));
        } else {
            skipped.push(idx);
        }
    }

    if params.allow_partial
        && remaining > 0
        && remaining >= params.min_partial_minutes
        && !skipped.is_empty()
    {
        let idx = skipped.remove(0);
        admitted.push((idx, remaining));
        remaining = 0;
    }
    admitted.sort_by_key(|(idx, _)| *idx);

    let mut cursor = anchor;
    let mut entries = Vec::with_capacity(admitted.len());
    for (idx, minutes) in admitted {
        let task = ranked[idx];
        entries.push(PlanEntry {
            task_id: task.id.clone(),
            title: task.title.clone(),
            priority: task.priority,
            risk_level: task.risk_level,
            consequences: task.consequences.clone().unwrap_or_else(|| {
                risk::default_consequence(task.risk_level, task.is_overdue(anchor)).to_string()
            }),
            estimated_duration: task.estimated_duration,
            scheduled_duration: minutes,
            scheduled_time: cursor,
            partial: minutes < task.estimated_duration,
            source: task.source,
        });
        cursor += Duration::minutes(i64::from(minutes));
    }

    let total_duration = params.budget_minutes - remaining;
    debug_assert_eq!(
        total_duration,
        entries.iter().map(|e| e.scheduled_duration).sum::<u32>()
    );

    Draft {
        entries,
        deferred: skipped.into_iter().map(|idx| ranked[idx].id.clone()).collect(),
        total_duration,
        anchor,
    }
}
