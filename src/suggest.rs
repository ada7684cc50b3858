//! Suggestion generation and the dismissal ledger.
//!
//! Suggestions ("action cards") are regenerated from scratch on every plan
//! commit. Each has a content-derived id:
//!
//! ```text
//! id = hex(sha256(type ‖ 0x1f ‖ cause ‖ 0x1f ‖ fingerprint))[..32]
//! ```
//!
//! `cause` names what triggered the card (a task id, `plan:<date>` or
//! `drafts`); `fingerprint` captures the parameters of that cause. An unchanged
//! situation therefore yields the same ids, and a dismissed id never comes
//! back. When the cause changes materially the fingerprint, and so the id,
//! changes too; such a card is surfaced again unless the same `(type, cause)`
//! was dismissed within the re-trigger cooldown.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Thresholds;
use crate::load::OverloadInfo;
use crate::plan::DailyPlan;
use crate::task::{Task, TaskStatus};

/// Priority below which a task counts as low priority.
const LOW_PRIORITY: u8 = 40;
/// Deadline horizon for "urgent" when deciding on delegation.
const URGENT_WITHIN_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Reschedule,
    RiskMitigation,
    Delegate,
    Drop,
    StalledTask,
    ReviewDrafts,
}

impl SuggestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reschedule => "reschedule",
            Self::RiskMitigation => "risk_mitigation",
            Self::Delegate => "delegate",
            Self::Drop => "drop",
            Self::StalledTask => "stalled_task",
            Self::ReviewDrafts => "review_drafts",
        }
    }
}

/// An insight card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub title: String,
    pub description: String,
    pub action_label: String,
    /// Stable key of the triggering situation.
    pub cause: String,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Suggestion {
    /// `type:cause`, the key the re-trigger cooldown is tracked under.
    pub fn cause_key(&self) -> String {
        cause_key(self.kind, &self.cause)
    }
}

pub fn cause_key(kind: SuggestionKind, cause: &str) -> String {
    format!("{}:{cause}", kind.as_str())
}

/// A recorded dismissal. `cause_key` is known only when the dismissed id was
/// an active suggestion at the time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dismissal {
    pub id: String,
    pub cause_key: Option<String>,
    pub dismissed_at: DateTime<Utc>,
}

pub fn suggestion_id(kind: SuggestionKind, cause: &str, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(cause.as_bytes());
    hasher.update([0x1f]);
    hasher.update(fingerprint.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(32);
    id
}

/// Text and identity of a card before it is stamped.
struct Card<'a> {
    kind: SuggestionKind,
    cause: String,
    fingerprint: &'a str,
    task_id: Option<&'a str>,
    title: String,
    description: String,
    action_label: &'a str,
}

impl Card<'_> {
    fn at(self, now: DateTime<Utc>) -> Suggestion {
        Suggestion {
            id: suggestion_id(self.kind, &self.cause, self.fingerprint),
            kind: self.kind,
            title: self.title,
            description: self.description,
            action_label: self.action_label.to_string(),
            cause: self.cause,
            task_id: self.task_id.map(str::to_string),
            created_at: now,
        }
    }
}

fn due_fingerprint(task: &Task) -> String {
    task.due_date
        .map(|d| d.timestamp().to_string())
        .unwrap_or_else(|| "none".into())
}

/// Everything a generation pass looks at.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionContext<'a> {
    pub date: NaiveDate,
    pub plan: &'a DailyPlan,
    pub overload: &'a OverloadInfo,
    /// All of the owner's tasks.
    pub tasks: &'a [Task],
    pub now: DateTime<Utc>,
    pub thresholds: &'a Thresholds,
}

/// Generate the full candidate set, deduplicated by id.
pub fn generate(ctx: &SuggestionContext<'_>) -> Vec<Suggestion> {
    let SuggestionContext {
        date,
        plan,
        overload,
        tasks,
        now,
        thresholds,
    } = *ctx;
    let find = |id: &str| tasks.iter().find(|t| t.id == id);
    let mut out = Vec::new();

    if overload.is_overloaded {
        let mut deferred: Vec<&str> = plan.deferred.iter().map(String::as_str).collect();
        deferred.sort_unstable();
        let movable = plan.deferred.len() + plan.tasks.iter().filter(|e| e.partial).count();
        out.push(
            Card {
                kind: SuggestionKind::Reschedule,
                cause: format!("plan:{date}"),
                fingerprint: &deferred.join(","),
                task_id: None,
                title: "Your day is overloaded".into(),
                description: format!(
                    "Planned work is at {}% of your daily budget. Moving {} task(s) to \
                     tomorrow keeps the day realistic.",
                    overload.load_percentage,
                    movable.max(1)
                ),
                action_label: "Reschedule",
            }
            .at(now),
        );
    }

    // High-risk work that is deferred or squeezed.
    for entry in plan.tasks.iter().filter(|e| e.partial) {
        if let Some(task) = find(&entry.task_id).filter(|t| t.risk_level >= thresholds.high_risk) {
            out.push(risk_card(task, Squeeze::Partial, &entry.consequences, now));
        }
    }
    for task in plan.deferred.iter().filter_map(|id| find(id)) {
        if task.risk_level >= thresholds.high_risk {
            let consequence = task.consequences.clone().unwrap_or_else(|| {
                crate::risk::default_consequence(task.risk_level, task.is_overdue(now)).to_string()
            });
            out.push(risk_card(task, Squeeze::Deferred, &consequence, now));
        }
    }

    // Urgent but unimportant work on an overloaded day.
    if overload.is_overloaded {
        for task in plan.tasks.iter().filter_map(|e| find(&e.task_id)) {
            let urgent = task
                .due_date
                .is_some_and(|due| due - now <= Duration::hours(URGENT_WITHIN_HOURS));
            if urgent && task.priority < LOW_PRIORITY {
                out.push(
                    Card {
                        kind: SuggestionKind::Delegate,
                        cause: task.id.clone(),
                        fingerprint: &format!("{}|{}", due_fingerprint(task), task.priority),
                        task_id: Some(&task.id),
                        title: format!("Delegate '{}'", task.title),
                        description: "This is due soon but low priority. Handing it off \
                                      frees time for what matters today."
                            .into(),
                        action_label: "Delegate",
                    }
                    .at(now),
                );
            }
        }
    }

    // Low-value backlog.
    for task in plan.deferred.iter().filter_map(|id| find(id)) {
        if task.due_date.is_none() && task.priority < LOW_PRIORITY {
            out.push(
                Card {
                    kind: SuggestionKind::Drop,
                    cause: task.id.clone(),
                    fingerprint: &task.priority.to_string(),
                    task_id: Some(&task.id),
                    title: format!("Consider dropping '{}'", task.title),
                    description: "It has no deadline, low priority and keeps getting pushed back."
                        .into(),
                    action_label: "Drop task",
                }
                .at(now),
            );
        }
    }

    let stalled_after = Duration::days(i64::from(thresholds.stalled_after_days));
    for task in tasks {
        if task.status == TaskStatus::InProgress && now - task.updated_at >= stalled_after {
            out.push(
                Card {
                    kind: SuggestionKind::StalledTask,
                    cause: task.id.clone(),
                    fingerprint: &task.updated_at.timestamp().to_string(),
                    task_id: Some(&task.id),
                    title: format!("'{}' has stalled", task.title),
                    description: format!(
                        "No progress for {} days. Break it into a smaller next step or \
                         reschedule it.",
                        (now - task.updated_at).num_days()
                    ),
                    action_label: "Review task",
                }
                .at(now),
            );
        }
    }

    // Drafts waiting at the approval gate.
    let mut drafts: Vec<&str> = tasks
        .iter()
        .filter(|t| !t.is_approved && t.is_open())
        .map(|t| t.id.as_str())
        .collect();
    if !drafts.is_empty() {
        drafts.sort_unstable();
        out.push(
            Card {
                kind: SuggestionKind::ReviewDrafts,
                cause: "drafts".into(),
                fingerprint: &drafts.join(","),
                task_id: None,
                title: format!("{} drafted task(s) awaiting approval", drafts.len()),
                description: "Tasks extracted from your email and documents are not planned \
                              until you approve them."
                    .into(),
                action_label: "Review drafts",
            }
            .at(now),
        );
    }

    let mut seen = HashSet::new();
    out.retain(|s| seen.insert(s.id.clone()));
    out
}

#[derive(Debug, Clone, Copy)]
enum Squeeze {
    Partial,
    Deferred,
}

fn risk_card(task: &Task, squeeze: Squeeze, consequence: &str, now: DateTime<Utc>) -> Suggestion {
    let (tag, what) = match squeeze {
        Squeeze::Partial => ("partial", "only partly fits today"),
        Squeeze::Deferred => ("deferred", "did not fit into today's plan"),
    };
    Card {
        kind: SuggestionKind::RiskMitigation,
        cause: task.id.clone(),
        fingerprint: &format!(
            "{}|{}|{}|{tag}",
            due_fingerprint(task),
            task.priority,
            task.risk_level / 10
        ),
        task_id: Some(&task.id),
        title: format!("Protect '{}'", task.title),
        description: format!("This high-risk task {what}. {consequence}"),
        action_label: "Block time",
    }
    .at(now)
}

/// Whether a candidate should be shown given the dismissal ledger.
pub fn is_visible(
    suggestion: &Suggestion,
    dismissals: &[Dismissal],
    now: DateTime<Utc>,
    cooldown_hours: u32,
) -> bool {
    let cooldown = Duration::hours(i64::from(cooldown_hours));
    let key = suggestion.cause_key();
    !dismissals.iter().any(|d| {
        d.id == suggestion.id
            || (d.cause_key.as_deref() == Some(key.as_str()) && now - d.dismissed_at < cooldown)
    })
}

/// Drop dismissed and cooling-down candidates.
pub fn visible(
    candidates: Vec<Suggestion>,
    dismissals: &[Dismissal],
    now: DateTime<Utc>,
    cooldown_hours: u32,
) -> Vec<Suggestion> {
    candidates
        .into_iter()
        .filter(|s| is_visible(s, dismissals, now, cooldown_hours))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::BurnoutRisk;
    use crate::plan::{PlanEntry, PriorityBreakdown};
    use crate::task::{NewTask, TaskSource};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 5, 8, 0, 0).unwrap()
    }

    fn task(id: &str, priority: i64, due: Option<DateTime<Utc>>) -> Task {
        Task::from_new(
            NewTask {
                priority: Some(priority),
                due_date: due,
                ..NewTask::titled(id)
            },
            "u",
            id.into(),
            0,
            now(),
        )
        .unwrap()
    }

    fn entry(task: &Task, booked: u32) -> PlanEntry {
        PlanEntry {
            task_id: task.id.clone(),
            title: task.title.clone(),
            priority: task.priority,
            risk_level: task.risk_level,
            consequences: "c".into(),
            estimated_duration: task.estimated_duration,
            scheduled_duration: booked,
            scheduled_time: now(),
            partial: booked < task.estimated_duration,
            source: TaskSource::Manual,
        }
    }

    fn plan(entries: Vec<PlanEntry>, deferred: Vec<String>) -> DailyPlan {
        DailyPlan {
            date: now().date_naive(),
            generation: 1,
            generated_at: now(),
            budget_minutes: 480,
            total_duration: entries.iter().map(|e| e.scheduled_duration).sum(),
            priority_breakdown: PriorityBreakdown::of(&entries),
            tasks: entries,
            deferred,
            ai_recommendations: None,
            overload_info: None,
        }
    }

    fn overload(is_overloaded: bool) -> OverloadInfo {
        OverloadInfo {
            load_percentage: if is_overloaded { 100.0 } else { 40.0 },
            is_overloaded,
            burnout_risk: BurnoutRisk::Low,
            recommendation: String::new(),
            regret_warnings: vec![],
        }
    }

    fn run(plan: &DailyPlan, over: &OverloadInfo, tasks: &[Task]) -> Vec<Suggestion> {
        let t = Thresholds::default();
        generate(&SuggestionContext {
            date: plan.date,
            plan,
            overload: over,
            tasks,
            now: now(),
            thresholds: &t,
        })
    }

    fn drop_card(fingerprint: &str) -> Suggestion {
        Card {
            kind: SuggestionKind::Drop,
            cause: "t1".into(),
            fingerprint,
            task_id: Some("t1"),
            title: "x".into(),
            description: "y".into(),
            action_label: "Drop task",
        }
        .at(now())
    }

    #[test]
    fn ids_are_stable_and_hex() {
        let a = suggestion_id(SuggestionKind::Drop, "t1", "10");
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, suggestion_id(SuggestionKind::Drop, "t1", "10"));
        assert_ne!(a, suggestion_id(SuggestionKind::Drop, "t1", "11"));
        assert_ne!(a, suggestion_id(SuggestionKind::Delegate, "t1", "10"));
    }

    #[test]
    fn calm_day_yields_nothing() {
        let t = task("a", 50, None);
        let p = plan(vec![entry(&t, 60)], vec![]);
        assert!(run(&p, &overload(false), &[t]).is_empty());
    }

    #[test]
    fn overloaded_day_yields_expected_kinds() {
        let mut risky = task("risky", 90, Some(now() + Duration::hours(20)));
        risky.risk_level = 85;
        risky.estimated_duration = 300;
        let chore = task("chore", 20, Some(now() + Duration::hours(10)));
        let backlog = task("backlog", 10, None);
        let p = plan(
            vec![entry(&chore, 60), entry(&risky, 200)],
            vec![backlog.id.clone()],
        );
        let tasks = [risky, chore, backlog];
        let kinds: Vec<_> = run(&p, &overload(true), &tasks)
            .into_iter()
            .map(|s| s.kind)
            .collect();
        assert_eq!(
            kinds,
            [
                SuggestionKind::Reschedule,
                SuggestionKind::RiskMitigation,
                SuggestionKind::Delegate,
                SuggestionKind::Drop,
            ]
        );
    }

    #[test]
    fn regeneration_is_idempotent() {
        let backlog = task("backlog", 10, None);
        let p = plan(vec![], vec![backlog.id.clone()]);
        let tasks = [backlog];
        let first = run(&p, &overload(true), &tasks);
        let second = run(&p, &overload(true), &tasks);
        assert_eq!(
            first.iter().map(|s| &s.id).collect::<Vec<_>>(),
            second.iter().map(|s| &s.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn stalled_and_drafts() {
        let mut stuck = task("stuck", 50, None);
        stuck.transition(TaskStatus::InProgress, now() - Duration::days(6)).unwrap();
        let mut draft = task("draft", 50, None);
        draft.is_approved = false;
        let p = plan(vec![], vec![]);
        let out = run(&p, &overload(false), &[stuck, draft]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, SuggestionKind::StalledTask);
        assert!(out[0].description.contains("6 days"));
        assert_eq!(out[1].kind, SuggestionKind::ReviewDrafts);
        assert_eq!(out[1].title, "1 drafted task(s) awaiting approval");
    }

    #[test]
    fn dismissed_ids_stay_hidden() {
        let s = drop_card("10");
        let d = Dismissal {
            id: s.id.clone(),
            cause_key: None,
            dismissed_at: now() - Duration::days(400),
        };
        assert!(!is_visible(&s, &[d], now(), 24));
    }

    #[test]
    fn changed_cause_respects_cooldown() {
        let old = drop_card("10");
        let changed = drop_card("5");
        assert_ne!(old.id, changed.id);
        let d = Dismissal {
            id: old.id.clone(),
            cause_key: Some(old.cause_key()),
            dismissed_at: now() - Duration::hours(2),
        };
        assert!(!is_visible(&changed, std::slice::from_ref(&d), now(), 24));
        assert!(is_visible(&changed, &[d], now() + Duration::hours(23), 24));
    }
}
