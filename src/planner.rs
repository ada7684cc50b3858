//! Planner facade: the public API of lifeplan.
//!
//! The `Planner` owns the task store, the plan registry, the recommendation
//! source and the clock, and wires them into the operations the HTTP server
//! and the CLI expose. Every operation takes an explicit [`Session`].
//!
//! A rebuild runs: refresh risk → build draft → analyze load → recommend →
//! generate suggestions → commit. The commit is one storage batch holding the
//! plan, every changed task and the new suggestion set; the in-memory plan
//! pointer is swapped only after it succeeds.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::config::PlannerConfig;
use crate::error::{PlanError, PlannerResult};
use crate::load::{self, LoadInput};
use crate::plan::registry::PlanRegistry;
use crate::plan::{self, DailyPlan, PlanParams, PriorityBreakdown, builder};
use crate::recommend::{self, RecommendationSource};
use crate::risk::{self, OwnerHistory};
use crate::session::Session;
use crate::settings::{self, SettingsPatch, UserSettings};
use crate::store::{Storage, WriteOp};
use crate::suggest::{self, Dismissal, Suggestion, SuggestionContext};
use crate::task::store::TaskStore;
use crate::task::{NewTask, Task, TaskFilter, TaskPage, TaskPatch, TaskStatus};

const GENERATION_KEY: &[u8] = b"meta/plan_generation";

fn suggestions_key(user: &str) -> Vec<u8> {
    format!("sugg/{user}").into_bytes()
}

fn dismissal_prefix(user: &str) -> Vec<u8> {
    format!("dismiss/{user}/").into_bytes()
}

fn dismissal_key(user: &str, id: &str) -> Vec<u8> {
    format!("dismiss/{user}/{id}").into_bytes()
}

/// Summary for `lifeplan info` and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerInfo {
    pub version: String,
    pub persistent: bool,
    pub task_count: usize,
    pub last_generation: u64,
    pub recommender: String,
}

/// The daily planning engine.
pub struct Planner {
    config: PlannerConfig,
    storage: Arc<Storage>,
    tasks: TaskStore,
    registry: PlanRegistry,
    recommender: Box<dyn RecommendationSource>,
    clock: Arc<dyn Clock>,
}

impl Planner {
    /// Create a planner over `storage` with the wall clock and the configured
    /// recommendation source.
    pub fn new(config: PlannerConfig, storage: Storage) -> PlannerResult<Self> {
        config.validate()?;
        let storage = Arc::new(storage);
        let tasks = TaskStore::open(Arc::clone(&storage))?;

        let stored: u64 = storage.get_value(GENERATION_KEY)?.unwrap_or(0);
        let newest_plan = storage
            .scan_values::<DailyPlan>(b"plan/")?
            .iter()
            .map(|p| p.generation)
            .max()
            .unwrap_or(0);
        let registry = PlanRegistry::new(stored.max(newest_plan));

        tracing::info!(
            persistent = storage.is_persistent(),
            last_generation = registry.last_generation(),
            ai = config.ai.enabled,
            "initializing planner"
        );

        Ok(Self {
            recommender: recommend::from_config(&config.ai),
            config,
            storage,
            tasks,
            registry,
            clock: Arc::new(SystemClock),
        })
    }

    /// Memory-only planner.
    pub fn in_memory(config: PlannerConfig) -> PlannerResult<Self> {
        Self::new(config, Storage::memory_only())
    }

    /// Planner persisting under `data_dir`.
    pub fn open(config: PlannerConfig, data_dir: &Path) -> PlannerResult<Self> {
        Self::new(config, Storage::with_persistence(data_dir)?)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_recommender(mut self, source: Box<dyn RecommendationSource>) -> Self {
        self.recommender = source;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn info(&self) -> PlannerResult<PlannerInfo> {
        Ok(PlannerInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            persistent: self.storage.is_persistent(),
            task_count: self.tasks.count_all()?,
            last_generation: self.registry.last_generation(),
            recommender: self.recommender.name().to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub fn create_task(&self, session: &Session, new: NewTask) -> PlannerResult<Task> {
        let owner = session.user_id();
        let lock = self.tasks.owner_lock(owner);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        let now = self.now();
        let id = uuid::Uuid::new_v4().to_string();
        let mut task = Task::from_new(new, owner, id, self.tasks.next_seq(), now)?;
        let history = OwnerHistory::from_tasks(&self.tasks.list(owner)?);
        task.risk_level = score_as_open(&task, &history, now);
        self.tasks.insert(&task)?;

        tracing::info!(
            user = %session,
            task = %task.id,
            priority = task.priority,
            risk = task.risk_level,
            approved = task.is_approved,
            "task created"
        );
        Ok(task)
    }

    /// A task with its risk level as of now. Completed tasks keep their
    /// frozen value.
    pub fn get_task(&self, session: &Session, id: &str) -> PlannerResult<Task> {
        let owner = session.user_id();
        let mut task = self.tasks.get(owner, id)?;
        if task.is_open() {
            let history = OwnerHistory::from_tasks(&self.tasks.list(owner)?);
            task.risk_level = risk::risk_level(&task, &history, self.now());
        }
        Ok(task)
    }

    pub fn list_tasks(&self, session: &Session, filter: &TaskFilter) -> PlannerResult<TaskPage> {
        let owner = session.user_id();
        let mut page = self.tasks.query(owner, filter)?;
        if page.tasks.iter().any(Task::is_open) {
            let history = OwnerHistory::from_tasks(&self.tasks.list(owner)?);
            let now = self.now();
            for task in &mut page.tasks {
                task.risk_level = risk::risk_level(task, &history, now);
            }
        }
        Ok(page)
    }

    /// Partial update. Risk is rescored when deadline, priority, duration or
    /// status changed and the task is still open.
    pub fn update_task(&self, session: &Session, id: &str, patch: TaskPatch) -> PlannerResult<Task> {
        self.modify_task(session, id, |task, now| {
            let risk_inputs_changed = task.apply_patch(patch, now)?;
            Ok(risk_inputs_changed)
        })
    }

    /// Pass the approval gate so the task becomes eligible for planning.
    pub fn approve_task(&self, session: &Session, id: &str) -> PlannerResult<Task> {
        self.modify_task(session, id, |task, now| {
            task.approve(now)?;
            Ok(false)
        })
    }

    /// Complete a task, freezing its risk level.
    pub fn complete_task(&self, session: &Session, id: &str) -> PlannerResult<Task> {
        self.modify_task(session, id, |task, now| {
            task.transition(TaskStatus::Completed, now)?;
            Ok(false)
        })
    }

    pub fn delete_task(&self, session: &Session, id: &str) -> PlannerResult<()> {
        let owner = session.user_id();
        let lock = self.tasks.owner_lock(owner);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        self.tasks.delete(owner, id)?;
        tracing::info!(user = %session, task = %id, "task deleted");
        Ok(())
    }

    fn modify_task(
        &self,
        session: &Session,
        id: &str,
        f: impl FnOnce(&mut Task, DateTime<Utc>) -> PlannerResult<bool>,
    ) -> PlannerResult<Task> {
        let owner = session.user_id();
        let lock = self.tasks.owner_lock(owner);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        let now = self.now();
        let mut task = self.tasks.get(owner, id)?;
        let before = task.status;
        let rescore = f(&mut task, now)?;
        if rescore && task.is_open() {
            let history = OwnerHistory::from_tasks(&self.tasks.list(owner)?);
            task.risk_level = risk::risk_level(&task, &history, now);
        }
        self.tasks.save(&task)?;

        tracing::debug!(
            user = %session,
            task = %task.id,
            from = %before,
            to = %task.status,
            risk = task.risk_level,
            "task updated"
        );
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn settings(&self, session: &Session) -> PlannerResult<UserSettings> {
        Ok(self
            .storage
            .get_value(&settings::settings_key(session.user_id()))?
            .unwrap_or_else(|| UserSettings::from_defaults(&self.config.planning)))
    }

    pub fn update_settings(
        &self,
        session: &Session,
        patch: SettingsPatch,
    ) -> PlannerResult<UserSettings> {
        let mut current = self.settings(session)?;
        current.apply(patch, self.now())?;
        self.storage
            .put_value(&settings::settings_key(session.user_id()), &current)?;
        tracing::info!(user = %session, budget = current.daily_budget_minutes, tz = %current.timezone, "settings saved");
        Ok(current)
    }

    // -----------------------------------------------------------------------
    // Plans
    // -----------------------------------------------------------------------

    /// "Today" in the user's timezone.
    pub fn today_date(&self, session: &Session) -> PlannerResult<NaiveDate> {
        let tz = self.settings(session)?.tz()?;
        Ok(plan::today_in(tz, self.now()))
    }

    /// Today's committed plan.
    pub fn today(&self, session: &Session) -> PlannerResult<Arc<DailyPlan>> {
        let date = self.today_date(session)?;
        self.plan_for(session, date)
    }

    /// The committed plan for `date`. Never builds one.
    pub fn plan_for(&self, session: &Session, date: NaiveDate) -> PlannerResult<Arc<DailyPlan>> {
        let user = session.user_id();
        if let Some(plan) = self.registry.current(user, date) {
            return Ok(plan);
        }
        match self.storage.get_value::<DailyPlan>(&plan::plan_key(user, date))? {
            Some(plan) => Ok(self.registry.install(user, plan)),
            None => Err(PlanError::NotFound {
                date: date.to_string(),
            }
            .into()),
        }
    }

    /// Rebuild and commit the plan for `date` (default: today).
    ///
    /// Concurrent rebuilds of the same (user, date) wait for each other.
    pub fn regenerate(
        &self,
        session: &Session,
        date: Option<NaiveDate>,
    ) -> PlannerResult<Arc<DailyPlan>> {
        let user = session.user_id();
        let settings = self.settings(session)?;
        let tz = settings.tz()?;
        let now = self.now();
        let date = date.unwrap_or_else(|| plan::today_in(tz, now));
        let params = PlanParams {
            date,
            timezone: tz,
            day_start: settings.start_time()?,
            budget_minutes: settings.daily_budget_minutes,
            allow_partial: settings.allow_partial,
            min_partial_minutes: self.config.planning.min_partial_minutes,
        };

        let lock = self.registry.build_lock(user, date);
        let _build = lock.lock().unwrap_or_else(|p| p.into_inner());

        let mut tasks = self.tasks.list(user)?;
        let history = OwnerHistory::from_tasks(&tasks);
        for task in &mut tasks {
            task.risk_level = risk::risk_level(task, &history, now);
        }

        let draft = builder::build(&tasks, &history, &params);
        let mut plan = DailyPlan {
            date,
            generation: self.registry.next_generation(),
            generated_at: now,
            budget_minutes: params.budget_minutes,
            priority_breakdown: PriorityBreakdown::of(&draft.entries),
            total_duration: draft.total_duration,
            tasks: draft.entries,
            deferred: draft.deferred,
            ai_recommendations: None,
            overload_info: None,
        };

        let recent_loads = self.recent_loads(user, date)?;
        let deferred: Vec<&Task> = plan
            .deferred
            .iter()
            .filter_map(|id| tasks.iter().find(|t| &t.id == id))
            .collect();
        let overload = load::analyze(
            &LoadInput {
                entries: &plan.tasks,
                total_duration: plan.total_duration,
                budget_minutes: plan.budget_minutes,
                deferred: &deferred,
                recent_loads: &recent_loads,
                now,
            },
            &self.config.thresholds,
        );
        plan.overload_info = Some(overload);
        plan.ai_recommendations = Some(recommend::recommend_or_fallback(
            self.recommender.as_ref(),
            &plan,
        ));

        let suggestions = match self.next_suggestions(user, &plan, &tasks, now) {
            Ok(next) => Some(next),
            Err(e) => {
                tracing::warn!(user = %session, error = %e, "suggestion generation failed, keeping previous set");
                None
            }
        };

        let plan = self.commit(user, plan, suggestions, now)?;
        tracing::info!(
            user = %session,
            %date,
            generation = plan.generation,
            tasks = plan.tasks.len(),
            deferred = plan.deferred.len(),
            total = plan.total_duration,
            load = plan.load_percentage().unwrap_or(0.0),
            "plan committed"
        );
        Ok(plan)
    }

    /// Load percentages of committed plans in the look-back window before `date`.
    fn recent_loads(&self, user: &str, date: NaiveDate) -> PlannerResult<Vec<f64>> {
        let window = i64::from(self.config.thresholds.history_window_days);
        let from = date - Duration::days(window);
        let plans: Vec<DailyPlan> = self.storage.scan_values(&plan::plan_prefix(user))?;
        Ok(plans
            .iter()
            .filter(|p| p.date >= from && p.date < date)
            .filter_map(DailyPlan::load_percentage)
            .collect())
    }

    /// The new suggestion set, plus ledger entries for ids dismissed before
    /// they were first generated, now carrying their cause key.
    fn next_suggestions(
        &self,
        user: &str,
        plan: &DailyPlan,
        tasks: &[Task],
        now: DateTime<Utc>,
    ) -> PlannerResult<NextSuggestions> {
        let Some(overload) = plan.overload_info.as_ref() else {
            return Ok(NextSuggestions::default());
        };
        let previous: Vec<Suggestion> = self
            .storage
            .get_value(&suggestions_key(user))?
            .unwrap_or_default();
        let mut fresh = suggest::generate(&SuggestionContext {
            date: plan.date,
            plan,
            overload,
            tasks,
            now,
            thresholds: &self.config.thresholds,
        });
        for s in &mut fresh {
            if let Some(prev) = previous.iter().find(|p| p.id == s.id) {
                s.created_at = prev.created_at;
            }
        }

        let resolved = self
            .storage
            .scan_values::<Dismissal>(&dismissal_prefix(user))?
            .into_iter()
            .filter(|d| d.cause_key.is_none())
            .filter_map(|d| {
                let s = fresh.iter().find(|s| s.id == d.id)?;
                Some(Dismissal {
                    cause_key: Some(s.cause_key()),
                    ..d
                })
            })
            .collect();
        Ok(NextSuggestions {
            set: fresh,
            resolved,
        })
    }

    /// Persist the plan, task placement and suggestions in one batch, then
    /// publish the plan.
    fn commit(
        &self,
        user: &str,
        mut plan: DailyPlan,
        suggestions: Option<NextSuggestions>,
        now: DateTime<Utc>,
    ) -> PlannerResult<Arc<DailyPlan>> {
        let lock = self.tasks.owner_lock(user);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        // Re-read under the owner lock so edits made during the build survive.
        let current = self.tasks.list(user)?;
        let dropped = plan.retain_tasks(|id| {
            current
                .iter()
                .any(|t| t.id == id && t.status != TaskStatus::Completed)
        });
        if dropped > 0 {
            tracing::debug!(user, dropped, "tasks closed during build left out of plan");
        }
        let history = OwnerHistory::from_tasks(&current);
        let mut ops = Vec::new();
        for task in &current {
            let scheduled = plan.entry(&task.id).map(|e| e.scheduled_time);
            let risk_level = risk::risk_level(task, &history, now);
            if task.scheduled_time != scheduled || task.risk_level != risk_level {
                let mut updated = task.clone();
                updated.scheduled_time = scheduled;
                updated.risk_level = risk_level;
                ops.push(TaskStore::save_op(&updated)?);
            }
        }
        ops.push(WriteOp::put_value(plan::plan_key(user, plan.date), &plan)?);
        ops.push(WriteOp::put_value(
            GENERATION_KEY,
            &self.registry.last_generation(),
        )?);
        if let Some(next) = &suggestions {
            ops.push(WriteOp::put_value(suggestions_key(user), &next.set)?);
            for d in &next.resolved {
                ops.push(WriteOp::put_value(dismissal_key(user, &d.id), d)?);
            }
        }
        self.storage.apply(&ops)?;

        Ok(self.registry.install(user, plan))
    }

    // -----------------------------------------------------------------------
    // Suggestions
    // -----------------------------------------------------------------------

    /// Active suggestions: the latest generated set minus dismissed ids and
    /// causes still cooling down.
    pub fn suggestions(&self, session: &Session) -> PlannerResult<Vec<Suggestion>> {
        let user = session.user_id();
        let set: Vec<Suggestion> = self
            .storage
            .get_value(&suggestions_key(user))?
            .unwrap_or_default();
        let dismissals = self.dismissals(session)?;
        Ok(suggest::visible(
            set,
            &dismissals,
            self.now(),
            self.config.thresholds.retrigger_cooldown_hours,
        ))
    }

    /// Record a dismissal. Idempotent; unknown ids are accepted.
    pub fn dismiss_suggestion(&self, session: &Session, id: &str) -> PlannerResult<()> {
        let user = session.user_id();
        let key = dismissal_key(user, id);
        if self.storage.get(&key)?.is_some() {
            return Ok(());
        }
        let active: Vec<Suggestion> = self
            .storage
            .get_value(&suggestions_key(user))?
            .unwrap_or_default();
        let dismissal = Dismissal {
            id: id.to_string(),
            cause_key: active.iter().find(|s| s.id == id).map(Suggestion::cause_key),
            dismissed_at: self.now(),
        };
        self.storage.put_value(&key, &dismissal)?;
        tracing::info!(user = %session, suggestion = %id, known = dismissal.cause_key.is_some(), "suggestion dismissed");
        Ok(())
    }

    pub fn dismissals(&self, session: &Session) -> PlannerResult<Vec<Dismissal>> {
        Ok(self
            .storage
            .scan_values(&dismissal_prefix(session.user_id()))?)
    }
}

/// Output of a suggestion pass, written in the plan commit.
#[derive(Debug, Default)]
struct NextSuggestions {
    set: Vec<Suggestion>,
    resolved: Vec<Dismissal>,
}

/// Score a task as if it were open, so tasks created already completed still
/// carry a meaningful frozen value.
fn score_as_open(task: &Task, history: &OwnerHistory, now: DateTime<Utc>) -> u8 {
    if task.is_open() {
        return risk::risk_level(task, history, now);
    }
    let mut open = task.clone();
    open.status = TaskStatus::Pending;
    risk::risk_level(&open, history, now)
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("persistent", &self.storage.is_persistent())
            .field("registry", &self.registry)
            .field("recommender", &self.recommender.name())
            .finish()
    }
}
