//! Committed plans and rebuild coordination.
//!
//! Readers get the current `Arc<DailyPlan>` for a (user, date) without taking
//! any lock. Rebuilders take the per-key build mutex, so concurrent rebuilds
//! of the same day run one after the other; different days and users proceed
//! in parallel. A plan becomes visible only through [`PlanRegistry::install`],
//! after its durable write has committed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use dashmap::DashMap;

use super::DailyPlan;

type PlanKey = (String, NaiveDate);

/// In-memory view of committed plans plus build locks and generation ids.
pub struct PlanRegistry {
    current: DashMap<PlanKey, Arc<DailyPlan>>,
    build_locks: DashMap<PlanKey, Arc<Mutex<()>>>,
    last_generation: AtomicU64,
}

impl PlanRegistry {
    /// Create a registry whose next generation follows `last_generation`.
    pub fn new(last_generation: u64) -> Self {
        Self {
            current: DashMap::new(),
            build_locks: DashMap::new(),
            last_generation: AtomicU64::new(last_generation),
        }
    }

    /// The build mutex for (user, date).
    pub fn build_lock(&self, user: &str, date: NaiveDate) -> Arc<Mutex<()>> {
        Arc::clone(
            self.build_locks
                .entry((user.to_string(), date))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Allocate a fresh generation id.
    pub fn next_generation(&self) -> u64 {
        self.last_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn last_generation(&self) -> u64 {
        self.last_generation.load(Ordering::SeqCst)
    }

    /// The committed plan for (user, date), if cached.
    pub fn current(&self, user: &str, date: NaiveDate) -> Option<Arc<DailyPlan>> {
        self.current
            .get(&(user.to_string(), date))
            .map(|r| Arc::clone(r.value()))
    }

    /// Publish a committed plan. Older generations never replace newer ones.
    pub fn install(&self, user: &str, plan: DailyPlan) -> Arc<DailyPlan> {
        let plan = Arc::new(plan);
        let mut slot = self
            .current
            .entry((user.to_string(), plan.date))
            .or_insert_with(|| Arc::clone(&plan));
        if slot.generation < plan.generation {
            *slot = Arc::clone(&plan);
        }
        Arc::clone(slot.value())
    }

    /// Number of cached plans.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

impl std::fmt::Debug for PlanRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanRegistry")
            .field("cached", &self.len())
            .field("last_generation", &self.last_generation())
            .finish()
    }
}
