//! Cognitive load and burnout analysis.
//!
//! Turns a draft plan into an [`OverloadInfo`]: how full the day is, whether
//! that counts as overloaded, a burnout tier that also looks at the previous
//! days, and regret warnings for high-risk work that is being squeezed out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::plan::PlanEntry;
use crate::risk;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurnoutRisk {
    Low,
    Medium,
    High,
}

impl BurnoutRisk {
    /// One tier up; `High` stays `High`.
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Derived diagnostics for one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverloadInfo {
    /// `total / budget × 100`, one decimal.
    pub load_percentage: f64,
    pub is_overloaded: bool,
    pub burnout_risk: BurnoutRisk,
    pub recommendation: String,
    pub regret_warnings: Vec<String>,
}

pub const RECOMMEND_OVERLOADED: &str = "Consider moving some tasks to tomorrow to avoid burnout.";
pub const RECOMMEND_HIGH: &str =
    "Your day is nearly full. Keep short breaks between tasks and protect your evening.";
pub const RECOMMEND_MEDIUM: &str = "Load looks manageable.";
pub const RECOMMEND_LOW: &str = "Light day ahead: a good moment to get ahead on upcoming deadlines.";

/// Inputs to [`analyze`].
#[derive(Debug, Clone, Copy)]
pub struct LoadInput<'a> {
    pub entries: &'a [PlanEntry],
    pub total_duration: u32,
    pub budget_minutes: u32,
    /// Qualifying tasks that were left out of the plan.
    pub deferred: &'a [&'a Task],
    /// Load percentages of committed plans in the look-back window.
    pub recent_loads: &'a [f64],
    pub now: DateTime<Utc>,
}

pub fn load_percentage(total_minutes: u32, budget_minutes: u32) -> f64 {
    if budget_minutes == 0 {
        return 0.0;
    }
    let pct = f64::from(total_minutes) / f64::from(budget_minutes) * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Burnout tier from today's load, escalated by sustained recent overload.
pub fn burnout_risk(load: f64, recent_loads: &[f64], t: &Thresholds) -> BurnoutRisk {
    let base = if load >= t.burnout_high {
        BurnoutRisk::High
    } else if load >= t.burnout_medium {
        BurnoutRisk::Medium
    } else {
        BurnoutRisk::Low
    };
    if recent_loads.is_empty() {
        return base;
    }
    let overloaded_days = recent_loads
        .iter()
        .filter(|l| **l >= t.overload_percent)
        .count();
    let mean = recent_loads.iter().sum::<f64>() / recent_loads.len() as f64;
    if overloaded_days >= t.sustained_overload_days as usize || mean >= t.burnout_high {
        base.escalate()
    } else {
        base
    }
}

fn recommendation(is_overloaded: bool, burnout: BurnoutRisk) -> &'static str {
    if is_overloaded {
        return RECOMMEND_OVERLOADED;
    }
    match burnout {
        BurnoutRisk::High => RECOMMEND_HIGH,
        BurnoutRisk::Medium => RECOMMEND_MEDIUM,
        BurnoutRisk::Low => RECOMMEND_LOW,
    }
}

/// Regret warnings for high-risk tasks that are deferred, partial, or stuck in
/// an overloaded day.
pub fn regret_warnings(input: &LoadInput<'_>, is_overloaded: bool, t: &Thresholds) -> Vec<String> {
    let mut warnings = Vec::new();
    for entry in input.entries {
        if entry.risk_level < t.high_risk {
            continue;
        }
        if entry.partial {
            warnings.push(format!(
                "Only {} of {} minutes of '{}' fit today. {}",
                entry.scheduled_duration, entry.estimated_duration, entry.title, entry.consequences
            ));
        } else if is_overloaded {
            warnings.push(format!(
                "'{}' is scheduled into an overloaded day. {}",
                entry.title, entry.consequences
            ));
        }
    }
    for task in input.deferred {
        if task.risk_level < t.high_risk {
            continue;
        }
        let consequence = task.consequences.clone().unwrap_or_else(|| {
            risk::default_consequence(task.risk_level, task.is_overdue(input.now)).to_string()
        });
        warnings.push(format!(
            "'{}' did not fit into today's plan. {}",
            task.title, consequence
        ));
    }
    warnings
}

/// Analyze a plan's load.
pub fn analyze(input: &LoadInput<'_>, t: &Thresholds) -> OverloadInfo {
    let load = load_percentage(input.total_duration, input.budget_minutes);
    let is_overloaded = load >= t.overload_percent;
    let burnout = burnout_risk(load, input.recent_loads, t);
    OverloadInfo {
        load_percentage: load,
        is_overloaded,
        burnout_risk: burnout,
        recommendation: recommendation(is_overloaded, burnout).to_string(),
        regret_warnings: regret_warnings(input, is_overloaded, t),
    }
}
