// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # lifeplan
//!
//! A daily planning engine: it scores each task's deadline risk, packs the
//! day's time budget with the most urgent approved tasks, checks the plan for
//! overload and burnout, and raises dismissable suggestions.
//!
//! ## Architecture
//!
//! - **Tasks** (`task`): validated task records, owner-scoped storage
//! - **Risk** (`risk`): deadline proximity, priority and history into a 0-100 score
//! - **Plans** (`plan`): ranking, greedy packing, committed plan registry
//! - **Load** (`load`): load percentage, burnout risk, regret warnings
//! - **Suggestions** (`suggest`): deterministic insight cards with dismissal cooldown
//! - **Storage** (`store`): redb on disk or a dashmap in memory
//! - **Planner** (`planner`): the facade tying it together
//!
//! ## Library usage
//!
//! ```no_run
//! use lifeplan::config::PlannerConfig;
//! use lifeplan::planner::Planner;
//! use lifeplan::session::Session;
//! use lifeplan::task::NewTask;
//!
//! let planner = Planner::in_memory(PlannerConfig::default()).unwrap();
//! let me = Session::new("alice").unwrap();
//! planner.create_task(&me, NewTask::titled("Write report")).unwrap();
//! let plan = planner.regenerate(&me, None).unwrap();
//! println!("{} tasks, {} minutes", plan.tasks.len(), plan.total_duration);
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod load;
pub mod paths;
pub mod plan;
pub mod planner;
pub mod recommend;
pub mod risk;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod settings;
pub mod store;
pub mod suggest;
pub mod task;
