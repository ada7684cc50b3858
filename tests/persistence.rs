//! Persistence and recovery tests.
//!
//! These verify that tasks, committed plans, suggestions, dismissals, settings
//! and the generation counter survive a planner restart (close + reopen).

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use lifeplan::clock::{Clock, FixedClock};
use lifeplan::config::PlannerConfig;
use lifeplan::planner::Planner;
use lifeplan::session::Session;
use lifeplan::settings::SettingsPatch;
use lifeplan::task::{NewTask, TaskFilter, TaskStatus};

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 9, 1, 7, 0, 0).unwrap(),
    ))
}

fn persistent_planner(dir: &std::path::Path, clock: &Arc<FixedClock>) -> Planner {
    Planner::open(PlannerConfig::default(), dir)
        .unwrap()
        .with_clock(Arc::clone(clock) as Arc<dyn Clock>)
}

fn me() -> Session {
    Session::new("alice").unwrap()
}

#[test]
fn tasks_and_plans_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let clock = clock();

    let (task_id, generation, scheduled) = {
        let planner = persistent_planner(dir.path(), &clock);
        let t = planner
            .create_task(&me(), NewTask {
                estimated_duration: Some(90),
                due_date: Some(clock.now() + Duration::days(1)),
                ..NewTask::titled("Quarterly review")
            })
            .unwrap();
        let plan = planner.regenerate(&me(), None).unwrap();
        (t.id.clone(), plan.generation, plan.entry(&t.id).unwrap().scheduled_time)
    };

    let planner = persistent_planner(dir.path(), &clock);
    let task = planner.get_task(&me(), &task_id).unwrap();
    assert_eq!(task.title, "Quarterly review");
    assert_eq!(task.scheduled_time, Some(scheduled));

    let plan = planner.today(&me()).unwrap();
    assert_eq!(plan.generation, generation);
    assert_eq!(plan.entry(&task_id).unwrap().scheduled_time, scheduled);

    let next = planner.regenerate(&me(), None).unwrap();
    assert!(next.generation > generation);
}

#[test]
fn dismissals_and_settings_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let clock = clock();

    let dismissed = {
        let planner = persistent_planner(dir.path(), &clock);
        planner
            .update_settings(&me(), SettingsPatch {
                daily_budget_minutes: Some(240),
                timezone: Some("Europe/Berlin".into()),
                ..SettingsPatch::default()
            })
            .unwrap();
        planner
            .create_task(&me(), NewTask {
                estimated_duration: Some(300),
                ..NewTask::titled("Long haul")
            })
            .unwrap();
        planner.regenerate(&me(), None).unwrap();
        let active = planner.suggestions(&me()).unwrap();
        assert!(!active.is_empty());
        let id = active[0].id.clone();
        planner.dismiss_suggestion(&me(), &id).unwrap();
        id
    };

    let planner = persistent_planner(dir.path(), &clock);
    let settings = planner.settings(&me()).unwrap();
    assert_eq!(settings.daily_budget_minutes, 240);
    assert_eq!(settings.timezone, "Europe/Berlin");
    assert_eq!(planner.today(&me()).unwrap().budget_minutes, 240);

    assert!(planner.dismissals(&me()).unwrap().iter().any(|d| d.id == dismissed));
    assert!(planner.suggestions(&me()).unwrap().iter().all(|s| s.id != dismissed));
}

#[test]
fn completion_and_deletion_are_durable() {
    let dir = tempfile::TempDir::new().unwrap();
    let clock = clock();

    let (done, gone) = {
        let planner = persistent_planner(dir.path(), &clock);
        let done = planner.create_task(&me(), NewTask::titled("done")).unwrap();
        let gone = planner.create_task(&me(), NewTask::titled("gone")).unwrap();
        planner.complete_task(&me(), &done.id).unwrap();
        planner.delete_task(&me(), &gone.id).unwrap();
        (done.id, gone.id)
    };

    let planner = persistent_planner(dir.path(), &clock);
    assert_eq!(
        planner.get_task(&me(), &done).unwrap().status,
        TaskStatus::Completed
    );
    assert!(planner.get_task(&me(), &gone).is_err());
    let page = planner.list_tasks(&me(), &TaskFilter::default()).unwrap();
    assert_eq!(page.total, 1);

    // New tasks keep sorting after the ones created before the restart.
    let later = planner.create_task(&me(), NewTask::titled("later")).unwrap();
    let old = planner.get_task(&me(), &done).unwrap();
    assert!(later.seq > old.seq);
    assert_eq!(planner.info().unwrap().task_count, 2);
    assert!(planner.info().unwrap().persistent);
}
