//! Benchmarks for plan building.

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lifeplan::plan::{builder, PlanParams};
use lifeplan::risk::{self, OwnerHistory};
use lifeplan::task::{NewTask, Task};

fn tasks(n: usize) -> Vec<Task> {
    let now = Utc.with_ymd_and_hms(2025, 3, 3, 7, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let due = (i % 3 != 0).then(|| now + Duration::hours((i % 96) as i64));
            Task::from_new(
                NewTask {
                    priority: Some((i * 37 % 101) as i64),
                    estimated_duration: Some(15 + (i * 13 % 180) as i64),
                    due_date: due,
                    ..NewTask::titled(format!("task {i}"))
                },
                "bench",
                format!("t{i:05}"),
                i as u64,
                now,
            )
            .unwrap()
        })
        .collect()
}

fn params() -> PlanParams {
    PlanParams {
        date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
        timezone: Tz::Europe__Berlin,
        day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        budget_minutes: 480,
        allow_partial: true,
        min_partial_minutes: 15,
    }
}

fn bench_build(c: &mut Criterion) {
    let params = params();
    for n in [50usize, 1_000] {
        let tasks = tasks(n);
        let history = OwnerHistory::from_tasks(&tasks);
        c.bench_function(&format!("plan_build_{n}"), |bench| {
            bench.iter(|| black_box(builder::build(&tasks, &history, &params)))
        });
    }
}

fn bench_risk(c: &mut Criterion) {
    let tasks = tasks(1_000);
    let history = OwnerHistory::from_tasks(&tasks);
    let now = Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap();
    c.bench_function("risk_level_1000", |bench| {
        bench.iter(|| {
            tasks
                .iter()
                .map(|t| risk::risk_level(t, &history, now) as u32)
                .sum::<u32>()
        })
    });
}

criterion_group!(benches, bench_build, bench_risk);
criterion_main!(benches);
