use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use dispenser_core::{DoseScheduler, FunnelState, PressCfg, PressClassifier, Schedule, TriggerMode};

fn tune(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    // BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p dispenser_core --bench scheduler
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
}

/// One week of wall-clock minutes starting Monday 00:00.
fn week_of_minutes() -> Vec<NaiveDateTime> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    (0..10_080)
        .map(|m| start + ChronoDuration::minutes(m))
        .collect()
}

pub fn bench_scheduler(c: &mut Criterion) {
    let mut g = c.benchmark_group("scheduler");
    tune(&mut g);

    let minutes = week_of_minutes();
    for mode in [TriggerMode::Exact, TriggerMode::CatchUp] {
        let sched = DoseScheduler::new(mode);
        g.bench_function(format!("week_{mode:?}"), |b| {
            b.iter_batched(
                || FunnelState::new(Schedule::new(2, 9, 0).unwrap_or(Schedule::UNSET)),
                |mut st| {
                    let mut fired = 0u32;
                    for &now in &minutes {
                        if sched.tick(&mut st, black_box(now)) == dispenser_core::SchedulerAction::Fire {
                            fired += 1;
                        }
                    }
                    black_box(fired);
                },
                BatchSize::SmallInput,
            )
        });
    }
    g.finish();
}

/// Level trace of repeated single and double presses at a 50 ms tick.
fn press_trace() -> Vec<bool> {
    let single = [true, true, false, false, false, false, false, false, false, false, false, false, false, false];
    let double = [true, true, false, false, false, false, false, true, true, false, false, false, false, false];
    single
        .iter()
        .chain(double.iter())
        .copied()
        .cycle()
        .take(28 * 500)
        .collect()
}

pub fn bench_press(c: &mut Criterion) {
    let mut g = c.benchmark_group("press");
    tune(&mut g);

    let trace = press_trace();
    g.bench_function("classify_trace", |b| {
        b.iter_batched(
            || PressClassifier::new(PressCfg::default()),
            |mut pc| {
                let mut events = 0u32;
                for (i, &level) in trace.iter().enumerate() {
                    if pc.poll(black_box(level), i as u64 * 50) != dispenser_core::PressEvent::None {
                        events += 1;
                    }
                }
                black_box(events);
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(benches, bench_scheduler, bench_press);
criterion_main!(benches);
