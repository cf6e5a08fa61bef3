// Scheduler concurrency tests: many jobs with independent timers,
// counted through a mock dispatcher under tokio virtual time.

use async_trait::async_trait;
use common::crontab::CrontabEntry;
use common::logger::{CronLogger, NoopLogger};
use common::runner::{Dispatcher, Runner};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct CountingDispatcher {
    counts: Mutex<HashMap<String, usize>>,
}

impl CountingDispatcher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            counts: Mutex::new(HashMap::new()),
        })
    }

    fn count(&self, command: &str) -> usize {
        *self
            .counts
            .lock()
            .unwrap()
            .get(command)
            .unwrap_or(&0)
    }

    fn total(&self) -> usize {
        self.counts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Dispatcher for CountingDispatcher {
    async fn dispatch(&self, entry: &CrontabEntry, _logger: &dyn CronLogger) {
        *self
            .counts
            .lock()
            .unwrap()
            .entry(entry.command.clone())
            .or_insert(0) += 1;
        // Odd-period jobs hang for an hour after counting; their
        // execution time must not influence anyone's dispatch counts.
        if entry.command.starts_with("slow") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

fn test_runner(dispatcher: Arc<dyn Dispatcher>) -> Runner {
    Runner::with_collaborators(Arc::new(NoopLogger), dispatcher)
}

/// Advance virtual time second by second so periodic timers that
/// re-register after each fire keep firing inside the window.
async fn advance_secs(secs: u64) {
    for _ in 0..secs {
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
    }
}

async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

/// 100 jobs with distinct periods, half of them with hour-long
/// executions. Over a bounded window every job fires duration/period
/// times (with one fire of slack), independent of the others.
#[tokio::test(start_paused = true)]
async fn hundred_jobs_fire_independently() {
    const WINDOW_SECS: u64 = 120;

    let dispatcher = CountingDispatcher::new();
    let runner = test_runner(dispatcher.clone());

    for period in 1u64..=100 {
        let command = if period % 2 == 1 {
            format!("slow-{}", period)
        } else {
            format!("fast-{}", period)
        };
        runner
            .add(&format!("@every {}s", period), &command)
            .unwrap();
    }
    assert_eq!(runner.job_count(), 100);

    runner.start();
    advance_secs(WINDOW_SECS).await;
    settle().await;
    runner.stop();

    for period in 1u64..=100 {
        let command = if period % 2 == 1 {
            format!("slow-{}", period)
        } else {
            format!("fast-{}", period)
        };
        let expected = (WINDOW_SECS / period) as i64;
        let actual = dispatcher.count(&command) as i64;
        assert!(
            (actual - expected).abs() <= 1,
            "job {} fired {} times, expected about {}",
            command,
            actual,
            expected
        );
    }
}

/// Stopping immediately after starting dispatches nothing when no job
/// is due yet.
#[tokio::test(start_paused = true)]
async fn stop_immediately_after_start_is_silent() {
    let dispatcher = CountingDispatcher::new();
    let runner = test_runner(dispatcher.clone());

    for period in [60u64, 600, 3600] {
        runner
            .add(&format!("@every {}s", period), &format!("fast-{}", period))
            .unwrap();
    }
    runner.start();
    runner.stop();

    advance_secs(30).await;
    settle().await;

    assert_eq!(dispatcher.total(), 0);
}

/// After stop, pending timers never fire again even across a long
/// window; executions dispatched before stop are unaffected (they were
/// already counted).
#[tokio::test(start_paused = true)]
async fn stop_cancels_future_fires_only() {
    let dispatcher = CountingDispatcher::new();
    let runner = test_runner(dispatcher.clone());
    runner.add("@every 2s", "fast-window").unwrap();

    runner.start();
    advance_secs(5).await;
    settle().await;
    let before = dispatcher.count("fast-window");
    assert!(before >= 1);

    runner.stop();
    advance_secs(20).await;
    settle().await;

    assert_eq!(dispatcher.count("fast-window"), before);
}
