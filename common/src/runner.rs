// Execution runner: owns the registered jobs, drives one independent
// timer task per job, and dispatches due jobs as detached executions.
//
// Timing and execution are separate concerns: a dispatch is spawned
// fire-and-forget, so a slow or hung command never delays its own job's
// next fire nor any other job. `stop()` cancels pending timers only; it
// neither waits for nor terminates in-flight child processes.

use crate::crontab::CrontabEntry;
use crate::errors::ScheduleError;
use crate::expression::CronExpression;
use crate::logger::{CronLogger, TracingLogger};
use crate::privilege;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// One registered job: a crontab entry bound to its parsed expression
/// and per-job timer state.
pub struct Job {
    entry: CrontabEntry,
    expression: CronExpression,
    reboot_fired: AtomicBool,
    next_fire: Mutex<Option<DateTime<Local>>>,
}

impl Job {
    fn new(entry: CrontabEntry, expression: CronExpression) -> Self {
        Self {
            entry,
            expression,
            reboot_fired: AtomicBool::new(false),
            next_fire: Mutex::new(None),
        }
    }

    pub fn entry(&self) -> &CrontabEntry {
        &self.entry
    }

    /// The most recently computed trigger instant.
    pub fn next_fire(&self) -> Option<DateTime<Local>> {
        *lock_recover(&self.next_fire)
    }

    /// Compute and record the next trigger instant after `from`.
    ///
    /// `@reboot` is due exactly once, at the first computation (runner
    /// start); every later request yields `AlreadyFired`.
    pub fn compute_next_fire(&self, from: DateTime<Local>) -> Result<DateTime<Local>, ScheduleError> {
        if matches!(self.expression, CronExpression::Reboot)
            && self.reboot_fired.swap(true, Ordering::SeqCst)
        {
            return Err(ScheduleError::AlreadyFired);
        }
        let next = self.expression.next_after(from)?;
        *lock_recover(&self.next_fire) = Some(next);
        Ok(next)
    }
}

/// Dispatch seam: turns a due entry into one detached execution. Tests
/// substitute counting implementations.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, entry: &CrontabEntry, logger: &dyn CronLogger);
}

/// Production dispatcher: assembles credentials and environment, runs
/// `sh -c <command>`, and reports the outcome with the combined
/// stdout/stderr of the child.
pub struct ShellDispatcher;

#[async_trait]
impl Dispatcher for ShellDispatcher {
    async fn dispatch(&self, entry: &CrontabEntry, logger: &dyn CronLogger) {
        let context = match privilege::prepare(entry.user.as_deref(), &entry.env) {
            Ok(context) => context,
            Err(e) => {
                logger.cronjob_exec_failed(entry, "", &e.to_string());
                return;
            }
        };

        logger.cronjob_exec(entry);

        let mut command = privilege::build_command(&entry.command, &context);
        match command.output().await {
            Ok(output) => {
                if output.status.success() {
                    logger.cronjob_exec_success(entry);
                } else {
                    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                    combined.push_str(&String::from_utf8_lossy(&output.stderr));
                    logger.cronjob_exec_failed(
                        entry,
                        combined.trim_end(),
                        &output.status.to_string(),
                    );
                }
            }
            Err(e) => {
                logger.cronjob_exec_failed(entry, "", &e.to_string());
            }
        }
    }
}

/// The scheduler. Jobs may be registered before or concurrently with
/// `start()`; jobs added while running begin their timer immediately.
pub struct Runner {
    jobs: Mutex<Vec<Arc<Job>>>,
    running: Arc<AtomicBool>,
    shutdown: broadcast::Sender<()>,
    logger: Arc<dyn CronLogger>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Runner {
    pub fn new(verbose: bool) -> Self {
        Self::with_collaborators(
            Arc::new(TracingLogger::new(verbose)),
            Arc::new(ShellDispatcher),
        )
    }

    pub fn with_collaborators(
        logger: Arc<dyn CronLogger>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            jobs: Mutex::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            logger,
            dispatcher,
        }
    }

    /// Register a job that runs as the invoking process's identity.
    pub fn add(&self, spec: &str, command: &str) -> Result<(), ScheduleError> {
        self.add_entry(CrontabEntry::new(spec, None, command))
    }

    /// Register a job bound to a target user.
    pub fn add_with_user(
        &self,
        spec: &str,
        user: &str,
        command: &str,
    ) -> Result<(), ScheduleError> {
        self.add_entry(CrontabEntry::new(spec, Some(user.to_string()), command))
    }

    /// Register a parsed crontab entry. The spec is validated here; an
    /// entry that fails to parse never becomes a job.
    pub fn add_entry(&self, entry: CrontabEntry) -> Result<(), ScheduleError> {
        let expression = CronExpression::parse(&entry.spec)?;
        self.logger.cronjob_add(&entry);
        let job = Arc::new(Job::new(entry, expression));

        let mut jobs = lock_recover(&self.jobs);
        jobs.push(job.clone());
        if self.running.load(Ordering::SeqCst) {
            self.spawn_job(job);
        }
        Ok(())
    }

    /// Begin scheduling. Non-blocking: one timer task is spawned per
    /// registered job and control returns immediately. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) {
        let jobs = lock_recover(&self.jobs);
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(jobs = jobs.len(), "Starting runner");
        for job in jobs.iter() {
            self.spawn_job(job.clone());
        }
    }

    /// Cancel all pending timers. Idempotent. In-flight executions are
    /// left to run to completion on their own.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!("Stopping runner");
        let _ = self.shutdown.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn job_count(&self) -> usize {
        lock_recover(&self.jobs).len()
    }

    fn spawn_job(&self, job: Arc<Job>) {
        let shutdown = self.shutdown.subscribe();
        let running = self.running.clone();
        let dispatcher = self.dispatcher.clone();
        let logger = self.logger.clone();
        tokio::spawn(run_job(job, shutdown, running, dispatcher, logger));
    }
}

/// Per-job timer loop: wait until the next fire, dispatch detached,
/// recompute. Exits on shutdown or when the schedule can yield no
/// further instants.
async fn run_job(
    job: Arc<Job>,
    mut shutdown: broadcast::Receiver<()>,
    running: Arc<AtomicBool>,
    dispatcher: Arc<dyn Dispatcher>,
    logger: Arc<dyn CronLogger>,
) {
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }

        let now = Local::now();
        let next = match job.compute_next_fire(now) {
            Ok(next) => next,
            Err(ScheduleError::AlreadyFired) => return,
            Err(e) => {
                warn!(
                    spec = %job.entry().spec,
                    command = %job.entry().command,
                    error = %e,
                    "Job schedule yields no further fires"
                );
                return;
            }
        };

        let wait = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                let dispatcher = dispatcher.clone();
                let logger = logger.clone();
                let entry = job.entry().clone();
                tokio::spawn(async move {
                    dispatcher.dispatch(&entry, logger.as_ref()).await;
                });
            }
            _ = shutdown.recv() => {
                debug!(spec = %job.entry().spec, "Job timer cancelled");
                return;
            }
        }
    }
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
