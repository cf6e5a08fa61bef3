// Logging seam for scheduler events. The runner reports through this
// trait so tests can observe dispatches without a real logger.

use crate::crontab::CrontabEntry;
use tracing::{error, info};

/// Callbacks the runner invokes around job registration and execution.
pub trait CronLogger: Send + Sync {
    /// A job was registered with the runner.
    fn cronjob_add(&self, entry: &CrontabEntry);
    /// A job is about to be executed (verbose only).
    fn cronjob_exec(&self, entry: &CrontabEntry);
    /// An execution exited with status zero (verbose only).
    fn cronjob_exec_success(&self, entry: &CrontabEntry);
    /// An execution failed to spawn or exited non-zero. Always reported,
    /// with the combined stdout/stderr captured from the child.
    fn cronjob_exec_failed(&self, entry: &CrontabEntry, output: &str, error: &str);
}

/// Production logger backed by `tracing`. `cronjob_exec` and
/// `cronjob_exec_success` are gated on verbose mode; additions and
/// failures are always emitted.
pub struct TracingLogger {
    verbose: bool,
}

impl TracingLogger {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl CronLogger for TracingLogger {
    fn cronjob_add(&self, entry: &CrontabEntry) {
        info!("add: {}", entry.describe());
    }

    fn cronjob_exec(&self, entry: &CrontabEntry) {
        if self.verbose {
            info!("exec: {}", entry.describe());
        }
    }

    fn cronjob_exec_success(&self, entry: &CrontabEntry) {
        if self.verbose {
            info!("ok: {}", entry.describe());
        }
    }

    fn cronjob_exec_failed(&self, entry: &CrontabEntry, output: &str, error: &str) {
        error!(
            command = %entry.command,
            output = %output,
            error = %error,
            "failed cronjob"
        );
    }
}

/// Silent logger for tests.
pub struct NoopLogger;

impl CronLogger for NoopLogger {
    fn cronjob_add(&self, _entry: &CrontabEntry) {}
    fn cronjob_exec(&self, _entry: &CrontabEntry) {}
    fn cronjob_exec_success(&self, _entry: &CrontabEntry) {}
    fn cronjob_exec_failed(&self, _entry: &CrontabEntry, _output: &str, _error: &str) {}
}
