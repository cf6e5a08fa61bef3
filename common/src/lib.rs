// Common library for the crond daemon: crontab parsing, cron expression
// evaluation, the execution runner, and privilege/environment assembly.

pub mod crontab;
pub mod discovery;
pub mod errors;
pub mod expression;
pub mod logger;
pub mod privilege;
pub mod runner;
pub mod telemetry;
