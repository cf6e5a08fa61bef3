// crond daemon entry point: collect crontab entries from files,
// included directories, and run-parts directories, register them with
// the runner, and schedule until SIGINT/SIGTERM.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use common::crontab::{CrontabEntry, CrontabParser};
use common::discovery;
use common::runner::Runner;
use common::telemetry;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_logging(&cli.log_level)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting crond");

    // User switching needs root. Decided once, before registration.
    let user_switching = unsafe { libc::geteuid() } == 0;
    if !user_switching {
        warn!("Not running as root, disabling user switching");
    }

    let entries = collect_crontabs(&cli)?;

    let runner = Runner::new(cli.verbose);
    for mut entry in entries {
        if !user_switching {
            entry.user = None;
        }
        if let Err(e) = runner.add_entry(entry) {
            warn!(error = %e, "Rejected crontab entry");
        }
    }

    runner.start();
    wait_for_shutdown_signal().await?;
    runner.stop();

    info!("Terminated");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for SIGINT")?;
            info!("Got signal: SIGINT");
        }
        _ = sigterm.recv() => {
            info!("Got signal: SIGTERM");
        }
    }
    Ok(())
}

/// Assemble entries from all configured sources. Only an explicitly
/// named crontab file that cannot be read is fatal; everything else is
/// skipped with a warning.
fn collect_crontabs(cli: &Cli) -> Result<Vec<CrontabEntry>> {
    let mut entries = Vec::new();

    for path in &cli.crontabs {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("crontab file {}", path.display()))?;
        if discovery::is_valid_crontab(&metadata) {
            entries.extend(parse_crontab_file(path)?);
        } else {
            warn!(path = %path.display(), "Ignoring crontab with wrong mode (not xx22)");
        }
    }

    discovery::find_files_in_paths(&cli.include_cron_d, &mut |path| {
        match parse_crontab_file(path) {
            Ok(batch) => entries.extend(batch),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping included crontab"),
        }
    });

    for run_part in &cli.run_parts {
        match run_part.split_once(':') {
            Some((time_spec, dir)) if !time_spec.is_empty() => {
                collect_run_parts(
                    &format!("@every {}", time_spec),
                    &[PathBuf::from(dir)],
                    &cli.default_user,
                    &mut entries,
                );
            }
            _ => {
                warn!(argument = %run_part, "Ignoring --run-parts because of missing time spec");
            }
        }
    }

    let fixed: [(&str, &Vec<PathBuf>); 5] = [
        ("@every 1m", &cli.run_parts_1min),
        ("@hourly", &cli.run_parts_hourly),
        ("@daily", &cli.run_parts_daily),
        ("@weekly", &cli.run_parts_weekly),
        ("@monthly", &cli.run_parts_monthly),
    ];
    for (spec, dirs) in fixed {
        collect_run_parts(spec, dirs, &cli.default_user, &mut entries);
    }

    Ok(entries)
}

fn collect_run_parts(
    spec: &str,
    dirs: &[PathBuf],
    default_user: &str,
    entries: &mut Vec<CrontabEntry>,
) {
    discovery::find_executables_in_paths(dirs, &mut |path| {
        entries.push(CrontabEntry::new(
            spec,
            Some(default_user.to_string()),
            path.display().to_string(),
        ));
    });
}

fn parse_crontab_file(path: &Path) -> Result<Vec<CrontabEntry>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let entries = CrontabParser::new(file, path.display().to_string()).parse()?;
    Ok(entries)
}
