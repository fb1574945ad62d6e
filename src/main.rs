use chrono::Local;
use clap::{Parser, Subcommand};
use rfwatch::alerts::{Alert, AlertEngine, Severity};
use rfwatch::analyzer::BandClassifier;
use rfwatch::pipeline::Pipeline;
use rfwatch::report::{self, SignalReport};
use rfwatch::scheduler::Scheduler;
use rfwatch::serve::{self, ApiState};
use rfwatch::source::SimulatedSource;
use rfwatch::{Config, Database, Repository};
use std::collections::HashSet;
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(name = "rfwatch")]
#[command(author, version, about = "Scheduled RF spectrum monitoring with threshold alerts")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, env = "RFWATCH_DB", global = true)]
    db: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one monitoring session
    Monitor {
        /// Session length in seconds
        #[arg(short, long, default_value = "3600")]
        duration: u64,

        /// Seed the simulated receiver for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Evaluate alert rules against recent signals
    Alerts {
        /// Keep evaluating until Ctrl-C
        #[arg(short, long)]
        watch: bool,

        /// Seconds between passes (default: alerts.interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show recent detected signals
    Signals {
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show recent monitoring sessions
    Sessions {
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Write an activity report (.json, .csv or .txt)
    Report {
        #[arg(short, long)]
        output: PathBuf,

        /// Hours to cover
        #[arg(long, default_value = "24")]
        hours: i64,
    },

    /// Serve the read-only JSON API
    Serve {
        #[arg(short, long, default_value = "3001")]
        port: u16,
    },

    /// Create a backup of the database
    Backup {
        /// Output path for backup (default: rf_scanner_backup_<timestamp>.db)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    let db = match Database::from_config(&config.database) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("Failed to open database {}: {}", config.database.path.display(), e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Command::Monitor { duration, seed } => run_monitor(&config, db, duration, seed),
        Command::Alerts { watch, interval } => run_alerts(&config, db, watch, interval),
        Command::Signals { limit } => list_signals(&db, limit),
        Command::Sessions { limit } => list_sessions(&db, limit),
        Command::Report { output, hours } => write_report(&config, db, output, hours),
        Command::Serve { port } => {
            serve::start(port, ApiState::new(db, config.alerts.clone())).map_err(Into::into)
        }
        Command::Backup { output } => backup(&db, output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "rfwatch=debug" } else { "rfwatch=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(args: &Args) -> Result<Config, rfwatch::error::ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(db) = &args.db {
        config.database.path = db.clone();
    }
    Ok(config)
}

fn run_monitor(config: &Config, db: Arc<Database>, duration: u64, seed: Option<u64>) -> CliResult {
    let mut simulator = config.simulator.clone();
    if seed.is_some() {
        simulator.seed = seed;
    }

    let repo: Arc<dyn Repository> = db;
    let pipeline = Pipeline::new(
        Box::new(SimulatedSource::new(simulator)),
        Box::new(BandClassifier::new()),
        repo.clone(),
        config.acquisition.clone(),
    );
    let mut scheduler = Scheduler::new(repo.clone(), pipeline, config.schedule.clone());

    let handle = scheduler.handle();
    ctrlc::set_handler(move || handle.stop())?;

    // Alerts run on their own cadence next to the session
    let stop_alerts = Arc::new(AtomicBool::new(false));
    let engine = AlertEngine::new(repo, config.alerts.clone());
    let interval = Duration::from_secs(config.alerts.interval_secs);
    let watcher = {
        let stop = stop_alerts.clone();
        thread::spawn(move || {
            let mut seen = HashSet::new();
            engine.watch(interval, &stop, |alerts| {
                for alert in alerts {
                    if seen.insert((alert.message.clone(), alert.timestamp.clone())) {
                        print_alert(alert);
                    }
                }
            });
        })
    };

    eprintln!("\x1b[1mrfwatch - RF Monitor\x1b[0m");
    eprintln!("{}", "─".repeat(70));
    eprintln!("Monitoring for {}s (Ctrl-C to stop)\n", duration);

    let result = scheduler.start(duration);
    stop_alerts.store(true, Ordering::SeqCst);
    join_logged(watcher, "alert watcher");
    let summary = result?;

    eprintln!("{}", "─".repeat(70));
    println!(
        "Session {} {} after {:.0}s: {} scans, {} signals, {} spectra, {} task failures",
        summary.session_id,
        summary.status,
        summary.elapsed_secs,
        summary.total_scans,
        summary.signals_detected,
        summary.spectrum_records,
        summary.task_failures
    );
    Ok(())
}

/// Join a helper thread, reporting a panic instead of dropping it
fn join_logged(handle: thread::JoinHandle<()>, name: &str) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(_) => {
            tracing::error!(thread = name, "thread panicked");
            false
        }
    }
}

fn run_alerts(config: &Config, db: Arc<Database>, watch: bool, interval: Option<u64>) -> CliResult {
    let engine = AlertEngine::new(db, config.alerts.clone());

    if !watch {
        let alerts = engine.evaluate()?;
        if alerts.is_empty() {
            println!("No active alerts");
        }
        alerts.iter().for_each(print_alert);
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let interval = Duration::from_secs(interval.unwrap_or(config.alerts.interval_secs).max(1));
    engine.watch(interval, &stop, |alerts| {
        println!("\n[{}] {} alert(s)", Local::now().format("%H:%M:%S"), alerts.len());
        alerts.iter().for_each(print_alert);
    });
    Ok(())
}

fn print_alert(alert: &Alert) {
    let color = match alert.severity {
        Severity::High => "\x1b[31m",   // Red
        Severity::Medium => "\x1b[33m", // Yellow
        Severity::Low => "\x1b[36m",    // Cyan
    };
    println!(
        "{}{:<8}\x1b[0m {}  {}",
        color,
        format!("[{}]", alert.severity),
        alert.timestamp,
        alert.message
    );
}

fn list_signals(db: &Database, limit: i64) -> CliResult {
    let signals = db.recent_signals(limit)?;
    if signals.is_empty() {
        println!("No signals recorded");
        return Ok(());
    }

    println!(
        "{:<28} {:>7} {:>12} {:>9} {:<10} {:<8} {:>5}",
        "TIMESTAMP", "SESSION", "FREQ (MHz)", "dBm", "TYPE", "MOD", "CONF"
    );
    for s in signals {
        println!(
            "{:<28} {:>7} {:>12.3} {:>9.1} {:<10} {:<8} {:>5.2}",
            s.timestamp,
            s.session_id,
            s.frequency_mhz,
            s.power_dbm,
            s.signal_type,
            s.modulation_type.as_deref().unwrap_or("-"),
            s.confidence
        );
    }
    Ok(())
}

fn list_sessions(db: &Database, limit: i64) -> CliResult {
    let sessions = db.list_sessions(limit)?;
    if sessions.is_empty() {
        println!("No sessions recorded");
        return Ok(());
    }

    println!(
        "{:>5} {:<28} {:<28} {:>8} {:>7} {:>8}",
        "ID", "START", "END", "DURATION", "SCANS", "SIGNALS"
    );
    for s in sessions {
        println!(
            "{:>5} {:<28} {:<28} {:>8} {:>7} {:>8}",
            s.id,
            s.session_start,
            s.session_end.as_deref().unwrap_or("(open)"),
            s.duration_seconds,
            s.total_scans,
            s.signals_detected
        );
    }
    Ok(())
}

fn write_report(config: &Config, db: Arc<Database>, output: PathBuf, hours: i64) -> CliResult {
    let engine = AlertEngine::new(db.clone(), config.alerts.clone());
    let report = SignalReport::build(&db, &engine, hours)?;
    report::generate(&output, &report)?;

    println!(
        "Report written: {} ({} signals, {} alerts over {}h)",
        output.display(),
        report.summary.total_signals,
        report.alerts.len(),
        hours
    );
    Ok(())
}

fn backup(db: &Database, output: Option<PathBuf>) -> CliResult {
    let backup_path = output.unwrap_or_else(|| {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        PathBuf::from(format!("rf_scanner_backup_{}.db", timestamp))
    });

    db.backup_to(&backup_path)?;
    let bytes = std::fs::metadata(&backup_path).map(|m| m.len()).unwrap_or(0);
    println!("Backup created: {} ({} bytes)", backup_path.display(), bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_logged_reports_panic() {
        let ok = thread::spawn(|| {});
        assert!(join_logged(ok, "quiet"));

        let failed = thread::spawn(|| panic!("watcher died"));
        assert!(!join_logged(failed, "noisy"));
    }

    #[test]
    fn test_zero_alert_interval_is_a_config_error() {
        let args = Args::parse_from(["rfwatch", "alerts"]);
        assert!(load_config(&args).is_ok());

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rf.toml");
        std::fs::write(&path, "[alerts]\ninterval_secs = 0\n").unwrap();
        let args = Args::parse_from(["rfwatch", "--config", path.to_str().unwrap(), "alerts"]);
        assert!(load_config(&args).is_err());
    }
}
