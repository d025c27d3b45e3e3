//! Host binary for the correl detection engine.
//!
//! Reads newline-delimited JSON events from stdin, runs them through the
//! correlation service, and writes alerts as JSON lines to stdout. Logs
//! go to stderr so the alert stream stays machine-readable.
//!
//! Exit codes: 0 on clean shutdown, 2 when rule validation fails, 1 on
//! other fatal errors.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use correl_engine::{
    Alert, AlertSink, Correlator, CorrelatorConfig, EngineError, Service, SinkStatus,
};
use correl_rules::{RuleDocument, parse_rules_file, validate_rules};

#[derive(Parser)]
#[command(name = "correl")]
#[command(about = "Correlate security event streams against detection rules")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load rules and correlate NDJSON events from stdin until EOF
    Start {
        /// Path to a YAML rule document
        #[arg(short, long)]
        rules: PathBuf,

        /// Window-store retention horizon in seconds
        #[arg(long, default_value_t = 3600)]
        retention: u64,

        /// Time allowed to drain queued events at shutdown, in seconds
        #[arg(long, default_value_t = 5)]
        drain_deadline: u64,

        /// Pretty-print alert JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a rule document and report errors without starting
    ReloadRules {
        /// Path to a YAML rule document
        #[arg(short, long)]
        rules: PathBuf,
    },

    /// Correlate NDJSON events from stdin, then print final stats as JSON
    Stats {
        /// Path to a YAML rule document
        #[arg(short, long)]
        rules: PathBuf,

        /// Window-store retention horizon in seconds
        #[arg(long, default_value_t = 3600)]
        retention: u64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Start {
            rules,
            retention,
            drain_deadline,
            pretty,
        } => cmd_start(rules, retention, drain_deadline, pretty),
        Commands::ReloadRules { rules } => cmd_reload_rules(rules),
        Commands::Stats { rules, retention } => cmd_stats(rules, retention),
    };
    process::exit(code);
}

// ---------------------------------------------------------------------------
// Rule loading shared by all subcommands
// ---------------------------------------------------------------------------

/// Parse a rule document, or exit-code 1 for file-level failures.
fn read_rules(path: &PathBuf) -> Result<RuleDocument, i32> {
    match parse_rules_file(path) {
        Ok(document) => Ok(document),
        Err(e) => {
            eprintln!("error: failed to read rules from {}: {e}", path.display());
            Err(1)
        }
    }
}

/// Build a loaded correlator, or the exit code to fail with (2 when any
/// enabled rule is invalid).
fn load_correlator(path: &PathBuf, config: CorrelatorConfig) -> Result<Correlator, i32> {
    let document = read_rules(path)?;
    let mut correlator = Correlator::new(config);
    match correlator.load_rules(document) {
        Ok(count) => {
            eprintln!("loaded {count} rule(s) from {}", path.display());
            Ok(correlator)
        }
        Err(EngineError::RuleValidation(errors)) => {
            eprintln!("error: rule validation failed:");
            for error in &errors {
                eprintln!("  - {error}");
            }
            Err(2)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Err(1)
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

/// Alert sink that writes JSON lines to stdout.
struct StdoutSink {
    pretty: bool,
}

impl AlertSink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    fn emit(&mut self, alert: &Alert) -> SinkStatus {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(alert)
        } else {
            serde_json::to_string(alert)
        };
        match rendered {
            Ok(line) => {
                let mut stdout = io::stdout().lock();
                if writeln!(stdout, "{line}").is_err() {
                    return SinkStatus::Dropped;
                }
                SinkStatus::Acknowledged
            }
            Err(_) => SinkStatus::Dropped,
        }
    }
}

fn cmd_start(rules: PathBuf, retention: u64, drain_deadline: u64, pretty: bool) -> i32 {
    let config = CorrelatorConfig {
        retention_window: retention,
        ..CorrelatorConfig::default()
    };
    let mut correlator = match load_correlator(&rules, config) {
        Ok(c) => c,
        Err(code) => return code,
    };
    correlator.register_sink(Box::new(StdoutSink { pretty }));

    let service = Service::spawn_with_deadline(correlator, Duration::from_secs(drain_deadline));
    pump_stdin(&service);

    // EOF on stdin is the stop signal: drain the queue, then report.
    let stats = service.stop();
    eprintln!(
        "processed {} event(s), {} rejected, {} alert(s)",
        stats.events_processed, stats.events_rejected, stats.alerts_generated
    );
    0
}

fn cmd_reload_rules(rules: PathBuf) -> i32 {
    let document = match read_rules(&rules) {
        Ok(d) => d,
        Err(code) => return code,
    };

    let mut errors = document.errors;
    errors.extend(validate_rules(&document.rules));
    if errors.is_empty() {
        println!("{} rule(s) OK", document.rules.len());
        0
    } else {
        eprintln!("error: rule validation failed:");
        for error in &errors {
            eprintln!("  - {error}");
        }
        2
    }
}

fn cmd_stats(rules: PathBuf, retention: u64) -> i32 {
    let config = CorrelatorConfig {
        retention_window: retention,
        ..CorrelatorConfig::default()
    };
    let correlator = match load_correlator(&rules, config) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let service = Service::spawn(correlator);
    pump_stdin(&service);

    let stats = service.stop();
    match serde_json::to_string_pretty(&stats) {
        Ok(rendered) => {
            println!("{rendered}");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Event pump
// ---------------------------------------------------------------------------

/// Feed stdin NDJSON into the service queue until EOF. Lines that are not
/// valid JSON are logged and skipped.
fn pump_stdin(service: &Service) {
    let sender = service.sender();
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to read stdin, stopping intake");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value) => {
                if sender.send(value).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "skipping invalid JSON line");
            }
        }
    }
}

