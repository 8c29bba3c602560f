use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use qvote_core::{
    audit::{self, AuditLog, MemoryAuditLog, SqliteAuditLog},
    config::{LoggingConfig, QvoteConfig},
    rng::RandomSource,
    server::{self, AppState},
    simulation, util, vote,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "qvote",
    version = util::VERSION,
    about = "Quantum-channel security checks for vote transmission (BB84 + E91)"
)]
struct Cli {
    /// Path to the audit log database (SQLite).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Keep the audit log in memory instead of SQLite.
        #[arg(long)]
        in_memory: bool,
    },

    /// Run one standalone simulation and print its trace.
    Simulate {
        /// Enable the intercept-resend adversary.
        #[arg(long)]
        eve: bool,
        #[arg(long)]
        seed: Option<u64>,
        /// Print the full run as JSON instead of the trace.
        #[arg(long)]
        json: bool,
    },

    /// Cast one vote and append it to the audit log.
    CastVote {
        #[arg(long)]
        party: String,
        #[arg(long)]
        eve: bool,
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List recorded vote attempts, oldest first.
    History {
        #[arg(long)]
        json: bool,
    },

    /// Verify the audit log hash chain.
    VerifyLog,

    /// Export the audit log to a JSON file.
    ExportLog {
        #[arg(long)]
        out: PathBuf,
    },

    /// Print version information.
    Version,
}

#[derive(Debug, Serialize)]
struct CastVoteReport<'a> {
    vote_id: &'a str,
    status: String,
    qber: f64,
    chsh_s: f64,
    recorded: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = QvoteConfig::load(cli.config.as_deref()).context("load config")?;
    cfg.apply_env().context("apply environment overrides")?;
    cfg.validate().context("validate config")?;

    init_logging(&cfg.logging)?;

    let db_path = cli.db.unwrap_or(cfg.paths.db.clone());
    util::validate_path(&db_path, "db")?;
    let params = cfg.simulation_params();

    match cli.cmd {
        Commands::Serve { host, port, in_memory } => {
            let host = host.unwrap_or(cfg.server.host.clone());
            let port = port.unwrap_or(cfg.server.port);
            let log: Arc<dyn AuditLog> = if in_memory {
                warn!("audit log is in memory; records are lost on exit");
                Arc::new(MemoryAuditLog::new())
            } else {
                Arc::new(SqliteAuditLog::open(&db_path).context("open audit log")?)
            };
            let state = AppState::new(log, params, cfg.eve_model(false), cfg.simulation.seed);

            let runtime = tokio::runtime::Runtime::new().context("start tokio runtime")?;
            runtime
                .block_on(server::run_server(state, &host, port))
                .context("serve HTTP API")?;
        }

        Commands::Simulate { eve, seed, json } => {
            let mut rng = rng_for(seed.or(cfg.simulation.seed));
            let run = simulation::run(&params, &cfg.eve_model(eve), &mut rng)
                .context("run simulation")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run).context("serialize run")?);
            } else {
                for line in run.trace() {
                    println!("{line}");
                }
            }
        }

        Commands::CastVote { party, eve, seed } => {
            let log = SqliteAuditLog::open(&db_path).context("open audit log")?;
            let mut rng = rng_for(seed.or(cfg.simulation.seed));
            let outcome = vote::cast_vote(&log, &party, &cfg.eve_model(eve), &params, &mut rng)
                .context("cast vote")?;

            let report = CastVoteReport {
                vote_id: &outcome.record.vote_id,
                status: outcome.record.status.to_string(),
                qber: outcome.record.qber,
                chsh_s: outcome.record.chsh_s,
                recorded: outcome.is_recorded(),
            };
            println!("{}", serde_json::to_string_pretty(&report).context("serialize result")?);
            if let Err(e) = outcome.audit {
                return Err(e).context("append vote to audit log");
            }
        }

        Commands::History { json } => {
            let log = SqliteAuditLog::open(&db_path).context("open audit log")?;
            let records = log.read_all().context("read audit log")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records).context("serialize history")?);
            } else {
                for r in &records {
                    println!(
                        "{}  {:<8}  qber={:.4}  S={:.4}  {}",
                        r.timestamp, r.status, r.qber, r.chsh_s, r.vote_id
                    );
                }
            }
        }

        Commands::VerifyLog => {
            let log = SqliteAuditLog::open(&db_path).context("open audit log")?;
            let meta = log.meta().clone();
            info!(log_id = %meta.log_id, schema_version = meta.schema_version, "verifying");
            let n = log.verify_integrity().context("verify integrity")?;
            info!(records = n, "audit log verification passed");
        }

        Commands::ExportLog { out } => {
            util::validate_path(&out, "out")?;
            let log = SqliteAuditLog::open(&db_path).context("open audit log")?;
            let n = audit::export_json(&log, &out).context("export audit log")?;
            info!(out = %out.display(), records = n, "audit log exported");
        }

        Commands::Version => {
            println!("{}", util::version_string());
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rng_for(seed: Option<u64>) -> RandomSource {
    match seed {
        Some(s) => RandomSource::seeded(s),
        None => RandomSource::from_entropy(),
    }
}

fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.level));

    let registry = tracing_subscriber::registry().with(filter);

    if cfg.json_stdout {
        let json_layer = tracing_subscriber::fmt::layer().json();
        registry.with(json_layer).init();
    } else if !cfg.json_log_file.is_empty() {
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.json_log_file)
            .with_context(|| format!("open json log file {}", cfg.json_log_file))?;
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::sync::Mutex::new(log_file));
        let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(file_layer).with(console_layer).init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(console_layer).init();
    }
    Ok(())
}
