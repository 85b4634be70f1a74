//! utm: drone traffic management server CLI.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod access;
mod broker;
mod db;
mod hub;
mod pipeline;
mod registry;
mod web;

use crate::db::{AirspaceDirectory, Db, Fixtures};
use crate::hub::BroadcastHub;
use crate::pipeline::IngestPipeline;
use crate::registry::AirspaceRegistry;

#[derive(Parser)]
#[command(name = "utm", version, about = "Drone traffic management — telemetry ingest, violation tracking, live feeds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingest + live feed server
    Serve {
        /// Bind address for the HTTP/WebSocket server
        #[arg(long, default_value = "127.0.0.1:8080", env = "UTM_BIND")]
        bind: String,

        /// SQLite database path
        #[arg(long, default_value = "data/utm.db", env = "UTM_DB")]
        db_path: String,

        /// Path deviation corridor half-width, in degrees
        #[arg(long, default_value_t = utm_core::geometry::DEFAULT_DEVIATION_BUFFER_DEG)]
        deviation_buffer: f64,

        /// Seconds between airspace snapshot refreshes
        #[arg(long, default_value_t = 5)]
        refresh_secs: u64,

        /// Maximum broker messages processed concurrently
        #[arg(long, default_value_t = 256)]
        max_in_flight: usize,

        /// Read broker messages as `<topic> <json>` lines from stdin
        #[arg(long)]
        broker_stdin: bool,
    },

    /// Replay a file of recorded broker messages through the pipeline
    Replay {
        /// Path to a file with one `<topic> <json>` message per line
        file: PathBuf,

        #[arg(long, default_value = "data/utm.db", env = "UTM_DB")]
        db_path: String,

        #[arg(long, default_value_t = utm_core::geometry::DEFAULT_DEVIATION_BUFFER_DEG)]
        deviation_buffer: f64,

        #[arg(long, default_value_t = 256)]
        max_in_flight: usize,
    },

    /// Load a JSON fixtures file (users, drones, zones, paths)
    Seed {
        file: PathBuf,

        #[arg(long, default_value = "data/utm.db", env = "UTM_DB")]
        db_path: String,
    },

    /// Show database statistics
    Stats {
        #[arg(long, default_value = "data/utm.db", env = "UTM_DB")]
        db_path: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            bind,
            db_path,
            deviation_buffer,
            refresh_secs,
            max_in_flight,
            broker_stdin,
        } => {
            cmd_serve(
                bind,
                db_path,
                deviation_buffer,
                refresh_secs,
                max_in_flight,
                broker_stdin,
            )
            .await
        }
        Commands::Replay {
            file,
            db_path,
            deviation_buffer,
            max_in_flight,
        } => cmd_replay(file, db_path, deviation_buffer, max_in_flight).await,
        Commands::Seed { file, db_path } => cmd_seed(file, db_path),
        Commands::Stats { db_path } => cmd_stats(db_path),
    }
}

fn open_db(db_path: &str) -> Option<Db> {
    match Db::open(db_path) {
        Ok(db) => Some(db),
        Err(e) => {
            error!(db_path, error = %e, "cannot open database");
            None
        }
    }
}

fn build_pipeline(db: &Db, deviation_buffer: f64) -> (Arc<IngestPipeline>, Arc<AirspaceRegistry>) {
    let directory: Arc<dyn AirspaceDirectory> = Arc::new(db.clone());
    let registry = Arc::new(AirspaceRegistry::new());
    let pipeline = Arc::new(IngestPipeline::new(
        directory,
        Arc::new(db.clone()),
        registry.clone(),
        Arc::new(BroadcastHub::new()),
        deviation_buffer,
    ));
    (pipeline, registry)
}

async fn cmd_serve(
    bind: String,
    db_path: String,
    deviation_buffer: f64,
    refresh_secs: u64,
    max_in_flight: usize,
    broker_stdin: bool,
) -> ExitCode {
    let Some(db) = open_db(&db_path) else {
        return ExitCode::FAILURE;
    };

    let (pipeline, registry) = build_pipeline(&db, deviation_buffer);
    registry.reload_from(pipeline.directory().as_ref()).await;
    tokio::spawn(registry.clone().run(
        pipeline.directory().clone(),
        Duration::from_secs(refresh_secs),
    ));

    if broker_stdin {
        let (tx, rx) = tokio::sync::mpsc::channel(1024);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if let Some(message) = broker::parse_line(&line) {
                    if tx.blocking_send(message).is_err() {
                        break;
                    }
                }
            }
        });
        tokio::spawn(broker::consume(rx, pipeline.clone(), max_in_flight));
    }

    let state = Arc::new(web::AppState {
        pipeline,
        access: Arc::new(db.clone()),
        db,
    });
    if let Err(e) = web::serve(state, &bind).await {
        error!(error = %e, "server failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn cmd_replay(
    file: PathBuf,
    db_path: String,
    deviation_buffer: f64,
    max_in_flight: usize,
) -> ExitCode {
    let Some(db) = open_db(&db_path) else {
        return ExitCode::FAILURE;
    };

    let messages: Vec<_> = match std::fs::read_to_string(&file) {
        Ok(content) => content.lines().filter_map(broker::parse_line).collect(),
        Err(e) => {
            error!(file = %file.display(), error = %e, "cannot read replay file");
            return ExitCode::FAILURE;
        }
    };
    let total = messages.len();

    let (pipeline, registry) = build_pipeline(&db, deviation_buffer);
    registry.reload_from(pipeline.directory().as_ref()).await;

    let (tx, rx) = tokio::sync::mpsc::channel(256);
    tokio::spawn(async move {
        for message in messages {
            if tx.send(message).await.is_err() {
                break;
            }
        }
    });
    broker::consume(rx, pipeline, max_in_flight).await;

    println!("Replay complete: {} messages from {}", total, file.display());
    print_stats(&db);
    ExitCode::SUCCESS
}

fn cmd_seed(file: PathBuf, db_path: String) -> ExitCode {
    let Some(db) = open_db(&db_path) else {
        return ExitCode::FAILURE;
    };

    let fixtures: Fixtures = match std::fs::read_to_string(&file)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
    {
        Ok(fixtures) => fixtures,
        Err(e) => {
            error!(file = %file.display(), error = %e, "cannot load fixtures");
            return ExitCode::FAILURE;
        }
    };

    match db.apply_fixtures(&fixtures) {
        Ok((users, drones, zones, paths)) => {
            println!("Seeded {users} users, {drones} drones, {zones} zones, {paths} paths");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "seeding failed");
            ExitCode::FAILURE
        }
    }
}

fn cmd_stats(db_path: String) -> ExitCode {
    let Some(db) = open_db(&db_path) else {
        return ExitCode::FAILURE;
    };

    println!();
    println!("Database: {db_path}");
    print_stats(&db);
    ExitCode::SUCCESS
}

fn print_stats(db: &Db) {
    let stats = db.stats();
    let mut table = Table::new();
    table.set_header(vec!["Table", "Rows"]);
    for (name, rows) in [
        ("users", stats.users),
        ("drones", stats.drones),
        ("zones", stats.zones),
        ("flight_paths", stats.flight_paths),
        ("telemetry", stats.telemetry),
        ("violations", stats.violations),
    ] {
        table.add_row(vec![Cell::new(name), Cell::new(rows)]);
    }
    println!("{table}");
}
