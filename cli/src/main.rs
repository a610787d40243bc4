mod charts;
mod commands;
mod config;
mod pages;
mod server;
mod sheets;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{cmd_chart, cmd_delete, cmd_edit, cmd_init, cmd_log, cmd_show};
use crate::config::{Backend, Config};
use crate::sheets::SheetsStore;
use weighin_core::session::Session;
use weighin_core::store::{MeasurementStore, SqliteStore};

#[derive(Parser)]
#[command(
    name = "weighin",
    version,
    about = "A simple weight and BMI tracker",
    long_about = "Track body weight over time, see the BMI it implies and chart your progress.\n\
                  Data lives in a local SQLite file or a shared Google spreadsheet."
)]
struct Cli {
    /// Storage backend (overrides config.json)
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and seed it with sample measurements when empty
    Init {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a weight in kg (today unless --date is given)
    Log {
        /// Weight in kg; blank skips
        value: String,
        /// Date to log for (YYYY-MM-DD, "today" or "yesterday")
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the weight and BMI table
    Show {
        /// Only the most recent N measurements
        #[arg(long)]
        days: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Overwrite the weight of an existing date
    Edit {
        /// Date of the row (YYYY-MM-DD)
        date: String,
        /// New weight in kg
        weight: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the measurement for a date
    Delete {
        /// Date of the row (YYYY-MM-DD)
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write weight, BMI and combined charts as SVG files
    Chart {
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the tracker web page and JSON API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_store(
    config: &Config,
    backend: Backend,
    rt: &tokio::runtime::Runtime,
) -> Result<Box<dyn MeasurementStore>> {
    Ok(match backend {
        Backend::Sqlite => Box::new(SqliteStore::new(&config.db_path)),
        Backend::Sheets => Box::new(SheetsStore::new(
            &config.credentials_path,
            &config.sheet_name,
            rt.handle().clone(),
        )?),
    })
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let backend = cli.backend.unwrap_or(config.backend);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let store = open_store(&config, backend, &rt)?;

    match cli.command {
        Commands::Init { json } => cmd_init(store.as_ref(), json),
        Commands::Log { value, date, json } => {
            cmd_log(&mut Session::new(store, config.height_m), &value, date, json)
        }
        Commands::Show { days, json } => {
            cmd_show(&mut Session::new(store, config.height_m), days, json)
        }
        Commands::Edit { date, weight, json } => cmd_edit(
            &mut Session::new(store, config.height_m),
            &date,
            &weight,
            json,
        ),
        Commands::Delete { date, json } => {
            cmd_delete(&mut Session::new(store, config.height_m), &date, json)
        }
        Commands::Chart { out, json } => {
            cmd_chart(&mut Session::new(store, config.height_m), &out, json)
        }
        Commands::Serve { port, bind } => {
            let store = server::initialize_store(rt.handle(), store)?;
            let session = Session::new(store, config.height_m);
            rt.block_on(server::start_server(session, port, &bind))
        }
    }
}
