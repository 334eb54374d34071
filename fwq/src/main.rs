//! fwq: operator CLI for the fuel telemetry depot.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use depot::Region;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "fwq")]
#[command(about = "Fuel telemetry depot - load, sync and inspect region data")]
#[command(version)]
struct Cli {
    /// Depot root (overrides DEPOT_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the current retention window and summarize each region
    Load {
        /// Region to load (repeatable; default: all)
        #[arg(short, long = "region")]
        regions: Vec<Region>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pull new live data into the store and advance checkpoints
    Sync {
        /// Region to sync (repeatable; default: all)
        #[arg(short, long = "region")]
        regions: Vec<Region>,

        /// Rewrite stored tables from the window start, ignoring what is stored
        #[arg(long)]
        rebuild: bool,
    },

    /// Reset checkpoints so the next sync starts at the window start
    Refresh {
        /// Region to reset (repeatable; default: all)
        #[arg(short, long = "region")]
        regions: Vec<Region>,
    },

    /// Import table dumps (<DIR>/<REGION>/<table>.jsonl) into the store
    Seed {
        /// Directory holding the dumps
        dir: PathBuf,

        /// Region to import (repeatable; default: all)
        #[arg(short, long = "region")]
        regions: Vec<Region>,
    },

    /// Show each region's checkpoint
    Checkpoint {
        /// Region to show (repeatable; default: all)
        #[arg(short, long = "region")]
        regions: Vec<Region>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// No regions on the command line means all of them.
fn or_all(regions: Vec<Region>) -> Vec<Region> {
    if regions.is_empty() {
        Region::ALL.to_vec()
    } else {
        regions
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let root = cli.root.as_deref();
    let result = match cli.command {
        Commands::Load { regions, json } => commands::load(root, &or_all(regions), json),
        Commands::Sync { regions, rebuild } => commands::sync(root, &or_all(regions), rebuild),
        Commands::Refresh { regions } => commands::refresh(root, &or_all(regions)),
        Commands::Seed { dir, regions } => commands::seed(root, &dir, &or_all(regions)),
        Commands::Checkpoint { regions } => commands::checkpoint(root, &or_all(regions)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
