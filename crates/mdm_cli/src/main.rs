//! MDM core CLI
//!
//! Administrative tools operating on an MDM store directory.
//!
//! # Commands
//!
//! - `queue` - List, view, or clear device command queues
//! - `assigner` - Manage DEP auto-assigner rules
//! - `cursor` - Show or reset the DEP sync cursor
//! - `stats` - Display store statistics
//! - `compact` - Rewrite the commit log as a snapshot

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use mdm_dep::WILDCARD_FILTER;
use mdm_store::MapStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// MDM core command-line tools.
#[derive(Parser)]
#[command(name = "mdmctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and manage device command queues
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Manage DEP auto-assigner rules
    Assigner {
        #[command(subcommand)]
        action: AssignerAction,
    },

    /// Inspect or reset the DEP sync cursor
    Cursor {
        #[command(subcommand)]
        action: CursorAction,
    },

    /// Display store statistics
    Stats,

    /// Rewrite the commit log as a single snapshot
    Compact,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum QueueAction {
    /// List every identity with a queue
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Show outstanding commands for an identity
    View {
        /// Device UDID, user ID, or enrollment ID
        identity: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Drop pending and deferred commands for an identity
    Clear {
        /// Device UDID, user ID, or enrollment ID
        identity: String,
    },
}

#[derive(Subcommand)]
enum AssignerAction {
    /// List auto-assigner rules
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Create or replace an auto-assigner rule
    Apply {
        /// Enrollment profile UUID to assign
        #[arg(long)]
        profile: String,

        /// Device filter
        #[arg(long, default_value = WILDCARD_FILTER)]
        filter: String,
    },

    /// Remove an auto-assigner rule
    Remove {
        /// Device filter
        #[arg(long, default_value = WILDCARD_FILTER)]
        filter: String,
    },
}

#[derive(Subcommand)]
enum CursorAction {
    /// Show the persisted cursor
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Clear the cursor so the next start refetches the roster
    Reset,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("mdmctl v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let path = cli.path.ok_or("Store path required (--path)")?;
    let store = MapStore::open(&path)?;
    tracing::debug!(path = %path.display(), "store opened");

    match cli.command {
        Commands::Queue { action } => match action {
            QueueAction::List { format } => {
                let summaries = commands::queue::list(store)?;
                commands::queue::print_list(&summaries, format)?;
            }
            QueueAction::View { identity, format } => {
                let view = commands::queue::view(store, &identity)?;
                commands::queue::print_view(&identity, &view, format)?;
            }
            QueueAction::Clear { identity } => {
                commands::queue::clear(store, &identity)?;
                println!("Queue for {identity} cleared");
            }
        },
        Commands::Assigner { action } => match action {
            AssignerAction::List { format } => commands::assigner::list(store, format)?,
            AssignerAction::Apply { profile, filter } => {
                commands::assigner::apply(store, &filter, &profile)?
            }
            AssignerAction::Remove { filter } => commands::assigner::remove(store, &filter)?,
        },
        Commands::Cursor { action } => match action {
            CursorAction::Show { format } => commands::cursor::show(store, format)?,
            CursorAction::Reset => commands::cursor::reset(store)?,
        },
        Commands::Stats => commands::compact::stats(&store)?,
        Commands::Compact => commands::compact::run(&path, &store)?,
        Commands::Version => {}
    }

    Ok(())
}
