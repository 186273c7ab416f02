use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use civic_connect::commands;
use civic_connect::config::ServeArgs;
use civic_connect::db::Database;
use civic_connect::{logging, server};

#[derive(Parser)]
#[command(name = "civic-connect")]
#[command(about = "Report civic issues with a photo and vote on them")]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "CIVIC_DB", default_value = "civic-connect.db")]
    db: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Show the feed, most upvoted first
    Feed,

    /// List issues reported by one user, newest first
    By {
        /// Username of the reporter
        author: String,
    },

    /// Show issue details and who voted
    Show {
        /// Issue ID
        id: i64,
    },

    /// Set an issue's status (Submitted, In Progress, Resolved, Rejected)
    Status {
        /// Issue ID
        id: i64,
        /// New status
        status: String,
    },
}

fn get_db(path: &Path) -> Result<Database> {
    Database::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    match cli.command {
        Commands::Serve(args) => {
            let db = get_db(&cli.db)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(server::serve(db, &args))
        }

        Commands::Feed => {
            let db = get_db(&cli.db)?;
            commands::list::run(&db)
        }

        Commands::By { author } => {
            let db = get_db(&cli.db)?;
            commands::list::run_by_author(&db, &author)
        }

        Commands::Show { id } => {
            let db = get_db(&cli.db)?;
            commands::show::run(&db, id)
        }

        Commands::Status { id, status } => {
            let db = get_db(&cli.db)?;
            commands::status::run(&db, id, &status)
        }
    }
}
