use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{branch, checkpoint, enable, history, restore, start, switch};

#[derive(Parser)]
#[command(name = "saveforge")]
#[command(version, about = "Branch-per-save versioning for game saves", long_about = None)]
struct Cli {
    /// Data directory holding the save repository and metadata store
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring daemon with the command API
    Start {
        /// Port for the API server
        #[arg(short, long, default_value = "4030")]
        port: u16,

        /// Policy configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Enable versioning for a game
    Enable {
        /// Game identifier
        game_id: i64,

        /// Display name used to derive branch names
        name: String,

        /// Save paths to monitor
        #[arg(required = true)]
        save_paths: Vec<PathBuf>,
    },

    /// Create a checkpoint of the game's current save files
    Checkpoint {
        /// Game identifier
        game_id: i64,

        /// Save name (defaults to the active branch)
        save_name: Option<String>,

        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show checkpoint history for a game
    History {
        /// Game identifier
        game_id: i64,

        /// Number of commits to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Create a named save branch
    Branch {
        /// Game identifier
        game_id: i64,

        /// Save name for the branch
        name: String,

        /// Branch description
        #[arg(long)]
        description: Option<String>,
    },

    /// Switch to another save branch
    Switch {
        /// Game identifier
        game_id: i64,

        /// Branch name
        branch_name: String,
    },

    /// Restore save files to a recorded checkpoint (destructive)
    Restore {
        /// Game identifier
        game_id: i64,

        /// Commit hash to restore
        commit: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let data_dir = commands::get_data_dir(cli.data_dir);

    match cli.command {
        Commands::Start { port, config } => {
            start::run(data_dir, port, config).await?;
        }
        Commands::Enable {
            game_id,
            name,
            save_paths,
        } => {
            enable::run(data_dir, game_id, name, save_paths)?;
        }
        Commands::Checkpoint {
            game_id,
            save_name,
            message,
        } => {
            checkpoint::run(data_dir, game_id, save_name, message)?;
        }
        Commands::History { game_id, limit } => {
            history::run(data_dir, game_id, limit)?;
        }
        Commands::Branch {
            game_id,
            name,
            description,
        } => {
            branch::run(data_dir, game_id, name, description)?;
        }
        Commands::Switch {
            game_id,
            branch_name,
        } => {
            switch::run(data_dir, game_id, branch_name)?;
        }
        Commands::Restore {
            game_id,
            commit,
            yes,
        } => {
            restore::run(data_dir, game_id, commit, yes)?;
        }
    }

    Ok(())
}
