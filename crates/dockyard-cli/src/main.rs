//! Dockyard CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;
mod commands;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(about = "Dockyard CI CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "DOCKYARD_URL", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a build specification
    Validate {
        /// Path to the specification file
        #[arg(default_value = dockyard_config::BUILD_SPEC_PATH)]
        path: String,
    },
    /// Inspect builds
    Builds {
        #[command(subcommand)]
        command: BuildCommands,
    },
    /// Manage repository webhooks
    Hooks {
        #[command(subcommand)]
        command: HookCommands,
    },
}

#[derive(Subcommand)]
enum BuildCommands {
    /// List recent builds
    List {
        /// Organization (requires --repo)
        #[arg(long, requires = "repo")]
        org: Option<String>,
        /// Repository (requires --org)
        #[arg(long, requires = "org")]
        repo: Option<String>,
        /// Maximum number of builds to show
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show build details
    Show {
        org: String,
        repo: String,
        /// Build ID
        id: String,
    },
    /// Print a build's log
    Logs {
        org: String,
        repo: String,
        /// Build ID
        id: String,
    },
}

#[derive(Subcommand)]
enum HookCommands {
    /// List an organization's registered hooks
    List { org: String },
    /// Register the webhook for a repository
    Register {
        org: String,
        repo: String,
        /// Access token builds of this repository authenticate with
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Remove a repository's webhook
    Remove { org: String, repo: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::Builds { command } => match command {
            BuildCommands::List { org, repo, limit } => {
                commands::builds::list(&cli.server, org.zip(repo), limit).await?;
            }
            BuildCommands::Show { org, repo, id } => {
                commands::builds::show(&cli.server, &org, &repo, &id).await?;
            }
            BuildCommands::Logs { org, repo, id } => {
                commands::builds::logs(&cli.server, &org, &repo, &id).await?;
            }
        },
        Commands::Hooks { command } => match command {
            HookCommands::List { org } => {
                commands::hooks::list(&cli.server, &org).await?;
            }
            HookCommands::Register { org, repo, token } => {
                commands::hooks::register(&cli.server, &org, &repo, &token).await?;
            }
            HookCommands::Remove { org, repo } => {
                commands::hooks::remove(&cli.server, &org, &repo).await?;
            }
        },
    }

    Ok(())
}
