//! # readme-rag CLI
//!
//! Keeps a repository's README in step with its pull requests.
//!
//! ## Usage
//!
//! ```bash
//! readme-rag --config ./config/readme-rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `readme-rag serve` | Start the HTTP server for the frontend |
//! | `readme-rag generate <owner/repo> <pr>` | Propose an updated README for a pull request |
//! | `readme-rag search-repos <query>` | Search GitHub repositories |
//! | `readme-rag list-prs <owner/repo>` | List open pull requests |
//! | `readme-rag chunk <file>` | Show how a local file would be chunked |
//!
//! `GITHUB_TOKEN` and `OPENAI_API_KEY` are read from the environment once,
//! here, and passed down.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use readme_rag::commands;
use readme_rag::config::{self, Config, Secrets};
use readme_rag::server;

#[derive(Parser)]
#[command(
    name = "readme-rag",
    about = "Keeps a repository README in step with its pull requests",
    version,
    long_about = "readme-rag reads a pull request's diff, commit messages and the current README, \
    retrieves related passages from an embedding index of the repository, and asks a language \
    model for an updated README. The result can be proposed back as a pull request."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/readme-rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves `/generate`, `/search-repos`,
    /// `/list-prs` and `/health`.
    Serve,

    /// Generate an updated README for a pull request.
    ///
    /// Prints the generated README on stdout and a run summary on stderr.
    Generate {
        /// Repository as `owner/name` or a GitHub URL.
        repo: String,

        /// Pull request number.
        pr: u64,

        /// Open a pull request with the updated README.
        #[arg(long)]
        publish: bool,

        /// Skip indexing and prompt from the pull request alone.
        #[arg(long)]
        direct: bool,
    },

    /// Search GitHub repositories (first five results).
    SearchRepos {
        query: String,
    },

    /// List open pull requests of a repository (first five).
    ListPrs {
        /// Repository as `owner/name`.
        repo: String,
    },

    /// Chunk a local file with the configured settings and print the segments.
    Chunk {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require a config file
    if let Commands::Chunk { file } = &cli.command {
        let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::direct());
        return commands::run_chunk(&cfg, file);
    }

    let cfg = config::load_config(&cli.config)?;
    let secrets = Secrets::from_env();

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg, &secrets).await?;
        }
        Commands::Generate {
            repo,
            pr,
            publish,
            direct,
        } => {
            commands::run_generate(&cfg, &secrets, &repo, pr, publish, direct).await?;
        }
        Commands::SearchRepos { query } => {
            commands::run_search_repos(&cfg, &secrets, &query).await?;
        }
        Commands::ListPrs { repo } => {
            commands::run_list_prs(&cfg, &secrets, &repo).await?;
        }
        Commands::Chunk { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
