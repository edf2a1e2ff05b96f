//! sshbox - ephemeral development containers reachable over SSH

mod commands;

use clap::{ArgAction, Parser, Subcommand};
use sshbox_config::GlobalConfig;
use sshbox_provider::connect_runtime;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sshbox")]
#[command(author, version, about = "Create and manage development containers reachable over SSH", long_about = None)]
struct Cli {
    /// Make more noise (can be repeated)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Set container host name (defaults to image tag)
    #[arg(short = 'n', long, global = true)]
    hostname: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start containers and wait for them to accept SSH connections
    Start {
        /// Image identities (repository:tag, or a bare tag for your own repository)
        #[arg(required = true)]
        images: Vec<String>,
    },

    /// Save container changes as new image revisions
    Commit {
        /// Image identities
        #[arg(required = true)]
        images: Vec<String>,

        /// Message for the created image revision
        #[arg(short, long)]
        message: Option<String>,

        /// Author for the created image revision
        #[arg(long)]
        author: Option<String>,
    },

    /// Kill and remove containers, discarding uncommitted changes
    Kill {
        /// Image identities
        #[arg(required = true)]
        images: Vec<String>,
    },

    /// Kill containers and delete their images
    Delete {
        /// Image identities
        #[arg(required = true)]
        images: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = GlobalConfig::load().unwrap_or_default();
    let runtime: Arc<dyn sshbox_provider::ContainerRuntime> =
        Arc::from(connect_runtime(&config).await?);

    match cli.command {
        Commands::Start { images } => {
            commands::start(runtime, &config, cli.hostname, &images).await
        }
        Commands::Commit {
            images,
            message,
            author,
        } => {
            commands::commit(
                runtime,
                &config,
                cli.hostname,
                &images,
                message.as_deref(),
                author.as_deref(),
            )
            .await
        }
        Commands::Kill { images } => commands::kill(runtime, &config, cli.hostname, &images).await,
        Commands::Delete { images } => {
            commands::delete(runtime, &config, cli.hostname, &images).await
        }
    }
}
