mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, project::ProjectSubcommand, template::TemplateSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "devhub",
    about = "Project planning workspace: projects, features, releases and notes with optimistic sync",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./devhub.yaml, then ~/.devhub/config.yaml)
    #[arg(long, global = true, env = "DEVHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Use a fresh in-memory backend instead of the configured remote
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and change stream
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,

        /// Open a browser once listening
        #[arg(long)]
        open: bool,
    },

    /// Show, validate or create the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// List, create and delete projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Browse built-in project templates
    Template {
        #[command(subcommand)]
        subcommand: TemplateSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = devhub_core::config::resolve_path(cli.config.as_deref());
    let ctx = cmd::Context {
        config_path,
        json: cli.json,
        memory: cli.memory,
    };

    let result = match cli.command {
        Commands::Serve { port, open } => cmd::serve::run(&ctx, port, open),
        Commands::Config { subcommand } => cmd::config::run(&ctx, subcommand),
        Commands::Project { subcommand } => cmd::project::run(&ctx, subcommand),
        Commands::Template { subcommand } => cmd::template::run(&ctx, subcommand),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
