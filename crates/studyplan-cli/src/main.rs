use clap::{Parser, Subcommand};
use studyplan_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "studyplan", version, about = "Studyplan session CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Study session control
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Completion reporter credentials
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
}

/// Log to stderr so stdout stays machine-readable. STUDYPLAN_LOG wins over
/// the configured filter, which is read without creating the config file.
fn init_tracing() {
    let filter = std::env::var("STUDYPLAN_LOG")
        .ok()
        .unwrap_or_else(|| Config::load_or_default().log.filter);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Auth { action } => commands::auth::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
