//! tunegate CLI application
//!
//! Operator tooling for a music delivery bot: runs the maintenance daemon and
//! administers quotas, charts and configuration.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use tunegate::cli::{
    handle_config, handle_publish, handle_quota, handle_serve, handle_sweep, Cli, Commands,
};
use tunegate::config::AppConfig;
use tunegate::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    // A broken config file must not prevent `config init` from replacing it
    let config = match AppConfig::load(cli.global.config.clone()).await {
        Ok(config) => config,
        Err(e) if matches!(cli.command, Commands::Config(_)) => {
            eprintln!("Warning: ignoring configuration ({}), using defaults", e);
            AppConfig::default()
        }
        Err(e) => return Err(e.into()),
    };

    init_logging(&cli, &config);
    info!("tunegate v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve(args) => {
            info!("Executing serve command");
            handle_serve(args, &config).await
        }
        Commands::Sweep(args) => handle_sweep(args, &config).await,
        Commands::Publish(args) => handle_publish(args, &config).await,
        Commands::Quota(args) => handle_quota(args, &config).await,
        Commands::Config(args) => handle_config(args, &config).await,
    }
}

/// Initialize logging from CLI flags, falling back to the configured level
fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = cli
        .log_level()
        .map(|level| level.to_string().to_lowercase())
        .unwrap_or_else(|| config.logging.level.clone());

    let mut filter = EnvFilter::from_default_env();
    match format!("tunegate={}", level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Warning: invalid log level '{}': {}", level, e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
