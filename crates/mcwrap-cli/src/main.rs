//! CLI entry point - the composition root.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mcwrap_cli::{Cli, Commands, default_output, handlers};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .compact()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads MCWRAP_* defaults
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = cli.server.into_settings();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => handlers::run(settings).await,
        Commands::Export {
            format,
            output,
            base_name,
        } => {
            let output = output.unwrap_or_else(|| default_output(format, &base_name));
            handlers::export(settings, format, &output, &base_name).await
        }
        Commands::Import { archive } => handlers::import(settings, &archive).await,
    }
}
