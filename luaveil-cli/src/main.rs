mod cli;
mod logs;
mod prompt;
mod server;
mod sinks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use luaveil_core::Metrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = luaveil_core::config::load(&cli.overrides.clone().into())?;

    let log_file = PathBuf::from(&config.log_dir).join(logs::LOG_FILE_NAME);
    if luaveil_core::logger::init_with_file(&log_file).is_err() {
        luaveil_core::logger::init();
    }

    match cli.command {
        Commands::Check { file, url } => cli::check_command(&config, file, url).await,
        Commands::Obfuscate {
            file,
            url,
            preset,
            methods,
            output,
            requester,
        } => {
            cli::obfuscate_command(&config, file, url, preset, methods, output, requester).await
        }
        Commands::Methods { json } => cli::methods_command(json),
        Commands::Logs { target } => logs::logs_command(&config, target).await,
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.health_port);
            server::serve(port, Arc::new(Metrics::new())).await
        }
    }
}
