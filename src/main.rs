use std::path::PathBuf;

use clap::Parser;
use tenantauth::config::{load_config, print_schema};
use tenantauth::startup::{self, Cli, Command};
use tenantauth::utils::logger::init_logging;
use tracing::{error, info};

const CONFIG_PATH_ENV: &str = "TENANTAUTH_CONFIG";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.schema {
        if let Err(e) = print_schema() {
            eprintln!("Error printing configuration schema: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let config_path = cli
        .config
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./config.yaml"));
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Error loading configuration from '{}': {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    info!(
        "Starting {} {}",
        config.logging.service_name, config.logging.service_version
    );

    let command = cli.command.unwrap_or(Command::WhoAmI);
    if let Err(e) = startup::run(&config, command).await {
        error!("Command failed: {}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
