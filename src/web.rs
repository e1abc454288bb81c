#![cfg(not(tarpaulin_include))]

use report_dashboard::app;
use report_dashboard::config::AppConfig;
use std::env;

/// Main entry point for the report dashboard server
///
/// # Arguments
/// * Optional first argument: path to the JSON config file (default `config.json`)
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config_path = args.get(1).map(String::as_str).unwrap_or("config.json");

    let config = AppConfig::load(config_path)?;
    app::run(config).await
}
