// prediction-sdk/src/bin/prediction-probe.rs
// Operator probe for the prediction service: connectivity check and manual trigger

use std::env;
use std::process::ExitCode;

use anyhow::{bail, Context};
use dotenv::dotenv;
use tracing::{error, info};

use prediction_sdk::config::DEFAULT_PROVIDER;
use prediction_sdk::logging::{init_logging, LoggingConfig};
use prediction_sdk::{PredictionClient, ServiceClient};

const USAGE: &str = "usage: prediction-probe <health|trigger>";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run() -> anyhow::Result<bool> {
    // a missing .env file is fine
    dotenv().ok();
    init_logging(LoggingConfig::from_provider(&**DEFAULT_PROVIDER)).context("failed to initialise logging")?;

    let command = env::args().nth(1).unwrap_or_default();
    let client = PredictionClient::from_env().context("failed to build prediction client")?;
    info!(base_url = client.base_url(), command = %command, "prediction probe starting");

    match command.as_str() {
        "health" => {
            let healthy = client.health_check().await?;
            println!("{} {}", client.base_url(), if healthy { "healthy" } else { "unreachable" });
            Ok(healthy)
        }
        "trigger" => {
            client.trigger_prediction().await;
            for snapshot in client.circuit_snapshots() {
                println!(
                    "{}: {} ({} of {} recent calls failed)",
                    snapshot.name, snapshot.state, snapshot.failures, snapshot.samples
                );
            }
            Ok(true)
        }
        _ => bail!(USAGE),
    }
}
