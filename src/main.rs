//! Command-line front end for the ChatAds client.
//!
//! ```text
//! chatads-client [--config chatads.toml] send "best running shoes" --country US
//! chatads-client health
//! ```
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use chatads_client::config::loader;
use chatads_client::observability::init_logging;
use chatads_client::{ChatAdsClient, HealthStatus, MessageRequest, ResultStatus};

#[derive(Parser)]
#[command(name = "chatads-client")]
#[command(about = "Query the ChatAds recommendation API", long_about = None)]
struct Cli {
    /// TOML config file; CHATADS_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask for a product recommendation
    Send {
        message: String,
        #[arg(long)]
        ip: Option<String>,
        /// ISO 3166-1 alpha-2, uppercase
        #[arg(long)]
        country: Option<String>,
        /// ISO 639-1, lowercase
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
    },
    /// Probe the upstream once
    Health,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = loader::load(cli.config.as_deref())?;
    init_logging(config.observability.log_format)?;

    let client = ChatAdsClient::new(config)?;

    let ok = match cli.command {
        Commands::Send {
            message,
            ip,
            country,
            language,
            user_agent,
        } => {
            let mut request = MessageRequest::new(message);
            request.ip = ip;
            request.country = country;
            request.language = language;
            request.user_agent = user_agent;

            let result = client.send_message(request).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            result.status != ResultStatus::Error
        }
        Commands::Health => {
            let report = client.health_check().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.status != HealthStatus::Unhealthy
        }
    };

    client.shutdown();
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
