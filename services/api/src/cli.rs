use crate::server;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tollfree::carrier::{sign_payload, SIGNATURE_HEADER};
use tollfree::config::{AppConfig, ConfigError};
use tollfree::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "tollfree-api",
    about = "Toll-free SMS provisioning service and carrier webhook endpoint",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print a signature header for a webhook body, as the carrier would send it
    SignWebhook(SignWebhookArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON file with businesses to load into the in-memory store
    #[arg(long)]
    pub(crate) seed_businesses: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct SignWebhookArgs {
    /// File holding the exact request body to sign
    #[arg(long)]
    pub(crate) body: PathBuf,
    /// Unix timestamp to sign with; defaults to now
    #[arg(long)]
    pub(crate) timestamp: Option<i64>,
    /// Signing secret; defaults to SURGE_WEBHOOK_SECRET
    #[arg(long)]
    pub(crate) secret: Option<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::SignWebhook(args) => sign_webhook(args),
    }
}

fn sign_webhook(args: SignWebhookArgs) -> Result<(), AppError> {
    let secret = match args.secret {
        Some(secret) => secret,
        None => AppConfig::load()?
            .carrier
            .webhook_secret
            .ok_or(ConfigError::Missing {
                name: "SURGE_WEBHOOK_SECRET",
            })?,
    };
    let body = std::fs::read(&args.body)?;
    let timestamp = args.timestamp.unwrap_or_else(|| Utc::now().timestamp());

    println!("{SIGNATURE_HEADER}: {}", sign_payload(timestamp, &body, &secret));
    Ok(())
}
