mod cli;
mod infra;
mod routes;
mod server;

use tollfree::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
