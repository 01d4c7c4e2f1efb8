mod cli;
mod commands;
mod infra;
mod routes;
mod server;

use piggy_health::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
