use anyhow::Result;
use tracing::{error, info};

mod alert;
mod checkpoint;
mod cli;
mod crawler;
mod export;
mod extract;
mod fetch;
mod schedule;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args();

    utils::init_logging(args.verbose, args.log_file.clone())?;
    info!("Starting page-harvester v{}", env!("CARGO_PKG_VERSION"));

    match cli::process_command(args).await {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("Command failed: {}", e);
            Err(e)
        }
    }
}
