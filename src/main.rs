use anyhow::Result;
use clap::Parser;
use speedwatch::cli::{handlers, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let exit_code = handlers::dispatch(cli).await?;
    std::process::exit(exit_code);
}
