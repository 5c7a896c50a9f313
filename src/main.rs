// LinePort - Line-oriented serial device communication tool
use clap::Parser;
use lineport::cli::{execute_command, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    execute_command(args).await?;
    Ok(())
}
