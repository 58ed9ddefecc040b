use std::path::PathBuf;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

use server::state::State;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Photos to check
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Count results towards this region
    #[arg(long)]
    region: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let state = State::new().await.inspect_err(|err| error!("{err}"))?;

    let reports = process::process_images(&state, &args.images, args.region.as_deref()).await;

    for report in reports {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
