use blockpulse::opts::BlockpulseArgs;
use clap::Parser;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    BlockpulseArgs::parse().run().await
}
