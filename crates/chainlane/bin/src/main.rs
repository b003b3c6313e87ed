use clap::Parser;
use eyre::config::HookBuilder;
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();

    HookBuilder::default()
        .theme(eyre::config::Theme::new())
        .install()?;

    // Logs go to stderr so command output stays machine readable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    cli::Opt::parse().run().await
}
