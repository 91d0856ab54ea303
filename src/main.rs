use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{fmt, EnvFilter};

use target_woocommerce::cli::Cli;
use target_woocommerce::config::Config;
use target_woocommerce::target::Target;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    // stdout carries Singer STATE output, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .flatten_event(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    tracing::info!(
        site_url = %cfg.site_url,
        page_size = cfg.page_size,
        max_retries = cfg.http_max_retries,
        line_item_policy = ?cfg.line_item_policy,
        "Loaded configuration"
    );

    let target = Target::new(&cfg)?;
    let stdout = tokio::io::stdout();
    let summary = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            target.run(BufReader::new(file), stdout).await?
        }
        None => target.run(BufReader::new(tokio::io::stdin()), stdout).await?,
    };

    tracing::info!(
        total = summary.overall.total,
        succeeded = summary.overall.succeeded,
        failed = summary.overall.failed,
        skipped = summary.overall.skipped,
        "Target finished"
    );
    Ok(())
}
