use anbimascraper::{
    calendar::BusinessCalendar,
    cli::{self, Cli},
    config::Config,
    fetch::{HttpClient, UserAgents},
    ingest::Ingestor,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{process::ExitCode, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) configuration & dirs ─────────────────────────────────────
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = &args.data_dir {
        config = config.with_data_dir(dir);
    }
    config.ensure_dirs()?;
    info!(
        bases = %config.bases_dir().display(),
        downloads = %config.downloads_dir().display(),
        "startup"
    );

    // ─── 3) collaborators ────────────────────────────────────────────
    let calendar = BusinessCalendar::load_or_weekends(&config.holidays_path())?;
    info!(holidays = calendar.holiday_count(), "calendar loaded");
    let agents = UserAgents::load_or_default(&config.user_agents_path())?;
    let client = HttpClient::new(&config.http, agents).context("creating HTTP client")?;
    let force_days = config.force_days;
    let ingestor = Ingestor::new(Arc::new(config), Arc::new(calendar), Arc::new(client));

    // ─── 4) ctrl-c cancels the in-flight run ─────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping before merge");
                cancel.cancel();
            }
        });
    }

    // ─── 5) dispatch ─────────────────────────────────────────────────
    let ok = cli::execute(&args.command, &ingestor, force_days, &cancel).await?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
