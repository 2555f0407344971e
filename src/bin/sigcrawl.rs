//! Signature crawler CLI: fetch, load, run, status

use anyhow::{Context, Result};

use sigcrawl::{
    config::{load, Command},
    fetcher, loader, Config, Loader, SignatureKind,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (safe to ignore if not found)
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (command, cfg) = load().context("Failed to load configuration")?;
    cfg.print_summary();

    match command {
        Command::Fetch { kind } => {
            for k in kind.kinds() {
                fetch(&cfg, k).await?;
            }
        }
        Command::Load { kind } => {
            for k in kind.kinds() {
                load_blocking(&cfg, k).await?;
            }
        }
        Command::Run { kind } => {
            // each kind's file is fully written before its load starts
            for k in kind.kinds() {
                fetch(&cfg, k).await?;
                load_blocking(&cfg, k).await?;
            }
        }
        Command::Status => {
            let db_path = cfg.db_path.clone();
            let counts = tokio::task::spawn_blocking(move || -> Result<Vec<(SignatureKind, u64)>> {
                let loader = Loader::open(&db_path)?;
                SignatureKind::ALL
                    .iter()
                    .map(|&k| -> Result<(SignatureKind, u64)> { Ok((k, loader.count_rows(k)?)) })
                    .collect()
            })
            .await
            .context("status task panicked")??;
            for (kind, count) in counts {
                println!("{:<20} {count}", kind.table_name());
            }
        }
    }

    Ok(())
}

async fn fetch(cfg: &Config, kind: SignatureKind) -> Result<()> {
    let summary = fetcher::fetch_kind(cfg, kind).await?;
    if summary.truncated {
        log::warn!(
            "[fetch] {kind} crawl stopped at the page limit; {} is incomplete",
            summary.path.display()
        );
    }
    Ok(())
}

async fn load_blocking(cfg: &Config, kind: SignatureKind) -> Result<()> {
    let cfg = cfg.clone();
    let report = tokio::task::spawn_blocking(move || loader::load_kind(&cfg, kind))
        .await
        .context("load task panicked")??;
    if !report.failures.is_empty() {
        log::warn!(
            "[load] {kind}: {} of {} rows skipped (see warnings above)",
            report.failures.len(),
            report.attempted
        );
    }
    Ok(())
}
