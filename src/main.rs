mod allocate;
mod assemble;
mod cli;
mod config;
mod fetch;
mod identity;
mod prior;
mod publish;
mod scrape;
mod sync;

use std::process::ExitCode;

use anyhow::Result;
use cli::Args;
use config::Config;
use fetch::HttpPageFetcher;
use publish::GitDelivery;
use time::OffsetDateTime;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn set_up_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_regex(false)
                .with_default_directive(Level::INFO.into())
                .with_env_var("ALERTFEED_LOG")
                .from_env_lossy(),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    set_up_logging();

    let cfg = match load_config() {
        Ok(cfg) => cfg,

        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cfg).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,

        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> Result<Config> {
    let mut args = Args::parse();
    let config_paths = args
        .config_path
        .take()
        .into_iter()
        .chain(["./alertfeed.toml".into(), "/etc/alertfeed.toml".into()])
        .collect::<Vec<_>>();
    let mut cfg = config::load(&config_paths)?;
    cfg.update(args)?;

    Ok(cfg)
}

/// Syncs every enabled source in turn. Returns whether all of them succeeded.
async fn run(cfg: &Config) -> Result<bool> {
    let mut fetcher = HttpPageFetcher::new(cfg.accept_invalid_certs)?;
    let mut delivery = cfg
        .publish
        .enabled
        .then(|| GitDelivery::new(cfg.repo_dir()));
    let offset = cfg.utc_offset.into_inner();
    let mut all_ok = true;

    for source in &cfg.sources {
        if !source.enabled {
            info!("Skipping the source `{}`: disabled", source.name);

            continue;
        }

        let now = OffsetDateTime::now_utc().to_offset(offset);

        if let Err(e) =
            sync::sync_source(cfg, source, &mut fetcher, delivery.as_mut(), now).await
        {
            error!(
                "Encountered a failure while syncing the source `{}`: {e:#}",
                source.name
            );
            all_ok = false;
        }
    }

    Ok(all_ok)
}
