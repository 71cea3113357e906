use anyhow::{Context, Result};
use time::OffsetDateTime;
use tracing::{error, info, instrument};

use crate::allocate::allocate;
use crate::assemble::{assemble, build_channel, write_feed, ChannelMeta};
use crate::config::{Config, Source};
use crate::fetch::PageFetcher;
use crate::prior;
use crate::publish::{should_publish, Delivery};
use crate::scrape::Scraper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub total: usize,
    pub new_count: usize,
    pub published: bool,
}

/// Runs one source to completion: rebuilds its feed document from the listing and delivers it if
/// anything new showed up.
///
/// A failed scrape leaves the previous document in place. A failed delivery is logged and does not
/// fail the run.
#[instrument(level = "INFO", name = "sync", skip_all, fields(source = %source.name))]
pub async fn sync_source<F, D>(
    cfg: &Config,
    source: &Source,
    fetcher: &mut F,
    delivery: Option<&mut D>,
    now: OffsetDateTime,
) -> Result<SyncReport>
where
    F: PageFetcher,
    D: Delivery,
{
    let path = cfg.state_path(source);
    let prior = prior::load(&path);

    let scraper = Scraper::new(cfg.base_url.clone(), cfg.max_pages, cfg.page_delay.into());
    let records = scraper
        .scrape(fetcher, &source.root_url, now)
        .await
        .context("could not scrape the listing")?;

    let allocation = allocate(&records, &prior, now);
    let entries = assemble(&records, &allocation.published);
    let meta = ChannelMeta {
        title: source.title.clone(),
        link: source.root_url.clone(),
        description: source.description.clone(),
        language: cfg.language.clone(),
    };
    let channel = build_channel(&meta, entries, now)?;
    write_feed(&path, &channel)?;

    info!(
        total = records.len(),
        new_count = allocation.new_count,
        "Wrote `{}`",
        path.display()
    );

    let published = match delivery {
        Some(delivery) if should_publish(allocation.new_count) => {
            match delivery.deliver(&path).await {
                Ok(()) => true,

                Err(e) => {
                    error!("Could not publish `{}`: {e:#}", path.display());
                    false
                }
            }
        }

        Some(_) => {
            info!("No new records in `{}`", path.display());
            false
        }

        None => false,
    };

    Ok(SyncReport {
        total: records.len(),
        new_count: allocation.new_count,
        published,
    })
}
