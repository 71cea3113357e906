use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

use crate::fetch::{PageFetcher, RawFragment};
use crate::identity;

static DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]/[month]/[day]");

/// A record scraped from the listing during the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub identity: String,
    pub name: String,
    pub date_text: String,
    pub parsed_date: Date,
    pub resource_url: Url,
}

pub struct Scraper {
    origin: Url,
    max_pages: u32,
    page_delay: Duration,
}

impl Scraper {
    pub fn new(origin: Url, max_pages: u32, page_delay: Duration) -> Self {
        Self {
            origin,
            max_pages,
            page_delay,
        }
    }

    /// Walks the listing starting at `root_url` until a page comes back empty or `max_pages`
    /// pages have been read.
    ///
    /// `now` is the date substituted for records whose date text cannot be parsed. Only the first
    /// record seen for an identity is kept.
    pub async fn scrape<F: PageFetcher>(
        &self,
        fetcher: &mut F,
        root_url: &Url,
        now: OffsetDateTime,
    ) -> Result<Vec<Record>> {
        let mut records = vec![];
        let mut seen = HashSet::new();

        for page in 1..=self.max_pages {
            if page > 1 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let url = page_url(root_url, page);
            let fragments = fetcher
                .fetch(&url)
                .await
                .with_context(|| anyhow!("could not retrieve page {page} of the listing"))?;

            if fragments.is_empty() {
                debug!("Page {page} is empty; reached the end of the listing");
                break;
            }

            let fragment_count = fragments.len();
            let before = records.len();
            for (idx, fragment) in fragments.into_iter().enumerate() {
                let Some(record) = self.normalize(fragment, page, idx + 1, now) else {
                    continue;
                };

                if !seen.insert(record.identity.clone()) {
                    debug!(identity = %record.identity, "Skipping a repeated record on page {page}");
                    continue;
                }

                records.push(record);
            }
            debug!(
                "Page {page}: kept {} of {fragment_count} fragments",
                records.len() - before
            );
        }

        info!("Scraped {} records", records.len());

        Ok(records)
    }

    fn normalize(
        &self,
        fragment: RawFragment,
        page: u32,
        idx: usize,
        now: OffsetDateTime,
    ) -> Option<Record> {
        let Some(name) = fragment.name.filter(|name| !name.is_empty()) else {
            debug!("Skipping fragment #{idx} on page {page}: no name");
            return None;
        };

        let Some(src) = fragment.image_src else {
            debug!("Skipping fragment #{idx} on page {page}: no image");
            return None;
        };

        let resource_url = match identity::resolve(&self.origin, &src) {
            Ok(url) => url,

            Err(e) => {
                debug!("Skipping fragment #{idx} on page {page}: {e:#}");
                return None;
            }
        };

        let date_text = fragment.date_text.unwrap_or_default();
        let parsed_date = parse_date(&date_text).unwrap_or_else(|| {
            debug!(%date_text, "Could not parse the date of `{name}`; using the current date");
            now.date()
        });

        Some(Record {
            identity: identity::identity(&resource_url),
            name,
            date_text,
            parsed_date,
            resource_url,
        })
    }
}

/// The URL of a listing page. Page 1 is the bare root URL.
pub fn page_url(root_url: &Url, page: u32) -> Url {
    let mut url = root_url.clone();

    if page > 1 {
        url.query_pairs_mut().append_pair("page", &page.to_string());
    }

    url
}

/// Parses the `YYYY/MM/DD` date text used by the listing.
pub fn parse_date(text: &str) -> Option<Date> {
    Date::parse(text.trim(), DATE_FORMAT).ok()
}
