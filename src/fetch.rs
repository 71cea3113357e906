use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(120);

/// A record card as it appears in the listing markup, before any validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFragment {
    pub name: Option<String>,
    pub date_text: Option<String>,
    pub image_src: Option<String>,
}

/// Retrieves a listing page and splits it into record fragments.
///
/// An empty result means the listing has no more pages.
pub trait PageFetcher {
    async fn fetch(&mut self, url: &Url) -> Result<Vec<RawFragment>>;
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(accept_invalid_certs: bool) -> Result<Self> {
        if accept_invalid_certs {
            debug!("TLS certificate validation is disabled");
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("alertfeed/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TOTAL_TIMEOUT)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .context("could not create an HTTP client")?;

        Ok(Self { client })
    }
}

impl PageFetcher for HttpPageFetcher {
    #[instrument(level = "DEBUG", skip_all, fields(%url))]
    async fn fetch(&mut self, url: &Url) -> Result<Vec<RawFragment>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(Into::into)
            .and_then(|r| r.error_for_status().context("server returned an error"))
            .with_context(|| anyhow!("could not fetch `{url}`"))?;

        // the site does not always declare its charset, but it is always UTF-8.
        let body = response
            .bytes()
            .await
            .with_context(|| anyhow!("could not read the response when fetching `{url}`"))?;
        let fragments = parse_listing(&String::from_utf8_lossy(&body));
        debug!(fragment_count = fragments.len(), "Parsed the listing page");

        Ok(fragments)
    }
}

struct Selectors {
    card: Selector,
    name: Selector,
    date: Selector,
    image: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();

    SELECTORS.get_or_init(|| Selectors {
        card: Selector::parse("div.detalle-com").unwrap(),
        name: Selector::parse("h3").unwrap(),
        date: Selector::parse("small").unwrap(),
        image: Selector::parse("img").unwrap(),
    })
}

/// Extracts record cards (`div.detalle-com`) from a listing page.
pub fn parse_listing(html: &str) -> Vec<RawFragment> {
    let selectors = selectors();
    let document = Html::parse_document(html);

    document
        .select(&selectors.card)
        .map(|card| RawFragment {
            name: first_text(card, &selectors.name),
            date_text: first_text(card, &selectors.date),
            image_src: card
                .select(&selectors.image)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(str::to_owned),
        })
        .collect()
}

fn first_text(card: ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_owned())
}
