use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rss::Channel;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::identity;

/// What the previously published feed tells us: when each known item was published and when the
/// feed was last built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorState {
    pub entries: HashMap<String, OffsetDateTime>,
    pub last_build: Option<OffsetDateTime>,
}

impl PriorState {
    pub fn empty() -> Self {
        Default::default()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn published_at(&self, identity: &str) -> Option<OffsetDateTime> {
        self.entries.get(identity).copied()
    }
}

/// Loads the prior state from a previously generated feed document.
///
/// Never fails: a missing, unreadable or malformed document yields the empty state, and the feed
/// is rebuilt from scratch.
pub fn load(path: impl AsRef<Path>) -> PriorState {
    let path = path.as_ref();

    match try_load(path) {
        Ok(Some(state)) => {
            info!(
                entry_count = state.entries.len(),
                "Loaded the previous feed `{}`",
                path.display()
            );

            state
        }

        Ok(None) => {
            debug!(file = %path.display(), "No previous feed found, starting from an empty state");

            PriorState::empty()
        }

        Err(e) => {
            warn!("Ignoring the previous feed `{}`: {e:#}", path.display());

            PriorState::empty()
        }
    }
}

fn try_load(path: &Path) -> Result<Option<PriorState>> {
    let f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context("could not open the file"),
    };

    let channel =
        Channel::read_from(BufReader::new(f)).context("could not parse the RSS document")?;

    from_channel(&channel).map(Some)
}

/// Reconstructs the prior state from a parsed channel. Any malformed item invalidates the whole
/// document.
pub fn from_channel(channel: &Channel) -> Result<PriorState> {
    let last_build = channel
        .last_build_date()
        .map(parse_timestamp)
        .transpose()
        .context("malformed `lastBuildDate`")?;

    let mut entries = HashMap::with_capacity(channel.items().len());

    for (idx, item) in channel.items().iter().enumerate() {
        let idx = idx + 1;

        let guid = item
            .guid()
            .map(|guid| guid.value().trim())
            .filter(|guid| !guid.is_empty())
            .ok_or_else(|| anyhow!("item #{idx} has no guid"))?;
        let pub_date = item
            .pub_date()
            .ok_or_else(|| anyhow!("item #{idx} has no `pubDate`"))?;
        let pub_date = parse_timestamp(pub_date)
            .with_context(|| anyhow!("malformed `pubDate` of item #{idx}"))?;

        entries.insert(identity::canonicalize(guid), pub_date);
    }

    Ok(PriorState {
        entries,
        last_build,
    })
}

fn parse_timestamp(s: &str) -> Result<OffsetDateTime> {
    let s = s.trim();

    OffsetDateTime::parse(s, &Rfc2822).with_context(|| anyhow!("could not parse `{s}`"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use time::macros::datetime;

    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0">
  <channel>
    <title>Protocolo Alba Quintana Roo</title>
    <link>https://www.fgeqroo.gob.mx/protocolos/Alba</link>
    <description>RSS de mujeres desaparecidas (Alba) en Quintana Roo</description>
    <lastBuildDate>Mon, 01 Jan 2024 10:00:00 -0500</lastBuildDate>
    <item>
      <title>Ana - 2024/01/01</title>
      <guid isPermaLink="true">https://www.fgeqroo.gob.mx/img/a.jpg</guid>
      <pubDate>Mon, 01 Jan 2024 09:00:00 -0500</pubDate>
    </item>
    <item>
      <title>Berta - 2023/12/31</title>
      <guid isPermaLink="true"> https://www.fgeqroo.gob.mx/img/b.jpg </guid>
      <pubDate>Sun, 31 Dec 2023 09:30:00 -0500</pubDate>
    </item>
  </channel>
</rss>"#;

    fn write(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        fs::write(&path, contents).unwrap();

        (dir, path)
    }

    #[test]
    fn loads_entries_and_last_build() {
        let (_dir, path) = write(FEED);
        let state = load(&path);

        assert_eq!(state.last_build, Some(datetime!(2024-01-01 10:00:00 -5)));
        assert_eq!(state.entries.len(), 2);
        assert_eq!(
            state.published_at("https://www.fgeqroo.gob.mx/img/a.jpg"),
            Some(datetime!(2024-01-01 09:00:00 -5))
        );
        assert_eq!(
            state.published_at("https://www.fgeqroo.gob.mx/img/b.jpg"),
            Some(datetime!(2023-12-31 09:30:00 -5))
        );
    }

    #[test]
    fn unencoded_guids_match_scraped_identities() {
        let (_dir, path) = write(&FEED.replace("img/a.jpg", "img/Ana Gómez.jpg"));
        let state = load(&path);
        let scraped = identity::resolve(
            &reqwest::Url::parse("https://www.fgeqroo.gob.mx").unwrap(),
            "/img/Ana Gómez.jpg",
        )
        .unwrap();

        assert_eq!(
            state.published_at(&identity::identity(&scraped)),
            Some(datetime!(2024-01-01 09:00:00 -5))
        );
        assert!(!state.contains("https://www.fgeqroo.gob.mx/img/Ana Gómez.jpg"));
    }

    #[test]
    fn missing_file_yields_empty_state() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(load(dir.path().join("nope.xml")), PriorState::empty());
    }

    #[test]
    fn garbage_yields_empty_state() {
        let (_dir, path) = write("this is not a feed");

        assert_eq!(load(&path), PriorState::empty());
    }

    #[test]
    fn malformed_pub_date_yields_empty_state() {
        let (_dir, path) = write(&FEED.replace("Sun, 31 Dec 2023 09:30:00 -0500", "yesterday"));

        assert_eq!(load(&path), PriorState::empty());
    }

    #[test]
    fn malformed_last_build_yields_empty_state() {
        let (_dir, path) = write(&FEED.replace("Mon, 01 Jan 2024 10:00:00 -0500", "soon"));

        assert_eq!(load(&path), PriorState::empty());
    }

    #[test]
    fn missing_last_build_is_absent() {
        let (_dir, path) = write(&FEED.replace(
            "<lastBuildDate>Mon, 01 Jan 2024 10:00:00 -0500</lastBuildDate>",
            "",
        ));
        let state = load(&path);

        assert_eq!(state.last_build, None);
        assert_eq!(state.entries.len(), 2);
    }
}
