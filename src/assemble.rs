use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use html_escape::{encode_single_quoted_attribute, encode_text};
use reqwest::Url;
use rss::{Channel, ChannelBuilder, GuidBuilder, ItemBuilder};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing::{debug, error};

use crate::allocate::chronological_order;
use crate::scrape::Record;

/// Channel-level metadata of a feed.
#[derive(Debug, Clone)]
pub struct ChannelMeta {
    pub title: String,
    pub link: Url,
    pub description: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub link: String,
    pub guid: String,
    pub pub_date: OffsetDateTime,
    pub description: String,
}

impl Entry {
    fn new(record: &Record, pub_date: OffsetDateTime) -> Self {
        let url = record.resource_url.as_str();

        Self {
            title: format!("{} - {}", record.name, record.date_text),
            link: url.to_owned(),
            guid: record.identity.clone(),
            pub_date,
            description: format!(
                "<strong>{}</strong><br>Fecha: {}<br><img src='{}' width='300' />",
                encode_text(&record.name),
                encode_text(&record.date_text),
                encode_single_quoted_attribute(url),
            ),
        }
    }
}

/// Turns the scraped records into feed entries, most recent first.
pub fn assemble(records: &[Record], published: &HashMap<String, OffsetDateTime>) -> Vec<Entry> {
    chronological_order(records)
        .into_iter()
        .filter_map(|record| {
            let Some(&pub_date) = published.get(&record.identity) else {
                error!(identity = %record.identity, "No publish date was allocated; skipping");
                return None;
            };

            Some(Entry::new(record, pub_date))
        })
        .collect()
}

/// Builds the RSS channel for `entries`, stamped with `last_build` as its build date.
pub fn build_channel(
    meta: &ChannelMeta,
    entries: Vec<Entry>,
    last_build: OffsetDateTime,
) -> Result<Channel> {
    let mut items = Vec::with_capacity(entries.len());

    for entry in entries {
        let pub_date = entry
            .pub_date
            .format(&Rfc2822)
            .with_context(|| anyhow!("could not format the publication date of `{}`", entry.guid))?;

        items.push(
            ItemBuilder::default()
                .title(Some(entry.title))
                .link(Some(entry.link))
                .description(Some(entry.description))
                .guid(Some(
                    GuidBuilder::default()
                        .value(entry.guid)
                        .permalink(true)
                        .build(),
                ))
                .pub_date(Some(pub_date))
                .build(),
        );
    }

    let last_build = last_build
        .format(&Rfc2822)
        .with_context(|| anyhow!("could not format the last build date ({last_build})"))?;

    Ok(ChannelBuilder::default()
        .title(meta.title.clone())
        .link(meta.link.as_str())
        .description(meta.description.clone())
        .language(Some(meta.language.clone()))
        .last_build_date(Some(last_build))
        .generator(Some(format!("alertfeed {}", env!("CARGO_PKG_VERSION"))))
        .items(items)
        .build())
}

/// Writes the channel to `path`, replacing the previous document only once the new one has been
/// written completely.
pub fn write_feed(path: impl AsRef<Path>, channel: &Channel) -> Result<()> {
    let path = path.as_ref();
    let tmp_path = tmp_path(path);

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| anyhow!("could not create the directory `{}`", dir.display()))?;
    }

    {
        let f = File::create(&tmp_path)
            .with_context(|| anyhow!("could not create `{}`", tmp_path.display()))?;
        let mut writer = BufWriter::new(f);
        channel
            .pretty_write_to(&mut writer, b' ', 2)
            .with_context(|| anyhow!("could not write the feed to `{}`", tmp_path.display()))?;
        writer
            .flush()
            .with_context(|| anyhow!("could not write the feed to `{}`", tmp_path.display()))?;
    }

    fs::rename(&tmp_path, path).with_context(|| {
        anyhow!(
            "could not move `{}` to `{}`",
            tmp_path.display(),
            path.display()
        )
    })?;
    debug!(
        item_count = channel.items().len(),
        "Wrote the feed to `{}`",
        path.display()
    );

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp");

    path.with_file_name(file_name)
}
