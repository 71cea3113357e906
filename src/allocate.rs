//! Publish timestamps for scraped records.
//!
//! Known records keep the timestamp they were first published with. New records get the date
//! printed on the listing combined with a synthetic time of day, interpolated evenly between the
//! previous build and the current one, so feed readers see them arrive in a stable order.

use std::collections::HashMap;

use time::{Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use tracing::{debug, trace};

use crate::prior::PriorState;
use crate::scrape::Record;

/// How far back the anchor is placed when there is no previous build.
pub const FIRST_RUN_WINDOW: Duration = Duration::HOUR;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub published: HashMap<String, OffsetDateTime>,
    pub new_count: usize,
}

/// The order in which records are listed: most recent `parsed_date` first, ties kept in scrape
/// order.
pub fn chronological_order(records: &[Record]) -> Vec<&Record> {
    let mut ordered = records.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| b.parsed_date.cmp(&a.parsed_date));

    ordered
}

/// Assigns a publish timestamp to every record.
///
/// Synthesized timestamps carry `now`'s offset. If `now` is not after the anchor (clock skew, or
/// two runs within the same second), the interval is zero or negative and is used as is.
pub fn allocate(records: &[Record], prior: &PriorState, now: OffsetDateTime) -> Allocation {
    let offset = now.offset();
    let anchor = prior.last_build.unwrap_or(now - FIRST_RUN_WINDOW);

    let fresh_count = records
        .iter()
        .filter(|record| !prior.contains(&record.identity))
        .count();

    // never zero; the interval stays defined even when nothing is fresh.
    let divisor = u32::try_from(fresh_count.max(1)).unwrap_or(u32::MAX);
    let interval = (now - anchor) / divisor;
    debug!(
        %anchor,
        fresh_count,
        interval_secs = interval.whole_seconds(),
        "Allocating publish timestamps"
    );

    let mut published = HashMap::with_capacity(records.len());
    let mut fresh_idx = 0u32;

    for record in chronological_order(records) {
        if let Some(published_at) = prior.published_at(&record.identity) {
            published.insert(record.identity.clone(), published_at);
            continue;
        }

        let estimated = anchor + interval * fresh_idx;
        let published_at = combine(record, estimated, offset);
        trace!(identity = %record.identity, %published_at, "Allocated a new timestamp");

        published.insert(record.identity.clone(), published_at);
        fresh_idx = fresh_idx.saturating_add(1);
    }

    Allocation {
        published,
        new_count: fresh_count,
    }
}

/// The record's own date with the whole-second time of day of `estimated` in `offset`.
fn combine(record: &Record, estimated: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
    let (hour, minute, second) = estimated.to_offset(offset).to_hms();
    // the components come from a valid time, so this cannot fail.
    let time = Time::from_hms(hour, minute, second).unwrap_or(Time::MIDNIGHT);

    PrimitiveDateTime::new(record.parsed_date, time).assume_offset(offset)
}
