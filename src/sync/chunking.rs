//! Splitting sync work into vendor-sized pieces

use chrono::{Duration, NaiveDate};

use crate::cities::City;
use crate::vendor::DateRange;

/// Contiguous chunks of at most `max_days` days covering `range` exactly once.
pub fn chunk_dates(range: DateRange, max_days: u32) -> Vec<DateRange> {
    let span = i64::from(max_days.max(1));
    let mut chunks = Vec::with_capacity(((range.days() + span - 1) / span) as usize);
    let mut start = range.from;

    while start <= range.to {
        let end = (start + Duration::days(span - 1)).min(range.to);
        chunks.push(DateRange { from: start, to: end });
        start = end + Duration::days(1);
    }

    chunks
}

/// Order-preserving batches of at most `max` cities.
pub fn batch_cities(cities: &[City], max: usize) -> Vec<&[City]> {
    cities.chunks(max.max(1)).collect()
}

/// The single day the daily job syncs: `lookback_days` before `today`.
pub fn lookback_day(today: NaiveDate, lookback_days: u32) -> DateRange {
    DateRange::single(today - Duration::days(i64::from(lookback_days)))
}
