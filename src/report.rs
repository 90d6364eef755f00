//! Coverage report: which days are missing from the destination bucket
//!
//! Synced data lands under `{city prefix}/date=YYYY-MM-DD/`, so the days
//! present for a city are the `date=` child prefixes of its destination.

use chrono::{Duration, NaiveDate};
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::cities::City;
use crate::storage::{StorageClient, StorageError};
use crate::vendor::DateRange;

/// Cities listed concurrently
const LIST_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct CityCoverage {
    pub city: City,
    pub prefix: String,
    pub missing: Vec<NaiveDate>,
    pub ranges: Vec<DateRange>,
}

impl CityCoverage {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// One console line, e.g. `[MISS] Canada / Ontario / Toronto: 3 days missing [...]`
    pub fn describe(&self) -> String {
        let mut label = vec![self.city.country.as_str()];
        if !self.city.state_province.trim().is_empty() {
            label.push(self.city.state_province.as_str());
        }
        label.push(self.city.city.as_str());
        let label = label.join(" / ");

        if self.is_complete() {
            return format!("[OK] {}: no missing days", label);
        }

        let ranges: Vec<String> = self
            .ranges
            .iter()
            .map(|r| {
                if r.from == r.to {
                    r.from.to_string()
                } else {
                    format!("{}→{}", r.from, r.to)
                }
            })
            .collect();
        format!(
            "[MISS] {}: {} days missing [{}]",
            label,
            self.missing.len(),
            ranges.join("; ")
        )
    }
}

/// Days listed as `date=YYYY-MM-DD` child prefixes under `prefix`.
pub async fn present_dates(storage: &StorageClient, prefix: &str) -> Result<BTreeSet<NaiveDate>, StorageError> {
    let children = storage.list_child_prefixes(prefix).await?;
    Ok(children
        .iter()
        .filter_map(|child| {
            let pos = child.rfind("date=")?;
            let day = child.get(pos + 5..pos + 15)?;
            NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
        })
        .collect())
}

pub fn missing_dates(expected: DateRange, present: &BTreeSet<NaiveDate>) -> Vec<NaiveDate> {
    expected.iter_days().filter(|d| !present.contains(d)).collect()
}

/// Collapse sorted dates into runs of consecutive days.
pub fn group_into_ranges(dates: &[NaiveDate]) -> Vec<DateRange> {
    let mut ranges: Vec<DateRange> = Vec::new();
    for &day in dates {
        match ranges.last_mut() {
            Some(last) if last.to + Duration::days(1) == day => last.to = day,
            _ => ranges.push(DateRange::single(day)),
        }
    }
    ranges
}

/// Coverage of every city over `expected`, sorted by country, state and city.
pub async fn coverage(
    storage: &StorageClient,
    cities: &[City],
    expected: DateRange,
    dest_root: &str,
) -> Result<Vec<CityCoverage>, ReportError> {
    let mut report: Vec<CityCoverage> = stream::iter(cities.iter().cloned())
        .map(|city| async move {
            let prefix = city.destination_prefix(dest_root);
            let present = present_dates(storage, &prefix).await?;
            let missing = missing_dates(expected, &present);
            let ranges = group_into_ranges(&missing);
            Ok::<_, ReportError>(CityCoverage {
                city,
                prefix,
                missing,
                ranges,
            })
        })
        .buffer_unordered(LIST_CONCURRENCY)
        .try_collect()
        .await?;

    report.sort_by(|a, b| a.prefix.cmp(&b.prefix));
    Ok(report)
}

/// Write the report as CSV with one row per city.
pub fn write_csv<W: Write>(mut out: W, report: &[CityCoverage]) -> Result<(), ReportError> {
    writeln!(
        out,
        "country,state_province,city,prefix,missing_count,missing_ranges,missing_dates"
    )?;

    for entry in report {
        let ranges: Vec<[String; 2]> = entry
            .ranges
            .iter()
            .map(|r| [r.from.to_string(), r.to.to_string()])
            .collect();
        let dates: Vec<String> = entry.missing.iter().map(|d| d.to_string()).collect();

        let fields = [
            entry.city.country.clone(),
            entry.city.state_province.clone(),
            entry.city.city.clone(),
            format!("{}/", entry.prefix),
            entry.missing.len().to_string(),
            serde_json::to_string(&ranges)?,
            serde_json::to_string(&dates)?,
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        writeln!(out, "{}", row.join(","))?;
    }

    Ok(())
}

pub fn write_csv_file(path: &Path, report: &[CityCoverage]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(std::io::BufWriter::new(file), report)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
