//! Display rows for the host list.
//!
//! Pipeline, in this exact order: annotate every station with its favorite
//! flag and label, keep stations whose name contains the query (literal,
//! case-sensitive), then stable-sort favorites first.  There is no secondary
//! sort key; within each group the cached order is kept.

use crate::station::{Station, StationStatus};
use serde::{Deserialize, Serialize};

/// A view-ready projection of one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub label: String,
    pub station: Station,
}

impl Row {
    pub fn id(&self) -> &str {
        &self.station.id
    }

    pub fn status(&self) -> StationStatus {
        self.station.status
    }
}

/// `[status]* name-with-hyphens`; the `*` only for favorites.
pub fn format_label(status: StationStatus, collected: bool, name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    format!("[{}]{} {}", status, if collected { "*" } else { "" }, name)
}

/// Copy of `station` with `id`, `collected` and `label` filled in.
pub fn annotate(station: &Station, favorites: &[String]) -> Station {
    let collected = favorites.iter().any(|f| *f == station.stationuuid);
    let mut annotated = station.clone();
    annotated.id = station.stationuuid.clone();
    annotated.collected = u8::from(collected);
    annotated.label = format_label(station.status, collected, &station.name);
    annotated
}

pub fn build_rows<'a, I>(stations: I, favorites: &[String], query: &str) -> Vec<Row>
where
    I: IntoIterator<Item = &'a Station>,
{
    let mut rows: Vec<Row> = stations
        .into_iter()
        .map(|station| annotate(station, favorites))
        .filter(|station| query.is_empty() || station.name.contains(query))
        .map(|station| Row {
            label: station.label.clone(),
            station,
        })
        .collect();
    // sort_by_key is stable
    rows.sort_by_key(|row| std::cmp::Reverse(row.station.collected));
    rows
}

/// The row query from host list arguments: the last one not starting with `--`.
pub fn query_from_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(AsRef::as_ref)
        .filter(|arg| !arg.starts_with("--"))
        .last()
        .unwrap_or_default()
        .to_string()
}
