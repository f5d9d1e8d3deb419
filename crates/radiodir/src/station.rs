//! Station records and the cached station set.
//!
//! A [`Station`] keeps the handful of provider fields the core reads as typed
//! values and carries everything else the directory returns in `extra`, so a
//! snapshot written to disk round-trips the provider payload unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Per-station playback status.
///
/// At most one station in a [`StationSet`] is ever outside `Load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    /// Idle and selectable.
    #[default]
    Load,
    /// Audible.
    Play,
    /// Loaded in the player but paused.
    Paused,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Play => "play",
            Self::Paused => "paused",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Load)
    }
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub stationuuid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url_resolved: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub countrycode: String,
    /// Comma-separated provider tags.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub codec: String,
    #[serde(default)]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub votes: Option<u64>,
    #[serde(default)]
    pub clickcount: Option<u64>,

    // Derived fields, never sent by the provider.
    /// Always equal to `stationuuid` once normalised.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// 1 when the station is in the favorites set.
    #[serde(default)]
    pub collected: u8,
    #[serde(default)]
    pub status: StationStatus,

    /// Remaining provider metadata, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Station {
    pub fn new(
        stationuuid: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let stationuuid = stationuuid.into();
        Self {
            id: stationuuid.clone(),
            stationuuid,
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Reset derived fields the way a fresh refresh leaves them.
    pub fn normalize(&mut self) {
        self.id = self.stationuuid.clone();
        self.status = StationStatus::Load;
        self.collected = 0;
        self.label = crate::view::format_label(self.status, false, &self.name);
    }

    pub fn is_collected(&self) -> bool {
        self.collected != 0
    }
}

/// The ordered collection of every cached station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationSet {
    stations: Vec<Station>,
}

impl StationSet {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Station> {
        self.stations.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Station> {
        self.stations.iter_mut()
    }

    pub fn as_slice(&self) -> &[Station] {
        &self.stations
    }

    pub fn get(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.stationuuid == id)
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.stations.iter().position(|s| s.stationuuid == id)
    }

    pub(crate) fn station_mut(&mut self, idx: usize) -> &mut Station {
        &mut self.stations[idx]
    }

    /// The station currently playing or paused, if any.
    pub fn active(&self) -> Option<&Station> {
        self.stations.iter().find(|s| s.status.is_active())
    }

    /// Number of stations outside `load`; 0 or 1 whenever the set is consistent.
    pub fn active_count(&self) -> usize {
        self.stations.iter().filter(|s| s.status.is_active()).count()
    }

    pub fn reset_all(&mut self) {
        for station in &mut self.stations {
            station.status = StationStatus::Load;
        }
    }

    pub fn into_inner(self) -> Vec<Station> {
        self.stations
    }
}

impl From<Vec<Station>> for StationSet {
    fn from(stations: Vec<Station>) -> Self {
        Self::new(stations)
    }
}

impl<'a> IntoIterator for &'a StationSet {
    type Item = &'a Station;
    type IntoIter = std::slice::Iter<'a, Station>;

    fn into_iter(self) -> Self::IntoIter {
        self.stations.iter()
    }
}

/// One entry of the directory's country listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    pub count: u64,
    pub countrycode: String,
}

/// One entry of the directory's tag listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&StationStatus::Paused).unwrap(), "\"paused\"");
        let s: StationStatus = serde_json::from_str("\"play\"").unwrap();
        assert_eq!(s, StationStatus::Play);
        assert_eq!(StationStatus::default(), StationStatus::Load);
    }

    #[test]
    fn test_provider_payload_keeps_unknown_fields() {
        let raw = json!({
            "stationuuid": "abc",
            "name": "Radio One",
            "url": "http://one.example/stream",
            "bitrate": 128,
            "geo_lat": null,
            "has_extended_info": false,
            "lastcheckok": 1
        });
        let station: Station = serde_json::from_value(raw).unwrap();
        assert_eq!(station.stationuuid, "abc");
        assert_eq!(station.bitrate, Some(128));
        assert_eq!(station.status, StationStatus::Load);
        assert_eq!(station.extra.get("lastcheckok"), Some(&json!(1)));

        let back = serde_json::to_value(&station).unwrap();
        assert_eq!(back["geo_lat"], json!(null));
        assert_eq!(back["has_extended_info"], json!(false));
        assert_eq!(back["status"], json!("load"));
    }

    #[test]
    fn test_null_strings_become_empty() {
        let station: Station =
            serde_json::from_value(json!({"stationuuid": "x", "name": null, "codec": null}))
                .unwrap();
        assert_eq!(station.name, "");
        assert_eq!(station.codec, "");
    }

    #[test]
    fn test_normalize_sets_derived_fields() {
        let mut station = Station::new("u1", "Jazz FM", "http://jazz");
        station.id.clear();
        station.status = StationStatus::Paused;
        station.collected = 1;
        station.normalize();
        assert_eq!(station.id, "u1");
        assert_eq!(station.status, StationStatus::Load);
        assert_eq!(station.collected, 0);
        assert_eq!(station.label, "[load] Jazz-FM");
    }

    #[test]
    fn test_set_active_and_reset() {
        let mut set = StationSet::new(vec![
            Station::new("a", "A", "http://a"),
            Station::new("b", "B", "http://b"),
        ]);
        assert!(set.active().is_none());

        let idx = set.position("b").unwrap();
        set.station_mut(idx).status = StationStatus::Paused;
        assert_eq!(set.active().map(|s| s.stationuuid.as_str()), Some("b"));
        assert_eq!(set.active_count(), 1);

        set.reset_all();
        assert_eq!(set.active_count(), 0);
    }
}
