//! HTTP client for the station directory API.
//!
//! Every call resolves the mirror first (once per resolver lifetime), merges
//! the caller's options over per-endpoint defaults and decodes the JSON array
//! the directory answers with.  There is no retry and no second mirror: a
//! failure is returned to the caller as is.

use crate::config::DirectoryConfig;
use crate::error::{Error, Result};
use crate::mirror::{HickoryLookup, Mirror, MirrorResolver};
use crate::station::{Country, Station, Tag};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const SEARCH_PATH: &str = "/json/stations/search";
pub const COUNTRIES_PATH: &str = "/json/countries";
pub const TAGS_PATH: &str = "/json/tags";

/// Query options shared by all directory endpoints.
///
/// Unset fields fall back to the endpoint's defaults; set fields win.
/// `country` only applies to station search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidebroken: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl QueryOptions {
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = Some(reverse);
        self
    }

    pub fn hidebroken(mut self, hidebroken: bool) -> Self {
        self.hidebroken = Some(hidebroken);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Field-by-field shallow merge: `self` overrides `defaults`.
    pub fn merged_over(self, defaults: QueryOptions) -> QueryOptions {
        QueryOptions {
            country: self.country.or(defaults.country),
            order: self.order.or(defaults.order),
            reverse: self.reverse.or(defaults.reverse),
            hidebroken: self.hidebroken.or(defaults.hidebroken),
            offset: self.offset.or(defaults.offset),
            limit: self.limit.or(defaults.limit),
        }
    }

    /// `key=value` pairs in a stable order: defaults' keys first, then
    /// paging keys that only callers set.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(country) = &self.country {
            pairs.push(("country", country.clone()));
        }
        if let Some(order) = &self.order {
            pairs.push(("order", order.clone()));
        }
        if let Some(reverse) = self.reverse {
            pairs.push(("reverse", reverse.to_string()));
        }
        if let Some(hidebroken) = self.hidebroken {
            pairs.push(("hidebroken", hidebroken.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

/// `?k=v&k=v` with each value encoded as a URI component.
pub fn build_query(pairs: &[(&str, String)]) -> String {
    let mut query = String::new();
    for (key, value) in pairs {
        query.push(if query.is_empty() { '?' } else { '&' });
        query.push_str(key);
        query.push('=');
        query.push_str(&urlencoding::encode(value));
    }
    query
}

#[derive(Debug, Deserialize)]
struct RawCountry {
    name: String,
    #[serde(default)]
    stationcount: u64,
    #[serde(default)]
    iso_3166_1: String,
}

impl From<RawCountry> for Country {
    fn from(raw: RawCountry) -> Self {
        Country {
            name: raw.name,
            count: raw.stationcount,
            countrycode: raw.iso_3166_1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTag {
    name: String,
    #[serde(default)]
    stationcount: u64,
}

impl From<RawTag> for Tag {
    fn from(raw: RawTag) -> Self {
        Tag {
            name: raw.name,
            count: raw.stationcount,
        }
    }
}

fn decode_array<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<Vec<T>> {
    let decode_err = |reason: String| Error::Decode {
        url: url.to_string(),
        reason,
    };
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| decode_err(format!("invalid JSON: {e}")))?;
    if !value.is_array() {
        return Err(decode_err("expected a JSON array".to_string()));
    }
    serde_json::from_value(value).map_err(|e| decode_err(format!("unexpected element: {e}")))
}

#[derive(Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    resolver: Arc<MirrorResolver>,
    default_country: String,
}

impl DirectoryClient {
    pub fn new(
        http: reqwest::Client,
        resolver: Arc<MirrorResolver>,
        default_country: impl Into<String>,
    ) -> Self {
        Self {
            http,
            resolver,
            default_country: default_country.into(),
        }
    }

    /// Client wired the way the configuration asks: a fixed mirror when one
    /// is configured, SRV discovery otherwise.
    pub fn from_config(config: &DirectoryConfig) -> Result<Self> {
        let resolver = match &config.mirror {
            Some(url) => MirrorResolver::fixed(Mirror::new(url.clone())),
            None => MirrorResolver::new(
                Box::new(HickoryLookup::from_system_conf()?),
                config.discovery_name.clone(),
                config.scheme.clone(),
            ),
        };
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Settings(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::new(http, Arc::new(resolver), config.default_country.clone()))
    }

    pub fn resolver(&self) -> &Arc<MirrorResolver> {
        &self.resolver
    }

    pub fn default_country(&self) -> &str {
        &self.default_country
    }

    pub fn search_defaults(&self) -> QueryOptions {
        QueryOptions::default()
            .country(self.default_country.clone())
            .order("clickcount")
            .reverse(true)
            .hidebroken(true)
    }

    pub fn listing_defaults() -> QueryOptions {
        QueryOptions::default()
            .order("name")
            .reverse(true)
            .hidebroken(true)
    }

    /// Search stations.  Defaults: home country, most clicked first, broken hidden.
    pub async fn search(&self, options: QueryOptions) -> Result<Vec<Station>> {
        let merged = options.merged_over(self.search_defaults());
        let stations: Vec<Station> = self.get_array(SEARCH_PATH, &merged).await?;
        info!("Directory search returned {} stations", stations.len());
        Ok(stations)
    }

    pub async fn list_countries(&self, options: QueryOptions) -> Result<Vec<Country>> {
        let merged = Self::listing_options(options);
        let raw: Vec<RawCountry> = self.get_array(COUNTRIES_PATH, &merged).await?;
        Ok(raw.into_iter().map(Country::from).collect())
    }

    pub async fn list_tags(&self, options: QueryOptions) -> Result<Vec<Tag>> {
        let merged = Self::listing_options(options);
        let raw: Vec<RawTag> = self.get_array(TAGS_PATH, &merged).await?;
        Ok(raw.into_iter().map(Tag::from).collect())
    }

    fn listing_options(options: QueryOptions) -> QueryOptions {
        let mut merged = options.merged_over(Self::listing_defaults());
        merged.country = None;
        merged
    }

    async fn get_array<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &QueryOptions,
    ) -> Result<Vec<T>> {
        let mirror = self.resolver.resolve().await?;
        let url = format!("{}{}", mirror.endpoint(path), build_query(&options.pairs()));
        debug!("GET {}", url);

        let network_err = |source: reqwest::Error| Error::Network {
            url: url.clone(),
            source,
        };
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(network_err)?;
        let body = response.bytes().await.map_err(network_err)?;
        decode_array(&url, &body)
    }
}
