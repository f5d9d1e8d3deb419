//! Directory mirror discovery.
//!
//! The directory service publishes its interchangeable API hosts as DNS SRV
//! records.  One target is picked uniformly at random (priority and weight
//! are ignored) and kept for the resolver's lifetime.

use crate::error::{Error, Result};
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use rand::seq::SliceRandom;
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Base URL of one directory mirror, without trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror(String);

impl Mirror {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self(base_url.into().trim_end_matches('/').to_string())
    }

    pub fn base_url(&self) -> &str {
        &self.0
    }

    /// Absolute URL for an API path such as `/json/tags`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }
}

impl fmt::Display for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SRV record source.  Returns target hostnames without the trailing root dot.
#[async_trait]
pub trait SrvLookup: Send + Sync {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<String>>;
}

/// SRV lookups through the system resolver configuration.
pub struct HickoryLookup {
    resolver: TokioAsyncResolver,
}

impl HickoryLookup {
    pub fn from_system_conf() -> Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| Error::Discovery(format!("resolver setup failed: {e}")))?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl SrvLookup for HickoryLookup {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<String>> {
        let lookup = self
            .resolver
            .srv_lookup(name)
            .await
            .map_err(|e| Error::Discovery(format!("SRV lookup for {name} failed: {e}")))?;
        Ok(lookup
            .iter()
            .map(|srv| srv.target().to_utf8().trim_end_matches('.').to_string())
            .filter(|host| !host.is_empty())
            .collect())
    }
}

pub struct MirrorResolver {
    lookup: Option<Box<dyn SrvLookup>>,
    discovery_name: String,
    scheme: String,
    cached: Mutex<Option<Mirror>>,
}

impl MirrorResolver {
    pub fn new(
        lookup: Box<dyn SrvLookup>,
        discovery_name: impl Into<String>,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            lookup: Some(lookup),
            discovery_name: discovery_name.into(),
            scheme: scheme.into(),
            cached: Mutex::new(None),
        }
    }

    /// A resolver pinned to one mirror; it never performs a lookup.
    pub fn fixed(mirror: Mirror) -> Self {
        Self {
            lookup: None,
            discovery_name: String::new(),
            scheme: String::new(),
            cached: Mutex::new(Some(mirror)),
        }
    }

    /// Every mirror URL currently advertised, in record order.
    pub async fn candidates(&self) -> Result<Vec<Mirror>> {
        let Some(lookup) = self.lookup.as_ref() else {
            return Ok(self.cached.lock().await.iter().cloned().collect());
        };
        let hosts = lookup.lookup_srv(&self.discovery_name).await?;
        debug!("SRV {} returned {} hosts", self.discovery_name, hosts.len());
        Ok(hosts
            .into_iter()
            .map(|host| Mirror::new(format!("{}://{}", self.scheme, host)))
            .collect())
    }

    /// The cached mirror, discovering one on first use.
    pub async fn resolve(&self) -> Result<Mirror> {
        let mut cached = self.cached.lock().await;
        if let Some(mirror) = cached.as_ref() {
            return Ok(mirror.clone());
        }

        let candidates = self.candidates().await?;
        let mirror = candidates
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| {
                Error::Discovery(format!("no SRV records for {}", self.discovery_name))
            })?;

        info!("Using directory mirror {}", mirror);
        *cached = Some(mirror.clone());
        Ok(mirror)
    }

    /// Forget the cached mirror so the next `resolve` looks up again.
    /// A fixed resolver keeps its mirror.
    pub async fn invalidate(&self) {
        if self.lookup.is_some() {
            *self.cached.lock().await = None;
        }
    }

    pub async fn cached(&self) -> Option<Mirror> {
        self.cached.lock().await.clone()
    }
}
