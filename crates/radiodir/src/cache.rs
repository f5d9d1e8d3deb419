//! On-disk snapshot of the station directory.
//!
//! The snapshot is a flat JSON array of stations.  A missing or unparseable
//! file is never an error: it simply means "refresh from the directory".
//! Refresh replaces the whole set, with every station back at `load`.

use crate::client::{DirectoryClient, QueryOptions};
use crate::error::{Error, Result};
use crate::station::{Station, StationSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct DirectoryCache {
    snapshot_path: PathBuf,
    client: DirectoryClient,
    stations: StationSet,
}

impl DirectoryCache {
    pub fn new(snapshot_path: impl Into<PathBuf>, client: DirectoryClient) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            client,
            stations: StationSet::default(),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn client(&self) -> &DirectoryClient {
        &self.client
    }

    /// The in-memory set, as last loaded or refreshed.
    pub fn stations(&self) -> &StationSet {
        &self.stations
    }

    pub fn stations_mut(&mut self) -> &mut StationSet {
        &mut self.stations
    }

    pub async fn has_local_snapshot(&self) -> bool {
        tokio::fs::try_exists(&self.snapshot_path)
            .await
            .unwrap_or(false)
    }

    /// The in-memory set when it has stations, otherwise [`Self::load_or_refresh`].
    pub async fn ensure_loaded(&mut self, options: QueryOptions) -> Result<&StationSet> {
        if self.stations.is_empty() {
            self.load_or_refresh(options).await
        } else {
            Ok(&self.stations)
        }
    }

    /// Load the snapshot as is; refresh when it is missing or unparseable.
    pub async fn load_or_refresh(&mut self, options: QueryOptions) -> Result<&StationSet> {
        match self.read_snapshot().await? {
            Some(stations) => {
                info!(
                    "Loaded {} stations from {}",
                    stations.len(),
                    self.snapshot_path.display()
                );
                self.stations = stations;
                Ok(&self.stations)
            }
            None => self.refresh(options).await,
        }
    }

    /// Fetch a fresh result set, persist it, then swap it in.
    ///
    /// Callers stop playback first: the active station is discarded here.
    /// On any failure the in-memory set and the snapshot file are left as
    /// they were.
    pub async fn refresh(&mut self, options: QueryOptions) -> Result<&StationSet> {
        let mut stations = self.client.search(options).await?;
        for station in &mut stations {
            station.normalize();
        }

        ensure_file_exists(&self.snapshot_path).await?;
        let json = serde_json::to_vec(&stations).map_err(|e| {
            Error::storage(
                &self.snapshot_path,
                std::io::Error::new(ErrorKind::InvalidData, e),
            )
        })?;
        write_replacing(&self.snapshot_path, &json).await?;

        info!(
            "Refreshed {} stations into {}",
            stations.len(),
            self.snapshot_path.display()
        );
        self.stations = StationSet::new(stations);
        Ok(&self.stations)
    }

    async fn read_snapshot(&self) -> Result<Option<StationSet>> {
        let content = match tokio::fs::read(&self.snapshot_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No snapshot at {}", self.snapshot_path.display());
                return Ok(None);
            }
            Err(e) => return Err(Error::storage(&self.snapshot_path, e)),
        };
        match serde_json::from_slice::<Vec<Station>>(&content) {
            Ok(stations) => Ok(Some(StationSet::new(stations))),
            Err(e) => {
                warn!(
                    "Ignoring unparseable snapshot {}: {}",
                    self.snapshot_path.display(),
                    e
                );
                Ok(None)
            }
        }
    }
}

/// Write `content` beside `path`, then rename it over `path`.
async fn write_replacing(path: &Path, content: &[u8]) -> Result<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    if let Err(e) = tokio::fs::write(&staging, content).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(Error::storage(&staging, e));
    }
    tokio::fs::rename(&staging, path)
        .await
        .map_err(|e| Error::storage(path, e))
}

/// Create `path` and its parents if needed.  An existing file is left untouched.
pub async fn ensure_file_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::storage(parent, e))?;
    }
    match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(Error::storage(path, e)),
    }
}
