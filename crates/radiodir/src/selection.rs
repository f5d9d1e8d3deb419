//! Per-station playback status and the actions that drive it.
//!
//! ```text
//!   load ──select──▶ play ──select──▶ paused
//!                     ▲                 │
//!                     └─────select──────┘
//!   any ──stop / stopped──▶ load (every station)
//! ```
//!
//! Selecting a `load` station demotes every other station to `load`, so at
//! most one station is ever `play` or `paused`.
//!
//! With [`UpdatePolicy::Optimistic`] the status is written before the player
//! command is awaited.  If the command then fails the error is returned and
//! the status stays as written, so status and real playback can diverge.

use crate::error::{Error, Result};
use crate::player::{Player, PlayerCommand};
use crate::settings::{FavoritesStore, KeyValueStore};
use crate::station::{StationSet, StationStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// Write status, then await the player.
    #[default]
    Optimistic,
    /// Await the player, then write status.  A failed command changes nothing.
    Confirmed,
}

impl UpdatePolicy {
    pub fn from_optimistic(optimistic: bool) -> Self {
        if optimistic {
            Self::Optimistic
        } else {
            Self::Confirmed
        }
    }
}

/// Result of a `select` action.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub station_id: String,
    pub name: String,
    pub status: StationStatus,
    pub command: PlayerCommand,
}

impl Transition {
    /// Status bar text, e.g. `Radio One - playing`.
    pub fn status_text(&self) -> String {
        let state = match self.status {
            StationStatus::Play => "playing",
            StationStatus::Paused => "paused",
            StationStatus::Load => "stopped",
        };
        format!("{} - {}", self.name, state)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectionStateMachine {
    policy: UpdatePolicy,
}

impl SelectionStateMachine {
    pub fn new(policy: UpdatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    /// Next status and player command for selecting the station at `idx`.
    fn plan(set: &StationSet, idx: usize) -> (StationStatus, PlayerCommand) {
        let station = &set.as_slice()[idx];
        match station.status {
            StationStatus::Load => (
                StationStatus::Play,
                PlayerCommand::Load {
                    url: station.url.clone(),
                },
            ),
            StationStatus::Play => (StationStatus::Paused, PlayerCommand::Pause),
            StationStatus::Paused => (StationStatus::Play, PlayerCommand::Resume),
        }
    }

    /// Loading resets every other station; pause and resume touch only `idx`.
    fn apply(set: &mut StationSet, idx: usize, next: StationStatus) {
        if set.as_slice()[idx].status == StationStatus::Load {
            set.reset_all();
            set.station_mut(idx).status = next;
            debug_assert_eq!(set.active_count(), 1);
            return;
        }
        set.station_mut(idx).status = next;
        let active = set.active_count();
        if active > 1 {
            warn!("{} stations are active at once; selecting an idle one resets them", active);
        }
    }

    pub async fn select<P: Player + ?Sized>(
        &self,
        set: &mut StationSet,
        station_id: &str,
        player: &P,
    ) -> Result<Transition> {
        let idx = set
            .position(station_id)
            .ok_or_else(|| Error::UnknownStation(station_id.to_string()))?;
        let (next, command) = Self::plan(set, idx);
        let name = set.as_slice()[idx].name.clone();
        debug!("select {} ({}): {:?}", name, station_id, command);

        match self.policy {
            UpdatePolicy::Optimistic => {
                Self::apply(set, idx, next);
                if let Err(e) = command.send_to(player).await {
                    warn!("Player rejected {:?} for {}: {}", command, name, e);
                    return Err(Error::Player(e));
                }
            }
            UpdatePolicy::Confirmed => {
                command.send_to(player).await?;
                Self::apply(set, idx, next);
            }
        }

        info!("Station '{}' is now {}", name, next);
        Ok(Transition {
            station_id: station_id.to_string(),
            name,
            status: next,
            command,
        })
    }

    /// Stop playback and return every station to `load`.
    pub async fn stop<P: Player + ?Sized>(&self, set: &mut StationSet, player: &P) -> Result<()> {
        match self.policy {
            UpdatePolicy::Optimistic => {
                set.reset_all();
                player.stop().await?;
            }
            UpdatePolicy::Confirmed => {
                player.stop().await?;
                set.reset_all();
            }
        }
        info!("Playback stopped");
        Ok(())
    }

    /// The player stopped by itself; no command is sent back.
    pub fn on_stopped(&self, set: &mut StationSet) {
        if let Some(active) = set.active() {
            info!("Player stopped while '{}' was {}", active.name, active.status);
        }
        set.reset_all();
    }

    /// Toggle a station in the favorites set.  Status is never touched.
    pub fn favorite<S: KeyValueStore>(
        &self,
        favorites: &mut FavoritesStore<S>,
        station_id: &str,
    ) -> Result<bool> {
        let added = favorites.toggle(station_id)?;
        info!(
            "Station {} {} favorites",
            station_id,
            if added { "added to" } else { "removed from" }
        );
        Ok(added)
    }
}
