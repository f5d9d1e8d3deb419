//! Internet radio station directory: mirror discovery, directory client,
//! local snapshot cache, display rows and the playback selection state.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod mirror;
pub mod platform;
pub mod player;
pub mod protocol;
pub mod selection;
pub mod settings;
pub mod station;
pub mod view;

pub use cache::DirectoryCache;
pub use client::{DirectoryClient, QueryOptions};
pub use error::{Error, Result};
pub use mirror::{Mirror, MirrorResolver};
pub use player::{Player, PlayerCommand};
pub use selection::{SelectionStateMachine, Transition, UpdatePolicy};
pub use settings::{FavoritesStore, KeyValueStore, MemoryStore, TomlFileStore};
pub use station::{Station, StationSet, StationStatus};
pub use view::Row;
