//! Outbound command interface to the external audio player.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The audio player collaborator.  Each call completes when the player has
/// taken the command; decoding and output happen elsewhere.
///
/// The player also reports `stopped` on its own (end of stream, external
/// interruption); how that notification arrives is up to the implementation.
#[async_trait]
pub trait Player: Send + Sync {
    async fn load(&self, url: &str) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn resume(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
}

/// A player command as data, for logs and test doubles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum PlayerCommand {
    Load { url: String },
    Pause,
    Resume,
    Stop,
}

impl PlayerCommand {
    pub async fn send_to<P: Player + ?Sized>(&self, player: &P) -> anyhow::Result<()> {
        match self {
            PlayerCommand::Load { url } => player.load(url).await,
            PlayerCommand::Pause => player.pause().await,
            PlayerCommand::Resume => player.resume().await,
            PlayerCommand::Stop => player.stop().await,
        }
    }
}
