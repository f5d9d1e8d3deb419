use serde::{Deserialize, Serialize};

use crate::client::QueryOptions;
use crate::station::{Country, Tag};
use crate::view::Row;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Hosts check this on connect.
pub const PROTOCOL_VERSION: u32 = 1;

/// Actions sent from a host UI to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Display rows, filtered by `query` (empty = everything).
    Rows {
        #[serde(default)]
        query: String,
    },
    Select {
        station_id: String,
    },
    Stop,
    Favorite {
        station_id: String,
    },
    Refresh,
    Countries {
        #[serde(default)]
        options: QueryOptions,
    },
    Tags {
        #[serde(default)]
        options: QueryOptions,
    },
}

/// Messages sent from the daemon to hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect.
    Hello {
        protocol_version: u32,
    },
    Rows {
        rows: Vec<Row>,
    },
    Countries {
        countries: Vec<Country>,
    },
    Tags {
        tags: Vec<Tag>,
    },
    /// Status bar line; `None` hides it.
    Status {
        text: Option<String>,
    },
    /// Station statuses or favorites changed; hosts re-request rows.
    StateChanged,
    Log {
        message: String,
    },
    Error {
        message: String,
    },
}

/// Wrapper for socket communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    /// 4-byte big-endian length, then the JSON body.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = u32::try_from(json.len())?;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Decode one frame from the front of `data`; returns it with the bytes consumed.
    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}
