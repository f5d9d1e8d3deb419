#![allow(dead_code)]

use async_trait::async_trait;
use radiodir::mirror::SrvLookup;
use radiodir::{Player, PlayerCommand};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// SRV records served from memory; counts lookups.
pub struct FakeSrv {
    hosts: Vec<String>,
    pub lookups: Arc<AtomicUsize>,
}

impl FakeSrv {
    pub fn new(hosts: &[&str]) -> Self {
        Self {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SrvLookup for FakeSrv {
    async fn lookup_srv(&self, _name: &str) -> radiodir::Result<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.hosts.clone())
    }
}

/// Player double recording every command it takes.
#[derive(Default)]
pub struct RecordingPlayer {
    commands: Mutex<Vec<PlayerCommand>>,
}

impl RecordingPlayer {
    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.commands.lock().unwrap().clone()
    }

    fn push(&self, command: PlayerCommand) -> anyhow::Result<()> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

#[async_trait]
impl Player for RecordingPlayer {
    async fn load(&self, url: &str) -> anyhow::Result<()> {
        self.push(PlayerCommand::Load {
            url: url.to_string(),
        })
    }
    async fn pause(&self) -> anyhow::Result<()> {
        self.push(PlayerCommand::Pause)
    }
    async fn resume(&self) -> anyhow::Result<()> {
        self.push(PlayerCommand::Resume)
    }
    async fn stop(&self) -> anyhow::Result<()> {
        self.push(PlayerCommand::Stop)
    }
}

pub fn provider_stations() -> serde_json::Value {
    json!([
        {"stationuuid": "bbc", "name": "BBC", "url": "http://bbc", "countrycode": "GB"},
        {"stationuuid": "npr", "name": "NPR", "url": "http://npr", "url_resolved": null},
        {"stationuuid": "bbcw", "name": "BBC World", "url": "http://bbcw", "homepage": "https://bbc.co.uk"}
    ])
}

/// A directory mirror answering station searches with `provider_stations`.
pub async fn directory_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/stations/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider_stations()))
        .mount(&server)
        .await;
    server
}
