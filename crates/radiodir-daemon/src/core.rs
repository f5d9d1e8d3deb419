/// DaemonCore: single-owner event loop for all mutable state.
///
/// Host actions and player notifications arrive as `DaemonEvent`s on one
/// mpsc channel and are handled strictly one at a time, so the station set
/// needs no locking.  A handler may suspend on I/O (DNS, HTTP, snapshot file,
/// mpv IPC) but no other event is processed until it finishes.  Nothing is
/// cancelled: a `Stop` queued behind a running `Refresh` runs after it.
///
/// Every reply goes back on the requesting client's oneshot channel; changes
/// other hosts should see are also pushed as `BroadcastMessage`s.
use std::sync::Arc;

use radiodir::client::QueryOptions;
use radiodir::protocol::{Broadcast, Command};
use radiodir::settings::{FavoritesStore, KeyValueStore};
use radiodir::view::build_rows;
use radiodir::{DirectoryCache, Player, SelectionStateMachine};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, warn};

use crate::BroadcastMessage;

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// An action from a host, answered on `reply`.
    Client {
        command: Command,
        reply: oneshot::Sender<Broadcast>,
    },
    /// The player stopped on its own (end of stream, crash, external stop).
    PlayerStopped,
    /// Shutdown requested.
    Shutdown,
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore<S> {
    cache: DirectoryCache,
    favorites: FavoritesStore<S>,
    machine: SelectionStateMachine,
    player: Arc<dyn Player>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl<S: KeyValueStore> DaemonCore<S> {
    pub fn new(
        cache: DirectoryCache,
        favorites: FavoritesStore<S>,
        machine: SelectionStateMachine,
        player: Arc<dyn Player>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        Self {
            cache,
            favorites,
            machine,
            player,
            broadcast_tx,
        }
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");

        loop {
            match event_rx.recv().await {
                None => {
                    info!("DaemonCore: event channel closed, shutting down");
                    break;
                }

                Some(DaemonEvent::Shutdown) => {
                    info!("DaemonCore: shutdown requested");
                    break;
                }

                Some(DaemonEvent::Client { command, reply }) => {
                    info!("DaemonCore: command {:?}", command);
                    let answer = self.handle_command(command).await;
                    // The client may have disconnected meanwhile.
                    let _ = reply.send(answer);
                }

                Some(DaemonEvent::PlayerStopped) => self.player_stopped(),
            }
        }

        self.cleanup().await;
        Ok(())
    }

    /// Handle one host action; failures become `Broadcast::Error`.
    pub async fn handle_command(&mut self, command: Command) -> Broadcast {
        match self.dispatch(command).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("DaemonCore: command error: {}", e);
                Broadcast::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> radiodir::Result<Broadcast> {
        match command {
            Command::Rows { query } => {
                let options = self.refresh_options();
                let stations = self.cache.ensure_loaded(options).await?;
                let rows = build_rows(stations, &self.favorites.ids(), &query);
                Ok(Broadcast::Rows { rows })
            }
            Command::Select { station_id } => {
                let transition = self
                    .machine
                    .select(self.cache.stations_mut(), &station_id, self.player.as_ref())
                    .await;
                // Optimistic updates may have changed status even on failure.
                self.notify_state_changed();
                let text = Some(transition?.status_text());
                self.notify_status(text.clone());
                Ok(Broadcast::Status { text })
            }
            Command::Stop => {
                self.stop_playback().await?;
                Ok(Broadcast::Status { text: None })
            }
            Command::Favorite { station_id } => {
                self.machine.favorite(&mut self.favorites, &station_id)?;
                self.notify_state_changed();
                Ok(Broadcast::StateChanged)
            }
            Command::Refresh => {
                if self.cache.stations().active().is_some() {
                    self.stop_playback().await?;
                }
                let options = self.refresh_options();
                let count = self.cache.refresh(options).await?.len();
                info!("DaemonCore: directory refreshed, {} stations", count);
                self.notify_state_changed();
                Ok(Broadcast::StateChanged)
            }
            Command::Countries { options } => {
                let countries = self.cache.client().list_countries(options).await?;
                Ok(Broadcast::Countries { countries })
            }
            Command::Tags { options } => {
                let tags = self.cache.client().list_tags(options).await?;
                Ok(Broadcast::Tags { tags })
            }
        }
    }

    fn player_stopped(&mut self) {
        if self.cache.stations().active().is_none() {
            return;
        }
        warn!("DaemonCore: player stopped");
        self.machine.on_stopped(self.cache.stations_mut());
        self.notify_status(None);
        self.notify_state_changed();
    }

    async fn stop_playback(&mut self) -> radiodir::Result<()> {
        let result = self
            .machine
            .stop(self.cache.stations_mut(), self.player.as_ref())
            .await;
        self.notify_status(None);
        self.notify_state_changed();
        result
    }

    /// Refresh uses the home country from settings, else the client default.
    fn refresh_options(&self) -> QueryOptions {
        match self.favorites.home_country() {
            Some(country) => QueryOptions::default().country(country),
            None => QueryOptions::default(),
        }
    }

    fn notify_state_changed(&self) {
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }

    fn notify_status(&self, text: Option<String>) {
        let _ = self.broadcast_tx.send(BroadcastMessage::Status(text));
    }

    async fn cleanup(&mut self) {
        info!("DaemonCore: cleanup, stopping player");
        if let Err(e) = self.player.stop().await {
            warn!("DaemonCore: player stop on shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use radiodir::mirror::{Mirror, MirrorResolver};
    use radiodir::settings::{MemoryStore, COUNTRY_KEY};
    use radiodir::{DirectoryClient, PlayerCommand, StationStatus, UpdatePolicy};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct FakePlayer {
        commands: Mutex<Vec<PlayerCommand>>,
    }

    impl FakePlayer {
        fn commands(&self) -> Vec<PlayerCommand> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Player for FakePlayer {
        async fn load(&self, url: &str) -> anyhow::Result<()> {
            self.commands.lock().unwrap().push(PlayerCommand::Load {
                url: url.to_string(),
            });
            Ok(())
        }
        async fn pause(&self) -> anyhow::Result<()> {
            self.commands.lock().unwrap().push(PlayerCommand::Pause);
            Ok(())
        }
        async fn resume(&self) -> anyhow::Result<()> {
            self.commands.lock().unwrap().push(PlayerCommand::Resume);
            Ok(())
        }
        async fn stop(&self) -> anyhow::Result<()> {
            self.commands.lock().unwrap().push(PlayerCommand::Stop);
            Ok(())
        }
    }

    struct Harness {
        core: DaemonCore<MemoryStore>,
        player: Arc<FakePlayer>,
        updates: broadcast::Receiver<BroadcastMessage>,
        _server: MockServer,
        _dir: TempDir,
    }

    async fn harness(store: MemoryStore, country: &str) -> Harness {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/stations/search"))
            .and(query_param("country", country))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"stationuuid": "bbc", "name": "BBC", "url": "http://bbc"},
                {"stationuuid": "npr", "name": "NPR", "url": "http://npr"},
                {"stationuuid": "bbcw", "name": "BBC World", "url": "http://bbcw"}
            ])))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let resolver = MirrorResolver::fixed(Mirror::new(server.uri()));
        let client = DirectoryClient::new(reqwest::Client::new(), Arc::new(resolver), "China");
        let cache = DirectoryCache::new(dir.path().join("db.json"), client);
        let player = Arc::new(FakePlayer::default());
        let (broadcast_tx, updates) = broadcast::channel(32);
        let core = DaemonCore::new(
            cache,
            FavoritesStore::new(store),
            SelectionStateMachine::new(UpdatePolicy::Optimistic),
            player.clone(),
            broadcast_tx,
        );
        Harness {
            core,
            player,
            updates,
            _server: server,
            _dir: dir,
        }
    }

    fn rows_of(answer: Broadcast) -> Vec<(String, StationStatus)> {
        match answer {
            Broadcast::Rows { rows } => rows
                .into_iter()
                .map(|r| (r.station.name, r.station.status))
                .collect(),
            other => panic!("expected rows, got {other:?}"),
        }
    }

    fn rows_cmd(query: &str) -> Command {
        Command::Rows {
            query: query.to_string(),
        }
    }

    #[tokio::test]
    async fn test_rows_select_favorite_flow() {
        let mut h = harness(MemoryStore::new(), "China").await;

        let rows = rows_of(h.core.handle_command(rows_cmd("")).await);
        assert_eq!(rows.len(), 3);

        let answer = h
            .core
            .handle_command(Command::Select {
                station_id: "npr".into(),
            })
            .await;
        assert_eq!(
            answer,
            Broadcast::Status {
                text: Some("NPR - playing".into())
            }
        );

        h.core
            .handle_command(Command::Favorite {
                station_id: "bbcw".into(),
            })
            .await;
        let rows = rows_of(h.core.handle_command(rows_cmd("BBC")).await);
        assert_eq!(
            rows,
            vec![
                ("BBC World".to_string(), StationStatus::Load),
                ("BBC".to_string(), StationStatus::Load)
            ]
        );

        let rows = rows_of(h.core.handle_command(rows_cmd("NPR")).await);
        assert_eq!(rows, vec![("NPR".to_string(), StationStatus::Play)]);
        assert_eq!(
            h.player.commands(),
            vec![PlayerCommand::Load {
                url: "http://npr".into()
            }]
        );
        assert!(matches!(
            h.updates.try_recv(),
            Ok(BroadcastMessage::StateUpdated)
        ));
    }

    #[tokio::test]
    async fn test_player_stopped_resets_without_command() {
        let mut h = harness(MemoryStore::new(), "China").await;
        h.core.handle_command(rows_cmd("")).await;
        h.core
            .handle_command(Command::Select {
                station_id: "bbc".into(),
            })
            .await;

        h.core.player_stopped();
        let rows = rows_of(h.core.handle_command(rows_cmd("")).await);
        assert!(rows.iter().all(|(_, s)| *s == StationStatus::Load));
        assert_eq!(h.player.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_stops_active_station_first() {
        let mut store = MemoryStore::new();
        store
            .set(COUNTRY_KEY, toml::Value::String("Germany".into()))
            .unwrap();
        let mut h = harness(store, "Germany").await;
        h.core.handle_command(rows_cmd("")).await;
        h.core
            .handle_command(Command::Select {
                station_id: "bbc".into(),
            })
            .await;

        let answer = h.core.handle_command(Command::Refresh).await;
        assert_eq!(answer, Broadcast::StateChanged);
        assert_eq!(
            h.player.commands(),
            vec![
                PlayerCommand::Load {
                    url: "http://bbc".into()
                },
                PlayerCommand::Stop
            ]
        );
        let rows = rows_of(h.core.handle_command(rows_cmd("")).await);
        assert!(rows.iter().all(|(_, s)| *s == StationStatus::Load));
    }

    #[tokio::test]
    async fn test_unknown_station_is_reported() {
        let mut h = harness(MemoryStore::new(), "China").await;
        h.core.handle_command(rows_cmd("")).await;
        let answer = h
            .core
            .handle_command(Command::Select {
                station_id: "nope".into(),
            })
            .await;
        assert!(matches!(answer, Broadcast::Error { message } if message.contains("nope")));
    }

    #[tokio::test]
    async fn test_run_answers_and_shuts_down() {
        let h = harness(MemoryStore::new(), "China").await;
        let (event_tx, event_rx) = mpsc::channel(8);
        let task = tokio::spawn(h.core.run(event_rx));

        let (reply_tx, reply_rx) = oneshot::channel();
        event_tx
            .send(DaemonEvent::Client {
                command: rows_cmd("World"),
                reply: reply_tx,
            })
            .await
            .unwrap();
        let rows = rows_of(reply_rx.await.unwrap());
        assert_eq!(rows, vec![("BBC World".to_string(), StationStatus::Load)]);

        event_tx.send(DaemonEvent::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(h.player.commands(), vec![PlayerCommand::Stop]);
    }
}
