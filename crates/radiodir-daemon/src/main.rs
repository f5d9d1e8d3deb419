mod core;
mod mpv;
mod socket;

use std::sync::Arc;

use radiodir::config::Config;
use radiodir::{
    DirectoryCache, DirectoryClient, FavoritesStore, SelectionStateMachine, TomlFileStore,
    UpdatePolicy,
};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// Station statuses, favorites or the directory changed.
    StateUpdated,
    /// New status bar line; `None` hides it.
    Status(Option<String>),
    Log(String),
}

/// A custom tracing layer that forwards log messages to the broadcast channel
struct BroadcastLayer {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastLayer {
    fn new(sender: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        // Hosts only get WARN and ERROR
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // No receivers is fine
        let _ = self.sender.send(BroadcastMessage::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    let data_dir = radiodir::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(BroadcastLayer::new(broadcast_tx.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,radiodir=debug,radiodir_daemon=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    // All external inputs funnel into DaemonCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::DaemonEvent>(256);

    let client = DirectoryClient::from_config(&config.directory)?;
    let cache = DirectoryCache::new(config.daemon.snapshot_file.clone(), client);
    let favorites = FavoritesStore::new(TomlFileStore::open(config.daemon.settings_file.clone())?);
    let machine =
        SelectionStateMachine::new(UpdatePolicy::from_optimistic(config.player.optimistic_status));
    let player = Arc::new(mpv::MpvPlayer::new(event_tx.clone()));

    let daemon_core = core::DaemonCore::new(
        cache,
        favorites,
        machine,
        player.clone(),
        broadcast_tx.clone(),
    );

    let _socket_handle = socket::start_server(
        config.daemon.bind_address.clone(),
        config.daemon.port,
        event_tx.clone(),
        broadcast_tx.clone(),
    );

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(core::DaemonEvent::Shutdown).await;
        }
    });

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;
    player.shutdown().await;

    Ok(())
}
