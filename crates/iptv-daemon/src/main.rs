mod http;
mod mpv;
mod socket;

use std::sync::Arc;

use iptv_core::{BroadcastMessage, SessionCore, StateManager};
use iptv_proto::config::Config;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

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
        // Only forward WARN and ERROR to clients to avoid clogging the channel
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // No receivers is OK
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
    // Setup broadcast channel first so we can use it for logging
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(256);

    let data_dir = iptv_proto::platform::data_dir();
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
                tracing_subscriber::EnvFilter::new("info,iptv_daemon=debug,iptv_core=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let state_manager = Arc::new(StateManager::new(config.daemon.state_file.clone()));
    let backend = mpv::MpvBackend::new(config.player.clone());

    let (session, mut core_task) =
        SessionCore::spawn(config.clone(), backend, state_manager, broadcast_tx).await;

    let _socket_handle = socket::start_server(
        config.control.bind_address.clone(),
        config.control.socket_port,
        session.clone(),
    );

    if config.control.http_enabled {
        let _http_handle = http::start_server(
            config.control.bind_address.clone(),
            config.control.http_port,
            session.clone(),
        );
    }

    if let Err(e) = session.reload_playlist().await {
        error!("Could not request playlist: {}", e);
    }

    info!("Daemon initialised, running event loop");
    let result = tokio::select! {
        res = &mut core_task => res?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, releasing player");
            session.shutdown().await;
            core_task.await?
        }
    };
    if let Err(e) = &result {
        error!("Session core stopped: {}", e);
    }
    result
}
