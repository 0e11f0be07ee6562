mod connectivity;
mod core;
mod display;
mod http;
mod mpv;
mod socket;

use std::sync::Arc;

use radio_control::{Controller, Settings};
use radio_proto::catalog;
use radio_proto::config::Config;
use radio_proto::protocol::View;
use radio_proto::state::StateManager;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// A new status snapshot was published to the StateManager.
    StatusUpdated,
    /// The panel should show this view now.
    View { view: View, lines: Vec<String> },
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
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        // Only forward WARN and ERROR to clients
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
    // Setup broadcast channel first so we can use it for logging
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    let data_dir = radio_proto::platform::data_dir();
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
                tracing_subscriber::EnvFilter::new("info,knob_radio=debug,radio_control=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let state_manager = Arc::new(StateManager::new(config.daemon.state_file.clone()));
    let volume = state_manager
        .saved_volume()
        .unwrap_or(config.controller.starting_volume)
        .min(100);

    // Event channel — all external inputs funnel into the ControlLoop
    let (event_tx, event_rx) = mpsc::channel::<core::DaemonEvent>(256);

    // Initial reachability, so the first view is already correct
    let probe_client = connectivity::probe_client(&config.connectivity);
    let online = connectivity::probe(&probe_client, &config.connectivity.probe_url).await;
    info!("Internet reachable at startup: {}", online);
    let link = connectivity::SharedLink::new(online);

    let stations = catalog::load_stations(&config).await;

    // Transport worker owns mpv; the controller only queues commands
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let transport = mpv::MpvTransport::new(transport_tx);
    let transport_worker = tokio::spawn(mpv::run_transport(transport_rx, event_tx.clone()));

    let display = display::PanelDisplay::new(config.display.columns, broadcast_tx.clone());

    let controller = Controller::new(
        Settings::from(&config.controller),
        volume,
        stations,
        transport.clone(),
        display,
        link.clone(),
    );

    let _socket_handle = socket::start_server(
        config.knobs.bind_address.clone(),
        config.knobs.port,
        state_manager.clone(),
        event_tx.clone(),
        broadcast_tx.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            state_manager.clone(),
            event_tx.clone(),
        );
    }

    let _monitor_handle =
        connectivity::spawn_monitor(config.connectivity.clone(), link, event_tx.clone());

    // Ctrl-C / SIGTERM leave the loop so mpv is stopped before exit
    tokio::spawn(core::forward_shutdown(core::shutdown_signal(), event_tx.clone()));

    info!("Daemon initialised, running event loop");
    let control = core::ControlLoop::new(
        controller,
        config,
        state_manager,
        broadcast_tx,
        event_tx,
    );
    let result = control.run(event_rx).await;

    transport.shutdown();
    if let Err(e) = transport_worker.await {
        warn!("Transport worker ended abnormally: {}", e);
    }
    info!("Daemon stopped");
    result
}
