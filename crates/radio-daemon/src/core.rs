/// ControlLoop — single-owner event loop around the knob controller.
///
/// Every input (knob frames from the socket, HTTP calls, connectivity
/// transitions, stream titles from the transport worker) arrives as a
/// `DaemonEvent` on one mpsc queue and is handled to completion before the
/// next.  Display timers and the long-press timer are not tasks: the loop
/// sleeps until the controller's earliest deadline and then fires it, so a
/// timer can never race an event.
///
/// After each handled event the controller status is published to the
/// `StateManager` and announced with `BroadcastMessage::StatusUpdated`.
use std::sync::Arc;

use radio_control::{Connectivity, ControlEvent, Controller, DisplaySink, Transport};
use radio_proto::catalog;
use radio_proto::config::Config;
use radio_proto::protocol::Command;
use radio_proto::state::StateManager;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::BroadcastMessage;

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the ControlLoop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// Input for the controller (connectivity, stream titles, loaded catalogs).
    Control(ControlEvent),
    /// A command from a socket client or the HTTP API.
    Command(Command),
    /// Ctrl-C or SIGTERM: leave the loop so the transport can stop mpv.
    Shutdown,
}

// ── ControlLoop ───────────────────────────────────────────────────────────────

pub struct ControlLoop<T, D, C> {
    controller: Controller<T, D, C>,
    config: Config,
    state_manager: Arc<StateManager>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    /// Loopback for background work (catalog reloads) that ends in an event.
    event_tx: mpsc::Sender<DaemonEvent>,
}

impl<T, D, C> ControlLoop<T, D, C>
where
    T: Transport,
    D: DisplaySink,
    C: Connectivity,
{
    pub fn new(
        controller: Controller<T, D, C>,
        config: Config,
        state_manager: Arc<StateManager>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        event_tx: mpsc::Sender<DaemonEvent>,
    ) -> Self {
        Self {
            controller,
            config,
            state_manager,
            broadcast_tx,
            event_tx,
        }
    }

    /// Run until a `Shutdown` event arrives.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("ControlLoop: starting event loop");
        self.publish().await;

        loop {
            let deadline = self.controller.next_deadline();
            tokio::select! {
                evt = event_rx.recv() => match evt {
                    None => {
                        info!("ControlLoop: event channel closed");
                        break;
                    }
                    Some(DaemonEvent::Shutdown) => {
                        info!("ControlLoop: shutdown requested");
                        break;
                    }
                    Some(evt) => self.dispatch(evt),
                },
                _ = sleep_until(deadline) => {
                    self.controller.on_timer(now());
                }
            }
            self.publish().await;
        }
        Ok(())
    }

    fn dispatch(&mut self, evt: DaemonEvent) {
        match evt {
            DaemonEvent::Control(event) => {
                debug!("ControlLoop: {:?}", event);
                self.controller.handle(event, now());
            }
            DaemonEvent::Command(Command::ReloadCatalog) => self.spawn_reload(),
            DaemonEvent::Command(cmd) => match ControlEvent::from_command(&cmd) {
                Some(event) => {
                    debug!("ControlLoop: command {:?}", cmd);
                    self.controller.handle(event, now());
                }
                None => debug!("ControlLoop: {:?} needs no controller action", cmd),
            },
            DaemonEvent::Shutdown => {}
        }
    }

    /// Load the catalog off the loop; the result comes back as an event so the
    /// refresh is serialized with everything else.
    fn spawn_reload(&self) {
        info!("ControlLoop: reloading station catalog");
        let config = self.config.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let stations = catalog::load_stations(&config).await;
            if tx
                .send(DaemonEvent::Control(ControlEvent::Catalog(stations)))
                .await
                .is_err()
            {
                warn!("catalog reload finished after the control loop exited");
            }
        });
    }

    async fn publish(&self) {
        if let Err(e) = self.state_manager.publish(self.controller.status()).await {
            warn!("Failed to persist state: {}", e);
        }
        let _ = self.broadcast_tx.send(BroadcastMessage::StatusUpdated);
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where there is one.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Queue `Shutdown` once `signal` resolves.
pub async fn forward_shutdown<F>(signal: F, event_tx: mpsc::Sender<DaemonEvent>)
where
    F: std::future::Future<Output = ()>,
{
    signal.await;
    info!("Shutdown signal received");
    let _ = event_tx.send(DaemonEvent::Shutdown).await;
}

/// Tokio's clock as a std `Instant`; follows paused time in tests.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
