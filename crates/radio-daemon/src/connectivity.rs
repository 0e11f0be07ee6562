use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use radio_control::{Connectivity, ControlEvent};
use radio_proto::config::ConnectivityConfig;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::DaemonEvent;

/// Internet reachability shared between the probe task and the controller.
#[derive(Debug, Clone)]
pub struct SharedLink {
    online: Arc<AtomicBool>,
}

impl SharedLink {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Store a probe result.  Returns true when it differs from the last one.
    pub fn set(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst) != online
    }
}

impl Connectivity for SharedLink {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

pub fn probe_client(config: &ConnectivityConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build probe client, using defaults: {}", e);
            reqwest::Client::new()
        })
}

/// One reachability check: any 2xx answer counts as online.
pub async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(resp) => {
            debug!("connectivity probe {} -> {}", url, resp.status());
            resp.status().is_success()
        }
        Err(e) => {
            debug!("connectivity probe {} failed: {}", url, e);
            false
        }
    }
}

/// Probe periodically and emit `Online`/`Offline` only on transitions.  The
/// shared flag is updated before the event is queued, so the controller
/// already sees the new state when it handles the event.
pub fn spawn_monitor(
    config: ConnectivityConfig,
    link: SharedLink,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let client = probe_client(&config);
        let period = Duration::from_secs(config.interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let online = probe(&client, &config.probe_url).await;
            if !link.set(online) {
                continue;
            }
            let event = if online {
                info!("Internet connection restored");
                ControlEvent::Online
            } else {
                warn!("Internet connection lost");
                ControlEvent::Offline
            };
            if event_tx.send(DaemonEvent::Control(event)).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    #[test]
    fn test_set_reports_transitions_only() {
        let link = SharedLink::new(true);
        assert!(!link.set(true));
        assert!(link.set(false));
        assert!(!link.is_online());
        assert!(!link.set(false));
        assert!(link.set(true));
        assert!(link.is_online());
    }

    #[tokio::test]
    async fn test_probe_against_local_server() {
        let app = Router::new()
            .route("/generate_204", get(|| async { StatusCode::NO_CONTENT }))
            .route("/broken", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let client = probe_client(&ConnectivityConfig::default());
        assert!(probe(&client, &format!("http://{}/generate_204", addr)).await);
        assert!(!probe(&client, &format!("http://{}/broken", addr)).await);
    }

    #[tokio::test]
    async fn test_probe_unreachable_is_offline() {
        // Bind then drop so the port is very likely closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = probe_client(&ConnectivityConfig::default());
        assert!(!probe(&client, &format!("http://{}/", addr)).await);
    }
}
