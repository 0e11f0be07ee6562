use crate::core::DaemonEvent;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use radio_proto::protocol::{Command, Knob, KnobAction, PlayerStatus};
use radio_proto::state::StateManager;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
}

#[derive(Serialize)]
struct StationInfo {
    idx: usize,
    name: String,
    description: String,
    playing: bool,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state_manager, event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

/// Virtual knobs and a status view for testing the radio without hardware.
fn router(state_manager: Arc<StateManager>, event_tx: mpsc::Sender<DaemonEvent>) -> Router {
    let app_state = HttpState {
        state_manager,
        event_tx,
    };

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/stations", get(get_stations))
        .route("/api/knob/:knob/rotate/:delta", post(rotate_knob))
        .route("/api/knob/:knob/press", post(press_knob))
        .route("/api/knob/:knob/release", post(release_knob))
        .route("/api/refresh", post(refresh))
        .route("/api/reload", post(reload))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

async fn get_status(State(state): State<HttpState>) -> Json<PlayerStatus> {
    Json(state.state_manager.get_status().await)
}

async fn get_stations(State(state): State<HttpState>) -> Json<Vec<StationInfo>> {
    let status = state.state_manager.get_status().await;
    let stations = status
        .stations
        .iter()
        .enumerate()
        .map(|(idx, s)| StationInfo {
            idx,
            name: s.name.clone(),
            description: s.description.clone(),
            playing: status.playing_index == Some(idx),
        })
        .collect();
    Json(stations)
}

fn parse_knob(name: &str) -> Option<Knob> {
    match name {
        "volume" => Some(Knob::Volume),
        "channel" => Some(Knob::Channel),
        _ => None,
    }
}

async fn rotate_knob(
    State(state): State<HttpState>,
    Path((knob, delta)): Path<(String, i32)>,
) -> StatusCode {
    let Some(knob) = parse_knob(&knob) else {
        return StatusCode::NOT_FOUND;
    };
    info!("HTTP API: rotate {:?} by {}", knob, delta);
    send(&state, Command::Knob {
        knob,
        action: KnobAction::Rotate { delta },
    })
    .await
}

async fn press_knob(State(state): State<HttpState>, Path(knob): Path<String>) -> StatusCode {
    let Some(knob) = parse_knob(&knob) else {
        return StatusCode::NOT_FOUND;
    };
    info!("HTTP API: press {:?}", knob);
    send(&state, Command::Knob {
        knob,
        action: KnobAction::Pressed,
    })
    .await
}

async fn release_knob(State(state): State<HttpState>, Path(knob): Path<String>) -> StatusCode {
    let Some(knob) = parse_knob(&knob) else {
        return StatusCode::NOT_FOUND;
    };
    info!("HTTP API: release {:?}", knob);
    send(&state, Command::Knob {
        knob,
        action: KnobAction::Released,
    })
    .await
}

async fn refresh(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: refresh");
    send(&state, Command::Refresh).await
}

async fn reload(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: reload catalog");
    send(&state, Command::ReloadCatalog).await
}

async fn send(state: &HttpState, cmd: Command) -> StatusCode {
    if state.event_tx.send(DaemonEvent::Command(cmd)).await.is_err() {
        error!("Failed to queue command, control loop gone");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Api {
        base: String,
        event_rx: mpsc::Receiver<DaemonEvent>,
        _dir: tempfile::TempDir,
    }

    async fn serve() -> Api {
        let dir = tempfile::tempdir().unwrap();
        let state_manager = Arc::new(StateManager::new(dir.path().join("state.json")));
        let (event_tx, event_rx) = mpsc::channel(8);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = router(state_manager, event_tx);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Api {
            base,
            event_rx,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_rotate_queues_knob_command() {
        let mut api = serve().await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/api/knob/volume/rotate/-3", api.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        match api.event_rx.recv().await {
            Some(DaemonEvent::Command(Command::Knob { knob, action })) => {
                assert_eq!(knob, Knob::Volume);
                assert_eq!(action, KnobAction::Rotate { delta: -3 });
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_knob_is_not_found() {
        let mut api = serve().await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/api/knob/tuning/press", api.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        assert!(api.event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_status_and_stations_read_published_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state_manager = Arc::new(StateManager::new(dir.path().join("state.json")));
        state_manager
            .publish(PlayerStatus {
                stations: vec![
                    radio_proto::protocol::Station::new("A", "http://a.example/stream"),
                    radio_proto::protocol::Station::new("B", "http://b.example/stream"),
                ],
                playing_index: Some(1),
                picking_index: Some(1),
                volume: 50,
                title: "no info".into(),
                online: true,
                ..PlayerStatus::default()
            })
            .await
            .unwrap();

        let (event_tx, _event_rx) = mpsc::channel(8);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = router(state_manager, event_tx);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let status: serde_json::Value = reqwest::get(format!("{}/api/status", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["playing_index"], 1);
        assert_eq!(status["volume"], 50);
        assert_eq!(status["rev"], 1);

        let stations: serde_json::Value = reqwest::get(format!("{}/api/stations", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stations[1]["name"], "B");
        assert_eq!(stations[1]["playing"], true);
        assert_eq!(stations[0]["playing"], false);
    }
}
