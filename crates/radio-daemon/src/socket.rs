use crate::core::DaemonEvent;
use crate::BroadcastMessage;
use radio_proto::protocol::{Broadcast, Command, Message, MAX_FRAME_LEN, PROTOCOL_VERSION};
use radio_proto::state::StateManager;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Knob bridges send `Command` frames here; panel drivers read `View` frames.
/// Both get a `Hello` with the current status on connect.
pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("Knob socket listening at {}", addr);
        serve(listener, state_manager, event_tx, broadcast_tx).await;
    })
}

pub async fn serve(
    listener: TcpListener,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) {
    let mut client_id = 0usize;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                client_id += 1;
                let id = client_id;
                info!("Client {} connected from {}", id, peer);

                let sm = state_manager.clone();
                let evt_tx = event_tx.clone();
                let bcast_rx = broadcast_tx.subscribe();

                tokio::spawn(async move {
                    handle_client(stream, sm, id, evt_tx, bcast_rx).await;
                    info!("Client {} disconnected", id);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    state_manager: Arc<StateManager>,
    client_id: usize,
    event_tx: mpsc::Sender<DaemonEvent>,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    // Send Hello with current status snapshot on connect
    if let Ok(encoded) = encode_hello(&state_manager).await {
        if write_half.write_all(&encoded).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        info!("Client {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        loop {
                            if read_buf.len() < 4 { break; }
                            if frame_len(&read_buf) > MAX_FRAME_LEN {
                                warn!(
                                    "Client {} announced a {} byte frame, disconnecting",
                                    client_id,
                                    frame_len(&read_buf)
                                );
                                return;
                            }
                            match Message::decode(&read_buf) {
                                Ok((Message::Command(cmd), consumed)) => {
                                    read_buf.drain(..consumed);
                                    debug!("Client {} sent command: {:?}", client_id, cmd);

                                    if matches!(cmd, Command::GetStatus) {
                                        if let Ok(encoded) = encode_status(&state_manager).await {
                                            if write_half.write_all(&encoded).await.is_err() {
                                                return;
                                            }
                                        }
                                        continue;
                                    }

                                    if event_tx.send(DaemonEvent::Command(cmd)).await.is_err() {
                                        warn!("DaemonEvent channel closed");
                                        return;
                                    }
                                }
                                Ok((_, consumed)) => {
                                    read_buf.drain(..consumed);
                                }
                                Err(_) => {
                                    if frame_complete(&read_buf) {
                                        let len = frame_len(&read_buf);
                                        warn!("Client {} sent an undecodable frame, dropping it", client_id);
                                        read_buf.drain(..4 + len);
                                        continue;
                                    }
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            msg = broadcast_rx.recv() => {
                let frame = match msg {
                    Ok(BroadcastMessage::StatusUpdated) => encode_status(&state_manager).await,
                    Ok(BroadcastMessage::View { view, lines }) => {
                        Message::Broadcast(Broadcast::View { view, lines }).encode()
                    }
                    Ok(BroadcastMessage::Log(message)) => {
                        Message::Broadcast(Broadcast::Log { message }).encode()
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} missed {} broadcast messages", client_id, n);
                        encode_status(&state_manager).await
                    }
                    Err(_) => break,
                };
                if let Ok(encoded) = frame {
                    if write_half.write_all(&encoded).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

fn frame_len(buf: &[u8]) -> usize {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize
}

/// A whole frame is buffered, so a decode error means bad JSON rather than
/// a short read.
fn frame_complete(buf: &[u8]) -> bool {
    buf.len() >= 4 && buf.len() >= 4 + frame_len(buf)
}

async fn encode_hello(state_manager: &StateManager) -> anyhow::Result<Vec<u8>> {
    let status = state_manager.get_status().await;
    Message::Broadcast(Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
        status,
    })
    .encode()
}

async fn encode_status(state_manager: &StateManager) -> anyhow::Result<Vec<u8>> {
    let status = state_manager.get_status().await;
    Message::Broadcast(Broadcast::Status { data: status }).encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_proto::protocol::{Knob, KnobAction, View};

    async fn read_frame(stream: &mut TcpStream) -> Message {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).await.unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut body).await.unwrap();
        let mut frame = len.to_vec();
        frame.extend_from_slice(&body);
        Message::decode(&frame).unwrap().0
    }

    struct Setup {
        stream: TcpStream,
        event_rx: mpsc::Receiver<DaemonEvent>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        _dir: tempfile::TempDir,
    }

    async fn connect() -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let state_manager = Arc::new(StateManager::new(dir.path().join("state.json")));
        let (event_tx, event_rx) = mpsc::channel(8);
        let (broadcast_tx, _) = broadcast::channel(8);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(
            listener,
            state_manager,
            event_tx,
            broadcast_tx.clone(),
        ));
        let stream = TcpStream::connect(addr).await.unwrap();
        Setup {
            stream,
            event_rx,
            broadcast_tx,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_hello_then_knob_command() {
        let mut s = connect().await;
        match read_frame(&mut s.stream).await {
            Message::Broadcast(Broadcast::Hello {
                protocol_version, ..
            }) => assert_eq!(protocol_version, PROTOCOL_VERSION),
            other => panic!("expected hello, got {:?}", other),
        }

        let cmd = Message::Command(Command::Knob {
            knob: Knob::Channel,
            action: KnobAction::Rotate { delta: -1 },
        });
        s.stream.write_all(&cmd.encode().unwrap()).await.unwrap();

        match s.event_rx.recv().await {
            Some(DaemonEvent::Command(Command::Knob { knob, action })) => {
                assert_eq!(knob, Knob::Channel);
                assert_eq!(action, KnobAction::Rotate { delta: -1 });
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_frame_is_skipped() {
        let mut s = connect().await;
        read_frame(&mut s.stream).await;

        let garbage = b"{\"cmd\":\"Nope\"}";
        let mut frame = (garbage.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(garbage);
        frame.extend_from_slice(&Message::Command(Command::Refresh).encode().unwrap());
        s.stream.write_all(&frame).await.unwrap();

        assert!(matches!(
            s.event_rx.recv().await,
            Some(DaemonEvent::Command(Command::Refresh))
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_disconnects_client() {
        let mut s = connect().await;
        read_frame(&mut s.stream).await;

        let header = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        s.stream.write_all(&header).await.unwrap();

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            s.stream.read(&mut buf),
        )
        .await
        .expect("server should close the connection");
        assert!(matches!(read, Ok(0) | Err(_)));
        assert!(s.event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_views_forwarded_to_panel() {
        let mut s = connect().await;
        read_frame(&mut s.stream).await;

        // Wait until the client task has subscribed.
        while s.broadcast_tx.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        s.broadcast_tx
            .send(BroadcastMessage::View {
                view: View::Muted,
                lines: vec!["MUTE".into()],
            })
            .unwrap();

        match read_frame(&mut s.stream).await {
            Message::Broadcast(Broadcast::View { view, lines }) => {
                assert_eq!(view, View::Muted);
                assert_eq!(lines, vec!["MUTE".to_string()]);
            }
            other => panic!("expected view, got {:?}", other),
        }
    }
}
