use iptv_core::{BroadcastMessage, SessionClient};
use iptv_proto::protocol::{Broadcast, Command, Message, PROTOCOL_VERSION};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub fn start_server(bind_address: String, port: u16, client: SessionClient) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("TCP server listening at {}", addr);
        serve(listener, client).await;
    })
}

async fn serve(listener: TcpListener, client: SessionClient) {
    let connected = Arc::new(AtomicUsize::new(0));
    let mut client_id = 0usize;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                client_id += 1;
                let id = client_id;
                let count = connected.fetch_add(1, Ordering::SeqCst) + 1;
                info!("Client {} connected from {} ({} connected)", id, peer, count);

                let session = client.clone();
                let connected = connected.clone();
                tokio::spawn(async move {
                    let broadcast_rx = session.subscribe();
                    handle_client(stream, session, id, broadcast_rx).await;
                    let count = connected.fetch_sub(1, Ordering::SeqCst) - 1;
                    info!("Client {} disconnected ({} connected)", id, count);
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
    session: SessionClient,
    client_id: usize,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    // Send Hello with current state snapshot on connect
    if let Ok(encoded) = encode_hello(&session).await {
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

                        while let Some(frame_len) = Message::frame_len(&read_buf) {
                            let decoded = Message::decode(&read_buf[..frame_len]);
                            read_buf.drain(..frame_len);

                            let failure = match decoded {
                                Ok((Message::Command(cmd), _)) => {
                                    info!("Client {} sent command: {:?}", client_id, cmd);
                                    run_command(&session, cmd).await.err().map(|e| e.to_string())
                                }
                                Ok(_) => continue,
                                Err(e) => {
                                    warn!("Client {} sent a malformed frame: {}", client_id, e);
                                    Some(format!("malformed frame: {}", e))
                                }
                            };

                            if let Some(message) = failure {
                                let reply = Broadcast::Error { message };
                                if let Ok(encoded) = Message::Broadcast(reply).encode() {
                                    if write_half.write_all(&encoded).await.is_err() {
                                        return;
                                    }
                                }
                            }

                            if let Ok(encoded) = encode_state(&session).await {
                                if write_half.write_all(&encoded).await.is_err() {
                                    return;
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
                let encoded = match msg {
                    Ok(BroadcastMessage::StateUpdated) => encode_state(&session).await,
                    Ok(BroadcastMessage::Playback(event)) => {
                        Message::Broadcast(Broadcast::Playback { event }).encode()
                    }
                    Ok(BroadcastMessage::Log(message)) => {
                        Message::Broadcast(Broadcast::Log { message }).encode()
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} missed {} broadcast messages", client_id, n);
                        encode_state(&session).await
                    }
                    Err(_) => break,
                };
                if let Ok(encoded) = encoded {
                    if write_half.write_all(&encoded).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Commands from a socket client are not given a reply beyond the state
/// update that follows; failures come back as `Broadcast::Error`.
async fn run_command(session: &SessionClient, cmd: Command) -> Result<(), iptv_core::SessionError> {
    session.send(cmd).await.map(|_| ())
}

async fn encode_hello(session: &SessionClient) -> anyhow::Result<Vec<u8>> {
    let state = session.snapshot().await;
    let rev = state.rev;
    Message::Broadcast(Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
        daemon_rev: rev,
        state,
    })
    .encode()
}

async fn encode_state(session: &SessionClient) -> anyhow::Result<Vec<u8>> {
    let state = session.snapshot().await;
    Message::Broadcast(Broadcast::State { data: state }).encode()
}
