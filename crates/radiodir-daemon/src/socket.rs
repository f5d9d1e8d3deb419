use crate::core::DaemonEvent;
use crate::BroadcastMessage;
use radiodir::protocol::{Broadcast, Command, Message, PROTOCOL_VERSION};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, warn};

pub fn start_server(
    bind_address: String,
    port: u16,
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

        info!("TCP server listening at {}", addr);
        serve(listener, event_tx, broadcast_tx).await;
    })
}

async fn serve(
    listener: TcpListener,
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

                let evt_tx = event_tx.clone();
                let bcast_rx = broadcast_tx.subscribe();
                tokio::spawn(async move {
                    handle_client(stream, id, evt_tx, bcast_rx).await;
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
    client_id: usize,
    event_tx: mpsc::Sender<DaemonEvent>,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    let hello = Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
    };
    if send(&mut write_half, hello).await.is_err() {
        return;
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
                            let Some(frame_len) = complete_frame_len(&read_buf) else { break; };
                            match Message::decode(&read_buf) {
                                Ok((Message::Command(cmd), consumed)) => {
                                    read_buf.drain(..consumed);
                                    info!("Client {} sent command: {:?}", client_id, cmd);

                                    let Some(answer) = dispatch(&event_tx, cmd).await else {
                                        warn!("DaemonEvent channel closed");
                                        return;
                                    };
                                    if send(&mut write_half, answer).await.is_err() {
                                        return;
                                    }
                                }
                                Ok((_, consumed)) => {
                                    read_buf.drain(..consumed);
                                }
                                Err(e) => {
                                    read_buf.drain(..frame_len);
                                    warn!("Client {} sent a malformed frame: {}", client_id, e);
                                    let answer = Broadcast::Error {
                                        message: format!("malformed frame: {e}"),
                                    };
                                    if send(&mut write_half, answer).await.is_err() {
                                        return;
                                    }
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
                let broadcast = match msg {
                    Ok(BroadcastMessage::StateUpdated) => Broadcast::StateChanged,
                    Ok(BroadcastMessage::Status(text)) => Broadcast::Status { text },
                    Ok(BroadcastMessage::Log(message)) => Broadcast::Log { message },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} missed {} broadcast messages", client_id, n);
                        Broadcast::StateChanged
                    }
                    Err(_) => break,
                };
                if send(&mut write_half, broadcast).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Length of the first frame in `buf`, header included, once all of it is there.
fn complete_frame_len(buf: &[u8]) -> Option<usize> {
    let header: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    let len = 4 + u32::from_be_bytes(header) as usize;
    (buf.len() >= len).then_some(len)
}

/// Hand a command to the core and wait for its answer.
async fn dispatch(event_tx: &mpsc::Sender<DaemonEvent>, command: Command) -> Option<Broadcast> {
    let (reply, answer) = oneshot::channel();
    event_tx
        .send(DaemonEvent::Client { command, reply })
        .await
        .ok()?;
    answer.await.ok()
}

async fn send(write_half: &mut OwnedWriteHalf, broadcast: Broadcast) -> anyhow::Result<()> {
    let encoded = Message::Broadcast(broadcast).encode()?;
    write_half.write_all(&encoded).await?;
    Ok(())
}
