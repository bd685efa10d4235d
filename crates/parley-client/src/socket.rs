//! Event socket client.
//!
//! The socket is driven by a background task; callers talk to it through
//! channels: [`ClientEvent`]s go out via [`EventSocket::send`], decoded
//! [`ServerEvent`]s come back on the receiver returned by
//! [`EventSocket::connect`]. Unrecognised frames are logged and skipped.

use futures::{SinkExt, StreamExt};
use parley_shared::protocol::{ClientEvent, ServerEvent};
use parley_shared::types::UserId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

/// Inbound/outbound buffering between the socket task and the caller.
const CHANNEL_CAPACITY: usize = 256;

pub struct EventSocket {
    outbound: mpsc::Sender<ClientEvent>,
    task: JoinHandle<()>,
}

impl EventSocket {
    /// Open the socket as `user_id`.
    pub async fn connect(
        socket_url: &str,
        user_id: UserId,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>)> {
        let url = format!("{socket_url}?userId={user_id}");
        let (stream, _response) = connect_async(url.as_str()).await?;
        info!(user = %user_id, "Event socket connected");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientEvent>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ServerEvent>(CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = source.next() => {
                        match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                match ServerEvent::from_frame(text.as_str()) {
                                    Ok(event) => {
                                        if inbound_tx.send(event).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => debug!(error = %e, "Ignoring unrecognised server frame"),
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "Event socket read failed");
                                break;
                            }
                        }
                    }
                    event = outbound_rx.recv() => {
                        let Some(event) = event else {
                            let _ = sink.send(WsMessage::Close(None)).await;
                            break;
                        };
                        let frame = match event.to_frame() {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(event = event.name(), error = %e, "Failed to encode event");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                            warn!(error = %e, "Event socket write failed");
                            break;
                        }
                    }
                }
            }
            info!("Event socket closed");
        });

        Ok((
            Self {
                outbound: outbound_tx,
                task,
            },
            inbound_rx,
        ))
    }

    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| ClientError::SocketClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Send a close frame and wait for the socket task to finish.
    pub async fn close(self) {
        let Self { outbound, task } = self;
        drop(outbound);
        let _ = task.await;
    }
}
