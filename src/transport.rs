//! WebSocket connection to the game server

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::TransportError;
use crate::protocol::OutboundCommand;
use crate::state::SessionEvent;

/// How to reach the server and what to do when the connection drops.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// `ws://host:port`
    pub url: String,
    pub timeout: Duration,
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(3),
        }
    }

    pub fn with_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Opens the socket and spawns the task that pumps it. Inbound text frames
/// and the final close are posted to `inbox`; commands from `outbound` are
/// serialised and sent. Dropping the outbound sender closes the socket.
pub async fn connect(
    config: &ConnectionConfig,
    inbox: UnboundedSender<SessionEvent>,
    mut outbound: UnboundedReceiver<OutboundCommand>,
) -> Result<JoinHandle<()>, TransportError> {
    let ws_stream = tokio::time::timeout(config.timeout, connect_async(config.url.as_str()))
        .await
        .map_err(|_| TransportError::ConnectionFailed(format!("Timed out connecting to {}", config.url)))?
        .map_err(|e| TransportError::ConnectionFailed(format!("WebSocket error: {}", e)))?
        .0;
    log::info!("[Transport] Connected to {}", config.url);

    let (mut write, mut read) = ws_stream.split();

    let handle = tokio::spawn(async move {
        let closed = loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if inbox.send(SessionEvent::Frame(text)).is_err() {
                                break None;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let clean = frame.as_ref().map(|f| f.code == CloseCode::Normal).unwrap_or(false);
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .filter(|reason| !reason.is_empty());
                            break Some(SessionEvent::Closed { clean, reason });
                        }
                        None => break Some(SessionEvent::Closed { clean: false, reason: None }),
                        Some(Err(e)) => {
                            log::error!("[Transport] WebSocket error: {}", e);
                            break Some(SessionEvent::Closed {
                                clean: false,
                                reason: Some(e.to_string()),
                            });
                        }
                        _ => {} // Ignore ping/pong/binary
                    }
                }

                cmd = outbound.recv() => {
                    match cmd {
                        Some(cmd) => match cmd.to_json() {
                            Ok(json) => {
                                if let Err(e) = write.send(Message::Text(json)).await {
                                    log::error!("[Transport] {}", TransportError::SendFailed);
                                    break Some(SessionEvent::Closed {
                                        clean: false,
                                        reason: Some(e.to_string()),
                                    });
                                }
                            }
                            Err(e) => log::warn!("[Transport] {}", TransportError::Protocol(e.to_string())),
                        },
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            break None;
                        }
                    }
                }
            }
        };
        if let Some(event) = closed {
            log::info!("[Transport] Connection closed");
            let _ = inbox.send(event);
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[tokio::test]
    async fn test_frames_flow_both_ways_and_close_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let login = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(r#"{"name": "message", "args": ["Welcome"]}"#.to_string()))
                .await
                .unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "Goodbye".into(),
            }))
            .await
            .unwrap();
            login
        });

        let (inbox, mut events) = unbounded_channel();
        let (outbox, outbound) = unbounded_channel();
        let config = ConnectionConfig::new(format!("ws://{}", addr));
        let handle = connect(&config, inbox, outbound).await.unwrap();
        outbox.send(OutboundCommand::login("bob", "secret")).unwrap();

        match events.recv().await {
            Some(SessionEvent::Frame(text)) => assert!(text.contains("Welcome")),
            other => panic!("Expected a frame, got {:?}", other),
        }
        match events.recv().await {
            Some(SessionEvent::Closed { clean, reason }) => {
                assert!(clean);
                assert_eq!(reason.as_deref(), Some("Goodbye"));
            }
            other => panic!("Expected close, got {:?}", other),
        }
        handle.await.unwrap();
        let login = server.await.unwrap();
        assert_eq!(login, Message::Text(r#"["login",["bob","secret"],{}]"#.to_string()));
    }

    #[tokio::test]
    async fn test_refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (inbox, _events) = unbounded_channel();
        let (_outbox, outbound) = unbounded_channel();
        let config = ConnectionConfig::new(format!("ws://{}", addr)).with_reconnect(false);
        assert!(matches!(
            connect(&config, inbox, outbound).await,
            Err(TransportError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("ws://localhost:4000")
            .with_reconnect_delay(Duration::from_millis(10));
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_delay, Duration::from_millis(10));
    }
}
