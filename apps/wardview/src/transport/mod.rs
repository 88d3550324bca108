use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Lifecycle and payload notifications from a push channel. Events lost
/// while disconnected are not replayed; the owning session recovers them
/// through its next snapshot fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Closed,
    Message(String),
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Reconnect delay schedule: starts at the initial delay, grows by 1.5x per
/// consecutive failure, capped; reset on a successful open.
#[derive(Debug)]
pub struct BackoffSchedule {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl BackoffSchedule {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// The delay to wait before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = self.current.mul_f64(1.5);
        self.current = grown.min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// A persistent websocket subscription with automatic, infinite reconnect.
/// Dropping or closing the channel aborts the connect loop, which also
/// suppresses any pending reconnect timer.
pub struct PushChannel {
    task: Option<tokio::task::JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl PushChannel {
    pub fn connect(url: Url, config: ChannelConfig) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let connected = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_channel(url, config, events_tx, connected.clone()));
        (
            Self {
                task: Some(task),
                connected,
            },
            events_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn close(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_channel(
    url: Url,
    config: ChannelConfig,
    events: mpsc::Sender<ChannelEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut backoff = BackoffSchedule::new(config.initial_backoff, config.max_backoff);
    loop {
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                tracing::debug!(target = "wardview::transport", %url, "push channel open");
                connected.store(true, Ordering::Relaxed);
                backoff.reset();
                if events.send(ChannelEvent::Opened).await.is_err() {
                    return;
                }
                let (mut sink, mut stream) = ws.split();
                while let Some(message) = stream.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            if events.send(ChannelEvent::Message(text)).await.is_err() {
                                return;
                            }
                        }
                        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                if events.send(ChannelEvent::Message(text)).await.is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(
                                    target = "wardview::transport",
                                    error = %err,
                                    "dropping non-utf8 channel payload"
                                );
                            }
                        },
                        Ok(Message::Ping(payload)) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Ok(Message::Close(_)) | Err(_) => break,
                        _ => {}
                    }
                }
                connected.store(false, Ordering::Relaxed);
                tracing::debug!(target = "wardview::transport", %url, "push channel closed");
                if events.send(ChannelEvent::Closed).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                tracing::debug!(
                    target = "wardview::transport",
                    %url,
                    error = %err,
                    "push channel connect failed"
                );
            }
        }
        tokio::time::sleep(backoff.next_delay()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn backoff_grows_by_half_and_caps() {
        let mut backoff =
            BackoffSchedule::new(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2250));

        for _ in 0..20 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn backoff_resets_after_successful_open() {
        let mut backoff =
            BackoffSchedule::new(Duration::from_secs(1), Duration::from_secs(30));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    async fn accept_and_send(listener: TcpListener, text: Option<&str>) {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        if let Some(text) = text {
            ws.send(Message::Text(text.to_string())).await.expect("send");
        }
        // Dropping the socket closes the connection.
    }

    #[tokio::test]
    async fn delivers_messages_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let url = Url::parse(&format!("ws://{addr}/ws/STATION")).expect("url");

        let server = tokio::spawn(accept_and_send(listener, Some(r#"{"hello":1}"#)));

        let config = ChannelConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        };
        let (mut channel, mut events) = PushChannel::connect(url.clone(), config);

        assert_eq!(events.recv().await, Some(ChannelEvent::Opened));
        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::Message(r#"{"hello":1}"#.to_string()))
        );
        assert_eq!(events.recv().await, Some(ChannelEvent::Closed));
        server.await.expect("server task");

        // Rebind the same port: the channel should come back on its own.
        // The server parks on a oneshot so the connection stays up while we
        // look at it.
        let listener = TcpListener::bind(addr).await.expect("rebind");
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let _ws = accept_async(stream).await.expect("handshake");
            let _ = done_rx.await;
        });
        assert_eq!(events.recv().await, Some(ChannelEvent::Opened));
        assert!(channel.is_connected());
        drop(done_tx);
        server.await.expect("server task");

        channel.close();
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn close_suppresses_pending_reconnect() {
        // Nothing is listening; the channel sits in its backoff loop.
        let url = Url::parse("ws://127.0.0.1:1/ws/STATION").expect("url");
        let config = ChannelConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        };
        let (mut channel, mut events) = PushChannel::connect(url, config);
        tokio::time::sleep(Duration::from_millis(40)).await;
        channel.close();

        // The event stream ends without ever reporting an open.
        assert_eq!(events.recv().await, None);
    }
}
