//! The real-time channel: a handle owned by the session, a reconnecting
//! websocket task behind it, and the listener the conversation store
//! attaches through it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::api::events::{ChannelEvent, Packet};
use crate::app::ClientConfig;
use crate::error::{Error, Result};

const EVENT_BUFFER: usize = 256;

/// Handle to one open channel. Dropping it stops the transport.
pub struct Channel {
    user_id: String,
    events: broadcast::Sender<ChannelEvent>,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

/// The producing side of a channel: whatever delivers events into it.
#[derive(Clone)]
pub struct ChannelFeed {
    events: broadcast::Sender<ChannelEvent>,
    connected: Arc<AtomicBool>,
}

impl ChannelFeed {
    pub fn push(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            debug!("channel event dropped, no listeners");
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Channel {
    /// A channel with no transport behind it; events come from the returned
    /// feed. Starts out connected.
    pub fn local(user_id: impl Into<String>) -> (Self, ChannelFeed) {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));
        let (shutdown, _) = watch::channel(false);
        let feed = ChannelFeed { events: events.clone(), connected: connected.clone() };
        let channel = Self { user_id: user_id.into(), events, connected, shutdown, task: None };
        (channel, feed)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Handshake completed and the transport is up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Not yet closed: either connected or still (re)connecting.
    pub fn is_active(&self) -> bool {
        !*self.shutdown.borrow() && self.task.as_ref().is_none_or(|t| !t.is_finished())
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription { rx: self.events.subscribe() }
    }

    /// Close the channel. Calling it again is a no-op.
    pub fn disconnect(&mut self) {
        if !self.is_active() {
            return;
        }
        info!("closing channel for {}", self.user_id);
        self.shutdown.send_replace(true);
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// One live registration of listeners on a channel.
pub struct Subscription {
    rx: broadcast::Receiver<ChannelEvent>,
}

impl Subscription {
    /// Next event, or `None` once the channel is gone.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("listener fell behind, {n} channel events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-delivered event without waiting.
    pub fn try_next(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("listener fell behind, {n} channel events skipped");
                }
                Err(_) => return None,
            }
        }
    }
}

/// Owns at most one subscription. `rebind` always drops the old one before
/// attaching, so handlers never fire twice for one event.
#[derive(Default)]
pub struct Listener {
    active: Option<Subscription>,
}

impl Listener {
    pub fn rebind(&mut self, channel: &Channel) {
        self.detach();
        self.active = Some(channel.subscribe());
    }

    pub fn detach(&mut self) {
        self.active = None;
    }

    pub fn is_bound(&self) -> bool {
        self.active.is_some()
    }

    /// Waits forever while unbound, which keeps `select!` loops simple.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        let Some(sub) = self.active.as_mut() else {
            return std::future::pending().await;
        };
        let ev = sub.next().await;
        if ev.is_none() {
            self.active = None;
        }
        ev
    }

    pub fn try_next(&mut self) -> Option<ChannelEvent> {
        self.active.as_mut().and_then(Subscription::try_next)
    }
}

/// Opens channels for a user. The session only knows this seam.
pub trait Connector: Send + Sync {
    fn open(&self, user_id: &str) -> Result<Channel>;
}

/// Socket.IO-over-websocket connector with bounded reconnection.
pub struct WsConnector {
    server_url: String,
    attempts: u32,
    delay: Duration,
}

impl WsConnector {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // fail early on an unusable url instead of at sign-in
        crate::utils::channel_url(&config.server_url, "")?;
        Ok(Self {
            server_url: config.server_url.clone(),
            attempts: config.reconnection_attempts,
            delay: Duration::from_millis(config.reconnection_delay_ms),
        })
    }
}

impl Connector for WsConnector {
    fn open(&self, user_id: &str) -> Result<Channel> {
        let url = crate::utils::channel_url(&self.server_url, user_id)?;
        let (mut channel, feed) = Channel::local(user_id);
        feed.set_connected(false);
        let shutdown = channel.shutdown.subscribe();
        let task = tokio::spawn(run_transport(url, feed, shutdown, self.attempts, self.delay));
        channel.task = Some(task);
        Ok(channel)
    }
}

enum SessionEnd {
    Shutdown,
    Dropped { was_connected: bool },
}

async fn run_transport(
    url: Url,
    feed: ChannelFeed,
    mut shutdown: watch::Receiver<bool>,
    attempts: u32,
    delay: Duration,
) {
    let mut failures = 0u32;
    loop {
        if *shutdown.borrow() {
            break;
        }
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => match drive_session(ws, &feed, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Dropped { was_connected: true }) => {
                    info!("channel dropped, reconnecting");
                    failures = 0;
                }
                Ok(SessionEnd::Dropped { was_connected: false }) => {
                    failures += 1;
                    warn!("channel closed before handshake");
                }
                Err(e) => {
                    failures += 1;
                    warn!("channel session failed: {e}");
                }
            },
            Err(e) => {
                failures += 1;
                warn!("channel connect failed ({failures}/{attempts}): {e}");
            }
        }
        feed.set_connected(false);
        if failures >= attempts {
            error!("channel gave up after {failures} attempts");
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    feed.set_connected(false);
}

async fn drive_session<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    feed: &ChannelFeed,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();
    let mut connected = false;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if let Some(frame) = Packet::Disconnect.encode() {
                    let _ = write.send(WsMessage::Text(frame)).await;
                }
                let _ = write.close().await;
                return Ok(SessionEnd::Shutdown);
            }
            frame = read.next() => {
                let Some(frame) = frame else {
                    return Ok(SessionEnd::Dropped { was_connected: connected });
                };
                let text = match frame? {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(_) => return Ok(SessionEnd::Dropped { was_connected: connected }),
                    _ => continue,
                };
                let reply = match Packet::decode(&text) {
                    Ok(Packet::Open(_)) => Packet::Connect.encode(),
                    Ok(Packet::Ping) => Packet::Pong.encode(),
                    Ok(Packet::Connect) => {
                        info!("channel connected");
                        connected = true;
                        feed.set_connected(true);
                        None
                    }
                    Ok(Packet::ConnectError(msg)) => return Err(Error::Channel(msg)),
                    Ok(Packet::Disconnect) | Ok(Packet::Close) => {
                        return Ok(SessionEnd::Dropped { was_connected: connected });
                    }
                    Ok(Packet::Event(ev)) => {
                        match ChannelEvent::from_incoming(ev) {
                            Ok(Some(event)) => feed.push(event),
                            Ok(None) => {}
                            Err(e) => warn!("bad channel event payload: {e}"),
                        }
                        None
                    }
                    Ok(Packet::Pong) | Ok(Packet::Noop) => None,
                    Err(e) => {
                        debug!("undecodable frame: {e}");
                        None
                    }
                };
                if let Some(reply) = reply {
                    write.send(WsMessage::Text(reply)).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::events::ChannelEvent;

    #[test]
    fn disconnect_is_idempotent() {
        let (mut channel, _feed) = Channel::local("u1");
        assert!(channel.is_active());
        channel.disconnect();
        assert!(!channel.is_active());
        assert!(!channel.is_connected());
        channel.disconnect();
        assert!(!channel.is_active());
    }

    #[test]
    fn rebind_keeps_exactly_one_subscription() {
        let (channel, feed) = Channel::local("u1");
        let mut listener = Listener::default();
        listener.rebind(&channel);
        listener.rebind(&channel);
        feed.push(ChannelEvent::MessageDeleted { message_id: "m1".into() });

        assert!(listener.try_next().is_some());
        assert!(listener.try_next().is_none());
        assert_eq!(channel.events.receiver_count(), 1);

        listener.detach();
        assert_eq!(channel.events.receiver_count(), 0);
        assert!(!listener.is_bound());
    }

    #[tokio::test]
    async fn listener_unbinds_when_channel_goes_away() {
        let (channel, feed) = Channel::local("u1");
        let mut listener = Listener::default();
        listener.rebind(&channel);
        drop(feed);
        drop(channel);
        assert_eq!(listener.next().await, None);
        assert!(!listener.is_bound());
    }

    use std::time::Instant;

    use tokio::net::TcpListener;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    fn config(port: u16, attempts: u32, delay_ms: u64) -> ClientConfig {
        ClientConfig {
            server_url: format!("http://127.0.0.1:{port}"),
            reconnection_attempts: attempts,
            reconnection_delay_ms: delay_ms,
            ..ClientConfig::default()
        }
    }

    async fn next_text<S>(ws: &mut WebSocketStream<S>) -> String
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    }

    async fn send_text<S>(ws: &mut WebSocketStream<S>, text: &str)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        ws.send(WsMessage::Text(text.to_string())).await.unwrap();
    }

    #[tokio::test]
    async fn websocket_session_handshakes_and_delivers_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut uri = String::new();
            let mut ws = tokio_tungstenite::accept_hdr_async(
                stream,
                |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
                    uri = req.uri().to_string();
                    Ok(resp)
                },
            )
            .await
            .unwrap();
            assert!(uri.starts_with("/socket.io/?EIO=4&transport=websocket&userId=u1"), "{uri}");

            send_text(&mut ws, r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#).await;
            assert_eq!(next_text(&mut ws).await, "40");
            send_text(&mut ws, r#"40{"sid":"n1"}"#).await;
            send_text(&mut ws, "2").await;
            assert_eq!(next_text(&mut ws).await, "3");
            send_text(&mut ws, r#"42["getOnlineUsers",["u1","u2"]]"#).await;
            assert_eq!(next_text(&mut ws).await, "41");
        });

        let connector = WsConnector::new(&config(port, 5, 50)).unwrap();
        let mut channel = connector.open("u1").unwrap();
        assert!(!channel.is_connected());
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        let wait = Duration::from_secs(5);
        let event = tokio::time::timeout(wait, first.next()).await.unwrap();
        assert_eq!(event, Some(ChannelEvent::OnlineUsers(vec!["u1".into(), "u2".into()])));
        assert_eq!(second.try_next(), event);
        assert!(channel.is_connected());

        channel.disconnect();
        tokio::time::timeout(wait, server).await.unwrap().unwrap();
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn reconnection_gives_up_after_configured_attempts() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let started = Instant::now();
        let channel = WsConnector::new(&config(port, 3, 50)).unwrap().open("u1").unwrap();
        assert!(channel.is_active());

        for _ in 0..200 {
            if !channel.is_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!channel.is_active());
        assert!(!channel.is_connected());
        // two waits between three attempts
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
