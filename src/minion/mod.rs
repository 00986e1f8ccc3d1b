//! One websocket connection to one relay, carrying one subscription.
//!
//! A minion is spawned by [`Minion::subscribe`] and reports back to its pool
//! over an unbounded channel: zero or more [`ToPoolMessage::Event`]s, then
//! exactly one [`ToPoolMessage::Closed`] with the reason it stopped.

mod handle_websocket;

use crate::error::{Error, ErrorKind};
use crate::event::Event;
use crate::filter::Filter;
use crate::messages::ClientMessage;
use crate::relay_url::RelayUrl;
use crate::settings::Settings;
use crate::USER_AGENT;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::protocol::{Message as WsMessage, WebSocketConfig};

type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Why a minion stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinionExitReason {
    /// The relay sent end-of-stored-events
    Completed,
    /// Connect failure, disconnect, protocol error or a relay-side close
    Error,
    /// The subscription was cancelled (or dropped) by its owner
    Cancelled,
}

#[derive(Debug)]
pub enum ToPoolMessage {
    Event(RelayUrl, Box<Event>),
    Closed(RelayUrl, MinionExitReason),
}

/// The owner's handle on a running minion. Dropping it cancels the minion.
#[derive(Debug)]
pub struct Subscription {
    url: RelayUrl,
    cancel: watch::Sender<bool>,
}

impl Subscription {
    pub fn url(&self) -> &RelayUrl {
        &self.url
    }

    pub fn cancel(&self) {
        // Err means the minion already exited
        let _ = self.cancel.send(true);
    }
}

pub struct Minion {
    url: RelayUrl,
    filter: Filter,
    subid: String,
    to_pool: UnboundedSender<ToPoolMessage>,
    connect_timeout: Duration,
    max_message_size: usize,
    set_user_agent: bool,
}

impl Minion {
    /// Spawn a minion that opens `filter` on the relay at `url`
    pub fn subscribe(
        url: RelayUrl,
        filter: Filter,
        to_pool: UnboundedSender<ToPoolMessage>,
        settings: &Settings,
    ) -> Subscription {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let subid: u64 = rand::random();
        let minion = Minion {
            url: url.clone(),
            filter,
            subid: format!("{:016x}", subid),
            to_pool,
            connect_timeout: settings.websocket_connect_timeout(),
            max_message_size: settings.max_websocket_message_size_kb * 1024,
            set_user_agent: settings.set_user_agent,
        };
        tokio::spawn(minion.handle(cancel_rx));
        Subscription {
            url,
            cancel: cancel_tx,
        }
    }

    async fn handle(self, mut cancel: watch::Receiver<bool>) {
        let reason = match self.handle_inner(&mut cancel).await {
            Ok(reason) => reason,
            Err(e) => {
                tracing::warn!("{}: {}", &self.url, e);
                MinionExitReason::Error
            }
        };

        tracing::debug!("{}: minion exiting: {:?}", &self.url, reason);

        // Err means the pool is gone and nobody is listening
        let _ = self
            .to_pool
            .send(ToPoolMessage::Closed(self.url.clone(), reason));
    }

    async fn handle_inner(
        &self,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<MinionExitReason, Error> {
        tracing::trace!("{}: Minion handling started", &self.url);

        let websocket_stream = select! {
            ws = self.connect() => ws?,
            _ = cancelled(cancel) => return Ok(MinionExitReason::Cancelled),
        };
        tracing::debug!("{}: Connected", &self.url);

        let (mut sink, mut stream) = websocket_stream.split();

        let req = ClientMessage::Req(self.subid.clone(), vec![self.filter.clone()]);
        let wire = req.to_wire()?;
        tracing::trace!("{}: Sending {}", &self.url, &wire);
        sink.send(WsMessage::Text(wire)).await?;

        let reason = self.relay_loop(&mut sink, &mut stream, cancel).await?;

        self.close(&mut sink).await;
        Ok(reason)
    }

    async fn connect(&self) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, Error> {
        let mut req = self.url.as_str().into_client_request()?;
        if self.set_user_agent {
            req.headers_mut()
                .insert("User-Agent", HeaderValue::from_static(USER_AGENT));
        }

        let config = WebSocketConfig {
            max_message_size: Some(self.max_message_size),
            max_frame_size: Some(self.max_message_size),
            ..Default::default()
        };

        let (websocket_stream, _response) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async_with_config(req, Some(config), false),
        )
        .await??;

        Ok(websocket_stream)
    }

    async fn relay_loop(
        &self,
        sink: &mut WsSink,
        stream: &mut WsStream,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<MinionExitReason, Error> {
        loop {
            select! {
                _ = cancelled(cancel) => {
                    tracing::debug!("{}: Subscription cancelled", &self.url);
                    return Ok(MinionExitReason::Cancelled);
                },
                ws_message = stream.next() => {
                    let ws_message = match ws_message {
                        Some(m) => m?,
                        None => return Err(ErrorKind::Disconnected.into()),
                    };

                    match ws_message {
                        WsMessage::Text(t) => {
                            if let Some(reason) = self.handle_nostr_message(&t)? {
                                return Ok(reason);
                            }
                        },
                        WsMessage::Binary(_) => tracing::warn!("{}: Unexpected binary message", &self.url),
                        WsMessage::Ping(_) => { }, // tungstenite automatically pongs.
                        WsMessage::Pong(_) => { },
                        WsMessage::Close(_) => return Err(ErrorKind::Disconnected.into()),
                        WsMessage::Frame(_) => tracing::warn!("{}: Unexpected frame message", &self.url),
                    }
                },
            }
        }
    }

    // Best effort: the relay may already be gone
    async fn close(&self, sink: &mut WsSink) {
        let close = ClientMessage::Close(self.subid.clone());
        if let Ok(wire) = close.to_wire() {
            if let Err(e) = sink.send(WsMessage::Text(wire)).await {
                tracing::trace!("{}: CLOSE not sent: {}", &self.url, e);
                return;
            }
        }
        if let Err(e) = sink.send(WsMessage::Close(None)).await {
            tracing::trace!("{}: websocket close error: {}", &self.url, e);
        }
    }
}

// Resolves once cancel is signalled or the Subscription is dropped
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::keys::PublicKey;
    use crate::testing::{
        metadata_event, spawn_relay, unreachable_relay, RelayBehavior, TestKeys,
    };
    use tokio::sync::mpsc;

    async fn run(
        url: RelayUrl,
        filter: Filter,
        settings: &Settings,
    ) -> (Vec<Event>, MinionExitReason) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = Minion::subscribe(url, filter, tx, settings);
        let mut events = Vec::new();
        while let Some(message) = rx.recv().await {
            match message {
                ToPoolMessage::Event(_, e) => events.push(*e),
                ToPoolMessage::Closed(_, reason) => return (events, reason),
            }
        }
        panic!("minion exited without a Closed message");
    }

    fn alice() -> (TestKeys, PublicKey) {
        let keys = TestKeys::new(1);
        let pk = keys.public_key();
        (keys, pk)
    }

    #[tokio::test]
    async fn test_completes_on_eose() {
        let (keys, pk) = alice();
        let good = metadata_event(&keys, 100, r#"{"name":"alice"}"#);
        let mut forged = metadata_event(&keys, 200, r#"{"name":"alice"}"#);
        forged.content = r#"{"name":"mallory"}"#.to_owned();
        let other = metadata_event(&TestKeys::new(2), 300, "{}");

        let url = spawn_relay(vec![good.clone(), forged, other], RelayBehavior::Complete).await;
        let (events, reason) = run(url, Filter::metadata_of(pk), &Settings::default()).await;
        assert_eq!(reason, MinionExitReason::Completed);
        assert_eq!(events, vec![good]);
    }

    #[tokio::test]
    async fn test_disconnect_is_error() {
        let (keys, pk) = alice();
        let event = metadata_event(&keys, 100, "{}");
        let url = spawn_relay(vec![event], RelayBehavior::Drop).await;
        let (_events, reason) = run(url, Filter::metadata_of(pk), &Settings::default()).await;
        assert_eq!(reason, MinionExitReason::Error);
    }

    #[tokio::test]
    async fn test_relay_closed_is_error() {
        let (keys, pk) = alice();
        let event = metadata_event(&keys, 100, "{}");
        let url = spawn_relay(vec![event.clone()], RelayBehavior::Closed).await;
        let (events, reason) = run(url, Filter::metadata_of(pk), &Settings::default()).await;
        assert_eq!(events, vec![event]);
        assert_eq!(reason, MinionExitReason::Error);
    }

    #[tokio::test]
    async fn test_dropping_subscription_cancels() {
        let (keys, pk) = alice();
        let event = metadata_event(&keys, 100, "{}");
        let url = spawn_relay(vec![event], RelayBehavior::Hang).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = Minion::subscribe(url, Filter::metadata_of(pk), tx, &Settings::default());
        assert!(matches!(rx.recv().await, Some(ToPoolMessage::Event(_, _))));

        drop(sub);
        match rx.recv().await {
            Some(ToPoolMessage::Closed(_, reason)) => assert_eq!(reason, MinionExitReason::Cancelled),
            other => panic!("expected close, got {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_is_error() {
        let (_keys, pk) = alice();
        let url = unreachable_relay().await;
        let (events, reason) = run(url, Filter::metadata_of(pk), &Settings::default()).await;
        assert!(events.is_empty());
        assert_eq!(reason, MinionExitReason::Error);
    }

    #[tokio::test]
    async fn test_cancel() {
        let (keys, pk) = alice();
        let event = metadata_event(&keys, 100, "{}");
        let url = spawn_relay(vec![event.clone()], RelayBehavior::Hang).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = Minion::subscribe(url.clone(), Filter::metadata_of(pk), tx, &Settings::default());
        assert_eq!(sub.url(), &url);

        match rx.recv().await {
            Some(ToPoolMessage::Event(from, e)) => {
                assert_eq!(from, url);
                assert_eq!(*e, event);
            }
            other => panic!("expected an event, got {:?}", other),
        }

        sub.cancel();
        match rx.recv().await {
            Some(ToPoolMessage::Closed(_, reason)) => assert_eq!(reason, MinionExitReason::Cancelled),
            other => panic!("expected close, got {:?}", other),
        }
        // exactly one Closed: the channel ends after it
        assert!(rx.recv().await.is_none());
    }
}
