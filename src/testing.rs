//! Fixtures shared by the unit tests: deterministic keys, signed events,
//! an in-process websocket relay and a counting event fetcher.

use crate::event::{Event, EventKind};
use crate::filter::Filter;
use crate::keys::PublicKey;
use crate::misc::Unixtime;
use crate::pool::EventFetcher;
use crate::relay_url::RelayUrl;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secp256k1::{KeyPair, Message, Secp256k1};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tungstenite::protocol::Message as WsMessage;

pub struct TestKeys {
    keypair: KeyPair,
}

impl TestKeys {
    /// A fixed key pair derived from the seed byte (must not be zero)
    pub fn new(seed: u8) -> TestKeys {
        let secp = Secp256k1::new();
        let keypair = KeyPair::from_seckey_slice(&secp, &[seed; 32]).unwrap();
        TestKeys { keypair }
    }

    pub fn public_key(&self) -> PublicKey {
        let (xonly, _parity) = self.keypair.x_only_public_key();
        PublicKey::from_bytes(xonly.serialize())
    }
}

pub fn signed_event(
    keys: &TestKeys,
    kind: EventKind,
    created_at: i64,
    tags: Vec<Vec<String>>,
    content: &str,
) -> Event {
    let pubkey = keys.public_key();
    let created_at = Unixtime(created_at);
    let id = Event::compute_id(&pubkey, created_at, kind, &tags, content).unwrap();
    let message = Message::from_slice(&hex::decode(&id).unwrap()).unwrap();
    let sig = Secp256k1::new().sign_schnorr_no_aux_rand(&message, &keys.keypair);
    let sig_bytes: &[u8; 64] = sig.as_ref();
    Event {
        id,
        pubkey,
        created_at,
        kind,
        tags,
        content: content.to_owned(),
        sig: hex::encode(sig_bytes),
    }
}

pub fn metadata_event(keys: &TestKeys, created_at: i64, content: &str) -> Event {
    signed_event(keys, EventKind::Metadata, created_at, vec![], content)
}

pub fn contact_list(keys: &TestKeys, created_at: i64, follows: &[PublicKey]) -> Event {
    let tags = follows
        .iter()
        .map(|pk| vec!["p".to_owned(), pk.as_hex_string()])
        .collect();
    signed_event(keys, EventKind::ContactList, created_at, tags, "")
}

/// How the in-process relay ends a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayBehavior {
    /// Send stored events then EOSE
    Complete,
    /// Send stored events and then go quiet
    Hang,
    /// Send stored events then drop the connection without EOSE
    Drop,
    /// Send stored events then refuse the subscription with CLOSED
    Closed,
}

/// Start a websocket relay on a random local port. It answers every REQ with
/// the stored events that match the filter.
pub async fn spawn_relay(events: Vec<Event>, behavior: RelayBehavior) -> RelayUrl {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let events = events.clone();
            tokio::spawn(async move {
                let mut ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                while let Some(Ok(msg)) = ws.next().await {
                    let text = match msg {
                        WsMessage::Text(t) => t,
                        WsMessage::Close(_) => return,
                        _ => continue,
                    };
                    let value: serde_json::Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if value[0] != "REQ" {
                        continue;
                    }
                    let subid = value[1].as_str().unwrap_or_default().to_owned();
                    let filter: Filter = match serde_json::from_value(value[2].clone()) {
                        Ok(f) => f,
                        Err(_) => continue,
                    };
                    for event in events.iter().filter(|e| filter.event_matches(e)) {
                        let wire = serde_json::json!(["EVENT", subid, event]).to_string();
                        if ws.send(WsMessage::Text(wire)).await.is_err() {
                            return;
                        }
                    }
                    match behavior {
                        RelayBehavior::Complete => {
                            let wire = serde_json::json!(["EOSE", subid]).to_string();
                            let _ = ws.send(WsMessage::Text(wire)).await;
                        }
                        RelayBehavior::Hang => {}
                        RelayBehavior::Drop => return,
                        RelayBehavior::Closed => {
                            let wire = serde_json::json!(["CLOSED", subid, "error: shutting down"])
                                .to_string();
                            let _ = ws.send(WsMessage::Text(wire)).await;
                        }
                    }
                }
            });
        }
    });

    RelayUrl::try_from_str(&format!("ws://{}", addr)).unwrap()
}

/// A relay address nothing listens on
pub async fn unreachable_relay() -> RelayUrl {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    RelayUrl::try_from_str(&format!("ws://{}", addr)).unwrap()
}

/// An [`EventFetcher`] that answers from a fixed set of events and counts the
/// queries it was asked to run.
pub struct CountingFetcher {
    pub events: Vec<Event>,
    pub delay: Duration,
    pub queries: AtomicUsize,
}

impl CountingFetcher {
    pub fn new(events: Vec<Event>) -> CountingFetcher {
        CountingFetcher {
            events,
            delay: Duration::from_millis(0),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> CountingFetcher {
        self.delay = delay;
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventFetcher for CountingFetcher {
    async fn fetch(&self, filter: Filter, _relays: Vec<RelayUrl>, timeout: Duration) -> Vec<Event> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay.min(timeout)).await;
        self.events
            .iter()
            .filter(|e| filter.event_matches(e))
            .cloned()
            .collect()
    }
}
