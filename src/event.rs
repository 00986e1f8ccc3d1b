use crate::error::{Error, ErrorKind};
use crate::keys::PublicKey;
use crate::misc::Unixtime;
use secp256k1::{schnorr, Message, XOnlyPublicKey, SECP256K1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Event kinds this crate understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum EventKind {
    Metadata,
    ContactList,
    Other(u32),
}

impl From<u32> for EventKind {
    fn from(u: u32) -> EventKind {
        match u {
            0 => EventKind::Metadata,
            3 => EventKind::ContactList,
            x => EventKind::Other(x),
        }
    }
}

impl From<EventKind> for u32 {
    fn from(kind: EventKind) -> u32 {
        match kind {
            EventKind::Metadata => 0,
            EventKind::ContactList => 3,
            EventKind::Other(x) => x,
        }
    }
}

/// A signed nostr event as it travels on the wire
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: PublicKey,
    pub created_at: Unixtime,
    pub kind: EventKind,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("pubkey", &self.pubkey)
            .field("created_at", &self.created_at.0)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Event {
    /// Compute the id from the serialized content fields, as lowercase hex
    pub fn compute_id(
        pubkey: &PublicKey,
        created_at: Unixtime,
        kind: EventKind,
        tags: &[Vec<String>],
        content: &str,
    ) -> Result<String, Error> {
        let serializable = (
            0,
            pubkey.as_hex_string(),
            created_at.0,
            u32::from(kind),
            tags,
            content,
        );
        let serialized = serde_json::to_string(&serializable)?;
        let digest = Sha256::digest(serialized.as_bytes());
        Ok(hex::encode(digest))
    }

    /// Check the id against the content fields and the signature against the id.
    ///
    /// Verification failure is an expected outcome, so this only returns the reason
    /// as an error for logging. Use [`Event::verify`] for a plain answer.
    pub fn verify_detailed(&self) -> Result<(), Error> {
        let computed = Event::compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )?;
        if computed != self.id {
            return Err(ErrorKind::InvalidEvent(format!(
                "id {} does not match content hash {}",
                self.id, computed
            ))
            .into());
        }

        let id_bytes = hex::decode(&self.id)?;
        let sig_bytes = hex::decode(&self.sig)?;
        let message = Message::from_slice(&id_bytes)?;
        let signature = schnorr::Signature::from_slice(&sig_bytes)?;
        let pubkey = XOnlyPublicKey::from_slice(self.pubkey.as_bytes())?;
        SECP256K1.verify_schnorr(&signature, &message, &pubkey)?;
        Ok(())
    }

    pub fn verify(&self) -> bool {
        match self.verify_detailed() {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Event {} failed verification: {}", self.id, e);
                false
            }
        }
    }

    /// Values of all tags with the given name (first element)
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags.iter().filter_map(move |tag| match tag.as_slice() {
            [n, value, ..] if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// Public keys tagged with `p` tags. Malformed keys are skipped.
    pub fn tagged_pubkeys(&self) -> impl Iterator<Item = PublicKey> + '_ {
        self.tag_values("p")
            .filter_map(|v| PublicKey::try_from_hex_string(v).ok())
    }
}

/// Gate for extension-based login: the event must verify and be signed by the
/// key the session claims.
pub fn verify_login(event: &Event, claimed: &PublicKey) -> bool {
    if event.pubkey != *claimed {
        tracing::info!(
            "Login refused: event signed by {} but {} was claimed",
            event.pubkey,
            claimed
        );
        return false;
    }
    if !event.verify() {
        tracing::info!("Login refused: signature check failed for {}", claimed);
        return false;
    }
    true
}
