use crate::event::{Event, EventKind};
use crate::keys::PublicKey;
use crate::misc::Unixtime;
use serde::{Deserialize, Serialize};

/// A subscription filter, serialized the way relays expect it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<PublicKey>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<EventKind>,

    #[serde(rename = "#p", default, skip_serializing_if = "Vec::is_empty")]
    pub p: Vec<PublicKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Unixtime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<Unixtime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Filter {
        Filter::default()
    }

    /// Kind-0 events by this author
    pub fn metadata_of(pubkey: PublicKey) -> Filter {
        Filter {
            authors: vec![pubkey],
            kinds: vec![EventKind::Metadata],
            ..Default::default()
        }
    }

    /// Kind-3 events by this author
    pub fn contact_list_of(pubkey: PublicKey) -> Filter {
        Filter {
            authors: vec![pubkey],
            kinds: vec![EventKind::ContactList],
            ..Default::default()
        }
    }

    /// Kind-3 events that tag this public key
    pub fn contact_lists_tagging(pubkey: PublicKey) -> Filter {
        Filter {
            kinds: vec![EventKind::ContactList],
            p: vec![pubkey],
            ..Default::default()
        }
    }

    pub fn event_matches(&self, event: &Event) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| *id == event.id) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.pubkey) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.p.is_empty() && !event.tagged_pubkeys().any(|pk| self.p.contains(&pk)) {
            return false;
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{contact_list, metadata_event, TestKeys};

    #[test]
    fn test_serialization_omits_empty_members() {
        let pk = TestKeys::new(1).public_key();
        let json = serde_json::to_string(&Filter::contact_lists_tagging(pk)).unwrap();
        assert_eq!(
            json,
            format!("{{\"kinds\":[3],\"#p\":[\"{}\"]}}", pk.as_hex_string())
        );
    }

    #[test]
    fn test_event_matches() {
        let alice = TestKeys::new(1);
        let bob = TestKeys::new(2);

        let profile = metadata_event(&alice, 100, "{}");
        let follows_alice = contact_list(&bob, 100, &[alice.public_key()]);

        assert!(Filter::metadata_of(alice.public_key()).event_matches(&profile));
        assert!(!Filter::metadata_of(bob.public_key()).event_matches(&profile));
        assert!(!Filter::contact_list_of(alice.public_key()).event_matches(&profile));
        assert!(Filter::contact_lists_tagging(alice.public_key()).event_matches(&follows_alice));
        assert!(!Filter::contact_lists_tagging(bob.public_key()).event_matches(&follows_alice));

        let mut windowed = Filter::metadata_of(alice.public_key());
        windowed.since = Some(Unixtime(101));
        assert!(!windowed.event_matches(&profile));
        windowed.since = None;
        windowed.until = Some(Unixtime(99));
        assert!(!windowed.event_matches(&profile));
    }
}
