use crate::error::{Error, ErrorKind};
use crate::keys::PublicKey;
use crate::relay_url::RelayUrl;
use crate::storage::IdentityRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The user part that asks for the domain's root identity
pub const ROOT_NAME: &str = "_";

/// The `/.well-known/nostr.json` document served for one name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nip05Document {
    pub names: BTreeMap<String, PublicKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relays: Option<BTreeMap<PublicKey, Vec<RelayUrl>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lnurl: Option<BTreeMap<PublicKey, String>>,
}

impl Nip05Document {
    /// The answer for `_`: no names, no relays
    pub fn root() -> Nip05Document {
        Nip05Document {
            names: BTreeMap::new(),
            relays: Some(BTreeMap::new()),
            lnurl: None,
        }
    }

    pub fn for_identity(record: &IdentityRecord) -> Nip05Document {
        let mut names = BTreeMap::new();
        names.insert(record.username.clone(), record.pubkey);

        let relays = if record.relays.is_empty() {
            None
        } else {
            let mut relays = BTreeMap::new();
            relays.insert(record.pubkey, record.relays.clone());
            Some(relays)
        };

        let lnurl = record.lightning_address.as_ref().map(|address| {
            let mut lnurl = BTreeMap::new();
            lnurl.insert(record.pubkey, address.clone());
            lnurl
        });

        Nip05Document {
            names,
            relays,
            lnurl,
        }
    }

    pub fn public_key_for(&self, user: &str) -> Option<PublicKey> {
        self.names.get(user).copied()
    }
}

/// Split `user@domain` into its parts. A bare domain means the root name `_`.
pub fn parse_nip05(nip05: &str) -> Result<(String, String), Error> {
    let mut parts: Vec<&str> = nip05.trim().split('@').collect();

    if parts.len() == 1 {
        parts.insert(0, ROOT_NAME);
    }

    match parts.as_slice() {
        [user, domain] if !user.is_empty() && !domain.is_empty() => {
            Ok((user.to_lowercase(), domain.to_lowercase()))
        }
        _ => Err(ErrorKind::InvalidNip05(nip05.to_owned()).into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::relay_url::parse_relay_hints;
    use crate::testing::TestKeys;

    #[test]
    fn test_parse_nip05() {
        assert_eq!(
            parse_nip05("Alice@Example.com").unwrap(),
            ("alice".to_owned(), "example.com".to_owned())
        );
        assert_eq!(
            parse_nip05("example.com").unwrap(),
            ("_".to_owned(), "example.com".to_owned())
        );
        assert!(parse_nip05("a@b@c").is_err());
        assert!(parse_nip05("@example.com").is_err());
        assert!(parse_nip05("alice@").is_err());
        assert!(parse_nip05("").is_err());
    }

    #[test]
    fn test_document_json() {
        let pk = TestKeys::new(1).public_key();
        let hex = pk.as_hex_string();

        let mut record = IdentityRecord::new("alice", pk);
        let doc = Nip05Document::for_identity(&record);
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            serde_json::json!({ "names": { "alice": hex } })
        );

        record.relays = parse_relay_hints(["wss://nos.lol"]);
        record.lightning_address = Some("alice@getalby.com".to_owned());
        let doc = Nip05Document::for_identity(&record);
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            serde_json::json!({
                "names": { "alice": hex },
                "relays": { hex.clone(): ["wss://nos.lol/"] },
                "lnurl": { hex.clone(): "alice@getalby.com" },
            })
        );
        assert_eq!(doc.public_key_for("alice"), Some(pk));

        let parsed: Nip05Document = serde_json::from_value(serde_json::to_value(&doc).unwrap()).unwrap();
        assert_eq!(parsed, doc);

        assert_eq!(
            serde_json::to_value(Nip05Document::root()).unwrap(),
            serde_json::json!({ "names": {}, "relays": {} })
        );
    }
}
