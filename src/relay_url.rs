use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A normalized websocket relay URL.
///
/// Two spellings of the same relay (`WSS://Relay.Example.com` and
/// `wss://relay.example.com/`) normalize to the same value, so sets of
/// `RelayUrl` deduplicate relays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelayUrl(String);

impl RelayUrl {
    pub fn try_from_str(s: &str) -> Result<RelayUrl, Error> {
        let url = url::Url::parse(s.trim())?;
        if url.scheme() != "wss" && url.scheme() != "ws" {
            return Err(ErrorKind::InvalidUrl(format!("not a websocket url: {s}")).into());
        }
        match url.host_str() {
            None => return Err(ErrorKind::InvalidUrl(format!("url has no host: {s}")).into()),
            Some("") => {
                return Err(ErrorKind::InvalidUrl(format!("url has empty host: {s}")).into())
            }
            Some(_) => {}
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(ErrorKind::InvalidUrl(format!("url has credentials: {s}")).into());
        }

        // url::Url already lowercases scheme and host, and strips default ports.
        // A bare host gets a "/" path; we drop fragments.
        let mut url = url;
        url.set_fragment(None);
        Ok(RelayUrl(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for RelayUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RelayUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<RelayUrl, D::Error> {
        let s = String::deserialize(deserializer)?;
        RelayUrl::try_from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse relay hints, skipping (and logging) the ones that are not valid relay urls
pub fn parse_relay_hints<'a, I>(hints: I) -> Vec<RelayUrl>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut output: Vec<RelayUrl> = Vec::new();
    for hint in hints {
        if hint.trim().is_empty() {
            continue;
        }
        match RelayUrl::try_from_str(hint) {
            Ok(url) => {
                if !output.contains(&url) {
                    output.push(url);
                }
            }
            Err(e) => tracing::warn!("Skipping relay hint {}: {}", hint, e),
        }
    }
    output
}
