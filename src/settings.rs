use crate::error::{Error, ErrorKind};
use crate::relay_url::{parse_relay_hints, RelayUrl};
use crate::storage::SqliteStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_METADATA_TTL_SECS: u64 = 60 * 60 * 24; // 24 hours
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_WEBSOCKET_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_WEBSOCKET_MESSAGE_SIZE_KB: usize = 1024; // 1 MB
pub const DEFAULT_SET_USER_AGENT: bool = true;
pub const DEFAULT_COUNT_SOCIAL_GRAPH: bool = true;
pub const DEFAULT_BOOTSTRAP_RELAYS: [&str; 3] = [
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
];

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    pub metadata_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    pub websocket_connect_timeout_secs: u64,
    pub max_websocket_message_size_kb: usize,
    pub set_user_agent: bool,
    pub count_social_graph: bool,
    pub bootstrap_relays: Vec<RelayUrl>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            metadata_ttl_secs: DEFAULT_METADATA_TTL_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            websocket_connect_timeout_secs: DEFAULT_WEBSOCKET_CONNECT_TIMEOUT_SECS,
            max_websocket_message_size_kb: DEFAULT_MAX_WEBSOCKET_MESSAGE_SIZE_KB,
            set_user_agent: DEFAULT_SET_USER_AGENT,
            count_social_graph: DEFAULT_COUNT_SOCIAL_GRAPH,
            bootstrap_relays: parse_relay_hints(DEFAULT_BOOTSTRAP_RELAYS),
        }
    }
}

impl Settings {
    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn websocket_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.websocket_connect_timeout_secs)
    }

    pub async fn load(store: &SqliteStore) -> Result<Settings, Error> {
        let mut settings = Settings::default();
        for (key, value) in store.read_settings().await? {
            if let Err(e) = settings.apply(&key, &value) {
                tracing::warn!("Ignoring stored setting {}: {}", key, e);
            }
        }
        Ok(settings)
    }

    pub async fn save(&self, store: &SqliteStore) -> Result<(), Error> {
        for (key, value) in self.to_pairs()? {
            store.write_setting(key, value).await?;
        }
        Ok(())
    }

    /// Set one setting from its string form (as stored, or as typed on the command line)
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), Error> {
        match key {
            "metadata_ttl_secs" => self.metadata_ttl_secs = value.parse::<u64>()?,
            "fetch_timeout_secs" => self.fetch_timeout_secs = value.parse::<u64>()?,
            "websocket_connect_timeout_secs" => {
                self.websocket_connect_timeout_secs = value.parse::<u64>()?
            }
            "max_websocket_message_size_kb" => {
                self.max_websocket_message_size_kb = value.parse::<usize>()?
            }
            "set_user_agent" => self.set_user_agent = value.parse::<bool>()?,
            "count_social_graph" => self.count_social_graph = value.parse::<bool>()?,
            "bootstrap_relays" => {
                // stored as JSON, typed as a comma separated list
                let relays: Vec<RelayUrl> = match serde_json::from_str(value) {
                    Ok(relays) => relays,
                    Err(_) => parse_relay_hints(value.split(',')),
                };
                self.bootstrap_relays = relays;
            }
            other => return Err(ErrorKind::UnknownSetting(other.to_owned()).into()),
        }
        Ok(())
    }

    pub fn to_pairs(&self) -> Result<Vec<(&'static str, String)>, Error> {
        Ok(vec![
            ("metadata_ttl_secs", self.metadata_ttl_secs.to_string()),
            ("fetch_timeout_secs", self.fetch_timeout_secs.to_string()),
            (
                "websocket_connect_timeout_secs",
                self.websocket_connect_timeout_secs.to_string(),
            ),
            (
                "max_websocket_message_size_kb",
                self.max_websocket_message_size_kb.to_string(),
            ),
            ("set_user_agent", self.set_user_agent.to_string()),
            ("count_social_graph", self.count_social_graph.to_string()),
            (
                "bootstrap_relays",
                serde_json::to_string(&self.bootstrap_relays)?,
            ),
        ])
    }
}
