use crate::error::{Error, ErrorKind};
use crate::event::Event;
use crate::misc::{Freshness, Unixtime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Social metadata cached on an identity record.
///
/// `updated_at == None` means the metadata was never fetched, or expired and
/// must be refetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
    pub banner: Option<String>,
    pub followers: u64,
    pub following: u64,
    pub updated_at: Option<Unixtime>,
}

impl ProfileMetadata {
    pub fn freshness(&self, now: Unixtime, ttl: Duration) -> Freshness {
        match self.updated_at {
            None => Freshness::NeverSought,
            Some(updated_at) => {
                // A timestamp in the future counts as fresh
                if updated_at > now || now - updated_at < ttl {
                    Freshness::Fresh
                } else {
                    Freshness::Stale
                }
            }
        }
    }

    /// Blank the display fields of expired metadata. Counters are kept.
    pub fn clear_expired(&mut self) {
        self.display_name = None;
        self.about = None;
        self.picture = None;
        self.banner = None;
        self.updated_at = None;
    }

    /// Take the display fields from a parsed profile payload
    pub fn apply_content(&mut self, content: MetadataContent) {
        self.display_name = content.display_name;
        self.about = content.about;
        self.picture = content.picture;
        self.banner = content.banner;
    }

    pub fn has_counters(&self) -> bool {
        self.followers != 0 || self.following != 0
    }
}

/// The fields we use out of a kind-0 payload. Everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataContent {
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
    pub banner: Option<String>,
}

impl MetadataContent {
    pub fn parse(content: &str) -> Result<MetadataContent, Error> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| -> Error { ErrorKind::MalformedPayload(e.to_string()).into() })?;
        let map = match value {
            Value::Object(map) => map,
            _ => {
                return Err(
                    ErrorKind::MalformedPayload("payload is not a JSON object".to_owned()).into(),
                )
            }
        };

        Ok(MetadataContent {
            display_name: string_field(&map, "display_name").or(string_field(&map, "name")),
            about: string_field(&map, "about"),
            picture: string_field(&map, "picture"),
            banner: string_field(&map, "banner"),
        })
    }
}

// Non-string values and empty strings count as absent
fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.to_owned()),
        _ => None,
    }
}

/// The newest event wins. Equal timestamps are broken by the greater id.
pub fn select_canonical<'a, I>(events: I) -> Option<&'a Event>
where
    I: IntoIterator<Item = &'a Event>,
{
    events
        .into_iter()
        .max_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
}
