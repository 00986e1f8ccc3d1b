use crate::error::{Error, ErrorKind};
use crate::event::Event;
use crate::filter::Filter;
use serde_json::Value;

/// Messages we send to a relay
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Req(String, Vec<Filter>),
    Close(String),
}

impl ClientMessage {
    pub fn to_wire(&self) -> Result<String, Error> {
        let value = match self {
            ClientMessage::Req(subid, filters) => {
                let mut array = vec![Value::from("REQ"), Value::from(subid.as_str())];
                for filter in filters {
                    array.push(serde_json::to_value(filter)?);
                }
                Value::Array(array)
            }
            ClientMessage::Close(subid) => {
                Value::Array(vec![Value::from("CLOSE"), Value::from(subid.as_str())])
            }
        };
        Ok(serde_json::to_string(&value)?)
    }
}

/// Messages a relay sends to us
#[derive(Debug, Clone)]
pub enum RelayMessage {
    Event(String, Box<Event>),
    Eose(String),
    Closed(String, String),
    Notice(String),
    Ok(String, bool, String),
    Auth(String),
}

impl RelayMessage {
    pub fn from_wire(text: &str) -> Result<RelayMessage, Error> {
        let value: Value = serde_json::from_str(text)?;
        let array = match value {
            Value::Array(a) => a,
            _ => return Err(ErrorKind::InvalidRelayMessage("not an array".to_owned()).into()),
        };

        let string_at = |i: usize| -> Result<String, Error> {
            match array.get(i) {
                Some(Value::String(s)) => Ok(s.to_owned()),
                _ => Err(ErrorKind::InvalidRelayMessage(format!("element {i} is not a string"))
                    .into()),
            }
        };

        let tag = string_at(0)?;
        match tag.as_str() {
            "EVENT" => {
                let subid = string_at(1)?;
                let event: Event = match array.get(2) {
                    Some(v) => serde_json::from_value(v.clone())?,
                    None => {
                        return Err(
                            ErrorKind::InvalidRelayMessage("EVENT without event".to_owned()).into(),
                        )
                    }
                };
                Ok(RelayMessage::Event(subid, Box::new(event)))
            }
            "EOSE" => Ok(RelayMessage::Eose(string_at(1)?)),
            "CLOSED" => Ok(RelayMessage::Closed(
                string_at(1)?,
                string_at(2).unwrap_or_default(),
            )),
            "NOTICE" => Ok(RelayMessage::Notice(string_at(1)?)),
            "OK" => {
                let ok = matches!(array.get(2), Some(Value::Bool(true)));
                Ok(RelayMessage::Ok(
                    string_at(1)?,
                    ok,
                    string_at(3).unwrap_or_default(),
                ))
            }
            "AUTH" => Ok(RelayMessage::Auth(string_at(1)?)),
            other => Err(ErrorKind::InvalidRelayMessage(format!("unknown type {other}")).into()),
        }
    }
}
