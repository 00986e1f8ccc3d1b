use std::panic::Location;

/// Error kinds that can occur in nostr-directory
#[derive(Debug)]
pub enum ErrorKind {
    Bech32(bech32::Error),
    Disconnected,
    General(String),
    Hex(hex::FromHexError),
    IdentityNotFound(String),
    InvalidEvent(String),
    InvalidKey(String),
    InvalidNip05(String),
    InvalidRelayMessage(String),
    InvalidUrl(String),
    Io(std::io::Error),
    JoinError(tokio::task::JoinError),
    MalformedPayload(String),
    ParseInt(std::num::ParseIntError),
    ParseBool(std::str::ParseBoolError),
    PublicKeyTaken,
    RelayClosedSubscription(String),
    Secp256k1(secp256k1::Error),
    SerdeJson(serde_json::Error),
    Sql(rusqlite::Error),
    Timeout(tokio::time::error::Elapsed),
    UnknownCommand(String),
    UnknownSetting(String),
    UrlParse(url::ParseError),
    Usage(String, String), // error, usage line
    UsernameTaken(String),
    Websocket(tungstenite::Error),
}

/// Errors that can occur in nostr-directory, including the file and line number
/// where they were generated
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    location: &'static Location<'static>,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.kind, self.location)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ErrorKind::*;
        match self {
            Bech32(e) => write!(f, "Bech32: {e}"),
            Disconnected => write!(f, "Disconnected"),
            General(s) => write!(f, "{s}"),
            Hex(e) => write!(f, "Hex: {e}"),
            IdentityNotFound(s) => write!(f, "Identity not found: {s}"),
            InvalidEvent(s) => write!(f, "Invalid event: {s}"),
            InvalidKey(s) => write!(f, "Invalid public key: {s}"),
            InvalidNip05(s) => write!(f, "Invalid NIP-05 identifier, should be user@domain: {s}"),
            InvalidRelayMessage(s) => write!(f, "Invalid relay message: {s}"),
            InvalidUrl(s) => write!(f, "Invalid URL: {s}"),
            Io(e) => write!(f, "I/O Error: {e}"),
            JoinError(e) => write!(f, "Task join error: {e}"),
            MalformedPayload(s) => write!(f, "Malformed metadata payload: {s}"),
            ParseInt(e) => write!(f, "Bad integer: {e}"),
            ParseBool(e) => write!(f, "Bad bool: {e}"),
            PublicKeyTaken => write!(f, "Public key is already registered"),
            RelayClosedSubscription(s) => write!(f, "Relay closed our subscription: {s}"),
            Secp256k1(e) => write!(f, "secp256k1: {e}"),
            SerdeJson(e) => write!(f, "SerdeJson Error: {e}"),
            Sql(e) => write!(f, "SQL: {e}"),
            Timeout(e) => write!(f, "Timeout: {e}"),
            UnknownCommand(s) => write!(f, "Unknown command: {s}"),
            UnknownSetting(s) => write!(f, "Unknown setting: {s}"),
            UrlParse(e) => write!(f, "URL parse: {e}"),
            Usage(e, u) => write!(f, "{}\n\nUsage: {}", e, u),
            UsernameTaken(s) => write!(f, "Username is already taken: {s}"),
            Websocket(e) => write!(f, "Websocket: {e}"),
        }
    }
}

// Note: we impl Into because our typical pattern is ErrorKind::Variant.into()
//       when we tried implementing From, the location was deep in rust code's
//       blanket into implementation, which wasn't the line number we wanted.
//
//       As for converting other error types, the ? operator uses From so it
//       is correct.
#[allow(clippy::from_over_into)]
impl Into<Error> for ErrorKind {
    #[track_caller]
    fn into(self) -> Error {
        Error {
            kind: self,
            location: Location::caller(),
        }
    }
}

impl From<String> for Error {
    #[track_caller]
    fn from(s: String) -> Error {
        Error {
            kind: ErrorKind::General(s),
            location: Location::caller(),
        }
    }
}

impl From<&str> for Error {
    #[track_caller]
    fn from(s: &str) -> Error {
        Error {
            kind: ErrorKind::General(s.to_string()),
            location: Location::caller(),
        }
    }
}

macro_rules! impl_from_error {
    ($source:ty, $variant:ident) => {
        impl From<$source> for Error {
            #[track_caller]
            fn from(e: $source) -> Error {
                Error {
                    kind: ErrorKind::$variant(e),
                    location: Location::caller(),
                }
            }
        }
    };
}

impl_from_error!(bech32::Error, Bech32);
impl_from_error!(hex::FromHexError, Hex);
impl_from_error!(std::io::Error, Io);
impl_from_error!(tokio::task::JoinError, JoinError);
impl_from_error!(std::num::ParseIntError, ParseInt);
impl_from_error!(std::str::ParseBoolError, ParseBool);
impl_from_error!(secp256k1::Error, Secp256k1);
impl_from_error!(serde_json::Error, SerdeJson);
impl_from_error!(rusqlite::Error, Sql);
impl_from_error!(tokio::time::error::Elapsed, Timeout);
impl_from_error!(url::ParseError, UrlParse);
impl_from_error!(tungstenite::Error, Websocket);
