use crate::error::{Error, ErrorKind};
use bech32::{FromBase32, ToBase32, Variant};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The human readable part of a display-encoded public key
pub const NPUB_HRP: &str = "npub";

/// A 32-byte x-only public key.
///
/// The canonical form is 64 lowercase hex characters. The `npub` bech32
/// encoding is derived from it and decodes back to the same bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> PublicKey {
        PublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Accept either 64 hex characters (any case) or an `npub1...` string
    pub fn normalize(input: &str) -> Result<PublicKey, Error> {
        let input = input.trim();
        if input.len() == 64 && input.chars().all(|c| c.is_ascii_hexdigit()) {
            PublicKey::try_from_hex_string(input)
        } else if input.to_ascii_lowercase().starts_with("npub1") {
            PublicKey::try_from_bech32_string(input)
        } else {
            Err(ErrorKind::InvalidKey(format!(
                "expected 64 hex characters or an npub, got {} characters",
                input.len()
            ))
            .into())
        }
    }

    pub fn try_from_hex_string(hex_str: &str) -> Result<PublicKey, Error> {
        if hex_str.len() != 64 {
            return Err(
                ErrorKind::InvalidKey(format!("hex key has length {}", hex_str.len())).into(),
            );
        }
        let vec = hex::decode(hex_str.to_ascii_lowercase())
            .map_err(|e| -> Error { ErrorKind::InvalidKey(e.to_string()).into() })?;
        PublicKey::try_from_slice(&vec)
    }

    pub fn try_from_bech32_string(s: &str) -> Result<PublicKey, Error> {
        let (hrp, data, variant) = bech32::decode(s)
            .map_err(|e| -> Error { ErrorKind::InvalidKey(e.to_string()).into() })?;
        if hrp != NPUB_HRP {
            return Err(ErrorKind::InvalidKey(format!("wrong encoding tag {hrp}")).into());
        }
        if variant != Variant::Bech32 {
            return Err(ErrorKind::InvalidKey("bech32m is not used for npub".to_owned()).into());
        }
        let vec = Vec::<u8>::from_base32(&data)
            .map_err(|e| -> Error { ErrorKind::InvalidKey(e.to_string()).into() })?;
        PublicKey::try_from_slice(&vec)
    }

    fn try_from_slice(slice: &[u8]) -> Result<PublicKey, Error> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| -> Error {
            ErrorKind::InvalidKey(format!("key has {} bytes", slice.len())).into()
        })?;
        Ok(PublicKey(bytes))
    }

    pub fn as_hex_string(&self) -> String {
        hex::encode(self.0)
    }

    /// The `npub1...` display encoding
    pub fn as_bech32_string(&self) -> String {
        // encoding 32 bytes under a fixed, valid hrp cannot fail
        bech32::encode(NPUB_HRP, self.0.to_base32(), Variant::Bech32).unwrap_or_default()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.as_hex_string())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex_string())
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<PublicKey, Error> {
        PublicKey::normalize(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_hex_string())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<PublicKey, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::try_from_hex_string(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const HEX: &str = "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d";
    const NPUB: &str = "npub180cvv07tjdrrgpa0j7j7tmnyl2yr6yr7l8j4s3evf6u64th6gkwsyjh6w6";

    #[test]
    fn test_known_npub() {
        let pk = PublicKey::normalize(HEX).unwrap();
        assert_eq!(pk.as_bech32_string(), NPUB);
        assert_eq!(PublicKey::normalize(NPUB).unwrap(), pk);
    }

    #[test]
    fn test_round_trip() {
        for input in [
            HEX,
            NPUB,
            "0000000000000000000000000000000000000000000000000000000000000000",
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF",
        ] {
            let pk = PublicKey::normalize(input).unwrap();
            let again = PublicKey::normalize(&pk.as_bech32_string()).unwrap();
            assert_eq!(again, pk);
        }
    }

    #[test]
    fn test_hex_is_lowercased() {
        let pk = PublicKey::normalize(&HEX.to_uppercase()).unwrap();
        assert_eq!(pk.as_hex_string(), HEX);
        let pk = PublicKey::normalize(&format!("  {HEX}\n")).unwrap();
        assert_eq!(pk.as_hex_string(), HEX);
    }

    #[test]
    fn test_malformed_inputs() {
        let too_short = &HEX[..63];
        let too_long = format!("{HEX}0");
        let non_hex = format!("{}g", &HEX[..63]);
        let mut bad_checksum = NPUB.to_owned();
        bad_checksum.pop();
        bad_checksum.push('7');
        let wrong_tag = bech32::encode(
            "nsec",
            PublicKey::normalize(HEX).unwrap().as_bytes().to_base32(),
            Variant::Bech32,
        )
        .unwrap();
        let short_npub =
            bech32::encode(NPUB_HRP, [7u8; 31].to_base32(), Variant::Bech32).unwrap();

        for input in [
            "",
            too_short,
            too_long.as_str(),
            non_hex.as_str(),
            bad_checksum.as_str(),
            wrong_tag.as_str(),
            short_npub.as_str(),
            "npub1",
        ] {
            match PublicKey::normalize(input) {
                Err(Error {
                    kind: ErrorKind::InvalidKey(_),
                    ..
                }) => {}
                other => panic!("{input:?} should be an invalid key, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_serde_uses_hex() {
        let pk = PublicKey::normalize(NPUB).unwrap();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{HEX}\""));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }
}
