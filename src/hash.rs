//! SHA-256 content hashes used as primary and dedup keys.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// SHA-256 digest of file bytes
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
   pub const fn new(hash: [u8; 32]) -> Self {
      Self(hash)
   }

   /// Computes SHA-256 hash of data
   pub fn sum(dat: impl AsRef<[u8]>) -> Self {
      Self(Sha256::digest(dat.as_ref()).into())
   }

   /// Lowercase hex form, as stored and displayed.
   pub fn to_hex(&self) -> String {
      hex::encode(self.0)
   }
}

impl AsRef<[u8]> for ContentHash {
   fn as_ref(&self) -> &[u8] {
      &self.0
   }
}

impl FromStr for ContentHash {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      let mut out = [0u8; 32];
      hex::decode_to_slice(s.trim(), &mut out).map_err(|_| Error::InvalidHash(s.to_string()))?;
      Ok(Self(out))
   }
}

impl fmt::Display for ContentHash {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}", hex::encode(self.0))
   }
}

impl fmt::Debug for ContentHash {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "Hash({})", hex::encode(self.0))
   }
}

impl Serialize for ContentHash {
   fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
      serializer.serialize_str(&self.to_hex())
   }
}

impl<'de> Deserialize<'de> for ContentHash {
   fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
      let raw = String::deserialize(deserializer)?;
      raw.parse().map_err(serde::de::Error::custom)
   }
}

#[cfg(test)]
mod tests {
   use proptest::prelude::*;

   use super::*;

   #[test]
   fn known_digest() {
      let hash = ContentHash::sum(b"abc");
      assert_eq!(
         hash.to_string(),
         "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
      );
   }

   #[test]
   fn parse_rejects_short_input() {
      assert!(matches!("abcd".parse::<ContentHash>(), Err(Error::InvalidHash(_))));
   }

   #[test]
   fn serde_uses_hex_string() {
      let hash = ContentHash::sum(b"map");
      let json = serde_json::to_string(&hash).unwrap();
      assert_eq!(json, format!("\"{hash}\""));
      let back: ContentHash = serde_json::from_str(&json).unwrap();
      assert_eq!(back, hash);
   }

   proptest! {
      #[test]
      fn digest_is_deterministic(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
         let a = ContentHash::sum(&payload);
         let b = ContentHash::sum(payload.clone());
         prop_assert_eq!(a, b);
         prop_assert_eq!(a.to_string().parse::<ContentHash>().unwrap(), a);
      }

      #[test]
      fn distinct_payloads_distinct_hashes(
         a in proptest::collection::vec(any::<u8>(), 1..64),
         b in proptest::collection::vec(any::<u8>(), 1..64),
      ) {
         prop_assume!(a != b);
         prop_assert_ne!(ContentHash::sum(&a), ContentHash::sum(&b));
      }
   }
}
