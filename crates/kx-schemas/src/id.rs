//! Lexicographically sortable identifiers.
//!
//! 26 Crockford-base32 characters: a 48-bit millisecond timestamp followed by
//! 80 bits of randomness, the same shape as a ULID. No dedicated id crate is
//! pulled in for this — the pack the rest of the stack already depends on
//! (`chrono` for the clock, `uuid` for the random bytes) is enough.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// A 26-character, time-prefixed sortable identifier.
///
/// `Id::new` is the production constructor; `Id::from_parts` exists for
/// deterministic test fixtures and replay.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    pub fn new(now: DateTime<Utc>) -> Self {
        let random: [u8; 10] = Uuid::new_v4().as_bytes()[..10].try_into().unwrap();
        Self::from_parts(now.timestamp_millis().max(0) as u64, random)
    }

    pub fn from_parts(ts_millis: u64, random: [u8; 10]) -> Self {
        Self(encode(ts_millis, random))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuilds an `Id` from a previously-rendered string, e.g. a column
    /// read back from a store. Does not validate the Crockford alphabet;
    /// callers read back only strings they themselves wrote.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}

fn encode(ts_millis: u64, random: [u8; 10]) -> String {
    let mut bytes = [0u8; 16];
    bytes[0] = (ts_millis >> 40) as u8;
    bytes[1] = (ts_millis >> 32) as u8;
    bytes[2] = (ts_millis >> 24) as u8;
    bytes[3] = (ts_millis >> 16) as u8;
    bytes[4] = (ts_millis >> 8) as u8;
    bytes[5] = ts_millis as u8;
    bytes[6..16].copy_from_slice(&random);

    let mut out = String::with_capacity(26);
    // 128 bits -> 26 base32 symbols (5 bits each, last symbol uses 2 bits).
    let mut acc: u128 = 0;
    for b in bytes {
        acc = (acc << 8) | b as u128;
    }
    let mut symbols = [0u8; 26];
    for slot in symbols.iter_mut().rev() {
        *slot = CROCKFORD[(acc & 0x1F) as usize];
        acc >>= 5;
    }
    out.push_str(std::str::from_utf8(&symbols).unwrap());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_26_chars_of_crockford_alphabet() {
        let id = Id::from_parts(1_700_000_000_000, [0u8; 10]);
        assert_eq!(id.as_str().len(), 26);
        assert!(id.as_str().bytes().all(|b| CROCKFORD.contains(&b)));
    }

    #[test]
    fn sorts_by_timestamp_first() {
        let earlier = Id::from_parts(1_000, [0xFF; 10]);
        let later = Id::from_parts(2_000, [0x00; 10]);
        assert!(earlier < later);
    }

    #[test]
    fn same_timestamp_orders_by_random_bytes() {
        let a = Id::from_parts(1_000, [0x01; 10]);
        let b = Id::from_parts(1_000, [0x02; 10]);
        assert!(a < b);
    }
}
