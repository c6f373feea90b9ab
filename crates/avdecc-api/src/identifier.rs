// ── Protocol identity types ──
//
// EntityId, EntityModelId and MacAddress are the keys every other type
// hangs off. All three are plain `Copy` values rendered the way AVDECC
// tooling prints them (upper-case hex, colon-separated MACs).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Index of a descriptor within its (configuration, type) table.
pub type DescriptorIndex = u16;

/// Index of a configuration within an entity.
pub type ConfigurationIndex = u16;

// ── EntityId ────────────────────────────────────────────────────────

/// 64-bit globally unique identifier of an AVDECC entity (EUI-64).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// The all-zero id, used on the wire for "no entity".
    pub const NULL: Self = Self(0);
    /// The all-ones id, used for fields that were never initialized.
    pub const UNINITIALIZED: Self = Self(u64::MAX);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Neither null nor uninitialized.
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 != u64::MAX
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_u64(s).map(Self)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ── EntityModelId ───────────────────────────────────────────────────

/// Identity of an entity's model: vendor OUI-24 in the top 24 bits,
/// followed by vendor-assigned device and model bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityModelId(u64);

impl EntityModelId {
    pub const NULL: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// The vendor OUI-24 portion of the id.
    pub fn vendor_id(self) -> u32 {
        u32::try_from(self.0 >> 40).unwrap_or_default()
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EntityModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl FromStr for EntityModelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_u64(s).map(Self)
    }
}

impl From<u64> for EntityModelId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ── MacAddress ──────────────────────────────────────────────────────

/// 48-bit MAC address, displayed as `aa:bb:cc:dd:ee:ff`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(self) -> [u8; 6] {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    /// Accepts colon-separated, dash-separated, or bare hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if hex.len() != 12 {
            return Err(invalid(s, "expected 6 octets"));
        }
        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            let pair = hex
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| invalid(s, "truncated octet"))?;
            *octet = u8::from_str_radix(pair, 16).map_err(|e| invalid(s, &e.to_string()))?;
        }
        Ok(Self(octets))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn parse_hex_u64(s: &str) -> Result<u64, Error> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| invalid(s, &e.to_string()))
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::InvalidIdentifier {
        input: input.to_owned(),
        reason: reason.to_owned(),
    }
}
