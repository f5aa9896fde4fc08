//! Byte quantities written the way volume requests write them.
//!
//! Accepts plain integers (`1536000`), decimal suffixes (`k`, `M`, `G`, `T`,
//! `P`, `E`) and binary suffixes (`Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei`), with an
//! optional fractional mantissa (`1.5Gi`). Fractions are rounded up to a
//! whole byte.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use volimport_shared::errors::{ImportError, ImportResult};

const SUFFIXES: &[(&str, u128)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// A non-negative number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Quantity(u64);

impl Quantity {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> u64 {
        self.0
    }

    /// Parse an optional size string; blank means "no size requested".
    pub fn parse_optional(value: &str) -> ImportResult<Option<Quantity>> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }
}

impl FromStr for Quantity {
    type Err = ImportError;

    fn from_str(value: &str) -> ImportResult<Self> {
        let invalid = |reason: &str| ImportError::InvalidSize {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = value.trim();
        let (number, multiplier) = SUFFIXES
            .iter()
            .find_map(|(suffix, mult)| trimmed.strip_suffix(suffix).map(|n| (n, *mult)))
            .unwrap_or((trimmed, 1));

        if number.is_empty() {
            return Err(invalid("missing number"));
        }

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("missing number"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid("expected digits with an optional unit suffix"));
        }
        if fraction.len() > 18 {
            return Err(invalid("too many fractional digits"));
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("number out of range"))?
        };
        let mut bytes = whole
            .checked_mul(multiplier)
            .ok_or_else(|| invalid("number out of range"))?;

        if !fraction.is_empty() {
            let scale = 10u128.pow(fraction.len() as u32);
            let digits: u128 = fraction.parse().map_err(|_| invalid("invalid fraction"))?;
            bytes += (digits * multiplier).div_ceil(scale);
        }

        u64::try_from(bytes)
            .map(Quantity)
            .map_err(|_| invalid("number out of range"))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Quantity {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
