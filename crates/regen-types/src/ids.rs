//! Type-safe identifier for users of the mini-app.
//!
//! Users are keyed by their Farcaster id (`fid`), a positive integer
//! assigned by the social-identity network. The regeneration engine treats
//! it as opaque; the newtype only prevents mixing it up with balances or
//! tick counts.
//!
//! Fids are stored in a signed `BIGINT` column, so the usable range is
//! `1..=i64::MAX`.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Farcaster user identifier.
///
/// Zero and values above [`Fid::MAX`] are never valid; [`Fid::new`],
/// [`FromStr`] and deserialization all reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(try_from = "u64")]
#[ts(export, export_to = "bindings/")]
pub struct Fid(#[ts(type = "number")] u64);

impl Fid {
    /// Largest representable fid (`i64::MAX`).
    pub const MAX: u64 = i64::MAX.unsigned_abs();

    /// Wrap a raw fid, returning `None` for zero or anything above [`Fid::MAX`].
    pub const fn new(raw: u64) -> Option<Self> {
        if raw == 0 || raw > Self::MAX {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Return the inner numeric value.
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reasons a string could not be parsed into a [`Fid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFidError {
    /// The input was not a base-10 unsigned integer.
    NotANumber(String),
    /// The input was `0`.
    Zero,
    /// The input exceeded [`Fid::MAX`].
    TooLarge(u64),
}

impl fmt::Display for ParseFidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotANumber(raw) => write!(f, "fid must be a positive integer, got {raw:?}"),
            Self::Zero => f.write_str("fid must be non-zero"),
            Self::TooLarge(raw) => write!(f, "fid {raw} exceeds maximum {}", Fid::MAX),
        }
    }
}

impl std::error::Error for ParseFidError {}

impl TryFrom<u64> for Fid {
    type Error = ParseFidError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        match raw {
            0 => Err(ParseFidError::Zero),
            _ => Self::new(raw).ok_or(ParseFidError::TooLarge(raw)),
        }
    }
}

impl FromStr for Fid {
    type Err = ParseFidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u64 = s
            .trim()
            .parse()
            .map_err(|_err| ParseFidError::NotANumber(s.to_owned()))?;
        Self::try_from(raw)
    }
}
