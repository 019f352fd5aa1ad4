use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SdsError;

/// Logical chunk slot of an object.
///
/// A position is a `meta` index, optionally refined by a `sub` index. Simple
/// positions carry `sub == -1`. All replicas sharing the same `meta` value
/// form a meta-chunk.
///
/// Ordering: `meta` → `sub` (total order).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Position {
    meta: u32,
    sub: i32,
}

impl Position {
    /// Sub index of a simple position.
    pub const NO_SUB: i32 = -1;

    /// A position without sub index.
    pub const fn simple(meta: u32) -> Self {
        Self {
            meta,
            sub: Self::NO_SUB,
        }
    }

    /// A position with a sub index. Fails if `sub` is negative.
    pub fn composed(meta: u32, sub: i32) -> Result<Self, SdsError> {
        if sub < 0 {
            return Err(SdsError::invalid_argument(format!(
                "Invalid sub position {sub}"
            )));
        }
        Ok(Self { meta, sub })
    }

    pub fn meta(&self) -> u32 {
        self.meta
    }

    pub fn sub(&self) -> i32 {
        self.sub
    }

    /// Returns `true` if this position has no sub index.
    pub fn is_simple(&self) -> bool {
        self.sub == Self::NO_SUB
    }

    /// Parse `"meta"` or `"meta.sub"`.
    pub fn parse(s: &str) -> Result<Self, SdsError> {
        let invalid = || SdsError::invalid_argument(format!("Invalid position {s}"));
        let (meta, sub) = match s.split_once('.') {
            Some((meta, sub)) => (meta, Some(sub)),
            None => (s, None),
        };
        let meta = parse_digits(meta).ok_or_else(invalid)?;
        let meta = u32::try_from(meta).map_err(|_| invalid())?;
        match sub {
            None => Ok(Self::simple(meta)),
            Some(sub) => {
                let sub = parse_digits(sub).ok_or_else(invalid)?;
                let sub = i32::try_from(sub).map_err(|_| invalid())?;
                Self::composed(meta, sub)
            }
        }
    }
}

/// Parse a non-empty run of ASCII digits.
fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for Position {
    type Err = SdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Position {
    type Error = SdsError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Position> for String {
    fn from(pos: Position) -> Self {
        pos.to_string()
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({self})")
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_simple() {
            write!(f, "{}", self.meta)
        } else {
            write!(f, "{}.{}", self.meta, self.sub)
        }
    }
}
