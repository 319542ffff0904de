//! Shared domain primitives: money, identifiers, and timestamps.
//!
//! All monetary values in this crate are signed 64-bit integer cents —
//! never floating point (§3 of the specification). Timestamps are rendered
//! as ISO-8601 strings wherever they cross a persistence or display
//! boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A monetary amount in integer cents. Never floating point.
pub type Cents = i64;

/// Unique identifier for one optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new random run id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Render the current wall-clock time as an ISO-8601 string.
///
/// Isolated in one place so that replay comparisons (§4.8) know exactly
/// which field to mask: any field produced by this function is
/// non-deterministic and excluded from replay-identity diffs.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrips_through_string() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }
}
