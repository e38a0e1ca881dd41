use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier shared by every stored record (users, orders, offers, chat messages).
///
/// Wraps a v4 UUID. Anything arriving from outside (path segments, query
/// strings, JWT subjects, request bodies) goes through [`RecordId::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid identifier '{0}'")]
pub struct IdParseError(pub String);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, IdParseError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| IdParseError(raw.to_string()))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for RecordId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
