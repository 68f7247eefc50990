//! Index validation and naming.

use std::fmt;

use thiserror::Error;

use crate::CACHE_KEY_PREFIX;

/// Largest index accepted for computation (inclusive).
pub const MAX_INDEX: i64 = 40;

/// Rejected client input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Index must be non-negative")]
    Negative(i64),

    #[error("Index too high (max {MAX_INDEX})")]
    TooHigh(i64),
}

/// A validated index in `0..=MAX_INDEX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Index(u32);

impl Index {
    /// Validate a raw integer against the submission bounds.
    pub fn new(raw: i64) -> Result<Self, ValidationError> {
        if raw < 0 {
            return Err(ValidationError::Negative(raw));
        }
        if raw > MAX_INDEX {
            return Err(ValidationError::TooHigh(raw));
        }
        Ok(Self(raw as u32))
    }

    /// Parse a notification payload (decimal text, surrounding whitespace ignored).
    pub fn from_payload(payload: &str) -> Option<Result<Self, ValidationError>> {
        payload.trim().parse::<i64>().ok().map(Self::new)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Notification payload for this index.
    pub fn payload(self) -> String {
        self.0.to_string()
    }

    /// Result cache key, `values.<index>`.
    pub fn cache_key(self) -> String {
        format!("{CACHE_KEY_PREFIX}{}", self.0)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Index> for i64 {
    fn from(index: Index) -> Self {
        i64::from(index.0)
    }
}

/// Strip the cache key prefix, returning the index text (`values.7` → `7`).
///
/// Keys without the prefix yield `None`.
pub fn index_from_cache_key(key: &str) -> Option<&str> {
    key.strip_prefix(CACHE_KEY_PREFIX).filter(|rest| !rest.is_empty())
}
