//! # Coupon Domain Value Objects
//!
//! Strongly-typed identifiers and the validated coupon code type.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// TYPED IDENTIFIERS
// =============================================================================

/// Strongly-typed CouponBook ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub Uuid);

impl BookId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BookId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<BookId> for Uuid {
    fn from(id: BookId) -> Self {
        id.0
    }
}

// =============================================================================
// VALUE OBJECTS
// =============================================================================

/// A validated coupon code: uppercase, 6-32 chars, alphabet A-Z0-9 and `-_`.
///
/// Codes are normalized to uppercase on construction; callers never need
/// to trust client-supplied casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponCode(String);

/// A code failed the grammar or length bound documented on [`CouponCode`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid coupon code: {0}")]
pub struct InvalidCouponCode(pub String);

impl CouponCode {
    pub fn parse(raw: &str) -> Result<Self, InvalidCouponCode> {
        let upper = raw.trim().to_ascii_uppercase();
        if upper.len() < 6 || upper.len() > 32 {
            return Err(InvalidCouponCode(raw.to_string()));
        }
        if !upper
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(InvalidCouponCode(raw.to_string()));
        }
        Ok(Self(upper))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CouponCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case() {
        let code = CouponCode::parse("summer2024").unwrap();
        assert_eq!(code.as_str(), "SUMMER2024");
    }

    #[test]
    fn parse_rejects_short_codes() {
        assert!(CouponCode::parse("AB1").is_err());
    }

    #[test]
    fn parse_rejects_long_codes() {
        assert!(CouponCode::parse(&"A".repeat(33)).is_err());
    }

    #[test]
    fn parse_rejects_disallowed_characters() {
        assert!(CouponCode::parse("HAS SPACE!").is_err());
    }

    #[test]
    fn parse_accepts_hyphen_and_underscore() {
        assert!(CouponCode::parse("WELCOME-10_X").is_ok());
    }
}
