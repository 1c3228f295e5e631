//! SQL identifier validation
//!
//! Table, column and policy names are interpolated into harness probes, so only
//! plain lowercase identifiers are accepted.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ValidationError;

/// Postgres truncates identifiers beyond 63 bytes
const MAX_IDENT_LEN: usize = 63;

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("invalid identifier regex"));

/// Validated, unquoted SQL identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlIdent(String);

impl SqlIdent {
    /// # Example
    /// ```
    /// use roamline_server::models::SqlIdent;
    ///
    /// assert!(SqlIdent::new("table", "travel_detail").is_ok());
    /// assert!(SqlIdent::new("table", "trip; DROP TABLE trip").is_err());
    /// ```
    pub fn new(field: &'static str, s: &str) -> Result<Self, ValidationError> {
        if s.is_empty() {
            return Err(ValidationError::Empty { field });
        }

        if s.len() > MAX_IDENT_LEN {
            return Err(ValidationError::TooLong {
                field,
                max: MAX_IDENT_LEN,
            });
        }

        if !IDENT_RE.is_match(s) {
            return Err(ValidationError::InvalidFormat {
                field,
                reason: "must be a lowercase SQL identifier",
            });
        }

        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
