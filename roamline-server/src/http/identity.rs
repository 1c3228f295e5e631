//! Caller identity resolution
//!
//! Authentication happens upstream. The gateway forwards the verified principal
//! in a trusted header; this module only turns that header into an [`Identity`].

use std::collections::BTreeMap;
use std::str::FromStr;

use axum::http::header::InvalidHeaderName;
use axum::http::{HeaderMap, HeaderName};
use serde_json::Value;

use super::error::ApiError;
use crate::session::Identity;

/// Resolves the caller of a request. `Ok(None)` means anonymous.
pub trait IdentityResolver: Send + Sync + 'static {
    fn resolve(&self, headers: &HeaderMap) -> Result<Option<Identity>, ApiError>;
}

/// Reads the principal (and optional JSON claims) from gateway headers.
#[derive(Debug, Clone)]
pub struct TrustedHeaderResolver {
    user_header: HeaderName,
    claims_header: HeaderName,
}

impl TrustedHeaderResolver {
    pub fn new(user_header: &str, claims_header: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            user_header: HeaderName::from_str(user_header)?,
            claims_header: HeaderName::from_str(claims_header)?,
        })
    }

    pub fn from_names(user_header: HeaderName, claims_header: HeaderName) -> Self {
        Self {
            user_header,
            claims_header,
        }
    }
}

impl IdentityResolver for TrustedHeaderResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<Option<Identity>, ApiError> {
        let Some(raw) = headers.get(&self.user_header) else {
            return Ok(None);
        };

        let principal = raw.to_str().map_err(|_| ApiError::Unauthorized {
            reason: "malformed identity header",
        })?;
        let identity = Identity::new(principal).map_err(|_| ApiError::Unauthorized {
            reason: "malformed identity header",
        })?;

        let Some(raw_claims) = headers.get(&self.claims_header) else {
            return Ok(Some(identity));
        };

        let claims = raw_claims
            .to_str()
            .ok()
            .and_then(|s| serde_json::from_str::<BTreeMap<String, Value>>(s).ok())
            .ok_or(ApiError::Unauthorized {
                reason: "claims header must be a JSON object",
            })?;

        Ok(Some(identity.with_claims(claims)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver() -> TrustedHeaderResolver {
        TrustedHeaderResolver::new("x-roamline-user", "x-roamline-claims").unwrap()
    }

    #[test]
    fn missing_header_is_anonymous() {
        let identity = resolver().resolve(&HeaderMap::new()).unwrap();
        assert!(identity.is_none());
    }

    #[test]
    fn reads_principal_and_claims() {
        let mut headers = HeaderMap::new();
        headers.insert("x-roamline-user", HeaderValue::from_static("user_2abc"));
        headers.insert(
            "x-roamline-claims",
            HeaderValue::from_static(r#"{"email":"a@example.com"}"#),
        );

        let identity = resolver().resolve(&headers).unwrap().unwrap();
        assert_eq!(identity.principal(), "user_2abc");
        assert_eq!(identity.claims()["email"], "a@example.com");
    }

    #[test]
    fn blank_principal_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-roamline-user", HeaderValue::from_static("   "));
        let err = resolver().resolve(&headers).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
    }

    #[test]
    fn non_object_claims_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-roamline-user", HeaderValue::from_static("u1"));
        headers.insert("x-roamline-claims", HeaderValue::from_static("[1,2]"));
        assert!(resolver().resolve(&headers).is_err());
    }

    #[test]
    fn invalid_header_name() {
        assert!(TrustedHeaderResolver::new("bad header", "x-c").is_err());
    }
}
