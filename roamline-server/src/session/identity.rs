//! Caller identity and the security context derived from it
//!
//! The identity is resolved upstream (gateway-verified token) and only consumed here.
//! Row-security policies read the context through `auth.user_id()`, which maps to
//! the transaction-local setting [`USER_ID_SETTING`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::ValidationError;

/// Setting read by `auth.user_id()` inside row-security policies.
pub const USER_ID_SETTING: &str = "app.user_id";

/// Full claim set as JSON (`sub` plus any extra claims). Informational for policies.
pub const CLAIMS_SETTING: &str = "app.claims";

/// Every key a security context writes. Cleared again before a connection returns to the pool.
pub const CONTEXT_KEYS: [&str; 2] = [USER_ID_SETTING, CLAIMS_SETTING];

/// Maximum length for a principal id
const MAX_PRINCIPAL_LEN: usize = 255;

/// Authenticated principal for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    principal: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    claims: BTreeMap<String, Value>,
}

impl Identity {
    /// Create an identity for a principal id.
    ///
    /// Rejects empty ids: the empty string is reserved for the anonymous context.
    pub fn new(principal: impl Into<String>) -> Result<Self, ValidationError> {
        let principal = principal.into();

        if principal.trim().is_empty() {
            return Err(ValidationError::Empty { field: "principal" });
        }
        if principal.len() > MAX_PRINCIPAL_LEN {
            return Err(ValidationError::TooLong {
                field: "principal",
                max: MAX_PRINCIPAL_LEN,
            });
        }
        if principal.contains('\0') {
            return Err(ValidationError::InvalidFormat {
                field: "principal",
                reason: "must not contain NUL bytes",
            });
        }

        Ok(Self {
            principal,
            claims: BTreeMap::new(),
        })
    }

    /// Attach verified claims. A `sub` claim is ignored in favour of the principal.
    pub fn with_claims(mut self, claims: BTreeMap<String, Value>) -> Self {
        self.claims = claims;
        self
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn claims(&self) -> &BTreeMap<String, Value> {
        &self.claims
    }
}

/// Transaction-local settings applied to a freshly bound connection.
///
/// Always carries a value for every key in [`CONTEXT_KEYS`]; the anonymous context
/// writes empty strings so a previous borrower's values can never survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    principal: Option<String>,
    settings: Vec<(&'static str, String)>,
}

impl SecurityContext {
    pub fn anonymous() -> Self {
        Self {
            principal: None,
            settings: CONTEXT_KEYS.iter().map(|k| (*k, String::new())).collect(),
        }
    }

    pub fn for_identity(identity: Option<&Identity>) -> Self {
        let Some(identity) = identity else {
            return Self::anonymous();
        };

        let mut claims: Map<String, Value> = identity
            .claims
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        claims.insert("sub".to_string(), Value::String(identity.principal.clone()));

        Self {
            principal: Some(identity.principal.clone()),
            settings: vec![
                (USER_ID_SETTING, identity.principal.clone()),
                (CLAIMS_SETTING, Value::Object(claims).to_string()),
            ],
        }
    }

    /// Settings in application order.
    pub fn settings(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.settings.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Principal this context impersonates, `None` when anonymous.
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_none()
    }
}
