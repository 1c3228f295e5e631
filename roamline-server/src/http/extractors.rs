//! Custom Axum extractors

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::ApiError;
use super::state::AppState;
use crate::models::ValidationError;
use crate::session::{ConnectionSource, Identity, RequestSession, SessionHandle};

/// The request's database session plus its (possibly absent) caller.
///
/// Nothing touches the database until [`acquire`](Self::acquire); requests that
/// never call it never take a pooled connection.
pub struct RequestDb<P: ConnectionSource = PgPool> {
    session: Arc<RequestSession<P>>,
    identity: Option<Identity>,
}

impl<P: ConnectionSource> RequestDb<P> {
    /// The session-bound connection, inside the request transaction.
    pub async fn acquire(&self) -> Result<SessionHandle<'_, P::Connection>, ApiError> {
        Ok(self.session.acquire(self.identity.as_ref()).await?)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

impl<P: ConnectionSource> FromRequestParts<AppState<P>> for RequestDb<P> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<P>,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Arc<RequestSession<P>>>()
            .cloned()
            .ok_or_else(|| ApiError::Internal {
                message: "request session missing; release_guarantee layer not installed".into(),
            })?;
        let identity = state.resolver.resolve(&parts.headers)?;

        Ok(Self { session, identity })
    }
}

/// Rejects anonymous callers with 401.
pub struct RequireIdentity(pub Identity);

impl<P: ConnectionSource> FromRequestParts<AppState<P>> for RequireIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<P>,
    ) -> Result<Self, Self::Rejection> {
        state
            .resolver
            .resolve(&parts.headers)?
            .map(Self)
            .ok_or(ApiError::Unauthorized {
                reason: "authentication required",
            })
    }
}

/// Extract and validate a UUID from path
pub struct ValidUuid(pub Uuid);

impl<S> FromRequestParts<S> for ValidUuid
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "id" }))?;

        let uuid = Uuid::parse_str(&id).map_err(|_| {
            ApiError::Validation(ValidationError::InvalidFormat {
                field: "id",
                reason: "invalid UUID format",
            })
        })?;

        Ok(Self(uuid))
    }
}

/// Extract an integer id from path
pub struct ValidId(pub i32);

impl<S> FromRequestParts<S> for ValidId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Validation(ValidationError::Empty { field: "id" }))?;

        let id = id.parse::<i32>().ok().filter(|id| *id > 0).ok_or(
            ApiError::Validation(ValidationError::InvalidFormat {
                field: "id",
                reason: "expected a positive integer",
            }),
        )?;

        Ok(Self(id))
    }
}
