use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::StoreError,
    repository::RepositoryState,
};

/// Claims
///
/// Payload expected inside the bearer JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's UUID, key of the `profiles` table.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// Capabilities
///
/// Category capabilities held by a principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// May manage categories: search on `idnumber`/`theme`, see administrative fields.
    pub manage: bool,
    /// May see categories whose `visible` flag is off, and search on `visible`.
    pub view_hidden: bool,
}

impl Capabilities {
    pub fn for_role(role: &str) -> Self {
        match role {
            "admin" | "manager" => Capabilities {
                manage: true,
                view_hidden: true,
            },
            "auditor" => Capabilities {
                manage: false,
                view_hidden: true,
            },
            _ => Capabilities::default(),
        }
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request. It is the principal every
/// visibility decision is made for.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_role(&self.role)
    }
}

/// A store that cannot answer is a server failure, not an unauthenticated caller.
fn lookup_failed(e: StoreError) -> StatusCode {
    tracing::error!("user lookup failed: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// AuthUser extractor
///
/// 1. Local bypass: in `Env::Local` an `x-user-id` header naming a known user is accepted.
/// 2. Otherwise a `Bearer` JWT signed with the configured secret is required.
/// 3. The user must still exist in the store; its current role is loaded from there.
///
/// Rejection: `StatusCode::INTERNAL_SERVER_ERROR` when the user lookup fails,
/// `StatusCode::UNAUTHORIZED` on any other failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await.map_err(lookup_failed)? {
                    return Ok(AuthUser {
                        id: user.id,
                        role: user.role,
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!("rejected bearer token: {:?}", e.kind());
            StatusCode::UNAUTHORIZED
        })?;

        // A valid token for a deleted user is still rejected.
        let user = repo
            .get_user(token_data.claims.sub)
            .await
            .map_err(lookup_failed)?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(AuthUser {
            id: user.id,
            role: user.role,
        })
    }
}
