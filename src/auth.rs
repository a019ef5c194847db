use axum::{
    async_trait,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

const BEARER_PREFIX: &str = "Bearer ";

/// Subject of a token that passed verification. Inserted into the request
/// extensions by [`require_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("unreadable token header: {0}")]
    Header(#[source] jsonwebtoken::errors::Error),
    #[error("token has no key id")]
    MissingKeyId,
    #[error("no signing key with id {0}")]
    UnknownKeyId(String),
    #[error("token rejected: {0}")]
    Rejected(#[source] jsonwebtoken::errors::Error),
    #[error("token has no subject")]
    MissingSubject,
    #[error("token subject is longer than 128 characters")]
    SubjectTooLong,
    #[error("token issued in the future")]
    IssuedInFuture,
    #[error("verifier unavailable")]
    Unavailable,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerifyError>;
}

#[derive(Debug)]
pub enum AuthError {
    MissingCredentials,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!("rejecting request: {:?}", self);
        StatusCode::UNAUTHORIZED.into_response()
    }
}

/// Token part of an `Authorization` header value, if it uses the bearer
/// scheme and the token is non-empty. The scheme match is case-sensitive.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix(BEARER_PREFIX)
        .filter(|token| !token.is_empty())
}

pub async fn require_auth<B>(
    State(verifier): State<Arc<dyn TokenVerifier>>,
    mut req: Request<B>,
    next: Next<B>,
) -> Result<Response, AuthError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AuthError::MissingCredentials)?
        .to_owned();

    let identity = verifier.verify(&token).await.map_err(|e| {
        tracing::debug!("{:?}", e);
        AuthError::InvalidToken
    })?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
