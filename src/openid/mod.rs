//! Verification of identity-provider ID tokens.
//!
//! Signing keys are discovered through the issuer's OpenID configuration
//! and kept on the verifier instance. A background task can re-fetch them
//! on an interval so rotated keys are picked up without a restart.

use axum::async_trait;
use jsonwebtoken::{decode, decode_header, get_current_timestamp, Algorithm, Validation};
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;

use crate::auth::{TokenVerifier, VerifiedIdentity, VerifyError};
use crate::config::IdentityConfig;

pub mod jwks;

use jwks::Keys;

const MAX_SUBJECT_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum OpenIDError {
    #[error("cannot fetch OpenID configuration: {0}")]
    InvalidWellKnownUri(#[source] reqwest::Error),
    #[error("OpenID configuration has no usable jwks_uri: {0}")]
    MissingOpenIDConfiguration(#[source] reqwest::Error),
    #[error("cannot fetch JWK set: {0}")]
    InvalidJwksUri(#[source] reqwest::Error),
    #[error("JWK set is malformed: {0}")]
    MissingJwksSet(#[source] reqwest::Error),
    #[error("JWK set at {0} has no RSA signing keys")]
    NoUsableKeys(String),
    #[error("signing key store is poisoned")]
    InternalServerError,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: String,
    iat: Option<u64>,
    auth_time: Option<u64>,
}

impl Claims {
    /// Checks `decode` leaves out: issue and sign-in time not in the
    /// future, subject present and at most 128 characters.
    fn check(&self, leeway: u64) -> Result<(), VerifyError> {
        let latest = get_current_timestamp() + leeway;
        if self.iat.map_or(false, |iat| iat > latest) {
            return Err(VerifyError::IssuedInFuture);
        }
        if self.auth_time.map_or(false, |auth_time| auth_time > latest) {
            return Err(VerifyError::IssuedInFuture);
        }
        if self.sub.is_empty() {
            return Err(VerifyError::MissingSubject);
        }
        if self.sub.chars().count() > MAX_SUBJECT_LEN {
            return Err(VerifyError::SubjectTooLong);
        }
        Ok(())
    }
}

pub struct JwksVerifier {
    config: IdentityConfig,
    client: reqwest::Client,
    validation: Validation,
    keys: RwLock<Keys>,
}

impl JwksVerifier {
    /// Loads the signing keys once. Fails if the provider cannot be reached
    /// or publishes no usable keys.
    pub async fn connect(config: IdentityConfig) -> Result<Arc<Self>, OpenIDError> {
        let client = reqwest::Client::new();
        let keys = jwks::decoding_keys(&client, &config.discovery_uri()).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        tracing::info!("verifying tokens issued by {}", config.issuer);
        Ok(Arc::new(Self {
            config,
            client,
            validation,
            keys: RwLock::new(keys),
        }))
    }

    /// Spawns the key refresh loop. Returns `None` when refreshing is
    /// disabled. The task stops once the verifier is dropped.
    pub fn spawn_refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = self.config.refresh_interval;
        if interval.is_zero() {
            return None;
        }
        let verifier = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(verifier) = verifier.upgrade() else {
                    break;
                };
                match verifier.update_keys().await {
                    Ok(_) => tracing::debug!("jwks updated"),
                    Err(e) => tracing::error!("Jwks not updated: {}", e),
                };
            }
        }))
    }

    pub async fn update_keys(&self) -> Result<(), OpenIDError> {
        let new_keys = jwks::decoding_keys(&self.client, &self.config.discovery_uri()).await?;
        let mut keys = self
            .keys
            .write()
            .map_err(|_| OpenIDError::InternalServerError)?;
        *keys = new_keys;
        Ok(())
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerifyError> {
        let kid = decode_header(token)
            .map_err(VerifyError::Header)?
            .kid
            .ok_or(VerifyError::MissingKeyId)?;
        let token_data = {
            let keys = self.keys.read().map_err(|_| VerifyError::Unavailable)?;
            let key = keys
                .get(&kid)
                .ok_or_else(|| VerifyError::UnknownKeyId(kid.clone()))?;
            decode::<Claims>(token, key, &self.validation).map_err(VerifyError::Rejected)?
        };

        token_data.claims.check(self.validation.leeway)?;
        Ok(VerifiedIdentity {
            subject: token_data.claims.sub,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, iat: Option<u64>, auth_time: Option<u64>) -> Claims {
        Claims {
            sub: sub.to_owned(),
            iat,
            auth_time,
        }
    }

    #[test]
    fn past_issue_and_sign_in_times_pass() {
        let now = get_current_timestamp();
        assert!(claims("uid-42", Some(now - 10), Some(now - 20)).check(60).is_ok());
        assert!(claims("uid-42", None, None).check(60).is_ok());
    }

    #[test]
    fn future_issue_or_sign_in_time_fails() {
        let later = get_current_timestamp() + 600;
        assert!(matches!(
            claims("uid-42", Some(later), None).check(60),
            Err(VerifyError::IssuedInFuture)
        ));
        assert!(matches!(
            claims("uid-42", None, Some(later)).check(60),
            Err(VerifyError::IssuedInFuture)
        ));
    }

    #[test]
    fn subject_length_is_bounded() {
        assert!(claims(&"u".repeat(128), None, None).check(60).is_ok());
        assert!(matches!(
            claims(&"u".repeat(129), None, None).check(60),
            Err(VerifyError::SubjectTooLong)
        ));
        assert!(matches!(
            claims("", None, None).check(60),
            Err(VerifyError::MissingSubject)
        ));
    }
}
