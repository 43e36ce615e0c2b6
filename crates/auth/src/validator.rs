use std::sync::Arc;

use tracing::debug;

use crate::{
    accounts::{AccountStore, Principal},
    token::TokenSigner,
};

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("expected an `Authorization: Bearer <token>` header")]
    InvalidFormat,
    #[error("token has expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("principal not found")]
    PrincipalNotFound,
    #[error("account lookup failed: {0}")]
    AccountLookup(#[source] anyhow::Error),
}

/// Verifies bearer credentials and resolves them to a live [`Principal`].
pub struct CredentialValidator {
    signer: Arc<TokenSigner>,
    accounts: Arc<dyn AccountStore>,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Split `"Bearer <token>"` into the token. The scheme is case-insensitive
/// and the header must hold exactly two whitespace-separated parts.
pub fn parse_bearer(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::InvalidFormat),
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

impl CredentialValidator {
    pub fn new(signer: Arc<TokenSigner>, accounts: Arc<dyn AccountStore>) -> Self {
        Self { signer, accounts }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Validate an `Authorization` header value. Has no side effects.
    pub async fn validate(&self, header: &str) -> Result<Principal, AuthError> {
        let token = parse_bearer(header)?;
        let claims = self.signer.verify(token)?;
        let principal = self
            .accounts
            .find(claims.user_id)
            .await
            .map_err(AuthError::AccountLookup)?
            .ok_or(AuthError::PrincipalNotFound)?;
        debug!(principal_id = principal.id, "credential accepted");
        Ok(principal)
    }
}
