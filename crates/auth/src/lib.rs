//! Bearer credential verification.
//!
//! A request carries `Authorization: Bearer <jwt>`. The token is an HS256 JWT
//! whose `user_id` claim names an account in the external account store. The
//! resolved [`Principal`] always reflects current account state; nothing but
//! the identity is taken from the token.

pub mod accounts;
pub mod token;
pub mod validator;

pub use {
    accounts::{AccountStore, Principal, SqliteAccountStore},
    token::{Claims, TokenSigner},
    validator::{AuthError, CredentialValidator, parse_bearer},
};
