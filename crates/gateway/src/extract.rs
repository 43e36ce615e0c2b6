use {
    agentgate_auth::{AuthError, Principal},
    axum::{
        Json,
        extract::{FromRequest, FromRequestParts, Request, rejection::JsonRejection},
        http::{header, request::Parts},
    },
};

use crate::{error::GatewayError, server::AppState};

/// The principal behind the request's bearer credential.
///
/// A missing or non-ASCII `Authorization` header fails the same way as a
/// malformed one.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::InvalidFormat)?;
        let principal = state.gateway.validator.validate(header).await?;
        Ok(Self(principal))
    }
}

/// `Json<T>` whose rejections are reported as bad requests.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}
