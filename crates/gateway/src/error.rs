use {
    agentgate_auth::AuthError,
    agentgate_threads::ThreadError,
    agentgate_upstream::UpstreamError,
    axum::{
        Json,
        http::{StatusCode, header},
        response::{IntoResponse, Response},
    },
    serde_json::json,
    tracing::{error, warn},
};

/// Every failure a route can surface, mapped to one HTTP status.
///
/// Bodies have the shape `{"detail": <message>, "error": <diagnostic>}`, with
/// `error` present only for upstream failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Unauthorized(AuthError),
    #[error("you do not have access to this thread")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("invalid request body: {0}")]
    BadRequest(String),
    #[error("{detail}")]
    BadGateway {
        detail: &'static str,
        #[source]
        source: UpstreamError,
    },
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::AccountLookup(source) => Self::Internal(source),
            other => Self::Unauthorized(other),
        }
    }
}

impl From<ThreadError> for GatewayError {
    fn from(e: ThreadError) -> Self {
        match e {
            ThreadError::Forbidden => Self::Forbidden,
            ThreadError::NotFound => Self::NotFound,
            other @ ThreadError::Duplicate(_) => Self::Internal(other.into()),
            ThreadError::Database(e) => Self::Internal(e.into()),
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(source: UpstreamError) -> Self {
        Self::BadGateway {
            detail: "upstream service request failed",
            source,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Unauthorized(e) => (
                status,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(json!({ "detail": e.to_string() })),
            )
                .into_response(),
            Self::BadGateway { detail, source } => {
                warn!(error = %source, "{detail}");
                (
                    status,
                    Json(json!({ "detail": detail, "error": source.to_string() })),
                )
                    .into_response()
            },
            Self::Internal(e) => {
                error!(error = %e, "request failed");
                (status, Json(json!({ "detail": "internal error" }))).into_response()
            },
            other => (status, Json(json!({ "detail": other.to_string() }))).into_response(),
        }
    }
}
