#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream returned a non-JSON body: {0}")]
    InvalidBody(String),
    #[error("upstream response carried no thread identifier")]
    MissingThreadId,
}

impl UpstreamError {
    pub(crate) fn transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Unavailable(format!("timed out: {e}"))
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}
