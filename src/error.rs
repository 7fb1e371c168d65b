use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("popup blocked: allow popups for this site and try again")]
    PopupBlocked,
    #[error("not signed in: sign in again before linking an account")]
    Unauthenticated,
    #[error("could not start account linking: {0}")]
    InitiationFailed(String),
    #[error("could not finish account linking: {0}")]
    ExchangeFailed(String),
    #[error("popup closed without completing")]
    ClosedWithoutCompleting,
    #[error("account linking cancelled")]
    Cancelled,
    #[error("http error: {0}")]
    Http(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("unknown mail provider: {0}")]
    UnknownProvider(String),
    #[error("account not found")]
    AccountNotFound,
}

impl LinkError {
    /// Whether the user can simply try the same link again.
    ///
    /// `PopupBlocked` needs a browser setting change first and
    /// `Unauthenticated` needs a fresh session, so neither counts.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LinkError::InitiationFailed(_)
                | LinkError::ExchangeFailed(_)
                | LinkError::ClosedWithoutCompleting
                | LinkError::Cancelled
                | LinkError::Http(_)
        )
    }

    /// Abandonment by the user rather than a system fault.
    pub fn is_user_abandoned(&self) -> bool {
        matches!(
            self,
            LinkError::ClosedWithoutCompleting | LinkError::Cancelled
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            LinkError::InitiationFailed(reason) | LinkError::ExchangeFailed(reason) => {
                reason.clone()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
