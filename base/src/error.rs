use thiserror::Error;

#[derive(Debug, Error)]
pub enum HfMcpError {
    #[error("InvalidParameter({0})")]
    InvalidParameter(String),
    #[error("ParseError({0})")]
    ParseError(String),
    #[error("NotFound({0})")]
    NotFound(String),
    #[error("Unauthorized({0})")]
    Unauthorized(String),
    #[error("TimeoutError({0})")]
    TimeoutError(String),
    #[error("CancelledError({0})")]
    CancelledError(String),
    #[error("UpstreamError({0})")]
    UpstreamError(String),
    #[error("ReqwestError({0:?})")]
    ReqwestError(reqwest::Error),
    #[error("serde_json error({0:?})")]
    SerdeJsonError(serde_json::error::Error),
    #[error("RuntimeError({0})")]
    RuntimeError(String),
    #[error("OtherError({0})")]
    OtherError(String),
}

impl HfMcpError {
    /// Returns true when the error is the caller's fault (maps to a 4xx at the
    /// transport boundary). Everything else is counted as a server failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            HfMcpError::InvalidParameter(_)
                | HfMcpError::ParseError(_)
                | HfMcpError::NotFound(_)
                | HfMcpError::Unauthorized(_)
        )
    }

    /// Cancellation is neither a client nor an upstream failure; metrics must
    /// not count it as one.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HfMcpError::CancelledError(_))
    }
}

impl From<reqwest::Error> for HfMcpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HfMcpError::TimeoutError(e.to_string())
        } else {
            HfMcpError::ReqwestError(e)
        }
    }
}

impl From<serde_json::Error> for HfMcpError {
    fn from(e: serde_json::Error) -> Self {
        HfMcpError::SerdeJsonError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_client_error() {
        assert!(HfMcpError::InvalidParameter("x".to_string()).is_client_error());
        assert!(HfMcpError::ParseError("x".to_string()).is_client_error());
        assert!(HfMcpError::NotFound("x".to_string()).is_client_error());
        assert!(HfMcpError::Unauthorized("x".to_string()).is_client_error());

        assert!(!HfMcpError::RuntimeError("x".to_string()).is_client_error());
        assert!(!HfMcpError::TimeoutError("x".to_string()).is_client_error());
        assert!(!HfMcpError::UpstreamError("x".to_string()).is_client_error());
    }

    #[test]
    fn test_cancellation_is_not_a_failure_class() {
        let e = HfMcpError::CancelledError("caller went away".to_string());
        assert!(e.is_cancellation());
        assert!(!e.is_client_error());
    }
}
