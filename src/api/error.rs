use reqwest::StatusCode;

#[derive(Debug)]
pub enum ApiError {
    InvalidBaseUrl(String),
    Http(reqwest::Error),
    Timeout,
    Status { status: StatusCode, detail: String },
    Decode(serde_json::Error),
}

impl ApiError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Http(err)
        }
    }

    /// Polls swallow every error and retry on the next tick; this only distinguishes what is
    /// worth a warning from what is expected while the backend restarts.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Timeout | ApiError::Http(_) => true,
            ApiError::Status { status, .. } => status.is_server_error(),
            ApiError::InvalidBaseUrl(_) | ApiError::Decode(_) => false,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::InvalidBaseUrl(url) => write!(f, "invalid api base url: {url}"),
            ApiError::Http(err) => write!(f, "http error: {err}"),
            ApiError::Timeout => write!(f, "request timed out"),
            ApiError::Status { status, detail } => write!(f, "api error {status}: {detail}"),
            ApiError::Decode(err) => write!(f, "decode error: {err}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Http(err) => Some(err),
            ApiError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        let five = ApiError::Status { status: StatusCode::BAD_GATEWAY, detail: "down".into() };
        let four = ApiError::Status { status: StatusCode::BAD_REQUEST, detail: "no".into() };
        assert!(five.is_retryable());
        assert!(!four.is_retryable());
        assert!(ApiError::Timeout.is_retryable());
        assert_eq!(four.to_string(), "api error 400 Bad Request: no");
    }
}
