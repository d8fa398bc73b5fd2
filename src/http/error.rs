use thiserror::Error;

/// 请求错误的分类，决定重试与上报行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network-level failure, safe to retry
    Transient,
    /// Payload failed conversion, retrying would fail the same way
    Malformed,
    /// Server-signaled logical error inside a success response
    Application,
    /// Caller cancelled, delivery is suppressed instead of reported
    Cancelled,
    /// Contract violation, surfaced immediately and never retried
    Fatal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct HttpError {
    pub kind: ErrorKind,
    pub message: String,
}

impl HttpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Malformed, message)
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Application, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancelled by caller")
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Default retryability; a RetryPolicy predicate may widen this to
    /// Application errors but never to the other kinds.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }

    /// Kinds that no policy is allowed to retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Malformed | ErrorKind::Cancelled | ErrorKind::Fatal
        )
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        // Builder misuse is a programming error, everything the network
        // can cause is worth another attempt.
        if err.is_builder() {
            Self::fatal(err.to_string())
        } else {
            Self::transient(err.to_string())
        }
    }
}

/// Terminal result of one request attempt sequence.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Failure(HttpError),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&HttpError> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(err) => Some(err),
        }
    }
}

impl<T> From<Result<T, HttpError>> for Outcome<T> {
    fn from(result: Result<T, HttpError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        }
    }
}
