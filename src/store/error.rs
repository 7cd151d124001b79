use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreErrorCode {
    InvalidArgument,
    Validation,
    NotFound,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Internal,
}

impl StoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorCode::InvalidArgument => "store/invalid-argument",
            StoreErrorCode::Validation => "store/validation",
            StoreErrorCode::NotFound => "store/not-found",
            StoreErrorCode::Unavailable => "store/unavailable",
            StoreErrorCode::DeadlineExceeded => "store/deadline-exceeded",
            StoreErrorCode::ResourceExhausted => "store/resource-exhausted",
            StoreErrorCode::Internal => "store/internal",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoreError {
    pub code: StoreErrorCode,
    message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Network-class failure: the store could not be reached or did not answer in time.
    /// These are the only errors worth retrying.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.code,
            StoreErrorCode::Unavailable | StoreErrorCode::DeadlineExceeded
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.code == StoreErrorCode::NotFound
    }

    pub fn is_validation(&self) -> bool {
        self.code == StoreErrorCode::Validation
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

pub fn invalid_argument(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::InvalidArgument, message)
}

pub fn validation(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Validation, message)
}

pub fn not_found(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::NotFound, message)
}

pub fn unavailable(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Unavailable, message)
}

pub fn deadline_exceeded(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::DeadlineExceeded, message)
}

pub fn resource_exhausted(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::ResourceExhausted, message)
}

pub fn internal_error(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Internal, message)
}
