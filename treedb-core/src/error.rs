use std::fmt::{Display, Formatter};

use crate::{
    rbtree,
    store::{file, log},
};

/// A `Result` type that all API calls in TreeDB will return.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible error cases that can be return by API calls in TreeDB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// An error occured in the backing node store.
    IO,
    /// The operation is not valid for the receiver (e.g., removing through an invalid cursor).
    InvalidOperation,
    /// The tree structure is broken, a referenced node is missing or an invariant does not hold.
    InvariantViolation,
    /// The log file is not in the expected format.
    FileUnexpected,
}

#[derive(Debug)]
pub struct Error {
    code: ErrorCode,
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl Display for ErrorCode {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::IO => "store error",
            Self::InvalidOperation => "invalid operation",
            Self::InvariantViolation => "tree invariant violated",
            Self::FileUnexpected => "unexpected log file",
        })
    }
}

impl Error {
    /// Wraps an error raised by a [`NodeStore`](crate::NodeStore) implementation.
    #[inline]
    pub fn store(source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self {
            code: ErrorCode::IO,
            source: source.into(),
        }
    }

    #[inline]
    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl Display for Error {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.source)
    }
}

impl std::error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<file::Error> for Error {
    #[inline]
    fn from(value: file::Error) -> Self {
        Self {
            code: ErrorCode::IO,
            source: Box::new(value),
        }
    }
}

impl From<rbtree::InvalidOperation> for Error {
    #[inline]
    fn from(value: rbtree::InvalidOperation) -> Self {
        Self {
            code: ErrorCode::InvalidOperation,
            source: Box::new(value),
        }
    }
}

impl From<rbtree::InvariantViolation> for Error {
    #[inline]
    fn from(value: rbtree::InvariantViolation) -> Self {
        Self {
            code: ErrorCode::InvariantViolation,
            source: Box::new(value),
        }
    }
}

impl From<log::ValidationError> for Error {
    #[inline]
    fn from(value: log::ValidationError) -> Self {
        Self {
            code: ErrorCode::FileUnexpected,
            source: Box::new(value),
        }
    }
}
