//! Engine status codes and the library error type

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decoder::RecognitionResult;

/// Raw 32-bit status code as returned by the engine.
pub type RawStatus = i32;

/// Status codes reported by the recognition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    NoResult = 1,
    NullPointer = 2,
    OutOfMemory = 3,
    OutOfRange = 4,
    EmptyInk = 5,
    InvalidArguments = 6,
    InvalidModel = 7,
    InvalidInstance = 8,
    ExpireDemo = 9,
    EngineBusy = 10,
    AuthorizationFail = 11,
    AlreadyExists = 12,
}

/// How a caller is expected to react to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// `Success`
    Ok,
    /// `NoResult`: an empty answer, not a failure
    Empty,
    /// Programming or configuration defect; fix before retrying
    Caller,
    /// License rejected or expired; terminal for the session
    Licensing,
    /// Call-ordering bug
    Lifecycle,
    /// Another call is in flight; retry after it completes
    Contention,
    /// The session should be closed and recreated
    Fatal,
}

impl Status {
    /// Map a raw code to a known status.
    pub fn from_code(code: RawStatus) -> Option<Self> {
        let status = match code {
            0 => Status::Success,
            1 => Status::NoResult,
            2 => Status::NullPointer,
            3 => Status::OutOfMemory,
            4 => Status::OutOfRange,
            5 => Status::EmptyInk,
            6 => Status::InvalidArguments,
            7 => Status::InvalidModel,
            8 => Status::InvalidInstance,
            9 => Status::ExpireDemo,
            10 => Status::EngineBusy,
            11 => Status::AuthorizationFail,
            12 => Status::AlreadyExists,
            _ => return None,
        };
        Some(status)
    }

    pub fn code(self) -> RawStatus {
        self as RawStatus
    }

    pub fn category(self) -> Category {
        match self {
            Status::Success => Category::Ok,
            Status::NoResult => Category::Empty,
            Status::InvalidArguments
            | Status::InvalidModel
            | Status::InvalidInstance
            | Status::OutOfRange
            | Status::EmptyInk => Category::Caller,
            Status::AuthorizationFail | Status::ExpireDemo => Category::Licensing,
            Status::AlreadyExists => Category::Lifecycle,
            Status::EngineBusy => Category::Contention,
            Status::OutOfMemory | Status::NullPointer => Category::Fatal,
        }
    }

    /// Only contention is worth retrying, and only once the in-flight call is done.
    pub fn is_retryable(self) -> bool {
        self.category() == Category::Contention
    }

    /// `Success` and `NoResult` both carry a usable (possibly empty) answer.
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Success | Status::NoResult)
    }
}

/// Errors that can occur while driving the recognition engine
#[derive(Error, Debug)]
pub enum Error {
    /// The engine (or the wrapper's own ordering checks) rejected a call
    #[error("{op} failed: {status:?}")]
    Status { op: &'static str, status: Status },

    /// Recognition ended with a failure status; `partial` holds whatever the
    /// engine left in the result tree
    #[error("Recognize failed: {status:?}")]
    Recognition { status: Status, partial: RecognitionResult },

    /// The engine returned a code outside the documented taxonomy
    #[error("{op} returned unknown status code {code}")]
    UnknownStatus { op: &'static str, code: RawStatus },

    /// Resource staging failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking recognition task panicked or was cancelled
    #[error("recognition task failed: {0}")]
    Task(String),

    /// A previous holder of the recognizer lock panicked
    #[error("recognizer lock poisoned")]
    Poisoned,
}

impl Error {
    pub(crate) fn status(op: &'static str, status: Status) -> Self {
        Error::Status { op, status }
    }

    /// Convert a non-success raw code into an error.
    pub(crate) fn from_code(op: &'static str, code: RawStatus) -> Self {
        match Status::from_code(code) {
            Some(status) => Error::Status { op, status },
            None => Error::UnknownStatus { op, code },
        }
    }

    /// The engine status behind this error, if any.
    pub fn status_code(&self) -> Option<Status> {
        match self {
            Error::Status { status, .. } | Error::Recognition { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Lines decoded before a recognition failure was reported
    pub fn partial(&self) -> Option<&RecognitionResult> {
        match self {
            Error::Recognition { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Fatal errors mean the session must be closed before anything else is tried.
    pub fn is_fatal(&self) -> bool {
        matches!(self.status_code().map(Status::category), Some(Category::Fatal))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Check a bare status return; anything but `Success` is an error.
pub(crate) fn check_status(op: &'static str, code: RawStatus) -> Result<()> {
    if code == Status::Success.code() {
        Ok(())
    } else {
        Err(Error::from_code(op, code))
    }
}

/// Check the outcome of a boundary call, naming the call in the error.
pub(crate) fn check<T>(op: &'static str, outcome: std::result::Result<T, RawStatus>) -> Result<T> {
    outcome.map_err(|code| Error::from_code(op, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 0..=12 {
            let status = Status::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(Status::from_code(13), None);
        assert_eq!(Status::from_code(-1), None);
    }

    #[test]
    fn test_categories() {
        assert_eq!(Status::NoResult.category(), Category::Empty);
        assert_eq!(Status::ExpireDemo.category(), Category::Licensing);
        assert_eq!(Status::AlreadyExists.category(), Category::Lifecycle);
        assert_eq!(Status::NullPointer.category(), Category::Fatal);
        assert!(Status::EngineBusy.is_retryable());
        assert!(!Status::InvalidModel.is_retryable());
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let err = Error::from_code("GetLineSize", 99);
        assert!(matches!(err, Error::UnknownStatus { code: 99, .. }));
        assert_eq!(err.status_code(), None);

        let err = Error::from_code("Recognize", 3);
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Recognize failed: OutOfMemory");
    }
}
