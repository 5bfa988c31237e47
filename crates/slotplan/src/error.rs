use derive_more::Display;
use serde::{Deserialize, Serialize};
use slotplan_core::error::{
    CompileError, ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError, RequestError,
};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    /// Stable rejection code, present only for rejected requests.
    #[must_use]
    pub const fn code(&self) -> Option<u32> {
        match self.kind {
            ErrorKind::Rejected { code } => Some(code),
            _ => None,
        }
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match err.class {
            ErrorClass::InvariantViolation => ErrorKind::InvariantViolation,
            ErrorClass::Unsupported => ErrorKind::Unsupported,
            ErrorClass::Internal => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

impl From<RequestError> for Error {
    fn from(err: RequestError) -> Self {
        Self::new(
            ErrorKind::Rejected { code: err.code() },
            ErrorOrigin::Group,
            err.to_string(),
        )
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Internal(err) => err.into(),
            CompileError::Rejected(err) => err.into(),
        }
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// The request asks for something a group stage cannot provide.
    Rejected { code: u32 },

    /// The node or requirements broke a compiler precondition.
    InvariantViolation,

    /// Valid input that uses an unsupported construct.
    Unsupported,

    /// The caller cannot remediate this.
    Internal,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Planner,
    Group,
    Accumulator,
    Expression,
    Stage,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Planner => Self::Planner,
            CoreErrorOrigin::Group => Self::Group,
            CoreErrorOrigin::Accumulator => Self::Accumulator,
            CoreErrorOrigin::Expression => Self::Expression,
            CoreErrorOrigin::Stage => Self::Stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_keeps_code_and_message() {
        let err = Error::from(CompileError::from(RequestError::RecordIdThroughGroup));

        assert_eq!(err.kind, ErrorKind::Rejected { code: 6_360_401 });
        assert_eq!(err.origin, ErrorOrigin::Group);
        assert_eq!(err.code(), Some(6_360_401));
        assert!(err.message.contains("record id"));
    }

    #[test]
    fn internal_class_maps_to_kind() {
        let err = Error::from(InternalError::new(
            ErrorClass::Unsupported,
            CoreErrorOrigin::Expression,
            "cannot lower",
        ));

        assert_eq!(err.kind, ErrorKind::Unsupported);
        assert_eq!(err.origin, ErrorOrigin::Expression);
        assert_eq!(err.code(), None);
        assert_eq!(err.to_string(), "cannot lower");
    }

    #[test]
    fn error_serializes_with_stable_shape() {
        let err = Error::new(ErrorKind::Rejected { code: 7 }, ErrorOrigin::Planner, "nope");

        let json = serde_json::to_value(&err).expect("error should serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "kind": { "Rejected": { "code": 7 } },
                "origin": "Planner",
                "message": "nope"
            })
        );

        let back: Error = serde_json::from_value(json).expect("error should deserialize");
        assert_eq!(back, err);
    }

    #[test]
    fn origin_displays_variant_name() {
        assert_eq!(ErrorOrigin::Accumulator.to_string(), "Accumulator");
    }
}
