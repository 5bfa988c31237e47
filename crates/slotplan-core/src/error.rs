use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured compiler error with a stable internal classification.
/// Every fatal precondition violation during lowering surfaces as one of
/// these; nothing in the compiler panics on malformed input.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a planner-origin invariant violation.
    pub(crate) fn planner_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Planner, message)
    }

    /// Construct a group-origin invariant violation.
    pub(crate) fn group_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Group, message)
    }

    /// Construct an accumulator-origin invariant violation.
    pub(crate) fn accumulator_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Accumulator,
            message,
        )
    }

    /// Construct an expression-origin invariant violation.
    pub(crate) fn expression_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Expression,
            message,
        )
    }

    /// Construct a stage-origin invariant violation.
    pub(crate) fn stage_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Stage, message)
    }

    /// Construct an expression-origin unsupported error.
    pub(crate) fn expression_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Expression, message)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    InvariantViolation,
    Unsupported,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvariantViolation => "invariant_violation",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Planner,
    Group,
    Accumulator,
    Expression,
    Stage,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Planner => "planner",
            Self::Group => "group",
            Self::Accumulator => "accumulator",
            Self::Expression => "expression",
            Self::Stage => "stage",
        };
        write!(f, "{label}")
    }
}

///
/// RequestError
///
/// User-visible rejection of a request the group stage cannot honor.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum RequestError {
    #[error(
        "group stage cannot propagate a record id slot, but the record id was requested by the parent"
    )]
    RecordIdThroughGroup,
}

impl RequestError {
    /// Stable numeric code reported alongside the message.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::RecordIdThroughGroup => 6_360_401,
        }
    }
}

///
/// CompileError
///

#[derive(Debug, ThisError)]
pub enum CompileError {
    #[error("{0}")]
    Internal(#[from] InternalError),

    #[error("{0}")]
    Rejected(#[from] RequestError),
}

impl CompileError {
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    #[must_use]
    pub const fn as_internal(&self) -> Option<&InternalError> {
        match self {
            Self::Internal(err) => Some(err),
            Self::Rejected(_) => None,
        }
    }
}
