//! One emission of a running step.

use crate::Error;

/// A single value emitted by a step.
///
/// A step emits zero or more `Partial` values followed by exactly one terminal
/// value (`Final` or `Error`). Nothing follows the terminal value.
#[derive(Debug)]
pub enum StepResult<T> {
    /// An incremental chunk, delivered in generation order.
    Partial(T),
    /// The terminal success value.
    Final(T),
    /// The terminal failure.
    Error(Error),
}

impl<T> StepResult<T> {
    pub fn is_partial(&self) -> bool {
        matches!(self, StepResult::Partial(_))
    }

    pub fn is_final(&self) -> bool {
        matches!(self, StepResult::Final(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StepResult::Error(_))
    }

    /// True for `Final` and `Error`.
    pub fn is_terminal(&self) -> bool {
        !self.is_partial()
    }

    /// Borrow the carried value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            StepResult::Partial(v) | StepResult::Final(v) => Some(v),
            StepResult::Error(_) => None,
        }
    }

    /// Consume into the carried value, turning `Error` into `Err`.
    pub fn into_result(self) -> crate::Result<T> {
        match self {
            StepResult::Partial(v) | StepResult::Final(v) => Ok(v),
            StepResult::Error(e) => Err(e),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StepResult<U> {
        match self {
            StepResult::Partial(v) => StepResult::Partial(f(v)),
            StepResult::Final(v) => StepResult::Final(f(v)),
            StepResult::Error(e) => StepResult::Error(e),
        }
    }
}
