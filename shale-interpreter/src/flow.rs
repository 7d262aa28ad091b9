use crate::error::RuntimeError;
use crate::value::Value;

/// The stop flag threaded up through statement execution.
///
/// A statement finishes with `Go`, or raises one of the unwinding flags; each
/// enclosing construct either absorbs the flag (loops absorb `Break` and
/// `Continue`, calls absorb `Return`, `try` absorbs `Throw`) or forwards it.
#[derive(Debug)]
pub enum Flow {
    /// Normal completion; execution continues with the next statement.
    Go,
    /// Unwind to the innermost loop and start its next iteration.
    Continue,
    /// Unwind to the innermost loop or switch and leave it.
    Break,
    /// Unwind to the innermost call frame with the returned value.
    Return(Value),
    /// Unwind to the innermost `try`, or to the interpreter entry point.
    Throw(RuntimeError),
}

impl From<RuntimeError> for Flow {
    fn from(err: RuntimeError) -> Self {
        Self::Throw(err)
    }
}

/// Unwrap an expression result inside a statement executor, turning an error
/// into a `Throw` flow.
#[macro_export]
macro_rules! eval {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => return $crate::flow::Flow::Throw(err),
        }
    };
}
