//! Lua Error Types
//!
//! Every fallible operation of the embedding interface returns a
//! [`LuaResult`]. An `Err` flowing out of a native function is how the
//! interface models Lua's non-local abort: it unwinds through every native
//! frame until the nearest protected call (or the outermost call boundary)
//! turns it back into an ordinary value.

use super::value::Value;

/// Result type for Lua operations
pub type LuaResult<T> = Result<T, LuaError>;

/// Error raised by script code or by `throw_error`/`raise`.
///
/// Carries the error value that a protected call leaves on the stack,
/// together with its printable message.
#[derive(Debug, Clone, PartialEq)]
pub struct RaisedError {
    /// The error value (usually a string)
    pub value: Value,

    /// Human-readable form of `value`
    pub message: String,
}

/// Errors that can occur while driving the VM
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LuaError {
    /// More values were requested than the current frame holds
    #[error("stack underflow: requested {requested} values, {available} available")]
    StackUnderflow { requested: usize, available: usize },

    /// The value stack or the call depth exceeded its configured limit
    #[error("stack overflow (limit {limit})")]
    StackOverflow { limit: usize },

    /// A heap handle whose object has been collected
    #[error("stale heap handle")]
    StaleHandle,

    /// A stack index that does not address a usable slot
    #[error("invalid stack index {0}")]
    InvalidIndex(i32),

    /// A checked getter or `check_type` saw the wrong type
    #[error("bad argument #{arg} ({expected} expected, got {got})")]
    ArgumentTypeMismatch { arg: i32, expected: String, got: String },

    /// Raised by `arg_error`
    #[error("bad argument #{arg} ({message})")]
    BadArgument { arg: i32, message: String },

    /// A reference id that was freed or never created
    #[error("invalid reference {0}")]
    InvalidReference(i32),

    /// A type id that no metatable was registered for
    #[error("unregistered type id {0}")]
    UnregisteredType(u8),

    /// Every user type id has been handed out
    #[error("no user type ids left")]
    TypeIdsExhausted,

    /// A native function reported more results than it pushed
    #[error("native function returned {returned} results but only {available} are on the stack")]
    InvalidResultCount { returned: i32, available: usize },

    /// Error raised during script execution
    #[error("{}", .0.message)]
    Runtime(RaisedError),

    /// An error that escaped the outermost call boundary
    #[error("unprotected error in call: {message}")]
    UnprotectedAbort { message: String },
}

impl LuaError {
    /// Whether this error is an abort raised through the error channel
    /// (`throw_error`, `check_type`, `arg_error`, checked getters, script
    /// failures) rather than a local misuse of the accessor API.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            LuaError::ArgumentTypeMismatch { .. }
                | LuaError::BadArgument { .. }
                | LuaError::Runtime(_)
                | LuaError::UnprotectedAbort { .. }
        )
    }

    /// The message a protected call or the outer boundary reports
    pub fn message(&self) -> String {
        match self {
            LuaError::Runtime(raised) => raised.message.clone(),
            other => other.to_string(),
        }
    }
}

/// Outcome of a protected call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStatus {
    /// The call completed normally
    Ok,

    /// The callee raised an error
    RuntimeError,

    /// The message handler itself failed
    HandlerError,
}

impl CallStatus {
    /// Numeric status code (0 on success)
    pub fn code(&self) -> i32 {
        match self {
            CallStatus::Ok => 0,
            CallStatus::RuntimeError => 2,
            CallStatus::HandlerError => 5,
        }
    }

    /// Check if the call succeeded
    pub fn is_ok(&self) -> bool {
        matches!(self, CallStatus::Ok)
    }
}
