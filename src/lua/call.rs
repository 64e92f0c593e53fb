//! Invocation & Error Channel
//!
//! Calls run native functions in a new frame on the shared stack. Script
//! failure is an `Err` travelling back through every native frame, which
//! is this crate's form of a non-local abort:
//!
//! - inside a native function, `?` forwards it to the caller's caller;
//! - `protected_call` stops it and leaves one error value on the stack;
//! - `call` at the outermost boundary (no native frame active) reports it
//!   as `UnprotectedAbort`.
//!
//! Values a native function pushed before an aborting operation stay on the
//! stack until a protected call (or the outer boundary) discards the frame.
//! Rust destructors still run while the `Err` unwinds, but state kept in
//! the script stack is only restored by `protected_call`.

use super::error::{CallStatus, LuaError, LuaResult, RaisedError};
use super::handle::FunctionHandle;
use super::metamethod::MetamethodType;
use super::stack::Frame;
use super::state::LuaState;
use super::value::{number_to_string, Type, Value};
use tracing::{debug, debug_span, error};

/// Result count asking for every value the callee returned
pub const MULTRET: i32 = -1;

impl LuaState {
    /// Absolute slot of a function sitting below `n_args` arguments
    fn call_slot(&self, n_args: usize) -> LuaResult<usize> {
        let available = self.stack.top();
        if n_args >= available {
            return Err(LuaError::StackUnderflow {
                requested: n_args + 1,
                available,
            });
        }
        Ok(self.stack.len() - n_args - 1)
    }

    /// Fail before the call when `n_results` values at `func` would not
    /// fit under the stack limit
    fn check_result_room(&self, func: usize, n_results: i32) -> LuaResult<()> {
        if n_results < 0 {
            return Ok(());
        }
        let limit = self.limits.max_stack_size;
        if func.saturating_add(n_results as usize) > limit {
            return Err(LuaError::StackOverflow { limit });
        }
        Ok(())
    }

    /// Function to run for the non-function at `func`.
    ///
    /// Its `__call` handler is inserted below it, so the original value
    /// becomes the first argument.
    fn call_handler(&mut self, func: usize, value: Value) -> LuaResult<FunctionHandle> {
        match self.metafield(value, MetamethodType::Call) {
            Some(Value::Function(h)) => {
                self.stack.push(Value::Function(h))?;
                self.stack.insert(func)?;
                Ok(h)
            }
            _ => {
                let name = self.value_type_name(Some(value));
                Err(self.runtime_error(format!("attempt to call a {} value", name)))
            }
        }
    }

    /// Run the callable at absolute slot `func` with everything above it as
    /// arguments. Results replace the callable and its arguments; returns
    /// how many were left.
    pub(crate) fn do_call(&mut self, func: usize, n_results: i32) -> LuaResult<usize> {
        self.check_result_room(func, n_results)?;
        let handle = match self.stack.get(func) {
            Value::Function(h) => h,
            other => self.call_handler(func, other)?,
        };

        let limit = self.limits.max_call_depth;
        if self.stack.depth() >= limit {
            return Err(LuaError::StackOverflow { limit });
        }

        let entry = self.heap.function(handle)?.func;
        let base = func + 1;

        self.stack.enter_frame(Frame { base, function: handle });
        let outcome = entry(self);
        let available = self.stack.len().saturating_sub(base);
        self.stack.leave_frame();

        let returned = outcome?;
        if returned < 0 || returned as usize > available {
            return Err(LuaError::InvalidResultCount { returned, available });
        }

        let first = self.stack.len() - returned as usize;
        let mut results = self.stack.values()[first..].to_vec();
        self.stack.truncate(func);

        if n_results >= 0 {
            results.resize(n_results as usize, Value::Nil);
        }
        let count = results.len();
        for value in results {
            self.stack.push(value)?;
        }
        Ok(count)
    }

    /// Call `handler(args...)` from inside an operation and return its
    /// first result. The stack is left as it was.
    pub(crate) fn call_metamethod(&mut self, handler: Value, args: &[Value]) -> LuaResult<Value> {
        let func = self.stack.len();

        let outcome = self
            .push_call_frame(handler, args)
            .and_then(|_| self.do_call(func, 1));

        match outcome {
            Ok(_) => self.stack.pop_value(),
            Err(err) => {
                self.stack.truncate(func);
                Err(err)
            }
        }
    }

    fn push_call_frame(&mut self, callee: Value, args: &[Value]) -> LuaResult<()> {
        self.stack.push(callee)?;
        for &arg in args {
            self.stack.push(arg)?;
        }
        Ok(())
    }

    /// Error value a failed call leaves behind.
    ///
    /// A raised value is not a collector root while it travels as an `Err`;
    /// if a collection freed it, the message string stands in for it.
    fn error_value(&mut self, err: &LuaError) -> Value {
        match err {
            LuaError::Runtime(raised) if self.heap.is_live(&raised.value) => raised.value,
            LuaError::Runtime(raised) => self.intern_str(&raised.message),
            other => self.intern_str(&other.message()),
        }
    }

    /// Call the function below the top `n_args` values.
    ///
    /// Afterwards the function and its arguments are replaced by
    /// `n_results` values, or by every result with [`MULTRET`].
    ///
    /// An error inside the callee aborts: it is returned unchanged to the
    /// enclosing native function, whose own `?` must pass it on. At the
    /// outermost boundary the call frame is discarded and the error becomes
    /// `UnprotectedAbort`. A result count that cannot fit under the stack
    /// limit fails with `StackOverflow` before the callee runs.
    pub fn call(&mut self, n_args: usize, n_results: i32) -> LuaResult<()> {
        let func = self.call_slot(n_args)?;
        self.check_result_room(func, n_results)?;

        match self.do_call(func, n_results) {
            Ok(_) => Ok(()),
            Err(err) if self.stack.depth() == 0 => {
                self.stack.truncate(func);
                let message = err.message();
                error!(instance = %self.instance_id(), %message, "unprotected error in call");
                Err(LuaError::UnprotectedAbort { message })
            }
            Err(err) => Err(err),
        }
    }

    /// Call like [`call`](Self::call), but turn a failure into a status.
    ///
    /// On failure the function and arguments are replaced by exactly one
    /// error value. With a nonzero `handler` index, the function there is
    /// called with the error value and its result becomes the error value;
    /// if the handler fails too the status is `HandlerError`.
    pub fn protected_call(&mut self, n_args: usize, n_results: i32, handler: i32) -> LuaResult<CallStatus> {
        let handler_slot = match handler {
            0 => None,
            idx => Some(self.stack.absolute(idx)?),
        };
        let func = self.call_slot(n_args)?;
        self.check_result_room(func, n_results)?;
        let depth = self.stack.depth();

        let _span = debug_span!("protected_call", instance = %self.instance_id()).entered();

        let err = match self.do_call(func, n_results) {
            Ok(_) => return Ok(CallStatus::Ok),
            Err(err) => err,
        };

        self.stack.unwind_frames(depth);
        self.stack.truncate(func);

        let value = self.error_value(&err);
        let (status, value) = match handler_slot {
            None => (CallStatus::RuntimeError, value),
            Some(slot) => {
                let handler = self.stack.get(slot);
                match self.call_metamethod(handler, &[value]) {
                    Ok(handled) => (CallStatus::RuntimeError, handled),
                    Err(_) => {
                        self.stack.unwind_frames(depth);
                        self.stack.truncate(func);
                        (CallStatus::HandlerError, self.intern_str("error in error handling"))
                    }
                }
            }
        };

        debug!(status = status.code(), message = %err.message(), "protected call failed");
        self.stack.push(value)?;
        Ok(status)
    }

    // ------------------------------------------------------------------
    // Error channel
    // ------------------------------------------------------------------

    /// Abort with `message` as the error value
    pub fn throw_error<T>(&mut self, message: &str) -> LuaResult<T> {
        Err(self.runtime_error(message))
    }

    /// Abort with the popped top value as the error value
    pub fn raise<T>(&mut self) -> LuaResult<T> {
        let value = self.stack.pop_value()?;
        let message = match value {
            Value::String(h) => String::from_utf8_lossy(self.heap.string(h)?.as_bytes()).into_owned(),
            Value::Number(n) => number_to_string(n),
            other => format!("(error object is a {} value)", self.value_type_name(Some(other))),
        };
        Err(LuaError::Runtime(RaisedError { value, message }))
    }

    /// Abort unless the value at `pos` has type `ty`
    pub fn check_type(&self, pos: i32, ty: Type) -> LuaResult<()> {
        if self.is_type(pos, ty) {
            return Ok(());
        }

        let expected = match ty {
            Type::User(id) => self.types.name(id).unwrap_or("userdata"),
            other => other.name().unwrap_or("userdata"),
        };
        Err(self.type_mismatch(pos, expected))
    }

    /// Abort with a message about argument `arg`
    pub fn arg_error<T>(&self, arg: i32, message: &str) -> LuaResult<T> {
        Err(LuaError::BadArgument {
            arg,
            message: message.to_string(),
        })
    }
}
