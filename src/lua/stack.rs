//! Shared Value Stack
//!
//! One stack is shared by native code and every active call. Each native
//! call owns a frame starting at `base`; stack indices are relative to the
//! innermost frame. Positive indices count from the frame's bottom
//! (1 = first slot), negative ones from the top (-1 = topmost value).

use super::error::{LuaError, LuaResult};
use super::handle::FunctionHandle;
use super::value::Value;

/// Pseudo-index of the registry table
pub const REGISTRY_INDEX: i32 = -10000;

/// Pseudo-index of the running function's environment
pub const ENVIRON_INDEX: i32 = -10001;

/// Pseudo-index of the globals table
pub const GLOBALS_INDEX: i32 = -10002;

/// Pseudo-index of the running function's `n`th upvalue (1-based)
pub fn upvalue_index(n: i32) -> i32 {
    GLOBALS_INDEX - n
}

/// Activation record of a native call
#[derive(Debug, Clone)]
pub struct Frame {
    /// Absolute position of the frame's first slot
    pub base: usize,

    /// Function being executed
    pub function: FunctionHandle,
}

/// Where a stack index points once resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Absolute position in the value vector
    Stack(usize),
    Registry,
    Globals,
    /// 1-based upvalue of the running function
    Upvalue(usize),
}

/// The shared value stack
#[derive(Debug)]
pub struct ValueStack {
    values: Vec<Value>,
    frames: Vec<Frame>,
    limit: usize,
}

impl ValueStack {
    /// Create an empty stack holding at most `limit` values
    pub fn new(limit: usize) -> Self {
        ValueStack {
            values: Vec::with_capacity(limit.min(64)),
            frames: Vec::new(),
            limit,
        }
    }

    /// Absolute position of the innermost frame's first slot
    pub fn base(&self) -> usize {
        self.frames.last().map(|f| f.base).unwrap_or(0)
    }

    /// Number of values in the innermost frame
    pub fn top(&self) -> usize {
        self.values.len() - self.base()
    }

    /// Total number of values across all frames
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Innermost frame, if a native call is running
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Number of active native calls
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Resolve an index against the current top.
    ///
    /// Returns `None` for indices outside the frame.
    pub fn resolve(&self, idx: i32) -> Option<Slot> {
        let base = self.base();
        let len = self.values.len();

        if idx > 0 {
            let abs = base + (idx as usize - 1);
            (abs < len).then_some(Slot::Stack(abs))
        } else if idx < 0 && idx > REGISTRY_INDEX {
            let back = idx.unsigned_abs() as usize;
            (back <= len - base).then(|| Slot::Stack(len - back))
        } else {
            match idx {
                REGISTRY_INDEX => Some(Slot::Registry),
                GLOBALS_INDEX | ENVIRON_INDEX => Some(Slot::Globals),
                i if i < GLOBALS_INDEX => Some(Slot::Upvalue((GLOBALS_INDEX - i) as usize)),
                _ => None,
            }
        }
    }

    /// Resolve an index that must name a real stack slot
    pub fn absolute(&self, idx: i32) -> LuaResult<usize> {
        match self.resolve(idx) {
            Some(Slot::Stack(abs)) => Ok(abs),
            _ => Err(LuaError::InvalidIndex(idx)),
        }
    }

    pub fn get(&self, abs: usize) -> Value {
        self.values.get(abs).copied().unwrap_or(Value::Nil)
    }

    pub fn set(&mut self, abs: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(abs) {
            *slot = value;
        }
    }

    /// Whether `extra` more values fit under the limit
    pub fn has_room(&self, extra: usize) -> bool {
        self.values.len().saturating_add(extra) <= self.limit
    }

    pub fn push(&mut self, value: Value) -> LuaResult<()> {
        if self.values.len() >= self.limit {
            return Err(LuaError::StackOverflow { limit: self.limit });
        }
        self.values.push(value);
        Ok(())
    }

    /// Remove the top `n` values of the frame
    pub fn pop(&mut self, n: usize) -> LuaResult<()> {
        let available = self.top();
        if n > available {
            return Err(LuaError::StackUnderflow { requested: n, available });
        }
        self.values.truncate(self.values.len() - n);
        Ok(())
    }

    /// Remove and return the top value of the frame
    pub fn pop_value(&mut self) -> LuaResult<Value> {
        if self.top() == 0 {
            return Err(LuaError::StackUnderflow { requested: 1, available: 0 });
        }
        Ok(self.values.pop().unwrap_or(Value::Nil))
    }

    /// Remove and return the top `n` values, bottom first
    pub fn pop_many(&mut self, n: usize) -> LuaResult<Vec<Value>> {
        let available = self.top();
        if n > available {
            return Err(LuaError::StackUnderflow { requested: n, available });
        }
        Ok(self.values.split_off(self.values.len() - n))
    }

    /// Move the top value into `abs`, shifting the values above it up
    pub fn insert(&mut self, abs: usize) -> LuaResult<()> {
        let value = self.pop_value()?;
        self.values.insert(abs, value);
        Ok(())
    }

    /// Remove the value at `abs`, shifting the values above it down
    pub fn remove(&mut self, abs: usize) -> Value {
        self.values.remove(abs)
    }

    /// Drop everything at and above `abs`
    pub fn truncate(&mut self, abs: usize) {
        self.values.truncate(abs);
    }

    /// Grow the frame with nils or shrink it to exactly `count` values
    pub fn set_top(&mut self, count: usize) -> LuaResult<()> {
        let target = self.base() + count;
        if target > self.limit {
            return Err(LuaError::StackOverflow { limit: self.limit });
        }
        self.values.resize(target, Value::Nil);
        Ok(())
    }

    pub fn enter_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn leave_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Drop frames above `depth`
    pub fn unwind_frames(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_with(values: &[f64]) -> ValueStack {
        let mut stack = ValueStack::new(16);
        for &v in values {
            stack.push(Value::Number(v)).unwrap();
        }
        stack
    }

    #[test]
    fn test_positive_and_negative_resolution_agree() {
        let stack = stack_with(&[1.0, 2.0, 3.0]);
        assert_eq!(stack.resolve(1), Some(Slot::Stack(0)));
        assert_eq!(stack.resolve(-1), Some(Slot::Stack(2)));
        assert_eq!(stack.resolve(-3), Some(Slot::Stack(0)));
        assert_eq!(stack.resolve(4), None);
        assert_eq!(stack.resolve(-4), None);
        assert_eq!(stack.resolve(0), None);
    }

    #[test]
    fn test_pseudo_indices() {
        let stack = ValueStack::new(4);
        assert_eq!(stack.resolve(REGISTRY_INDEX), Some(Slot::Registry));
        assert_eq!(stack.resolve(GLOBALS_INDEX), Some(Slot::Globals));
        assert_eq!(stack.resolve(upvalue_index(2)), Some(Slot::Upvalue(2)));
    }

    #[test]
    fn test_pop_underflow_leaves_stack_untouched() {
        let mut stack = stack_with(&[1.0, 2.0]);
        assert_eq!(
            stack.pop(3),
            Err(LuaError::StackUnderflow { requested: 3, available: 2 })
        );
        assert_eq!(stack.top(), 2);
    }

    #[test]
    fn test_push_overflow() {
        let mut stack = ValueStack::new(1);
        stack.push(Value::Nil).unwrap();
        assert_eq!(stack.push(Value::Nil), Err(LuaError::StackOverflow { limit: 1 }));
    }

    #[test]
    fn test_insert_and_remove_preserve_order() {
        let mut stack = stack_with(&[1.0, 2.0, 3.0, 4.0]);

        stack.insert(0).unwrap();
        let order: Vec<Value> = stack.values().to_vec();
        assert_eq!(
            order,
            vec![Value::Number(4.0), Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]
        );

        assert_eq!(stack.remove(1), Value::Number(1.0));
        assert_eq!(
            stack.values().to_vec(),
            vec![Value::Number(4.0), Value::Number(2.0), Value::Number(3.0)]
        );
    }
}
