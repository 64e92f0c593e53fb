//! Lua State
//!
//! [`LuaState`] is the embedding interface native code drives. It owns the
//! heap, the shared value stack, the type registry and the reference table
//! of one engine instance; nothing is shared between instances.
//!
//! This file holds the stack accessor and type marshaling operations. Table
//! access, userdata, references and calls live in their own modules as
//! further `impl LuaState` blocks.

use super::error::{LuaError, LuaResult, RaisedError};
use super::handle::{StringHandle, TableHandle, ThreadHandle};
use super::heap::LuaHeap;
use super::reference::ReferenceTable;
use super::registry::TypeRegistry;
use super::stack::{Slot, ValueStack, REGISTRY_INDEX};
use super::value::{
    number_to_string, str_to_number, Angle, Function, LuaThread, NativeFunction, Type, Value, Vector,
};
use crate::config::{EngineConfig, ResourceLimits};
use std::ffi::c_void;
use tracing::debug;
use uuid::Uuid;

/// Tables reachable through `push_special`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    /// The globals table
    Globals,

    /// The running function's environment
    Environment,

    /// The registry table
    Registry,
}

/// One engine instance
pub struct LuaState {
    pub(crate) heap: LuaHeap,
    pub(crate) stack: ValueStack,
    pub(crate) types: TypeRegistry,
    pub(crate) refs: ReferenceTable,

    /// Registry table, addressed by `REGISTRY_INDEX`
    pub(crate) registry: TableHandle,

    /// Globals table, also used as every function's environment
    pub(crate) globals: TableHandle,

    pub(crate) main_thread: ThreadHandle,
    pub(crate) limits: ResourceLimits,

    instance: Uuid,
}

impl LuaState {
    /// Create a state with default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a state with the given configuration
    pub fn with_config(config: EngineConfig) -> Self {
        let mut heap = LuaHeap::new();
        let registry = heap.create_table(0, 16);
        let globals = heap.create_table(0, 32);
        let main_thread = heap.create_thread(LuaThread);

        let instance = Uuid::new_v4();
        debug!(
            instance = %instance,
            max_stack_size = config.limits.max_stack_size,
            max_call_depth = config.limits.max_call_depth,
            "state created"
        );

        LuaState {
            heap,
            stack: ValueStack::new(config.limits.max_stack_size),
            types: TypeRegistry::new(),
            refs: ReferenceTable::new(),
            registry,
            globals,
            main_thread,
            limits: config.limits,
            instance,
        }
    }

    /// Unique id of this instance, as it appears in log events
    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    // ------------------------------------------------------------------
    // Slot access
    // ------------------------------------------------------------------

    /// Value at a stack index or pseudo-index; `None` for an invalid index
    pub(crate) fn value_at(&self, idx: i32) -> Option<Value> {
        match self.stack.resolve(idx)? {
            Slot::Stack(abs) => Some(self.stack.get(abs)),
            Slot::Registry => Some(Value::Table(self.registry)),
            Slot::Globals => Some(Value::Table(self.globals)),
            Slot::Upvalue(n) => {
                let frame = self.stack.current_frame()?;
                let function = self.heap.function(frame.function).ok()?;
                function.upvalues.get(n - 1).copied()
            }
        }
    }

    /// Value at an index that must be valid
    pub(crate) fn checked_value(&self, idx: i32) -> LuaResult<Value> {
        self.value_at(idx).ok_or(LuaError::InvalidIndex(idx))
    }

    /// Overwrite a stack slot, an upvalue or the globals table
    fn write_at(&mut self, idx: i32, value: Value) -> LuaResult<()> {
        match self.stack.resolve(idx) {
            Some(Slot::Stack(abs)) => {
                self.stack.set(abs, value);
                Ok(())
            }
            Some(Slot::Upvalue(n)) => {
                let frame = self.stack.current_frame().ok_or(LuaError::InvalidIndex(idx))?;
                let function = self.heap.function_mut(frame.function)?;
                let slot = function.upvalues.get_mut(n - 1).ok_or(LuaError::InvalidIndex(idx))?;
                *slot = value;
                Ok(())
            }
            Some(Slot::Globals) => match value {
                Value::Table(t) => {
                    self.globals = t;
                    Ok(())
                }
                _ => Err(LuaError::InvalidIndex(idx)),
            },
            Some(Slot::Registry) | None => Err(LuaError::InvalidIndex(idx)),
        }
    }

    pub(crate) fn push_raw(&mut self, value: Value) -> LuaResult<()> {
        self.stack.push(value)
    }

    pub(crate) fn intern_str(&mut self, s: &str) -> Value {
        Value::String(self.heap.intern(s.as_bytes()))
    }

    /// Runtime error carrying `message` as its error value
    pub(crate) fn runtime_error(&mut self, message: impl Into<String>) -> LuaError {
        let message = message.into();
        let value = self.intern_str(&message);
        LuaError::Runtime(RaisedError { value, message })
    }

    /// Type name used in error messages
    pub(crate) fn value_type_name(&self, value: Option<Value>) -> &'static str {
        let ty = value.map(|v| v.base_type()).unwrap_or(Type::None);
        ty.name().unwrap_or("userdata")
    }

    // ------------------------------------------------------------------
    // Stack accessor
    // ------------------------------------------------------------------

    /// Number of values in the current frame
    pub fn top(&self) -> i32 {
        self.stack.top() as i32
    }

    /// Push a copy of the value at `pos`
    pub fn push_value(&mut self, pos: i32) -> LuaResult<()> {
        let value = self.checked_value(pos)?;
        self.stack.push(value)
    }

    /// Remove the top `n` values
    pub fn pop(&mut self, n: usize) -> LuaResult<()> {
        self.stack.pop(n)
    }

    /// Move the top value into `pos`, shifting the values above up
    pub fn insert(&mut self, pos: i32) -> LuaResult<()> {
        let abs = self.stack.absolute(pos)?;
        self.stack.insert(abs)
    }

    /// Delete the value at `pos`, shifting the values above down
    pub fn remove(&mut self, pos: i32) -> LuaResult<()> {
        let abs = self.stack.absolute(pos)?;
        self.stack.remove(abs);
        Ok(())
    }

    /// Pop the top value into `pos` without shifting
    pub fn replace(&mut self, pos: i32) -> LuaResult<()> {
        if self.value_at(pos).is_none() {
            return Err(LuaError::InvalidIndex(pos));
        }
        let target = self.stack.resolve(pos);
        let value = self.stack.pop_value()?;

        match target {
            // The popped slot itself
            Some(Slot::Stack(abs)) if abs >= self.stack.len() => Ok(()),
            Some(Slot::Stack(abs)) => {
                self.stack.set(abs, value);
                Ok(())
            }
            _ => self.write_at(pos, value),
        }
    }

    /// Grow (with nils) or shrink the frame.
    ///
    /// Non-negative `idx` is the new value count; negative counts from the top.
    pub fn set_top(&mut self, idx: i32) -> LuaResult<()> {
        let count = if idx >= 0 {
            idx as usize
        } else {
            let top = self.stack.top() as i64;
            let count = top + idx as i64 + 1;
            if count < 0 {
                return Err(LuaError::StackUnderflow {
                    requested: (-(idx as i64) - 1) as usize,
                    available: top as usize,
                });
            }
            count as usize
        };
        self.stack.set_top(count)
    }

    /// Convert a top-relative index into a bottom-relative one.
    ///
    /// Positive and pseudo-indices are returned unchanged.
    pub fn absolute_index(&self, idx: i32) -> i32 {
        if idx > 0 || idx <= REGISTRY_INDEX {
            idx
        } else if idx == 0 {
            0
        } else {
            self.top() + idx + 1
        }
    }

    /// Whether `extra` more values can be pushed
    pub fn check_stack(&self, extra: usize) -> bool {
        self.stack.has_room(extra)
    }

    pub fn is_valid_index(&self, idx: i32) -> bool {
        self.value_at(idx).is_some()
    }

    // ------------------------------------------------------------------
    // Pushers
    // ------------------------------------------------------------------

    pub fn push_nil(&mut self) -> LuaResult<()> {
        self.stack.push(Value::Nil)
    }

    pub fn push_bool(&mut self, b: bool) -> LuaResult<()> {
        self.stack.push(Value::Boolean(b))
    }

    pub fn push_number(&mut self, n: f64) -> LuaResult<()> {
        self.stack.push(Value::Number(n))
    }

    pub fn push_integer(&mut self, n: i64) -> LuaResult<()> {
        self.stack.push(Value::Number(n as f64))
    }

    pub fn push_string(&mut self, s: &str) -> LuaResult<()> {
        self.push_bytes(s.as_bytes())
    }

    /// Push a byte string; embedded zeros are kept
    pub fn push_bytes(&mut self, bytes: &[u8]) -> LuaResult<()> {
        let handle = self.heap.intern(bytes);
        self.stack.push(Value::String(handle))
    }

    pub fn push_native_function(&mut self, func: NativeFunction) -> LuaResult<()> {
        self.push_closure(func, 0)
    }

    /// Pop `n` values into the upvalues of a new function and push it.
    ///
    /// The deepest popped value becomes upvalue 1.
    pub fn push_closure(&mut self, func: NativeFunction, n: usize) -> LuaResult<()> {
        let upvalues = self.stack.pop_many(n)?;
        let handle = self.heap.create_function(Function { func, upvalues });
        self.stack.push(Value::Function(handle))
    }

    pub fn push_light_pointer(&mut self, ptr: *mut c_void) -> LuaResult<()> {
        self.stack.push(Value::LightUserData(ptr))
    }

    pub fn push_vector(&mut self, v: &Vector) -> LuaResult<()> {
        self.stack.push(Value::Vector(*v))
    }

    pub fn push_angle(&mut self, a: &Angle) -> LuaResult<()> {
        self.stack.push(Value::Angle(*a))
    }

    /// Push the running thread. Returns true when it is the main thread.
    pub fn push_thread(&mut self) -> LuaResult<bool> {
        // Coroutines are never created here, so the running thread is main
        self.stack.push(Value::Thread(self.main_thread))?;
        Ok(true)
    }

    pub fn push_special(&mut self, special: Special) -> LuaResult<()> {
        let table = match special {
            Special::Globals | Special::Environment => self.globals,
            Special::Registry => self.registry,
        };
        self.stack.push(Value::Table(table))
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    /// Number at `pos`, coercing numeric strings; 0 otherwise
    pub fn get_number(&self, pos: i32) -> f64 {
        match self.value_at(pos) {
            Some(Value::Number(n)) => n,
            Some(Value::String(h)) => self
                .heap
                .string(h)
                .ok()
                .and_then(|s| str_to_number(s.as_bytes()))
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// `get_number` truncated toward zero
    pub fn get_integer(&self, pos: i32) -> i64 {
        self.get_number(pos) as i64
    }

    /// Truthiness of the value at `pos`; false for invalid indices
    pub fn get_bool(&self, pos: i32) -> bool {
        self.value_at(pos).map_or(false, |v| !v.is_falsey())
    }

    /// String handle for `pos`, converting a number slot in place
    pub(crate) fn coerce_to_string(&mut self, pos: i32) -> Option<StringHandle> {
        match self.value_at(pos)? {
            Value::String(h) => Some(h),
            Value::Number(n) => {
                let handle = self.heap.intern(number_to_string(n).as_bytes());
                if let Some(Slot::Stack(abs)) = self.stack.resolve(pos) {
                    self.stack.set(abs, Value::String(handle));
                }
                Some(handle)
            }
            _ => None,
        }
    }

    /// Bytes of the string at `pos`.
    ///
    /// A number is converted to its string form and the slot is replaced
    /// by that string. Other types yield `None`.
    pub fn get_bytes(&mut self, pos: i32) -> Option<&[u8]> {
        let handle = self.coerce_to_string(pos)?;
        self.heap.string(handle).ok().map(|s| s.as_bytes())
    }

    /// `get_bytes` decoded as UTF-8, invalid sequences replaced
    pub fn get_string(&mut self, pos: i32) -> Option<String> {
        self.get_bytes(pos).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Entry point of the native function at `pos`
    pub fn get_function_pointer(&self, pos: i32) -> Option<NativeFunction> {
        match self.value_at(pos)? {
            Value::Function(h) => self.heap.function(h).ok().map(|f| f.func),
            _ => None,
        }
    }

    pub fn get_vector(&self, pos: i32) -> Option<Vector> {
        match self.value_at(pos)? {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_angle(&self, pos: i32) -> Option<Angle> {
        match self.value_at(pos)? {
            Value::Angle(a) => Some(a),
            _ => None,
        }
    }

    /// Pointer of a light or full userdata; null for anything else or an
    /// invalidated userdata
    pub fn get_light_pointer(&self, pos: i32) -> *mut c_void {
        match self.value_at(pos) {
            Some(Value::LightUserData(p)) => p,
            Some(Value::UserData(h)) => self
                .heap
                .userdata(h)
                .ok()
                .and_then(|u| u.data)
                .map_or(std::ptr::null_mut(), |p| p.as_ptr()),
            _ => std::ptr::null_mut(),
        }
    }

    // ------------------------------------------------------------------
    // Checked getters
    // ------------------------------------------------------------------

    pub(crate) fn type_mismatch(&self, arg: i32, expected: &str) -> LuaError {
        let got = match self.get_type(arg) {
            Type::User(id) => self.types.name(id).unwrap_or("userdata"),
            _ => self.value_type_name(self.value_at(arg)),
        };
        LuaError::ArgumentTypeMismatch {
            arg,
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Number at argument `arg`, aborting when it is not convertible
    pub fn check_number(&self, arg: i32) -> LuaResult<f64> {
        match self.value_at(arg) {
            Some(Value::Number(n)) => Ok(n),
            Some(Value::String(h)) => self
                .heap
                .string(h)
                .ok()
                .and_then(|s| str_to_number(s.as_bytes()))
                .ok_or_else(|| self.type_mismatch(arg, "number")),
            _ => Err(self.type_mismatch(arg, "number")),
        }
    }

    /// String at argument `arg`, aborting when it is neither a string nor
    /// a number
    pub fn check_string(&mut self, arg: i32) -> LuaResult<String> {
        match self.get_string(arg) {
            Some(s) => Ok(s),
            None => Err(self.type_mismatch(arg, "string")),
        }
    }

    // ------------------------------------------------------------------
    // Type inspection
    // ------------------------------------------------------------------

    /// Type at `pos`. Userdata report their registered id.
    pub fn get_type(&self, pos: i32) -> Type {
        match self.value_at(pos) {
            None => Type::None,
            Some(Value::UserData(h)) => match self.heap.userdata(h) {
                Ok(u) => Type::User(u.type_id),
                Err(_) => Type::UserData,
            },
            Some(v) => v.base_type(),
        }
    }

    /// Whether the value at `pos` has type `ty`.
    ///
    /// `Type::UserData` matches every full userdata.
    pub fn is_type(&self, pos: i32, ty: Type) -> bool {
        let actual = self.get_type(pos);
        match ty {
            Type::UserData => matches!(actual, Type::User(_) | Type::UserData),
            _ => actual == ty,
        }
    }

    /// Name of a builtin type; `None` for registered user types
    pub fn type_name(&self, ty: Type) -> Option<&'static str> {
        ty.name()
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    /// Free every unreachable heap object. Returns how many were freed.
    ///
    /// Error values carried by an `Err` are not roots. A native function
    /// that holds on to a caught error across a collection keeps only its
    /// message; push the value first to keep the value itself.
    pub fn collect_garbage(&mut self) -> usize {
        let mut roots: Vec<Value> = self.stack.values().to_vec();
        roots.extend(self.stack.frames().iter().map(|f| Value::Function(f.function)));
        roots.push(Value::Table(self.registry));
        roots.push(Value::Table(self.globals));
        roots.push(Value::Thread(self.main_thread));
        roots.extend(self.types.roots());
        roots.extend(self.refs.values());

        let before = self.heap.object_count();
        let freed = self.heap.collect(roots);
        debug!(instance = %self.instance, before, freed, "collected garbage");
        freed
    }

    /// Number of live heap objects
    pub fn object_count(&self) -> usize {
        self.heap.object_count()
    }
}

impl Default for LuaState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::stack::{upvalue_index, GLOBALS_INDEX};

    fn numbers(state: &LuaState) -> Vec<f64> {
        (1..=state.top()).map(|i| state.get_number(i)).collect()
    }

    #[test]
    fn test_push_value_copies() {
        let mut state = LuaState::new();
        state.push_number(1.0).unwrap();
        state.push_number(2.0).unwrap();
        state.push_value(1).unwrap();

        assert_eq!(numbers(&state), vec![1.0, 2.0, 1.0]);
        assert_eq!(state.push_value(9), Err(LuaError::InvalidIndex(9)));
    }

    #[test]
    fn test_insert_remove_replace() {
        let mut state = LuaState::new();
        for n in [1.0, 2.0, 3.0, 4.0] {
            state.push_number(n).unwrap();
        }

        state.insert(2).unwrap();
        assert_eq!(numbers(&state), vec![1.0, 4.0, 2.0, 3.0]);

        state.remove(-2).unwrap();
        assert_eq!(numbers(&state), vec![1.0, 4.0, 3.0]);

        state.replace(1).unwrap();
        assert_eq!(numbers(&state), vec![3.0, 4.0]);

        assert_eq!(state.insert(REGISTRY_INDEX), Err(LuaError::InvalidIndex(REGISTRY_INDEX)));
    }

    #[test]
    fn test_set_top_and_absolute_index() {
        let mut state = LuaState::new();
        state.set_top(3).unwrap();
        assert_eq!(state.top(), 3);
        assert!(state.is_type(3, Type::Nil));

        assert_eq!(state.absolute_index(-1), 3);
        assert_eq!(state.absolute_index(2), 2);
        assert_eq!(state.absolute_index(GLOBALS_INDEX), GLOBALS_INDEX);

        state.set_top(-2).unwrap();
        assert_eq!(state.top(), 2);
        assert!(state.set_top(-5).is_err());
    }

    #[test]
    fn test_lenient_getters() {
        let mut state = LuaState::new();
        state.push_string("0x10").unwrap();
        state.push_string("abc").unwrap();
        state.push_bool(false).unwrap();

        assert_eq!(state.get_number(1), 16.0);
        assert_eq!(state.get_number(2), 0.0);
        assert_eq!(state.get_number(40), 0.0);
        assert!(!state.get_bool(3));
        assert!(state.get_bool(1));
        assert!(!state.get_bool(40));
        assert_eq!(state.get_string(3), None);
        assert_eq!(state.get_vector(1), None);
        assert!(state.get_light_pointer(1).is_null());
        assert!(state.get_function_pointer(1).is_none());
    }

    #[test]
    fn test_get_string_converts_number_in_place() {
        let mut state = LuaState::new();
        state.push_number(12.5).unwrap();
        assert!(state.is_type(1, Type::Number));

        assert_eq!(state.get_string(1).as_deref(), Some("12.5"));
        assert!(state.is_type(1, Type::String));
    }

    #[test]
    fn test_bytes_keep_embedded_zeros() {
        let mut state = LuaState::new();
        state.push_bytes(b"a\0b").unwrap();
        assert_eq!(state.get_bytes(-1), Some(&b"a\0b"[..]));
    }

    #[test]
    fn test_vectors_have_value_semantics() {
        let mut state = LuaState::new();
        let mut v = Vector::new(1.0, 2.0, 3.0);
        state.push_vector(&v).unwrap();
        v.x = 9.0;

        assert_eq!(state.get_vector(1), Some(Vector::new(1.0, 2.0, 3.0)));
        assert_eq!(state.get_type(1), Type::Vector);
        assert_eq!(state.get_angle(1), None);
    }

    #[test]
    fn test_checked_getters() {
        let mut state = LuaState::new();
        state.push_string("2.5").unwrap();
        state.push_bool(true).unwrap();
        state.push_number(3.0).unwrap();

        assert_eq!(state.check_number(1), Ok(2.5));
        assert_eq!(
            state.check_number(2),
            Err(LuaError::ArgumentTypeMismatch {
                arg: 2,
                expected: "number".to_string(),
                got: "boolean".to_string(),
            })
        );
        assert_eq!(state.check_string(3).as_deref(), Ok("3"));
        assert!(state.check_string(2).unwrap_err().is_abort());
        assert!(matches!(
            state.check_number(7),
            Err(LuaError::ArgumentTypeMismatch { ref got, .. }) if got == "no value"
        ));
    }

    #[test]
    fn test_closure_pops_upvalues() {
        fn second_upvalue(state: &mut LuaState) -> LuaResult<i32> {
            state.push_value(upvalue_index(2))?;
            Ok(1)
        }

        let mut state = LuaState::new();
        state.push_number(10.0).unwrap();
        state.push_number(20.0).unwrap();
        state.push_closure(second_upvalue, 2).unwrap();

        assert_eq!(state.top(), 1);
        assert!(state.is_type(1, Type::Function));
        assert!(state.get_function_pointer(1).is_some());

        state.call(0, 1).unwrap();
        assert_eq!(state.get_number(-1), 20.0);

        assert!(matches!(
            state.push_closure(second_upvalue, 5),
            Err(LuaError::StackUnderflow { requested: 5, .. })
        ));
    }

    #[test]
    fn test_special_tables() {
        let mut state = LuaState::new();
        state.push_special(Special::Globals).unwrap();
        state.push_special(Special::Environment).unwrap();
        state.push_special(Special::Registry).unwrap();
        state.push_value(GLOBALS_INDEX).unwrap();

        assert!(state.raw_equal(1, 2));
        assert!(state.raw_equal(1, 4));
        assert!(!state.raw_equal(1, 3));
        assert!(state.push_thread().unwrap());
        assert_eq!(state.get_type(-1), Type::Thread);
    }

    #[test]
    fn test_type_names() {
        let state = LuaState::new();
        assert_eq!(state.type_name(Type::Table), Some("table"));
        assert_eq!(state.type_name(Type::User(30)), None);
        assert_eq!(state.get_type(1), Type::None);
    }

    #[test]
    fn test_stack_limit() {
        let config = EngineConfig::default().with_limits(ResourceLimits {
            max_stack_size: 2,
            ..ResourceLimits::default()
        });
        let mut state = LuaState::with_config(config);
        state.push_nil().unwrap();
        state.push_nil().unwrap();
        assert!(!state.check_stack(1));
        assert_eq!(state.push_nil(), Err(LuaError::StackOverflow { limit: 2 }));
    }

    #[test]
    fn test_collect_garbage_frees_popped_tables() {
        let mut state = LuaState::new();
        let baseline = state.object_count();

        state.create_table().unwrap();
        state.create_table().unwrap();
        assert_eq!(state.object_count(), baseline + 2);

        state.pop(1).unwrap();
        assert_eq!(state.collect_garbage(), 1);
        assert_eq!(state.object_count(), baseline + 1);
    }
}
