//! Reference Table
//!
//! Persistent integer handles to values. A referenced value stays reachable
//! until its reference is freed, wherever the stack has moved in between.

use super::error::{LuaError, LuaResult};
use super::state::LuaState;
use super::value::Value;
use tracing::trace;

/// Reference identifier
pub type RefId = i32;

/// Reference to nil. Always valid; pushing it pushes nil.
pub const REF_NIL: RefId = -1;

/// Marker for "no reference". Never produced by `create_reference`.
pub const NO_REF: RefId = -2;

/// Slots addressed by reference id
#[derive(Debug, Default)]
pub struct ReferenceTable {
    /// Slot `id - 1`; `None` once freed
    slots: Vec<Option<Value>>,

    /// Freed ids, reused most recent first
    free: Vec<RefId>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, reusing the most recently freed id if any
    pub fn insert(&mut self, value: Value) -> RefId {
        if let Some(id) = self.free.pop() {
            self.slots[(id - 1) as usize] = Some(value);
            return id;
        }

        self.slots.push(Some(value));
        self.slots.len() as RefId
    }

    fn slot(&self, id: RefId) -> Option<&Option<Value>> {
        if id < 1 {
            return None;
        }
        self.slots.get((id - 1) as usize)
    }

    /// Value held by a live reference
    pub fn get(&self, id: RefId) -> Option<Value> {
        self.slot(id).copied().flatten()
    }

    /// Release a live reference. Returns false if `id` was not live.
    pub fn remove(&mut self, id: RefId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.slots[(id - 1) as usize] = None;
        self.free.push(id);
        true
    }

    /// Number of live references
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Referenced values
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.slots.iter().filter_map(|slot| *slot)
    }
}

impl LuaState {
    /// Pop the top value and return a reference to it.
    ///
    /// Nil yields `REF_NIL` without taking a slot.
    pub fn create_reference(&mut self) -> LuaResult<RefId> {
        let value = self.stack.pop_value()?;
        if value.is_nil() {
            return Ok(REF_NIL);
        }

        let id = self.refs.insert(value);
        trace!(instance = %self.instance_id(), id, "reference created");
        Ok(id)
    }

    /// Push the value a reference holds; the reference stays valid
    pub fn reference_push(&mut self, id: RefId) -> LuaResult<()> {
        if id == REF_NIL {
            return self.stack.push(Value::Nil);
        }

        let value = self.refs.get(id).ok_or(LuaError::InvalidReference(id))?;
        self.stack.push(value)
    }

    /// Release a reference so its id can be reused
    pub fn reference_free(&mut self, id: RefId) -> LuaResult<()> {
        if id == REF_NIL || id == NO_REF {
            return Ok(());
        }

        if !self.refs.remove(id) {
            return Err(LuaError::InvalidReference(id));
        }
        trace!(instance = %self.instance_id(), id, "reference freed");
        Ok(())
    }

    /// Number of live references
    pub fn reference_count(&self) -> usize {
        self.refs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freed_ids_are_reused_lifo() {
        let mut refs = ReferenceTable::new();
        let a = refs.insert(Value::Number(1.0));
        let b = refs.insert(Value::Number(2.0));
        let c = refs.insert(Value::Number(3.0));
        assert_eq!((a, b, c), (1, 2, 3));

        assert!(refs.remove(a));
        assert!(refs.remove(c));
        assert_eq!(refs.insert(Value::Boolean(true)), c);
        assert_eq!(refs.insert(Value::Boolean(false)), a);
        assert_eq!(refs.insert(Value::Nil), 4);
    }

    #[test]
    fn test_double_free_is_reported() {
        let mut refs = ReferenceTable::new();
        let id = refs.insert(Value::Number(1.0));
        assert!(refs.remove(id));
        assert!(!refs.remove(id));
        assert!(!refs.remove(0));
        assert!(!refs.remove(99));
        assert_eq!(refs.len(), 0);
    }

    #[test]
    fn test_state_reference_round_trip() {
        let mut state = LuaState::new();
        state.push_number(7.5).unwrap();
        let id = state.create_reference().unwrap();
        assert_eq!(state.top(), 0);

        state.reference_push(id).unwrap();
        state.reference_push(id).unwrap();
        assert_eq!(state.get_number(-1), 7.5);
        assert_eq!(state.get_number(-2), 7.5);

        state.reference_free(id).unwrap();
        assert_eq!(state.reference_push(id), Err(LuaError::InvalidReference(id)));
        assert_eq!(state.reference_free(id), Err(LuaError::InvalidReference(id)));
    }

    #[test]
    fn test_nil_reference() {
        let mut state = LuaState::new();
        state.push_nil().unwrap();
        assert_eq!(state.create_reference().unwrap(), REF_NIL);
        assert_eq!(state.reference_count(), 0);

        state.reference_push(REF_NIL).unwrap();
        assert!(state.is_type(-1, crate::lua::value::Type::Nil));
        state.reference_free(REF_NIL).unwrap();
        state.reference_free(NO_REF).unwrap();
    }

    #[test]
    fn test_reference_on_empty_stack() {
        let mut state = LuaState::new();
        assert!(matches!(
            state.create_reference(),
            Err(LuaError::StackUnderflow { requested: 1, available: 0 })
        ));
    }
}
