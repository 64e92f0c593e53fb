//! Type Registry
//!
//! Maps user type names to stable type ids and keeps each type's metatable.
//! Builtin types other than tables and userdata (which carry their own
//! metatable per value) share one metatable per type, also kept here.

use super::error::{LuaError, LuaResult};
use super::handle::TableHandle;
use super::value::{Type, TypeId, Value, FIRST_USER_TYPE};
use std::collections::HashMap;

/// A registered user type
#[derive(Debug, Clone)]
struct RegisteredType {
    name: String,
    metatable: TableHandle,
}

/// Registry of user types and per-type metatables
#[derive(Debug)]
pub struct TypeRegistry {
    by_name: HashMap<String, TypeId>,

    /// Indexed by `id - FIRST_USER_TYPE`
    types: Vec<RegisteredType>,

    /// Shared metatables of builtin value types
    builtin: HashMap<Type, TableHandle>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry {
            by_name: HashMap::new(),
            types: Vec::new(),
            builtin: HashMap::new(),
        }
    }

    /// Type id registered under `name`
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Register `name` with its metatable and allocate the next id.
    ///
    /// Callers check `lookup` first; registering a known name again is a
    /// logic error and returns the existing id.
    pub fn register(&mut self, name: &str, metatable: TableHandle) -> LuaResult<TypeId> {
        if let Some(id) = self.lookup(name) {
            return Ok(id);
        }

        let next = FIRST_USER_TYPE as usize + self.types.len();
        let id = TypeId::try_from(next).map_err(|_| LuaError::TypeIdsExhausted)?;

        self.types.push(RegisteredType {
            name: name.to_string(),
            metatable,
        });
        self.by_name.insert(name.to_string(), id);

        Ok(id)
    }

    fn entry(&self, id: TypeId) -> Option<&RegisteredType> {
        let slot = (id as usize).checked_sub(FIRST_USER_TYPE as usize)?;
        self.types.get(slot)
    }

    /// Metatable of a registered type
    pub fn metatable(&self, id: TypeId) -> Option<TableHandle> {
        self.entry(id).map(|t| t.metatable)
    }

    /// Name a type was registered under
    pub fn name(&self, id: TypeId) -> Option<&str> {
        self.entry(id).map(|t| t.name.as_str())
    }

    pub fn builtin_metatable(&self, ty: Type) -> Option<TableHandle> {
        self.builtin.get(&ty).copied()
    }

    pub fn set_builtin_metatable(&mut self, ty: Type, metatable: Option<TableHandle>) {
        match metatable {
            Some(mt) => {
                self.builtin.insert(ty, mt);
            }
            None => {
                self.builtin.remove(&ty);
            }
        }
    }

    /// Metatables that must survive collection
    pub fn roots(&self) -> impl Iterator<Item = Value> + '_ {
        self.types
            .iter()
            .map(|t| Value::Table(t.metatable))
            .chain(self.builtin.values().map(|&mt| Value::Table(mt)))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::heap::LuaHeap;

    #[test]
    fn test_ids_are_distinct_and_stable() {
        let mut heap = LuaHeap::new();
        let mut registry = TypeRegistry::new();

        let foo = registry.register("Foo", heap.create_table(0, 0)).unwrap();
        let bar = registry.register("Bar", heap.create_table(0, 0)).unwrap();

        assert_eq!(foo, FIRST_USER_TYPE);
        assert_ne!(foo, bar);
        assert_eq!(registry.lookup("Foo"), Some(foo));
        assert_eq!(registry.name(bar), Some("Bar"));
    }

    #[test]
    fn test_unknown_ids() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.metatable(FIRST_USER_TYPE), None);
        assert_eq!(registry.metatable(3), None);
        assert_eq!(registry.name(200), None);
    }

    #[test]
    fn test_ids_run_out() {
        let mut heap = LuaHeap::new();
        let mut registry = TypeRegistry::new();
        let capacity = TypeId::MAX as usize - FIRST_USER_TYPE as usize + 1;

        for i in 0..capacity {
            registry.register(&format!("T{}", i), heap.create_table(0, 0)).unwrap();
        }

        assert_eq!(
            registry.register("OneTooMany", heap.create_table(0, 0)),
            Err(LuaError::TypeIdsExhausted)
        );
    }
}
