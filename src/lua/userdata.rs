//! UserData & Metatable Registry
//!
//! Native pointers are wrapped in userdata slots tagged with a type id. The
//! pointee stays owned by native code; a slot can be invalidated in place,
//! after which every accessor treats it as empty.

use super::error::{LuaError, LuaResult};
use super::state::LuaState;
use super::value::{TypeId, UserData, Value};
use std::ffi::c_void;
use std::ptr::NonNull;
use tracing::debug;

impl LuaState {
    /// Metatable for the user type `name`, created on first use.
    ///
    /// The first call allocates a type id and a metatable holding `MetaName`
    /// and `MetaID`, stored in the registry under `name`. Every call pushes
    /// the metatable and returns the type's id.
    pub fn create_metatable(&mut self, name: &str) -> LuaResult<TypeId> {
        if let Some(id) = self.types.lookup(name) {
            let metatable = self.types.metatable(id).ok_or(LuaError::UnregisteredType(id))?;
            self.push_raw(Value::Table(metatable))?;
            return Ok(id);
        }

        let metatable = self.heap.create_table(0, 4);
        let id = self.types.register(name, metatable)?;

        let name_key = self.intern_str("MetaName");
        let id_key = self.intern_str("MetaID");
        let type_name = self.intern_str(name);
        let registry = self.registry;

        self.raw_assign(metatable, name_key, type_name)?;
        self.raw_assign(metatable, id_key, Value::Number(id as f64))?;
        self.raw_assign(registry, type_name, Value::Table(metatable))?;

        debug!(instance = %self.instance_id(), name, id, "registered user type");
        self.push_raw(Value::Table(metatable))?;
        Ok(id)
    }

    /// Push the metatable of a registered type.
    ///
    /// Returns false and pushes nothing for an unknown id.
    pub fn push_metatable(&mut self, id: TypeId) -> LuaResult<bool> {
        match self.types.metatable(id) {
            Some(metatable) => {
                self.push_raw(Value::Table(metatable))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Name a user type was registered with
    pub fn registered_type_name(&self, id: TypeId) -> Option<&str> {
        self.types.name(id)
    }

    /// Push a userdata wrapping `ptr` with the metatable of type `id`
    pub fn push_user_type<T>(&mut self, ptr: *mut T, id: TypeId) -> LuaResult<()> {
        let metatable = self.types.metatable(id).ok_or(LuaError::UnregisteredType(id))?;
        let handle = self.heap.create_userdata(UserData {
            data: NonNull::new(ptr.cast::<c_void>()),
            type_id: id,
            metatable: Some(metatable),
        });
        self.push_raw(Value::UserData(handle))
    }

    /// Rebind the pointer of the userdata at `pos`; a null pointer
    /// invalidates it
    pub fn set_user_type<T>(&mut self, pos: i32, ptr: *mut T) -> LuaResult<()> {
        match self.value_at(pos) {
            Some(Value::UserData(h)) => {
                self.heap.userdata_mut(h)?.data = NonNull::new(ptr.cast::<c_void>());
                Ok(())
            }
            _ => Err(self.type_mismatch(pos, "userdata")),
        }
    }

    /// Pointer held by the userdata at `pos` if it has type `id` and has
    /// not been invalidated
    pub fn get_user_type<T>(&self, pos: i32, id: TypeId) -> Option<NonNull<T>> {
        match self.value_at(pos)? {
            Value::UserData(h) => {
                let userdata = self.heap.userdata(h).ok()?;
                if userdata.type_id != id {
                    return None;
                }
                userdata.data.map(NonNull::cast)
            }
            _ => None,
        }
    }
}
