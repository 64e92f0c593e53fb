//! Table & Raw Access
//!
//! Indexing with `__index`/`__newindex` dispatch, the raw variants that
//! bypass it, length, equality, iteration and metatable assignment.

use super::error::LuaResult;
use super::handle::TableHandle;
use super::metamethod::MetamethodType;
use super::state::LuaState;
use super::value::Value;
use tracing::trace;

impl LuaState {
    // ------------------------------------------------------------------
    // Metatable lookup
    // ------------------------------------------------------------------

    /// Metatable of a value: per value for tables and userdata, per type
    /// for everything else
    pub(crate) fn metatable_of(&self, value: Value) -> Option<TableHandle> {
        match value {
            Value::Table(h) => self.heap.table(h).ok()?.metatable,
            Value::UserData(h) => self.heap.userdata(h).ok()?.metatable,
            other => self.types.builtin_metatable(other.base_type()),
        }
    }

    /// Non-nil metamethod `event` of `value`
    pub(crate) fn metafield(&mut self, value: Value, event: MetamethodType) -> Option<Value> {
        let mt = self.metatable_of(value)?;
        let key = self.intern_str(event.name());
        let handler = self.heap.table(mt).ok()?.get(&key);
        (!handler.is_nil()).then_some(handler)
    }

    fn index_error(&mut self, value: Value) -> super::error::LuaError {
        let name = self.value_type_name(Some(value));
        self.runtime_error(format!("attempt to index a {} value", name))
    }

    /// `obj[key]` with `__index` dispatch
    pub(crate) fn index_value(&mut self, obj: Value, key: Value) -> LuaResult<Value> {
        let mut current = obj;

        for _ in 0..self.limits.max_metamethod_chain {
            let handler = match current {
                Value::Table(h) => {
                    let raw = self.heap.table(h)?.get(&key);
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    match self.metafield(current, MetamethodType::Index) {
                        Some(handler) => handler,
                        None => return Ok(Value::Nil),
                    }
                }
                _ => match self.metafield(current, MetamethodType::Index) {
                    Some(handler) => handler,
                    None => return Err(self.index_error(current)),
                },
            };

            if let Value::Function(_) = handler {
                trace!(instance = %self.instance_id(), "__index handler called");
                return self.call_metamethod(handler, &[current, key]);
            }
            current = handler;
        }

        Err(self.runtime_error("loop in gettable"))
    }

    /// `obj[key] = value` with `__newindex` dispatch
    pub(crate) fn new_index(&mut self, obj: Value, key: Value, value: Value) -> LuaResult<()> {
        let mut current = obj;

        for _ in 0..self.limits.max_metamethod_chain {
            let handler = match current {
                Value::Table(h) => {
                    let present = self.heap.table(h)?.contains(&key);
                    let handler = if present {
                        None
                    } else {
                        self.metafield(current, MetamethodType::NewIndex)
                    };
                    match handler {
                        Some(handler) => handler,
                        None => return self.raw_assign(h, key, value),
                    }
                }
                _ => match self.metafield(current, MetamethodType::NewIndex) {
                    Some(handler) => handler,
                    None => return Err(self.index_error(current)),
                },
            };

            if let Value::Function(_) = handler {
                trace!(instance = %self.instance_id(), "__newindex handler called");
                self.call_metamethod(handler, &[current, key, value])?;
                return Ok(());
            }
            current = handler;
        }

        Err(self.runtime_error("loop in settable"))
    }

    pub(crate) fn raw_assign(&mut self, table: TableHandle, key: Value, value: Value) -> LuaResult<()> {
        match self.heap.table_mut(table)?.set(key, value) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.runtime_error(e.message())),
        }
    }

    /// Table at `pos` for the raw operations
    fn raw_table(&mut self, pos: i32) -> LuaResult<TableHandle> {
        match self.checked_value(pos)? {
            Value::Table(h) => Ok(h),
            other => {
                let name = self.value_type_name(Some(other));
                Err(self.runtime_error(format!("table expected, got {}", name)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Push a new empty table
    pub fn create_table(&mut self) -> LuaResult<()> {
        self.create_table_with(0, 0)
    }

    /// Push a new table with preallocated array and hash parts
    pub fn create_table_with(&mut self, narr: usize, nrec: usize) -> LuaResult<()> {
        let handle = self.heap.create_table(narr, nrec);
        self.push_raw(Value::Table(handle))
    }

    // ------------------------------------------------------------------
    // Metamethod-aware access
    // ------------------------------------------------------------------

    /// Pop a key and push `t[key]`, where `t` is the value at `pos`
    pub fn get_table(&mut self, pos: i32) -> LuaResult<()> {
        let obj = self.checked_value(pos)?;
        let key = self.stack.pop_value()?;
        let value = self.index_value(obj, key)?;
        self.push_raw(value)
    }

    /// Pop a value and a key (value on top) and assign `t[key] = value`
    pub fn set_table(&mut self, pos: i32) -> LuaResult<()> {
        let obj = self.checked_value(pos)?;
        let pair = self.stack.pop_many(2)?;
        self.new_index(obj, pair[0], pair[1])
    }

    /// Push `t[name]`
    pub fn get_field(&mut self, pos: i32, name: &str) -> LuaResult<()> {
        let obj = self.checked_value(pos)?;
        let key = self.intern_str(name);
        let value = self.index_value(obj, key)?;
        self.push_raw(value)
    }

    /// Pop a value and assign `t[name] = value`
    pub fn set_field(&mut self, pos: i32, name: &str) -> LuaResult<()> {
        let obj = self.checked_value(pos)?;
        let value = self.stack.pop_value()?;
        let key = self.intern_str(name);
        self.new_index(obj, key, value)
    }

    // ------------------------------------------------------------------
    // Raw access
    // ------------------------------------------------------------------

    /// `get_table` without metamethods
    pub fn raw_get(&mut self, pos: i32) -> LuaResult<()> {
        let table = self.raw_table(pos)?;
        let key = self.stack.pop_value()?;
        let value = self.heap.table(table)?.get(&key);
        self.push_raw(value)
    }

    /// `set_table` without metamethods
    pub fn raw_set(&mut self, pos: i32) -> LuaResult<()> {
        let table = self.raw_table(pos)?;
        let pair = self.stack.pop_many(2)?;
        self.raw_assign(table, pair[0], pair[1])
    }

    /// Push `t[n]` without metamethods
    pub fn raw_get_index(&mut self, pos: i32, n: i32) -> LuaResult<()> {
        let table = self.raw_table(pos)?;
        let value = self.heap.table(table)?.get(&Value::Number(n as f64));
        self.push_raw(value)
    }

    /// Pop a value and assign `t[n] = value` without metamethods
    pub fn raw_set_index(&mut self, pos: i32, n: i32) -> LuaResult<()> {
        let table = self.raw_table(pos)?;
        let value = self.stack.pop_value()?;
        self.raw_assign(table, Value::Number(n as f64), value)
    }

    // ------------------------------------------------------------------
    // Length, equality, iteration
    // ------------------------------------------------------------------

    /// Length of the value at `pos`.
    ///
    /// Strings report their byte length and tables their border. A number
    /// is converted to a string in place first. Userdata use `__len` when
    /// present. Everything else has length 0.
    pub fn obj_len(&mut self, pos: i32) -> LuaResult<i32> {
        let value = self.checked_value(pos)?;
        match value {
            Value::String(_) | Value::Number(_) => {
                Ok(self.get_bytes(pos).map_or(0, |b| b.len() as i32))
            }
            Value::Table(h) => Ok(self.heap.table(h)?.border() as i32),
            Value::UserData(_) => match self.metafield(value, MetamethodType::Len) {
                Some(handler) => match self.call_metamethod(handler, &[value])? {
                    Value::Number(n) => Ok(n as i32),
                    _ => Ok(0),
                },
                None => Ok(0),
            },
            _ => Ok(0),
        }
    }

    /// Primitive equality; never runs script code. Invalid indices compare
    /// unequal.
    pub fn raw_equal(&self, a: i32, b: i32) -> bool {
        match (self.value_at(a), self.value_at(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Equality with `__eq` dispatch.
    ///
    /// Two distinct tables (or two distinct userdata) are compared by their
    /// `__eq` handler when both share the same one.
    pub fn equal(&mut self, a: i32, b: i32) -> LuaResult<bool> {
        let (x, y) = match (self.value_at(a), self.value_at(b)) {
            (Some(x), Some(y)) => (x, y),
            _ => return Ok(false),
        };
        if x == y {
            return Ok(true);
        }

        let comparable = matches!(
            (x, y),
            (Value::Table(_), Value::Table(_)) | (Value::UserData(_), Value::UserData(_))
        );
        if !comparable {
            return Ok(false);
        }

        let left = self.metafield(x, MetamethodType::Eq);
        let right = self.metafield(y, MetamethodType::Eq);
        match (left, right) {
            (Some(handler), Some(other)) if handler == other => {
                let result = self.call_metamethod(handler, &[x, y])?;
                Ok(!result.is_falsey())
            }
            _ => Ok(false),
        }
    }

    /// Table traversal step.
    ///
    /// Pops a key (nil to start) and pushes the following key and value,
    /// returning true. Returns false and pushes nothing after the last
    /// entry.
    pub fn next(&mut self, pos: i32) -> LuaResult<bool> {
        let table = self.raw_table(pos)?;
        let key = self.stack.pop_value()?;

        match self.heap.table(table)?.next(&key) {
            Ok(Some((k, v))) => {
                self.push_raw(k)?;
                self.push_raw(v)?;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(()) => Err(self.runtime_error("invalid key to 'next'")),
        }
    }

    // ------------------------------------------------------------------
    // Metatables
    // ------------------------------------------------------------------

    /// Pop a table (or nil) and make it the metatable of the value at `pos`
    pub fn set_metatable(&mut self, pos: i32) -> LuaResult<()> {
        let obj = self.checked_value(pos)?;
        let metatable = match self.stack.pop_value()? {
            Value::Table(mt) => Some(mt),
            Value::Nil => None,
            other => {
                let name = self.value_type_name(Some(other));
                return Err(self.runtime_error(format!("table expected, got {}", name)));
            }
        };

        match obj {
            Value::Table(h) => self.heap.table_mut(h)?.metatable = metatable,
            Value::UserData(h) => self.heap.userdata_mut(h)?.metatable = metatable,
            other => self.types.set_builtin_metatable(other.base_type(), metatable),
        }
        Ok(())
    }

    /// Push the metatable of the value at `pos`. Returns false and pushes
    /// nothing when it has none.
    pub fn get_metatable(&mut self, pos: i32) -> LuaResult<bool> {
        let metatable = self.value_at(pos).and_then(|v| self.metatable_of(v));
        match metatable {
            Some(mt) => {
                self.push_raw(Value::Table(mt))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
