//! Lua Heap Implementation
//!
//! The heap owns every collectable object. Strings are interned, so two
//! string values are equal exactly when their handles are. Collection is a
//! stop-the-world mark and sweep driven by an explicit root set; it never
//! touches the native pointers held by userdata.

use super::arena::Arena;
use super::error::{LuaError, LuaResult};
use super::handle::{FunctionHandle, StringHandle, TableHandle, ThreadHandle, UserDataHandle};
use super::table::Table;
use super::value::{Function, LuaString, LuaThread, UserData, Value};
use std::collections::{HashMap, HashSet};

/// The main Lua heap containing all allocated objects
pub struct LuaHeap {
    /// Arena for string storage
    strings: Arena<LuaString>,

    /// String interning cache for deduplication
    string_cache: HashMap<Vec<u8>, StringHandle>,

    /// Arena for table storage
    tables: Arena<Table>,

    /// Arena for function storage
    functions: Arena<Function>,

    /// Arena for userdata storage
    userdata: Arena<UserData>,

    /// Arena for thread storage
    threads: Arena<LuaThread>,
}

/// Objects reached during the mark phase
#[derive(Default)]
struct MarkSet {
    strings: HashSet<StringHandle>,
    tables: HashSet<TableHandle>,
    functions: HashSet<FunctionHandle>,
    userdata: HashSet<UserDataHandle>,
    threads: HashSet<ThreadHandle>,
}

impl LuaHeap {
    /// Create a new empty heap
    pub fn new() -> Self {
        LuaHeap {
            strings: Arena::with_capacity(256),
            string_cache: HashMap::with_capacity(256),
            tables: Arena::with_capacity(64),
            functions: Arena::with_capacity(32),
            userdata: Arena::with_capacity(16),
            threads: Arena::with_capacity(1),
        }
    }

    /// Intern a byte string
    pub fn intern(&mut self, bytes: &[u8]) -> StringHandle {
        if let Some(&handle) = self.string_cache.get(bytes) {
            return handle;
        }

        let handle = StringHandle::from(self.strings.insert(LuaString::from_bytes(bytes.to_vec())));
        self.string_cache.insert(bytes.to_vec(), handle);
        handle
    }

    pub fn string(&self, handle: StringHandle) -> LuaResult<&LuaString> {
        self.strings.get(handle.inner()).ok_or(LuaError::StaleHandle)
    }

    pub fn create_table(&mut self, array_cap: usize, map_cap: usize) -> TableHandle {
        TableHandle::from(self.tables.insert(Table::with_capacity(array_cap, map_cap)))
    }

    pub fn table(&self, handle: TableHandle) -> LuaResult<&Table> {
        self.tables.get(handle.inner()).ok_or(LuaError::StaleHandle)
    }

    pub fn table_mut(&mut self, handle: TableHandle) -> LuaResult<&mut Table> {
        self.tables.get_mut(handle.inner()).ok_or(LuaError::StaleHandle)
    }

    pub fn create_function(&mut self, function: Function) -> FunctionHandle {
        FunctionHandle::from(self.functions.insert(function))
    }

    pub fn function(&self, handle: FunctionHandle) -> LuaResult<&Function> {
        self.functions.get(handle.inner()).ok_or(LuaError::StaleHandle)
    }

    pub fn function_mut(&mut self, handle: FunctionHandle) -> LuaResult<&mut Function> {
        self.functions.get_mut(handle.inner()).ok_or(LuaError::StaleHandle)
    }

    pub fn create_userdata(&mut self, userdata: UserData) -> UserDataHandle {
        UserDataHandle::from(self.userdata.insert(userdata))
    }

    pub fn userdata(&self, handle: UserDataHandle) -> LuaResult<&UserData> {
        self.userdata.get(handle.inner()).ok_or(LuaError::StaleHandle)
    }

    pub fn userdata_mut(&mut self, handle: UserDataHandle) -> LuaResult<&mut UserData> {
        self.userdata.get_mut(handle.inner()).ok_or(LuaError::StaleHandle)
    }

    pub fn create_thread(&mut self, thread: LuaThread) -> ThreadHandle {
        ThreadHandle::from(self.threads.insert(thread))
    }

    /// Check if the object behind a value is still allocated
    pub fn is_live(&self, value: &Value) -> bool {
        match value {
            Value::String(h) => self.strings.contains(h.inner()),
            Value::Table(h) => self.tables.contains(h.inner()),
            Value::Function(h) => self.functions.contains(h.inner()),
            Value::UserData(h) => self.userdata.contains(h.inner()),
            Value::Thread(h) => self.threads.contains(h.inner()),
            _ => true,
        }
    }

    /// Number of live heap objects
    pub fn object_count(&self) -> usize {
        self.strings.len() + self.tables.len() + self.functions.len() + self.userdata.len() + self.threads.len()
    }

    /// Free every object unreachable from `roots`.
    ///
    /// Returns the number of freed objects.
    pub fn collect<I>(&mut self, roots: I) -> usize
    where
        I: IntoIterator<Item = Value>,
    {
        let marks = self.mark(roots);

        let mut freed = 0;
        freed += self.strings.retain(|h, _| marks.strings.contains(&StringHandle::from(h)));
        freed += self.tables.retain(|h, _| marks.tables.contains(&TableHandle::from(h)));
        freed += self.functions.retain(|h, _| marks.functions.contains(&FunctionHandle::from(h)));
        freed += self.userdata.retain(|h, _| marks.userdata.contains(&UserDataHandle::from(h)));
        freed += self.threads.retain(|h, _| marks.threads.contains(&ThreadHandle::from(h)));

        self.string_cache.retain(|_, h| marks.strings.contains(h));

        freed
    }

    fn mark<I>(&self, roots: I) -> MarkSet
    where
        I: IntoIterator<Item = Value>,
    {
        let mut marks = MarkSet::default();
        let mut pending: Vec<Value> = roots.into_iter().collect();

        while let Some(value) = pending.pop() {
            match value {
                Value::String(h) => {
                    marks.strings.insert(h);
                }
                Value::Table(h) => {
                    if !marks.tables.insert(h) {
                        continue;
                    }
                    if let Some(table) = self.tables.get(h.inner()) {
                        for (k, v) in table.pairs() {
                            pending.push(k);
                            pending.push(v);
                        }
                        if let Some(mt) = table.metatable {
                            pending.push(Value::Table(mt));
                        }
                    }
                }
                Value::Function(h) => {
                    if !marks.functions.insert(h) {
                        continue;
                    }
                    if let Some(function) = self.functions.get(h.inner()) {
                        pending.extend(function.upvalues.iter().copied());
                    }
                }
                Value::UserData(h) => {
                    if !marks.userdata.insert(h) {
                        continue;
                    }
                    if let Some(mt) = self.userdata.get(h.inner()).and_then(|u| u.metatable) {
                        pending.push(Value::Table(mt));
                    }
                }
                Value::Thread(h) => {
                    marks.threads.insert(h);
                }
                _ => {}
            }
        }

        marks
    }
}

impl Default for LuaHeap {
    fn default() -> Self {
        Self::new()
    }
}
