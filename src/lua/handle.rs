//! Typed Handle Wrappers
//!
//! Type-safe wrappers around arena handles, one per heap object kind.

use super::arena::Handle;
use super::value::{Function, LuaString, LuaThread, UserData};
use super::table::Table;

/// Macro to generate typed handle wrappers
macro_rules! typed_handle {
    ($name:ident, $type:ty) => {
        /// Type-safe handle for a heap object
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) Handle<$type>);

        impl $name {
            /// Get the underlying generic handle
            pub(crate) fn inner(&self) -> Handle<$type> {
                self.0
            }
        }

        impl From<Handle<$type>> for $name {
            fn from(handle: Handle<$type>) -> Self {
                $name(handle)
            }
        }
    };
}

typed_handle!(StringHandle, LuaString);
typed_handle!(TableHandle, Table);
typed_handle!(FunctionHandle, Function);
typed_handle!(UserDataHandle, UserData);
typed_handle!(ThreadHandle, LuaThread);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::arena::Arena;

    #[test]
    fn test_typed_handles() {
        let mut string_arena = Arena::default();
        let mut table_arena = Arena::default();

        let str_handle = string_arena.insert(LuaString::from("hello"));
        let table_handle = table_arena.insert(Table::new());

        let typed_str = StringHandle::from(str_handle);
        let typed_table = TableHandle::from(table_handle);

        assert_eq!(typed_str.inner(), str_handle);
        assert_eq!(typed_table.inner(), table_handle);
    }
}
