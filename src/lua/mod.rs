//! Lua embedding interface
//!
//! A stack-based API through which native code drives a Lua-style VM. The
//! heap uses generational arenas, so stale handles are detected instead of
//! dangling, and userdata invalidation is a plain field write.

mod access;
mod arena;
mod call;
mod error;
mod handle;
mod heap;
mod metamethod;
mod reference;
mod registry;
mod stack;
mod state;
mod table;
mod userdata;
mod value;

pub use self::call::MULTRET;
pub use self::error::{CallStatus, LuaError, LuaResult, RaisedError};
pub use self::metamethod::MetamethodType;
pub use self::reference::{RefId, NO_REF, REF_NIL};
pub use self::stack::{upvalue_index, ENVIRON_INDEX, GLOBALS_INDEX, REGISTRY_INDEX};
pub use self::state::{LuaState, Special};
pub use self::value::{Angle, NativeFunction, Type, TypeId, Value, Vector, FIRST_USER_TYPE};
