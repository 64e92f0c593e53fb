//! luabase library
//!
//! This file exposes the public API of luabase: the [`LuaState`] embedding
//! interface, its configuration and logging setup.

pub mod config;
pub mod logging;
pub mod lua;

// Re-export commonly used types
pub use config::{EngineConfig, LogConfig, ResourceLimits};
pub use lua::{CallStatus, LuaError, LuaResult, LuaState, Type};
