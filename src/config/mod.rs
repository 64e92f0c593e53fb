//! Configuration module for luabase
//!
//! An engine instance is configured by an [`EngineConfig`], built either
//! from defaults or from a configuration file.

mod parser;

pub use parser::{parse_config_file, parse_config_str, ConfigParseError};

use std::path::PathBuf;

/// Main configuration structure for an engine instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    /// Resource limits enforced by the state
    pub limits: ResourceLimits,

    /// Logging configuration
    pub logging: LogConfig,
}

/// Resource limits configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    /// Maximum number of values on the shared stack
    pub max_stack_size: usize,

    /// Maximum nesting of native calls
    pub max_call_depth: usize,

    /// Maximum number of `__index`/`__newindex` hops for one access
    pub max_metamethod_chain: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        ResourceLimits {
            max_stack_size: 8000,
            max_call_depth: 200,
            max_metamethod_chain: 100,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogConfig {
    /// Threshold for the crate's own events
    pub level: LogLevel,

    /// Output layout
    pub format: LogFormat,
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,

    /// Default level
    #[default]
    Warn,

    Info,

    Debug,

    /// Most verbose
    Trace,
}

impl LogLevel {
    /// Directive name understood by `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub fn from_name(name: &str) -> Option<LogLevel> {
        match name.to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// Log output layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single-line events
    #[default]
    Compact,

    /// Multi-line events with targets and timestamps
    Pretty,
}

impl EngineConfig {
    /// Load configuration from a file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigParseError> {
        let path = path.into();
        parse_config_file(&path)
    }

    /// Override the resource limits
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}
