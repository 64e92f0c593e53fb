//! Configuration file parser
//!
//! Files hold one `parameter value` pair per line. Blank lines and lines
//! starting with `#` are ignored; parameter names are case-insensitive.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use super::{EngineConfig, LogFormat, LogLevel};

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigParseError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid line format
    #[error("Invalid line format at line {0}: {1}")]
    Format(usize, String),

    /// Invalid parameter value
    #[error("Invalid value for parameter '{0}' at line {1}: {2}")]
    Value(String, usize, String),

    /// Unknown parameter
    #[error("Unknown parameter '{0}' at line {1}")]
    UnknownParam(String, usize),
}

/// Parse a configuration file
pub fn parse_config_file(path: &Path) -> Result<EngineConfig, ConfigParseError> {
    let file = File::open(path)?;
    parse_lines(BufReader::new(file).lines())
}

/// Parse configuration text
pub fn parse_config_str(text: &str) -> Result<EngineConfig, ConfigParseError> {
    parse_lines(text.lines().map(|l| Ok(l.to_string())))
}

fn parse_lines<I>(lines: I) -> Result<EngineConfig, ConfigParseError>
where
    I: Iterator<Item = io::Result<String>>,
{
    let mut config = EngineConfig::default();

    for (line_num, line_result) in lines.enumerate() {
        let line = line_result?;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.splitn(2, char::is_whitespace).collect();
        if parts.len() != 2 {
            return Err(ConfigParseError::Format(line_num + 1, line.to_string()));
        }

        let param = parts[0].trim().to_lowercase();
        let value = parts[1].trim();

        apply_config_param(&mut config, &param, value, line_num + 1)?;
    }

    Ok(config)
}

/// Apply a configuration parameter to the config
fn apply_config_param(
    config: &mut EngineConfig,
    param: &str,
    value: &str,
    line_num: usize,
) -> Result<(), ConfigParseError> {
    match param {
        // Limits
        "max-stack-size" => {
            config.limits.max_stack_size = parse_limit(param, value, line_num)?;
        }
        "max-call-depth" => {
            config.limits.max_call_depth = parse_limit(param, value, line_num)?;
        }
        "metamethod-chain-limit" => {
            config.limits.max_metamethod_chain = parse_limit(param, value, line_num)?;
        }

        // Logging
        "loglevel" => {
            config.logging.level = LogLevel::from_name(value)
                .ok_or_else(|| ConfigParseError::Value(param.to_string(), line_num, value.to_string()))?;
        }
        "log-format" => {
            config.logging.format = match value.to_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "pretty" => LogFormat::Pretty,
                _ => return Err(ConfigParseError::Value(param.to_string(), line_num, value.to_string())),
            };
        }

        _ => return Err(ConfigParseError::UnknownParam(param.to_string(), line_num)),
    }

    Ok(())
}

/// Parse a strictly positive limit
fn parse_limit(param: &str, value: &str, line_num: usize) -> Result<usize, ConfigParseError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigParseError::Value(param.to_string(), line_num, value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_config() {
        let config_content = r#"
# Engine limits
max-stack-size 512
max-call-depth 32

metamethod-chain-limit 8
loglevel debug
log-format pretty
"#;

        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();
        write(path, config_content).unwrap();

        let config = parse_config_file(path).unwrap();

        assert_eq!(config.limits.max_stack_size, 512);
        assert_eq!(config.limits.max_call_depth, 32);
        assert_eq!(config.limits.max_metamethod_chain, 8);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_missing_keys_keep_defaults() {
        let config = parse_config_str("MAX-CALL-DEPTH 10\n").unwrap();
        assert_eq!(config.limits.max_call_depth, 10);
        assert_eq!(config.limits.max_stack_size, 8000);
    }

    #[test]
    fn test_invalid_config() {
        match parse_config_str("max-stack-size 0") {
            Err(ConfigParseError::Value(param, line, _)) => {
                assert_eq!(param, "max-stack-size");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(matches!(
            parse_config_str("# comment\nloglevel loud"),
            Err(ConfigParseError::Value(_, 2, _))
        ));
        assert!(matches!(
            parse_config_str("maxmemory 100mb"),
            Err(ConfigParseError::UnknownParam(_, 1))
        ));
        assert!(matches!(
            parse_config_str("loglevel"),
            Err(ConfigParseError::Format(1, _))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = parse_config_file(&dir.path().join("absent.conf"));
        assert!(matches!(result, Err(ConfigParseError::Io(_))));
    }
}
