//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{GdbError, Result};

/// Settings that shape the commands the engine issues on its own behalf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prepended to engine-issued commands to keep them out of gdb's history
    pub server_prefix: String,
    /// Route debuggee output to its own destination instead of the transcript
    pub separate_io: bool,
    /// Use `info all-registers` for the register view
    pub all_registers: bool,
    pub memory: MemoryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_prefix: "server ".to_string(),
            separate_io: false,
            all_registers: false,
            memory: MemoryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GdbError::ConfigError(e.to_string()))
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Memory view settings, rendered as `x/{count}{format}{unit} {address}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Start address expression; the memory view is idle while unset
    pub address: Option<String>,
    pub count: u32,
    pub format: MemoryFormat,
    pub unit: MemoryUnit,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            address: None,
            count: 32,
            format: MemoryFormat::Hex,
            unit: MemoryUnit::Word,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryFormat {
    Hex,
    Octal,
    Decimal,
    Unsigned,
    Binary,
    Char,
}

impl MemoryFormat {
    pub fn letter(self) -> char {
        match self {
            MemoryFormat::Hex => 'x',
            MemoryFormat::Octal => 'o',
            MemoryFormat::Decimal => 'd',
            MemoryFormat::Unsigned => 'u',
            MemoryFormat::Binary => 't',
            MemoryFormat::Char => 'c',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryUnit {
    Byte,
    Halfword,
    Word,
    Giant,
}

impl MemoryUnit {
    pub fn letter(self) -> char {
        match self {
            MemoryUnit::Byte => 'b',
            MemoryUnit::Halfword => 'h',
            MemoryUnit::Word => 'w',
            MemoryUnit::Giant => 'g',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.server_prefix, "server ");
        assert!(!config.separate_io);
        assert_eq!(config.memory.count, 32);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{"separate_io": true, "memory": {"address": "&buf", "unit": "byte"}}"#,
        )
        .unwrap();

        assert!(config.separate_io);
        assert_eq!(config.server_prefix, "server ");
        assert_eq!(config.memory.address.as_deref(), Some("&buf"));
        assert_eq!(config.memory.unit, MemoryUnit::Byte);
        assert_eq!(config.memory.format, MemoryFormat::Hex);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = EngineConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, GdbError::ConfigError(_)));
    }
}
