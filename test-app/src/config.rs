// Config file for serlink-cli.
//
// Example:
//
//   port = "/dev/ttyUSB0"
//   line_ending = "crlf"
//
//   [serial]
//   baud_rate = 9600
//   parity = "even"
//
//   [[commands]]
//   name = "reset"
//   data = "ATZ"
//   format = "text"

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use serlink::{LineEnding, SavedCommand, SerialConfig};

/// Settings loaded from `--config`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub port: Option<String>,
    pub serial: SerialConfig,
    pub line_ending: LineEnding,
    pub commands: Vec<SavedCommand>,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Look up a saved command by name.
    pub fn saved(&self, name: &str) -> Option<&SavedCommand> {
        self.commands.iter().find(|c| c.name == name)
    }
}
