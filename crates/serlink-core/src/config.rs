//! Link configuration and persisted operator records.
//!
//! [`SerialConfig`] is the record exchanged with the configuration
//! loader/saver. It serializes with plain names (`"none"`, `"even"`) and
//! numeric bit counts so it can be stored as JSON or TOML unchanged:
//!
//! ```
//! use serlink_core::config::{Parity, SerialConfig};
//!
//! let config: SerialConfig = serde_json::from_str(
//!     r#"{"baud_rate":9600,"data_bits":7,"stop_bits":2,"parity":"even","flow_control":"none"}"#,
//! ).unwrap();
//! assert_eq!(config.parity, Parity::Even);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{self, DataFormat};
use crate::error::Result;

/// Baud rates offered by default in operator tooling.
pub const STANDARD_BAUD_RATES: &[u32] = &[
    300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115_200, 230_400, 460_800, 921_600,
];

/// Serial link configuration.
///
/// Defaults to 115200 baud, 8 data bits, 1 stop bit, no parity and no flow
/// control. Missing fields deserialize to those defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate (e.g. 9600, 115200). Must be non-zero at connect time.
    pub baud_rate: u32,
    /// Number of data bits per character.
    pub data_bits: DataBits,
    /// Number of stop bits per character.
    pub stop_bits: StopBits,
    /// Parity checking mode.
    pub parity: Parity,
    /// Flow control mode.
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl fmt::Display for SerialConfig {
    /// Renders the conventional short form, e.g. `115200 8N1`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate,
            u8::from(self.data_bits),
            parity,
            u8::from(self.stop_bits)
        )?;
        if self.flow_control == FlowControl::Hardware {
            write!(f, " RTS/CTS")?;
        }
        Ok(())
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Seven,
    Eight,
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(bits: u8) -> std::result::Result<Self, Self::Error> {
        match bits {
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(format!("unsupported data bits: {other} (expected 7 or 8)")),
        }
    }
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(bits: u8) -> std::result::Result<Self, Self::Error> {
        match bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(format!("unsupported stop bits: {other} (expected 1 or 2)")),
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Hardware,
}

/// A named, reusable payload kept by the operator.
///
/// The persistence collaborator owns storage; the core only turns the record
/// into bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCommand {
    pub name: String,
    pub data: String,
    pub format: DataFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SavedCommand {
    /// Encode the stored payload according to its format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        codec::encode_payload(&self.data, self.format, codec::LineEnding::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.flow_control, FlowControl::None);
    }

    #[test]
    fn serial_config_display() {
        assert_eq!(SerialConfig::default().to_string(), "115200 8N1");

        let config = SerialConfig {
            baud_rate: 9600,
            data_bits: DataBits::Seven,
            stop_bits: StopBits::Two,
            parity: Parity::Even,
            flow_control: FlowControl::Hardware,
        };
        assert_eq!(config.to_string(), "9600 7E2 RTS/CTS");
    }

    #[test]
    fn serial_config_json_shape() {
        let json = serde_json::to_value(SerialConfig::default()).unwrap();
        assert_eq!(json["data_bits"], 8);
        assert_eq!(json["stop_bits"], 1);
        assert_eq!(json["parity"], "none");
        assert_eq!(json["flow_control"], "none");
    }

    #[test]
    fn serial_config_from_toml() {
        let config: SerialConfig = toml::from_str(
            "baud_rate = 19200\ndata_bits = 7\nstop_bits = 1\nparity = \"odd\"\nflow_control = \"hardware\"\n",
        )
        .unwrap();
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.data_bits, DataBits::Seven);
        assert_eq!(config.parity, Parity::Odd);
        assert_eq!(config.flow_control, FlowControl::Hardware);
    }

    #[test]
    fn serial_config_partial_toml_uses_defaults() {
        let config: SerialConfig = toml::from_str("baud_rate = 9600\n").unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
    }

    #[test]
    fn serial_config_rejects_unsupported_bits() {
        let result: std::result::Result<SerialConfig, _> = serde_json::from_str(
            r#"{"baud_rate":9600,"data_bits":5,"stop_bits":1,"parity":"none","flow_control":"none"}"#,
        );
        assert!(result.is_err());

        assert!(StopBits::try_from(3).is_err());
        assert_eq!(DataBits::try_from(7), Ok(DataBits::Seven));
    }

    #[test]
    fn standard_baud_rates_sorted() {
        assert!(STANDARD_BAUD_RATES.windows(2).all(|w| w[0] < w[1]));
        assert!(STANDARD_BAUD_RATES.contains(&115_200));
    }

    #[test]
    fn saved_command_hex_to_bytes() {
        let cmd = SavedCommand {
            name: "ping".into(),
            data: "AA 55 01".into(),
            format: DataFormat::Hex,
            description: None,
        };
        assert_eq!(cmd.to_bytes().unwrap(), vec![0xAA, 0x55, 0x01]);
    }

    #[test]
    fn saved_command_text_round_trips_through_json() {
        let cmd = SavedCommand {
            name: "version".into(),
            data: "AT+GMR".into(),
            format: DataFormat::Text,
            description: Some("firmware version".into()),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains(r#""format":"text""#));
        let back: SavedCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
        assert_eq!(back.to_bytes().unwrap(), b"AT+GMR");
    }
}
