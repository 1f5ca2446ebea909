//! Byte codec: text and hex conversions plus display formatting.
//!
//! These are the conversions every surface of the application needs when
//! turning operator input into bytes and device output into something
//! readable. Hex renderings are always uppercase, space-separated pairs
//! (`"01 0A FF"`).

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How an operator payload is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// UTF-8 text.
    #[default]
    Text,
    /// Hex digit pairs, whitespace ignored.
    Hex,
}

/// Line terminator appended to text payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    None,
    Lf,
    Cr,
    CrLf,
}

impl LineEnding {
    /// The terminator as a string slice.
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::None => "",
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// UTF-8 encode `text`. The empty string encodes to no bytes.
pub fn text_to_bytes(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Returns `true` for the control characters that must never reach a display.
///
/// TAB, LF and CR are allowed through.
fn is_unprintable(c: char) -> bool {
    matches!(
        c,
        '\u{00}'..='\u{08}' | '\u{0B}'..='\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}'..='\u{9F}'
    )
}

/// Decode `bytes` for display.
///
/// Invalid UTF-8 sequences are replaced rather than rejected. If the decoded
/// text contains an unprintable control character, the text is discarded and
/// the hex rendering of `bytes` is returned instead.
///
/// ```
/// use serlink_core::codec::bytes_to_text;
///
/// assert_eq!(bytes_to_text(b"OK\r\n"), "OK\r\n");
/// assert_eq!(bytes_to_text(&[0x02, 0x41, 0x03]), "02 41 03");
/// ```
pub fn bytes_to_text(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    let text = String::from_utf8_lossy(bytes);
    if text.chars().any(is_unprintable) {
        return bytes_to_hex(bytes);
    }
    text.into_owned()
}

/// Parse hex digit pairs into bytes.
///
/// Every character that is not a hex digit (spaces, commas, newlines) is
/// dropped before pairing. An empty input yields no bytes.
///
/// # Errors
///
/// [`Error::Format`] when the input is non-empty but contains no hex digits,
/// when the digit count is odd, or when a pair fails to decode.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    if hex.is_empty() {
        return Ok(Vec::new());
    }

    let cleaned: String = hex.chars().filter(char::is_ascii_hexdigit).collect();
    if cleaned.is_empty() {
        return Err(Error::Format("hex string is empty".into()));
    }
    if cleaned.len() % 2 != 0 {
        return Err(Error::Format(format!(
            "hex string must have an even number of digits, got {}",
            cleaned.len()
        )));
    }

    hex::decode(&cleaned).map_err(|e| Error::Format(format!("invalid hex value: {e}")))
}

/// Render `bytes` as uppercase hex pairs separated by single spaces.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{b:02X}"));
    }
    out
}

/// Returns `true` if `hex`, once whitespace is removed, is a non-empty, even
/// length run of hex digits.
///
/// Stricter than [`hex_to_bytes`]: any non-hex, non-whitespace character
/// makes the input invalid.
pub fn is_valid_hex(hex: &str) -> bool {
    let cleaned: Vec<char> = hex.chars().filter(|c| !c.is_whitespace()).collect();
    !cleaned.is_empty() && cleaned.len() % 2 == 0 && cleaned.iter().all(char::is_ascii_hexdigit)
}

/// Format a byte count with base-1024 units and two decimals.
///
/// ```
/// use serlink_core::codec::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    match bytes {
        0 => return "0 B".to_string(),
        1 => return "1 B".to_string(),
        _ => {}
    }

    let mut unit = 0;
    let mut scale = 1u64;
    while unit < UNITS.len() - 1 && bytes >= scale * 1024 {
        scale *= 1024;
        unit += 1;
    }
    format!("{:.2} {}", bytes as f64 / scale as f64, UNITS[unit])
}

/// Format a timestamp as local `HH:MM:SS.mmm`.
pub fn format_timestamp(ts: &DateTime<Local>) -> String {
    ts.format("%H:%M:%S%.3f").to_string()
}

/// Encode an operator payload in the given format.
///
/// The line ending is appended to text payloads only; hex payloads are sent
/// exactly as written.
pub fn encode_payload(data: &str, format: DataFormat, line_ending: LineEnding) -> Result<Vec<u8>> {
    match format {
        DataFormat::Text => {
            let mut bytes = text_to_bytes(data);
            bytes.extend_from_slice(line_ending.as_str().as_bytes());
            Ok(bytes)
        }
        DataFormat::Hex => hex_to_bytes(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn text_to_bytes_utf8() {
        assert_eq!(text_to_bytes("AT"), b"AT");
        assert_eq!(text_to_bytes("é"), vec![0xC3, 0xA9]);
        assert!(text_to_bytes("").is_empty());
    }

    #[test]
    fn bytes_to_text_printable() {
        assert_eq!(bytes_to_text(b"hello\tworld\r\n"), "hello\tworld\r\n");
        assert_eq!(bytes_to_text(&[]), "");
    }

    #[test]
    fn bytes_to_text_control_chars_fall_back_to_hex() {
        assert_eq!(bytes_to_text(&[0x00]), "00");
        assert_eq!(bytes_to_text(&[0x41, 0x0B]), "41 0B");
        assert_eq!(bytes_to_text(&[0x1B, 0x5B]), "1B 5B");
        assert_eq!(bytes_to_text(&[0x7F]), "7F");
        // U+0085 (NEL) sits in the C1 range.
        assert_eq!(bytes_to_text(&[0xC2, 0x85]), "C2 85");
    }

    #[test]
    fn bytes_to_text_invalid_utf8_is_replaced() {
        // 0xFF is replaced with U+FFFD, which is printable.
        assert_eq!(bytes_to_text(&[0x41, 0xFF]), "A\u{FFFD}");
    }

    #[test]
    fn hex_to_bytes_spaced() {
        assert_eq!(hex_to_bytes("01 02 03").unwrap(), vec![0x01, 0x02, 0x03]);
        assert_eq!(hex_to_bytes("aBcD").unwrap(), vec![0xAB, 0xCD]);
        assert_eq!(hex_to_bytes("01,02\n03").unwrap(), vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn hex_to_bytes_errors() {
        assert!(matches!(hex_to_bytes("zz"), Err(Error::Format(_))));
        assert!(matches!(hex_to_bytes("   "), Err(Error::Format(_))));
        assert!(matches!(hex_to_bytes("0"), Err(Error::Format(_))));
        assert!(matches!(hex_to_bytes("01 2"), Err(Error::Format(_))));
    }

    #[test]
    fn hex_to_bytes_empty_input() {
        assert!(hex_to_bytes("").unwrap().is_empty());
    }

    #[test]
    fn bytes_to_hex_uppercase_spaced() {
        assert_eq!(bytes_to_hex(&[0x01, 0xAB, 0xFF]), "01 AB FF");
        assert_eq!(bytes_to_hex(&[]), "");
    }

    #[test]
    fn hex_normalises_case_and_spacing() {
        let bytes = hex_to_bytes("0a0B  ff").unwrap();
        assert_eq!(bytes_to_hex(&bytes), "0A 0B FF");
    }

    #[test]
    fn is_valid_hex_cases() {
        assert!(is_valid_hex("01 02 03"));
        assert!(is_valid_hex("deadBEEF"));
        assert!(!is_valid_hex("0G"));
        assert!(!is_valid_hex("0"));
        assert!(!is_valid_hex(""));
        assert!(!is_valid_hex("  "));
        assert!(!is_valid_hex("01,02"));
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1), "1 B");
        assert_eq!(format_bytes(2), "2.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024 * 5 / 2), "2.50 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn format_bytes_clamps_at_gb() {
        assert_eq!(format_bytes(2048 * 1024 * 1024 * 1024), "2048.00 GB");
    }

    #[test]
    fn format_timestamp_millis() {
        let ts = Local
            .with_ymd_and_hms(2024, 3, 1, 9, 5, 7)
            .single()
            .unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(format_timestamp(&ts), "09:05:07.042");
    }

    #[test]
    fn encode_payload_text_with_line_ending() {
        assert_eq!(
            encode_payload("AT", DataFormat::Text, LineEnding::CrLf).unwrap(),
            b"AT\r\n"
        );
        assert_eq!(
            encode_payload("AT", DataFormat::Text, LineEnding::None).unwrap(),
            b"AT"
        );
    }

    #[test]
    fn encode_payload_hex_ignores_line_ending() {
        assert_eq!(
            encode_payload("0D 0A", DataFormat::Hex, LineEnding::Lf).unwrap(),
            vec![0x0D, 0x0A]
        );
        assert!(encode_payload("XYZ", DataFormat::Hex, LineEnding::None).is_err());
    }
}
