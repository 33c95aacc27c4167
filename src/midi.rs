//! MIDI utilities and message types
//!
//! Provides MIDI message decoding, the decoded event model and hex helpers.

pub mod decoder;
pub mod event;
pub mod notes;
pub mod terra;

pub use decoder::MessageDecoder;
pub use event::{EventKind, MidiEvent, RawFrame, RealTimeKind};
pub use terra::SensorKind;

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a hex string such as "90 3C 64", "0x90,0x3C,0x64" or "903c64"
pub fn parse_hex(input: &str) -> anyhow::Result<Vec<u8>> {
    let cleaned: String = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| token.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();

    hex::decode(&cleaned).map_err(|e| anyhow::anyhow!("Invalid hex bytes '{}': {}", input, e))
}
