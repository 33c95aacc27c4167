//! CSV and JSON export of the message log

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::log::LogEntry;
use crate::midi::{format_hex, EventKind};

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => anyhow::bail!("Unknown export format: {}", other),
        }
    }
}

const CSV_HEADERS: [&str; 11] = [
    "timestamp",
    "device",
    "channel",
    "type",
    "note",
    "velocity",
    "controller",
    "value",
    "valid",
    "terra",
    "raw",
];

/// Render entries as CSV, one row per entry
///
/// Channels are written 1-based; raw bytes as space separated hex.
pub fn to_csv(entries: &[Arc<LogEntry>]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;

    for entry in entries {
        let event = &entry.event;
        let (controller, value) = match &event.kind {
            EventKind::ControlChange(Some(cc)) => (Some(cc.controller), Some(cc.value as u16)),
            EventKind::PitchBend(Some(pb)) => (None, Some(pb.value)),
            EventKind::ProgramChange(Some(program)) => (None, Some(*program as u16)),
            _ => (None, None),
        };

        writer.write_record([
            event.timestamp.to_rfc3339(),
            event
                .device
                .as_ref()
                .map(|d| d.display_name().to_string())
                .unwrap_or_default(),
            opt(event.channel.map(|c| c + 1)),
            event.type_name().to_string(),
            opt(event.note()),
            opt(event.velocity()),
            opt(controller),
            opt(value),
            event.is_valid_midi.to_string(),
            event.terra_specific.to_string(),
            format_hex(&event.raw_data),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e))?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Render entries as a pretty-printed JSON array
pub fn to_json(entries: &[Arc<LogEntry>]) -> Result<String> {
    serde_json::to_string_pretty(entries).context("Failed to serialize message log")
}

pub fn render(entries: &[Arc<LogEntry>], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => to_csv(entries),
        ExportFormat::Json => to_json(entries),
    }
}

/// Write an export into `dir`, named after the current time
pub fn write_to_dir(
    entries: &[Arc<LogEntry>],
    format: ExportFormat,
    dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;

    let stamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
    let path = dir.join(format!("midi-log-{}.{}", stamp, format.extension()));
    let contents = render(entries, format)?;

    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write export: {}", path.display()))?;
    Ok(path)
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceDescriptor;
    use crate::midi::MessageDecoder;
    use chrono::Utc;

    fn sample() -> Vec<Arc<LogEntry>> {
        let decoder = MessageDecoder::new();
        let device = Arc::new(DeviceDescriptor::input("in-1", "Midi-Terra"));
        [&[0x90u8, 60, 100][..], &[0xB9, 17, 64], &[0xE0, 0x00, 0x40], &[0xF8]]
            .iter()
            .map(|bytes| {
                Arc::new(LogEntry {
                    event: decoder.decode(bytes, Utc::now(), Some(device.clone())),
                    from_target: true,
                    device_confidence: 1.0,
                })
            })
            .collect()
    }

    #[test]
    fn test_csv_export() {
        let csv = to_csv(&sample()).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[0],
            "timestamp,device,channel,type,note,velocity,controller,value,valid,terra,raw"
        );
        assert!(lines[1].ends_with(",Midi-Terra,1,noteOn,60,100,,,true,false,90 3C 64"));
        assert!(lines[2].contains(",10,controlChange,,,17,64,true,true,B9 11 40"));
        assert!(lines[3].contains(",pitchBend,,,,8192,"));
        assert!(lines[4].contains(",,systemRealTime,"));
    }

    #[test]
    fn test_csv_export_empty() {
        let csv = to_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn test_json_export() {
        let json = to_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array[1]["data"]["sensorType"], "distance");
        assert_eq!(array[0]["device"]["name"], "Midi-Terra");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_write_to_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_to_dir(&sample(), ExportFormat::Csv, dir.path()).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "csv");
    }
}
