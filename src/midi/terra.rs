//! Terra sensor protocol heuristics
//!
//! The hardware reports sensor readings as control changes on CC 16-31 and,
//! in its default configuration, plays notes 36-51 on the upper channels.
//! Configuration traffic uses SysEx under the non-commercial manufacturer ID.

use serde::Serialize;

/// Manufacturer prefix (after the leading 0xF0) of Terra SysEx messages
pub const TERRA_SYSEX_PREFIX: [u8; 2] = [0x7D, 0x00];

/// Controllers reserved for sensor channels
pub const SENSOR_CONTROLLERS: std::ops::RangeInclusive<u8> = 16..=31;

/// Channels used by the default Terra configuration (0-based)
pub const TERRA_CHANNELS: std::ops::RangeInclusive<u8> = 8..=15;

/// Notes used by the default Terra configuration (C2 to D#3)
pub const TERRA_NOTES: std::ops::RangeInclusive<u8> = 36..=51;

/// Kind of sensor behind a sensor-channel controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SensorKind {
    Pressure,
    Distance,
    Light,
    Temperature,
    Humidity,
    Acceleration,
    Gyroscope,
    Magnetic,
    /// Sensor-channel controller without a known sensor assignment
    Unclassified,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Pressure => "pressure",
            SensorKind::Distance => "distance",
            SensorKind::Light => "light",
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Acceleration => "acceleration",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Magnetic => "magnetic",
            SensorKind::Unclassified => "unclassified",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller to sensor assignment, in controller order
const SENSOR_TABLE: &[(u8, SensorKind)] = &[
    (16, SensorKind::Pressure),
    (17, SensorKind::Distance),
    (18, SensorKind::Light),
    (19, SensorKind::Temperature),
    (20, SensorKind::Humidity),
    (21, SensorKind::Acceleration),
    (22, SensorKind::Gyroscope),
    (23, SensorKind::Magnetic),
];

/// Sensor kind for a controller, `None` outside the sensor-channel range
pub fn sensor_kind(controller: u8) -> Option<SensorKind> {
    if !SENSOR_CONTROLLERS.contains(&controller) {
        return None;
    }
    let kind = SENSOR_TABLE
        .iter()
        .find(|(cc, _)| *cc == controller)
        .map(|(_, kind)| *kind)
        .unwrap_or(SensorKind::Unclassified);
    Some(kind)
}

/// Channel/note heuristic for channel-voice messages
pub fn matches_default_layout(channel: u8, note: Option<u8>) -> bool {
    TERRA_CHANNELS.contains(&channel) || note.is_some_and(|n| TERRA_NOTES.contains(&n))
}

/// Terra SysEx command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TerraCommand {
    SensorConfig,
    DeviceInfo,
    Calibration,
    Unknown,
}

impl From<u8> for TerraCommand {
    fn from(byte: u8) -> Self {
        match byte {
            0x01 => TerraCommand::SensorConfig,
            0x02 => TerraCommand::DeviceInfo,
            0x03 => TerraCommand::Calibration,
            _ => TerraCommand::Unknown,
        }
    }
}

/// Decoded Terra SysEx message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerraSysEx {
    pub command: u8,
    pub command_name: TerraCommand,
    pub parameters: Vec<u8>,
}

/// Parse a full SysEx frame (starting with 0xF0) carrying the Terra prefix
///
/// Returns `None` for frames from other manufacturers or frames too short
/// to hold a command byte.
pub fn parse_sysex(frame: &[u8]) -> Option<TerraSysEx> {
    if frame.len() < 4 || frame[0] != 0xF0 || frame[1..3] != TERRA_SYSEX_PREFIX {
        return None;
    }

    let command = frame[3];
    let rest = &frame[4..];
    let parameters = rest.strip_suffix(&[0xF7]).unwrap_or(rest).to_vec();

    Some(TerraSysEx {
        command,
        command_name: TerraCommand::from(command),
        parameters,
    })
}
