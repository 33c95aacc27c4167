//! Decoded MIDI event model

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::terra::{SensorKind, TerraSysEx};
use crate::device::DeviceDescriptor;

/// Raw bytes as captured from a MIDI input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub bytes: Vec<u8>,
}

impl RawFrame {
    pub fn new(device_id: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: Utc::now(),
            bytes: bytes.to_vec(),
        }
    }
}

/// A decoded MIDI message
///
/// Built once by [`super::MessageDecoder`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiEvent {
    pub timestamp: DateTime<Utc>,
    pub raw_data: Vec<u8>,
    pub is_valid_midi: bool,
    /// Channel (0-15), only for channel-voice messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    pub terra_specific: bool,
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Arc<DeviceDescriptor>>,
}

/// Message type with its type-specific fields
///
/// Payloads are `None` when the frame was too short to carry them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum EventKind {
    Empty,
    NoteOff(Option<NoteData>),
    NoteOn(Option<NoteData>),
    PolyAftertouch(Option<PolyAftertouchData>),
    ControlChange(Option<ControlChangeData>),
    ProgramChange(Option<u8>),
    ChannelAftertouch(Option<ChannelAftertouchData>),
    PitchBend(Option<PitchBendData>),
    SystemRealTime(RealTimeKind),
    Sysex(SysExData),
    MtcQuarterFrame(Option<QuarterFrameData>),
    SongPosition(Option<u16>),
    SongSelect(Option<u8>),
    TuneRequest,
    /// Undefined system common status (0xF4, 0xF5, 0xF7)
    SystemCommon,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pitch {
    pub note: u8,
    pub note_name: &'static str,
    pub octave: i8,
    pub frequency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteData {
    #[serde(flatten)]
    pub pitch: Pitch,
    pub velocity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolyAftertouchData {
    #[serde(flatten)]
    pub pitch: Pitch,
    pub pressure: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlChangeData {
    pub controller: u8,
    pub controller_name: &'static str,
    pub value: u8,
    /// value / 127
    pub normalized_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<SensorKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAftertouchData {
    pub pressure: u8,
    pub normalized_pressure: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchBendData {
    pub lsb: u8,
    pub msb: u8,
    /// 14-bit value, center 8192
    pub value: u16,
    /// -1.0 ..= +1.0
    pub bend_value: f64,
    /// Assumes a +/-2 semitone bend range
    pub cents: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterFrameData {
    pub nibble: u8,
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SysExData {
    /// Bytes between 0xF0 and the terminating 0xF7
    pub payload: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terra: Option<TerraSysEx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RealTimeKind {
    Clock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    Reset,
    Unknown,
}

impl EventKind {
    /// Wire name of the message type, as used in JSON and CSV output
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Empty => "empty",
            EventKind::NoteOff(_) => "noteOff",
            EventKind::NoteOn(_) => "noteOn",
            EventKind::PolyAftertouch(_) => "polyAftertouch",
            EventKind::ControlChange(_) => "controlChange",
            EventKind::ProgramChange(_) => "programChange",
            EventKind::ChannelAftertouch(_) => "channelAftertouch",
            EventKind::PitchBend(_) => "pitchBend",
            EventKind::SystemRealTime(_) => "systemRealTime",
            EventKind::Sysex(_) => "sysex",
            EventKind::MtcQuarterFrame(_) => "mtcQuarterFrame",
            EventKind::SongPosition(_) => "songPosition",
            EventKind::SongSelect(_) => "songSelect",
            EventKind::TuneRequest => "tuneRequest",
            EventKind::SystemCommon => "systemCommon",
            EventKind::Unknown => "unknown",
        }
    }
}

impl MidiEvent {
    pub fn type_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Note number for note and poly aftertouch events
    pub fn note(&self) -> Option<u8> {
        self.pitch().map(|p| p.note)
    }

    pub fn pitch(&self) -> Option<&Pitch> {
        match &self.kind {
            EventKind::NoteOn(Some(n)) | EventKind::NoteOff(Some(n)) => Some(&n.pitch),
            EventKind::PolyAftertouch(Some(p)) => Some(&p.pitch),
            _ => None,
        }
    }

    pub fn velocity(&self) -> Option<u8> {
        match &self.kind {
            EventKind::NoteOn(Some(n)) | EventKind::NoteOff(Some(n)) => Some(n.velocity),
            _ => None,
        }
    }

    pub fn control_change(&self) -> Option<&ControlChangeData> {
        match &self.kind {
            EventKind::ControlChange(Some(cc)) => Some(cc),
            _ => None,
        }
    }

    pub fn is_channel_message(&self) -> bool {
        self.channel.is_some()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.id.as_str())
    }
}

impl std::fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ch = self.channel.map(|c| c + 1).unwrap_or(0);
        match &self.kind {
            EventKind::NoteOn(Some(n)) => write!(
                f,
                "NoteOn ch:{} {} ({}) v:{}",
                ch, n.pitch.note_name, n.pitch.note, n.velocity
            ),
            EventKind::NoteOff(Some(n)) => write!(
                f,
                "NoteOff ch:{} {} ({}) v:{}",
                ch, n.pitch.note_name, n.pitch.note, n.velocity
            ),
            EventKind::PolyAftertouch(Some(p)) => write!(
                f,
                "PolyAftertouch ch:{} {} p:{}",
                ch, p.pitch.note_name, p.pressure
            ),
            EventKind::ControlChange(Some(cc)) => {
                write!(f, "CC ch:{} {} ({}) v:{}", ch, cc.controller_name, cc.controller, cc.value)?;
                if let Some(sensor) = cc.sensor_type {
                    write!(f, " [{}]", sensor)?;
                }
                Ok(())
            }
            EventKind::ProgramChange(Some(program)) => {
                write!(f, "ProgramChange ch:{} p:{}", ch, program)
            }
            EventKind::ChannelAftertouch(Some(at)) => {
                write!(f, "ChannelAftertouch ch:{} p:{}", ch, at.pressure)
            }
            EventKind::PitchBend(Some(pb)) => write!(
                f,
                "PitchBend ch:{} v:{} ({:+.1} cents)",
                ch, pb.value, pb.cents
            ),
            EventKind::SystemRealTime(kind) => write!(f, "RealTime {:?}", kind),
            EventKind::Sysex(sysex) => match &sysex.terra {
                Some(terra) => write!(f, "SysEx Terra {:?}", terra.command_name),
                None => write!(f, "SysEx {} bytes", sysex.payload.len()),
            },
            EventKind::MtcQuarterFrame(Some(qf)) => {
                write!(f, "MTC nibble:{} v:{}", qf.nibble, qf.value)
            }
            EventKind::SongPosition(Some(pos)) => write!(f, "SongPosition {}", pos),
            EventKind::SongSelect(Some(song)) => write!(f, "SongSelect {}", song),
            other => write!(f, "{}", other.name()),
        }
    }
}
