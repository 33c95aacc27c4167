//! MIDI byte-stream decoder
//!
//! Decoding is total: every byte sequence, including empty and truncated
//! frames, maps to exactly one [`MidiEvent`]. Malformed input is reported
//! through `is_valid_midi = false`, never through an error.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::event::*;
use super::notes;
use super::terra;
use crate::device::DeviceDescriptor;

/// Stateless MIDI message decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageDecoder;

impl MessageDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode one frame
    pub fn decode(
        &self,
        bytes: &[u8],
        timestamp: DateTime<Utc>,
        device: Option<Arc<DeviceDescriptor>>,
    ) -> MidiEvent {
        let mut event = MidiEvent {
            timestamp,
            raw_data: bytes.to_vec(),
            is_valid_midi: true,
            channel: None,
            terra_specific: false,
            kind: EventKind::Empty,
            device,
        };

        let Some(&status) = bytes.first() else {
            event.is_valid_midi = false;
            return event;
        };

        if status >= 0xF8 {
            decode_real_time(status, &mut event);
        } else if status >= 0xF0 {
            decode_system_common(bytes, &mut event);
        } else {
            decode_channel_voice(bytes, &mut event);
        }

        // Data bytes must have the high bit clear; F7 terminates SysEx
        let data = match event.kind {
            EventKind::Sysex(_) => bytes[1..].strip_suffix(&[0xF7]).unwrap_or(&bytes[1..]),
            _ => &bytes[1..],
        };
        if data.iter().any(|b| b & 0x80 != 0) {
            event.is_valid_midi = false;
        }

        event
    }

    /// Decode a frame captured now, without a device reference
    pub fn decode_now(&self, bytes: &[u8]) -> MidiEvent {
        self.decode(bytes, Utc::now(), None)
    }
}

fn decode_real_time(status: u8, event: &mut MidiEvent) {
    let kind = match status {
        0xF8 => RealTimeKind::Clock,
        0xFA => RealTimeKind::Start,
        0xFB => RealTimeKind::Continue,
        0xFC => RealTimeKind::Stop,
        0xFE => RealTimeKind::ActiveSensing,
        0xFF => RealTimeKind::Reset,
        _ => {
            event.is_valid_midi = false;
            RealTimeKind::Unknown
        }
    };
    event.kind = EventKind::SystemRealTime(kind);
}

fn decode_system_common(bytes: &[u8], event: &mut MidiEvent) {
    let data1 = bytes.get(1).copied();
    let data2 = bytes.get(2).copied();

    event.kind = match bytes[0] {
        0xF0 => {
            // Callers may strip the trailing F7 before decoding
            let body = &bytes[1..];
            let payload = body.strip_suffix(&[0xF7]).unwrap_or(body);
            let vendor = terra::parse_sysex(bytes);
            if vendor.is_some() {
                event.terra_specific = true;
            }
            EventKind::Sysex(SysExData {
                payload: payload.to_vec(),
                terra: vendor,
            })
        }
        0xF1 => EventKind::MtcQuarterFrame(require(event, data1).map(|b| QuarterFrameData {
            nibble: (b & 0x70) >> 4,
            value: b & 0x0F,
        })),
        0xF2 => {
            let pair = require(event, data1.zip(data2));
            EventKind::SongPosition(pair.map(|(lsb, msb)| combine_14bit(lsb, msb)))
        }
        0xF3 => EventKind::SongSelect(require(event, data1)),
        0xF6 => EventKind::TuneRequest,
        _ => {
            event.is_valid_midi = false;
            EventKind::SystemCommon
        }
    };
}

fn decode_channel_voice(bytes: &[u8], event: &mut MidiEvent) {
    let status = bytes[0];
    let channel = status & 0x0F;
    let command = status & 0xF0;
    let data1 = bytes.get(1).copied();
    let pair = data1.zip(bytes.get(2).copied());

    event.kind = match command {
        0x80 => EventKind::NoteOff(require(event, pair).map(|(note, velocity)| NoteData {
            pitch: pitch(note),
            velocity,
        })),
        0x90 => match require(event, pair) {
            // Velocity 0 is a note off
            Some((note, 0)) => EventKind::NoteOff(Some(NoteData {
                pitch: pitch(note),
                velocity: 0,
            })),
            Some((note, velocity)) => EventKind::NoteOn(Some(NoteData {
                pitch: pitch(note),
                velocity,
            })),
            None => EventKind::NoteOn(None),
        },
        0xA0 => EventKind::PolyAftertouch(require(event, pair).map(|(note, pressure)| {
            PolyAftertouchData {
                pitch: pitch(note),
                pressure,
            }
        })),
        0xB0 => {
            let data = require(event, pair).map(|(controller, value)| ControlChangeData {
                controller,
                controller_name: notes::controller_name(controller),
                value,
                normalized_value: value as f64 / 127.0,
                sensor_type: terra::sensor_kind(controller),
            });
            if data.is_some_and(|cc| cc.sensor_type.is_some()) {
                event.terra_specific = true;
            }
            EventKind::ControlChange(data)
        }
        0xC0 => EventKind::ProgramChange(require(event, data1)),
        0xD0 => EventKind::ChannelAftertouch(require(event, data1).map(|pressure| {
            ChannelAftertouchData {
                pressure,
                normalized_pressure: pressure as f64 / 127.0,
            }
        })),
        0xE0 => EventKind::PitchBend(require(event, pair).map(|(lsb, msb)| {
            let value = combine_14bit(lsb, msb);
            let bend_value = (value as f64 - 8192.0) / 8192.0;
            PitchBendData {
                lsb,
                msb,
                value,
                bend_value,
                cents: bend_value * 200.0,
            }
        })),
        _ => {
            // Data byte in status position (running status is not tracked)
            event.is_valid_midi = false;
            event.kind = EventKind::Unknown;
            return;
        }
    };

    event.channel = Some(channel);
    if terra::matches_default_layout(channel, event.note()) {
        event.terra_specific = true;
    }
}

/// Mark the event as malformed when a required field is missing
fn require<T>(event: &mut MidiEvent, value: Option<T>) -> Option<T> {
    if value.is_none() {
        event.is_valid_midi = false;
    }
    value
}

fn pitch(note: u8) -> Pitch {
    Pitch {
        note,
        note_name: notes::note_name(note),
        octave: notes::octave(note),
        frequency: notes::frequency(note),
    }
}

fn combine_14bit(lsb: u8, msb: u8) -> u16 {
    (lsb as u16) | ((msb as u16) << 7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{PortState, PortType};
    use crate::midi::terra::{SensorKind, TerraCommand};
    use proptest::prelude::*;

    fn decode(bytes: &[u8]) -> MidiEvent {
        MessageDecoder::new().decode_now(bytes)
    }

    #[test]
    fn test_empty_frame() {
        let event = decode(&[]);
        assert_eq!(event.kind, EventKind::Empty);
        assert!(!event.is_valid_midi);
        assert!(event.raw_data.is_empty());
    }

    #[test]
    fn test_note_on() {
        let event = decode(&[0x90, 60, 100]);
        assert!(event.is_valid_midi);
        assert_eq!(event.channel, Some(0));
        assert_eq!(event.type_name(), "noteOn");
        assert_eq!(event.note(), Some(60));
        assert_eq!(event.velocity(), Some(100));
        let pitch = event.pitch().unwrap();
        assert_eq!(pitch.note_name, "C4");
        assert_eq!(pitch.octave, 4);
        assert!((pitch.frequency - 261.63).abs() < 0.01);
        assert!(!event.terra_specific);
    }

    #[test]
    fn test_note_on_velocity_zero_is_note_off() {
        let event = decode(&[0x90, 0x40, 0x00]);
        assert_eq!(event.type_name(), "noteOff");
        assert_eq!(event.note(), Some(64));
        assert_eq!(event.velocity(), Some(0));
        assert!(event.is_valid_midi);
    }

    #[test]
    fn test_note_off() {
        let event = decode(&[0x83, 69, 10]);
        assert_eq!(event.type_name(), "noteOff");
        assert_eq!(event.channel, Some(3));
        assert_eq!(event.pitch().unwrap().frequency, 440.0);
    }

    #[test]
    fn test_truncated_note_keeps_type() {
        let event = decode(&[0x90, 60]);
        assert_eq!(event.kind, EventKind::NoteOn(None));
        assert!(!event.is_valid_midi);
        assert_eq!(event.channel, Some(0));
        assert_eq!(event.raw_data, vec![0x90, 60]);

        let event = decode(&[0x80]);
        assert_eq!(event.kind, EventKind::NoteOff(None));
        assert!(!event.is_valid_midi);
    }

    #[test]
    fn test_poly_aftertouch() {
        let event = decode(&[0xA1, 72, 33]);
        match event.kind {
            EventKind::PolyAftertouch(Some(data)) => {
                assert_eq!(data.pitch.note_name, "C5");
                assert_eq!(data.pressure, 33);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_control_change() {
        let event = decode(&[0xB2, 7, 127]);
        let cc = event.control_change().unwrap();
        assert_eq!(event.channel, Some(2));
        assert_eq!(cc.controller, 7);
        assert_eq!(cc.controller_name, "Volume");
        assert_eq!(cc.normalized_value, 1.0);
        assert_eq!(cc.sensor_type, None);
        assert!(!event.terra_specific);
    }

    #[test]
    fn test_sensor_controller() {
        let event = decode(&[0xB0, 17, 64]);
        let cc = event.control_change().unwrap();
        assert!(event.terra_specific);
        assert_eq!(cc.sensor_type, Some(SensorKind::Distance));
        assert!((cc.normalized_value - 64.0 / 127.0).abs() < 1e-12);

        let event = decode(&[0xB0, 30, 1]);
        assert!(event.terra_specific);
        assert_eq!(
            event.control_change().unwrap().sensor_type,
            Some(SensorKind::Unclassified)
        );
    }

    #[test]
    fn test_program_change() {
        let event = decode(&[0xC5, 12]);
        assert_eq!(event.kind, EventKind::ProgramChange(Some(12)));
        assert!(event.is_valid_midi);

        let event = decode(&[0xC5]);
        assert_eq!(event.kind, EventKind::ProgramChange(None));
        assert!(!event.is_valid_midi);
    }

    #[test]
    fn test_channel_aftertouch() {
        let event = decode(&[0xD0, 127]);
        match event.kind {
            EventKind::ChannelAftertouch(Some(at)) => {
                assert_eq!(at.pressure, 127);
                assert_eq!(at.normalized_pressure, 1.0);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_pitch_bend_center() {
        let event = decode(&[0xE0, 0x00, 0x40]);
        match event.kind {
            EventKind::PitchBend(Some(pb)) => {
                assert_eq!(pb.value, 8192);
                assert_eq!(pb.bend_value, 0.0);
                assert_eq!(pb.cents, 0.0);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_pitch_bend_extremes() {
        let event = decode(&[0xE0, 0x00, 0x00]);
        let EventKind::PitchBend(Some(pb)) = event.kind else {
            panic!("expected pitch bend");
        };
        assert_eq!(pb.bend_value, -1.0);
        assert_eq!(pb.cents, -200.0);

        let event = decode(&[0xE0, 0x7F, 0x7F]);
        let EventKind::PitchBend(Some(pb)) = event.kind else {
            panic!("expected pitch bend");
        };
        assert_eq!(pb.value, 16383);
        assert!(pb.bend_value < 1.0 && pb.bend_value > 0.999);
    }

    #[test]
    fn test_terra_channel_and_note_heuristic() {
        // Channel 9 (0-based 8)
        assert!(decode(&[0x98, 100, 100]).terra_specific);
        // Note 36 on channel 1
        assert!(decode(&[0x90, 36, 100]).terra_specific);
        assert!(decode(&[0x80, 51, 0]).terra_specific);
        assert!(!decode(&[0x90, 52, 100]).terra_specific);
        // Channel range applies to every channel-voice message
        assert!(decode(&[0xCF, 1]).terra_specific);
    }

    #[test]
    fn test_real_time() {
        let cases = [
            (0xF8, RealTimeKind::Clock),
            (0xFA, RealTimeKind::Start),
            (0xFB, RealTimeKind::Continue),
            (0xFC, RealTimeKind::Stop),
            (0xFE, RealTimeKind::ActiveSensing),
            (0xFF, RealTimeKind::Reset),
        ];
        for (status, kind) in cases {
            let event = decode(&[status]);
            assert_eq!(event.kind, EventKind::SystemRealTime(kind));
            assert!(event.is_valid_midi);
            assert_eq!(event.channel, None);
        }

        for status in [0xF9, 0xFD] {
            let event = decode(&[status]);
            assert_eq!(event.kind, EventKind::SystemRealTime(RealTimeKind::Unknown));
            assert!(!event.is_valid_midi);
        }
    }

    #[test]
    fn test_system_common() {
        let event = decode(&[0xF1, 0x35]);
        assert_eq!(
            event.kind,
            EventKind::MtcQuarterFrame(Some(QuarterFrameData { nibble: 3, value: 5 }))
        );

        let event = decode(&[0xF2, 0x01, 0x02]);
        assert_eq!(event.kind, EventKind::SongPosition(Some(0x101)));

        let event = decode(&[0xF3, 4]);
        assert_eq!(event.kind, EventKind::SongSelect(Some(4)));

        let event = decode(&[0xF6]);
        assert_eq!(event.kind, EventKind::TuneRequest);
        assert!(event.is_valid_midi);

        for status in [0xF4, 0xF5, 0xF7] {
            let event = decode(&[status]);
            assert_eq!(event.kind, EventKind::SystemCommon);
            assert!(!event.is_valid_midi);
        }

        let event = decode(&[0xF2, 0x01]);
        assert_eq!(event.kind, EventKind::SongPosition(None));
        assert!(!event.is_valid_midi);
    }

    #[test]
    fn test_generic_sysex() {
        let event = decode(&[0xF0, 0x43, 0x10, 0x4C, 0xF7]);
        assert!(event.is_valid_midi);
        assert!(!event.terra_specific);
        assert_eq!(
            event.kind,
            EventKind::Sysex(SysExData {
                payload: vec![0x43, 0x10, 0x4C],
                terra: None,
            })
        );
    }

    #[test]
    fn test_terra_sysex() {
        let event = decode(&[0xF0, 0x7D, 0x00, 0x03, 0x01, 0x7F, 0xF7]);
        assert!(event.terra_specific);
        let EventKind::Sysex(sysex) = &event.kind else {
            panic!("expected sysex");
        };
        let terra = sysex.terra.as_ref().unwrap();
        assert_eq!(terra.command_name, TerraCommand::Calibration);
        assert_eq!(terra.parameters, vec![0x01, 0x7F]);
    }

    #[test]
    fn test_sysex_without_terminator_stays_valid() {
        let event = MessageDecoder::new().decode_now(&[0xF0, 0x43, 0x10]);
        assert!(event.is_valid_midi);
        let EventKind::Sysex(sysex) = &event.kind else {
            panic!("expected sysex");
        };
        assert_eq!(sysex.payload, vec![0x43, 0x10]);

        let terminated = decode(&[0xF0, 0x43, 0x10, 0xF7]);
        assert!(terminated.is_valid_midi);
        assert_eq!(terminated.kind, event.kind);
    }

    #[test]
    fn test_sysex_high_bit_in_body_is_invalid() {
        let event = decode(&[0xF0, 0x43, 0x90, 0xF7]);
        assert!(!event.is_valid_midi);
    }

    #[test]
    fn test_data_byte_status_is_unknown() {
        let event = decode(&[0x40, 0x10, 0x20]);
        assert_eq!(event.kind, EventKind::Unknown);
        assert!(!event.is_valid_midi);
        assert_eq!(event.channel, None);
    }

    #[test]
    fn test_out_of_range_data_byte() {
        let event = decode(&[0x90, 0xC8, 0x10]);
        assert!(!event.is_valid_midi);
        assert_eq!(event.note(), Some(200));
    }

    #[test]
    fn test_device_reference_is_attached() {
        let device = Arc::new(DeviceDescriptor::new(
            "in-1",
            Some("Midi-Terra"),
            None,
            PortState::Connected,
            PortType::Input,
        ));
        let event =
            MessageDecoder::new().decode(&[0xF8], Utc::now(), Some(device.clone()));
        assert_eq!(event.device_id(), Some("in-1"));
        assert_eq!(event.device.as_deref(), Some(device.as_ref()));
    }

    #[test]
    fn test_event_json_shape() {
        let event = decode(&[0xB0, 16, 10]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "controlChange");
        assert_eq!(json["isValidMidi"], true);
        assert_eq!(json["terraSpecific"], true);
        assert_eq!(json["rawData"], serde_json::json!([0xB0, 16, 10]));
        assert_eq!(json["data"]["sensorType"], "pressure");
        assert_eq!(json["data"]["controllerName"], "Sensor 1");

        let json = serde_json::to_value(decode(&[0x90, 60, 1])).unwrap();
        assert_eq!(json["data"]["noteName"], "C4");
        assert_eq!(json["data"]["velocity"], 1);
    }

    #[test]
    fn test_decoding_is_repeatable() {
        let decoder = MessageDecoder::new();
        let ts = Utc::now();
        let first = decoder.decode(&[0x91, 40, 90], ts, None);
        let _ = decoder.decode(&[0xF0, 0x7D], ts, None);
        let second = decoder.decode(&[0x91, 40, 90], ts, None);
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_decode_is_total(bytes in proptest::collection::vec(any::<u8>(), 0..=3)) {
            let event = decode(&bytes);
            prop_assert_eq!(&event.raw_data, &bytes);
            if let Some(channel) = event.channel {
                prop_assert!(channel < 16);
            }
        }

        #[test]
        fn prop_decode_long_frames(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let event = decode(&bytes);
            prop_assert_eq!(event.raw_data.len(), bytes.len());
        }

        #[test]
        fn prop_channel_voice_has_channel(status in 0x80u8..0xF0, d1 in 0u8..0x80, d2 in 0u8..0x80) {
            let event = decode(&[status, d1, d2]);
            prop_assert!(event.is_valid_midi);
            prop_assert_eq!(event.channel, Some(status & 0x0F));
        }
    }
}
