//! Live capture and console output
//!
//! `InputHub` owns the midir input connections and forwards every frame to
//! the session loop. The console printer renders log entries one per line.
//! `send_test_note` plays a short note on an output port.

use colored::*;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::{ConnectPolicy, MidiConfig};
use crate::device::discovery::{self, is_virtual_port};
use crate::device::{DeviceClassifier, DeviceDescriptor, PortType};
use crate::error::{MonitorError, Result};
use crate::midi::{format_hex, EventKind, RawFrame};
use crate::session::{LogEntry, TrackedDevice};

/// Open input connections keyed by device id
pub struct InputHub {
    client_name: String,
    connections: HashMap<String, MidiInputConnection<()>>,
    frames_tx: mpsc::Sender<RawFrame>,
}

impl InputHub {
    pub fn new(client_name: impl Into<String>, frames_tx: mpsc::Sender<RawFrame>) -> Self {
        Self {
            client_name: client_name.into(),
            connections: HashMap::new(),
            frames_tx,
        }
    }

    /// Open a capture connection; already-open devices are left alone
    pub fn connect(&mut self, device: &DeviceDescriptor) -> Result<()> {
        if self.connections.contains_key(&device.id) {
            return Ok(());
        }

        let mut midi_in = MidiInput::new(&self.client_name)?;
        // Sysex and clock carry Terra traffic too
        midi_in.ignore(Ignore::None);

        let port = midi_in
            .find_port_by_id(device.id.clone())
            .ok_or_else(|| MonitorError::PortNotFound(device.display_name().to_string()))?;

        let frames_tx = self.frames_tx.clone();
        let device_id = device.id.clone();

        info!("Connecting to: {}", device.display_name());

        let conn = midi_in
            .connect(
                &port,
                "terra-monitor-in",
                move |_timestamp, data, _| {
                    if frames_tx.try_send(RawFrame::new(device_id.as_str(), data)).is_err() {
                        trace!("Capture channel full, dropping frame from {}", device_id);
                    }
                },
                (),
            )
            .map_err(|e| MonitorError::Connect {
                port: device.display_name().to_string(),
                reason: e.to_string(),
            })?;

        self.connections.insert(device.id.clone(), conn);
        Ok(())
    }

    /// Close a connection, returning whether one was open
    pub fn disconnect(&mut self, id: &str) -> bool {
        match self.connections.remove(id) {
            Some(conn) => {
                conn.close();
                debug!("Closed input connection {}", id);
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.connections.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn close_all(&mut self) {
        for (id, conn) in self.connections.drain() {
            conn.close();
            debug!("Closed input connection {}", id);
        }
    }
}

impl Drop for InputHub {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// C4 at velocity 64, as note on then note off
const TEST_NOTE_ON: [u8; 3] = [0x90, 0x3C, 0x40];
const TEST_NOTE_OFF: [u8; 3] = [0x80, 0x3C, 0x40];
const TEST_NOTE_LENGTH: Duration = Duration::from_millis(100);

/// Whether an output port answers to `query`, by exact id or name substring
fn output_matches(id: &str, name: &str, query: &str) -> bool {
    let query = query.trim();
    !query.is_empty() && (id == query || name.to_lowercase().contains(&query.to_lowercase()))
}

/// Play a short test note on the first output port matching `query`
///
/// Blocks for the length of the note. Returns the port name.
pub fn send_test_note(client_name: &str, query: &str) -> Result<String> {
    let midi_out = MidiOutput::new(client_name)?;

    let mut found = None;
    for port in midi_out.ports() {
        let name = midi_out.port_name(&port)?;
        if output_matches(&port.id(), &name, query) {
            found = Some((port, name));
            break;
        }
    }
    let (port, name) = found.ok_or_else(|| MonitorError::PortNotFound(query.to_string()))?;

    let mut conn = midi_out
        .connect(&port, "terra-monitor-test")
        .map_err(|e| MonitorError::Connect {
            port: name.clone(),
            reason: e.to_string(),
        })?;

    conn.send(&TEST_NOTE_ON)?;
    debug!("Sent: {} to {}", format_hex(&TEST_NOTE_ON), name);
    std::thread::sleep(TEST_NOTE_LENGTH);
    conn.send(&TEST_NOTE_OFF)?;
    conn.close();

    info!("🧪 Test note sent to {}", name);
    Ok(name)
}

/// Whether the capture policy selects this device
pub fn should_connect(device: &TrackedDevice, midi: &MidiConfig, threshold: f64) -> bool {
    if device.descriptor.port_type != PortType::Input || !device.descriptor.is_connected() {
        return false;
    }

    match midi.connect {
        ConnectPolicy::Targets => device.is_target(threshold),
        ConnectPolicy::All => true,
        ConnectPolicy::Pattern => midi
            .port_pattern
            .as_deref()
            .map(|pattern| {
                device
                    .descriptor
                    .display_name()
                    .to_lowercase()
                    .contains(&pattern.trim().to_lowercase())
            })
            .unwrap_or(false),
    }
}

/// One console line: `[time] DEVICE | HEX => summary`
pub fn format_entry(entry: &LogEntry) -> String {
    let event = &entry.event;
    let timestamp = event
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S%.3f")
        .to_string();

    let name = event
        .device
        .as_ref()
        .map(|d| d.display_name().to_string())
        .unwrap_or_else(|| "?".to_string());
    let device = if name.chars().count() > 20 {
        format!("{}...", name.chars().take(17).collect::<String>())
    } else {
        name
    };
    let device = if entry.from_target {
        format!("{:20}", device).bright_green()
    } else {
        format!("{:20}", device).white()
    };

    let hex = format_hex(&event.raw_data);
    let hex_colored = if !event.is_valid_midi {
        hex.bright_black()
    } else {
        match &event.kind {
            EventKind::NoteOn(_) => hex.bright_green(),
            EventKind::NoteOff(_) => hex.bright_red(),
            EventKind::ControlChange(_) => hex.bright_yellow(),
            EventKind::PitchBend(_) => hex.bright_cyan(),
            EventKind::Sysex(_) => hex.bright_magenta(),
            _ => hex.normal(),
        }
    };

    let summary = event.to_string();
    let summary = if event.is_valid_midi {
        summary.bright_blue()
    } else {
        format!("{} (invalid)", summary).dimmed()
    };

    let marker = if event.terra_specific {
        "*".bright_magenta()
    } else {
        " ".normal()
    };

    format!(
        "[{}] {} | {} => {}{}",
        timestamp.dimmed(),
        device,
        hex_colored,
        summary,
        marker
    )
}

pub fn print_entry(entry: &LogEntry) {
    println!("{}", format_entry(entry));
}

/// Print the console header shown when capture starts
pub fn print_banner() {
    println!("\n{}", "Monitoring MIDI traffic...".green());
    println!(
        "{}",
        "Format: [time] DEVICE | HEX => PARSED  (* = Terra layout)".dimmed()
    );
    println!("{}\n", "─".repeat(80).dimmed());
}

/// List all ports with their classification
pub fn list_ports_formatted(classifier: &DeviceClassifier, threshold: f64) -> Result<()> {
    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    let inputs = discovery::discover_input_ports()?;
    let outputs = discovery::discover_output_ports()?;

    for (title, ports) in [("Input Ports:", &inputs), ("Output Ports:", &outputs)] {
        println!("\n{}", title.bold());
        if ports.is_empty() {
            println!("  {}", "No ports found".dimmed());
            continue;
        }
        for port in ports {
            let marker = if is_virtual_port(port.display_name()) {
                "[VIRTUAL] ".yellow()
            } else {
                "[PHYSICAL]".green()
            };
            let result = classifier.classify(port);
            let confidence = format!("{:>3.0}%", result.confidence * 100.0);
            let confidence = if result.is_target(threshold) {
                confidence.bright_green().bold()
            } else {
                confidence.dimmed()
            };
            println!("  {} {} {}", marker, confidence, port.display_name());
        }
    }

    let best = inputs
        .iter()
        .map(|port| (port, classifier.classify(port)))
        .filter(|(_, result)| result.is_target(threshold))
        .max_by(|a, b| {
            a.1.is_exact_match
                .cmp(&b.1.is_exact_match)
                .then(a.1.confidence.total_cmp(&b.1.confidence))
        });

    if let Some((port, _)) = best {
        println!("\n{}", "Auto-detected Terra device:".bold().bright_green());
        println!("  Input:  {}", port.display_name().bright_white());
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{PortState, PortType};
    use crate::midi::MessageDecoder;
    use crate::session::Session;
    use std::sync::Arc;

    fn tracked(name: &str) -> TrackedDevice {
        Session::default().device_connected(DeviceDescriptor::input("id", name))
    }

    #[test]
    fn test_should_connect_targets() {
        let midi = MidiConfig::default();
        assert!(should_connect(&tracked("Midi-Terra"), &midi, 0.5));
        assert!(!should_connect(&tracked("USB MIDI Device"), &midi, 0.5));
        assert!(should_connect(&tracked("USB MIDI Device"), &midi, 0.3));
    }

    #[test]
    fn test_should_connect_all_and_pattern() {
        let mut midi = MidiConfig {
            connect: ConnectPolicy::All,
            ..MidiConfig::default()
        };
        assert!(should_connect(&tracked("Realtek Audio"), &midi, 0.5));

        midi.connect = ConnectPolicy::Pattern;
        midi.port_pattern = Some("Launch".into());
        assert!(should_connect(&tracked("LAUNCHPAD mini"), &midi, 0.5));
        assert!(!should_connect(&tracked("Midi-Terra"), &midi, 0.5));

        midi.port_pattern = None;
        assert!(!should_connect(&tracked("Midi-Terra"), &midi, 0.5));
    }

    #[test]
    fn test_should_connect_skips_outputs() {
        let session = Session::default();
        let output = session.device_connected(DeviceDescriptor::new(
            "out",
            Some("Midi-Terra"),
            None,
            PortState::Connected,
            PortType::Output,
        ));
        assert!(!should_connect(&output, &MidiConfig::default(), 0.5));
    }

    #[test]
    fn test_format_entry() {
        colored::control::set_override(false);
        let device = Arc::new(DeviceDescriptor::input("id", "Midi-Terra"));
        let event = MessageDecoder::new().decode(
            &[0xB8, 16, 127],
            chrono::Utc::now(),
            Some(device),
        );
        let line = format_entry(&LogEntry {
            event,
            from_target: true,
            device_confidence: 1.0,
        });

        assert!(line.contains("Midi-Terra"));
        assert!(line.contains("| B8 10 7F =>"));
        assert!(line.contains("[pressure]"));
        assert!(line.ends_with('*'));

        let line = format_entry(&LogEntry::untagged(MessageDecoder::new().decode_now(&[0x90])));
        assert!(line.contains("(invalid)"));
        assert!(line.contains("?"));
    }

    #[test]
    fn test_output_matches() {
        assert!(output_matches("hw:2,0", "Midi-Terra MIDI 1", "hw:2,0"));
        assert!(output_matches("hw:2,0", "Midi-Terra MIDI 1", " terra "));
        assert!(!output_matches("hw:2,0", "Midi-Terra MIDI 1", "hw:2"));
        assert!(!output_matches("hw:2,0", "Midi-Terra MIDI 1", "launchpad"));
        assert!(!output_matches("hw:2,0", "Midi-Terra MIDI 1", "  "));
    }

    #[test]
    fn test_send_test_note_unknown_port() {
        // Hosts without a MIDI backend fail at init instead
        match send_test_note("Terra-Monitor-Test", "no-such-port-9f3c") {
            Err(MonitorError::PortNotFound(query)) => assert_eq!(query, "no-such-port-9f3c"),
            Err(MonitorError::MidiInit(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hub_bookkeeping_without_ports() {
        let (tx, _rx) = mpsc::channel(8);
        let mut hub = InputHub::new("Terra-Monitor-Test", tx);
        assert!(hub.is_empty());
        assert!(!hub.disconnect("missing"));
        assert!(hub.connected_ids().is_empty());
    }
}
