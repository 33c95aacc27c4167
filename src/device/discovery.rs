//! Port discovery utilities
//!
//! midir has no hot-plug notifications, so connects and disconnects are
//! derived by diffing successive port scans.

use midir::{MidiInput, MidiOutput};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{DeviceDescriptor, PortState, PortType};
use crate::error::Result;

/// Client name used for short-lived discovery handles
const DISCOVERY_CLIENT: &str = "Terra-Monitor-Discovery";

/// Discover input ports
pub fn discover_input_ports() -> Result<Vec<DeviceDescriptor>> {
    let midi_in = MidiInput::new(DISCOVERY_CLIENT)?;

    let mut devices = Vec::new();
    for port in midi_in.ports() {
        // A port unplugged mid-scan shows up in the next rescan
        match midi_in.port_name(&port) {
            Ok(name) => devices.push(DeviceDescriptor::new(
                port.id(),
                Some(&name),
                None,
                PortState::Connected,
                PortType::Input,
            )),
            Err(e) => debug!("Skipping {} port {}: {}", PortType::Input, port.id(), e),
        }
    }

    Ok(devices)
}

/// Discover output ports
pub fn discover_output_ports() -> Result<Vec<DeviceDescriptor>> {
    let midi_out = MidiOutput::new(DISCOVERY_CLIENT)?;

    let mut devices = Vec::new();
    for port in midi_out.ports() {
        // A port unplugged mid-scan shows up in the next rescan
        match midi_out.port_name(&port) {
            Ok(name) => devices.push(DeviceDescriptor::new(
                port.id(),
                Some(&name),
                None,
                PortState::Connected,
                PortType::Output,
            )),
            Err(e) => debug!("Skipping {} port {}: {}", PortType::Output, port.id(), e),
        }
    }

    Ok(devices)
}

/// Loopback and software ports
pub fn is_virtual_port(name: &str) -> bool {
    name.contains("Virtual")
        || name.contains("loopMIDI")
        || name.contains("IAC")
        || name.contains("Midi Through")
}

/// Change between two scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChange {
    Connected(DeviceDescriptor),
    Disconnected(DeviceDescriptor),
}

/// Tracks the last scan and reports what changed
#[derive(Debug, Default)]
pub struct PortScanner {
    known: HashMap<String, DeviceDescriptor>,
}

impl PortScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a fresh scan against the previous one
    ///
    /// Ports that vanished are reported with `PortState::Disconnected`.
    pub fn update(&mut self, current: Vec<DeviceDescriptor>) -> Vec<DeviceChange> {
        let mut changes = Vec::new();
        let mut next = HashMap::with_capacity(current.len());

        for device in current {
            if !self.known.contains_key(&device.id) {
                debug!("Port appeared: {} ({})", device.display_name(), device.id);
                changes.push(DeviceChange::Connected(device.clone()));
            }
            next.insert(device.id.clone(), device);
        }

        let mut gone: Vec<_> = self
            .known
            .drain()
            .filter(|(id, _)| !next.contains_key(id))
            .map(|(_, mut device)| {
                device.state = PortState::Disconnected;
                device
            })
            .collect();
        gone.sort_by(|a, b| a.id.cmp(&b.id));

        for device in gone {
            info!("Port disappeared: {}", device.display_name());
            changes.push(DeviceChange::Disconnected(device));
        }

        self.known = next;
        changes
    }

    /// Scan midir input ports and report changes
    pub fn rescan_inputs(&mut self) -> Result<Vec<DeviceChange>> {
        let ports = discover_input_ports()?;
        Ok(self.update(ports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_discovery() {
        // This test just ensures the discovery functions don't panic
        let _ = discover_input_ports();
        let _ = discover_output_ports();
    }

    #[test]
    fn test_virtual_ports() {
        assert!(is_virtual_port("loopMIDI Port 1"));
        assert!(is_virtual_port("IAC Driver Bus 1"));
        assert!(!is_virtual_port("Midi-Terra"));
    }

    #[test]
    fn test_scanner_reports_connects_and_disconnects() {
        let mut scanner = PortScanner::new();

        let changes = scanner.update(vec![
            DeviceDescriptor::input("a", "Midi-Terra"),
            DeviceDescriptor::input("b", "USB MIDI"),
        ]);
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[0], DeviceChange::Connected(d) if d.id == "a"));

        // Same ports again: nothing to report
        let changes = scanner.update(vec![
            DeviceDescriptor::input("a", "Midi-Terra"),
            DeviceDescriptor::input("b", "USB MIDI"),
        ]);
        assert!(changes.is_empty());

        let changes = scanner.update(vec![
            DeviceDescriptor::input("b", "USB MIDI"),
            DeviceDescriptor::input("c", "Arduino"),
        ]);
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[0], DeviceChange::Connected(d) if d.id == "c"));
        match &changes[1] {
            DeviceChange::Disconnected(d) => {
                assert_eq!(d.id, "a");
                assert_eq!(d.state, PortState::Disconnected);
            }
            other => panic!("unexpected change: {:?}", other),
        }
    }
}
