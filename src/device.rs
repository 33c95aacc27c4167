//! MIDI device descriptors, Terra detection and port discovery

pub mod classifier;
pub mod discovery;

use serde::{Deserialize, Serialize};

pub use classifier::{ClassificationResult, DeviceClassifier};

/// Connection state reported by the host MIDI subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Connected,
    Disconnected,
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    Input,
    Output,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::Input => write!(f, "input"),
            PortType::Output => write!(f, "output"),
        }
    }
}

/// A MIDI port as reported by the host
///
/// Name and manufacturer are untrusted free-form strings; absent values are
/// stored as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub manufacturer: String,
    pub state: PortState,
    pub port_type: PortType,
}

impl DeviceDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: Option<&str>,
        manufacturer: Option<&str>,
        state: PortState,
        port_type: PortType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.unwrap_or_default().to_string(),
            manufacturer: manufacturer.unwrap_or_default().to_string(),
            state,
            port_type,
        }
    }

    /// Connected input port with only a name, as midir reports them
    pub fn input(id: impl Into<String>, name: &str) -> Self {
        Self::new(id, Some(name), None, PortState::Connected, PortType::Input)
    }

    /// Name for display, falling back to the id for unnamed ports
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == PortState::Connected
    }
}
