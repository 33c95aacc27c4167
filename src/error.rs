//! Error types for the MIDI host layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("MIDI initialization failed: {0}")]
    MidiInit(#[from] midir::InitError),

    #[error("Failed to read MIDI port info: {0}")]
    PortInfo(#[from] midir::PortInfoError),

    #[error("MIDI port not found: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to '{port}': {reason}")]
    Connect { port: String, reason: String },

    #[error("Failed to send MIDI message: {0}")]
    Send(#[from] midir::SendError),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
