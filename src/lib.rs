//! Terra Monitor
//!
//! MIDI monitor that recognises Terra sensor hardware among the host's
//! ports and decodes every message it sends.

pub mod api;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod midi;
pub mod monitor;
pub mod paths;
pub mod session;
