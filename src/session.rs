//! Monitoring session
//!
//! Owns the live device list and the message log. Every captured frame is
//! decoded, tagged with its device's verdict, appended to the log and
//! broadcast to subscribers (console, web clients, REPL).

pub mod export;
pub mod log;
pub mod registry;
pub mod stats;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::device::{ClassificationResult, DeviceClassifier, DeviceDescriptor};
use crate::midi::{format_hex, MessageDecoder, RawFrame};

pub use self::log::{LogEntry, LogFilter, MessageLog};
pub use registry::{ActivityPolicy, DeviceRegistry, TrackedDevice};
pub use stats::LogStats;

/// Tunables applied at startup and on config reload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    /// Confidence above which a device counts as Terra hardware
    pub target_threshold: f64,
    pub activity: ActivityPolicy,
    /// Capacity of the event broadcast channel
    pub broadcast_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            target_threshold: crate::device::classifier::DEFAULT_TARGET_THRESHOLD,
            activity: ActivityPolicy::default(),
            broadcast_capacity: 1024,
        }
    }
}

/// Session summary for the API and REPL
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub started_at: DateTime<Utc>,
    pub connected_devices: usize,
    pub target_devices: usize,
    pub subscribers: usize,
    #[serde(flatten)]
    pub log: LogStats,
}

/// Shared monitoring state
pub struct Session {
    decoder: MessageDecoder,
    classifier: DeviceClassifier,
    registry: DeviceRegistry,
    log: MessageLog,
    settings: RwLock<SessionSettings>,
    events_tx: broadcast::Sender<Arc<LogEntry>>,
    started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        let (events_tx, _) = broadcast::channel(settings.broadcast_capacity.max(1));
        Self {
            decoder: MessageDecoder::new(),
            classifier: DeviceClassifier::new(),
            registry: DeviceRegistry::new(),
            log: MessageLog::new(),
            settings: RwLock::new(settings),
            events_tx,
            started_at: Utc::now(),
        }
    }

    pub fn settings(&self) -> SessionSettings {
        *self.settings.read()
    }

    /// Apply reloaded settings; the broadcast capacity only applies at startup
    pub fn update_settings(&self, settings: SessionSettings) {
        let mut current = self.settings.write();
        if *current != settings {
            info!(
                "Session settings updated (threshold: {:.2}, activity step: {:.2}, cap: {:.2})",
                settings.target_threshold, settings.activity.step, settings.activity.cap
            );
        }
        *current = settings;
    }

    pub fn classify(&self, device: &DeviceDescriptor) -> ClassificationResult {
        self.classifier.classify(device)
    }

    pub fn classify_strings(
        &self,
        name: Option<&str>,
        manufacturer: Option<&str>,
    ) -> ClassificationResult {
        self.classifier.classify_strings(name, manufacturer)
    }

    /// Register a device reported by the host
    pub fn device_connected(&self, device: DeviceDescriptor) -> TrackedDevice {
        let classification = self.classifier.classify(&device);
        let tracked = self.registry.upsert(device, classification);
        if tracked.is_target(self.settings().target_threshold) {
            info!(
                "🎯 Terra device detected: {} ({:.0}%)",
                tracked.descriptor.display_name(),
                tracked.confidence * 100.0
            );
        }
        tracked
    }

    pub fn device_disconnected(&self, id: &str) -> Option<TrackedDevice> {
        let removed = self.registry.remove(id);
        if let Some(device) = &removed {
            info!("Device disconnected: {}", device.descriptor.display_name());
        }
        removed
    }

    /// Decode a captured frame and append it to the log
    pub fn ingest(&self, frame: RawFrame) -> Arc<LogEntry> {
        let settings = self.settings();
        let tracked = self
            .registry
            .observe_activity(&frame.device_id, frame.timestamp, &settings.activity);

        let device = tracked.as_ref().map(|d| d.descriptor.clone());
        let event = self.decoder.decode(&frame.bytes, frame.timestamp, device);

        if !event.is_valid_midi {
            debug!(
                "Malformed frame from {}: {}",
                frame.device_id,
                format_hex(&frame.bytes)
            );
        }

        let entry = match tracked {
            Some(device) => LogEntry {
                event,
                from_target: device.is_target(settings.target_threshold),
                device_confidence: device.confidence,
            },
            None => {
                trace!("Frame from unregistered device {}", frame.device_id);
                LogEntry::untagged(event)
            }
        };

        let entry = self.log.append(entry);
        // No subscribers is fine
        let _ = self.events_tx.send(entry.clone());
        entry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LogEntry>> {
        self.events_tx.subscribe()
    }

    pub fn clear_log(&self) -> usize {
        let dropped = self.log.clear();
        info!("Message log cleared ({} entries)", dropped);
        dropped
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn recent(&self, limit: usize) -> Vec<Arc<LogEntry>> {
        self.log.recent(limit)
    }

    pub fn recent_matching(&self, filter: &LogFilter, limit: usize) -> Vec<Arc<LogEntry>> {
        self.log.recent_matching(filter, limit)
    }

    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        self.log.snapshot()
    }

    pub fn devices(&self) -> Vec<TrackedDevice> {
        self.registry.all()
    }

    pub fn device(&self, id: &str) -> Option<TrackedDevice> {
        self.registry.get(id)
    }

    pub fn target_devices(&self) -> Vec<TrackedDevice> {
        self.registry.targets(self.settings().target_threshold)
    }

    pub fn best_target(&self) -> Option<TrackedDevice> {
        self.registry.best_target(self.settings().target_threshold)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            started_at: self.started_at,
            connected_devices: self.registry.len(),
            target_devices: self.target_devices().len(),
            subscribers: self.events_tx.receiver_count(),
            log: LogStats::compute(&self.log.snapshot()),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::EventKind;

    fn terra_session() -> Session {
        let session = Session::default();
        session.device_connected(DeviceDescriptor::input("terra", "Midi-Terra"));
        session.device_connected(DeviceDescriptor::input("usb", "USB MIDI Device"));
        session
    }

    #[test]
    fn test_ingest_tags_with_device_verdict() {
        let session = terra_session();

        let entry = session.ingest(RawFrame::new("terra", &[0x90, 40, 100]));
        assert!(entry.from_target);
        assert_eq!(entry.device_confidence, 1.0);
        assert_eq!(entry.event.device_id(), Some("terra"));
        assert!(entry.event.terra_specific);

        let entry = session.ingest(RawFrame::new("usb", &[0xB0, 7, 1]));
        assert!(!entry.from_target);
        // 0.4 plus one activity step
        assert!((entry.device_confidence - 0.5).abs() < 1e-9);

        let entry = session.ingest(RawFrame::new("ghost", &[0xF8]));
        assert!(!entry.from_target);
        assert!(entry.event.device.is_none());

        assert_eq!(session.log_len(), 3);
        assert_eq!(session.recent(2)[0].event.device_id(), Some("usb"));

        let from_terra = LogFilter {
            channel: Some(0),
            kind: Some("noteOn".into()),
        };
        assert_eq!(session.recent_matching(&from_terra, 10).len(), 1);
    }

    #[test]
    fn test_activity_promotes_device() {
        let session = terra_session();
        assert_eq!(session.target_devices().len(), 1);

        session.ingest(RawFrame::new("usb", &[0xF8]));
        let entry = session.ingest(RawFrame::new("usb", &[0xF8]));
        assert!(entry.from_target);
        assert_eq!(session.target_devices().len(), 2);
        assert_eq!(session.device("usb").unwrap().message_count, 2);
    }

    #[test]
    fn test_clear_does_not_leak_state() {
        let session = terra_session();
        let frame = [0x90, 0x40, 0x00];
        let before = session.ingest(RawFrame::new("ghost", &frame));
        session.ingest(RawFrame::new("terra", &[0xB0, 17, 64]));

        assert_eq!(session.clear_log(), 2);
        assert_eq!(session.log_len(), 0);
        assert_eq!(session.stats().log.total, 0);

        let after = session.ingest(RawFrame::new("ghost", &frame));
        assert_eq!(after.event.kind, before.event.kind);
        assert_eq!(after.event.type_name(), "noteOff");
        assert_eq!(session.log_len(), 1);
    }

    #[test]
    fn test_disconnect() {
        let session = terra_session();
        assert!(session.device_disconnected("terra").is_some());
        assert!(session.device_disconnected("terra").is_none());
        assert!(session.best_target().is_none());

        let entry = session.ingest(RawFrame::new("terra", &[0x90, 60, 1]));
        assert!(!entry.from_target);
    }

    #[test]
    fn test_update_settings() {
        let session = terra_session();
        session.update_settings(SessionSettings {
            target_threshold: 0.3,
            ..SessionSettings::default()
        });
        assert_eq!(session.target_devices().len(), 2);
    }

    #[test]
    fn test_stats() {
        let session = terra_session();
        session.ingest(RawFrame::new("terra", &[0xB0, 17, 64]));
        session.ingest(RawFrame::new("terra", &[0x90]));

        let stats = session.stats();
        assert_eq!(stats.connected_devices, 2);
        assert_eq!(stats.target_devices, 1);
        assert_eq!(stats.log.total, 2);
        assert_eq!(stats.log.terra_messages, 1);
        assert_eq!(stats.log.invalid_messages, 1);
    }

    #[tokio::test]
    async fn test_subscribers_receive_entries() {
        let session = terra_session();
        let mut rx = session.subscribe();

        session.ingest(RawFrame::new("terra", &[0xE0, 0x00, 0x40]));

        let entry = rx.recv().await.unwrap();
        assert!(matches!(entry.event.kind, EventKind::PitchBend(Some(_))));
        assert_eq!(session.stats().subscribers, 1);
    }
}
