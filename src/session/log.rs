//! Append-only message log

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::midi::MidiEvent;

/// A decoded event tagged with its device's verdict at arrival time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(flatten)]
    pub event: MidiEvent,
    /// Whether the source device was treated as Terra hardware
    pub from_target: bool,
    pub device_confidence: f64,
}

impl LogEntry {
    /// Entry for an event whose device is unknown to the session
    pub fn untagged(event: MidiEvent) -> Self {
        Self {
            event,
            from_target: false,
            device_confidence: 0.0,
        }
    }
}

/// Selects log entries by channel and message type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Zero-based MIDI channel
    pub channel: Option<u8>,
    /// Message type name such as `noteOn`
    pub kind: Option<String>,
}

impl LogFilter {
    pub fn is_empty(&self) -> bool {
        self.channel.is_none() && self.kind.is_none()
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(channel) = self.channel {
            if entry.event.channel != Some(channel) {
                return false;
            }
        }
        match &self.kind {
            Some(kind) => entry.event.type_name() == kind,
            None => true,
        }
    }
}

/// Events in arrival order
///
/// Entries are only ever appended; `clear` is the one way to drop them.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: RwLock<Vec<Arc<LogEntry>>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: LogEntry) -> Arc<LogEntry> {
        let entry = Arc::new(entry);
        self.entries.write().push(entry.clone());
        entry
    }

    /// Truncate to empty, returning how many entries were dropped
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let dropped = entries.len();
        entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Up to `limit` most recent entries, oldest first
    pub fn recent(&self, limit: usize) -> Vec<Arc<LogEntry>> {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(limit);
        entries[start..].to_vec()
    }

    /// Up to `limit` most recent entries passing `filter`, oldest first
    pub fn recent_matching(&self, filter: &LogFilter, limit: usize) -> Vec<Arc<LogEntry>> {
        let entries = self.entries.read();
        let mut matched: Vec<_> = entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .take(limit)
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    /// Copy of the whole log
    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        self.entries.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MessageDecoder;

    fn entry(bytes: &[u8]) -> LogEntry {
        LogEntry::untagged(MessageDecoder::new().decode_now(bytes))
    }

    #[test]
    fn test_append_keeps_arrival_order() {
        let log = MessageLog::new();
        log.append(entry(&[0x90, 60, 100]));
        log.append(entry(&[0x80, 60, 0]));
        log.append(entry(&[0xF8]));

        let all = log.snapshot();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].event.type_name(), "noteOn");
        assert_eq!(all[1].event.type_name(), "noteOff");
        assert_eq!(all[2].event.type_name(), "systemRealTime");
    }

    #[test]
    fn test_recent() {
        let log = MessageLog::new();
        for note in 0..10u8 {
            log.append(entry(&[0x90, note, 1]));
        }
        let recent = log.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].event.note(), Some(7));
        assert_eq!(recent[2].event.note(), Some(9));
        assert_eq!(log.recent(100).len(), 10);
        // Reading never truncates
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn test_filter_by_channel_and_type() {
        let log = MessageLog::new();
        log.append(entry(&[0x90, 60, 100]));
        log.append(entry(&[0x91, 61, 100]));
        log.append(entry(&[0xB1, 17, 64]));
        log.append(entry(&[0x91, 62, 100]));
        log.append(entry(&[0xF8]));

        let channel = LogFilter {
            channel: Some(1),
            kind: None,
        };
        assert_eq!(log.recent_matching(&channel, 10).len(), 3);

        let notes = LogFilter {
            channel: Some(1),
            kind: Some("noteOn".into()),
        };
        let matched = log.recent_matching(&notes, 10);
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].event.note(), Some(61));
        assert_eq!(matched[1].event.note(), Some(62));

        // Newest matches win the limit
        let last = log.recent_matching(&notes, 1);
        assert_eq!(last[0].event.note(), Some(62));

        let clock = LogFilter {
            channel: None,
            kind: Some("systemRealTime".into()),
        };
        assert_eq!(log.recent_matching(&clock, 10).len(), 1);
        assert!(LogFilter::default().is_empty());
        assert_eq!(log.recent_matching(&LogFilter::default(), 10).len(), 5);
    }

    #[test]
    fn test_clear() {
        let log = MessageLog::new();
        log.append(entry(&[0xF8]));
        log.append(entry(&[0xF8]));
        assert_eq!(log.clear(), 2);
        assert_eq!(log.len(), 0);
        assert!(log.is_empty());

        log.append(entry(&[0xB0, 17, 64]));
        assert_eq!(log.len(), 1);
        assert!(log.snapshot()[0].event.terra_specific);
    }

    #[test]
    fn test_entry_json_is_flat() {
        let json = serde_json::to_value(entry(&[0x90, 60, 100])).unwrap();
        assert_eq!(json["type"], "noteOn");
        assert_eq!(json["fromTarget"], false);
        assert_eq!(json["deviceConfidence"], 0.0);
    }
}
