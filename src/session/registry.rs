//! Live device list with caller-maintained confidence
//!
//! The classifier result is fixed per descriptor. The stored confidence on
//! top of it is raised as a device emits traffic, keyed by device id.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::device::{ClassificationResult, DeviceDescriptor, PortType};

/// How activity raises a device's stored confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityPolicy {
    /// Confidence added per observed message
    pub step: f64,
    /// Activity never raises confidence above this value
    pub cap: f64,
}

impl Default for ActivityPolicy {
    fn default() -> Self {
        Self { step: 0.1, cap: 0.8 }
    }
}

impl ActivityPolicy {
    /// Next confidence after one observed message
    pub fn raise(&self, confidence: f64) -> f64 {
        if confidence < self.cap {
            (confidence + self.step).min(self.cap)
        } else {
            confidence
        }
    }
}

/// A device known to the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedDevice {
    pub descriptor: Arc<DeviceDescriptor>,
    pub classification: ClassificationResult,
    /// Classifier confidence plus activity adjustments
    pub confidence: f64,
    pub message_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl TrackedDevice {
    pub fn new(descriptor: Arc<DeviceDescriptor>, classification: ClassificationResult) -> Self {
        Self {
            descriptor,
            classification,
            confidence: classification.confidence,
            message_count: 0,
            last_seen: None,
        }
    }

    pub fn is_target(&self, threshold: f64) -> bool {
        self.classification.is_exact_match || self.confidence > threshold
    }
}

/// Concurrent device map keyed by device id
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, TrackedDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a device
    ///
    /// A device that reconnects keeps the confidence it earned through
    /// activity if that is higher than its fresh classification.
    pub fn upsert(
        &self,
        descriptor: DeviceDescriptor,
        classification: ClassificationResult,
    ) -> TrackedDevice {
        let descriptor = Arc::new(descriptor);
        let id = descriptor.id.clone();
        let mut tracked = TrackedDevice::new(descriptor, classification);

        // Merge under the entry lock so concurrent activity is not lost
        match self.devices.entry(id) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get();
                tracked.confidence = tracked.confidence.max(previous.confidence);
                tracked.message_count = previous.message_count;
                tracked.last_seen = previous.last_seen;
                entry.insert(tracked.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(tracked.clone());
            }
        }

        info!(
            "Device {} '{}' (confidence: {:.0}%)",
            tracked.descriptor.port_type,
            tracked.descriptor.display_name(),
            tracked.confidence * 100.0
        );

        tracked
    }

    pub fn remove(&self, id: &str) -> Option<TrackedDevice> {
        self.devices.remove(id).map(|(_, device)| device)
    }

    pub fn get(&self, id: &str) -> Option<TrackedDevice> {
        self.devices.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Record one message from a device, raising its confidence
    ///
    /// Returns the updated entry, `None` for unknown devices.
    pub fn observe_activity(
        &self,
        id: &str,
        at: DateTime<Utc>,
        policy: &ActivityPolicy,
    ) -> Option<TrackedDevice> {
        let mut entry = self.devices.get_mut(id)?;
        let before = entry.confidence;
        entry.confidence = policy.raise(before);
        entry.message_count += 1;
        entry.last_seen = Some(at);

        if entry.confidence > before {
            debug!(
                "Activity from '{}': confidence {:.2} -> {:.2}",
                entry.descriptor.display_name(),
                before,
                entry.confidence
            );
        }

        Some(entry.clone())
    }

    /// All devices, most likely targets first
    pub fn all(&self) -> Vec<TrackedDevice> {
        let mut devices: Vec<_> = self.devices.iter().map(|e| e.value().clone()).collect();
        devices.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.descriptor.name.cmp(&b.descriptor.name))
                .then_with(|| a.descriptor.id.cmp(&b.descriptor.id))
        });
        devices
    }

    /// Devices treated as Terra hardware
    pub fn targets(&self, threshold: f64) -> Vec<TrackedDevice> {
        self.all()
            .into_iter()
            .filter(|d| d.is_target(threshold))
            .collect()
    }

    /// Input to auto-select: exact matches first, then highest confidence
    pub fn best_target(&self, threshold: f64) -> Option<TrackedDevice> {
        let inputs: Vec<_> = self
            .targets(threshold)
            .into_iter()
            .filter(|d| d.descriptor.port_type == PortType::Input)
            .collect();

        inputs
            .iter()
            .find(|d| d.classification.is_exact_match)
            .or_else(|| inputs.first())
            .cloned()
    }
}
