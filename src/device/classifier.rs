//! Terra device identification
//!
//! Device names vary by OS and driver, so detection yields a graded
//! confidence instead of a plain yes/no.

use serde::Serialize;

use super::DeviceDescriptor;

/// Product names that identify the hardware outright
const EXACT_NAMES: &[&str] = &["midi-terra", "miditerra"];

/// Substring patterns and their scores, highest first
const NAME_PATTERNS: &[(&str, f64)] = &[
    ("midi-terra", 1.0),
    ("miditerra", 1.0),
    ("terra", 0.9),
    ("sensory", 0.7),
    ("sensor", 0.6),
    ("arduino", 0.5),
    ("ch340", 0.4),
    ("cp210x", 0.4),
    ("ftdi", 0.4),
    ("serial", 0.3),
    ("usb", 0.2),
];

const MIDI_BONUS: f64 = 0.2;

/// Built-in OS sound devices; each match multiplies the score by 0.1
const GENERIC_TERMS: &[&str] = &["microsoft", "windows", "realtek", "intel", "audio", "sound"];

const GENERIC_PENALTY: f64 = 0.1;

/// Default confidence above which a device is treated as the target
pub const DEFAULT_TARGET_THRESHOLD: f64 = 0.5;

/// Outcome of classifying one device
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub is_exact_match: bool,
    pub is_pattern_match: bool,
    /// 0.0 ..= 1.0
    pub confidence: f64,
}

impl ClassificationResult {
    /// Whether callers should treat the device as Terra hardware
    pub fn is_target(&self, threshold: f64) -> bool {
        self.is_exact_match || self.confidence > threshold
    }
}

/// Stateless name/manufacturer heuristic
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceClassifier;

impl DeviceClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, device: &DeviceDescriptor) -> ClassificationResult {
        self.classify_strings(Some(&device.name), Some(&device.manufacturer))
    }

    /// Classify raw host strings, either of which may be absent
    pub fn classify_strings(
        &self,
        name: Option<&str>,
        manufacturer: Option<&str>,
    ) -> ClassificationResult {
        let name = normalize(name);
        let manufacturer = normalize(manufacturer);

        if EXACT_NAMES.contains(&name.as_str()) {
            return ClassificationResult {
                is_exact_match: true,
                is_pattern_match: true,
                confidence: 1.0,
            };
        }

        let found = |pattern: &str| name.contains(pattern) || manufacturer.contains(pattern);

        let mut confidence = NAME_PATTERNS
            .iter()
            .filter(|&&(pattern, _)| found(pattern))
            .map(|&(_, score)| score)
            .fold(0.0, f64::max);

        if found("midi") {
            confidence += MIDI_BONUS;
        }

        // Cumulative: "Realtek Audio" is dampened twice
        for &term in GENERIC_TERMS {
            if found(term) {
                confidence *= GENERIC_PENALTY;
            }
        }

        let confidence = confidence.clamp(0.0, 1.0);

        ClassificationResult {
            is_exact_match: false,
            is_pattern_match: confidence > 0.0,
            confidence,
        }
    }
}

fn normalize(value: Option<&str>) -> String {
    value.unwrap_or_default().trim().to_lowercase()
}
