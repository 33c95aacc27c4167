//! Message log statistics
//!
//! Counts by type and channel, Terra traffic share, per-channel usage, the
//! velocity distribution of note events and simple note-on patterns.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::log::LogEntry;
use crate::midi::MidiEvent;

/// Number of velocity histogram bins over 0..=127
pub const VELOCITY_BINS: usize = 16;

/// Most common note sequences kept in the stats
pub const NOTE_SEQUENCE_LIMIT: usize = 5;
/// Most common note-on intervals kept in the stats
pub const RHYTHM_PATTERN_LIMIT: usize = 3;
/// Note-on intervals are rounded to this many milliseconds
pub const RHYTHM_RESOLUTION_MS: i64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_channel: BTreeMap<u8, usize>,
    pub terra_messages: usize,
    pub invalid_messages: usize,
    /// Seconds between the first and last entry
    pub time_span: f64,
    pub channel_usage: Vec<ChannelUsage>,
    pub velocity_histogram: [usize; VELOCITY_BINS],
    pub note_sequences: Vec<NoteSequence>,
    pub rhythm_patterns: Vec<RhythmPattern>,
}

/// Three consecutive note-on notes and how often they occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSequence {
    pub notes: [u8; 3],
    pub count: usize,
}

/// Interval between consecutive note-ons and how often it occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RhythmPattern {
    pub interval_ms: i64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUsage {
    pub channel: u8,
    pub count: usize,
    pub types: Vec<String>,
    /// Rounded mean of non-zero velocities, 0 if none
    pub avg_velocity: u8,
}

#[derive(Default)]
struct ChannelAccumulator {
    count: usize,
    types: BTreeSet<&'static str>,
    velocity_sum: u64,
    velocity_count: u64,
}

impl LogStats {
    pub fn compute(entries: &[Arc<LogEntry>]) -> Self {
        let mut stats = LogStats {
            total: entries.len(),
            ..Default::default()
        };

        let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
            return stats;
        };
        stats.time_span = (last.event.timestamp - first.event.timestamp)
            .num_milliseconds() as f64
            / 1000.0;

        let mut channels: HashMap<u8, ChannelAccumulator> = HashMap::new();

        for entry in entries {
            let event = &entry.event;
            *stats.by_type.entry(event.type_name().to_string()).or_default() += 1;

            if event.terra_specific {
                stats.terra_messages += 1;
            }
            if !event.is_valid_midi {
                stats.invalid_messages += 1;
            }

            if let Some(velocity) = event.velocity() {
                let bin = (velocity as usize * VELOCITY_BINS / 128).min(VELOCITY_BINS - 1);
                stats.velocity_histogram[bin] += 1;
            }

            if let Some(channel) = event.channel {
                *stats.by_channel.entry(channel).or_default() += 1;

                let acc = channels.entry(channel).or_default();
                acc.count += 1;
                acc.types.insert(event.type_name());
                if let Some(velocity) = event.velocity().filter(|v| *v > 0) {
                    acc.velocity_sum += velocity as u64;
                    acc.velocity_count += 1;
                }
            }
        }

        let mut usage: Vec<_> = channels
            .into_iter()
            .map(|(channel, acc)| ChannelUsage {
                channel,
                count: acc.count,
                types: acc.types.into_iter().map(String::from).collect(),
                avg_velocity: if acc.velocity_count > 0 {
                    (acc.velocity_sum as f64 / acc.velocity_count as f64).round() as u8
                } else {
                    0
                },
            })
            .collect();
        usage.sort_by(|a, b| b.count.cmp(&a.count).then(a.channel.cmp(&b.channel)));
        stats.channel_usage = usage;

        let note_ons: Vec<_> = entries
            .iter()
            .map(|entry| &entry.event)
            .filter(|event| event.type_name() == "noteOn")
            .collect();
        stats.note_sequences = note_sequences(&note_ons);
        stats.rhythm_patterns = rhythm_patterns(&note_ons);

        stats
    }
}

fn note_sequences(note_ons: &[&MidiEvent]) -> Vec<NoteSequence> {
    let mut counts: BTreeMap<[u8; 3], usize> = BTreeMap::new();
    for window in note_ons.windows(3) {
        // Truncated note-ons carry no note
        if let (Some(a), Some(b), Some(c)) = (window[0].note(), window[1].note(), window[2].note()) {
            *counts.entry([a, b, c]).or_default() += 1;
        }
    }

    let mut sequences: Vec<_> = counts
        .into_iter()
        .map(|(notes, count)| NoteSequence { notes, count })
        .collect();
    sequences.sort_by(|a, b| b.count.cmp(&a.count).then(a.notes.cmp(&b.notes)));
    sequences.truncate(NOTE_SEQUENCE_LIMIT);
    sequences
}

fn rhythm_patterns(note_ons: &[&MidiEvent]) -> Vec<RhythmPattern> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for pair in note_ons.windows(2) {
        let interval = (pair[1].timestamp - pair[0].timestamp).num_milliseconds();
        let rounded = (interval + RHYTHM_RESOLUTION_MS / 2).div_euclid(RHYTHM_RESOLUTION_MS)
            * RHYTHM_RESOLUTION_MS;
        *counts.entry(rounded).or_default() += 1;
    }

    let mut patterns: Vec<_> = counts
        .into_iter()
        .map(|(interval_ms, count)| RhythmPattern { interval_ms, count })
        .collect();
    patterns.sort_by(|a, b| b.count.cmp(&a.count).then(a.interval_ms.cmp(&b.interval_ms)));
    patterns.truncate(RHYTHM_PATTERN_LIMIT);
    patterns
}
