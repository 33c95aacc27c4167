//! Note and controller lookups
//!
//! Note names, octaves, frequencies and controller names are memoized in
//! precomputed tables indexed by the raw byte value.

use once_cell::sync::Lazy;

/// Pitch class names, indexed by `note % 12`
pub const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Named controllers seen on Terra hardware and common MIDI gear
const CONTROLLER_NAMES: &[(u8, &str)] = &[
    (1, "Modulation"),
    (2, "Breath Controller"),
    (4, "Foot Controller"),
    (5, "Portamento Time"),
    (7, "Volume"),
    (8, "Balance"),
    (10, "Pan"),
    (11, "Expression"),
    (16, "Sensor 1"),
    (17, "Sensor 2"),
    (18, "Sensor 3"),
    (19, "Sensor 4"),
    (64, "Sustain Pedal"),
    (65, "Portamento On/Off"),
    (66, "Sostenuto"),
    (67, "Soft Pedal"),
];

/// One entry per possible byte value. Out-of-range data bytes still get a
/// name so malformed frames can be displayed.
static NOTE_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    (0..=u8::MAX)
        .map(|note| format!("{}{}", PITCH_CLASSES[note as usize % 12], octave(note)))
        .collect()
});

static CONTROLLER_LABELS: Lazy<Vec<String>> = Lazy::new(|| {
    (0..=u8::MAX)
        .map(|cc| {
            CONTROLLER_NAMES
                .iter()
                .find(|(number, _)| *number == cc)
                .map(|(_, name)| (*name).to_string())
                .unwrap_or_else(|| format!("CC{}", cc))
        })
        .collect()
});

/// Octave number with middle C (60) in octave 4
pub fn octave(note: u8) -> i8 {
    (note / 12) as i8 - 1
}

/// Note name such as "C4" or "F#-1"
pub fn note_name(note: u8) -> &'static str {
    NOTE_NAMES[note as usize].as_str()
}

/// Equal-tempered frequency in Hz, A4 (69) = 440 Hz
pub fn frequency(note: u8) -> f64 {
    440.0 * 2f64.powf((note as f64 - 69.0) / 12.0)
}

/// Human readable controller name, "CC<n>" for unnamed controllers
pub fn controller_name(controller: u8) -> &'static str {
    CONTROLLER_LABELS[controller as usize].as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(72), "C5");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(127), "G9");
        assert_eq!(note_name(61), "C#4");
    }

    #[test]
    fn test_note_names_are_periodic() {
        for note in 0..=115u8 {
            let here = note_name(note);
            let up = note_name(note + 12);
            let class_len = PITCH_CLASSES[note as usize % 12].len();
            assert_eq!(&here[..class_len], &up[..class_len]);
            assert_eq!(octave(note + 12), octave(note) + 1);
        }
    }

    #[test]
    fn test_frequency() {
        assert_eq!(frequency(69), 440.0);
        assert!((frequency(60) - 261.63).abs() < 0.01);
        assert!((frequency(81) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn test_controller_names() {
        assert_eq!(controller_name(7), "Volume");
        assert_eq!(controller_name(16), "Sensor 1");
        assert_eq!(controller_name(20), "CC20");
        assert_eq!(controller_name(64), "Sustain Pedal");
    }
}
