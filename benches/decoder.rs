use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use terra_monitor::device::DeviceClassifier;
use terra_monitor::midi::MessageDecoder;

fn bench_decode(c: &mut Criterion) {
    let decoder = MessageDecoder::new();
    let frames: &[&[u8]] = &[
        &[0x98, 0x24, 0x64],
        &[0xB8, 0x10, 0x7F],
        &[0xE0, 0x00, 0x40],
        &[0xF8],
        &[0xF0, 0x7D, 0x00, 0x01, 0x10, 0x20, 0xF7],
        &[0x90],
    ];

    c.bench_function("decode_mixed_frames", |b| {
        b.iter(|| {
            for frame in frames {
                black_box(decoder.decode(black_box(frame), Utc::now(), None));
            }
        })
    });
}

fn bench_classify(c: &mut Criterion) {
    let classifier = DeviceClassifier::new();
    let names = [
        "Midi-Terra",
        "Terra Sensor MIDI",
        "USB MIDI Device",
        "Realtek USB Audio",
        "Arduino Leonardo",
    ];

    c.bench_function("classify_names", |b| {
        b.iter(|| {
            for name in names {
                black_box(classifier.classify_strings(Some(black_box(name)), None));
            }
        })
    });
}

criterion_group!(benches, bench_decode, bench_classify);
criterion_main!(benches);
