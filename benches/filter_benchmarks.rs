//! Benchmarks for the capture filter chain
//!
//! The chain runs once per capture period on a 320-sample frame; these
//! benches keep its per-frame cost in view.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use voicewire::audio::{FilterChain, NoiseGate};
use voicewire::config::AudioConfig;

fn bench_config() -> AudioConfig {
    AudioConfig {
        sample_rate: 16000,
        frame_samples: 320,
        capture_interval_ms: 15,
        mic_gain: 0.025,
        attenuation_shift: 11,
        noise_gate_threshold: 25_000.0,
        opus_bitrate: 24_000,
        input_device: None,
        output_device: None,
    }
}

fn speech_like_frame() -> Vec<i32> {
    (0..320)
        .map(|i| {
            let t = i as f32 / 16000.0;
            ((t * 220.0 * std::f32::consts::TAU).sin() * 1_500_000.0) as i32
        })
        .collect()
}

fn bench_filter_chain(c: &mut Criterion) {
    let mut chain = FilterChain::new(&bench_config());
    let frame = speech_like_frame();

    c.bench_function("filter_chain_320_samples", |b| {
        b.iter(|| {
            let mut raw = frame.clone();
            let mut out = [0i16; 320];
            chain.process(black_box(&mut raw), &mut out);
            black_box(out[0])
        })
    });
}

fn bench_noise_gate(c: &mut Criterion) {
    let gate = NoiseGate::new(25_000.0);
    let frame = speech_like_frame();

    c.bench_function("noise_gate_rms_320_samples", |b| {
        b.iter(|| {
            let mut raw = frame.clone();
            black_box(gate.process_frame(black_box(&mut raw)))
        })
    });
}

criterion_group!(benches, bench_filter_chain, bench_noise_gate);
criterion_main!(benches);
