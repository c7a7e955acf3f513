use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};
use std::hint::black_box;
use std::time::Duration;
use webp_bridge::{
    decode_rgba, decode_yuva, encode, encode_to_vec, AnimationDecoder, AnimationEncoder,
    DecodeOptions, EncodeConfig, Preset, Rect,
};

fn test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    })
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let image = test_image(512, 512);
    group.throughput(Throughput::Bytes(512 * 512 * 3));
    for quality in [50.0f32, 90.0] {
        let config = EncodeConfig::preset(Preset::Photo, quality).unwrap();
        group.bench_with_input(BenchmarkId::new("lossy", quality), &config, |b, config| {
            b.iter(|| encode_to_vec(black_box(&image), config).unwrap())
        });
    }
    let lossless = EncodeConfig::lossless_preset(1).unwrap();
    group.bench_function("lossless_level1", |b| {
        b.iter(|| encode_to_vec(black_box(&image), &lossless).unwrap())
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let config = EncodeConfig::preset(Preset::Default, 75.0).unwrap();
    let data = encode_to_vec(&test_image(1024, 768), &config).unwrap();
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("rgba", |b| {
        b.iter(|| decode_rgba(black_box(&data), &DecodeOptions::default()).unwrap())
    });
    group.bench_function("yuva", |b| {
        b.iter(|| decode_yuva(black_box(&data), &DecodeOptions::default()).unwrap())
    });
    let scaled = DecodeOptions {
        scale: Rect::from_size(256, 192),
        ..Default::default()
    };
    group.bench_function("rgba_scaled_quarter", |b| {
        b.iter(|| decode_rgba(black_box(&data), &scaled).unwrap())
    });
    group.finish();
}

fn bench_animation(c: &mut Criterion) {
    let frames: Vec<RgbImage> = (0..8u32)
        .map(|i| RgbImage::from_fn(64, 64, |x, y| Rgb([(x + i * 8) as u8, y as u8, 0])))
        .collect();

    let build = || {
        let mut enc = AnimationEncoder::new(64, 64, 0, 0).unwrap();
        for f in &frames {
            enc.add_frame(f, Duration::from_millis(50)).unwrap();
        }
        enc.assemble().unwrap()
    };
    let data = build();

    let mut group = c.benchmark_group("animation");
    group.sample_size(20);
    group.bench_function("assemble_8_frames", |b| b.iter(build));
    group.bench_function("decode_all_8_frames", |b| {
        b.iter(|| {
            AnimationDecoder::new(black_box(&data))
                .unwrap()
                .decode_all()
                .unwrap()
        })
    });
    group.finish();
}

// A 1x1 encode is dominated by per-call setup: picture, config and callback
// registration. It should stay negligible next to real images.
fn bench_call_overhead(c: &mut Criterion) {
    let pixel = test_image(1, 1);
    let config = EncodeConfig::lossless_preset(0).unwrap();
    let mut sink = Vec::with_capacity(256);

    c.bench_function("encode_1x1_call_overhead", |b| {
        b.iter(|| {
            sink.clear();
            encode(&mut sink, black_box(&pixel), &config).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_animation,
    bench_call_overhead
);
criterion_main!(benches);
