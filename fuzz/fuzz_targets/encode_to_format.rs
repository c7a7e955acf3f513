#![no_main]

//! Fuzz target for the still and animation encode paths.
//! Arbitrary pixels, layouts and configs; we only care about panics and leaks.

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use std::time::Duration;
use webp_bridge::{
    encode_to_vec, AlphaMode, AnimationEncoder, EncodeConfig, GrayBuffer, Preset, RgbBuffer,
    RgbaBuffer,
};

#[derive(Arbitrary, Debug)]
struct EncodeSeed {
    layout: u8,
    preset: u8,
    quality: u8,
    method: u8,
    lossless: bool,
    width: u8,
    height: u8,
    extra_stride: u8,
}

fn fill(data: &[u8], len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| data.get(i % data.len().max(1)).copied().unwrap_or(128))
        .collect()
}

fn config(seed: &EncodeSeed) -> Option<EncodeConfig> {
    let preset = match seed.preset % 6 {
        0 => Preset::Default,
        1 => Preset::Picture,
        2 => Preset::Photo,
        3 => Preset::Drawing,
        4 => Preset::Icon,
        _ => Preset::Text,
    };
    let mut config = EncodeConfig::preset(preset, (seed.quality % 101) as f32).ok()?;
    // deliberately lets 7..=9 through to exercise validation
    config.set_method((seed.method % 10) as i32);
    config.set_lossless(seed.lossless);
    Some(config)
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let mut unstructured = Unstructured::new(data);
    let seed: EncodeSeed = match EncodeSeed::arbitrary(&mut unstructured) {
        Ok(s) => s,
        Err(_) => return,
    };
    let Some(config) = config(&seed) else {
        return;
    };

    // Limit dimensions to avoid OOM (max 64x64)
    let w = (seed.width as u32 % 64).max(1);
    let h = (seed.height as u32 % 64).max(1);
    let pad = (seed.extra_stride % 8) as usize;

    let result = match seed.layout % 4 {
        0 => {
            let stride = w as usize * 3 + pad;
            RgbBuffer::from_raw(w, h, stride, fill(data, stride * h as usize))
                .and_then(|img| encode_to_vec(&img, &config))
        }
        1 | 2 => {
            let alpha = if seed.layout % 4 == 1 {
                AlphaMode::Straight
            } else {
                AlphaMode::Premultiplied
            };
            let stride = w as usize * 4 + pad;
            RgbaBuffer::from_raw(w, h, stride, fill(data, stride * h as usize), alpha)
                .and_then(|img| encode_to_vec(&img, &config))
        }
        _ => {
            let stride = w as usize + pad;
            GrayBuffer::from_raw(w, h, stride, fill(data, stride * h as usize))
                .and_then(|img| encode_to_vec(&img, &config))
        }
    };
    let _ = result;

    // Two frames through an animation session with the same config.
    if let Ok(mut enc) = AnimationEncoder::new(w, h, 0, 0) {
        let stride = w as usize * 3;
        for shift in 0..2u8 {
            let pixels: Vec<u8> = fill(data, stride * h as usize)
                .into_iter()
                .map(|b| b.wrapping_add(shift))
                .collect();
            if let Ok(frame) = RgbBuffer::from_raw(w, h, stride, pixels) {
                let _ = enc.add_frame_with_config(&frame, Duration::from_millis(30), &config);
            }
        }
        let _ = enc.assemble();
    }
});
