#![no_main]

use libfuzzer_sys::fuzz_target;
use webp_bridge::{decode_rgb, decode_rgba, decode_yuva, DecodeOptions, Rect};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let _ = decode_rgba(data, &DecodeOptions::default());
    let _ = decode_yuva(data, &DecodeOptions::default());

    // Small scale keeps the output allocation bounded whatever the header claims.
    let scaled = DecodeOptions {
        scale: Rect::from_size(16, 16),
        use_threads: true,
        ..Default::default()
    };
    let _ = decode_rgb(data, &scaled);
});
