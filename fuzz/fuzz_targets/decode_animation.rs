#![no_main]

use libfuzzer_sys::fuzz_target;
use webp_bridge::AnimationDecoder;

fuzz_target!(|data: &[u8]| {
    let Ok(mut dec) = AnimationDecoder::new(data) else {
        return;
    };
    // Cap the work per input; frame count comes from the untrusted header.
    for _ in 0..64 {
        match dec.next_frame() {
            Ok(Some(_)) => {}
            _ => break,
        }
    }
    dec.reset();
    let _ = dec.next_frame();
});
