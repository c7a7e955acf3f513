#![no_main]

use libfuzzer_sys::fuzz_target;
use webp_bridge::{get_info, probe_features};

fuzz_target!(|data: &[u8]| {
    let info = get_info(data);
    if let Ok(features) = probe_features(data) {
        // Both header readers must agree on any stream they both accept.
        if let Some((w, h)) = info {
            assert_eq!((w, h), (features.width, features.height));
        }
    }
});
