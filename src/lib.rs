// lib.rs
//
// webp-bridge: a safe orchestration layer over libwebp
//
// Design goals:
// - The engine writes straight into buffers we own; nothing it owns escapes
// - Every native object is released exactly once, on every exit path
// - Encoded output streams into any `io::Write` without buffering here
// - Engine status codes survive as typed errors callers can branch on

pub mod buffer;
mod codecs;
pub mod engine;
pub mod error;
pub mod geometry;

pub use buffer::{
    AlphaMode, ColorSpace, GrayBuffer, ImageSource, PixelLayout, RgbBuffer, RgbaBuffer, YuvaImage,
};
pub use engine::{
    decode_premultiplied_rgba, decode_rgb, decode_rgba, decode_yuva, encode, encode_to_vec,
    encode_with_progress, get_info, output_size, probe_features, Animation, AnimationDecoder,
    AnimationEncoder, AnimationEncoderOptions, AnimationFrame, AnimationInfo, BitstreamFeatures,
    BitstreamFormat, DecodeOptions, EncodeConfig, EncodeSummary, FilterType, ImageHint,
    Preprocessing, Preset,
};
pub use error::{DecodeStatus, EncodeErrorCode, ErrorCategory, Result, WebpError};
pub use geometry::{PlaneLayout, Rect};

/// Get library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Linked engine version as `major.minor.patch`, e.g. `1.4.0`.
pub fn engine_version() -> String {
    let packed = engine::decoder_version();
    format!(
        "{}.{}.{}",
        (packed >> 16) & 0xff,
        (packed >> 8) & 0xff,
        packed & 0xff
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_engine_version_is_dotted() {
        let v = engine_version();
        let parts: Vec<u32> = v.split('.').map(|p| p.parse().unwrap()).collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0] >= 1 || parts[1] >= 5, "engine {v} predates 0.5.0");
    }
}
