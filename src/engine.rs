// src/engine.rs
//
// The core of webp-bridge. Pipelines that drive libwebp:
// 1. Decode a still image into a buffer we own
// 2. Encode any image source, streaming chunks into a caller's sink
// 3. Decode and build animations frame by frame
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// This is the WebP format limit; the engine cannot represent anything larger.
pub const MAX_DIMENSION: u32 = 16383;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod animation;
mod common;
mod config;
mod decoder;
mod encoder;
pub(crate) mod registry;

pub use animation::{
    Animation, AnimationDecoder, AnimationEncoder, AnimationEncoderOptions, AnimationFrame,
    AnimationInfo,
};
pub use config::{EncodeConfig, FilterType, ImageHint, Preprocessing, Preset};
pub use decoder::{
    check_dimensions, decode_premultiplied_rgba, decode_rgb, decode_rgba, decode_yuva,
    decoder_version, encoder_version, get_info, output_size, probe_features, BitstreamFeatures,
    BitstreamFormat, DecodeOptions,
};
pub use encoder::{encode, encode_to_vec, encode_with_progress, EncodeSummary};
pub use registry::registered_handles;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WebpError;

    #[test]
    fn test_check_dimensions_within_limits() {
        assert!(check_dimensions(1, 1).is_ok());
        assert!(check_dimensions(MAX_DIMENSION, 100).is_ok());
        assert!(check_dimensions(8000, 8000).is_ok());
    }

    #[test]
    fn test_check_dimensions_exceeds_dimension_limit() {
        let err = check_dimensions(MAX_DIMENSION + 1, 1).unwrap_err();
        assert!(matches!(
            err,
            WebpError::DimensionExceedsLimit {
                dimension,
                max: MAX_DIMENSION
            } if dimension == MAX_DIMENSION + 1
        ));
        assert!(check_dimensions(1, MAX_DIMENSION + 1).is_err());
    }

    #[test]
    fn test_check_dimensions_exceeds_pixel_limit() {
        // within the per-side limit, over the total
        let err = check_dimensions(MAX_DIMENSION, MAX_DIMENSION).unwrap_err();
        assert!(matches!(err, WebpError::PixelCountExceedsLimit { .. }));
    }

    #[test]
    fn test_versions_are_packed() {
        // 0xMMmmpp: every supported engine is at least 0.5.0
        assert!(decoder_version() >= 0x000500);
        assert!(encoder_version() >= 0x000500);
        assert!(decoder_version() < 0x1_00_00_00);
    }
}
