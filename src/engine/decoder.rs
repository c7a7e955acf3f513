// src/engine/decoder.rs
//
// Single-image decode pipeline.
// probe features -> size output -> allocate owned buffer -> WebPDecode into it.
// The engine writes straight into the buffer this module allocates; nothing
// is handed back unless the engine reported success.

use crate::buffer::{AlphaMode, ColorSpace, RgbBuffer, RgbaBuffer, YuvaImage};
use crate::codecs::webp_safe::SafeDecoderConfig;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::{Result, WebpError};
use crate::geometry::{PlaneLayout, Rect};
use libwebp_sys::{
    WebPBitstreamFeatures, WebPDecoderOptions, WebPGetDecoderVersion, WebPGetEncoderVersion,
    WebPGetInfo, WEBP_CSP_MODE,
};
use std::ffi::c_int;
use tracing::debug;

/// Linked decoder version, packed as `0xMMmmpp`.
pub fn decoder_version() -> u32 {
    unsafe { WebPGetDecoderVersion() as u32 }
}

/// Linked encoder version, packed as `0xMMmmpp`.
pub fn encoder_version() -> u32 {
    unsafe { WebPGetEncoderVersion() as u32 }
}

/// Reject dimensions beyond the format limit or the decompression-bomb guard.
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(WebpError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(WebpError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Header-only dimension read. `None` if the header is not valid WebP.
pub fn get_info(data: &[u8]) -> Option<(u32, u32)> {
    let mut width: c_int = 0;
    let mut height: c_int = 0;
    let ok = unsafe { WebPGetInfo(data.as_ptr(), data.len(), &mut width, &mut height) };
    if ok == 0 {
        return None;
    }
    Some((width as u32, height as u32))
}

/// Compression used by a bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitstreamFormat {
    /// Mixed (animation with both kinds of frame) or unknown.
    Undefined,
    Lossy,
    Lossless,
}

impl BitstreamFormat {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => BitstreamFormat::Lossy,
            2 => BitstreamFormat::Lossless,
            _ => BitstreamFormat::Undefined,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            BitstreamFormat::Undefined => 0,
            BitstreamFormat::Lossy => 1,
            BitstreamFormat::Lossless => 2,
        }
    }
}

/// What the header says about a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitstreamFeatures {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub has_animation: bool,
    pub format: BitstreamFormat,
}

impl BitstreamFeatures {
    fn from_raw(raw: &WebPBitstreamFeatures) -> Self {
        Self {
            width: raw.width as u32,
            height: raw.height as u32,
            has_alpha: raw.has_alpha != 0,
            has_animation: raw.has_animation != 0,
            format: BitstreamFormat::from_code(raw.format as i32),
        }
    }
}

/// Read the stream header without decoding pixels.
pub fn probe_features(data: &[u8]) -> Result<BitstreamFeatures> {
    let mut cfg = SafeDecoderConfig::new()?;
    probe(&mut cfg, data)
}

fn probe(cfg: &mut SafeDecoderConfig, data: &[u8]) -> Result<BitstreamFeatures> {
    let status = cfg.probe(data);
    if !status.is_ok() {
        return Err(WebpError::get_features_failed(status));
    }
    Ok(BitstreamFeatures::from_raw(cfg.features()))
}

/// Decoder tuning. Empty rectangles disable crop and scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub bypass_filtering: bool,
    pub no_fancy_upsampling: bool,
    /// Region of the source to decode.
    pub crop: Rect,
    /// Output size; only its width and height are used.
    pub scale: Rect,
    pub use_threads: bool,
    /// 0 (off) to 100.
    pub dithering_strength: i32,
    /// 0 (off) to 100.
    pub alpha_dithering_strength: i32,
    /// Flip output vertically.
    pub flip: bool,
}

impl DecodeOptions {
    fn apply(&self, raw: &mut WebPDecoderOptions) {
        raw.bypass_filtering = self.bypass_filtering as c_int;
        raw.no_fancy_upsampling = self.no_fancy_upsampling as c_int;
        raw.use_cropping = !self.crop.is_empty() as c_int;
        if !self.crop.is_empty() {
            raw.crop_left = self.crop.min_x as c_int;
            raw.crop_top = self.crop.min_y as c_int;
            raw.crop_width = self.crop.width() as c_int;
            raw.crop_height = self.crop.height() as c_int;
        }
        raw.use_scaling = !self.scale.is_empty() as c_int;
        if !self.scale.is_empty() {
            raw.scaled_width = self.scale.width() as c_int;
            raw.scaled_height = self.scale.height() as c_int;
        }
        raw.use_threads = self.use_threads as c_int;
        raw.dithering_strength = self.dithering_strength as c_int;
        raw.alpha_dithering_strength = self.alpha_dithering_strength as c_int;
        raw.flip = self.flip as c_int;
    }
}

/// Output dimensions for a probed `(width, height)`.
///
/// Scale wins over crop, crop wins over the probed size. The engine crops
/// first and scales the cropped region, so a scale target is always the
/// final size.
pub fn output_size(probed: (u32, u32), options: &DecodeOptions) -> (u32, u32) {
    if !options.scale.is_empty() {
        (options.scale.width(), options.scale.height())
    } else if !options.crop.is_empty() {
        (options.crop.width(), options.crop.height())
    } else {
        probed
    }
}

fn alloc_zeroed(len: usize, what: &'static str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| WebpError::allocation_failed(what))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Shared front half of every decode: probe, size, guard, configure.
fn prepare(
    data: &[u8],
    options: &DecodeOptions,
) -> Result<(SafeDecoderConfig, BitstreamFeatures, u32, u32)> {
    let mut cfg = SafeDecoderConfig::new()?;
    let features = probe(&mut cfg, data)?;
    let (width, height) = output_size((features.width, features.height), options);
    if width == 0 || height == 0 {
        return Err(WebpError::invalid_argument(
            "output size",
            format!("{width}x{height}"),
            "Decoded image would be empty",
        ));
    }
    check_dimensions(width, height)?;
    options.apply(cfg.options_mut());
    Ok((cfg, features, width, height))
}

fn decode_interleaved(
    data: &[u8],
    options: &DecodeOptions,
    mode: WEBP_CSP_MODE,
    channels: usize,
) -> Result<(u32, u32, usize, Vec<u8>)> {
    let (mut cfg, _features, width, height) = prepare(data, options)?;
    let stride = width as usize * channels;
    let mut pixels = alloc_zeroed(stride * height as usize, "decode output buffer")?;
    let status = cfg.decode_into_rgba(data, mode, &mut pixels, stride);
    if !status.is_ok() {
        return Err(WebpError::decode_failed(status));
    }
    debug!(
        target: "webp_bridge::decode",
        width,
        height,
        channels,
        input_bytes = data.len(),
        "decoded"
    );
    Ok((width, height, stride, pixels))
}

/// Decode to straight-alpha RGBA.
pub fn decode_rgba(data: &[u8], options: &DecodeOptions) -> Result<RgbaBuffer> {
    let (w, h, stride, pixels) =
        decode_interleaved(data, options, WEBP_CSP_MODE::MODE_RGBA, 4)?;
    RgbaBuffer::from_raw(w, h, stride, pixels, AlphaMode::Straight)
}

/// Decode to RGBA with colour premultiplied by alpha.
pub fn decode_premultiplied_rgba(data: &[u8], options: &DecodeOptions) -> Result<RgbaBuffer> {
    let (w, h, stride, pixels) =
        decode_interleaved(data, options, WEBP_CSP_MODE::MODE_rgbA, 4)?;
    RgbaBuffer::from_raw(w, h, stride, pixels, AlphaMode::Premultiplied)
}

/// Decode to RGB, dropping any alpha.
pub fn decode_rgb(data: &[u8], options: &DecodeOptions) -> Result<RgbBuffer> {
    let (w, h, stride, pixels) = decode_interleaved(data, options, WEBP_CSP_MODE::MODE_RGB, 3)?;
    RgbBuffer::from_raw(w, h, stride, pixels)
}

/// Decode to 4:2:0 planes. The alpha plane exists iff the stream has alpha.
pub fn decode_yuva(data: &[u8], options: &DecodeOptions) -> Result<YuvaImage> {
    let (mut cfg, features, width, height) = prepare(data, options)?;
    let color_space = if features.has_alpha {
        ColorSpace::Yuv420A
    } else {
        ColorSpace::Yuv420
    };
    let rect = Rect::from_size(width, height);
    let layout = PlaneLayout::compute(rect, features.has_alpha);
    let planes = alloc_zeroed(layout.total_len(), "decode output planes")?;
    let mut image = YuvaImage::from_parts(rect, color_space, planes)?;
    let (y_stride, c_stride, a_stride) = (image.y_stride(), image.c_stride(), image.a_stride());
    let (y, cb, cr, a) = image.planes_mut();
    let status = cfg.decode_into_yuva(
        data,
        (y, y_stride),
        cb,
        cr,
        c_stride,
        a.map(|plane| (plane, a_stride)),
    );
    if !status.is_ok() {
        return Err(WebpError::decode_failed(status));
    }
    debug!(
        target: "webp_bridge::decode",
        width,
        height,
        has_alpha = features.has_alpha,
        input_bytes = data.len(),
        "decoded planar"
    );
    Ok(image)
}
