// src/engine/config.rs
//
// Encoder configuration marshaling.
// An EncodeConfig is a plain Rust record seeded from the engine's own preset
// tables. It is converted into the engine's WebPConfig and validated by the
// engine at every encode entry point, before any picture is acquired.

use super::decoder::encoder_version;
use crate::error::{Result, WebpError};
use libwebp_sys::{
    WebPConfig, WebPConfigLosslessPreset, WebPImageHint, WebPPreset, WebPValidateConfig,
};
use std::ffi::c_int;

/// Engine version that introduced `near_lossless` and `exact`.
const NEAR_LOSSLESS_MIN_VERSION: u32 = 0x000500;

/// Content-aware parameter presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    #[default]
    Default,
    /// Digital picture, like portrait or indoor shot
    Picture,
    /// Outdoor photograph with natural lighting
    Photo,
    /// Hand or line drawing with high-contrast details
    Drawing,
    /// Small-sized colorful images
    Icon,
    /// Text-like content
    Text,
}

impl Preset {
    fn to_raw(self) -> WebPPreset {
        match self {
            Preset::Default => WebPPreset::WEBP_PRESET_DEFAULT,
            Preset::Picture => WebPPreset::WEBP_PRESET_PICTURE,
            Preset::Photo => WebPPreset::WEBP_PRESET_PHOTO,
            Preset::Drawing => WebPPreset::WEBP_PRESET_DRAWING,
            Preset::Icon => WebPPreset::WEBP_PRESET_ICON,
            Preset::Text => WebPPreset::WEBP_PRESET_TEXT,
        }
    }
}

/// Hint about the source content, used by the lossless encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageHint {
    #[default]
    Default,
    Picture,
    Photo,
    /// Discrete tone image (graph, map-tile etc).
    Graph,
}

impl ImageHint {
    fn to_raw(self) -> WebPImageHint {
        match self {
            ImageHint::Default => WebPImageHint::WEBP_HINT_DEFAULT,
            ImageHint::Picture => WebPImageHint::WEBP_HINT_PICTURE,
            ImageHint::Photo => WebPImageHint::WEBP_HINT_PHOTO,
            ImageHint::Graph => WebPImageHint::WEBP_HINT_GRAPH,
        }
    }

    fn from_raw(raw: WebPImageHint) -> Self {
        match raw {
            WebPImageHint::WEBP_HINT_PICTURE => ImageHint::Picture,
            WebPImageHint::WEBP_HINT_PHOTO => ImageHint::Photo,
            WebPImageHint::WEBP_HINT_GRAPH => ImageHint::Graph,
            _ => ImageHint::Default,
        }
    }
}

/// Loop filter flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Simple,
    Strong,
}

impl FilterType {
    fn code(self) -> c_int {
        match self {
            FilterType::Simple => 0,
            FilterType::Strong => 1,
        }
    }

    fn from_code(code: c_int) -> Self {
        if code == 0 {
            FilterType::Simple
        } else {
            FilterType::Strong
        }
    }
}

/// Pre-encode filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preprocessing {
    #[default]
    None,
    SegmentSmooth,
    PseudoRandomDithering,
}

impl Preprocessing {
    fn code(self) -> c_int {
        match self {
            Preprocessing::None => 0,
            Preprocessing::SegmentSmooth => 1,
            Preprocessing::PseudoRandomDithering => 2,
        }
    }

    fn from_code(code: c_int) -> Self {
        match code {
            1 => Preprocessing::SegmentSmooth,
            2 => Preprocessing::PseudoRandomDithering,
            _ => Preprocessing::None,
        }
    }
}

/// Encoder parameters.
///
/// Build one with [`EncodeConfig::preset`] or [`EncodeConfig::lossless_preset`],
/// adjust it with the `set_*` methods, then hand it to any number of encode calls.
/// Setters never validate; [`EncodeConfig::validate`] asks the engine whether
/// the combination is acceptable, and every encode entry point does the same.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeConfig {
    quality: f32,
    method: i32,
    target_size: i32,
    target_psnr: f32,
    lossless: bool,
    image_hint: ImageHint,
    segments: i32,
    sns_strength: i32,
    filter_strength: i32,
    filter_sharpness: i32,
    filter_type: FilterType,
    autofilter: bool,
    alpha_compression: i32,
    alpha_filtering: i32,
    alpha_quality: i32,
    pass: i32,
    preprocessing: Preprocessing,
    partitions: i32,
    partition_limit: i32,
    emulate_jpeg_size: bool,
    thread_level: i32,
    low_memory: bool,
    near_lossless: i32,
    exact: bool,
    use_sharp_yuv: bool,
}

fn require_near_lossless_support(field: &str) {
    let version = encoder_version();
    assert!(
        version >= NEAR_LOSSLESS_MIN_VERSION,
        "EncodeConfig::{field} requires libwebp >= 0.5.0, linked encoder is {:#08x}",
        version
    );
}

impl EncodeConfig {
    /// Seed every field from one of the engine's presets.
    pub fn preset(preset: Preset, quality: f32) -> Result<Self> {
        let raw = WebPConfig::new_with_preset(preset.to_raw(), quality)
            .map_err(|_| WebpError::init_failed("encoder config preset"))?;
        Ok(Self::from_raw(&raw))
    }

    /// Lossless configuration at `level` (0 = fastest, 9 = smallest).
    pub fn lossless_preset(level: i32) -> Result<Self> {
        if !(0..=9).contains(&level) {
            return Err(WebpError::invalid_argument(
                "lossless level",
                level.to_string(),
                "Must be between 0 and 9",
            ));
        }
        let mut raw =
            WebPConfig::new().map_err(|_| WebpError::init_failed("encoder config"))?;
        if unsafe { WebPConfigLosslessPreset(&mut raw, level as c_int) } == 0 {
            return Err(WebpError::init_failed("lossless encoder config preset"));
        }
        Ok(Self::from_raw(&raw))
    }

    fn from_raw(raw: &WebPConfig) -> Self {
        Self {
            quality: raw.quality,
            method: raw.method,
            target_size: raw.target_size,
            target_psnr: raw.target_PSNR,
            lossless: raw.lossless != 0,
            image_hint: ImageHint::from_raw(raw.image_hint),
            segments: raw.segments,
            sns_strength: raw.sns_strength,
            filter_strength: raw.filter_strength,
            filter_sharpness: raw.filter_sharpness,
            filter_type: FilterType::from_code(raw.filter_type),
            autofilter: raw.autofilter != 0,
            alpha_compression: raw.alpha_compression,
            alpha_filtering: raw.alpha_filtering,
            alpha_quality: raw.alpha_quality,
            pass: raw.pass,
            preprocessing: Preprocessing::from_code(raw.preprocessing),
            partitions: raw.partitions,
            partition_limit: raw.partition_limit,
            emulate_jpeg_size: raw.emulate_jpeg_size != 0,
            thread_level: raw.thread_level,
            low_memory: raw.low_memory != 0,
            near_lossless: raw.near_lossless,
            exact: raw.exact != 0,
            use_sharp_yuv: raw.use_sharp_yuv != 0,
        }
    }

    /// Marshal into the engine's record. Not validated.
    pub(crate) fn to_raw(&self) -> Result<WebPConfig> {
        let mut raw =
            WebPConfig::new().map_err(|_| WebpError::init_failed("encoder config"))?;
        raw.quality = self.quality;
        raw.method = self.method;
        raw.target_size = self.target_size;
        raw.target_PSNR = self.target_psnr;
        raw.lossless = self.lossless as c_int;
        raw.image_hint = self.image_hint.to_raw();
        raw.segments = self.segments;
        raw.sns_strength = self.sns_strength;
        raw.filter_strength = self.filter_strength;
        raw.filter_sharpness = self.filter_sharpness;
        raw.filter_type = self.filter_type.code();
        raw.autofilter = self.autofilter as c_int;
        raw.alpha_compression = self.alpha_compression;
        raw.alpha_filtering = self.alpha_filtering;
        raw.alpha_quality = self.alpha_quality;
        raw.pass = self.pass;
        raw.preprocessing = self.preprocessing.code();
        raw.partitions = self.partitions;
        raw.partition_limit = self.partition_limit;
        raw.emulate_jpeg_size = self.emulate_jpeg_size as c_int;
        raw.thread_level = self.thread_level;
        raw.low_memory = self.low_memory as c_int;
        raw.near_lossless = self.near_lossless;
        raw.exact = self.exact as c_int;
        raw.use_sharp_yuv = self.use_sharp_yuv as c_int;
        Ok(raw)
    }

    /// Structural check by the engine. Idempotent.
    pub fn validate(&self) -> Result<()> {
        self.validated().map(|_| ())
    }

    /// Marshal and validate in one step; what encode entry points consume.
    pub(crate) fn validated(&self) -> Result<WebPConfig> {
        let raw = self.to_raw()?;
        if unsafe { WebPValidateConfig(&raw) } == 0 {
            return Err(WebpError::invalid_configuration(self.describe_violation()));
        }
        Ok(raw)
    }

    /// The engine only answers yes/no; name the first field outside its range.
    fn describe_violation(&self) -> String {
        let checks: [(&str, bool); 16] = [
            ("quality", (0.0..=100.0).contains(&self.quality)),
            ("method", (0..=6).contains(&self.method)),
            ("segments", (1..=4).contains(&self.segments)),
            ("sns_strength", (0..=100).contains(&self.sns_strength)),
            ("filter_strength", (0..=100).contains(&self.filter_strength)),
            ("filter_sharpness", (0..=7).contains(&self.filter_sharpness)),
            ("alpha_compression", (0..=1).contains(&self.alpha_compression)),
            ("alpha_filtering", (0..=2).contains(&self.alpha_filtering)),
            ("alpha_quality", (0..=100).contains(&self.alpha_quality)),
            ("pass", (1..=10).contains(&self.pass)),
            ("partitions", (0..=3).contains(&self.partitions)),
            ("partition_limit", (0..=100).contains(&self.partition_limit)),
            ("thread_level", (0..=1).contains(&self.thread_level)),
            ("near_lossless", (0..=100).contains(&self.near_lossless)),
            ("target_size", self.target_size >= 0),
            ("target_psnr", self.target_psnr >= 0.0),
        ];
        match checks.iter().find(|(_, ok)| !ok) {
            Some((field, _)) => format!("{field} is out of range"),
            None => "engine rejected the parameter combination".to_string(),
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// 0 (fastest) to 100 (best). Lossless: effort instead of fidelity.
    pub fn set_quality(&mut self, quality: f32) {
        self.quality = quality;
    }

    pub fn method(&self) -> i32 {
        self.method
    }

    /// Speed/size trade-off, 0 (fast) to 6 (slower, better).
    pub fn set_method(&mut self, method: i32) {
        self.method = method;
    }

    pub fn target_size(&self) -> i32 {
        self.target_size
    }

    /// Target size in bytes; 0 disables.
    pub fn set_target_size(&mut self, bytes: i32) {
        self.target_size = bytes;
    }

    pub fn target_psnr(&self) -> f32 {
        self.target_psnr
    }

    /// Target PSNR in dB; takes precedence over target size. 0 disables.
    pub fn set_target_psnr(&mut self, psnr: f32) {
        self.target_psnr = psnr;
    }

    pub fn lossless(&self) -> bool {
        self.lossless
    }

    pub fn set_lossless(&mut self, lossless: bool) {
        self.lossless = lossless;
    }

    pub fn image_hint(&self) -> ImageHint {
        self.image_hint
    }

    pub fn set_image_hint(&mut self, hint: ImageHint) {
        self.image_hint = hint;
    }

    pub fn segments(&self) -> i32 {
        self.segments
    }

    pub fn set_segments(&mut self, segments: i32) {
        self.segments = segments;
    }

    pub fn sns_strength(&self) -> i32 {
        self.sns_strength
    }

    pub fn set_sns_strength(&mut self, strength: i32) {
        self.sns_strength = strength;
    }

    pub fn filter_strength(&self) -> i32 {
        self.filter_strength
    }

    pub fn set_filter_strength(&mut self, strength: i32) {
        self.filter_strength = strength;
    }

    pub fn filter_sharpness(&self) -> i32 {
        self.filter_sharpness
    }

    pub fn set_filter_sharpness(&mut self, sharpness: i32) {
        self.filter_sharpness = sharpness;
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn set_filter_type(&mut self, filter_type: FilterType) {
        self.filter_type = filter_type;
    }

    pub fn autofilter(&self) -> bool {
        self.autofilter
    }

    pub fn set_autofilter(&mut self, enabled: bool) {
        self.autofilter = enabled;
    }

    pub fn alpha_compression(&self) -> i32 {
        self.alpha_compression
    }

    pub fn set_alpha_compression(&mut self, method: i32) {
        self.alpha_compression = method;
    }

    pub fn alpha_filtering(&self) -> i32 {
        self.alpha_filtering
    }

    pub fn set_alpha_filtering(&mut self, level: i32) {
        self.alpha_filtering = level;
    }

    pub fn alpha_quality(&self) -> i32 {
        self.alpha_quality
    }

    pub fn set_alpha_quality(&mut self, quality: i32) {
        self.alpha_quality = quality;
    }

    pub fn pass(&self) -> i32 {
        self.pass
    }

    pub fn set_pass(&mut self, passes: i32) {
        self.pass = passes;
    }

    pub fn preprocessing(&self) -> Preprocessing {
        self.preprocessing
    }

    pub fn set_preprocessing(&mut self, preprocessing: Preprocessing) {
        self.preprocessing = preprocessing;
    }

    pub fn partitions(&self) -> i32 {
        self.partitions
    }

    /// log2 of the token partition count, 0..=3.
    pub fn set_partitions(&mut self, partitions: i32) {
        self.partitions = partitions;
    }

    pub fn partition_limit(&self) -> i32 {
        self.partition_limit
    }

    pub fn set_partition_limit(&mut self, limit: i32) {
        self.partition_limit = limit;
    }

    pub fn emulate_jpeg_size(&self) -> bool {
        self.emulate_jpeg_size
    }

    pub fn set_emulate_jpeg_size(&mut self, enabled: bool) {
        self.emulate_jpeg_size = enabled;
    }

    pub fn thread_level(&self) -> i32 {
        self.thread_level
    }

    pub fn set_thread_level(&mut self, level: i32) {
        self.thread_level = level;
    }

    pub fn low_memory(&self) -> bool {
        self.low_memory
    }

    pub fn set_low_memory(&mut self, enabled: bool) {
        self.low_memory = enabled;
    }

    /// # Panics
    /// If the linked encoder predates near-lossless support.
    pub fn near_lossless(&self) -> i32 {
        require_near_lossless_support("near_lossless");
        self.near_lossless
    }

    /// Near-lossless preprocessing, 0 (max) to 100 (off).
    ///
    /// # Panics
    /// If the linked encoder predates near-lossless support.
    pub fn set_near_lossless(&mut self, level: i32) {
        require_near_lossless_support("set_near_lossless");
        self.near_lossless = level;
    }

    /// # Panics
    /// If the linked encoder predates exact-alpha support.
    pub fn exact(&self) -> bool {
        require_near_lossless_support("exact");
        self.exact
    }

    /// Keep RGB values under fully transparent pixels.
    ///
    /// # Panics
    /// If the linked encoder predates exact-alpha support.
    pub fn set_exact(&mut self, exact: bool) {
        require_near_lossless_support("set_exact");
        self.exact = exact;
    }

    pub fn use_sharp_yuv(&self) -> bool {
        self.use_sharp_yuv
    }

    pub fn set_use_sharp_yuv(&mut self, enabled: bool) {
        self.use_sharp_yuv = enabled;
    }
}
