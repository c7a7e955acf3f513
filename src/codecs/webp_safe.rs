// src/codecs/webp_safe.rs
//
// Safe abstractions for libwebp FFI operations.
// Every engine object the pipelines touch is owned by one of the RAII wrappers
// below, so each is released exactly once on success, error and unwind paths.
#![deny(unsafe_op_in_unsafe_fn)]

use crate::engine::registry::{self, CallbackHandle};
use crate::engine::check_dimensions;
#[cfg(test)]
use crate::engine::MAX_DIMENSION;
use crate::error::{DecodeStatus, EncodeErrorCode, Result, WebpError};
use libwebp_sys::*;
use std::ffi::{c_int, CStr};
use std::ptr::NonNull;
#[cfg(test)]
use std::{cell::Cell, thread_local};

#[cfg(test)]
thread_local! {
    static TRACK_DROPS: Cell<bool> = Cell::new(false);
    static LIVE_PICTURES: Cell<usize> = Cell::new(0);
    static LIVE_DECODER_CONFIGS: Cell<usize> = Cell::new(0);
    static LIVE_WEBP_DATA: Cell<usize> = Cell::new(0);
    static LIVE_ANIM_DECODERS: Cell<usize> = Cell::new(0);
    static LIVE_ANIM_ENCODERS: Cell<usize> = Cell::new(0);
}

#[cfg(test)]
macro_rules! track {
    ($counter:ident, +) => {
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                $counter.with(|c| c.set(c.get() + 1));
            }
        })
    };
    ($counter:ident, -) => {
        TRACK_DROPS.with(|flag| {
            if flag.get() {
                $counter.with(|c| c.set(c.get().saturating_sub(1)));
            }
        })
    };
}

#[cfg(not(test))]
macro_rules! track {
    ($counter:ident, $op:tt) => {};
}

/// Reject zero, over-limit and bomb-sized dimensions before anything is allocated.
pub fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(WebpError::invalid_argument(
            "dimensions",
            format!("{width}x{height}"),
            "Width and height must be greater than 0",
        ));
    }
    check_dimensions(width, height)
}

/// Smallest slice that covers `rows` rows of `row_bytes` at `stride`.
fn required_len(row_bytes: usize, rows: usize, stride: usize) -> Option<usize> {
    if rows == 0 {
        return Some(0);
    }
    stride.checked_mul(rows - 1)?.checked_add(row_bytes)
}

pub(crate) fn check_source(
    what: &'static str,
    len: usize,
    width: u32,
    height: u32,
    stride: usize,
    channels: usize,
) -> Result<()> {
    let row_bytes = width as usize * channels;
    if stride < row_bytes {
        return Err(WebpError::invalid_buffer(format!(
            "{what} stride {stride} is smaller than a {width}-pixel row ({row_bytes} bytes)"
        )));
    }
    let needed = required_len(row_bytes, height as usize, stride)
        .ok_or_else(|| WebpError::invalid_buffer("source buffer size overflow"))?;
    if len < needed {
        return Err(WebpError::invalid_buffer(format!(
            "{what} buffer holds {len} bytes, {width}x{height} at stride {stride} needs {needed}"
        )));
    }
    if stride > c_int::MAX as usize {
        return Err(WebpError::invalid_buffer(format!("{what} stride {stride} is too large")));
    }
    Ok(())
}

/// Mutable views of an engine-allocated planar picture.
pub struct YuvPlanesMut<'a> {
    pub y: &'a mut [u8],
    pub y_stride: usize,
    pub u: &'a mut [u8],
    pub v: &'a mut [u8],
    pub uv_stride: usize,
    pub a: Option<(&'a mut [u8], usize)>,
}

/// Safe wrapper for WebPPicture.
///
/// The picture lives in a `Box` so its address, which doubles as the
/// callback registry key, stays fixed for the wrapper's whole life.
pub struct SafePicture {
    pic: Box<WebPPicture>,
}

impl SafePicture {
    /// Initialize a picture of the given size. No pixel memory is allocated yet.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        validate_dimensions(width, height)?;
        let mut pic = Box::new(
            WebPPicture::new().map_err(|_| WebpError::init_failed("webp picture"))?,
        );
        pic.width = width as c_int;
        pic.height = height as c_int;
        track!(LIVE_PICTURES, +);
        Ok(Self { pic })
    }

    pub fn width(&self) -> u32 {
        self.pic.width as u32
    }

    pub fn height(&self) -> u32 {
        self.pic.height as u32
    }

    /// Registry key for this picture: the address the engine passes back to callbacks.
    pub fn handle(&self) -> CallbackHandle {
        CallbackHandle::from_ptr(&*self.pic as *const WebPPicture)
    }

    /// Copy interleaved RGB rows into the picture's own ARGB buffer.
    pub fn import_rgb(&mut self, pixels: &[u8], stride: usize) -> Result<()> {
        check_source("RGB", pixels.len(), self.width(), self.height(), stride, 3)?;
        self.pic.use_argb = 1;
        let ok = unsafe { WebPPictureImportRGB(&mut *self.pic, pixels.as_ptr(), stride as c_int) };
        if ok == 0 {
            return Err(WebpError::allocation_failed("picture ARGB buffer"));
        }
        Ok(())
    }

    /// Copy interleaved straight-alpha RGBA rows into the picture's own ARGB buffer.
    pub fn import_rgba(&mut self, pixels: &[u8], stride: usize) -> Result<()> {
        check_source("RGBA", pixels.len(), self.width(), self.height(), stride, 4)?;
        self.pic.use_argb = 1;
        let ok =
            unsafe { WebPPictureImportRGBA(&mut *self.pic, pixels.as_ptr(), stride as c_int) };
        if ok == 0 {
            return Err(WebpError::allocation_failed("picture ARGB buffer"));
        }
        Ok(())
    }

    /// Switch to planar 4:2:0 and let the engine allocate the planes.
    pub fn alloc_yuv(&mut self, with_alpha: bool) -> Result<()> {
        self.pic.use_argb = 0;
        self.pic.colorspace = if with_alpha {
            WebPEncCSP::WEBP_YUV420A
        } else {
            WebPEncCSP::WEBP_YUV420
        };
        let ok = unsafe { WebPPictureAlloc(&mut *self.pic) };
        if ok == 0 {
            return Err(WebpError::allocation_failed("picture YUV planes"));
        }
        Ok(())
    }

    /// Plane views after [`alloc_yuv`](Self::alloc_yuv). `None` if no planes are allocated.
    pub fn yuv_planes_mut(&mut self) -> Option<YuvPlanesMut<'_>> {
        let pic = &mut *self.pic;
        if pic.use_argb != 0 || pic.y.is_null() || pic.u.is_null() || pic.v.is_null() {
            return None;
        }
        let height = pic.height as usize;
        let uv_height = (pic.height as u32).div_ceil(2) as usize;
        let y_stride = pic.y_stride as usize;
        let uv_stride = pic.uv_stride as usize;
        // Plane sizes are exactly stride * rows as allocated by WebPPictureAlloc.
        unsafe {
            let y = std::slice::from_raw_parts_mut(pic.y, y_stride * height);
            let u = std::slice::from_raw_parts_mut(pic.u, uv_stride * uv_height);
            let v = std::slice::from_raw_parts_mut(pic.v, uv_stride * uv_height);
            let a = if pic.a.is_null() {
                None
            } else {
                let a_stride = pic.a_stride as usize;
                Some((
                    std::slice::from_raw_parts_mut(pic.a, a_stride * height),
                    a_stride,
                ))
            };
            Some(YuvPlanesMut {
                y,
                y_stride,
                u,
                v,
                uv_stride,
                a,
            })
        }
    }

    /// Route the engine's output chunks (and optionally progress) through the registry.
    pub fn attach_callbacks(&mut self, with_progress: bool) {
        self.pic.writer = Some(registry::write_callback);
        self.pic.progress_hook = if with_progress {
            Some(registry::progress_callback)
        } else {
            None
        };
    }

    /// Run the engine. On failure the code the engine left in the picture is returned.
    pub fn encode(&mut self, config: &WebPConfig) -> std::result::Result<(), EncodeErrorCode> {
        let ok = unsafe { WebPEncode(config, &mut *self.pic) };
        if ok == 0 {
            return Err(EncodeErrorCode::from_code(self.pic.error_code as i32));
        }
        Ok(())
    }

    /// Get a mutable raw pointer to the WebPPicture.
    ///
    /// # Safety
    /// The caller must not use the pointer after the SafePicture is dropped,
    /// and must not free the picture's memory through it.
    pub unsafe fn as_mut_ptr(&mut self) -> *mut WebPPicture {
        &mut *self.pic
    }
}

impl Drop for SafePicture {
    fn drop(&mut self) {
        unsafe { WebPPictureFree(&mut *self.pic) };
        track!(LIVE_PICTURES, -);
    }
}

/// Safe wrapper for WebPDecoderConfig.
///
/// Output always goes to caller-owned memory: the wrapper attaches a buffer
/// for the length of one `WebPDecode` call and detaches it afterwards.
pub struct SafeDecoderConfig {
    cfg: Box<WebPDecoderConfig>,
}

impl SafeDecoderConfig {
    pub fn new() -> Result<Self> {
        let mut cfg: Box<WebPDecoderConfig> = Box::new(unsafe { std::mem::zeroed() });
        if !unsafe { WebPInitDecoderConfig(&mut *cfg) } {
            return Err(WebpError::init_failed("decoder config"));
        }
        track!(LIVE_DECODER_CONFIGS, +);
        Ok(Self { cfg })
    }

    /// Parse the bitstream header into the config's feature record.
    pub fn probe(&mut self, data: &[u8]) -> DecodeStatus {
        let status = unsafe { WebPGetFeatures(data.as_ptr(), data.len(), &mut self.cfg.input) };
        DecodeStatus::from_code(status as i32)
    }

    pub fn features(&self) -> &WebPBitstreamFeatures {
        &self.cfg.input
    }

    pub fn options_mut(&mut self) -> &mut WebPDecoderOptions {
        &mut self.cfg.options
    }

    /// Decode into an interleaved caller buffer in the given colour mode.
    pub fn decode_into_rgba(
        &mut self,
        data: &[u8],
        mode: WEBP_CSP_MODE,
        out: &mut [u8],
        stride: usize,
    ) -> DecodeStatus {
        let output = &mut self.cfg.output;
        output.colorspace = mode;
        output.is_external_memory = 1;
        unsafe {
            let rgba = &mut output.u.RGBA;
            rgba.rgba = out.as_mut_ptr();
            rgba.stride = stride as c_int;
            rgba.size = out.len();
        }
        let status = self.run(data);
        unsafe {
            let rgba = &mut self.cfg.output.u.RGBA;
            rgba.rgba = std::ptr::null_mut();
            rgba.size = 0;
        }
        status
    }

    /// Decode into caller-owned planes. `alpha` selects `MODE_YUVA`.
    #[allow(clippy::too_many_arguments)]
    pub fn decode_into_yuva(
        &mut self,
        data: &[u8],
        y: (&mut [u8], usize),
        u: &mut [u8],
        v: &mut [u8],
        uv_stride: usize,
        alpha: Option<(&mut [u8], usize)>,
    ) -> DecodeStatus {
        let output = &mut self.cfg.output;
        output.colorspace = if alpha.is_some() {
            WEBP_CSP_MODE::MODE_YUVA
        } else {
            WEBP_CSP_MODE::MODE_YUV
        };
        output.is_external_memory = 1;
        unsafe {
            let yuva = &mut output.u.YUVA;
            yuva.y = y.0.as_mut_ptr();
            yuva.y_stride = y.1 as c_int;
            yuva.y_size = y.0.len();
            yuva.u = u.as_mut_ptr();
            yuva.v = v.as_mut_ptr();
            yuva.u_stride = uv_stride as c_int;
            yuva.v_stride = uv_stride as c_int;
            yuva.u_size = u.len();
            yuva.v_size = v.len();
            match alpha {
                Some((a, a_stride)) => {
                    yuva.a = a.as_mut_ptr();
                    yuva.a_stride = a_stride as c_int;
                    yuva.a_size = a.len();
                }
                None => {
                    yuva.a = std::ptr::null_mut();
                    yuva.a_stride = 0;
                    yuva.a_size = 0;
                }
            }
        }
        let status = self.run(data);
        unsafe {
            let yuva = &mut self.cfg.output.u.YUVA;
            yuva.y = std::ptr::null_mut();
            yuva.u = std::ptr::null_mut();
            yuva.v = std::ptr::null_mut();
            yuva.a = std::ptr::null_mut();
            yuva.y_size = 0;
            yuva.u_size = 0;
            yuva.v_size = 0;
            yuva.a_size = 0;
        }
        status
    }

    fn run(&mut self, data: &[u8]) -> DecodeStatus {
        let status = unsafe { WebPDecode(data.as_ptr(), data.len(), &mut *self.cfg) };
        DecodeStatus::from_code(status as i32)
    }
}

impl Drop for SafeDecoderConfig {
    fn drop(&mut self) {
        unsafe { WebPFreeDecBuffer(&mut self.cfg.output) };
        track!(LIVE_DECODER_CONFIGS, -);
    }
}

/// Safe wrapper for engine-owned WebPData (assembled animation bytes).
pub struct SafeWebPData {
    data: WebPData,
}

impl SafeWebPData {
    pub fn new() -> Self {
        track!(LIVE_WEBP_DATA, +);
        Self {
            data: unsafe { std::mem::zeroed() },
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.data.bytes.is_null() || self.data.size == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.data.bytes, self.data.size) }
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// # Safety
    /// The caller must not use the pointer after the SafeWebPData is dropped.
    pub unsafe fn as_mut_ptr(&mut self) -> *mut WebPData {
        &mut self.data
    }
}

impl Drop for SafeWebPData {
    fn drop(&mut self) {
        unsafe { WebPDataClear(&mut self.data) };
        track!(LIVE_WEBP_DATA, -);
    }
}

impl Default for SafeWebPData {
    fn default() -> Self {
        Self::new()
    }
}

fn anim_decoder_options(use_threads: bool) -> Result<WebPAnimDecoderOptions> {
    let mut opts: WebPAnimDecoderOptions = unsafe { std::mem::zeroed() };
    if unsafe { WebPAnimDecoderOptionsInit(&mut opts) } == 0 {
        return Err(WebpError::init_failed("animation decoder options"));
    }
    opts.color_mode = WEBP_CSP_MODE::MODE_RGBA;
    opts.use_threads = use_threads as c_int;
    Ok(opts)
}

/// Safe wrapper for WebPAnimDecoder plus the input bytes it reads from.
///
/// The engine keeps pointing into the input for the decoder's whole life, so
/// the wrapper owns a private copy and deletes the decoder before the copy.
pub struct SafeAnimDecoder {
    ptr: Option<NonNull<WebPAnimDecoder>>,
    // only the engine reads it, through the pointer taken in `new`
    #[cfg_attr(not(test), allow(dead_code))]
    input: Box<[u8]>,
    canvas_len: usize,
}

impl SafeAnimDecoder {
    pub fn new(bytes: &[u8], use_threads: bool) -> Result<Self> {
        let input: Box<[u8]> = bytes.into();
        let opts = anim_decoder_options(use_threads)?;
        let data = WebPData {
            bytes: input.as_ptr(),
            size: input.len(),
        };
        let raw = unsafe { WebPAnimDecoderNew(&data, &opts) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            WebpError::animation_failed("decoder creation", "input is not a decodable WebP stream")
        })?;
        track!(LIVE_ANIM_DECODERS, +);
        let mut dec = Self {
            ptr: Some(ptr),
            input,
            canvas_len: 0,
        };
        let info = dec.info()?;
        validate_dimensions(info.canvas_width, info.canvas_height)?;
        dec.canvas_len = info.canvas_width as usize * info.canvas_height as usize * 4;
        Ok(dec)
    }

    fn raw(&self) -> Result<NonNull<WebPAnimDecoder>> {
        self.ptr
            .ok_or_else(|| WebpError::animation_failed("decode", "decoder was released"))
    }

    pub fn info(&self) -> Result<WebPAnimInfo> {
        let dec = self.raw()?;
        let mut info: WebPAnimInfo = unsafe { std::mem::zeroed() };
        if unsafe { WebPAnimDecoderGetInfo(dec.as_ptr(), &mut info) } == 0 {
            return Err(WebpError::animation_failed(
                "info",
                "engine could not report animation info",
            ));
        }
        Ok(info)
    }

    pub fn has_more_frames(&self) -> bool {
        match self.ptr {
            Some(dec) => unsafe { WebPAnimDecoderHasMoreFrames(dec.as_ptr()) != 0 },
            None => false,
        }
    }

    /// Decode the next frame. The slice is the engine's canvas and is only
    /// valid until the next call.
    pub fn next_frame(&mut self) -> Result<(&[u8], i32)> {
        let dec = self.raw()?;
        let mut buf: *mut u8 = std::ptr::null_mut();
        let mut timestamp: c_int = 0;
        let ok = unsafe { WebPAnimDecoderGetNext(dec.as_ptr(), &mut buf, &mut timestamp) };
        if ok == 0 || buf.is_null() {
            return Err(WebpError::animation_failed(
                "frame decode",
                "engine could not decode the next frame",
            ));
        }
        let canvas = unsafe { std::slice::from_raw_parts(buf, self.canvas_len) };
        Ok((canvas, timestamp))
    }

    pub fn reset(&mut self) {
        if let Some(dec) = self.ptr {
            unsafe { WebPAnimDecoderReset(dec.as_ptr()) };
        }
    }

    #[cfg(test)]
    fn input_len(&self) -> usize {
        self.input.len()
    }
}

impl Drop for SafeAnimDecoder {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { WebPAnimDecoderDelete(ptr.as_ptr()) };
            track!(LIVE_ANIM_DECODERS, -);
        }
        // `input` is freed after this, once the decoder no longer references it.
    }
}

/// Engine defaults for an animation encoder.
pub fn anim_encoder_options() -> Result<WebPAnimEncoderOptions> {
    let mut opts: WebPAnimEncoderOptions = unsafe { std::mem::zeroed() };
    let ok =
        unsafe { WebPAnimEncoderOptionsInitInternal(&mut opts, WEBP_MUX_ABI_VERSION as c_int) };
    if ok == 0 {
        return Err(WebpError::init_failed("animation encoder options"));
    }
    Ok(opts)
}

/// Safe wrapper for WebPAnimEncoder.
pub struct SafeAnimEncoder {
    ptr: Option<NonNull<WebPAnimEncoder>>,
}

impl SafeAnimEncoder {
    pub fn new(width: u32, height: u32, opts: &WebPAnimEncoderOptions) -> Result<Self> {
        validate_dimensions(width, height)?;
        let raw = unsafe {
            WebPAnimEncoderNewInternal(
                width as c_int,
                height as c_int,
                opts,
                WEBP_MUX_ABI_VERSION as c_int,
            )
        };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            WebpError::animation_failed("encoder creation", "engine rejected the options")
        })?;
        track!(LIVE_ANIM_ENCODERS, +);
        Ok(Self { ptr: Some(ptr) })
    }

    fn raw(&self) -> Result<NonNull<WebPAnimEncoder>> {
        self.ptr
            .ok_or_else(|| WebpError::animation_failed("encode", "encoder was released"))
    }

    fn last_error(enc: NonNull<WebPAnimEncoder>) -> String {
        let msg = unsafe { WebPAnimEncoderGetError(enc.as_ptr()) };
        if msg.is_null() {
            return "unknown error".to_string();
        }
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    }

    /// Add a frame at `timestamp_ms`, or the terminating empty frame when `frame` is `None`.
    pub fn add(
        &mut self,
        frame: Option<&mut SafePicture>,
        timestamp_ms: i32,
        config: Option<&WebPConfig>,
    ) -> Result<()> {
        let enc = self.raw()?;
        let pic = match frame {
            Some(p) => unsafe { p.as_mut_ptr() },
            None => std::ptr::null_mut(),
        };
        let cfg = config.map_or(std::ptr::null(), |c| c as *const WebPConfig);
        let ok = unsafe { WebPAnimEncoderAdd(enc.as_ptr(), pic, timestamp_ms as c_int, cfg) };
        if ok == 0 {
            return Err(WebpError::animation_failed(
                "add frame",
                Self::last_error(enc),
            ));
        }
        Ok(())
    }

    pub fn assemble(&mut self, output: &mut SafeWebPData) -> Result<()> {
        let enc = self.raw()?;
        let ok = unsafe { WebPAnimEncoderAssemble(enc.as_ptr(), output.as_mut_ptr()) };
        if ok == 0 {
            return Err(WebpError::animation_failed("assemble", Self::last_error(enc)));
        }
        Ok(())
    }
}

impl Drop for SafeAnimEncoder {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { WebPAnimEncoderDelete(ptr.as_ptr()) };
            track!(LIVE_ANIM_ENCODERS, -);
        }
    }
}
