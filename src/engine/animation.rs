// src/engine/animation.rs
//
// Animated WebP sessions.
//
// Decode: the session owns a private copy of the input and a fixed canvas
// size read once at construction. Each frame is copied out of the engine's
// canvas before it is returned, since the engine overwrites it on the next call.
//
// Encode: frames are stamped with the running total of the durations added so
// far. `assemble` closes the timeline with an empty frame at the total, then
// serializes.

use super::common::{ensure_supported, import_pixels};
use super::config::EncodeConfig;
use crate::buffer::{AlphaMode, ImageSource, RgbaBuffer};
use crate::codecs::webp_safe::{
    anim_encoder_options, SafeAnimDecoder, SafeAnimEncoder, SafePicture, SafeWebPData,
};
use crate::error::{Result, WebpError};
use std::ffi::c_int;
use std::time::Duration;
use tracing::debug;

/// Global properties of an animation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimationInfo {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// 0 means loop forever.
    pub loop_count: u32,
    pub frame_count: u32,
    /// The engine's packed background color, split most significant byte first.
    pub background_color: [u8; 4],
}

/// One fully composed canvas.
#[derive(Clone, Debug)]
pub struct AnimationFrame {
    pub image: RgbaBuffer,
    /// Presentation end time of this frame, from the start of the animation.
    pub timestamp: Duration,
}

/// Every frame of an animation, in display order.
#[derive(Clone, Debug)]
pub struct Animation {
    pub info: AnimationInfo,
    pub frames: Vec<AnimationFrame>,
}

impl Animation {
    pub fn timestamps(&self) -> impl Iterator<Item = Duration> + '_ {
        self.frames.iter().map(|f| f.timestamp)
    }
}

/// Incremental decoder over an animated (or still) WebP.
pub struct AnimationDecoder {
    session: SafeAnimDecoder,
    info: AnimationInfo,
}

impl AnimationDecoder {
    /// Start a session. `bytes` is copied; the caller may reuse it immediately.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        Self::open(bytes, false)
    }

    /// Like [`new`](Self::new), letting the engine decode on worker threads.
    pub fn new_with_threads(bytes: &[u8]) -> Result<Self> {
        Self::open(bytes, true)
    }

    fn open(bytes: &[u8], use_threads: bool) -> Result<Self> {
        let session = SafeAnimDecoder::new(bytes, use_threads)?;
        let raw = session.info()?;
        let info = AnimationInfo {
            canvas_width: raw.canvas_width,
            canvas_height: raw.canvas_height,
            loop_count: raw.loop_count,
            frame_count: raw.frame_count,
            background_color: raw.bgcolor.to_be_bytes(),
        };
        debug!(
            target: "webp_bridge::animation",
            width = info.canvas_width,
            height = info.canvas_height,
            frames = info.frame_count,
            input_bytes = bytes.len(),
            "opened animation decoder"
        );
        Ok(Self { session, info })
    }

    pub fn info(&self) -> AnimationInfo {
        self.info
    }

    pub fn has_more_frames(&self) -> bool {
        self.session.has_more_frames()
    }

    /// Decode the next frame, or `None` once the animation is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<AnimationFrame>> {
        if !self.session.has_more_frames() {
            return Ok(None);
        }
        let (width, height) = (self.info.canvas_width, self.info.canvas_height);
        let (canvas, timestamp_ms) = self.session.next_frame()?;
        let image = RgbaBuffer::from_raw(
            width,
            height,
            width as usize * 4,
            canvas.to_vec(),
            AlphaMode::Straight,
        )?;
        Ok(Some(AnimationFrame {
            image,
            timestamp: Duration::from_millis(timestamp_ms.max(0) as u64),
        }))
    }

    /// Rewind to the first frame.
    pub fn reset(&mut self) {
        self.session.reset();
    }

    /// Decode every remaining frame.
    pub fn decode_all(&mut self) -> Result<Animation> {
        let mut frames = Vec::with_capacity(self.info.frame_count as usize);
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        debug!(target: "webp_bridge::animation", frames = frames.len(), "decoded animation");
        Ok(Animation {
            info: self.info,
            frames,
        })
    }

    /// Release the session and its input copy.
    pub fn close(self) {
        drop(self);
    }
}

/// Session-wide settings for [`AnimationEncoder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimationEncoderOptions {
    /// Minimum distance between key frames.
    pub kmin: i32,
    /// Maximum distance between key frames.
    pub kmax: i32,
    /// 0 means loop forever.
    pub loop_count: u32,
    /// Same byte order as [`AnimationInfo::background_color`].
    pub background_color: [u8; 4],
    /// Search harder for the smallest output. Slow.
    pub minimize_size: bool,
    /// Let the engine pick lossy or lossless per frame.
    pub allow_mixed: bool,
}

impl AnimationEncoderOptions {
    /// The engine's defaults.
    pub fn engine_defaults() -> Result<Self> {
        let raw = anim_encoder_options()?;
        Ok(Self {
            kmin: raw.kmin,
            kmax: raw.kmax,
            loop_count: raw.anim_params.loop_count.max(0) as u32,
            background_color: raw.anim_params.bgcolor.to_be_bytes(),
            minimize_size: raw.minimize_size != 0,
            allow_mixed: raw.allow_mixed != 0,
        })
    }
}

/// Incremental animation builder.
pub struct AnimationEncoder {
    session: SafeAnimEncoder,
    width: u32,
    height: u32,
    elapsed: Duration,
    frames_added: usize,
    terminated: bool,
    assembled: bool,
}

impl AnimationEncoder {
    /// Fixed canvas with the given key frame spacing; other options at engine defaults.
    pub fn new(width: u32, height: u32, kmin: i32, kmax: i32) -> Result<Self> {
        let options = AnimationEncoderOptions {
            kmin,
            kmax,
            ..AnimationEncoderOptions::engine_defaults()?
        };
        Self::with_options(width, height, options)
    }

    pub fn with_options(width: u32, height: u32, options: AnimationEncoderOptions) -> Result<Self> {
        let mut raw = anim_encoder_options()?;
        raw.kmin = options.kmin as c_int;
        raw.kmax = options.kmax as c_int;
        raw.anim_params.loop_count = c_int::try_from(options.loop_count).map_err(|_| {
            WebpError::invalid_argument(
                "loop_count",
                options.loop_count.to_string(),
                "Must fit in a signed 32-bit integer",
            )
        })?;
        raw.anim_params.bgcolor = u32::from_be_bytes(options.background_color);
        raw.minimize_size = options.minimize_size as c_int;
        raw.allow_mixed = options.allow_mixed as c_int;

        let session = SafeAnimEncoder::new(width, height, &raw)?;
        debug!(
            target: "webp_bridge::animation",
            width,
            height,
            kmin = options.kmin,
            kmax = options.kmax,
            "opened animation encoder"
        );
        Ok(Self {
            session,
            width,
            height,
            elapsed: Duration::ZERO,
            frames_added: 0,
            terminated: false,
            assembled: false,
        })
    }

    /// Append a frame shown for `duration`, encoded with the engine's default config.
    ///
    /// The image must match the canvas size; the engine rejects anything else.
    pub fn add_frame<S>(&mut self, image: &S, duration: Duration) -> Result<()>
    where
        S: ImageSource + ?Sized,
    {
        self.push_frame(image, duration, None)
    }

    /// Append a frame encoded with `config`.
    pub fn add_frame_with_config<S>(
        &mut self,
        image: &S,
        duration: Duration,
        config: &EncodeConfig,
    ) -> Result<()>
    where
        S: ImageSource + ?Sized,
    {
        self.push_frame(image, duration, Some(config))
    }

    fn push_frame<S>(
        &mut self,
        image: &S,
        duration: Duration,
        config: Option<&EncodeConfig>,
    ) -> Result<()>
    where
        S: ImageSource + ?Sized,
    {
        if self.assembled || self.terminated {
            return Err(WebpError::session_assembled());
        }
        let raw_config = config.map(EncodeConfig::validated).transpose()?;
        let layout = image.layout();
        ensure_supported(&layout)?;
        let (width, height) = image.dimensions();
        let timestamp = millis(self.elapsed)?;

        let mut picture = SafePicture::new(width, height)?;
        import_pixels(&mut picture, layout)?;
        self.session
            .add(Some(&mut picture), timestamp, raw_config.as_ref())?;

        self.elapsed += duration;
        self.frames_added += 1;
        Ok(())
    }

    /// Close the timeline and serialize the animation.
    pub fn assemble(&mut self) -> Result<Vec<u8>> {
        if self.assembled {
            return Err(WebpError::session_assembled());
        }
        if !self.terminated {
            let end = millis(self.elapsed)?;
            self.session.add(None, end, None)?;
            self.terminated = true;
        }
        let mut data = SafeWebPData::new();
        self.session.assemble(&mut data)?;
        self.assembled = true;

        let bytes = data.to_vec();
        debug!(
            target: "webp_bridge::animation",
            frames = self.frames_added,
            duration_ms = self.elapsed.as_millis() as u64,
            bytes = bytes.len(),
            "assembled animation"
        );
        Ok(bytes)
    }

    /// Sum of the durations added so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn frames_added(&self) -> usize {
        self.frames_added
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Release the session.
    pub fn close(self) {
        drop(self);
    }
}

/// Engine timestamps are signed 32-bit milliseconds.
fn millis(elapsed: Duration) -> Result<i32> {
    i32::try_from(elapsed.as_millis()).map_err(|_| {
        WebpError::invalid_argument(
            "timestamp",
            format!("{}ms", elapsed.as_millis()),
            "Animation is longer than the engine's millisecond range",
        )
    })
}
