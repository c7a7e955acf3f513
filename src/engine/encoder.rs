// src/engine/encoder.rs
//
// Still-image encode pipeline.
// The engine emits output in chunks through a writer hook that only receives
// its picture pointer; the handle registry maps that pointer back to the
// caller's sink (and optional progress function) for the length of one call.

use super::common::{ensure_supported, import_pixels};
use super::config::EncodeConfig;
use super::registry::{CallbackOutcome, CallbackState, HandleRegistry, ProgressFn};
use crate::buffer::ImageSource;
use crate::codecs::webp_safe::SafePicture;
use crate::error::{EncodeErrorCode, Result, WebpError};
use std::io::{self, Write};
use tracing::{debug, warn};

/// What a successful encode produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeSummary {
    pub width: u32,
    pub height: u32,
    /// Bytes handed to the sink.
    pub bytes_written: u64,
}

/// Encode `image` as a still WebP, streaming the output into `sink`.
///
/// On failure the sink may already hold a partial bitstream; callers that
/// need all-or-nothing output should encode into a `Vec` first.
pub fn encode<W, S>(sink: &mut W, image: &S, config: &EncodeConfig) -> Result<EncodeSummary>
where
    W: Write + Send,
    S: ImageSource + ?Sized,
{
    encode_with_callbacks(sink, image, config, None)
}

/// Like [`encode`], reporting progress (0..=100) to `progress`.
/// Returning `false` stops the encode with [`EncodeErrorCode::UserAbort`].
pub fn encode_with_progress<W, S, F>(
    sink: &mut W,
    image: &S,
    config: &EncodeConfig,
    progress: F,
) -> Result<EncodeSummary>
where
    W: Write + Send,
    S: ImageSource + ?Sized,
    F: FnMut(u8) -> bool + Send,
{
    let mut progress = progress;
    encode_with_callbacks(sink, image, config, Some(&mut progress))
}

/// Encode into a fresh `Vec`.
pub fn encode_to_vec<S>(image: &S, config: &EncodeConfig) -> Result<Vec<u8>>
where
    S: ImageSource + ?Sized,
{
    let mut out = Vec::new();
    encode(&mut out, image, config)?;
    Ok(out)
}

fn encode_with_callbacks<'a, S>(
    sink: &'a mut (dyn Write + Send),
    image: &S,
    config: &EncodeConfig,
    progress: Option<&'a mut ProgressFn<'a>>,
) -> Result<EncodeSummary>
where
    S: ImageSource + ?Sized,
{
    let raw_config = config.validated()?;
    let layout = image.layout();
    ensure_supported(&layout)?;
    let (width, height) = image.dimensions();

    let mut picture = SafePicture::new(width, height)?;
    let with_progress = progress.is_some();
    let state = CallbackState::new(sink, progress);

    let handle = picture.handle();
    let encoded = HandleRegistry::global().with_registration(handle, &state, || -> Result<_> {
        import_pixels(&mut picture, layout)?;
        picture.attach_callbacks(with_progress);
        Ok(picture.encode(&raw_config))
    })??;
    drop(picture);

    let outcome = state.into_outcome();
    match encoded {
        Ok(()) => {
            debug!(
                target: "webp_bridge::encode",
                width,
                height,
                bytes = outcome.bytes_written,
                lossless = config.lossless(),
                "encoded still image"
            );
            Ok(EncodeSummary {
                width,
                height,
                bytes_written: outcome.bytes_written,
            })
        }
        Err(code) => {
            let err = failure(code, outcome);
            warn!(target: "webp_bridge::encode", width, height, error = %err, "encode failed");
            Err(err)
        }
    }
}

/// Translate an engine failure, preferring what the callbacks saw.
fn failure(code: EncodeErrorCode, outcome: CallbackOutcome) -> WebpError {
    if outcome.aborted_by_progress() {
        return WebpError::encode_failed(EncodeErrorCode::UserAbort);
    }
    if let Some(source) = outcome.write_error {
        return WebpError::encode_failed_with_source(code, source);
    }
    if outcome.sink_panicked {
        return WebpError::encode_failed_with_source(
            code,
            io::Error::other("sink panicked while writing"),
        );
    }
    WebpError::encode_failed(code)
}
