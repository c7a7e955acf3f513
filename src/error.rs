// src/error.rs
//
// Unified error handling for webp-bridge
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input or options, recoverable
// - CodecError: The engine reported a non-success status
// - ResourceLimit: Allocation failures and dimension limits
// - InternalBug: Misuse of the binding or engine/binding mismatch

use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Error taxonomy used to decide how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by the caller adjusting it
    UserError,
    /// The engine rejected the bitstream or failed mid-operation
    CodecError,
    /// Memory/dimension limits
    ResourceLimit,
    /// Misuse or build mismatch (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// Status reported by the decoder side of the engine (`VP8StatusCode`).
///
/// The numeric values are the engine's own and are preserved so callers can
/// branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DecodeStatus {
    Ok = 0,
    OutOfMemory = 1,
    InvalidParam = 2,
    BitstreamError = 3,
    UnsupportedFeature = 4,
    Suspended = 5,
    UserAbort = 6,
    NotEnoughData = 7,
}

impl DecodeStatus {
    /// Map a raw engine status. Unknown values are reported as a bitstream error.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::OutOfMemory,
            2 => Self::InvalidParam,
            3 => Self::BitstreamError,
            4 => Self::UnsupportedFeature,
            5 => Self::Suspended,
            6 => Self::UserAbort,
            7 => Self::NotEnoughData,
            _ => Self::BitstreamError,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "VP8_STATUS_OK",
            Self::OutOfMemory => "VP8_STATUS_OUT_OF_MEMORY",
            Self::InvalidParam => "VP8_STATUS_INVALID_PARAM",
            Self::BitstreamError => "VP8_STATUS_BITSTREAM_ERROR",
            Self::UnsupportedFeature => "VP8_STATUS_UNSUPPORTED_FEATURE",
            Self::Suspended => "VP8_STATUS_SUSPENDED",
            Self::UserAbort => "VP8_STATUS_USER_ABORT",
            Self::NotEnoughData => "VP8_STATUS_NOT_ENOUGH_DATA",
        }
    }
}

impl fmt::Display for DecodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error code left in the picture by a failed encode (`WebPEncodingError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EncodeErrorCode {
    Ok = 0,
    OutOfMemory = 1,
    BitstreamOutOfMemory = 2,
    NullParameter = 3,
    InvalidConfiguration = 4,
    BadDimension = 5,
    Partition0Overflow = 6,
    PartitionOverflow = 7,
    BadWrite = 8,
    FileTooBig = 9,
    UserAbort = 10,
}

impl EncodeErrorCode {
    /// Map a raw engine code. Unknown values are reported as a null parameter,
    /// the engine's catch-all for a malformed call.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::OutOfMemory,
            2 => Self::BitstreamOutOfMemory,
            3 => Self::NullParameter,
            4 => Self::InvalidConfiguration,
            5 => Self::BadDimension,
            6 => Self::Partition0Overflow,
            7 => Self::PartitionOverflow,
            8 => Self::BadWrite,
            9 => Self::FileTooBig,
            10 => Self::UserAbort,
            _ => Self::NullParameter,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "VP8_ENC_OK",
            Self::OutOfMemory => "VP8_ENC_ERROR_OUT_OF_MEMORY",
            Self::BitstreamOutOfMemory => "VP8_ENC_ERROR_BITSTREAM_OUT_OF_MEMORY",
            Self::NullParameter => "VP8_ENC_ERROR_NULL_PARAMETER",
            Self::InvalidConfiguration => "VP8_ENC_ERROR_INVALID_CONFIGURATION",
            Self::BadDimension => "VP8_ENC_ERROR_BAD_DIMENSION",
            Self::Partition0Overflow => "VP8_ENC_ERROR_PARTITION0_OVERFLOW",
            Self::PartitionOverflow => "VP8_ENC_ERROR_PARTITION_OVERFLOW",
            Self::BadWrite => "VP8_ENC_ERROR_BAD_WRITE",
            Self::FileTooBig => "VP8_ENC_ERROR_FILE_TOO_BIG",
            Self::UserAbort => "VP8_ENC_ERROR_USER_ABORT",
        }
    }
}

impl fmt::Display for EncodeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// webp-bridge error types
#[derive(Debug, Error)]
pub enum WebpError {
    // Configuration Errors
    #[error("Failed to initialize {what}")]
    InitFailed { what: Cow<'static, str> },

    #[error("Invalid encoder configuration: {reason}")]
    InvalidConfiguration { reason: Cow<'static, str> },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Invalid pixel buffer: {reason}")]
    InvalidBuffer { reason: Cow<'static, str> },

    #[error("Unsupported image type: {description}")]
    UnsupportedImageType { description: Cow<'static, str> },

    // Resource Errors
    #[error("Failed to allocate {what}")]
    AllocationFailed { what: Cow<'static, str> },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Engine Status Errors
    #[error("Could not get features from the data stream: {status}")]
    GetFeaturesFailed { status: DecodeStatus },

    #[error("Could not decode data stream: {status}")]
    DecodeFailed { status: DecodeStatus },

    #[error("Encoding error: {code} ({})", .code.code())]
    EncodeFailed {
        code: EncodeErrorCode,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Animation {stage} failed: {message}")]
    AnimationFailed {
        stage: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // State Errors
    #[error("Animation already assembled; start a new encoder for more frames")]
    SessionAssembled,
}

impl Clone for WebpError {
    fn clone(&self) -> Self {
        match self {
            Self::InitFailed { what } => Self::InitFailed { what: what.clone() },
            Self::InvalidConfiguration { reason } => Self::InvalidConfiguration {
                reason: reason.clone(),
            },
            Self::InvalidArgument {
                name,
                value,
                reason,
            } => Self::InvalidArgument {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::InvalidBuffer { reason } => Self::InvalidBuffer {
                reason: reason.clone(),
            },
            Self::UnsupportedImageType { description } => Self::UnsupportedImageType {
                description: description.clone(),
            },
            Self::AllocationFailed { what } => Self::AllocationFailed { what: what.clone() },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::GetFeaturesFailed { status } => Self::GetFeaturesFailed { status: *status },
            Self::DecodeFailed { status } => Self::DecodeFailed { status: *status },
            Self::EncodeFailed { code, source } => Self::EncodeFailed {
                code: *code,
                source: source
                    .as_ref()
                    .map(|e| std::io::Error::new(e.kind(), e.to_string())),
            },
            Self::AnimationFailed { stage, message } => Self::AnimationFailed {
                stage: stage.clone(),
                message: message.clone(),
            },
            Self::SessionAssembled => Self::SessionAssembled,
        }
    }
}

// Constructor Helpers
impl WebpError {
    pub fn init_failed(what: impl Into<Cow<'static, str>>) -> Self {
        Self::InitFailed { what: what.into() }
    }

    pub fn invalid_configuration(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_buffer(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidBuffer {
            reason: reason.into(),
        }
    }

    pub fn unsupported_image_type(description: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedImageType {
            description: description.into(),
        }
    }

    pub fn allocation_failed(what: impl Into<Cow<'static, str>>) -> Self {
        Self::AllocationFailed { what: what.into() }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn get_features_failed(status: DecodeStatus) -> Self {
        Self::GetFeaturesFailed { status }
    }

    pub fn decode_failed(status: DecodeStatus) -> Self {
        Self::DecodeFailed { status }
    }

    pub fn encode_failed(code: EncodeErrorCode) -> Self {
        Self::EncodeFailed { code, source: None }
    }

    pub fn encode_failed_with_source(code: EncodeErrorCode, source: std::io::Error) -> Self {
        Self::EncodeFailed {
            code,
            source: Some(source),
        }
    }

    pub fn animation_failed(
        stage: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::AnimationFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn session_assembled() -> Self {
        Self::SessionAssembled
    }

    /// The engine's numeric status for errors that came from an engine call.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::GetFeaturesFailed { status } | Self::DecodeFailed { status } => {
                Some(status.code())
            }
            Self::EncodeFailed { code, .. } => Some(code.code()),
            _ => None,
        }
    }

    /// True when the operation stopped because a progress function asked it to.
    pub fn is_user_abort(&self) -> bool {
        matches!(
            self,
            Self::EncodeFailed {
                code: EncodeErrorCode::UserAbort,
                ..
            } | Self::DecodeFailed {
                status: DecodeStatus::UserAbort
            }
        )
    }

    /// Check if this error is recoverable (caller can fix it)
    ///
    /// Consistent with category():
    /// - UserError and ResourceLimit errors are recoverable
    /// - CodecError and InternalBug errors are not
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfiguration { .. }
            | Self::InvalidArgument { .. }
            | Self::InvalidBuffer { .. }
            | Self::SessionAssembled => ErrorCategory::UserError,

            Self::GetFeaturesFailed { .. }
            | Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::AnimationFailed { .. } => ErrorCategory::CodecError,

            Self::AllocationFailed { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorCategory::ResourceLimit,

            // InitFailed only happens on an engine ABI mismatch; an unsupported
            // image type is a caller programming error.
            Self::InitFailed { .. } | Self::UnsupportedImageType { .. } => {
                ErrorCategory::InternalBug
            }
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, WebpError>;
