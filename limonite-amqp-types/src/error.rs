//! Codec errors

/// Errors raised while encoding or decoding AMQP values.
///
/// Every decode failure is recoverable at the frame boundary; the decoder
/// never reads past the buffer it was given.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Custom error with message
    #[error("{0}")]
    Message(String),

    /// More bytes were needed than the buffer holds
    #[error("insufficient bytes in buffer")]
    InsufficientBytes,

    /// Unknown constructor byte
    #[error("invalid format code")]
    InvalidFormatCode,

    /// A length prefix exceeds the remaining buffer
    #[error("invalid length prefix")]
    InvalidLength,

    /// An array element does not match the array constructor
    #[error("array element constructor mismatch")]
    ArrayElementMismatch,

    /// A described value carries a descriptor other than the requested one
    #[error("unexpected descriptor")]
    UnexpectedDescriptor,

    /// Found invalid UTF-8 encoding
    #[error("invalid UTF-8 encoding")]
    InvalidUtf8,

    /// Container nesting exceeds the supported depth
    #[error("nesting depth limit exceeded")]
    NestingLimit,

    /// The encoded value is not valid for the destination type
    #[error("invalid value")]
    InvalidValue,
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Error::InvalidUtf8
    }
}
