use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame")]
    FramingError,

    #[error("frame exceeds the negotiated max-frame-size")]
    MaxFrameSizeExceeded,

    #[error("idle timeout expired")]
    IdleTimeout,

    #[error("frame type 0x{0:02x} is not supported")]
    UnsupportedFrameType(u8),

    #[error("decode error: {0}")]
    Decode(#[from] limonite_amqp_types::Error),
}
