use std::io;
use std::sync::Arc;

use limonite_amqp_types::definitions;

use crate::frames;
use crate::sasl_profile;
use crate::transport::NegotiationError;

/// Fatal connection error.
///
/// Clonable so one failure can fan out to every session and pending user
/// call on the connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(Arc<io::Error>),

    #[error("idle timeout expired")]
    IdleTimeout,

    #[error("malformed frame")]
    FramingError,

    #[error("peer frame exceeds the negotiated max-frame-size")]
    MaxFrameSizeExceeded,

    #[error("decode error: {0}")]
    Decode(limonite_amqp_types::Error),

    #[error("connection closed by the remote peer: {error:?}")]
    RemoteClosed {
        error: Option<definitions::Error>,
    },

    #[error("connection has already been closed")]
    IllegalState,

    #[error("channel-max exhausted")]
    ChannelMaxReached,
}

impl From<frames::Error> for Error {
    fn from(err: frames::Error) -> Self {
        match err {
            frames::Error::Io(err) => Error::Io(Arc::new(err)),
            frames::Error::IdleTimeout => Error::IdleTimeout,
            frames::Error::MaxFrameSizeExceeded => Error::MaxFrameSizeExceeded,
            frames::Error::Decode(err) => Error::Decode(err),
            frames::Error::FramingError | frames::Error::UnsupportedFrameType(_) => {
                Error::FramingError
            }
        }
    }
}

/// Failure to open a connection.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid address: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("scheme {0:?} is not handled here; establish the stream yourself and use open_with_stream")]
    UnsupportedScheme(String),

    #[error("the peer answered with an unexpected protocol header: {0:02x?}")]
    UnexpectedProtocolHeader([u8; 8]),

    #[error("SASL negotiation failed: {0}")]
    Sasl(#[from] sasl_profile::Error),

    #[error("the peer closed the connection during open: {error:?}")]
    RemoteClosedDuringOpen {
        error: Option<definitions::Error>,
    },

    #[error(transparent)]
    Transport(Error),

    #[error("open timed out")]
    TimedOut,
}

impl From<NegotiationError> for OpenError {
    fn from(err: NegotiationError) -> Self {
        match err {
            NegotiationError::Io(err) => OpenError::Io(err),
            NegotiationError::HeaderMismatch(bytes) => OpenError::UnexpectedProtocolHeader(bytes),
        }
    }
}

impl From<frames::Error> for OpenError {
    fn from(err: frames::Error) -> Self {
        OpenError::Transport(Error::from(err))
    }
}
