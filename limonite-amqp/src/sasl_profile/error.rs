use limonite_amqp_types::primitives::{Binary, Symbol};
use limonite_amqp_types::sasl::SaslCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("the peer answered with an unexpected protocol header: {0:02x?}")]
    HeaderMismatch([u8; 8]),

    #[error("connection closed during SASL negotiation")]
    UnexpectedEof,

    #[error("malformed SASL frame")]
    FramingError,

    #[error("decode error: {0}")]
    Decode(limonite_amqp_types::Error),

    #[error("none of the server mechanisms {offered:?} matches the configured profile")]
    MechanismNotSupported { offered: Vec<Symbol> },

    #[error("unexpected SASL frame for the configured profile")]
    UnexpectedFrame,

    #[error("SASL outcome code {code:?}")]
    NotOk {
        code: SaslCode,
        additional_data: Option<Binary>,
    },
}

impl From<crate::frames::Error> for Error {
    fn from(err: crate::frames::Error) -> Self {
        match err {
            crate::frames::Error::Io(err) => Error::Io(err),
            crate::frames::Error::Decode(err) => Error::Decode(err),
            _ => Error::FramingError,
        }
    }
}
