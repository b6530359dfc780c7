//! The nine performatives of Part 2.7 plus the dispatching enum.

use bytes::BytesMut;

use crate::codec::{descriptor_matches, Decode, Decoder, Encode};
use crate::error::Error as CodecError;

mod attach;
mod begin;
mod close;
mod detach;
mod disposition;
mod end;
mod flow;
mod open;
mod transfer;

pub use attach::Attach;
pub use begin::Begin;
pub use close::Close;
pub use detach::Detach;
pub use disposition::Disposition;
pub use end::End;
pub use flow::Flow;
pub use open::Open;
pub use transfer::Transfer;

/// Implements `Decode` for a composite in terms of its `decode_body`,
/// checking the descriptor first.
macro_rules! impl_decode_via_body {
    ($ty:ty) => {
        impl crate::codec::Decode for $ty {
            fn decode(de: &mut crate::codec::Decoder<'_>) -> Result<Self, crate::Error> {
                let descriptor = de.read_descriptor()?;
                if !crate::codec::descriptor_matches(
                    &descriptor,
                    Self::DESCRIPTOR_CODE,
                    Self::DESCRIPTOR_NAME,
                ) {
                    return Err(crate::Error::UnexpectedDescriptor);
                }
                Self::decode_body(de)
            }
        }
    };
}
pub(crate) use impl_decode_via_body;

/// Any performative, dispatched by descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Performative {
    Open(Open),
    Begin(Begin),
    Attach(Attach),
    Flow(Flow),
    Transfer(Transfer),
    Disposition(Disposition),
    Detach(Detach),
    End(End),
    Close(Close),
}

impl Encode for Performative {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Performative::Open(p) => p.encode(buf),
            Performative::Begin(p) => p.encode(buf),
            Performative::Attach(p) => p.encode(buf),
            Performative::Flow(p) => p.encode(buf),
            Performative::Transfer(p) => p.encode(buf),
            Performative::Disposition(p) => p.encode(buf),
            Performative::Detach(p) => p.encode(buf),
            Performative::End(p) => p.encode(buf),
            Performative::Close(p) => p.encode(buf),
        }
    }
}

impl Decode for Performative {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let descriptor = de.read_descriptor()?;
        let matches = |code, name| descriptor_matches(&descriptor, code, name);

        let performative = if matches(Open::DESCRIPTOR_CODE, Open::DESCRIPTOR_NAME) {
            Performative::Open(Open::decode_body(de)?)
        } else if matches(Begin::DESCRIPTOR_CODE, Begin::DESCRIPTOR_NAME) {
            Performative::Begin(Begin::decode_body(de)?)
        } else if matches(Attach::DESCRIPTOR_CODE, Attach::DESCRIPTOR_NAME) {
            Performative::Attach(Attach::decode_body(de)?)
        } else if matches(Flow::DESCRIPTOR_CODE, Flow::DESCRIPTOR_NAME) {
            Performative::Flow(Flow::decode_body(de)?)
        } else if matches(Transfer::DESCRIPTOR_CODE, Transfer::DESCRIPTOR_NAME) {
            Performative::Transfer(Transfer::decode_body(de)?)
        } else if matches(Disposition::DESCRIPTOR_CODE, Disposition::DESCRIPTOR_NAME) {
            Performative::Disposition(Disposition::decode_body(de)?)
        } else if matches(Detach::DESCRIPTOR_CODE, Detach::DESCRIPTOR_NAME) {
            Performative::Detach(Detach::decode_body(de)?)
        } else if matches(End::DESCRIPTOR_CODE, End::DESCRIPTOR_NAME) {
            Performative::End(End::decode_body(de)?)
        } else if matches(Close::DESCRIPTOR_CODE, Close::DESCRIPTOR_NAME) {
            Performative::Close(Close::decode_body(de)?)
        } else {
            return Err(CodecError::UnexpectedDescriptor);
        };
        Ok(performative)
    }
}

#[cfg(test)]
mod tests {
    use super::{Begin, Performative};
    use crate::codec::{from_slice, to_vec};

    #[test]
    fn performative_dispatches_by_descriptor() {
        let begin = Begin {
            remote_channel: None,
            next_outgoing_id: 0,
            incoming_window: 5000,
            outgoing_window: 5000,
            ..Default::default()
        };
        let bytes = to_vec(&begin);
        let (decoded, _) = from_slice::<Performative>(&bytes).unwrap();
        assert_eq!(decoded, Performative::Begin(begin));
    }

    #[test]
    fn unknown_descriptor_is_rejected() {
        // descriptor 0x99 wrapping an empty list
        let bytes = [0x00, 0x53, 0x99, 0x45];
        assert!(from_slice::<Performative>(&bytes).is_err());
    }
}
