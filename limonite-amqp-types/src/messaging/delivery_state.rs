//! 3.4 Delivery State

use bytes::BytesMut;

use crate::codec::{Decode, Decoder, Encode, ListEncoder};
use crate::definitions::{self, Fields, SequenceNo};
use crate::error::Error as CodecError;
use crate::value::Descriptor;

/// 3.4.1 Received
///
/// Indicates partial message data seen by the receiver so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Received {
    pub section_number: SequenceNo,
    pub section_offset: u64,
}

impl Received {
    pub const DESCRIPTOR_CODE: u64 = 0x23;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:received:list";

    fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let section_number = list.required("section-number")?;
        let section_offset = list.required("section-offset")?;
        list.finish()?;
        Ok(Self {
            section_number,
            section_offset,
        })
    }
}

impl Encode for Received {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.section_number);
        list.field(&self.section_offset);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// 3.4.2 Accepted
///
/// The delivery has been processed at the receiving end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accepted {}

impl Accepted {
    pub const DESCRIPTOR_CODE: u64 = 0x24;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:accepted:list";

    fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        de.list_reader()?.finish()?;
        Ok(Self {})
    }
}

impl Encode for Accepted {
    fn encode(&self, buf: &mut BytesMut) {
        ListEncoder::new().encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// 3.4.3 Rejected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rejected {
    pub error: Option<definitions::Error>,
}

impl Rejected {
    pub const DESCRIPTOR_CODE: u64 = 0x25;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:rejected:list";

    fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let error = list.field()?;
        list.finish()?;
        Ok(Self { error })
    }
}

impl Encode for Rejected {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.optional(&self.error);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// 3.4.4 Released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Released {}

impl Released {
    pub const DESCRIPTOR_CODE: u64 = 0x26;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:released:list";

    fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        de.list_reader()?.finish()?;
        Ok(Self {})
    }
}

impl Encode for Released {
    fn encode(&self, buf: &mut BytesMut) {
        ListEncoder::new().encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// 3.4.5 Modified
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modified {
    pub delivery_failed: Option<bool>,
    pub undeliverable_here: Option<bool>,
    pub message_annotations: Option<Fields>,
}

impl Modified {
    pub const DESCRIPTOR_CODE: u64 = 0x27;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:modified:list";

    fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let delivery_failed = list.field()?;
        let undeliverable_here = list.field()?;
        let message_annotations = list.field()?;
        list.finish()?;
        Ok(Self {
            delivery_failed,
            undeliverable_here,
            message_annotations,
        })
    }
}

impl Encode for Modified {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.optional(&self.delivery_failed);
        list.optional(&self.undeliverable_here);
        list.optional(&self.message_annotations);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// The state of a delivery at one end of a link.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryState {
    Received(Received),
    Accepted(Accepted),
    Rejected(Rejected),
    Released(Released),
    Modified(Modified),
}

impl DeliveryState {
    /// Whether this state is an outcome; outcomes never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryState::Received(_))
    }
}

impl Encode for DeliveryState {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            DeliveryState::Received(v) => v.encode(buf),
            DeliveryState::Accepted(v) => v.encode(buf),
            DeliveryState::Rejected(v) => v.encode(buf),
            DeliveryState::Released(v) => v.encode(buf),
            DeliveryState::Modified(v) => v.encode(buf),
        }
    }
}

impl Decode for DeliveryState {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let state = match de.read_descriptor()? {
            d if matches(&d, Received::DESCRIPTOR_CODE, Received::DESCRIPTOR_NAME) => {
                DeliveryState::Received(Received::decode_body(de)?)
            }
            d if matches(&d, Accepted::DESCRIPTOR_CODE, Accepted::DESCRIPTOR_NAME) => {
                DeliveryState::Accepted(Accepted::decode_body(de)?)
            }
            d if matches(&d, Rejected::DESCRIPTOR_CODE, Rejected::DESCRIPTOR_NAME) => {
                DeliveryState::Rejected(Rejected::decode_body(de)?)
            }
            d if matches(&d, Released::DESCRIPTOR_CODE, Released::DESCRIPTOR_NAME) => {
                DeliveryState::Released(Released::decode_body(de)?)
            }
            d if matches(&d, Modified::DESCRIPTOR_CODE, Modified::DESCRIPTOR_NAME) => {
                DeliveryState::Modified(Modified::decode_body(de)?)
            }
            _ => return Err(CodecError::UnexpectedDescriptor),
        };
        Ok(state)
    }
}

/// A terminal delivery state.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted(Accepted),
    Rejected(Rejected),
    Released(Released),
    Modified(Modified),
}

impl From<Outcome> for DeliveryState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Accepted(v) => DeliveryState::Accepted(v),
            Outcome::Rejected(v) => DeliveryState::Rejected(v),
            Outcome::Released(v) => DeliveryState::Released(v),
            Outcome::Modified(v) => DeliveryState::Modified(v),
        }
    }
}

impl TryFrom<DeliveryState> for Outcome {
    type Error = DeliveryState;

    fn try_from(state: DeliveryState) -> Result<Self, DeliveryState> {
        match state {
            DeliveryState::Accepted(v) => Ok(Outcome::Accepted(v)),
            DeliveryState::Rejected(v) => Ok(Outcome::Rejected(v)),
            DeliveryState::Released(v) => Ok(Outcome::Released(v)),
            DeliveryState::Modified(v) => Ok(Outcome::Modified(v)),
            state @ DeliveryState::Received(_) => Err(state),
        }
    }
}

impl Encode for Outcome {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Outcome::Accepted(v) => v.encode(buf),
            Outcome::Rejected(v) => v.encode(buf),
            Outcome::Released(v) => v.encode(buf),
            Outcome::Modified(v) => v.encode(buf),
        }
    }
}

impl Decode for Outcome {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        match Outcome::try_from(DeliveryState::decode(de)?) {
            Ok(outcome) => Ok(outcome),
            Err(_) => Err(CodecError::UnexpectedDescriptor),
        }
    }
}

fn matches(descriptor: &Descriptor, code: u64, name: &str) -> bool {
    crate::codec::descriptor_matches(descriptor, code, name)
}

#[cfg(test)]
mod tests {
    use super::{Accepted, DeliveryState, Modified, Rejected};
    use crate::codec::{from_slice, to_vec};
    use crate::definitions::{self, AmqpError};

    #[test]
    fn accepted_is_an_empty_list() {
        let bytes = to_vec(&DeliveryState::Accepted(Accepted {}));
        assert_eq!(bytes, vec![0x00, 0x53, 0x24, 0x45]);
    }

    #[test]
    fn states_round_trip() {
        for state in [
            DeliveryState::Accepted(Accepted {}),
            DeliveryState::Rejected(Rejected {
                error: Some(definitions::Error::condition(AmqpError::InternalError)),
            }),
            DeliveryState::Modified(Modified {
                delivery_failed: Some(true),
                undeliverable_here: None,
                message_annotations: None,
            }),
        ] {
            let bytes = to_vec(&state);
            let (decoded, _) = from_slice::<DeliveryState>(&bytes).unwrap();
            assert_eq!(decoded, state);
        }
    }
}
