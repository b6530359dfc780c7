//! Types from AMQP 1.0 Part 2.8: Definitions

use bytes::BytesMut;
use indexmap::IndexMap;

use crate::codec::{Decode, Decoder, Encode};
use crate::error::Error as CodecError;
use crate::primitives::{Binary, Symbol};
use crate::value::Value;

mod conditions;
mod error;

pub use conditions::{AmqpError, ConnectionError, ErrorCondition, LinkError, SessionError};
pub use error::Error;

/// Protocol major version
pub const MAJOR: u8 = 1;
/// Protocol minor version
pub const MINOR: u8 = 0;
/// Protocol revision
pub const REVISION: u8 = 0;

/// The smallest max-frame-size a peer may insist on
pub const MIN_MAX_FRAME_SIZE: u32 = 512;

/// IANA port for AMQP over TCP
pub const PORT: u16 = 5672;
/// IANA port for AMQP over TLS
pub const SECURE_PORT: u16 = 5671;

/// 2.8.4 Handle
pub type Handle = u32;

/// 2.8.5 Seconds
pub type Seconds = u32;

/// 2.8.6 Milliseconds
pub type Milliseconds = u32;

/// 2.8.7 Delivery Tag
///
/// Up to 32 octets of binary data chosen by the sender; unique among a
/// link's unsettled deliveries.
pub type DeliveryTag = Binary;

/// Longest legal delivery tag, in octets
pub const MAX_DELIVERY_TAG_LENGTH: usize = 32;

/// 2.8.8 Delivery Number
pub type DeliveryNumber = SequenceNo;

/// 2.8.9 Transfer Number
pub type TransferNumber = SequenceNo;

/// 2.8.10 Sequence No (RFC-1982 serial number)
pub type SequenceNo = u32;

/// 2.8.11 Message Format
pub type MessageFormat = u32;

/// 2.8.13 Fields
pub type Fields = IndexMap<Symbol, Value>;

/// 2.8.1 Role
///
/// Encoded as a boolean: false is sender, true is receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Sender,
    Receiver,
}

impl Role {
    /// The role the peer plays on the same link.
    pub fn opposite(&self) -> Role {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }
}

impl Encode for Role {
    fn encode(&self, buf: &mut BytesMut) {
        matches!(self, Role::Receiver).encode(buf)
    }
}

impl Decode for Role {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        match bool::decode(de)? {
            false => Ok(Role::Sender),
            true => Ok(Role::Receiver),
        }
    }
}

/// 2.8.2 Sender Settle Mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SenderSettleMode {
    /// The sender will send all deliveries initially unsettled
    Unsettled = 0,
    /// The sender will send all deliveries settled
    Settled = 1,
    /// The sender may send a mixture
    #[default]
    Mixed = 2,
}

impl Encode for SenderSettleMode {
    fn encode(&self, buf: &mut BytesMut) {
        (*self as u8).encode(buf)
    }
}

impl Decode for SenderSettleMode {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        match u8::decode(de)? {
            0 => Ok(SenderSettleMode::Unsettled),
            1 => Ok(SenderSettleMode::Settled),
            2 => Ok(SenderSettleMode::Mixed),
            _ => Err(CodecError::InvalidValue),
        }
    }
}

/// 2.8.3 Receiver Settle Mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReceiverSettleMode {
    /// The receiver settles first; the sender hears about it afterwards
    #[default]
    First = 0,
    /// The receiver waits for the sender to settle before settling itself
    Second = 1,
}

impl Encode for ReceiverSettleMode {
    fn encode(&self, buf: &mut BytesMut) {
        (*self as u8).encode(buf)
    }
}

impl Decode for ReceiverSettleMode {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        match u8::decode(de)? {
            0 => Ok(ReceiverSettleMode::First),
            1 => Ok(ReceiverSettleMode::Second),
            _ => Err(CodecError::InvalidValue),
        }
    }
}

/// Compares two RFC-1982 serial numbers (delivery ids, transfer numbers).
///
/// Returns the ordering of `lhs` relative to `rhs` under wrapping
/// arithmetic; values half the space apart are unordered and reported as
/// equal.
pub fn serial_cmp(lhs: SequenceNo, rhs: SequenceNo) -> std::cmp::Ordering {
    let diff = lhs.wrapping_sub(rhs);
    if diff == 0 {
        std::cmp::Ordering::Equal
    } else if diff < 1 << 31 {
        std::cmp::Ordering::Greater
    } else {
        std::cmp::Ordering::Less
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{serial_cmp, Role, SenderSettleMode};
    use crate::codec::{from_slice, to_vec};

    #[test]
    fn role_is_a_boolean() {
        assert_eq!(to_vec(&Role::Sender), vec![0x42]);
        assert_eq!(to_vec(&Role::Receiver), vec![0x41]);
    }

    #[test]
    fn settle_mode_round_trip() {
        let bytes = to_vec(&SenderSettleMode::Settled);
        let (mode, _) = from_slice::<SenderSettleMode>(&bytes).unwrap();
        assert_eq!(mode, SenderSettleMode::Settled);
    }

    #[test]
    fn serial_numbers_wrap() {
        assert_eq!(serial_cmp(1, 0), Ordering::Greater);
        assert_eq!(serial_cmp(0, u32::MAX), Ordering::Greater);
        assert_eq!(serial_cmp(u32::MAX, 0), Ordering::Less);
        assert_eq!(serial_cmp(5, 5), Ordering::Equal);
    }
}
