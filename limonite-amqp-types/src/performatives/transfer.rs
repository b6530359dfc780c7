//! 2.7.5 Transfer

use bytes::BytesMut;

use crate::codec::{Decoder, Encode, ListEncoder};
use crate::definitions::{
    DeliveryNumber, DeliveryTag, Handle, MessageFormat, ReceiverSettleMode,
};
use crate::error::Error as CodecError;
use crate::messaging::DeliveryState;

/// Carries (part of) a message across a link.
///
/// The message payload follows the performative in the frame body. A
/// delivery split across frames carries its delivery-id and tag only on the
/// first transfer and sets `more` on every transfer but the last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transfer {
    pub handle: Handle,
    pub delivery_id: Option<DeliveryNumber>,
    pub delivery_tag: Option<DeliveryTag>,
    pub message_format: Option<MessageFormat>,
    pub settled: Option<bool>,
    pub more: bool,
    pub rcv_settle_mode: Option<ReceiverSettleMode>,
    pub state: Option<DeliveryState>,
    pub resume: bool,
    pub aborted: bool,
    pub batchable: bool,
}

impl Transfer {
    pub const DESCRIPTOR_CODE: u64 = 0x14;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:transfer:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let handle = list.required("handle")?;
        let delivery_id = list.field()?;
        let delivery_tag = list.field()?;
        let message_format = list.field()?;
        let settled = list.field()?;
        let more = list.field_or(false)?;
        let rcv_settle_mode = list.field()?;
        let state = list.field()?;
        let resume = list.field_or(false)?;
        let aborted = list.field_or(false)?;
        let batchable = list.field_or(false)?;
        list.finish()?;
        Ok(Self {
            handle,
            delivery_id,
            delivery_tag,
            message_format,
            settled,
            more,
            rcv_settle_mode,
            state,
            resume,
            aborted,
            batchable,
        })
    }
}

impl Encode for Transfer {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.handle);
        list.optional(&self.delivery_id);
        list.optional(&self.delivery_tag);
        list.optional(&self.message_format);
        list.optional(&self.settled);
        list.field(&self.more);
        list.optional(&self.rcv_settle_mode);
        list.optional(&self.state);
        list.field(&self.resume);
        list.field(&self.aborted);
        list.field(&self.batchable);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

super::impl_decode_via_body!(Transfer);

#[cfg(test)]
mod tests {
    use super::Transfer;
    use crate::codec::{from_slice, to_vec};
    use crate::primitives::Binary;

    #[test]
    fn transfer_round_trip() {
        let transfer = Transfer {
            handle: 0,
            delivery_id: Some(0),
            delivery_tag: Some(Binary::from([0u8; 16])),
            message_format: Some(0),
            settled: Some(false),
            more: false,
            ..Default::default()
        };
        let bytes = to_vec(&transfer);
        let (decoded, _) = from_slice::<Transfer>(&bytes).unwrap();
        assert_eq!(decoded, transfer);
    }

    #[test]
    fn continuation_transfer_is_compact() {
        let transfer = Transfer {
            handle: 2,
            more: true,
            ..Default::default()
        };
        let bytes = to_vec(&transfer);
        let (decoded, _) = from_slice::<Transfer>(&bytes).unwrap();
        assert_eq!(decoded, transfer);
    }
}
