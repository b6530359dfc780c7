//! 2.7.4 Flow

use bytes::BytesMut;

use crate::codec::{Decoder, Encode, ListEncoder};
use crate::definitions::{Fields, Handle, SequenceNo, TransferNumber};
use crate::error::Error as CodecError;

/// Updates session windows and, when a handle is present, link credit.
///
/// ```text
/// <type name="flow" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:flow:list" code="0x00000000:0x00000013"/>
///     <field name="next-incoming-id" type="transfer-number"/>
///     <field name="next-outgoing-id" type="transfer-number" mandatory="true"/>
///     <field name="incoming-window" type="uint" mandatory="true"/>
///     <field name="outgoing-window" type="uint" mandatory="true"/>
///     <field name="handle" type="handle"/>
///     <field name="delivery-count" type="sequence-no"/>
///     <field name="link-credit" type="uint"/>
///     <field name="available" type="uint"/>
///     <field name="drain" type="boolean" default="false"/>
///     <field name="echo" type="boolean" default="false"/>
///     <field name="properties" type="fields"/>
/// </type>
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flow {
    /// May only be null before the session is established
    pub next_incoming_id: Option<TransferNumber>,
    pub next_outgoing_id: TransferNumber,
    pub incoming_window: u32,
    pub outgoing_window: u32,

    /// Identifies the link the flow state belongs to; absent for pure
    /// session flow
    pub handle: Option<Handle>,

    /// The endpoint's delivery-count for the identified link
    pub delivery_count: Option<SequenceNo>,

    /// Credit granted to the sender of the identified link
    pub link_credit: Option<u32>,

    /// Deliveries the sender could make if it had credit for them
    pub available: Option<u32>,

    /// Request that the sender exhaust its credit
    pub drain: bool,

    /// Request that the peer reply with its own flow state
    pub echo: bool,

    pub properties: Option<Fields>,
}

impl Flow {
    pub const DESCRIPTOR_CODE: u64 = 0x13;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:flow:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let next_incoming_id = list.field()?;
        let next_outgoing_id = list.required("next-outgoing-id")?;
        let incoming_window = list.required("incoming-window")?;
        let outgoing_window = list.required("outgoing-window")?;
        let handle = list.field()?;
        let delivery_count = list.field()?;
        let link_credit = list.field()?;
        let available = list.field()?;
        let drain = list.field_or(false)?;
        let echo = list.field_or(false)?;
        let properties = list.field()?;
        list.finish()?;
        Ok(Self {
            next_incoming_id,
            next_outgoing_id,
            incoming_window,
            outgoing_window,
            handle,
            delivery_count,
            link_credit,
            available,
            drain,
            echo,
            properties,
        })
    }
}

impl Encode for Flow {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.optional(&self.next_incoming_id);
        list.field(&self.next_outgoing_id);
        list.field(&self.incoming_window);
        list.field(&self.outgoing_window);
        list.optional(&self.handle);
        list.optional(&self.delivery_count);
        list.optional(&self.link_credit);
        list.optional(&self.available);
        list.field(&self.drain);
        list.field(&self.echo);
        list.optional(&self.properties);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

super::impl_decode_via_body!(Flow);

#[cfg(test)]
mod tests {
    use super::Flow;
    use crate::codec::{from_slice, to_vec};

    #[test]
    fn flow_round_trip() {
        let flow = Flow {
            next_incoming_id: Some(1),
            next_outgoing_id: 0,
            incoming_window: 5000,
            outgoing_window: 5000,
            handle: Some(0),
            delivery_count: Some(0),
            link_credit: Some(10),
            drain: true,
            ..Default::default()
        };
        let bytes = to_vec(&flow);
        let (decoded, _) = from_slice::<Flow>(&bytes).unwrap();
        assert_eq!(decoded, flow);
    }
}
