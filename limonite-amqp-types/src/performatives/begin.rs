//! 2.7.2 Begin

use bytes::BytesMut;

use crate::codec::{Decoder, Encode, ListEncoder};
use crate::definitions::{Fields, Handle, TransferNumber};
use crate::error::Error as CodecError;
use crate::primitives::Symbol;

/// Begins a session on a channel.
///
/// ```text
/// <type name="begin" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:begin:list" code="0x00000000:0x00000011"/>
///     <field name="remote-channel" type="ushort"/>
///     <field name="next-outgoing-id" type="transfer-number" mandatory="true"/>
///     <field name="incoming-window" type="uint" mandatory="true"/>
///     <field name="outgoing-window" type="uint" mandatory="true"/>
///     <field name="handle-max" type="handle" default="4294967295"/>
///     <field name="offered-capabilities" type="symbol" multiple="true"/>
///     <field name="desired-capabilities" type="symbol" multiple="true"/>
///     <field name="properties" type="fields"/>
/// </type>
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Begin {
    /// Set when the begin answers a remotely initiated session
    pub remote_channel: Option<u16>,
    pub next_outgoing_id: TransferNumber,
    pub incoming_window: u32,
    pub outgoing_window: u32,
    pub handle_max: Handle,
    pub offered_capabilities: Option<Vec<Symbol>>,
    pub desired_capabilities: Option<Vec<Symbol>>,
    pub properties: Option<Fields>,
}

impl Default for Begin {
    fn default() -> Self {
        Self {
            remote_channel: None,
            next_outgoing_id: 0,
            incoming_window: 0,
            outgoing_window: 0,
            handle_max: u32::MAX,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
        }
    }
}

impl Begin {
    pub const DESCRIPTOR_CODE: u64 = 0x11;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:begin:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let remote_channel = list.field()?;
        let next_outgoing_id = list.required("next-outgoing-id")?;
        let incoming_window = list.required("incoming-window")?;
        let outgoing_window = list.required("outgoing-window")?;
        let handle_max = list.field_or(u32::MAX)?;
        let offered_capabilities = list.field()?;
        let desired_capabilities = list.field()?;
        let properties = list.field()?;
        list.finish()?;
        Ok(Self {
            remote_channel,
            next_outgoing_id,
            incoming_window,
            outgoing_window,
            handle_max,
            offered_capabilities,
            desired_capabilities,
            properties,
        })
    }
}

impl Encode for Begin {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.optional(&self.remote_channel);
        list.field(&self.next_outgoing_id);
        list.field(&self.incoming_window);
        list.field(&self.outgoing_window);
        list.field(&self.handle_max);
        list.optional(&self.offered_capabilities);
        list.optional(&self.desired_capabilities);
        list.optional(&self.properties);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

super::impl_decode_via_body!(Begin);

#[cfg(test)]
mod tests {
    use super::Begin;
    use crate::codec::{from_slice, to_vec};

    #[test]
    fn begin_round_trip() {
        let begin = Begin {
            remote_channel: Some(0),
            next_outgoing_id: 1,
            incoming_window: 5000,
            outgoing_window: 5000,
            ..Default::default()
        };
        let bytes = to_vec(&begin);
        let (decoded, _) = from_slice::<Begin>(&bytes).unwrap();
        assert_eq!(decoded, begin);
    }
}
