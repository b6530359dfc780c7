//! 2.7.3 Attach

use bytes::BytesMut;
use indexmap::IndexMap;

use crate::codec::{Decoder, Encode, ListEncoder};
use crate::definitions::{
    DeliveryTag, Fields, Handle, ReceiverSettleMode, Role, SenderSettleMode, SequenceNo,
};
use crate::error::Error as CodecError;
use crate::messaging::{DeliveryState, Source, Target};
use crate::primitives::Symbol;

/// Attaches a link to a session.
///
/// ```text
/// <type name="attach" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:attach:list" code="0x00000000:0x00000012"/>
///     <field name="name" type="string" mandatory="true"/>
///     <field name="handle" type="handle" mandatory="true"/>
///     <field name="role" type="role" mandatory="true"/>
///     <field name="snd-settle-mode" type="sender-settle-mode" default="mixed"/>
///     <field name="rcv-settle-mode" type="receiver-settle-mode" default="first"/>
///     <field name="source" type="*" requires="source"/>
///     <field name="target" type="*" requires="target"/>
///     <field name="unsettled" type="map"/>
///     <field name="incomplete-unsettled" type="boolean" default="false"/>
///     <field name="initial-delivery-count" type="sequence-no"/>
///     <field name="max-message-size" type="ulong"/>
///     <field name="offered-capabilities" type="symbol" multiple="true"/>
///     <field name="desired-capabilities" type="symbol" multiple="true"/>
///     <field name="properties" type="fields"/>
/// </type>
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attach {
    /// Uniquely identifies the link within the two containers
    pub name: String,

    /// The handle this endpoint will use for the link
    pub handle: Handle,

    /// The role of this endpoint on the link
    pub role: Role,

    /// When set by the sender, the settlement mode in use; when set by the
    /// receiver, the mode it desires of the sender
    pub snd_settle_mode: SenderSettleMode,

    /// When set by the receiver, the settlement mode in use; when set by
    /// the sender, the mode it desires of the receiver
    pub rcv_settle_mode: ReceiverSettleMode,

    /// Absent on an outgoing link with no source attached
    pub source: Option<Source>,

    /// Absent on an incoming link with no target attached
    pub target: Option<Target>,

    /// Deliveries this endpoint still considers unsettled
    pub unsettled: Option<IndexMap<DeliveryTag, Option<DeliveryState>>>,

    /// Set when the unsettled map had to be truncated
    pub incomplete_unsettled: bool,

    /// MUST NOT be null if the role is sender; ignored otherwise
    pub initial_delivery_count: Option<SequenceNo>,

    /// Largest message this endpoint accepts; zero or absent means no limit
    pub max_message_size: Option<u64>,

    pub offered_capabilities: Option<Vec<Symbol>>,
    pub desired_capabilities: Option<Vec<Symbol>>,
    pub properties: Option<Fields>,
}

impl Attach {
    pub const DESCRIPTOR_CODE: u64 = 0x12;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:attach:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let name = list.required("name")?;
        let handle = list.required("handle")?;
        let role = list.required("role")?;
        let snd_settle_mode = list.field_or(SenderSettleMode::default())?;
        let rcv_settle_mode = list.field_or(ReceiverSettleMode::default())?;
        let source = list.field()?;
        let target = list.field()?;
        let unsettled = list.field()?;
        let incomplete_unsettled = list.field_or(false)?;
        let initial_delivery_count = list.field()?;
        let max_message_size = list.field()?;
        let offered_capabilities = list.field()?;
        let desired_capabilities = list.field()?;
        let properties = list.field()?;
        list.finish()?;
        Ok(Self {
            name,
            handle,
            role,
            snd_settle_mode,
            rcv_settle_mode,
            source,
            target,
            unsettled,
            incomplete_unsettled,
            initial_delivery_count,
            max_message_size,
            offered_capabilities,
            desired_capabilities,
            properties,
        })
    }
}

impl Encode for Attach {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.name);
        list.field(&self.handle);
        list.field(&self.role);
        list.field(&self.snd_settle_mode);
        list.field(&self.rcv_settle_mode);
        list.optional(&self.source);
        list.optional(&self.target);
        list.optional(&self.unsettled);
        list.field(&self.incomplete_unsettled);
        list.optional(&self.initial_delivery_count);
        list.optional(&self.max_message_size);
        list.optional(&self.offered_capabilities);
        list.optional(&self.desired_capabilities);
        list.optional(&self.properties);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

super::impl_decode_via_body!(Attach);

#[cfg(test)]
mod tests {
    use super::Attach;
    use crate::codec::{from_slice, to_vec};
    use crate::definitions::{ReceiverSettleMode, Role, SenderSettleMode};
    use crate::messaging::{Source, Target};

    #[test]
    fn attach_round_trip() {
        let attach = Attach {
            name: "sender-link-1".to_string(),
            handle: 0,
            role: Role::Sender,
            snd_settle_mode: SenderSettleMode::Mixed,
            rcv_settle_mode: ReceiverSettleMode::First,
            source: Some(Source::default()),
            target: Some(Target::with_address("q1")),
            unsettled: None,
            incomplete_unsettled: false,
            initial_delivery_count: Some(0),
            max_message_size: None,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
        };
        let bytes = to_vec(&attach);
        let (decoded, consumed) = from_slice::<Attach>(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, attach);
    }
}
