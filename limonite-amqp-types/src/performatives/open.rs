//! 2.7.1 Open

use bytes::BytesMut;

use crate::codec::{Decoder, Encode, ListEncoder};
use crate::definitions::{Fields, Milliseconds};
use crate::error::Error as CodecError;
use crate::primitives::Symbol;

/// Negotiates connection parameters; the first frame on every connection.
///
/// ```text
/// <type name="open" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:open:list" code="0x00000000:0x00000010"/>
///     <field name="container-id" type="string" mandatory="true"/>
///     <field name="hostname" type="string"/>
///     <field name="max-frame-size" type="uint" default="4294967295"/>
///     <field name="channel-max" type="ushort" default="65535"/>
///     <field name="idle-time-out" type="milliseconds"/>
///     <field name="outgoing-locales" type="ietf-language-tag" multiple="true"/>
///     <field name="incoming-locales" type="ietf-language-tag" multiple="true"/>
///     <field name="offered-capabilities" type="symbol" multiple="true"/>
///     <field name="desired-capabilities" type="symbol" multiple="true"/>
///     <field name="properties" type="fields"/>
/// </type>
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Open {
    pub container_id: String,
    pub hostname: Option<String>,
    pub max_frame_size: u32,
    pub channel_max: u16,
    pub idle_time_out: Option<Milliseconds>,
    pub outgoing_locales: Option<Vec<Symbol>>,
    pub incoming_locales: Option<Vec<Symbol>>,
    pub offered_capabilities: Option<Vec<Symbol>>,
    pub desired_capabilities: Option<Vec<Symbol>>,
    pub properties: Option<Fields>,
}

impl Default for Open {
    fn default() -> Self {
        Self {
            container_id: String::new(),
            hostname: None,
            max_frame_size: u32::MAX,
            channel_max: u16::MAX,
            idle_time_out: None,
            outgoing_locales: None,
            incoming_locales: None,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
        }
    }
}

impl Open {
    pub const DESCRIPTOR_CODE: u64 = 0x10;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:open:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let container_id = list.required("container-id")?;
        let hostname = list.field()?;
        let max_frame_size = list.field_or(u32::MAX)?;
        let channel_max = list.field_or(u16::MAX)?;
        let idle_time_out = list.field()?;
        let outgoing_locales = list.field()?;
        let incoming_locales = list.field()?;
        let offered_capabilities = list.field()?;
        let desired_capabilities = list.field()?;
        let properties = list.field()?;
        list.finish()?;
        Ok(Self {
            container_id,
            hostname,
            max_frame_size,
            channel_max,
            idle_time_out,
            outgoing_locales,
            incoming_locales,
            offered_capabilities,
            desired_capabilities,
            properties,
        })
    }
}

impl Encode for Open {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.container_id);
        list.optional(&self.hostname);
        list.field(&self.max_frame_size);
        list.field(&self.channel_max);
        list.optional(&self.idle_time_out);
        list.optional(&self.outgoing_locales);
        list.optional(&self.incoming_locales);
        list.optional(&self.offered_capabilities);
        list.optional(&self.desired_capabilities);
        list.optional(&self.properties);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

super::impl_decode_via_body!(Open);

#[cfg(test)]
mod tests {
    use super::Open;
    use crate::codec::{from_slice, to_vec};

    #[test]
    fn open_encoding_matches_reference_bytes() {
        let open = Open {
            container_id: "1234".to_string(),
            hostname: Some("127.0.0.1".to_string()),
            max_frame_size: 1000,
            channel_max: 9,
            idle_time_out: Some(5),
            ..Default::default()
        };
        assert_eq!(
            to_vec(&open),
            vec![
                0x00, 0x53, 0x10, 0xC0, 0x1c, 0x05, 0xA1, 0x04, 0x31, 0x32, 0x33, 0x34, 0xA1,
                0x09, 0x31, 0x32, 0x37, 0x2E, 0x30, 0x2E, 0x30, 0x2E, 0x31, 0x70, 0x00, 0x00,
                0x03, 0xe8, 0x60, 0x00, 0x09, 0x52, 0x05,
            ]
        );
    }

    #[test]
    fn open_round_trip() {
        let open = Open {
            container_id: "client-1".to_string(),
            ..Default::default()
        };
        let bytes = to_vec(&open);
        let (decoded, _) = from_slice::<Open>(&bytes).unwrap();
        assert_eq!(decoded, open);
    }
}
