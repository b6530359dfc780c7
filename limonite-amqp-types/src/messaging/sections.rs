//! 3.2 Message Format: the described sections a message is assembled from

use bytes::BytesMut;
use indexmap::IndexMap;

use crate::codec::{
    put_described_prefix, Decode, Decoder, Encode, ListEncoder,
};
use crate::definitions::{Milliseconds, SequenceNo};
use crate::error::Error as CodecError;
use crate::format_code::FormatCode;
use crate::primitives::{Binary, Symbol, Timestamp, Uuid};
use crate::value::Value;

/// Keyed annotations attached to a message (3.2.10)
pub type Annotations = IndexMap<Symbol, Value>;

/// 3.2.1 Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub durable: bool,
    pub priority: u8,
    pub ttl: Option<Milliseconds>,
    pub first_acquirer: bool,
    pub delivery_count: u32,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            durable: false,
            priority: 4,
            ttl: None,
            first_acquirer: false,
            delivery_count: 0,
        }
    }
}

impl Header {
    pub const DESCRIPTOR_CODE: u64 = 0x70;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:header:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let durable = list.field_or(false)?;
        let priority = list.field_or(4)?;
        let ttl = list.field()?;
        let first_acquirer = list.field_or(false)?;
        let delivery_count = list.field_or(0)?;
        list.finish()?;
        Ok(Self {
            durable,
            priority,
            ttl,
            first_acquirer,
            delivery_count,
        })
    }
}

impl Encode for Header {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.durable);
        list.field(&self.priority);
        list.optional(&self.ttl);
        list.field(&self.first_acquirer);
        list.field(&self.delivery_count);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// 3.2.2 Delivery Annotations: consumed by intermediaries along the path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryAnnotations(pub Annotations);

impl DeliveryAnnotations {
    pub const DESCRIPTOR_CODE: u64 = 0x71;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:delivery-annotations:map";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self(Annotations::decode(de)?))
    }
}

impl Encode for DeliveryAnnotations {
    fn encode(&self, buf: &mut BytesMut) {
        put_described_prefix(Self::DESCRIPTOR_CODE, buf);
        self.0.encode(buf);
    }
}

/// 3.2.3 Message Annotations: propagated with the message end to end
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageAnnotations(pub Annotations);

impl MessageAnnotations {
    pub const DESCRIPTOR_CODE: u64 = 0x72;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:message-annotations:map";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self(Annotations::decode(de)?))
    }
}

impl Encode for MessageAnnotations {
    fn encode(&self, buf: &mut BytesMut) {
        put_described_prefix(Self::DESCRIPTOR_CODE, buf);
        self.0.encode(buf);
    }
}

/// An application message id (3.2.4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageId {
    ULong(u64),
    Uuid(Uuid),
    Binary(Binary),
    String(String),
}

impl From<&str> for MessageId {
    fn from(v: &str) -> Self {
        MessageId::String(v.to_string())
    }
}

impl From<u64> for MessageId {
    fn from(v: u64) -> Self {
        MessageId::ULong(v)
    }
}

impl From<Uuid> for MessageId {
    fn from(v: Uuid) -> Self {
        MessageId::Uuid(v)
    }
}

impl Encode for MessageId {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            MessageId::ULong(v) => v.encode(buf),
            MessageId::Uuid(v) => v.encode(buf),
            MessageId::Binary(v) => v.encode(buf),
            MessageId::String(v) => v.encode(buf),
        }
    }
}

impl Decode for MessageId {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        match FormatCode::try_from(de.peek_u8()?)? {
            FormatCode::ULong | FormatCode::SmallULong | FormatCode::ULong0 => {
                Ok(MessageId::ULong(u64::decode(de)?))
            }
            FormatCode::Uuid => Ok(MessageId::Uuid(Uuid::decode(de)?)),
            FormatCode::VBin8 | FormatCode::VBin32 => Ok(MessageId::Binary(Binary::decode(de)?)),
            FormatCode::Str8 | FormatCode::Str32 => Ok(MessageId::String(String::decode(de)?)),
            _ => Err(CodecError::InvalidValue),
        }
    }
}

/// 3.2.4 Properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    pub message_id: Option<MessageId>,
    pub user_id: Option<Binary>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub reply_to: Option<String>,
    pub correlation_id: Option<MessageId>,
    pub content_type: Option<Symbol>,
    pub content_encoding: Option<Symbol>,
    pub absolute_expiry_time: Option<Timestamp>,
    pub creation_time: Option<Timestamp>,
    pub group_id: Option<String>,
    pub group_sequence: Option<SequenceNo>,
    pub reply_to_group_id: Option<String>,
}

impl Properties {
    pub const DESCRIPTOR_CODE: u64 = 0x73;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:properties:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let message_id = list.field()?;
        let user_id = list.field()?;
        let to = list.field()?;
        let subject = list.field()?;
        let reply_to = list.field()?;
        let correlation_id = list.field()?;
        let content_type = list.field()?;
        let content_encoding = list.field()?;
        let absolute_expiry_time = list.field()?;
        let creation_time = list.field()?;
        let group_id = list.field()?;
        let group_sequence = list.field()?;
        let reply_to_group_id = list.field()?;
        list.finish()?;
        Ok(Self {
            message_id,
            user_id,
            to,
            subject,
            reply_to,
            correlation_id,
            content_type,
            content_encoding,
            absolute_expiry_time,
            creation_time,
            group_id,
            group_sequence,
            reply_to_group_id,
        })
    }
}

impl Encode for Properties {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.optional(&self.message_id);
        list.optional(&self.user_id);
        list.optional(&self.to);
        list.optional(&self.subject);
        list.optional(&self.reply_to);
        list.optional(&self.correlation_id);
        list.optional(&self.content_type);
        list.optional(&self.content_encoding);
        list.optional(&self.absolute_expiry_time);
        list.optional(&self.creation_time);
        list.optional(&self.group_id);
        list.optional(&self.group_sequence);
        list.optional(&self.reply_to_group_id);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

impl Decode for Properties {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let descriptor = de.read_descriptor()?;
        if !crate::codec::descriptor_matches(
            &descriptor,
            Self::DESCRIPTOR_CODE,
            Self::DESCRIPTOR_NAME,
        ) {
            return Err(CodecError::UnexpectedDescriptor);
        }
        Self::decode_body(de)
    }
}

/// 3.2.5 Application Properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationProperties(pub IndexMap<String, Value>);

impl ApplicationProperties {
    pub const DESCRIPTOR_CODE: u64 = 0x74;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:application-properties:map";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self(IndexMap::decode(de)?))
    }
}

impl Encode for ApplicationProperties {
    fn encode(&self, buf: &mut BytesMut) {
        put_described_prefix(Self::DESCRIPTOR_CODE, buf);
        self.0.encode(buf);
    }
}

/// 3.2.6 Data: one opaque binary body section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Data(pub Binary);

impl Data {
    pub const DESCRIPTOR_CODE: u64 = 0x75;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:data:binary";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self(Binary::decode(de)?))
    }
}

impl Encode for Data {
    fn encode(&self, buf: &mut BytesMut) {
        put_described_prefix(Self::DESCRIPTOR_CODE, buf);
        self.0.encode(buf);
    }
}

/// 3.2.7 AMQP Sequence: one list body section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmqpSequence(pub Vec<Value>);

impl AmqpSequence {
    pub const DESCRIPTOR_CODE: u64 = 0x76;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:amqp-sequence:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self(Vec::<Value>::decode(de)?))
    }
}

impl Encode for AmqpSequence {
    fn encode(&self, buf: &mut BytesMut) {
        put_described_prefix(Self::DESCRIPTOR_CODE, buf);
        self.0.encode(buf);
    }
}

/// 3.2.8 AMQP Value: a single arbitrary value as the body
#[derive(Debug, Clone, PartialEq)]
pub struct AmqpValue(pub Value);

impl AmqpValue {
    pub const DESCRIPTOR_CODE: u64 = 0x77;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:amqp-value:*";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self(Value::decode(de)?))
    }
}

impl Encode for AmqpValue {
    fn encode(&self, buf: &mut BytesMut) {
        put_described_prefix(Self::DESCRIPTOR_CODE, buf);
        self.0.encode(buf);
    }
}

/// 3.2.9 Footer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Footer(pub Annotations);

impl Footer {
    pub const DESCRIPTOR_CODE: u64 = 0x78;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:footer:map";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(Self(Annotations::decode(de)?))
    }
}

impl Encode for Footer {
    fn encode(&self, buf: &mut BytesMut) {
        put_described_prefix(Self::DESCRIPTOR_CODE, buf);
        self.0.encode(buf);
    }
}
