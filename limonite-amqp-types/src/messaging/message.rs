//! The annotated message as transferred over a link (3.2)

use bytes::BytesMut;

use crate::codec::{Decode, Decoder, Encode};
use crate::error::Error as CodecError;
use crate::primitives::Binary;
use crate::value::{Descriptor, Value};

use super::sections::{
    AmqpSequence, AmqpValue, ApplicationProperties, Data, DeliveryAnnotations, Footer, Header,
    MessageAnnotations, Properties,
};

/// The body of a message: data sections, sequence sections, or one value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// One or more binary data sections
    Data(Vec<Binary>),
    /// One or more structured sequence sections
    Sequence(Vec<Vec<Value>>),
    /// A single arbitrary value
    Value(Value),
    /// No body section at all
    #[default]
    Empty,
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// The concatenated payload of all data sections, if this is a data body.
    pub fn data(&self) -> Option<Vec<u8>> {
        match self {
            Body::Data(sections) => {
                let mut out = Vec::new();
                for section in sections {
                    out.extend_from_slice(section);
                }
                Some(out)
            }
            _ => None,
        }
    }
}

/// A complete message: optional sections in their specified order around a
/// body.
///
/// Multi-frame transfers carry the encoding of one message split across
/// payloads; the message itself is oblivious to framing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub header: Option<Header>,
    pub delivery_annotations: Option<DeliveryAnnotations>,
    pub message_annotations: Option<MessageAnnotations>,
    pub properties: Option<Properties>,
    pub application_properties: Option<ApplicationProperties>,
    pub body: Body,
    pub footer: Option<Footer>,
}

impl Message {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// The concatenated data-section payload, if any.
    pub fn data(&self) -> Option<Vec<u8>> {
        self.body.data()
    }
}

impl<T: Into<Body>> From<T> for Message {
    fn from(body: T) -> Self {
        Message {
            body: body.into(),
            ..Default::default()
        }
    }
}

impl From<&str> for Body {
    fn from(v: &str) -> Self {
        Body::Value(Value::from(v))
    }
}

impl From<String> for Body {
    fn from(v: String) -> Self {
        Body::Value(Value::from(v))
    }
}

impl From<Value> for Body {
    fn from(v: Value) -> Self {
        Body::Value(v)
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Data(vec![Binary(v)])
    }
}

impl From<&[u8]> for Body {
    fn from(v: &[u8]) -> Self {
        Body::Data(vec![Binary::from(v)])
    }
}

impl Encode for Message {
    fn encode(&self, buf: &mut BytesMut) {
        if let Some(header) = &self.header {
            header.encode(buf);
        }
        if let Some(delivery_annotations) = &self.delivery_annotations {
            delivery_annotations.encode(buf);
        }
        if let Some(message_annotations) = &self.message_annotations {
            message_annotations.encode(buf);
        }
        if let Some(properties) = &self.properties {
            properties.encode(buf);
        }
        if let Some(application_properties) = &self.application_properties {
            application_properties.encode(buf);
        }
        match &self.body {
            Body::Data(sections) => {
                for section in sections {
                    Data(section.clone()).encode(buf);
                }
            }
            Body::Sequence(sections) => {
                for section in sections {
                    AmqpSequence(section.clone()).encode(buf);
                }
            }
            Body::Value(value) => AmqpValue(value.clone()).encode(buf),
            Body::Empty => {}
        }
        if let Some(footer) = &self.footer {
            footer.encode(buf);
        }
    }
}

impl Decode for Message {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut message = Message::default();
        let mut data_sections: Vec<Binary> = Vec::new();
        let mut sequence_sections: Vec<Vec<Value>> = Vec::new();

        while !de.is_empty() {
            let code = match de.read_descriptor()? {
                Descriptor::Code(code) => code,
                Descriptor::Symbol(name) => match name.as_str() {
                    Header::DESCRIPTOR_NAME => Header::DESCRIPTOR_CODE,
                    DeliveryAnnotations::DESCRIPTOR_NAME => DeliveryAnnotations::DESCRIPTOR_CODE,
                    MessageAnnotations::DESCRIPTOR_NAME => MessageAnnotations::DESCRIPTOR_CODE,
                    Properties::DESCRIPTOR_NAME => Properties::DESCRIPTOR_CODE,
                    ApplicationProperties::DESCRIPTOR_NAME => ApplicationProperties::DESCRIPTOR_CODE,
                    Data::DESCRIPTOR_NAME => Data::DESCRIPTOR_CODE,
                    AmqpSequence::DESCRIPTOR_NAME => AmqpSequence::DESCRIPTOR_CODE,
                    AmqpValue::DESCRIPTOR_NAME => AmqpValue::DESCRIPTOR_CODE,
                    Footer::DESCRIPTOR_NAME => Footer::DESCRIPTOR_CODE,
                    _ => return Err(CodecError::UnexpectedDescriptor),
                },
            };
            match code {
                Header::DESCRIPTOR_CODE => message.header = Some(Header::decode_body(de)?),
                DeliveryAnnotations::DESCRIPTOR_CODE => {
                    message.delivery_annotations = Some(DeliveryAnnotations::decode_body(de)?)
                }
                MessageAnnotations::DESCRIPTOR_CODE => {
                    message.message_annotations = Some(MessageAnnotations::decode_body(de)?)
                }
                Properties::DESCRIPTOR_CODE => {
                    message.properties = Some(Properties::decode_body(de)?)
                }
                ApplicationProperties::DESCRIPTOR_CODE => {
                    message.application_properties = Some(ApplicationProperties::decode_body(de)?)
                }
                Data::DESCRIPTOR_CODE => data_sections.push(Data::decode_body(de)?.0),
                AmqpSequence::DESCRIPTOR_CODE => {
                    sequence_sections.push(AmqpSequence::decode_body(de)?.0)
                }
                AmqpValue::DESCRIPTOR_CODE => {
                    message.body = Body::Value(AmqpValue::decode_body(de)?.0)
                }
                Footer::DESCRIPTOR_CODE => message.footer = Some(Footer::decode_body(de)?),
                _ => return Err(CodecError::UnexpectedDescriptor),
            }
        }

        if !data_sections.is_empty() {
            message.body = Body::Data(data_sections);
        } else if !sequence_sections.is_empty() {
            message.body = Body::Sequence(sequence_sections);
        }
        Ok(message)
    }
}

/// Builds a message section by section.
#[derive(Debug, Default)]
pub struct Builder {
    message: Message,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, header: Header) -> Self {
        self.message.header = Some(header);
        self
    }

    pub fn delivery_annotations(mut self, annotations: DeliveryAnnotations) -> Self {
        self.message.delivery_annotations = Some(annotations);
        self
    }

    pub fn message_annotations(mut self, annotations: MessageAnnotations) -> Self {
        self.message.message_annotations = Some(annotations);
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.message.properties = Some(properties);
        self
    }

    pub fn application_properties(mut self, properties: ApplicationProperties) -> Self {
        self.message.application_properties = Some(properties);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.message.body = body.into();
        self
    }

    pub fn footer(mut self, footer: Footer) -> Self {
        self.message.footer = Some(footer);
        self
    }

    pub fn build(self) -> Message {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::{Body, Message};
    use crate::codec::{from_slice, to_vec};
    use crate::messaging::sections::{ApplicationProperties, Header, MessageId, Properties};
    use crate::primitives::Binary;
    use crate::value::Value;

    #[test]
    fn data_message_round_trip() {
        let message = Message::builder()
            .header(Header {
                durable: true,
                ..Default::default()
            })
            .properties(Properties {
                message_id: Some(MessageId::from("m-1")),
                to: Some("/queue".to_string()),
                ..Default::default()
            })
            .body(vec![0xffu8])
            .build();

        let bytes = to_vec(&message);
        let (decoded, consumed) = from_slice::<Message>(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, message);
        assert_eq!(decoded.data(), Some(vec![0xff]));
    }

    #[test]
    fn multiple_data_sections_are_collected() {
        let message = Message {
            body: Body::Data(vec![Binary::from(&b"ab"[..]), Binary::from(&b"cd"[..])]),
            ..Default::default()
        };
        let bytes = to_vec(&message);
        let (decoded, _) = from_slice::<Message>(&bytes).unwrap();
        assert_eq!(decoded.data(), Some(b"abcd".to_vec()));
    }

    #[test]
    fn value_body_round_trip() {
        let message = Message::from("hello AMQP");
        let bytes = to_vec(&message);
        let (decoded, _) = from_slice::<Message>(&bytes).unwrap();
        assert_eq!(decoded.body, Body::Value(Value::from("hello AMQP")));
    }

    #[test]
    fn bodyless_message_decodes_empty() {
        let message = Message {
            application_properties: Some(ApplicationProperties(
                [("k".to_string(), Value::from(1u32))].into_iter().collect(),
            )),
            ..Default::default()
        };
        let bytes = to_vec(&message);
        let (decoded, _) = from_slice::<Message>(&bytes).unwrap();
        assert!(decoded.body.is_empty());
    }
}
