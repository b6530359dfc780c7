//! Deliveries: what a receiver takes out of a link, what a sender puts in

use limonite_amqp_types::definitions::{
    DeliveryNumber, DeliveryTag, MessageFormat, MAX_DELIVERY_TAG_LENGTH,
};
use limonite_amqp_types::messaging::Message;
use limonite_amqp_types::primitives::Binary;

/// A message received on a link, together with its transfer identity.
#[derive(Debug)]
pub struct Delivery {
    pub(crate) delivery_id: DeliveryNumber,
    pub(crate) delivery_tag: DeliveryTag,
    pub(crate) message_format: MessageFormat,
    pub(crate) settled: bool,
    pub(crate) message: Message,
}

impl Delivery {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn delivery_id(&self) -> DeliveryNumber {
        self.delivery_id
    }

    pub fn delivery_tag(&self) -> &DeliveryTag {
        &self.delivery_tag
    }

    pub fn message_format(&self) -> MessageFormat {
        self.message_format
    }

    /// Whether the sender already settled this delivery; settled deliveries
    /// need no disposition.
    pub fn is_settled(&self) -> bool {
        self.settled
    }
}

/// A message on its way out, with its transfer options.
#[derive(Debug)]
pub struct Sendable {
    pub(crate) message: Message,
    pub(crate) message_format: MessageFormat,
    /// Per-send settlement override; only honored in mixed settle mode
    pub(crate) settled: Option<bool>,
}

impl Sendable {
    pub fn builder() -> SendableBuilder {
        SendableBuilder::default()
    }
}

impl<T: Into<Message>> From<T> for Sendable {
    fn from(value: T) -> Self {
        Self {
            message: value.into(),
            message_format: 0,
            settled: None,
        }
    }
}

/// Builds a [`Sendable`] with non-default transfer options.
#[derive(Debug, Default)]
pub struct SendableBuilder {
    message: Option<Message>,
    message_format: MessageFormat,
    settled: Option<bool>,
}

impl SendableBuilder {
    pub fn message(mut self, message: impl Into<Message>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn message_format(mut self, message_format: MessageFormat) -> Self {
        self.message_format = message_format;
        self
    }

    pub fn settled(mut self, settled: bool) -> Self {
        self.settled = Some(settled);
        self
    }

    pub fn build(self) -> Sendable {
        Sendable {
            message: self.message.unwrap_or_default(),
            message_format: self.message_format,
            settled: self.settled,
        }
    }
}

/// Source of delivery tags for a sender link.
///
/// Injectable so tests can pin tags down; the default draws random bytes.
pub trait TagSource: Send {
    fn next_tag(&mut self) -> DeliveryTag;
}

/// Tags are 16 random octets; uniqueness among a link's unsettled
/// deliveries is overwhelmingly likely and verified nowhere.
#[derive(Debug, Default)]
pub struct RandomTagSource {}

impl TagSource for RandomTagSource {
    fn next_tag(&mut self) -> DeliveryTag {
        Binary::from(rand::random::<[u8; 16]>())
    }
}

/// Checks a caller-provided or generated tag against the protocol limit.
pub(crate) fn check_tag(tag: &DeliveryTag) -> bool {
    tag.len() <= MAX_DELIVERY_TAG_LENGTH
}

#[cfg(test)]
mod tests {
    use super::{check_tag, RandomTagSource, TagSource};
    use limonite_amqp_types::primitives::Binary;

    #[test]
    fn random_tags_are_within_limit() {
        let mut source = RandomTagSource::default();
        let tag = source.next_tag();
        assert_eq!(tag.len(), 16);
        assert!(check_tag(&tag));
    }

    #[test]
    fn oversized_tag_is_rejected() {
        assert!(!check_tag(&Binary::from(vec![0u8; 33])));
    }
}
