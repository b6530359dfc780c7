//! 3.5.4 Target

use bytes::BytesMut;

use crate::codec::{Decode, Decoder, Encode, ListEncoder};
use crate::definitions::{Fields, Seconds};
use crate::error::Error as CodecError;
use crate::primitives::Symbol;

use super::{TerminusDurability, TerminusExpiryPolicy};

/// The target of a link: where messages are produced to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Target {
    /// The address of the target node
    pub address: Option<String>,

    /// What state of the terminus is retained durably
    pub durable: TerminusDurability,

    /// When the expiry timer starts
    pub expiry_policy: TerminusExpiryPolicy,

    /// Duration that an expiring target is retained
    pub timeout: Seconds,

    /// Request that the node be created on attach
    pub dynamic: bool,

    /// Node properties for a dynamically created target
    pub dynamic_node_properties: Option<Fields>,

    /// Extension capabilities the sender supports or desires
    pub capabilities: Option<Vec<Symbol>>,
}

impl Target {
    pub const DESCRIPTOR_CODE: u64 = 0x29;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:target:list";

    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Default::default()
        }
    }
}

impl From<&str> for Target {
    fn from(address: &str) -> Self {
        Target::with_address(address)
    }
}

impl From<String> for Target {
    fn from(address: String) -> Self {
        Target::with_address(address)
    }
}

impl Target {

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let address = list.field()?;
        let durable = list.field_or(TerminusDurability::default())?;
        let expiry_policy = list.field_or(TerminusExpiryPolicy::default())?;
        let timeout = list.field_or(0)?;
        let dynamic = list.field_or(false)?;
        let dynamic_node_properties = list.field()?;
        let capabilities = list.field()?;
        list.finish()?;
        Ok(Self {
            address,
            durable,
            expiry_policy,
            timeout,
            dynamic,
            dynamic_node_properties,
            capabilities,
        })
    }
}

impl Encode for Target {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.optional(&self.address);
        list.field(&self.durable);
        list.field(&self.expiry_policy);
        list.field(&self.timeout);
        list.field(&self.dynamic);
        list.optional(&self.dynamic_node_properties);
        list.optional(&self.capabilities);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

impl Decode for Target {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let descriptor = de.read_descriptor()?;
        if !crate::codec::descriptor_matches(&descriptor, Self::DESCRIPTOR_CODE, Self::DESCRIPTOR_NAME)
        {
            return Err(CodecError::UnexpectedDescriptor);
        }
        Self::decode_body(de)
    }
}

#[cfg(test)]
mod tests {
    use super::Target;
    use crate::codec::{from_slice, to_vec};

    #[test]
    fn target_round_trip() {
        let target = Target::with_address("q1");
        let bytes = to_vec(&target);
        let (decoded, _) = from_slice::<Target>(&bytes).unwrap();
        assert_eq!(decoded, target);
    }
}
