//! 3.5.3 Source

use bytes::BytesMut;

use crate::codec::{Decode, Decoder, Encode, ListEncoder};
use crate::definitions::{Fields, Seconds};
use crate::error::Error as CodecError;
use crate::primitives::Symbol;

use super::{
    Outcome, TerminusDurability, TerminusExpiryPolicy,
};

/// A filter set: named filters keyed by symbol; an entry's value is usually
/// a described filter type.
pub type FilterSet = Fields;

/// The source of a link: where messages are consumed from.
///
/// ```text
/// <type name="source" class="composite" source="list" provides="source">
///     <descriptor name="amqp:source:list" code="0x00000000:0x00000028"/>
/// </type>
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Source {
    /// The address of the source node
    pub address: Option<String>,

    /// What state of the terminus is retained durably
    pub durable: TerminusDurability,

    /// When the expiry timer starts
    pub expiry_policy: TerminusExpiryPolicy,

    /// Duration that an expiring source is retained
    pub timeout: Seconds,

    /// Request that the node be created on attach
    pub dynamic: bool,

    /// Node properties for a dynamically created source
    pub dynamic_node_properties: Option<Fields>,

    /// The distribution mode of the link (`move` or `copy`)
    pub distribution_mode: Option<Symbol>,

    /// Predicates to filter messages admitted to the link
    pub filter: Option<FilterSet>,

    /// Outcome to assign to deliveries not otherwise settled
    pub default_outcome: Option<Outcome>,

    /// Outcomes the sender may choose from
    pub outcomes: Option<Vec<Symbol>>,

    /// Extension capabilities the sender supports or desires
    pub capabilities: Option<Vec<Symbol>>,
}

impl Source {
    pub const DESCRIPTOR_CODE: u64 = 0x28;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:source:list";

    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Default::default()
        }
    }
}

impl From<&str> for Source {
    fn from(address: &str) -> Self {
        Source::with_address(address)
    }
}

impl From<String> for Source {
    fn from(address: String) -> Self {
        Source::with_address(address)
    }
}

impl Source {

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let address = list.field()?;
        let durable = list.field_or(TerminusDurability::default())?;
        let expiry_policy = list.field_or(TerminusExpiryPolicy::default())?;
        let timeout = list.field_or(0)?;
        let dynamic = list.field_or(false)?;
        let dynamic_node_properties = list.field()?;
        let distribution_mode = list.field()?;
        let filter = list.field()?;
        let default_outcome = list.field()?;
        let outcomes = list.field()?;
        let capabilities = list.field()?;
        list.finish()?;
        Ok(Self {
            address,
            durable,
            expiry_policy,
            timeout,
            dynamic,
            dynamic_node_properties,
            distribution_mode,
            filter,
            default_outcome,
            outcomes,
            capabilities,
        })
    }
}

impl Encode for Source {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.optional(&self.address);
        list.field(&self.durable);
        list.field(&self.expiry_policy);
        list.field(&self.timeout);
        list.field(&self.dynamic);
        list.optional(&self.dynamic_node_properties);
        list.optional(&self.distribution_mode);
        list.optional(&self.filter);
        list.optional(&self.default_outcome);
        list.optional(&self.outcomes);
        list.optional(&self.capabilities);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

impl Decode for Source {
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
    use super::Source;
    use crate::codec::{from_slice, to_vec};
    use crate::primitives::Symbol;

    #[test]
    fn source_round_trip() {
        let source = Source {
            address: Some("/queue".to_string()),
            dynamic: false,
            capabilities: Some(vec![Symbol::from("queue")]),
            ..Default::default()
        };
        let bytes = to_vec(&source);
        let (decoded, _) = from_slice::<Source>(&bytes).unwrap();
        assert_eq!(decoded, source);
    }

    #[test]
    fn empty_source_decodes_with_defaults() {
        let bytes = to_vec(&Source::default());
        let (decoded, _) = from_slice::<Source>(&bytes).unwrap();
        assert_eq!(decoded, Source::default());
    }
}
