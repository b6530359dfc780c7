//! 2.8.14 Error

use bytes::BytesMut;

use crate::codec::{Decode, Decoder, Encode, ListEncoder};
use crate::error::Error as CodecError;

use super::{ErrorCondition, Fields};

/// Details of an error.
///
/// ```text
/// <type name="error" class="composite" source="list">
///     <descriptor name="amqp:error:list" code="0x00000000:0x0000001d"/>
///     <field name="condition" type="symbol" requires="error-condition" mandatory="true"/>
///     <field name="description" type="string"/>
///     <field name="info" type="fields"/>
/// </type>
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    /// A symbolic value indicating the error condition
    pub condition: ErrorCondition,

    /// Descriptive text about the error condition
    pub description: Option<String>,

    /// Map carrying information about the error condition
    pub info: Option<Fields>,
}

impl Error {
    pub const DESCRIPTOR_CODE: u64 = 0x1d;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:error:list";

    pub fn new(condition: impl Into<ErrorCondition>, description: impl Into<Option<String>>) -> Self {
        Self {
            condition: condition.into(),
            description: description.into(),
            info: None,
        }
    }

    pub fn condition(condition: impl Into<ErrorCondition>) -> Self {
        Self::new(condition, None)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.condition, description),
            None => write!(f, "{}", self.condition),
        }
    }
}

impl Encode for Error {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.condition);
        list.optional(&self.description);
        list.optional(&self.info);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

impl Decode for Error {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.read_composite(Self::DESCRIPTOR_CODE, Self::DESCRIPTOR_NAME)?;
        let condition = list.required("condition")?;
        let description = list.field()?;
        let info = list.field()?;
        list.finish()?;
        Ok(Self {
            condition,
            description,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::codec::{from_slice, to_vec};
    use crate::definitions::LinkError;

    #[test]
    fn error_round_trip() {
        let error = Error::new(LinkError::Stolen, Some("taken elsewhere".to_string()));
        let bytes = to_vec(&error);
        let (decoded, consumed) = from_slice::<Error>(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, error);
    }
}
