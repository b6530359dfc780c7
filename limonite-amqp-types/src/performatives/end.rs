//! 2.7.8 End

use bytes::BytesMut;

use crate::codec::{Decoder, Encode, ListEncoder};
use crate::definitions;
use crate::error::Error as CodecError;

/// Ends a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct End {
    /// Set when the end was caused by an error
    pub error: Option<definitions::Error>,
}

impl End {
    pub const DESCRIPTOR_CODE: u64 = 0x17;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:end:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let error = list.field()?;
        list.finish()?;
        Ok(Self { error })
    }
}

impl Encode for End {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.optional(&self.error);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

super::impl_decode_via_body!(End);
