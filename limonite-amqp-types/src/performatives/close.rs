//! 2.7.9 Close

use bytes::BytesMut;

use crate::codec::{Decoder, Encode, ListEncoder};
use crate::definitions;
use crate::error::Error as CodecError;

/// Closes the connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Close {
    /// Set when the close was caused by an error
    pub error: Option<definitions::Error>,
}

impl Close {
    pub const DESCRIPTOR_CODE: u64 = 0x18;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:close:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let error = list.field()?;
        list.finish()?;
        Ok(Self { error })
    }
}

impl Encode for Close {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.optional(&self.error);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

super::impl_decode_via_body!(Close);
