//! 2.7.7 Detach

use bytes::BytesMut;

use crate::codec::{Decoder, Encode, ListEncoder};
use crate::definitions::{self, Handle};
use crate::error::Error as CodecError;

/// Detaches a link from a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detach {
    pub handle: Handle,

    /// True when the link is being closed rather than suspended
    pub closed: bool,

    /// Set when the detach was caused by an error
    pub error: Option<definitions::Error>,
}

impl Detach {
    pub const DESCRIPTOR_CODE: u64 = 0x16;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:detach:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let handle = list.required("handle")?;
        let closed = list.field_or(false)?;
        let error = list.field()?;
        list.finish()?;
        Ok(Self {
            handle,
            closed,
            error,
        })
    }
}

impl Encode for Detach {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.handle);
        list.field(&self.closed);
        list.optional(&self.error);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

super::impl_decode_via_body!(Detach);

#[cfg(test)]
mod tests {
    use super::Detach;
    use crate::codec::{from_slice, to_vec};
    use crate::definitions::{self, LinkError};

    #[test]
    fn detach_round_trip() {
        let detach = Detach {
            handle: 1,
            closed: true,
            error: Some(definitions::Error::condition(LinkError::Stolen)),
        };
        let bytes = to_vec(&detach);
        let (decoded, _) = from_slice::<Detach>(&bytes).unwrap();
        assert_eq!(decoded, detach);
    }
}
