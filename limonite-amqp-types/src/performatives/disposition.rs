//! 2.7.6 Disposition

use bytes::BytesMut;

use crate::codec::{Decoder, Encode, ListEncoder};
use crate::definitions::{DeliveryNumber, Role};
use crate::error::Error as CodecError;
use crate::messaging::DeliveryState;

/// Communicates delivery state for a contiguous range of delivery-ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Disposition {
    /// The role the sending endpoint plays on the affected links
    pub role: Role,

    /// First delivery-id of the range
    pub first: DeliveryNumber,

    /// Last delivery-id of the range; defaults to `first`
    pub last: Option<DeliveryNumber>,

    /// Whether the referenced deliveries are considered settled
    pub settled: bool,

    pub state: Option<DeliveryState>,

    pub batchable: bool,
}

impl Disposition {
    pub const DESCRIPTOR_CODE: u64 = 0x15;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:disposition:list";

    pub(crate) fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let role = list.required("role")?;
        let first = list.required("first")?;
        let last = list.field()?;
        let settled = list.field_or(false)?;
        let state = list.field()?;
        let batchable = list.field_or(false)?;
        list.finish()?;
        Ok(Self {
            role,
            first,
            last,
            settled,
            state,
            batchable,
        })
    }
}

impl Encode for Disposition {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.role);
        list.field(&self.first);
        list.optional(&self.last);
        list.field(&self.settled);
        list.optional(&self.state);
        list.field(&self.batchable);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

super::impl_decode_via_body!(Disposition);

#[cfg(test)]
mod tests {
    use super::Disposition;
    use crate::codec::{from_slice, to_vec};
    use crate::definitions::Role;
    use crate::messaging::{Accepted, DeliveryState};

    #[test]
    fn disposition_round_trip() {
        let disposition = Disposition {
            role: Role::Receiver,
            first: 0,
            last: Some(0),
            settled: true,
            state: Some(DeliveryState::Accepted(Accepted {})),
            batchable: false,
        };
        let bytes = to_vec(&disposition);
        let (decoded, _) = from_slice::<Disposition>(&bytes).unwrap();
        assert_eq!(decoded, disposition);
    }
}
