//! SASL frame type and its encoder/decoder

use bytes::{Buf, BufMut, BytesMut};
use limonite_amqp_types::codec::{Decode, Decoder as ValueDecoder, Encode};
use limonite_amqp_types::sasl::SaslFrameBody;
use tokio_util::codec::{Decoder, Encoder};

use super::{Error, FRAME_TYPE_SASL};

/// One SASL frame. SASL frames always travel on channel 0, so only the body
/// is kept.
#[derive(Debug)]
pub struct Frame {
    pub body: SaslFrameBody,
}

impl Frame {
    pub fn new(body: SaslFrameBody) -> Self {
        Self { body }
    }
}

/// Encoder/decoder for everything after the frame size prefix.
pub struct FrameCodec {}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(2); // doff
        dst.put_u8(FRAME_TYPE_SASL);
        // bytes 6 and 7 are ignored for SASL frames
        dst.put_u16(0x0000);
        item.body.encode(dst);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.remaining() < 4 {
            return Err(Error::FramingError);
        }
        let doff = src.get_u8();
        let ftype = src.get_u8();
        let _ignored = src.get_u16();

        if ftype != FRAME_TYPE_SASL {
            return Err(Error::UnsupportedFrameType(ftype));
        }
        if doff < 2 {
            return Err(Error::FramingError);
        }
        let extended = (doff as usize) * 4 - 8;
        if src.remaining() < extended {
            return Err(Error::FramingError);
        }
        src.advance(extended);

        let mut de = ValueDecoder::new(&src[..]);
        let body = SaslFrameBody::decode(&mut de)?;
        src.advance(de.position());
        Ok(Some(Frame { body }))
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use limonite_amqp_types::primitives::Symbol;
    use limonite_amqp_types::sasl::{SaslFrameBody, SaslMechanisms};
    use tokio_util::codec::{Decoder, Encoder};

    use super::{Frame, FrameCodec};

    #[test]
    fn mechanisms_frame_round_trip() {
        let body = SaslFrameBody::Mechanisms(SaslMechanisms {
            sasl_server_mechanisms: vec![Symbol::from("PLAIN")],
        });
        let mut dst = BytesMut::new();
        FrameCodec {}.encode(Frame::new(body.clone()), &mut dst).unwrap();
        let frame = FrameCodec {}.decode(&mut dst).unwrap().unwrap();
        assert_eq!(frame.body, body);
    }
}
