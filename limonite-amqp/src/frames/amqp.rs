//! AMQP frame type and its encoder/decoder

use bytes::{Buf, BufMut, BytesMut};
use limonite_amqp_types::codec::{Decode, Decoder as ValueDecoder, Encode};
use limonite_amqp_types::performatives::{
    Attach, Begin, Close, Detach, Disposition, End, Flow, Open, Performative, Transfer,
};
use tokio_util::codec::{Decoder, Encoder};

use crate::Payload;

use super::{Error, FRAME_TYPE_AMQP};

/// One AMQP frame: a channel number and a performative body.
#[derive(Debug)]
pub struct Frame {
    pub channel: u16,
    pub body: FrameBody,
}

impl Frame {
    pub fn new(channel: impl Into<u16>, body: FrameBody) -> Self {
        Self {
            channel: channel.into(),
            body,
        }
    }

    /// The empty frame used as a heartbeat.
    pub fn empty() -> Self {
        Self {
            channel: 0,
            body: FrameBody::Empty,
        }
    }
}

/// Body of an AMQP frame.
///
/// Transfer keeps its payload separate from the performative: the payload
/// bytes are handed around by ownership, never re-encoded.
#[derive(Debug)]
pub enum FrameBody {
    Open(Open),
    Begin(Begin),
    Attach(Attach),
    Flow(Flow),
    Transfer {
        performative: Transfer,
        payload: Payload,
    },
    Disposition(Disposition),
    Detach(Detach),
    End(End),
    Close(Close),
    /// An empty body; only used for heartbeats
    Empty,
}

/// Encoder/decoder for everything after the frame size prefix.
pub struct FrameCodec {}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // the extended header is never used, so doff is always 2
        dst.put_u8(2);
        dst.put_u8(FRAME_TYPE_AMQP);
        dst.put_u16(item.channel);

        match item.body {
            FrameBody::Open(p) => p.encode(dst),
            FrameBody::Begin(p) => p.encode(dst),
            FrameBody::Attach(p) => p.encode(dst),
            FrameBody::Flow(p) => p.encode(dst),
            FrameBody::Transfer {
                performative,
                payload,
            } => {
                performative.encode(dst);
                dst.put(payload);
            }
            FrameBody::Disposition(p) => p.encode(dst),
            FrameBody::Detach(p) => p.encode(dst),
            FrameBody::End(p) => p.encode(dst),
            FrameBody::Close(p) => p.encode(dst),
            FrameBody::Empty => {}
        }
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
        let channel = src.get_u16();

        if ftype != FRAME_TYPE_AMQP {
            return Err(Error::UnsupportedFrameType(ftype));
        }
        if doff < 2 {
            return Err(Error::FramingError);
        }
        // skip the extended header if the peer sent one
        let extended = (doff as usize) * 4 - 8;
        if src.remaining() < extended {
            return Err(Error::FramingError);
        }
        src.advance(extended);

        if src.is_empty() {
            return Ok(Some(Frame {
                channel,
                body: FrameBody::Empty,
            }));
        }

        let mut de = ValueDecoder::new(&src[..]);
        let performative = Performative::decode(&mut de)?;
        let consumed = de.position();
        src.advance(consumed);

        let body = match performative {
            Performative::Open(p) => FrameBody::Open(p),
            Performative::Begin(p) => FrameBody::Begin(p),
            Performative::Attach(p) => FrameBody::Attach(p),
            Performative::Flow(p) => FrameBody::Flow(p),
            Performative::Transfer(performative) => FrameBody::Transfer {
                performative,
                payload: src.split().freeze(),
            },
            Performative::Disposition(p) => FrameBody::Disposition(p),
            Performative::Detach(p) => FrameBody::Detach(p),
            Performative::End(p) => FrameBody::End(p),
            Performative::Close(p) => FrameBody::Close(p),
        };

        // trailing bytes after a non-transfer performative are not legal
        if !src.is_empty() {
            return Err(Error::FramingError);
        }
        Ok(Some(Frame { channel, body }))
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use limonite_amqp_types::performatives::Open;
    use tokio_util::codec::{Decoder, Encoder};

    use super::{Frame, FrameBody, FrameCodec};

    #[test]
    fn empty_frame_is_four_bytes_after_prefix() {
        let mut dst = BytesMut::new();
        FrameCodec {}.encode(Frame::empty(), &mut dst).unwrap();
        assert_eq!(dst.to_vec(), vec![0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn empty_frame_decodes_as_heartbeat() {
        let mut src = BytesMut::from(&[0x02, 0x00, 0x00, 0x00][..]);
        let frame = FrameCodec {}.decode(&mut src).unwrap().unwrap();
        assert!(matches!(frame.body, FrameBody::Empty));
    }

    #[test]
    fn open_frame_round_trip() {
        let open = Open {
            container_id: "c1".to_string(),
            max_frame_size: 4096,
            ..Default::default()
        };
        let mut dst = BytesMut::new();
        FrameCodec {}
            .encode(Frame::new(0u16, FrameBody::Open(open.clone())), &mut dst)
            .unwrap();
        let frame = FrameCodec {}.decode(&mut dst).unwrap().unwrap();
        match frame.body {
            FrameBody::Open(decoded) => assert_eq!(decoded, open),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn transfer_frame_keeps_payload() {
        use limonite_amqp_types::performatives::Transfer;

        let transfer = Transfer {
            handle: 0,
            delivery_id: Some(0),
            ..Default::default()
        };
        let payload = crate::Payload::from(&b"payload-bytes"[..]);
        let mut dst = BytesMut::new();
        FrameCodec {}
            .encode(
                Frame::new(
                    1u16,
                    FrameBody::Transfer {
                        performative: transfer,
                        payload: payload.clone(),
                    },
                ),
                &mut dst,
            )
            .unwrap();
        let frame = FrameCodec {}.decode(&mut dst).unwrap().unwrap();
        match frame.body {
            FrameBody::Transfer { payload: p, .. } => assert_eq!(p, payload),
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(frame.channel, 1);
    }

    #[test]
    fn extended_header_is_skipped() {
        // doff 3 adds four bytes of extended header before an empty body
        let mut src = BytesMut::from(&[0x03, 0x00, 0x00, 0x00, 0xde, 0xad, 0xbe, 0xef][..]);
        let frame = FrameCodec {}.decode(&mut src).unwrap().unwrap();
        assert!(matches!(frame.body, FrameBody::Empty));
    }

    #[test]
    fn bad_doff_is_a_framing_error() {
        let mut src = BytesMut::from(&[0x01, 0x00, 0x00, 0x00][..]);
        assert!(FrameCodec {}.decode(&mut src).is_err());
    }
}
