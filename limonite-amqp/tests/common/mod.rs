//! A scripted AMQP peer for driving the client over an in-memory stream.

#![allow(dead_code)]

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use limonite_amqp::types::codec::{from_slice, to_vec, Encode};
use limonite_amqp::types::performatives::Performative;
use limonite_amqp::types::sasl::SaslFrameBody;

pub const AMQP_HEADER: [u8; 8] = [b'A', b'M', b'Q', b'P', 0x00, 0x01, 0x00, 0x00];
pub const SASL_HEADER: [u8; 8] = [b'A', b'M', b'Q', b'P', 0x03, 0x01, 0x00, 0x00];

/// One frame as seen by the scripted peer.
#[derive(Debug)]
pub struct PeerFrame {
    pub frame_type: u8,
    pub channel: u16,
    /// None for an empty (heartbeat) frame
    pub performative: Option<Performative>,
    /// Transfer payload bytes following the performative
    pub payload: Bytes,
}

pub struct TestPeer {
    stream: DuplexStream,
}

impl TestPeer {
    /// An in-memory stream pair: the client side and the scripted peer.
    pub fn pair() -> (DuplexStream, TestPeer) {
        let (client, server) = tokio::io::duplex(256 * 1024);
        (client, TestPeer { stream: server })
    }

    pub async fn expect_header(&mut self, expected: [u8; 8]) {
        let mut header = [0u8; 8];
        self.stream.read_exact(&mut header).await.unwrap();
        assert_eq!(header, expected, "unexpected protocol header");
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    async fn send_frame(&mut self, frame_type: u8, channel: u16, body: &[u8]) {
        let mut frame = BytesMut::with_capacity(body.len() + 8);
        frame.put_u32(body.len() as u32 + 8);
        frame.put_u8(2); // doff
        frame.put_u8(frame_type);
        frame.put_u16(channel);
        frame.put_slice(body);
        self.send_raw(&frame).await;
    }

    pub async fn send_performative(&mut self, channel: u16, performative: &impl Encode) {
        let body = to_vec(performative);
        self.send_frame(0x00, channel, &body).await;
    }

    pub async fn send_performative_with_payload(
        &mut self,
        channel: u16,
        performative: &impl Encode,
        payload: &[u8],
    ) {
        let mut body = to_vec(performative);
        body.extend_from_slice(payload);
        self.send_frame(0x00, channel, &body).await;
    }

    pub async fn send_empty_frame(&mut self) {
        self.send_frame(0x00, 0, &[]).await;
    }

    pub async fn send_sasl(&mut self, body: &SaslFrameBody) {
        let body = to_vec(body);
        self.send_frame(0x01, 0, &body).await;
    }

    async fn read_raw_frame(&mut self) -> (u8, u16, Bytes) {
        let mut size = [0u8; 4];
        self.stream.read_exact(&mut size).await.unwrap();
        let size = u32::from_be_bytes(size) as usize;
        assert!(size >= 8, "frame size below the protocol minimum");

        let mut rest = vec![0u8; size - 4];
        self.stream.read_exact(&mut rest).await.unwrap();
        let mut rest = Bytes::from(rest);
        let doff = rest.get_u8();
        assert_eq!(doff, 2);
        let frame_type = rest.get_u8();
        let channel = rest.get_u16();
        (frame_type, channel, rest)
    }

    /// Reads one AMQP frame, decoding its performative.
    pub async fn read_frame(&mut self) -> PeerFrame {
        let (frame_type, channel, mut body) = self.read_raw_frame().await;
        if body.is_empty() {
            return PeerFrame {
                frame_type,
                channel,
                performative: None,
                payload: Bytes::new(),
            };
        }
        let (performative, consumed) = from_slice::<Performative>(&body).unwrap();
        body.advance(consumed);
        PeerFrame {
            frame_type,
            channel,
            performative: Some(performative),
            payload: body,
        }
    }

    /// Reads AMQP frames until a non-empty one arrives.
    pub async fn read_non_empty_frame(&mut self) -> PeerFrame {
        loop {
            let frame = self.read_frame().await;
            if frame.performative.is_some() {
                return frame;
            }
        }
    }

    /// Reads one SASL frame.
    pub async fn read_sasl(&mut self) -> SaslFrameBody {
        let (frame_type, _channel, body) = self.read_raw_frame().await;
        assert_eq!(frame_type, 0x01, "expected a SASL frame");
        let (body, _) = from_slice::<SaslFrameBody>(&body).unwrap();
        body
    }
}

/// A peer open with sensible defaults.
pub fn peer_open(container_id: &str) -> limonite_amqp::types::performatives::Open {
    limonite_amqp::types::performatives::Open {
        container_id: container_id.to_string(),
        ..Default::default()
    }
}

/// A peer begin answering the client's begin on `remote_channel`.
pub fn peer_begin(remote_channel: u16) -> limonite_amqp::types::performatives::Begin {
    limonite_amqp::types::performatives::Begin {
        remote_channel: Some(remote_channel),
        next_outgoing_id: 0,
        incoming_window: 5000,
        outgoing_window: 5000,
        ..Default::default()
    }
}
