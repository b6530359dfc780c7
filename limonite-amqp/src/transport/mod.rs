//! Low-level framing over a byte stream.
//!
//! Layer 0 is `tokio_util`'s length-delimited codec over the raw stream;
//! layer 1 is [`frames::amqp::FrameCodec`] turning each length-delimited
//! chunk into a performative frame. [`Transport`] stacks the two, tracks
//! inbound idle time, and exposes the result as a `Stream` + `Sink` of
//! frames.

pub mod protocol_header;

use std::task::Poll;
use std::time::Duration;

use std::future::Future;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::{Sink, Stream};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{
    Decoder, Encoder, Framed, FramedParts, LengthDelimitedCodec, LengthDelimitedCodecError,
};

use limonite_amqp_types::definitions::MIN_MAX_FRAME_SIZE;
use limonite_amqp_types::sasl::{SaslCode, SaslFrameBody};

use crate::frames::{amqp, sasl, Error, FRAME_HEADER_SIZE};
use crate::sasl_profile::{self, Negotiation, SaslProfile};
use crate::util::IdleTimeout;

use protocol_header::ProtocolHeader;

/// Failure of the 8-byte protocol header exchange.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("the peer answered with an unexpected protocol header: {0:02x?}")]
    HeaderMismatch([u8; 8]),
}

fn length_codec(max_frame_size: usize) -> LengthDelimitedCodec {
    // the 4-byte size field counts itself, hence the -4 adjustment
    LengthDelimitedCodec::builder()
        .big_endian()
        .length_field_length(4)
        .length_adjustment(-4)
        .max_frame_length(max_frame_size)
        .new_codec()
}

pin_project! {
    /// Framed AMQP transport over any ordered byte stream.
    pub struct Transport<Io> {
        #[pin]
        framed: Framed<Io, LengthDelimitedCodec>,
        idle_timeout: Option<IdleTimeout>,
    }
}

impl<Io> Transport<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    /// Binds the transport over `io`, seeding the read buffer with bytes
    /// already pulled off the wire (e.g. pipelined by the peer during the
    /// SASL exchange).
    pub fn bind(
        io: Io,
        leftover: BytesMut,
        max_frame_size: usize,
        idle_timeout: Option<Duration>,
    ) -> Self {
        let mut parts = FramedParts::new::<Bytes>(io, length_codec(max_frame_size));
        parts.read_buf = leftover;
        let framed = Framed::from_parts(parts);
        let idle_timeout = idle_timeout
            .filter(|duration| !duration.is_zero())
            .map(IdleTimeout::new);
        Self {
            framed,
            idle_timeout,
        }
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) -> &mut Self {
        self.framed.codec_mut().set_max_frame_length(max_frame_size);
        self
    }

    /// Exchanges protocol headers and returns the peer's.
    ///
    /// The header the peer sends back must match ours exactly; a different
    /// protocol id or version is fatal at this layer.
    pub async fn negotiate(
        io: &mut Io,
        proposed: ProtocolHeader,
    ) -> Result<ProtocolHeader, NegotiationError> {
        let outgoing: [u8; 8] = proposed.into();
        io.write_all(&outgoing).await?;
        io.flush().await?;

        let mut incoming = [0u8; 8];
        io.read_exact(&mut incoming).await?;
        match ProtocolHeader::try_from(incoming) {
            Ok(header) if header == proposed => Ok(header),
            _ => Err(NegotiationError::HeaderMismatch(incoming)),
        }
    }

    /// Runs the SASL sub-protocol to completion.
    ///
    /// Returns bytes read past the outcome frame, to seed the AMQP
    /// transport that follows.
    pub async fn connect_sasl(
        io: &mut Io,
        hostname: Option<&str>,
        profile: &mut SaslProfile,
    ) -> Result<BytesMut, sasl_profile::Error> {
        let outgoing: [u8; 8] = ProtocolHeader::sasl().into();
        io.write_all(&outgoing).await?;
        io.flush().await?;

        let mut incoming = [0u8; 8];
        io.read_exact(&mut incoming).await?;
        if ProtocolHeader::try_from(incoming) != Ok(ProtocolHeader::sasl()) {
            return Err(sasl_profile::Error::HeaderMismatch(incoming));
        }

        let mut buf = BytesMut::new();
        loop {
            let frame = read_sasl_frame(io, &mut buf).await?;
            match profile.on_frame(frame.body, hostname)? {
                Negotiation::Init(init) => {
                    write_sasl_frame(io, SaslFrameBody::Init(init)).await?;
                }
                Negotiation::Response(response) => {
                    write_sasl_frame(io, SaslFrameBody::Response(response)).await?;
                }
                Negotiation::Outcome(outcome) => match outcome.code {
                    SaslCode::Ok => return Ok(buf),
                    code => {
                        return Err(sasl_profile::Error::NotOk {
                            code,
                            additional_data: outcome.additional_data,
                        })
                    }
                },
            }
        }
    }
}

/// Reads one length-prefixed SASL frame, buffering in `buf`.
async fn read_sasl_frame<Io>(
    io: &mut Io,
    buf: &mut BytesMut,
) -> Result<sasl::Frame, sasl_profile::Error>
where
    Io: AsyncRead + Unpin,
{
    while buf.len() < 4 {
        if io.read_buf(buf).await? == 0 {
            return Err(sasl_profile::Error::UnexpectedEof);
        }
    }
    let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    // prior to any negotiation the frame size limit is MIN-MAX-FRAME-SIZE
    if size < FRAME_HEADER_SIZE || size > MIN_MAX_FRAME_SIZE as usize {
        return Err(sasl_profile::Error::FramingError);
    }
    while buf.len() < size {
        if io.read_buf(buf).await? == 0 {
            return Err(sasl_profile::Error::UnexpectedEof);
        }
    }
    let mut frame = buf.split_to(size);
    frame.advance(4); // size prefix
    let frame = sasl::FrameCodec {}
        .decode(&mut frame)?
        .ok_or(sasl_profile::Error::FramingError)?;
    Ok(frame)
}

async fn write_sasl_frame<Io>(io: &mut Io, body: SaslFrameBody) -> Result<(), sasl_profile::Error>
where
    Io: AsyncWrite + Unpin,
{
    let mut payload = BytesMut::new();
    sasl::FrameCodec {}.encode(sasl::Frame::new(body), &mut payload)?;

    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32(payload.len() as u32 + 4);
    frame.put(payload);
    io.write_all(&frame).await?;
    io.flush().await?;
    Ok(())
}

impl<Io> Sink<amqp::Frame> for Transport<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    type Error = Error;

    fn poll_ready(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.project().framed.poll_ready(cx).map_err(Into::into)
    }

    fn start_send(self: std::pin::Pin<&mut Self>, item: amqp::Frame) -> Result<(), Self::Error> {
        let mut payload = BytesMut::new();
        amqp::FrameCodec {}.encode(item, &mut payload)?;
        self.project()
            .framed
            .start_send(payload.freeze())
            .map_err(Into::into)
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.project().framed.poll_flush(cx).map_err(Into::into)
    }

    fn poll_close(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.project().framed.poll_close(cx).map_err(Into::into)
    }
}

impl<Io> Stream for Transport<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<amqp::Frame, Error>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.framed.poll_next(cx) {
            Poll::Ready(next) => {
                // any inbound traffic counts against idle time
                if let Some(idle) = this.idle_timeout.as_mut() {
                    idle.reset();
                }
                match next {
                    Some(Ok(mut src)) => {
                        Poll::Ready(amqp::FrameCodec {}.decode(&mut src).transpose())
                    }
                    Some(Err(err)) => {
                        let err = if err
                            .get_ref()
                            .map(|inner| inner.is::<LengthDelimitedCodecError>())
                            .unwrap_or(false)
                        {
                            Error::MaxFrameSizeExceeded
                        } else {
                            Error::Io(err)
                        };
                        Poll::Ready(Some(Err(err)))
                    }
                    None => Poll::Ready(None),
                }
            }
            Poll::Pending => {
                if let Some(idle) = this.idle_timeout.as_mut() {
                    if std::pin::Pin::new(idle).poll(cx).is_ready() {
                        return Poll::Ready(Some(Err(Error::IdleTimeout)));
                    }
                }
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use futures_util::{SinkExt, StreamExt};
    use tokio_test::io::Builder;

    use super::protocol_header::ProtocolHeader;
    use super::Transport;
    use crate::frames::amqp::{Frame, FrameBody};

    #[tokio::test]
    async fn header_exchange() {
        let mut mock = Builder::new()
            .write(&[b'A', b'M', b'Q', b'P', 0, 1, 0, 0])
            .read(&[b'A', b'M', b'Q', b'P', 0, 1, 0, 0])
            .build();
        Transport::negotiate(&mut mock, ProtocolHeader::amqp())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn header_mismatch_is_fatal() {
        let mut mock = Builder::new()
            .write(&[b'A', b'M', b'Q', b'P', 0, 1, 0, 0])
            .read(&[b'A', b'M', b'Q', b'P', 3, 1, 0, 0])
            .build();
        let result = Transport::negotiate(&mut mock, ProtocolHeader::amqp()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn empty_frame_on_the_wire() {
        let mock = Builder::new()
            .write(&[0x00, 0x00, 0x00, 0x08, 0x02, 0x00, 0x00, 0x00])
            .build();
        let mut transport = Transport::bind(mock, BytesMut::new(), 512, None);
        transport.send(Frame::empty()).await.unwrap();
    }

    #[tokio::test]
    async fn heartbeat_decodes_from_the_wire() {
        let mock = Builder::new()
            .read(&[0x00, 0x00, 0x00, 0x08, 0x02, 0x00, 0x00, 0x00])
            .build();
        let mut transport = Transport::bind(mock, BytesMut::new(), 512, None);
        let frame = transport.next().await.unwrap().unwrap();
        assert!(matches!(frame.body, FrameBody::Empty));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        // size field claims 1024 bytes against a 512-byte limit
        let mock = Builder::new()
            .read(&[0x00, 0x00, 0x04, 0x00, 0x02, 0x00, 0x00, 0x00])
            .build();
        let mut transport = Transport::bind(mock, BytesMut::new(), 512, None);
        let result = transport.next().await.unwrap();
        assert!(matches!(
            result,
            Err(crate::frames::Error::MaxFrameSizeExceeded)
        ));
    }
}
