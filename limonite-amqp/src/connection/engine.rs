//! The connection engine task: sole owner of the socket.
//!
//! One `select!` loop serializes everything that touches the transport:
//! inbound frames (dispatched to sessions by channel), outbound frames from
//! all sessions, control requests from the handle, and heartbeat ticks.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use limonite_amqp_types::definitions::{self, AmqpError};
use limonite_amqp_types::performatives::Close;

use crate::control::ConnectionControl;
use crate::frames::amqp::{Frame, FrameBody};
use crate::session::frame::{SessionFrame, SessionFrameBody};
use crate::transport::Transport;
use crate::util::Running;

use super::heartbeat::HeartBeat;
use super::{Connection, ConnectionState, Error, OpenError};

use tokio::sync::mpsc;

pub(crate) struct ConnectionEngine<Io> {
    transport: Transport<Io>,
    connection: Connection,
    control: mpsc::Receiver<ConnectionControl>,
    outgoing: mpsc::Receiver<SessionFrame>,
    heartbeat: HeartBeat,
    control_done: bool,
    outgoing_done: bool,
    remote_close_error: Option<definitions::Error>,
}

impl<Io> ConnectionEngine<Io>
where
    Io: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Sends the open and waits for the answering open; the engine loop
    /// only starts on a fully opened connection.
    pub async fn open(
        mut transport: Transport<Io>,
        mut connection: Connection,
        control: mpsc::Receiver<ConnectionControl>,
        outgoing: mpsc::Receiver<SessionFrame>,
    ) -> Result<Self, OpenError> {
        let open = connection.local_open().clone();
        transport
            .send(Frame::new(0u16, FrameBody::Open(open)))
            .await?;
        connection.set_state(ConnectionState::OpenSent);

        let heartbeat = loop {
            let frame = match transport.next().await {
                Some(frame) => frame?,
                None => {
                    return Err(OpenError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed during open",
                    )))
                }
            };
            match frame.body {
                FrameBody::Open(open) => {
                    let remote_idle = open.idle_time_out;
                    connection
                        .on_incoming_open(open)
                        .map_err(OpenError::Transport)?;
                    // heartbeats go out at half the peer's timeout
                    break match remote_idle.filter(|millis| *millis > 0) {
                        Some(millis) => {
                            HeartBeat::new(Duration::from_millis((millis / 2).max(1) as u64))
                        }
                        None => HeartBeat::never(),
                    };
                }
                FrameBody::Close(close) => {
                    return Err(OpenError::RemoteClosedDuringOpen { error: close.error })
                }
                FrameBody::Empty => continue,
                other => {
                    debug!(?other, "ignoring frame before open");
                    continue;
                }
            }
        };

        Ok(Self {
            transport,
            connection,
            control,
            outgoing,
            heartbeat,
            control_done: false,
            outgoing_done: false,
            remote_close_error: None,
        })
    }

    pub fn agreed_max_frame_size(&self) -> u32 {
        self.connection.agreed_max_frame_size
    }

    pub fn agreed_channel_max(&self) -> u16 {
        self.connection.agreed_channel_max
    }

    pub fn remote_open(&self) -> Option<&limonite_amqp_types::performatives::Open> {
        self.connection.remote_open.as_ref()
    }

    pub fn spawn(self) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(self.event_loop())
    }

    async fn forward_to_session(&mut self, channel: u16, frame: SessionFrame) {
        match self.connection.session_tx_by_remote_channel(channel) {
            Some(tx) => {
                if tx.send(Ok(frame)).await.is_err() {
                    debug!(channel, "session inbox closed; frame dropped");
                }
            }
            // a frame on an unknown channel is never fatal
            None => warn!(channel, "ignoring frame on unknown channel"),
        }
    }

    async fn on_incoming(&mut self, frame: Frame) -> Result<Running, Error> {
        let Frame { channel, body } = frame;

        match body {
            FrameBody::Open(_) => {
                warn!("duplicate open ignored");
            }
            FrameBody::Begin(begin) => match begin.remote_channel {
                Some(local) => {
                    if self.connection.map_remote_channel(local, channel) {
                        let frame =
                            SessionFrame::new(channel, SessionFrameBody::Begin(begin));
                        self.forward_to_session(channel, frame).await;
                    }
                }
                None => warn!("peer-initiated session is not supported; begin ignored"),
            },
            FrameBody::Attach(attach) => {
                let frame = SessionFrame::new(channel, SessionFrameBody::Attach(attach));
                self.forward_to_session(channel, frame).await;
            }
            FrameBody::Flow(flow) => {
                let frame = SessionFrame::new(channel, SessionFrameBody::Flow(flow));
                self.forward_to_session(channel, frame).await;
            }
            FrameBody::Transfer {
                performative,
                payload,
            } => {
                let frame = SessionFrame::new(
                    channel,
                    SessionFrameBody::Transfer {
                        performative,
                        payload,
                    },
                );
                self.forward_to_session(channel, frame).await;
            }
            FrameBody::Disposition(disposition) => {
                let frame =
                    SessionFrame::new(channel, SessionFrameBody::Disposition(disposition));
                self.forward_to_session(channel, frame).await;
            }
            FrameBody::Detach(detach) => {
                let frame = SessionFrame::new(channel, SessionFrameBody::Detach(detach));
                self.forward_to_session(channel, frame).await;
            }
            FrameBody::End(end) => {
                // end on an unknown channel is silently ignored
                if self
                    .connection
                    .session_tx_by_remote_channel(channel)
                    .is_some()
                {
                    let frame = SessionFrame::new(channel, SessionFrameBody::End(end));
                    self.forward_to_session(channel, frame).await;
                } else {
                    debug!(channel, "end on unknown channel ignored");
                }
            }
            FrameBody::Close(close) => {
                self.remote_close_error = close.error;
                if self.connection.state() != ConnectionState::CloseSent {
                    // remote-initiated close; answer it
                    let frame = Frame::new(0u16, FrameBody::Close(Close { error: None }));
                    if let Err(err) = self.transport.send(frame).await {
                        debug!(%err, "failed to answer close");
                    }
                }
                self.connection.set_state(ConnectionState::End);
            }
            FrameBody::Empty => trace!("heartbeat received"),
        }

        match self.connection.state() {
            ConnectionState::End => Ok(Running::Stop),
            _ => Ok(Running::Continue),
        }
    }

    async fn on_control(&mut self, control: ConnectionControl) -> Result<Running, Error> {
        match control {
            ConnectionControl::Close(error) => match self.connection.state() {
                ConnectionState::Opened => {
                    let frame = Frame::new(0u16, FrameBody::Close(Close { error }));
                    self.transport.send(frame).await?;
                    self.connection.set_state(ConnectionState::CloseSent);
                }
                ConnectionState::CloseSent | ConnectionState::End => {}
                _ => return Err(Error::IllegalState),
            },
            ConnectionControl::AllocateSession { tx, responder } => {
                let result = self.connection.allocate_session(tx);
                let _ = responder.send(result);
            }
            ConnectionControl::DeallocateSession(channel) => {
                self.connection.deallocate_session(channel);
            }
        }

        match self.connection.state() {
            ConnectionState::End => Ok(Running::Stop),
            _ => Ok(Running::Continue),
        }
    }

    async fn on_outgoing(&mut self, frame: SessionFrame) -> Result<Running, Error> {
        match self.connection.state() {
            ConnectionState::Opened => {}
            // frames racing a close are dropped
            _ => return Ok(Running::Continue),
        }

        let SessionFrame { channel, body } = frame;
        let body = match body {
            SessionFrameBody::Begin(begin) => FrameBody::Begin(begin),
            SessionFrameBody::Attach(attach) => FrameBody::Attach(attach),
            SessionFrameBody::Flow(flow) => FrameBody::Flow(flow),
            SessionFrameBody::Transfer {
                performative,
                payload,
            } => FrameBody::Transfer {
                performative,
                payload,
            },
            SessionFrameBody::Disposition(disposition) => FrameBody::Disposition(disposition),
            SessionFrameBody::Detach(detach) => FrameBody::Detach(detach),
            SessionFrameBody::End(end) => FrameBody::End(end),
        };
        self.transport.send(Frame::new(channel, body)).await?;
        Ok(Running::Continue)
    }

    async fn on_heartbeat(&mut self) -> Result<Running, Error> {
        match self.connection.state() {
            ConnectionState::Opened => {
                self.transport.send(Frame::empty()).await?;
                trace!("heartbeat sent");
            }
            ConnectionState::End => return Ok(Running::Stop),
            _ => {}
        }
        Ok(Running::Continue)
    }

    async fn event_loop(mut self) -> Result<(), Error> {
        let result = loop {
            let step = tokio::select! {
                _ = self.heartbeat.next() => self.on_heartbeat().await,
                control = self.control.recv(), if !self.control_done => match control {
                    Some(control) => self.on_control(control).await,
                    None => {
                        // the handle is gone; close gracefully
                        self.control_done = true;
                        self.on_control(ConnectionControl::Close(None)).await
                    }
                },
                frame = self.outgoing.recv(), if !self.outgoing_done => match frame {
                    Some(frame) => self.on_outgoing(frame).await,
                    None => {
                        self.outgoing_done = true;
                        Ok(Running::Continue)
                    }
                },
                incoming = self.transport.next() => match incoming {
                    Some(Ok(frame)) => self.on_incoming(frame).await,
                    Some(Err(err)) => Err(self.on_transport_error(err).await),
                    None => Err(Error::Io(std::sync::Arc::new(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed by peer without close",
                    )))),
                },
            };

            match step {
                Ok(Running::Continue) => {}
                Ok(Running::Stop) => {
                    break match self.remote_close_error.take() {
                        Some(error) => Err(Error::RemoteClosed { error: Some(error) }),
                        None => Ok(()),
                    };
                }
                Err(err) => break Err(err),
            }
        };

        // every session learns how the connection went away
        let notify = match &result {
            Ok(()) => Error::IllegalState,
            Err(err) => err.clone(),
        };
        self.connection.notify_sessions(notify);
        result
    }

    /// Converts a transport failure, answering malformed input with a
    /// close frame that names the condition.
    async fn on_transport_error(&mut self, err: crate::frames::Error) -> Error {
        let err = Error::from(err);
        let condition: Option<definitions::ErrorCondition> = match &err {
            Error::Decode(_) => Some(AmqpError::DecodeError.into()),
            Error::FramingError | Error::MaxFrameSizeExceeded => {
                Some(definitions::ConnectionError::FramingError.into())
            }
            _ => None,
        };
        if let Some(condition) = condition {
            let close = Close {
                error: Some(definitions::Error::new(
                    condition,
                    Some(err.to_string()),
                )),
            };
            let frame = Frame::new(0u16, FrameBody::Close(close));
            if let Err(send_err) = self.transport.send(frame).await {
                debug!(%send_err, "failed to send close after decode error");
            }
        }
        err
    }
}
