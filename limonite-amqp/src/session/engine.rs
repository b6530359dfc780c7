//! The session engine task: serializes inbound dispatch and link requests

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::control::{ConnectionControl, SessionControl};
use crate::util::Running;

use super::frame::{SessionFrame, SessionFrameBody, SessionIncomingItem};
use super::{Error, Session};

pub(crate) struct SessionEngine {
    conn_control: mpsc::Sender<ConnectionControl>,
    session: Session,
    control: mpsc::Receiver<SessionControl>,
    incoming: mpsc::Receiver<SessionIncomingItem>,
    outgoing: mpsc::Sender<SessionFrame>,
    control_done: bool,
}

impl SessionEngine {
    /// Sends the begin and waits for the answering begin before the engine
    /// loop starts.
    pub async fn begin(
        conn_control: mpsc::Sender<ConnectionControl>,
        mut session: Session,
        control: mpsc::Receiver<SessionControl>,
        mut incoming: mpsc::Receiver<SessionIncomingItem>,
        outgoing: mpsc::Sender<SessionFrame>,
    ) -> Result<Self, Error> {
        session.send_begin(&outgoing).await?;

        let frame = match incoming.recv().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => return Err(Error::Connection(err)),
            None => return Err(Error::Ended),
        };
        match frame.body {
            SessionFrameBody::Begin(begin) => {
                session.on_incoming_begin(begin)?;
            }
            _ => return Err(Error::IllegalState),
        }

        Ok(Self {
            conn_control,
            session,
            control,
            incoming,
            outgoing,
            control_done: false,
        })
    }

    pub fn spawn(self) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(self.event_loop())
    }

    async fn on_incoming(&mut self, item: SessionIncomingItem) -> Result<Running, Error> {
        let frame = match item {
            Ok(frame) => frame,
            Err(err) => {
                // the connection died underneath us
                self.session.fail_everything(Error::Connection(err.clone()));
                return Err(Error::Connection(err));
            }
        };

        match frame.body {
            SessionFrameBody::Begin(_) => {
                debug!("duplicate begin ignored");
            }
            SessionFrameBody::Attach(attach) => {
                self.session.on_incoming_attach(&self.outgoing, attach).await;
            }
            SessionFrameBody::Flow(flow) => {
                self.session.on_incoming_flow(&self.outgoing, flow).await?;
            }
            SessionFrameBody::Transfer {
                performative,
                payload,
            } => {
                self.session
                    .on_incoming_transfer(&self.outgoing, performative, payload)
                    .await;
            }
            SessionFrameBody::Disposition(disposition) => {
                self.session
                    .on_incoming_disposition(&self.outgoing, disposition)
                    .await;
            }
            SessionFrameBody::Detach(detach) => {
                self.session.on_incoming_detach(&self.outgoing, detach).await;
            }
            SessionFrameBody::End(end) => {
                self.session.on_incoming_end(&self.outgoing, end).await;
            }
        }

        match self.session.is_unmapped() {
            true => Ok(Running::Stop),
            false => Ok(Running::Continue),
        }
    }

    async fn on_control(&mut self, control: SessionControl) -> Result<Running, Error> {
        match control {
            SessionControl::End(error) => {
                self.session.send_end(&self.outgoing, error).await;
            }
            SessionControl::AttachLink { request, responder } => {
                self.session
                    .attach_link(&self.outgoing, request, responder)
                    .await;
            }
            SessionControl::DetachLink {
                handle,
                closed,
                error,
                responder,
            } => {
                self.session
                    .detach_link(&self.outgoing, handle, closed, error, responder)
                    .await;
            }
            SessionControl::Transfer(request) => {
                self.session.transfer(&self.outgoing, request).await;
            }
            SessionControl::Disposition {
                first,
                last,
                state,
                settled,
                responder,
            } => {
                self.session
                    .disposition(&self.outgoing, first, last, state, settled, responder)
                    .await;
            }
            SessionControl::Flow {
                handle,
                credit,
                drain,
                responder,
            } => {
                self.session
                    .link_credit_control(&self.outgoing, handle, credit, drain, responder)
                    .await;
            }
        }

        match self.session.is_unmapped() {
            true => Ok(Running::Stop),
            false => Ok(Running::Continue),
        }
    }

    async fn event_loop(mut self) -> Result<(), Error> {
        let result = loop {
            let step = tokio::select! {
                item = self.incoming.recv() => match item {
                    Some(item) => self.on_incoming(item).await,
                    None => {
                        // connection engine went away without a word
                        self.session.fail_everything(Error::Connection(
                            crate::connection::Error::IllegalState,
                        ));
                        break Err(Error::Connection(crate::connection::Error::IllegalState));
                    }
                },
                control = self.control.recv(), if !self.control_done => match control {
                    Some(control) => self.on_control(control).await,
                    None => {
                        // every handle is gone; wind the session down
                        self.control_done = true;
                        self.session.send_end(&self.outgoing, None).await;
                        Ok(Running::Continue)
                    }
                },
            };

            match step {
                Ok(Running::Continue) => {}
                Ok(Running::Stop) => break self.session.end_result(),
                Err(err) => break Err(err),
            }
        };

        // free the channel; a dead connection engine simply ignores this
        let channel = self.session.outgoing_channel();
        let _ = self
            .conn_control
            .send(ConnectionControl::DeallocateSession(channel))
            .await;
        result
    }
}
