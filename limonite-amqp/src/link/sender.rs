//! The sending half of message transfer

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{error::Elapsed, timeout};

use limonite_amqp_types::codec::to_vec;
use limonite_amqp_types::definitions::{self, Handle, SenderSettleMode};
use limonite_amqp_types::messaging::{Address, DeliveryState, Target};

use crate::control::SessionControl;
use crate::session::{self, SessionHandle};

use super::builder::Builder;
use super::delivery::{check_tag, Sendable, TagSource};
use super::error::{DetachError, SendError};
use super::frame::{LinkAttached, Settlement, TransferRequest};
use super::role;

/// A sender link.
///
/// ```rust,ignore
/// let mut sender = Sender::attach(&mut session, "sender-1", "q1").await?;
/// sender.send("hello AMQP").await?;
/// sender.close().await?;
/// ```
///
/// `send` resolves once the receiver reports a terminal delivery state;
/// anything but `Accepted` surfaces as a [`SendError`].
pub struct Sender {
    control: mpsc::Sender<SessionControl>,
    name: String,
    handle: Handle,
    snd_settle_mode: SenderSettleMode,
    remote_target: Option<Target>,
    remote_max_message_size: Option<u64>,
    tag_source: Box<dyn TagSource>,
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .finish()
    }
}

impl Sender {
    pub fn builder() -> Builder<role::Sender> {
        Builder::<role::Sender>::new()
    }

    /// Attaches a sender with default configuration.
    pub async fn attach(
        session: &mut SessionHandle,
        name: impl Into<String>,
        addr: impl Into<Address>,
    ) -> Result<Sender, super::AttachError> {
        Self::builder()
            .name(name)
            .target(Target::with_address(addr))
            .attach(session)
            .await
    }

    pub(crate) fn new(
        control: mpsc::Sender<SessionControl>,
        name: String,
        attached: LinkAttached,
        tag_source: Box<dyn TagSource>,
    ) -> Self {
        Self {
            control,
            name,
            handle: attached.handle,
            snd_settle_mode: attached.snd_settle_mode,
            remote_target: attached.remote_target,
            remote_max_message_size: attached.remote_max_message_size,
            tag_source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The target the peer confirmed in its attach.
    pub fn target(&self) -> Option<&Target> {
        self.remote_target.as_ref()
    }

    /// Sends a message and waits for its settlement.
    ///
    /// With the link in settled mode the call returns as soon as the
    /// transfer frames are queued; otherwise it resolves with the
    /// receiver's terminal state.
    pub async fn send(&mut self, sendable: impl Into<Sendable>) -> Result<(), SendError> {
        let Sendable {
            message,
            message_format,
            settled,
        } = sendable.into();

        let payload = Bytes::from(to_vec(&message));
        if let Some(max) = self.remote_max_message_size {
            if max > 0 && payload.len() as u64 > max {
                return Err(SendError::MessageSizeExceeded);
            }
        }

        let delivery_tag = self.tag_source.next_tag();
        if !check_tag(&delivery_tag) {
            return Err(SendError::InvalidDeliveryTag);
        }

        let settled = match self.snd_settle_mode {
            SenderSettleMode::Settled => true,
            SenderSettleMode::Unsettled => false,
            SenderSettleMode::Mixed => settled.unwrap_or(false),
        };

        let (responder, settlement_rx) = oneshot::channel();
        self.control
            .send(SessionControl::Transfer(TransferRequest {
                handle: self.handle,
                payload,
                delivery_tag,
                message_format,
                settled,
                responder,
            }))
            .await
            .map_err(|_| SendError::Session(session::Error::Ended))?;

        let settlement = settlement_rx
            .await
            .map_err(|_| SendError::Session(session::Error::Ended))??;

        match settlement {
            Settlement::Settled => Ok(()),
            Settlement::Pending(outcome) => {
                let state = outcome
                    .await
                    .map_err(|_| SendError::Session(session::Error::Ended))??;
                match state {
                    DeliveryState::Accepted(_) => Ok(()),
                    DeliveryState::Rejected(rejected) => Err(SendError::Rejected {
                        error: rejected.error,
                    }),
                    DeliveryState::Released(_) => Err(SendError::Released),
                    DeliveryState::Modified(modified) => Err(SendError::Modified {
                        delivery_failed: modified.delivery_failed,
                        undeliverable_here: modified.undeliverable_here,
                        message_annotations: modified.message_annotations,
                    }),
                    // settling on a non-terminal state never happens with a
                    // conforming peer
                    DeliveryState::Received(_) => Err(SendError::IllegalState),
                }
            }
        }
    }

    /// [`send`](Self::send) bounded by a deadline.
    ///
    /// A timeout abandons the wait, not the delivery: frames already
    /// queued stay on the wire and the late settlement is discarded.
    pub async fn send_with_timeout(
        &mut self,
        sendable: impl Into<Sendable>,
        duration: Duration,
    ) -> Result<Result<(), SendError>, Elapsed> {
        timeout(duration, self.send(sendable)).await
    }

    /// Detaches without closing; the link can be resumed by name later.
    pub async fn detach(self) -> Result<(), DetachError> {
        self.detach_inner(false, None).await
    }

    /// Closes the link, freeing its name.
    pub async fn close(self) -> Result<(), DetachError> {
        self.detach_inner(true, None).await
    }

    /// Closes the link with an error.
    pub async fn close_with_error(
        self,
        error: definitions::Error,
    ) -> Result<(), DetachError> {
        self.detach_inner(true, Some(error)).await
    }

    async fn detach_inner(
        self,
        closed: bool,
        error: Option<definitions::Error>,
    ) -> Result<(), DetachError> {
        let (responder, rx) = oneshot::channel();
        self.control
            .send(SessionControl::DetachLink {
                handle: self.handle,
                closed,
                error,
                responder,
            })
            .await
            .map_err(|_| DetachError::IllegalSessionState)?;
        rx.await.map_err(|_| DetachError::IllegalSessionState)?
    }
}
