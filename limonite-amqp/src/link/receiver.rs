//! The receiving half of message transfer

use tokio::sync::{mpsc, oneshot};

use limonite_amqp_types::definitions::{self, Handle, ReceiverSettleMode};
use limonite_amqp_types::messaging::{
    Accepted, Address, DeliveryState, Modified, Rejected, Released, Source,
};

use crate::control::SessionControl;
use crate::session::SessionHandle;

use super::builder::Builder;
use super::delivery::Delivery;
use super::error::{DetachError, DispositionError, FlowError, RecvError};
use super::frame::{DeliveryReceiver, LinkAttached};
use super::role;

/// A receiver link.
///
/// ```rust,ignore
/// let mut receiver = Receiver::attach(&mut session, "receiver-1", "q1").await?;
/// let delivery = receiver.recv().await?;
/// receiver.accept(&delivery).await?;
/// ```
///
/// Credit is topped up automatically once it falls below half the
/// configured amount; build with
/// [`manual_credit`](Builder::manual_credit) to drive the flow by hand.
pub struct Receiver {
    control: mpsc::Sender<SessionControl>,
    name: String,
    handle: Handle,
    rcv_settle_mode: ReceiverSettleMode,
    remote_source: Option<Source>,
    incoming: DeliveryReceiver,
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .finish()
    }
}

impl Receiver {
    pub fn builder() -> Builder<role::Receiver> {
        Builder::<role::Receiver>::new()
    }

    /// Attaches a receiver with default configuration.
    pub async fn attach(
        session: &mut SessionHandle,
        name: impl Into<String>,
        addr: impl Into<Address>,
    ) -> Result<Receiver, super::AttachError> {
        Self::builder()
            .name(name)
            .source(Source::with_address(addr))
            .attach(session)
            .await
    }

    pub(crate) fn new(
        control: mpsc::Sender<SessionControl>,
        name: String,
        attached: LinkAttached,
        incoming: DeliveryReceiver,
    ) -> Self {
        Self {
            control,
            name,
            handle: attached.handle,
            rcv_settle_mode: attached.rcv_settle_mode,
            remote_source: attached.remote_source,
            incoming,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The source the peer confirmed in its attach.
    pub fn source(&self) -> Option<&Source> {
        self.remote_source.as_ref()
    }

    /// Waits for the next delivery.
    pub async fn recv(&mut self) -> Result<Delivery, RecvError> {
        match self.incoming.recv().await {
            Some(item) => item,
            None => Err(RecvError::Closed),
        }
    }

    /// Accepts a delivery.
    pub async fn accept(&mut self, delivery: &Delivery) -> Result<(), DispositionError> {
        self.disposition(delivery, DeliveryState::Accepted(Accepted {}))
            .await
    }

    /// Rejects a delivery as unprocessable.
    pub async fn reject(
        &mut self,
        delivery: &Delivery,
        error: impl Into<Option<definitions::Error>>,
    ) -> Result<(), DispositionError> {
        self.disposition(
            delivery,
            DeliveryState::Rejected(Rejected {
                error: error.into(),
            }),
        )
        .await
    }

    /// Releases a delivery back to the node.
    pub async fn release(&mut self, delivery: &Delivery) -> Result<(), DispositionError> {
        self.disposition(delivery, DeliveryState::Released(Released {}))
            .await
    }

    /// Modifies a delivery, optionally marking it undeliverable here.
    pub async fn modify(
        &mut self,
        delivery: &Delivery,
        modified: Modified,
    ) -> Result<(), DispositionError> {
        self.disposition(delivery, DeliveryState::Modified(modified))
            .await
    }

    async fn disposition(
        &mut self,
        delivery: &Delivery,
        state: DeliveryState,
    ) -> Result<(), DispositionError> {
        if delivery.is_settled() {
            // the sender settled up front; nothing to report
            return Ok(());
        }
        let settled = self.rcv_settle_mode == ReceiverSettleMode::First;
        let (responder, rx) = oneshot::channel();
        self.control
            .send(SessionControl::Disposition {
                first: delivery.delivery_id,
                last: delivery.delivery_id,
                state,
                settled,
                responder,
            })
            .await
            .map_err(|_| {
                DispositionError::Session(crate::session::Error::Ended)
            })?;
        rx.await
            .map_err(|_| DispositionError::Session(crate::session::Error::Ended))?
    }

    /// Replaces the link credit, allowing the peer that many more
    /// deliveries.
    pub async fn set_credit(&mut self, credit: u32) -> Result<(), FlowError> {
        let (responder, rx) = oneshot::channel();
        self.control
            .send(SessionControl::Flow {
                handle: self.handle,
                credit,
                drain: false,
                responder,
            })
            .await
            .map_err(|_| FlowError::Session(crate::session::Error::Ended))?;
        rx.await
            .map_err(|_| FlowError::Session(crate::session::Error::Ended))?
    }

    /// Asks the peer to use up all outstanding credit; resolves once the
    /// peer reports the credit consumed.
    pub async fn drain(&mut self) -> Result<(), FlowError> {
        let (responder, rx) = oneshot::channel();
        self.control
            .send(SessionControl::Flow {
                handle: self.handle,
                credit: 0,
                drain: true,
                responder,
            })
            .await
            .map_err(|_| FlowError::Session(crate::session::Error::Ended))?;
        rx.await
            .map_err(|_| FlowError::Session(crate::session::Error::Ended))?
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
