//! Control messages from user handles into the engines

use limonite_amqp_types::definitions::{self, DeliveryNumber, Handle};
use limonite_amqp_types::messaging::DeliveryState;
use tokio::sync::{mpsc, oneshot};

use crate::connection;
use crate::link::error::{DetachError, DispositionError, FlowError};
use crate::link::frame::{AttachRequest, AttachResponder, TransferRequest};
use crate::session::frame::SessionIncomingItem;

pub(crate) enum ConnectionControl {
    /// Initiate the close handshake, optionally carrying an error
    Close(Option<definitions::Error>),

    /// Reserve the lowest free outgoing channel for a new session
    AllocateSession {
        tx: mpsc::Sender<SessionIncomingItem>,
        responder: oneshot::Sender<Result<SessionAllocation, connection::Error>>,
    },

    /// Release a channel once the end handshake completed
    DeallocateSession(u16),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionAllocation {
    pub channel: u16,
    /// The negotiated max-frame-size, for outgoing transfer chunking
    pub max_frame_size: u32,
}

pub(crate) enum SessionControl {
    /// Initiate the end handshake, optionally carrying an error
    End(Option<definitions::Error>),

    /// Attach a new link and wait for the peer's answering attach
    AttachLink {
        request: AttachRequest,
        responder: AttachResponder,
    },

    /// Detach a link; `closed` frees the name for reattachment
    DetachLink {
        handle: Handle,
        closed: bool,
        error: Option<definitions::Error>,
        responder: oneshot::Sender<Result<(), DetachError>>,
    },

    /// Send one delivery on a sender link
    Transfer(TransferRequest),

    /// Report delivery state for a contiguous range of received deliveries.
    /// With `settled` false (receiver settle mode second) the responder is
    /// held until the peer settles.
    Disposition {
        first: DeliveryNumber,
        last: DeliveryNumber,
        state: DeliveryState,
        settled: bool,
        responder: oneshot::Sender<Result<(), DispositionError>>,
    },

    /// Receiver credit management
    Flow {
        handle: Handle,
        credit: u32,
        drain: bool,
        responder: oneshot::Sender<Result<(), FlowError>>,
    },
}
