//! Requests exchanged between link handles and their session engine

use limonite_amqp_types::definitions::{
    DeliveryTag, Fields, Handle, MessageFormat, ReceiverSettleMode, Role, SenderSettleMode,
    SequenceNo,
};
use limonite_amqp_types::messaging::{DeliveryState, Source, Target};
use limonite_amqp_types::primitives::Symbol;
use tokio::sync::{mpsc, oneshot};

use crate::Payload;

use super::delivery::Delivery;
use super::error::{AttachError, RecvError, SendError};

/// How a receiver link manages its credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditMode {
    /// The session tops the credit back up once it falls below half of the
    /// configured amount
    Auto,
    /// Credit only moves when the application asks for it
    Manual,
}

/// Buffered deliveries flowing from the session engine to a receiver.
pub(crate) type DeliverySender = mpsc::Sender<Result<Delivery, RecvError>>;
pub(crate) type DeliveryReceiver = mpsc::Receiver<Result<Delivery, RecvError>>;

/// Everything the session needs to attach a link.
#[derive(Debug)]
pub(crate) struct AttachRequest {
    pub name: String,
    pub role: Role,
    pub snd_settle_mode: SenderSettleMode,
    pub rcv_settle_mode: ReceiverSettleMode,
    pub source: Option<Source>,
    pub target: Option<Target>,
    pub initial_delivery_count: SequenceNo,
    pub max_message_size: Option<u64>,
    pub offered_capabilities: Option<Vec<Symbol>>,
    pub desired_capabilities: Option<Vec<Symbol>>,
    pub properties: Option<Fields>,

    /// Receiver only: where assembled deliveries go
    pub buffer: Option<DeliverySender>,
    /// Receiver only: credit to grant right after the attach completes
    pub credit: u32,
    pub credit_mode: CreditMode,
}

/// What the session reports back once the peer's attach arrived.
#[derive(Debug)]
pub(crate) struct LinkAttached {
    pub handle: Handle,
    pub snd_settle_mode: SenderSettleMode,
    pub rcv_settle_mode: ReceiverSettleMode,
    pub remote_source: Option<Source>,
    pub remote_target: Option<Target>,
    pub remote_max_message_size: Option<u64>,
}

pub(crate) type AttachResponder = oneshot::Sender<Result<LinkAttached, AttachError>>;

/// A single send, already serialized.
#[derive(Debug)]
pub(crate) struct TransferRequest {
    pub handle: Handle,
    pub payload: Payload,
    pub delivery_tag: DeliveryTag,
    pub message_format: MessageFormat,
    /// Pre-settle override from the caller; the link's settle mode wins
    /// when it is not `Mixed`
    pub settled: bool,
    pub responder: oneshot::Sender<Result<Settlement, SendError>>,
}

/// How a sent delivery concludes.
#[derive(Debug)]
pub(crate) enum Settlement {
    /// Sent pre-settled; there is nothing to wait for
    Settled,
    /// Unsettled; the receiver resolves with the terminal delivery state
    Pending(oneshot::Receiver<Result<DeliveryState, SendError>>),
}
