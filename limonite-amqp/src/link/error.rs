use limonite_amqp_types::definitions::{self, Fields};

use crate::session;

/// Failure to attach a link.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttachError {
    #[error("session is not in a state that can attach links")]
    IllegalSessionState,

    #[error("link name is already in use on this session")]
    DuplicateLinkName,

    #[error("handle-max exhausted")]
    HandleMaxReached,

    /// The peer answered the attach without the required terminus, then
    /// (usually) detached
    #[error("the peer rejected the attach: {error:?}")]
    IncompleteAttach {
        error: Option<definitions::Error>,
    },

    /// The peer detached instead of completing the attach
    #[error(transparent)]
    Detached(DetachError),

    #[error(transparent)]
    Session(session::Error),
}

/// Failure to detach, or a remote detach observed while waiting.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DetachError {
    #[error("link is not in a state that can detach")]
    IllegalState,

    #[error("session ended before the detach completed")]
    IllegalSessionState,

    #[error("the peer detached with an error: {0}")]
    RemoteDetachedWithError(definitions::Error),

    #[error("the peer closed the link")]
    ClosedByRemote,

    #[error(transparent)]
    Session(session::Error),
}

/// Failure to send, or a non-accepted terminal delivery state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    /// The receiver rejected the delivery
    #[error("delivery rejected: {error:?}")]
    Rejected {
        error: Option<definitions::Error>,
    },

    /// The receiver released the delivery without processing it
    #[error("delivery released")]
    Released,

    /// The receiver modified and did not process the delivery
    #[error("delivery modified: delivery_failed={delivery_failed:?}")]
    Modified {
        delivery_failed: Option<bool>,
        undeliverable_here: Option<bool>,
        message_annotations: Option<Fields>,
    },

    #[error(transparent)]
    Detached(DetachError),

    #[error("link is not attached as a sender")]
    IllegalState,

    #[error(transparent)]
    Session(session::Error),

    #[error("message exceeds the peer's max-message-size")]
    MessageSizeExceeded,

    #[error("delivery tag exceeds 32 octets")]
    InvalidDeliveryTag,
}

/// Failure to receive.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecvError {
    #[error("the peer detached the link: {error:?}")]
    RemoteDetached {
        error: Option<definitions::Error>,
    },

    #[error(transparent)]
    Session(session::Error),

    #[error("failed to decode the incoming message: {0}")]
    MessageDecode(limonite_amqp_types::Error),

    #[error("link has been closed")]
    Closed,
}

/// Failure to update delivery state from the receiver side.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispositionError {
    #[error("delivery is no longer eligible for a disposition")]
    IllegalState,

    #[error(transparent)]
    Session(session::Error),
}

/// Failure of a credit operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
    #[error("link is not attached as a receiver")]
    IllegalState,

    #[error(transparent)]
    Session(session::Error),
}
