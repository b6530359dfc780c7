//! Links: the sender and receiver endpoints of message transfer.
//!
//! The session engine owns link protocol state; [`Sender`] and
//! [`Receiver`] are handles that submit requests to it and await the
//! results.

pub mod builder;
pub(crate) mod delivery;
pub(crate) mod error;
pub(crate) mod frame;
mod receiver;
mod sender;

pub use builder::Builder;
pub use delivery::{Delivery, RandomTagSource, Sendable, SendableBuilder, TagSource};
pub use error::{
    AttachError, DetachError, DispositionError, FlowError, RecvError, SendError,
};
pub use frame::CreditMode;
pub use receiver::Receiver;
pub use sender::Sender;

/// Type states for the link builder.
pub mod role {
    /// Builder type state for sender links
    pub struct Sender {}

    /// Builder type state for receiver links
    pub struct Receiver {}
}

/// 2.6.3 establishing / 2.6.5 terminating a link (client subset)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkState {
    /// An attach has been sent, the peer's answer is outstanding
    AttachSent,
    /// Both attaches exchanged
    Attached,
    /// A detach has been sent, the peer's answer is outstanding
    DetachSent,
}
