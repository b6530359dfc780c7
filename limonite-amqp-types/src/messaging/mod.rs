//! Messaging types from Part 3: message sections, delivery states, and the
//! source/target termini.

mod delivery_state;
mod message;
mod sections;
mod source;
mod target;
mod terminus;

pub use delivery_state::{
    Accepted, DeliveryState, Modified, Outcome, Received, Rejected, Released,
};
pub use message::{Body, Builder as MessageBuilder, Message};
pub use sections::{
    AmqpSequence, AmqpValue, Annotations, ApplicationProperties, Data, DeliveryAnnotations,
    Footer, Header, MessageAnnotations, MessageId, Properties,
};
pub use source::{FilterSet, Source};
pub use target::Target;
pub use terminus::{TerminusDurability, TerminusExpiryPolicy};

/// The address of a node, as used in source and target fields
pub type Address = String;
