//! The subset of frames a session endpoint handles

use limonite_amqp_types::performatives::{
    Attach, Begin, Detach, Disposition, End, Flow, Transfer,
};

use crate::connection;
use crate::Payload;

/// A frame on its way between a session and the connection.
///
/// For outgoing frames `channel` is the local (outgoing) channel; incoming
/// frames carry the wire channel they arrived on.
#[derive(Debug)]
pub(crate) struct SessionFrame {
    pub channel: u16,
    pub body: SessionFrameBody,
}

impl SessionFrame {
    pub fn new(channel: u16, body: SessionFrameBody) -> Self {
        Self { channel, body }
    }
}

#[derive(Debug)]
pub(crate) enum SessionFrameBody {
    Begin(Begin),
    Attach(Attach),
    Flow(Flow),
    Transfer {
        performative: Transfer,
        payload: Payload,
    },
    Disposition(Disposition),
    Detach(Detach),
    End(End),
}

/// What the connection delivers into a session inbox: a frame, or the fatal
/// connection error that ends everything.
pub(crate) type SessionIncomingItem = Result<SessionFrame, connection::Error>;
