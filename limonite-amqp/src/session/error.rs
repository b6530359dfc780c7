use limonite_amqp_types::definitions;

use crate::connection;

/// Fatal session error; clonable so it can fan out to every pending
/// operation on the session and its links.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The enclosing connection failed
    #[error(transparent)]
    Connection(connection::Error),

    #[error("session ended by the remote peer: {error:?}")]
    RemoteEnded {
        error: Option<definitions::Error>,
    },

    #[error("session has ended")]
    Ended,

    #[error("illegal session state")]
    IllegalState,

    #[error("the peer violated the session window")]
    WindowViolation,
}

impl From<connection::Error> for Error {
    fn from(err: connection::Error) -> Self {
        Error::Connection(err)
    }
}
