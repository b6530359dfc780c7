//! Standard error conditions (2.8.15 through 2.8.18)

use bytes::BytesMut;

use crate::codec::{Decode, Decoder, Encode};
use crate::error::Error as CodecError;
use crate::primitives::Symbol;

/// 2.8.15 AMQP Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmqpError {
    InternalError,
    NotFound,
    UnauthorizedAccess,
    DecodeError,
    ResourceLimitExceeded,
    NotAllowed,
    InvalidField,
    NotImplemented,
    ResourceLocked,
    PreconditionFailed,
    ResourceDeleted,
    IllegalState,
    FrameSizeTooSmall,
}

impl AmqpError {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmqpError::InternalError => "amqp:internal-error",
            AmqpError::NotFound => "amqp:not-found",
            AmqpError::UnauthorizedAccess => "amqp:unauthorized-access",
            AmqpError::DecodeError => "amqp:decode-error",
            AmqpError::ResourceLimitExceeded => "amqp:resource-limit-exceeded",
            AmqpError::NotAllowed => "amqp:not-allowed",
            AmqpError::InvalidField => "amqp:invalid-field",
            AmqpError::NotImplemented => "amqp:not-implemented",
            AmqpError::ResourceLocked => "amqp:resource-locked",
            AmqpError::PreconditionFailed => "amqp:precondition-failed",
            AmqpError::ResourceDeleted => "amqp:resource-deleted",
            AmqpError::IllegalState => "amqp:illegal-state",
            AmqpError::FrameSizeTooSmall => "amqp:frame-size-too-small",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        let condition = match s {
            "amqp:internal-error" => AmqpError::InternalError,
            "amqp:not-found" => AmqpError::NotFound,
            "amqp:unauthorized-access" => AmqpError::UnauthorizedAccess,
            "amqp:decode-error" => AmqpError::DecodeError,
            "amqp:resource-limit-exceeded" => AmqpError::ResourceLimitExceeded,
            "amqp:not-allowed" => AmqpError::NotAllowed,
            "amqp:invalid-field" => AmqpError::InvalidField,
            "amqp:not-implemented" => AmqpError::NotImplemented,
            "amqp:resource-locked" => AmqpError::ResourceLocked,
            "amqp:precondition-failed" => AmqpError::PreconditionFailed,
            "amqp:resource-deleted" => AmqpError::ResourceDeleted,
            "amqp:illegal-state" => AmqpError::IllegalState,
            "amqp:frame-size-too-small" => AmqpError::FrameSizeTooSmall,
            _ => return None,
        };
        Some(condition)
    }
}

/// 2.8.16 Connection Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    ConnectionForced,
    FramingError,
    Redirect,
}

impl ConnectionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionError::ConnectionForced => "amqp:connection:forced",
            ConnectionError::FramingError => "amqp:connection:framing-error",
            ConnectionError::Redirect => "amqp:connection:redirect",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        let condition = match s {
            "amqp:connection:forced" => ConnectionError::ConnectionForced,
            "amqp:connection:framing-error" => ConnectionError::FramingError,
            "amqp:connection:redirect" => ConnectionError::Redirect,
            _ => return None,
        };
        Some(condition)
    }
}

/// 2.8.17 Session Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    WindowViolation,
    ErrantLink,
    HandleInUse,
    UnattachedHandle,
}

impl SessionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionError::WindowViolation => "amqp:session:window-violation",
            SessionError::ErrantLink => "amqp:session:errant-link",
            SessionError::HandleInUse => "amqp:session:handle-in-use",
            SessionError::UnattachedHandle => "amqp:session:unattached-handle",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        let condition = match s {
            "amqp:session:window-violation" => SessionError::WindowViolation,
            "amqp:session:errant-link" => SessionError::ErrantLink,
            "amqp:session:handle-in-use" => SessionError::HandleInUse,
            "amqp:session:unattached-handle" => SessionError::UnattachedHandle,
            _ => return None,
        };
        Some(condition)
    }
}

/// 2.8.18 Link Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    DetachForced,
    TransferLimitExceeded,
    MessageSizeExceeded,
    Redirect,
    Stolen,
}

impl LinkError {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkError::DetachForced => "amqp:link:detach-forced",
            LinkError::TransferLimitExceeded => "amqp:link:transfer-limit-exceeded",
            LinkError::MessageSizeExceeded => "amqp:link:message-size-exceeded",
            LinkError::Redirect => "amqp:link:redirect",
            LinkError::Stolen => "amqp:link:stolen",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        let condition = match s {
            "amqp:link:detach-forced" => LinkError::DetachForced,
            "amqp:link:transfer-limit-exceeded" => LinkError::TransferLimitExceeded,
            "amqp:link:message-size-exceeded" => LinkError::MessageSizeExceeded,
            "amqp:link:redirect" => LinkError::Redirect,
            "amqp:link:stolen" => LinkError::Stolen,
            _ => return None,
        };
        Some(condition)
    }
}

/// Any error condition: one of the standard symbols or an extension symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCondition {
    Amqp(AmqpError),
    Connection(ConnectionError),
    Session(SessionError),
    Link(LinkError),
    Custom(Symbol),
}

impl ErrorCondition {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCondition::Amqp(c) => c.as_str(),
            ErrorCondition::Connection(c) => c.as_str(),
            ErrorCondition::Session(c) => c.as_str(),
            ErrorCondition::Link(c) => c.as_str(),
            ErrorCondition::Custom(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AmqpError> for ErrorCondition {
    fn from(c: AmqpError) -> Self {
        ErrorCondition::Amqp(c)
    }
}

impl From<ConnectionError> for ErrorCondition {
    fn from(c: ConnectionError) -> Self {
        ErrorCondition::Connection(c)
    }
}

impl From<SessionError> for ErrorCondition {
    fn from(c: SessionError) -> Self {
        ErrorCondition::Session(c)
    }
}

impl From<LinkError> for ErrorCondition {
    fn from(c: LinkError) -> Self {
        ErrorCondition::Link(c)
    }
}

impl From<Symbol> for ErrorCondition {
    fn from(s: Symbol) -> Self {
        match AmqpError::from_str(&s)
            .map(ErrorCondition::Amqp)
            .or_else(|| ConnectionError::from_str(&s).map(ErrorCondition::Connection))
            .or_else(|| SessionError::from_str(&s).map(ErrorCondition::Session))
            .or_else(|| LinkError::from_str(&s).map(ErrorCondition::Link))
        {
            Some(condition) => condition,
            None => ErrorCondition::Custom(s),
        }
    }
}

impl Encode for ErrorCondition {
    fn encode(&self, buf: &mut BytesMut) {
        Symbol::from(self.as_str()).encode(buf)
    }
}

impl Decode for ErrorCondition {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        Ok(ErrorCondition::from(Symbol::decode(de)?))
    }
}

#[cfg(test)]
mod tests {
    use super::{AmqpError, ErrorCondition, LinkError};
    use crate::codec::{from_slice, to_vec};
    use crate::primitives::Symbol;

    #[test]
    fn standard_conditions_round_trip() {
        for condition in [
            ErrorCondition::Amqp(AmqpError::DecodeError),
            ErrorCondition::Link(LinkError::Stolen),
            ErrorCondition::Custom(Symbol::from("vendor:surprise")),
        ] {
            let bytes = to_vec(&condition);
            let (decoded, _) = from_slice::<ErrorCondition>(&bytes).unwrap();
            assert_eq!(decoded, condition);
        }
    }
}
