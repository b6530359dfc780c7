//! Terminus attributes shared by Source and Target

use bytes::BytesMut;

use crate::codec::{Decode, Decoder, Encode};
use crate::error::Error as CodecError;
use crate::primitives::Symbol;

/// 3.5.5 Terminus Durability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TerminusDurability {
    /// No terminus state is retained durably
    #[default]
    None = 0,
    /// Only the existence and configuration of the terminus is retained
    Configuration = 1,
    /// Configuration and unsettled state are retained
    UnsettledState = 2,
}

impl Encode for TerminusDurability {
    fn encode(&self, buf: &mut BytesMut) {
        (*self as u32).encode(buf)
    }
}

impl Decode for TerminusDurability {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        match u32::decode(de)? {
            0 => Ok(TerminusDurability::None),
            1 => Ok(TerminusDurability::Configuration),
            2 => Ok(TerminusDurability::UnsettledState),
            _ => Err(CodecError::InvalidValue),
        }
    }
}

/// 3.5.6 Terminus Expiry Policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TerminusExpiryPolicy {
    LinkDetach,
    #[default]
    SessionEnd,
    ConnectionClose,
    Never,
}

impl TerminusExpiryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminusExpiryPolicy::LinkDetach => "link-detach",
            TerminusExpiryPolicy::SessionEnd => "session-end",
            TerminusExpiryPolicy::ConnectionClose => "connection-close",
            TerminusExpiryPolicy::Never => "never",
        }
    }
}

impl Encode for TerminusExpiryPolicy {
    fn encode(&self, buf: &mut BytesMut) {
        Symbol::from(self.as_str()).encode(buf)
    }
}

impl Decode for TerminusExpiryPolicy {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        match Symbol::decode(de)?.as_str() {
            "link-detach" => Ok(TerminusExpiryPolicy::LinkDetach),
            "session-end" => Ok(TerminusExpiryPolicy::SessionEnd),
            "connection-close" => Ok(TerminusExpiryPolicy::ConnectionClose),
            "never" => Ok(TerminusExpiryPolicy::Never),
            _ => Err(CodecError::InvalidValue),
        }
    }
}
