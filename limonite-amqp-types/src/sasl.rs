//! SASL security frame bodies (5.3.3)

use bytes::BytesMut;

use crate::codec::{descriptor_matches, Decode, Decoder, Encode, ListEncoder};
use crate::error::Error as CodecError;
use crate::primitives::{Binary, Symbol};

/// 5.3.3.1 SASL Mechanisms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaslMechanisms {
    /// Mechanisms the sending peer supports, in order of preference
    pub sasl_server_mechanisms: Vec<Symbol>,
}

impl SaslMechanisms {
    pub const DESCRIPTOR_CODE: u64 = 0x40;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:sasl-mechanisms:list";

    fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let sasl_server_mechanisms = list.required("sasl-server-mechanisms")?;
        list.finish()?;
        Ok(Self {
            sasl_server_mechanisms,
        })
    }
}

impl Encode for SaslMechanisms {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.sasl_server_mechanisms);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// 5.3.3.2 SASL Init
#[derive(Debug, Clone, PartialEq)]
pub struct SaslInit {
    pub mechanism: Symbol,
    pub initial_response: Option<Binary>,
    pub hostname: Option<String>,
}

impl SaslInit {
    pub const DESCRIPTOR_CODE: u64 = 0x41;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:sasl-init:list";

    fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let mechanism = list.required("mechanism")?;
        let initial_response = list.field()?;
        let hostname = list.field()?;
        list.finish()?;
        Ok(Self {
            mechanism,
            initial_response,
            hostname,
        })
    }
}

impl Encode for SaslInit {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.mechanism);
        list.optional(&self.initial_response);
        list.optional(&self.hostname);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// 5.3.3.3 SASL Challenge
#[derive(Debug, Clone, PartialEq)]
pub struct SaslChallenge {
    pub challenge: Binary,
}

impl SaslChallenge {
    pub const DESCRIPTOR_CODE: u64 = 0x42;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:sasl-challenge:list";

    fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let challenge = list.required("challenge")?;
        list.finish()?;
        Ok(Self { challenge })
    }
}

impl Encode for SaslChallenge {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.challenge);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// 5.3.3.4 SASL Response
#[derive(Debug, Clone, PartialEq)]
pub struct SaslResponse {
    pub response: Binary,
}

impl SaslResponse {
    pub const DESCRIPTOR_CODE: u64 = 0x43;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:sasl-response:list";

    fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let response = list.required("response")?;
        list.finish()?;
        Ok(Self { response })
    }
}

impl Encode for SaslResponse {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.response);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// Outcome codes of the SASL dialogue (5.3.3.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslCode {
    /// Authentication succeeded
    Ok = 0,
    /// Authentication failed due to bad credentials
    Auth = 1,
    /// Failed due to a system error
    Sys = 2,
    /// Failed due to an unrecoverable system error
    SysPerm = 3,
    /// Failed due to a transient system error
    SysTemp = 4,
}

impl Encode for SaslCode {
    fn encode(&self, buf: &mut BytesMut) {
        (*self as u8).encode(buf)
    }
}

impl Decode for SaslCode {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        match u8::decode(de)? {
            0 => Ok(SaslCode::Ok),
            1 => Ok(SaslCode::Auth),
            2 => Ok(SaslCode::Sys),
            3 => Ok(SaslCode::SysPerm),
            4 => Ok(SaslCode::SysTemp),
            _ => Err(CodecError::InvalidValue),
        }
    }
}

/// 5.3.3.5 SASL Outcome
#[derive(Debug, Clone, PartialEq)]
pub struct SaslOutcome {
    pub code: SaslCode,
    pub additional_data: Option<Binary>,
}

impl SaslOutcome {
    pub const DESCRIPTOR_CODE: u64 = 0x44;
    pub const DESCRIPTOR_NAME: &'static str = "amqp:sasl-outcome:list";

    fn decode_body(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut list = de.list_reader()?;
        let code = list.required("code")?;
        let additional_data = list.field()?;
        list.finish()?;
        Ok(Self {
            code,
            additional_data,
        })
    }
}

impl Encode for SaslOutcome {
    fn encode(&self, buf: &mut BytesMut) {
        let mut list = ListEncoder::new();
        list.field(&self.code);
        list.optional(&self.additional_data);
        list.encode_into(Self::DESCRIPTOR_CODE, buf);
    }
}

/// Any SASL frame body, dispatched by descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum SaslFrameBody {
    Mechanisms(SaslMechanisms),
    Init(SaslInit),
    Challenge(SaslChallenge),
    Response(SaslResponse),
    Outcome(SaslOutcome),
}

impl Encode for SaslFrameBody {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            SaslFrameBody::Mechanisms(body) => body.encode(buf),
            SaslFrameBody::Init(body) => body.encode(buf),
            SaslFrameBody::Challenge(body) => body.encode(buf),
            SaslFrameBody::Response(body) => body.encode(buf),
            SaslFrameBody::Outcome(body) => body.encode(buf),
        }
    }
}

impl Decode for SaslFrameBody {
    fn decode(de: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let descriptor = de.read_descriptor()?;
        let matches = |code, name| descriptor_matches(&descriptor, code, name);

        let body = if matches(SaslMechanisms::DESCRIPTOR_CODE, SaslMechanisms::DESCRIPTOR_NAME) {
            SaslFrameBody::Mechanisms(SaslMechanisms::decode_body(de)?)
        } else if matches(SaslInit::DESCRIPTOR_CODE, SaslInit::DESCRIPTOR_NAME) {
            SaslFrameBody::Init(SaslInit::decode_body(de)?)
        } else if matches(SaslChallenge::DESCRIPTOR_CODE, SaslChallenge::DESCRIPTOR_NAME) {
            SaslFrameBody::Challenge(SaslChallenge::decode_body(de)?)
        } else if matches(SaslResponse::DESCRIPTOR_CODE, SaslResponse::DESCRIPTOR_NAME) {
            SaslFrameBody::Response(SaslResponse::decode_body(de)?)
        } else if matches(SaslOutcome::DESCRIPTOR_CODE, SaslOutcome::DESCRIPTOR_NAME) {
            SaslFrameBody::Outcome(SaslOutcome::decode_body(de)?)
        } else {
            return Err(CodecError::UnexpectedDescriptor);
        };
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::{SaslFrameBody, SaslMechanisms, SaslOutcome, SaslCode};
    use crate::codec::{from_slice, to_vec};
    use crate::primitives::Symbol;

    #[test]
    fn mechanisms_round_trip() {
        let mechanisms = SaslMechanisms {
            sasl_server_mechanisms: vec![Symbol::from("PLAIN"), Symbol::from("ANONYMOUS")],
        };
        let bytes = to_vec(&mechanisms);
        let (decoded, _) = from_slice::<SaslFrameBody>(&bytes).unwrap();
        assert_eq!(decoded, SaslFrameBody::Mechanisms(mechanisms));
    }

    #[test]
    fn outcome_round_trip() {
        let outcome = SaslOutcome {
            code: SaslCode::Ok,
            additional_data: None,
        };
        let bytes = to_vec(&outcome);
        let (decoded, _) = from_slice::<SaslFrameBody>(&bytes).unwrap();
        assert_eq!(decoded, SaslFrameBody::Outcome(outcome));
    }
}
