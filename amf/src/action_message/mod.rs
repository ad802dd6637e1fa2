use crate::AmfValue;

mod parse;
mod serialize;

#[cfg(test)]
mod action_message_tests;

pub const AMF3_VERSION: u16 = 3;

const AMF0_NUMBER: u8 = 0x00;
const AMF0_BOOLEAN: u8 = 0x01;
const AMF0_STRING: u8 = 0x02;
const AMF0_NULL: u8 = 0x05;
const AMF0_UNDEFINED: u8 = 0x06;
const AMF0_SWITCH_TO_AMF3: u8 = 0x11;

/// Header and body length used when the sender did not compute it.
const UNKNOWN_LENGTH: u32 = u32::MAX;

/// Envelope of one AMF request or response sent over HTTP.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMessage {
    pub version: u16,
    pub headers: Vec<MessageHeader>,
    pub bodies: Vec<MessageBody>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    pub name: String,
    pub must_understand: bool,
    pub value: AmfValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageBody {
    pub target_uri: String,
    pub response_uri: String,
    pub value: AmfValue,
}

impl ActionMessage {
    pub fn new() -> Self {
        Self {
            version: AMF3_VERSION,
            headers: vec![],
            bodies: vec![],
        }
    }
}

impl Default for ActionMessage {
    fn default() -> Self {
        Self::new()
    }
}
