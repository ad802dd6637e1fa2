use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::{AliasTable, AmfDecodingError, AmfEncodingError};

mod decoding;
mod encoding;
mod externalizable;

#[cfg(test)]
mod amf3_tests;

pub(crate) use decoding::Amf3DecoderState;
pub(crate) use encoding::Amf3EncoderState;
pub use externalizable::{ExternalLayout, external_layout};

const UNDEFINED: u8 = 0x00;
const NULL: u8 = 0x01;
const FALSE: u8 = 0x02;
const TRUE: u8 = 0x03;
const INTEGER: u8 = 0x04;
const DOUBLE: u8 = 0x05;
const STRING: u8 = 0x06;
const XML_DOC: u8 = 0x07;
const DATE: u8 = 0x08;
const ARRAY: u8 = 0x09;
const OBJECT: u8 = 0x0A;
const XML: u8 = 0x0B;
const BYTE_ARRAY: u8 = 0x0C;
const VECTOR_INT: u8 = 0x0D;
const VECTOR_UINT: u8 = 0x0E;
const VECTOR_DOUBLE: u8 = 0x0F;
const VECTOR_OBJECT: u8 = 0x10;
const DICTIONARY: u8 = 0x11;

pub const I29_MAX: i32 = (1 << 28) - 1;
pub const I29_MIN: i32 = -(1 << 28);

/// Deepest nesting of complex values accepted by the codec.
pub const MAX_NESTING_DEPTH: usize = 128;

/// In-memory AMF3 value.
///
/// Strings and traits are interned by value when encoding. Complex values
/// (everything that lands in the AMF3 object table) are only shared through
/// explicit [`AmfValue::Reference`] nodes, which point at the object table
/// slot assigned in pre-order within one top-level value.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    Undefined,
    Null,
    Boolean(bool),
    /// 29-bit signed integer. Values outside [`I29_MIN`, `I29_MAX`] are
    /// written as doubles and therefore decode as [`AmfValue::Double`] with
    /// the same numeric value. [`AmfValue::integer`] picks the variant the
    /// decoder would produce.
    Integer(i32),
    Double(f64),
    String(String),
    XmlDoc(String),
    /// Milliseconds since Unix epoch.
    Date(f64),
    Array {
        associative: Vec<(String, AmfValue)>,
        dense: Vec<AmfValue>,
    },
    Object {
        traits: Traits,
        /// One value per `traits.sealed_members` entry, in the same order.
        sealed: Vec<AmfValue>,
        dynamic: Vec<(String, AmfValue)>,
    },
    Xml(String),
    ByteArray(Bytes),
    VectorInt {
        fixed_length: bool,
        values: Vec<i32>,
    },
    VectorUInt {
        fixed_length: bool,
        values: Vec<u32>,
    },
    VectorDouble {
        fixed_length: bool,
        values: Vec<f64>,
    },
    VectorObject {
        fixed_length: bool,
        class_name: Option<String>,
        values: Vec<AmfValue>,
    },
    Dictionary {
        weak_keys: bool,
        entries: Vec<(AmfValue, AmfValue)>,
    },
    Externalizable {
        class_name: String,
        body: Externalized,
    },
    /// Back reference to the object table entry with the given index.
    Reference(u32),
}

/// Shape shared by AMF3 objects: class name (`None` for anonymous objects),
/// dynamic flag and the ordered list of sealed member names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Traits {
    pub class_name: Option<String>,
    pub dynamic: bool,
    pub sealed_members: Vec<String>,
}

impl Traits {
    pub fn anonymous() -> Self {
        Self {
            class_name: None,
            dynamic: true,
            sealed_members: vec![],
        }
    }

    pub fn typed(class_name: impl Into<String>, sealed_members: Vec<String>) -> Self {
        Self {
            class_name: Some(class_name.into()),
            dynamic: false,
            sealed_members,
        }
    }
}

/// Payload of an externalizable object.
#[derive(Debug, Clone, PartialEq)]
pub enum Externalized {
    Message(Box<FlexMessage>),
    /// Collections and proxies wrapping a single value.
    Proxy(Box<AmfValue>),
    /// Bytes of a class without a known layout, kept verbatim.
    Opaque(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlexMessageKind {
    Async,
    Acknowledge,
    Command,
}

/// Externalized Flex messaging field. Variants are ordered the way the fields
/// appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageField {
    Body,
    ClientId,
    Destination,
    Headers,
    MessageId,
    Timestamp,
    TimeToLive,
    ClientIdBytes,
    MessageIdBytes,
    CorrelationId,
    CorrelationIdBytes,
    Operation,
}

impl MessageField {
    pub const ALL: [MessageField; 12] = [
        MessageField::Body,
        MessageField::ClientId,
        MessageField::Destination,
        MessageField::Headers,
        MessageField::MessageId,
        MessageField::Timestamp,
        MessageField::TimeToLive,
        MessageField::ClientIdBytes,
        MessageField::MessageIdBytes,
        MessageField::CorrelationId,
        MessageField::CorrelationIdBytes,
        MessageField::Operation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MessageField::Body => "body",
            MessageField::ClientId => "clientId",
            MessageField::Destination => "destination",
            MessageField::Headers => "headers",
            MessageField::MessageId => "messageId",
            MessageField::Timestamp => "timestamp",
            MessageField::TimeToLive => "timeToLive",
            MessageField::ClientIdBytes => "clientIdBytes",
            MessageField::MessageIdBytes => "messageIdBytes",
            MessageField::CorrelationId => "correlationId",
            MessageField::CorrelationIdBytes => "correlationIdBytes",
            MessageField::Operation => "operation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }
}

/// Externalized `AsyncMessage`, `AcknowledgeMessage` or `CommandMessage`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexMessage {
    pub kind: FlexMessageKind,
    pub fields: BTreeMap<MessageField, AmfValue>,
}

impl FlexMessage {
    pub fn new(kind: FlexMessageKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: MessageField, value: AmfValue) -> Self {
        self.fields.insert(field, value);
        self
    }

    pub fn get(&self, field: MessageField) -> Option<&AmfValue> {
        self.fields.get(&field)
    }
}

impl AmfValue {
    /// Integer value, promoted to a double when it does not fit in 29 bits.
    pub fn integer(value: i64) -> Self {
        if (I29_MIN as i64..=I29_MAX as i64).contains(&value) {
            AmfValue::Integer(value as i32)
        } else {
            AmfValue::Double(value as f64)
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Integer(i) => Some(*i as f64),
            AmfValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Member of an object, sealed members first.
    pub fn member(&self, name: &str) -> Option<&AmfValue> {
        match self {
            AmfValue::Object {
                traits,
                sealed,
                dynamic,
            } => traits
                .sealed_members
                .iter()
                .zip(sealed)
                .chain(dynamic.iter().map(|(k, v)| (k, v)))
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Type marker under which the value is written, for values stored in the
    /// object table.
    pub(crate) fn complex_marker(&self) -> Option<u8> {
        match self {
            AmfValue::XmlDoc(_) => Some(XML_DOC),
            AmfValue::Date(_) => Some(DATE),
            AmfValue::Array { .. } => Some(ARRAY),
            AmfValue::Object { .. } | AmfValue::Externalizable { .. } => Some(OBJECT),
            AmfValue::Xml(_) => Some(XML),
            AmfValue::ByteArray(_) => Some(BYTE_ARRAY),
            AmfValue::VectorInt { .. } => Some(VECTOR_INT),
            AmfValue::VectorUInt { .. } => Some(VECTOR_UINT),
            AmfValue::VectorDouble { .. } => Some(VECTOR_DOUBLE),
            AmfValue::VectorObject { .. } => Some(VECTOR_OBJECT),
            AmfValue::Dictionary { .. } => Some(DICTIONARY),
            _ => None,
        }
    }

    /// Whether the value occupies a slot in the object table.
    pub fn is_complex(&self) -> bool {
        self.complex_marker().is_some()
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Double(v)
    }
}

impl From<i32> for AmfValue {
    fn from(v: i32) -> Self {
        AmfValue::integer(v as i64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

/// Encode a single AMF3 value with fresh reference tables.
pub fn encode_amf3(value: &AmfValue) -> Result<Bytes, AmfEncodingError> {
    let mut encoder = Amf3EncoderState::new(BytesMut::new());
    encoder.put_value(value)?;
    Ok(encoder.buf.freeze())
}

/// Decode a single AMF3 value that spans the whole of `amf_bytes`.
///
/// Externalizable classes with no known layout are kept as opaque payloads,
/// since the end of the value is known.
pub fn decode_amf3(amf_bytes: Bytes, aliases: &AliasTable) -> Result<AmfValue, AmfDecodingError> {
    let mut decoder = Amf3DecoderState::new(amf_bytes, aliases).with_opaque_tail(true);
    let value = decoder.decode_value()?;
    if decoder.remaining() > 0 {
        warn!(
            remaining = decoder.remaining(),
            "Trailing bytes after AMF3 value"
        );
    }
    Ok(value)
}
