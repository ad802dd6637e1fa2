//! Textual XML form of AMF action messages and values.
//!
//! ```xml
//! <ActionMessage version="3">
//!   <MessageHeader name="DSId" mustUnderstand="false">
//!     <string>nil</string>
//!   </MessageHeader>
//!   <MessageBody targetUri="null" responseUri="/1">
//!     <array>
//!       <RemotingMessage>
//!         <string name="operation">echo</string>
//!         <ASObject name="headers" id="2">
//!           <reference name="self" ref="2"/>
//!         </ASObject>
//!       </RemotingMessage>
//!     </array>
//!   </MessageBody>
//! </ActionMessage>
//! ```
//!
//! Every value is one element. Object members, associative array entries and
//! message fields carry their key in a `name` attribute. Complex values that
//! are referenced again get an `id`, and `<reference ref="..."/>` points back
//! at them. Ids are only meaningful inside one header or body.

use amf::{ActionMessage, AliasTable, AmfValue};

mod dom;
mod reader;
mod writer;


use reader::XmlReader;
use writer::XmlWriter;

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("Malformed XML.")]
    Malformed(#[from] quick_xml::Error),

    #[error("Malformed XML attribute.")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Failed to write XML.")]
    Write(#[from] std::io::Error),

    #[error("Written XML is not valid UTF-8.")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Document has no root element.")]
    EmptyDocument,

    #[error("Element <{0}> is not closed.")]
    UnclosedElement(String),

    #[error("Unexpected content outside of the root element.")]
    ContentOutsideRoot,

    #[error("Expected <{expected}>, found <{found}>.")]
    UnexpectedElement {
        expected: &'static str,
        found: String,
    },

    #[error("Unknown element <{0}>.")]
    UnknownElement(String),

    #[error("Element <{element}> is missing the {attribute:?} attribute.")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    #[error("Element <{0}> must contain exactly one value.")]
    MissingValue(String),

    #[error("Invalid value {value:?} in <{element}>.")]
    InvalidValue { element: String, value: String },

    #[error("Invalid base64 payload.")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Reference to unknown id {0:?}.")]
    UnknownReference(String),

    #[error("Unknown message field {0:?}.")]
    UnknownMessageField(String),

    #[error("Message field {0:?} is given more than once.")]
    DuplicateMessageField(String),

    #[error("No known layout for externalizable class {0:?} with structured content.")]
    UnknownExternalizable(String),

    #[error("Values are nested deeper than {0} levels.")]
    MaxDepthExceeded(usize),
}

const ACTION_MESSAGE: &str = "ActionMessage";
const MESSAGE_HEADER: &str = "MessageHeader";
const MESSAGE_BODY: &str = "MessageBody";
const AS_OBJECT: &str = "ASObject";

/// Element names used instead of `ASObject` for well known classes.
struct NamedClass {
    element: &'static str,
    class_name: &'static str,
    externalizable: bool,
}

const NAMED_CLASSES: [NamedClass; 9] = [
    NamedClass {
        element: "RemotingMessage",
        class_name: "flex.messaging.messages.RemotingMessage",
        externalizable: false,
    },
    NamedClass {
        element: "CommandMessage",
        class_name: "flex.messaging.messages.CommandMessage",
        externalizable: false,
    },
    NamedClass {
        element: "AcknowledgeMessage",
        class_name: "flex.messaging.messages.AcknowledgeMessage",
        externalizable: false,
    },
    NamedClass {
        element: "ErrorMessage",
        class_name: "flex.messaging.messages.ErrorMessage",
        externalizable: false,
    },
    NamedClass {
        element: "DSC",
        class_name: "DSC",
        externalizable: true,
    },
    NamedClass {
        element: "DSK",
        class_name: "DSK",
        externalizable: true,
    },
    NamedClass {
        element: "DSA",
        class_name: "DSA",
        externalizable: true,
    },
    NamedClass {
        element: "ArrayCollection",
        class_name: "flex.messaging.io.ArrayCollection",
        externalizable: true,
    },
    NamedClass {
        element: "ObjectProxy",
        class_name: "flex.messaging.io.ObjectProxy",
        externalizable: true,
    },
];

fn named_class(element: &str) -> Option<&'static NamedClass> {
    NAMED_CLASSES.iter().find(|named| named.element == element)
}

fn element_for_class(class_name: &str, externalizable: bool) -> Option<&'static str> {
    NAMED_CLASSES
        .iter()
        .find(|named| named.class_name == class_name && named.externalizable == externalizable)
        .map(|named| named.element)
}

pub fn action_message_to_xml(message: &ActionMessage) -> Result<String, XmlError> {
    let mut writer = XmlWriter::new();
    writer.write_action_message(message)?;
    writer.finish()
}

pub fn action_message_from_xml(xml: &str, aliases: &AliasTable) -> Result<ActionMessage, XmlError> {
    let root = dom::parse_document(xml)?;
    XmlReader::new(aliases).read_action_message(&root)
}

pub fn value_to_xml(value: &AmfValue) -> Result<String, XmlError> {
    let mut writer = XmlWriter::new();
    writer.write_root_value(value)?;
    writer.finish()
}

pub fn value_from_xml(xml: &str, aliases: &AliasTable) -> Result<AmfValue, XmlError> {
    let root = dom::parse_document(xml)?;
    XmlReader::new(aliases).read_root_value(&root)
}
