use bytes::{Buf, BufMut};
use tracing::warn;

use crate::{Amf3EncodingError, AmfDecodingError, AmfEncodingError, amf3::*};

use super::{Amf3DecoderState, Amf3EncoderState};

const HAS_NEXT_FLAG: u8 = 0x80;

/// Flag byte 7 always marks a following flag byte, so a byte carries at most
/// 7 field bits.
const FIELD_BITS: u8 = 7;

/// Fields of one class in the hierarchy, grouped by flag byte. Bit `n` of flag
/// byte `i` marks the presence of `layer[i][n]`.
type Layer = &'static [&'static [MessageField]];

const ABSTRACT_MESSAGE: Layer = &[
    &[
        MessageField::Body,
        MessageField::ClientId,
        MessageField::Destination,
        MessageField::Headers,
        MessageField::MessageId,
        MessageField::Timestamp,
        MessageField::TimeToLive,
    ],
    &[MessageField::ClientIdBytes, MessageField::MessageIdBytes],
];

const ASYNC_MESSAGE: Layer = &[&[
    MessageField::CorrelationId,
    MessageField::CorrelationIdBytes,
]];

const ACKNOWLEDGE_MESSAGE: Layer = &[];

const COMMAND_MESSAGE: Layer = &[&[MessageField::Operation]];

const MESSAGES_PACKAGE: &str = "flex.messaging.messages.";

const PROXY_CLASSES: [&str; 5] = [
    "flex.messaging.io.ArrayCollection",
    "flex.messaging.io.ArrayList",
    "flex.messaging.io.ObjectProxy",
    "flex.messaging.io.ManagedObjectProxy",
    "flex.messaging.io.SerializationProxy",
];

/// How the externalized body of a class is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalLayout {
    Message(FlexMessageKind),
    /// Single wrapped AMF3 value.
    Proxy,
}

/// Layout for a canonical (alias-resolved) class name.
pub fn external_layout(class_name: &str) -> Option<ExternalLayout> {
    if PROXY_CLASSES.contains(&class_name) {
        return Some(ExternalLayout::Proxy);
    }

    let kind = match class_name.strip_prefix(MESSAGES_PACKAGE)? {
        "AsyncMessage" | "AsyncMessageExt" => FlexMessageKind::Async,
        "AcknowledgeMessage" | "AcknowledgeMessageExt" | "ErrorMessage" => {
            FlexMessageKind::Acknowledge
        }
        "CommandMessage" | "CommandMessageExt" => FlexMessageKind::Command,
        _ => return None,
    };
    Some(ExternalLayout::Message(kind))
}

impl FlexMessageKind {
    pub fn name(&self) -> &'static str {
        match self {
            FlexMessageKind::Async => "AsyncMessage",
            FlexMessageKind::Acknowledge => "AcknowledgeMessage",
            FlexMessageKind::Command => "CommandMessage",
        }
    }

    fn layers(&self) -> &'static [Layer] {
        match self {
            FlexMessageKind::Async => &[ABSTRACT_MESSAGE, ASYNC_MESSAGE],
            FlexMessageKind::Acknowledge => &[ABSTRACT_MESSAGE, ASYNC_MESSAGE, ACKNOWLEDGE_MESSAGE],
            FlexMessageKind::Command => &[ABSTRACT_MESSAGE, ASYNC_MESSAGE, COMMAND_MESSAGE],
        }
    }

    /// Whether `field` is part of any layer of this kind.
    pub fn has_field(&self, field: MessageField) -> bool {
        self.layers()
            .iter()
            .flat_map(|layer| layer.iter())
            .any(|fields| fields.contains(&field))
    }
}

impl<T> Amf3DecoderState<'_, T>
where
    T: Buf,
{
    pub(super) fn decode_flex_message(
        &mut self,
        kind: FlexMessageKind,
    ) -> Result<FlexMessage, AmfDecodingError> {
        let mut message = FlexMessage::new(kind);
        for (layer_idx, layer) in kind.layers().iter().enumerate() {
            let flags = self.read_flags()?;
            for (flag_idx, flag_byte) in flags.into_iter().enumerate() {
                let known = layer.get(flag_idx).copied().unwrap_or_default();
                for bit in 0..FIELD_BITS {
                    if (flag_byte >> bit) & 0b1 == 0 {
                        continue;
                    }

                    let value = self.decode_value()?;
                    match known.get(bit as usize) {
                        Some(field) => {
                            message.fields.insert(*field, value);
                        }
                        None => warn!(
                            kind = kind.name(),
                            layer_idx, flag_idx, bit, "Discarding value of unknown message flag"
                        ),
                    }
                }
            }
        }
        Ok(message)
    }

    fn read_flags(&mut self) -> Result<Vec<u8>, AmfDecodingError> {
        let mut flags = vec![];
        loop {
            let flag_byte = self.get_u8()?;
            flags.push(flag_byte);
            if flag_byte & HAS_NEXT_FLAG == 0 {
                return Ok(flags);
            }
        }
    }
}

impl<T> Amf3EncoderState<T>
where
    T: BufMut,
{
    pub(super) fn put_flex_message(&mut self, message: &FlexMessage) -> Result<(), AmfEncodingError> {
        if let Some(field) = message
            .fields
            .keys()
            .find(|field| !message.kind.has_field(**field))
        {
            return Err(Amf3EncodingError::MessageFieldNotInLayout {
                field: field.name(),
                kind: message.kind.name(),
            }
            .into());
        }

        for layer in message.kind.layers() {
            let mut flags: Vec<u8> = layer
                .iter()
                .map(|fields| {
                    fields
                        .iter()
                        .enumerate()
                        .filter(|(_, field)| message.fields.contains_key(*field))
                        .fold(0u8, |flags, (bit, _)| flags | (1 << bit))
                })
                .collect();

            while flags.len() > 1 && flags.last() == Some(&0) {
                flags.pop();
            }
            if flags.is_empty() {
                flags.push(0);
            }

            let last = flags.len() - 1;
            for (idx, flag_byte) in flags.iter().enumerate() {
                match idx == last {
                    true => self.put_u8(*flag_byte),
                    false => self.put_u8(flag_byte | HAS_NEXT_FLAG),
                }
            }

            for fields in layer.iter().take(flags.len()) {
                for field in fields.iter() {
                    if let Some(value) = message.fields.get(field) {
                        self.put_value(value)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod externalizable_test {
    use super::*;

    #[test]
    fn test_layout_of_known_classes() {
        assert_eq!(
            external_layout("flex.messaging.messages.CommandMessageExt"),
            Some(ExternalLayout::Message(FlexMessageKind::Command))
        );
        assert_eq!(
            external_layout("flex.messaging.messages.ErrorMessage"),
            Some(ExternalLayout::Message(FlexMessageKind::Acknowledge))
        );
        assert_eq!(
            external_layout("flex.messaging.io.ArrayCollection"),
            Some(ExternalLayout::Proxy)
        );
        assert_eq!(external_layout("DSK"), None);
        assert_eq!(external_layout("flex.messaging.messages.RemotingMessage"), None);
    }

    #[test]
    fn test_operation_only_in_command_layout() {
        assert!(FlexMessageKind::Command.has_field(MessageField::Operation));
        assert!(!FlexMessageKind::Async.has_field(MessageField::Operation));
        assert!(FlexMessageKind::Acknowledge.has_field(MessageField::CorrelationId));
    }
}
