use bytes::{Buf, Bytes};
use tracing::{debug, warn};

use crate::{AliasTable, AmfDecodingError, AmfValue, amf3::Amf3DecoderState};

use super::{
    AMF0_BOOLEAN, AMF0_NULL, AMF0_NUMBER, AMF0_STRING, AMF0_SWITCH_TO_AMF3, AMF0_UNDEFINED,
    ActionMessage, MessageBody, MessageHeader, UNKNOWN_LENGTH,
};

impl ActionMessage {
    /// Parses an HTTP body into an action message. `aliases` decides which
    /// externalizable classes have a known layout; unknown ones are kept as
    /// opaque payloads wherever the value length is known.
    pub fn parse(mut payload: Bytes, aliases: &AliasTable) -> Result<Self, AmfDecodingError> {
        let version = get_u16(&mut payload)?;

        let header_count = get_u16(&mut payload)?;
        let headers = (0..header_count)
            .map(|_| -> Result<MessageHeader, AmfDecodingError> {
                let name = get_utf8(&mut payload)?;
                let must_understand = get_u8(&mut payload)? != 0;
                let value = decode_message_value(&mut payload, aliases, false)?;
                Ok(MessageHeader {
                    name,
                    must_understand,
                    value,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let body_count = get_u16(&mut payload)?;
        let bodies = (0..body_count)
            .map(|idx| -> Result<MessageBody, AmfDecodingError> {
                let target_uri = get_utf8(&mut payload)?;
                let response_uri = get_utf8(&mut payload)?;
                let is_last = idx + 1 == body_count;
                let value = decode_message_value(&mut payload, aliases, is_last)?;
                Ok(MessageBody {
                    target_uri,
                    response_uri,
                    value,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if payload.has_remaining() {
            warn!(
                remaining = payload.remaining(),
                "Trailing bytes after action message"
            );
        }
        debug!(
            version,
            headers = headers.len(),
            bodies = bodies.len(),
            "Parsed action message"
        );

        Ok(Self {
            version,
            headers,
            bodies,
        })
    }
}

fn decode_message_value(
    payload: &mut Bytes,
    aliases: &AliasTable,
    is_last: bool,
) -> Result<AmfValue, AmfDecodingError> {
    let len = get_u32(payload)?;
    if len == UNKNOWN_LENGTH {
        // Only the last body is known to end where the payload ends.
        return decode_value(payload, aliases, is_last);
    }

    let len = len as usize;
    if payload.remaining() < len {
        return Err(AmfDecodingError::InsufficientData);
    }
    let mut region = payload.split_to(len);
    let value = decode_value(&mut region, aliases, true)?;
    if region.has_remaining() {
        warn!(
            remaining = region.remaining(),
            "Trailing bytes after message value"
        );
    }
    Ok(value)
}

fn decode_value(
    buf: &mut Bytes,
    aliases: &AliasTable,
    opaque_tail: bool,
) -> Result<AmfValue, AmfDecodingError> {
    let marker = get_u8(buf)?;
    match marker {
        AMF0_SWITCH_TO_AMF3 => {
            Amf3DecoderState::new(&mut *buf, aliases)
                .with_opaque_tail(opaque_tail)
                .decode_value()
        }
        AMF0_NUMBER => {
            if buf.remaining() < 8 {
                return Err(AmfDecodingError::InsufficientData);
            }
            Ok(AmfValue::Double(buf.get_f64()))
        }
        AMF0_BOOLEAN => Ok(AmfValue::Boolean(get_u8(buf)? != 0)),
        AMF0_STRING => Ok(AmfValue::String(get_utf8(buf)?)),
        AMF0_NULL => Ok(AmfValue::Null),
        AMF0_UNDEFINED => Ok(AmfValue::Undefined),
        _ => Err(AmfDecodingError::UnsupportedAmf0Type(marker)),
    }
}

fn get_u8(buf: &mut Bytes) -> Result<u8, AmfDecodingError> {
    if !buf.has_remaining() {
        return Err(AmfDecodingError::InsufficientData);
    }
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut Bytes) -> Result<u16, AmfDecodingError> {
    if buf.remaining() < 2 {
        return Err(AmfDecodingError::InsufficientData);
    }
    Ok(buf.get_u16())
}

fn get_u32(buf: &mut Bytes) -> Result<u32, AmfDecodingError> {
    if buf.remaining() < 4 {
        return Err(AmfDecodingError::InsufficientData);
    }
    Ok(buf.get_u32())
}

fn get_utf8(buf: &mut Bytes) -> Result<String, AmfDecodingError> {
    let len = get_u16(buf)? as usize;
    if buf.remaining() < len {
        return Err(AmfDecodingError::InsufficientData);
    }
    let utf8 = buf.split_to(len);
    String::from_utf8(utf8.to_vec()).map_err(|_| AmfDecodingError::InvalidUtf8)
}
