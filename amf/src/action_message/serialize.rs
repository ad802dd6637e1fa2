use bytes::{BufMut, Bytes, BytesMut};

use crate::{AmfEncodingError, AmfValue, encode_amf3};

use super::{AMF0_SWITCH_TO_AMF3, ActionMessage, UNKNOWN_LENGTH};

impl ActionMessage {
    /// Serializes the message into an HTTP request/response body. Every header
    /// and body value is written with its own AMF3 reference tables.
    pub fn serialize(&self) -> Result<Bytes, AmfEncodingError> {
        let mut buf = BytesMut::new();
        buf.put_u16(self.version);

        let header_count = u16::try_from(self.headers.len())
            .map_err(|_| AmfEncodingError::TooManyHeaders(self.headers.len()))?;
        buf.put_u16(header_count);
        for header in &self.headers {
            put_utf8(&mut buf, &header.name)?;
            buf.put_u8(header.must_understand as u8);
            put_value(&mut buf, &header.value)?;
        }

        let body_count = u16::try_from(self.bodies.len())
            .map_err(|_| AmfEncodingError::TooManyBodies(self.bodies.len()))?;
        buf.put_u16(body_count);
        for body in &self.bodies {
            put_utf8(&mut buf, &body.target_uri)?;
            put_utf8(&mut buf, &body.response_uri)?;
            put_value(&mut buf, &body.value)?;
        }

        Ok(buf.freeze())
    }
}

fn put_utf8(buf: &mut BytesMut, s: &str) -> Result<(), AmfEncodingError> {
    let len = u16::try_from(s.len()).map_err(|_| AmfEncodingError::StringTooLong(s.len()))?;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_value(buf: &mut BytesMut, value: &AmfValue) -> Result<(), AmfEncodingError> {
    let encoded = encode_amf3(value)?;

    // Length covers the AMF0 switch marker too.
    let total = encoded.len() + 1;
    let len = u32::try_from(total)
        .ok()
        .filter(|len| *len != UNKNOWN_LENGTH)
        .ok_or(AmfEncodingError::ValueTooLarge(total))?;
    buf.put_u32(len);
    buf.put_u8(AMF0_SWITCH_TO_AMF3);
    buf.put_slice(&encoded);
    Ok(())
}
