use std::collections::HashMap;

use bytes::{BufMut, Bytes};

use crate::{Amf3EncodingError, AmfEncodingError, amf3::*};

const U28_MAX: u32 = (1 << 28) - 1;

const MAX_SEALED_COUNT: u32 = (1 << 25) - 1;

#[derive(PartialEq, Eq, Hash)]
enum TraitsKey {
    Standard(Traits),
    Externalizable(String),
}

/// Writes AMF3 values into `buf`. String, traits and object tables live as
/// long as the state, so one state must be used per top-level value.
pub(crate) struct Amf3EncoderState<T> {
    pub(super) buf: T,
    strings: HashMap<String, u32>,
    traits: HashMap<TraitsKey, u32>,
    complexes: Vec<u8>,
    depth: usize,
}

impl<T> Amf3EncoderState<T>
where
    T: BufMut,
{
    pub(crate) fn new(buf: T) -> Self {
        Self {
            buf,
            strings: HashMap::new(),
            traits: HashMap::new(),
            complexes: vec![],
            depth: 0,
        }
    }

    /// Writes one value. Complex values may nest at most
    /// [`MAX_NESTING_DEPTH`] levels deep.
    pub(crate) fn put_value(&mut self, amf3_value: &AmfValue) -> Result<(), AmfEncodingError> {
        if !amf3_value.is_complex() {
            return self.put_any_value(amf3_value);
        }
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(Amf3EncodingError::MaxDepthExceeded(MAX_NESTING_DEPTH).into());
        }
        self.depth += 1;
        let result = self.put_any_value(amf3_value);
        self.depth -= 1;
        result
    }

    fn put_any_value(&mut self, amf3_value: &AmfValue) -> Result<(), AmfEncodingError> {
        match amf3_value {
            AmfValue::Undefined => self.put_marker(UNDEFINED),
            AmfValue::Null => self.put_marker(NULL),
            AmfValue::Boolean(b) => self.put_boolean(*b),
            AmfValue::Integer(i) => self.put_integer(*i)?,
            AmfValue::Double(d) => self.put_double(*d),
            AmfValue::String(s) => self.put_string(s)?,
            AmfValue::XmlDoc(xd) => self.put_xml(XML_DOC, xd)?,
            AmfValue::Date(d) => self.put_date(*d)?,
            AmfValue::Array { associative, dense } => self.put_array(associative, dense)?,
            AmfValue::Object {
                traits,
                sealed,
                dynamic,
            } => self.put_object(traits, sealed, dynamic)?,
            AmfValue::Xml(x) => self.put_xml(XML, x)?,
            AmfValue::ByteArray(ba) => self.put_byte_array(ba)?,
            AmfValue::VectorInt {
                fixed_length,
                values,
            } => self.put_vector_int(*fixed_length, values)?,
            AmfValue::VectorUInt {
                fixed_length,
                values,
            } => self.put_vector_uint(*fixed_length, values)?,
            AmfValue::VectorDouble {
                fixed_length,
                values,
            } => self.put_vector_double(*fixed_length, values)?,
            AmfValue::VectorObject {
                fixed_length,
                class_name,
                values,
            } => self.put_vector_object(*fixed_length, class_name.as_ref(), values)?,
            AmfValue::Dictionary { weak_keys, entries } => {
                self.put_dictionary(*weak_keys, entries)?
            }
            AmfValue::Externalizable { class_name, body } => {
                self.put_externalizable(class_name, body)?
            }
            AmfValue::Reference(idx) => self.put_reference(*idx)?,
        }
        Ok(())
    }

    pub(super) fn put_u8(&mut self, byte: u8) {
        self.buf.put_u8(byte);
    }

    fn put_marker(&mut self, marker: u8) {
        self.buf.put_u8(marker);
    }

    fn put_boolean(&mut self, b: bool) {
        match b {
            false => self.put_marker(FALSE),
            true => self.put_marker(TRUE),
        }
    }

    fn put_integer(&mut self, i29: i32) -> Result<(), AmfEncodingError> {
        if !(I29_MIN..=I29_MAX).contains(&i29) {
            self.put_double(i29 as f64);
            return Ok(());
        }

        self.put_marker(INTEGER);
        let u29 = (i29 as u32) & 0x1F_FF_FF_FF;
        self.put_u29(u29)
    }

    fn put_double(&mut self, d: f64) {
        self.put_marker(DOUBLE);
        self.buf.put_f64(d);
    }

    fn put_string(&mut self, s: &str) -> Result<(), AmfEncodingError> {
        self.put_marker(STRING);
        self.put_string_raw(s)
    }

    /// Writes `U29S-ref` when the string was already written, the full string
    /// otherwise. Empty strings never enter the table.
    pub(super) fn put_string_raw(&mut self, s: &str) -> Result<(), AmfEncodingError> {
        if s.is_empty() {
            return self.put_u29(0b1);
        }
        if let Some(&idx) = self.strings.get(s) {
            return self.put_u29(idx << 1);
        }
        if s.len() > U28_MAX as usize {
            return Err(Amf3EncodingError::StringTooLong(s.len()).into());
        }

        self.put_u29(((s.len() as u32) << 1) | 0b1)?;
        self.buf.put_slice(s.as_bytes());
        let idx = self.strings.len() as u32;
        self.strings.insert(s.to_string(), idx);
        Ok(())
    }

    /// Reserves the next object table slot for a complex value.
    fn register_complex(&mut self, marker: u8) {
        self.complexes.push(marker);
    }

    fn put_reference(&mut self, idx: u32) -> Result<(), AmfEncodingError> {
        let marker = *self
            .complexes
            .get(idx as usize)
            .ok_or(Amf3EncodingError::OutOfBoundsReference(idx))?;
        self.put_marker(marker);
        self.put_u29(idx << 1)
    }

    fn put_xml(&mut self, marker: u8, x: &str) -> Result<(), AmfEncodingError> {
        if x.len() > U28_MAX as usize {
            return Err(Amf3EncodingError::StringTooLong(x.len()).into());
        }
        self.put_marker(marker);
        self.register_complex(marker);
        self.put_u29(((x.len() as u32) << 1) | 0b1)?;
        self.buf.put_slice(x.as_bytes());
        Ok(())
    }

    fn put_date(&mut self, d: f64) -> Result<(), AmfEncodingError> {
        self.put_marker(DATE);
        self.register_complex(DATE);

        // For date the only necessary information is if it is a value (`U29D` set to 1). Remaining
        // bits are insignificant, they are set to 0 so the whole value is encoded in 1 byte
        // only.
        self.put_u29(1)?;
        self.buf.put_f64(d);
        Ok(())
    }

    fn put_array(
        &mut self,
        associative: &[(String, AmfValue)],
        dense: &[AmfValue],
    ) -> Result<(), AmfEncodingError> {
        if dense.len() > U28_MAX as usize {
            return Err(Amf3EncodingError::ArrayTooLong(dense.len()).into());
        }

        self.put_marker(ARRAY);
        self.register_complex(ARRAY);
        self.put_u29(((dense.len() as u32) << 1) | 0b1)?;
        self.put_pairs(associative)?;
        for val in dense {
            self.put_value(val)?;
        }
        Ok(())
    }

    /// Name/value pairs closed by the empty string.
    fn put_pairs(&mut self, pairs: &[(String, AmfValue)]) -> Result<(), AmfEncodingError> {
        for (k, v) in pairs {
            if k.is_empty() {
                return Err(Amf3EncodingError::EmptyMemberName.into());
            }
            self.put_string_raw(k)?;
            self.put_value(v)?;
        }
        self.put_string_raw("")
    }

    fn put_object(
        &mut self,
        traits: &Traits,
        sealed: &[AmfValue],
        dynamic: &[(String, AmfValue)],
    ) -> Result<(), AmfEncodingError> {
        let sealed_count = traits.sealed_members.len();
        if sealed_count > MAX_SEALED_COUNT as usize {
            return Err(Amf3EncodingError::SealedMembersCountTooLarge(sealed_count).into());
        }
        if sealed_count != sealed.len() {
            return Err(Amf3EncodingError::SealedCountMismatch {
                expected: sealed_count,
                actual: sealed.len(),
            }
            .into());
        }
        if !traits.dynamic && !dynamic.is_empty() {
            return Err(Amf3EncodingError::DynamicMembersOnSealedObject(dynamic.len()).into());
        }

        self.put_marker(OBJECT);
        self.register_complex(OBJECT);

        let key = TraitsKey::Standard(traits.clone());
        match self.traits.get(&key) {
            Some(&idx) => self.put_u29((idx << 2) | 0b01)?,
            None => {
                let mut u29o = ((sealed_count as u32) << 4) | 0b0011;
                if traits.dynamic {
                    u29o |= 0b1000;
                }
                self.put_u29(u29o)?;
                self.put_string_raw(traits.class_name.as_deref().unwrap_or(""))?;
                for name in &traits.sealed_members {
                    self.put_string_raw(name)?;
                }
                let idx = self.traits.len() as u32;
                self.traits.insert(key, idx);
            }
        }

        for v in sealed {
            self.put_value(v)?;
        }

        if traits.dynamic {
            self.put_pairs(dynamic)?;
        }

        Ok(())
    }

    fn put_externalizable(
        &mut self,
        class_name: &str,
        body: &Externalized,
    ) -> Result<(), AmfEncodingError> {
        self.put_marker(OBJECT);
        self.register_complex(OBJECT);

        let key = TraitsKey::Externalizable(class_name.to_string());
        match self.traits.get(&key) {
            Some(&idx) => self.put_u29((idx << 2) | 0b01)?,
            None => {
                self.put_u29(0b0111)?;
                self.put_string_raw(class_name)?;
                let idx = self.traits.len() as u32;
                self.traits.insert(key, idx);
            }
        }

        match body {
            Externalized::Message(message) => self.put_flex_message(message),
            Externalized::Proxy(value) => self.put_value(value),
            Externalized::Opaque(bytes) => {
                self.buf.put_slice(bytes);
                Ok(())
            }
        }
    }

    fn put_byte_array(&mut self, ba: &Bytes) -> Result<(), AmfEncodingError> {
        if ba.len() > U28_MAX as usize {
            return Err(Amf3EncodingError::ArrayTooLong(ba.len()).into());
        }

        self.put_marker(BYTE_ARRAY);
        self.register_complex(BYTE_ARRAY);
        self.put_u29(((ba.len() as u32) << 1) | 0b1)?;
        self.buf.put_slice(ba);
        Ok(())
    }

    fn put_vector_header(
        &mut self,
        marker: u8,
        len: usize,
        fixed_length: bool,
    ) -> Result<(), AmfEncodingError> {
        if len > U28_MAX as usize {
            return Err(Amf3EncodingError::VectorTooLong(len).into());
        }

        self.put_marker(marker);
        self.register_complex(marker);
        self.put_u29(((len as u32) << 1) | 0b1)?;
        self.buf.put_u8(fixed_length.into());
        Ok(())
    }

    fn put_vector_int(&mut self, fixed_length: bool, values: &[i32]) -> Result<(), AmfEncodingError> {
        self.put_vector_header(VECTOR_INT, values.len(), fixed_length)?;
        for int in values {
            self.buf.put_i32(*int);
        }
        Ok(())
    }

    fn put_vector_uint(
        &mut self,
        fixed_length: bool,
        values: &[u32],
    ) -> Result<(), AmfEncodingError> {
        self.put_vector_header(VECTOR_UINT, values.len(), fixed_length)?;
        for uint in values {
            self.buf.put_u32(*uint);
        }
        Ok(())
    }

    fn put_vector_double(
        &mut self,
        fixed_length: bool,
        values: &[f64],
    ) -> Result<(), AmfEncodingError> {
        self.put_vector_header(VECTOR_DOUBLE, values.len(), fixed_length)?;
        for double in values {
            self.buf.put_f64(*double);
        }
        Ok(())
    }

    fn put_vector_object(
        &mut self,
        fixed_length: bool,
        class_name: Option<&String>,
        values: &[AmfValue],
    ) -> Result<(), AmfEncodingError> {
        self.put_vector_header(VECTOR_OBJECT, values.len(), fixed_length)?;
        match class_name {
            Some(name) => self.put_string_raw(name)?,
            None => self.put_string_raw("*")?,
        }
        for obj in values {
            self.put_value(obj)?;
        }
        Ok(())
    }

    fn put_dictionary(
        &mut self,
        weak_keys: bool,
        entries: &[(AmfValue, AmfValue)],
    ) -> Result<(), AmfEncodingError> {
        if entries.len() > U28_MAX as usize {
            return Err(Amf3EncodingError::DictionaryTooLong(entries.len()).into());
        }

        self.put_marker(DICTIONARY);
        self.register_complex(DICTIONARY);
        self.put_u29(((entries.len() as u32) << 1) | 0b1)?;
        self.buf.put_u8(weak_keys.into());
        for (key, value) in entries {
            self.put_value(key)?;
            self.put_value(value)?;
        }
        Ok(())
    }

    fn put_u29(&mut self, u29: u32) -> Result<(), AmfEncodingError> {
        let bytes = self.encode_u29(u29)?;
        self.buf.put_slice(&bytes);
        Ok(())
    }

    fn encode_u29(&self, mut u29: u32) -> Result<Bytes, AmfEncodingError> {
        const ONE_BYTE_MAX: u32 = 2u32.pow(7) - 1;
        const TWO_BYTE_MAX: u32 = 2u32.pow(14) - 1;
        const THREE_BYTE_MAX: u32 = 2u32.pow(21) - 1;
        const FOUR_BYTE_MAX: u32 = 2u32.pow(29) - 1;

        let n_bytes: usize = match u29 {
            n if n <= ONE_BYTE_MAX => 1,
            n if n <= TWO_BYTE_MAX => 2,
            n if n <= THREE_BYTE_MAX => 3,
            n if n <= FOUR_BYTE_MAX => 4,
            _ => {
                return Err(Amf3EncodingError::OutOfRangeU29.into());
            }
        };

        match n_bytes {
            1 => {
                let first = (u29 & 0x7F) as u8;
                Ok(Bytes::from_iter([first]))
            }
            2 => {
                let second = (u29 & 0x7F) as u8;
                u29 >>= 7;
                let first = 0x80 | (u29 & 0x7F) as u8;
                Ok(Bytes::from_iter([first, second]))
            }
            3 => {
                let third = (u29 & 0x7F) as u8;
                u29 >>= 7;
                let second = 0x80 | (u29 & 0x7F) as u8;
                u29 >>= 7;
                let first = 0x80 | (u29 & 0x7F) as u8;

                Ok(Bytes::from_iter([first, second, third]))
            }
            4 => {
                let fourth = (u29 & 0xFF) as u8;
                u29 >>= 8;
                let third = 0x80 | (u29 & 0x7F) as u8;
                u29 >>= 7;
                let second = 0x80 | (u29 & 0x7F) as u8;
                u29 >>= 7;
                let first = 0x80 | (u29 & 0x7F) as u8;
                Ok(Bytes::from_iter([first, second, third, fourth]))
            }
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod encode_test {
    use bytes::{Bytes, BytesMut};

    use crate::amf3::encoding::Amf3EncoderState;
    use crate::amf3::{AmfValue, DOUBLE, INTEGER, STRING};

    #[test]
    fn encode_u29_test() {
        let encoder = Amf3EncoderState::new(BytesMut::new());

        let one_byte = 105;
        let expected = Bytes::from_iter([0b01101001]);
        let actual = encoder.encode_u29(one_byte).unwrap();
        assert_eq!(actual.len(), 1);
        assert_eq!(actual, expected);

        let two_byte = 2137;
        let expected = Bytes::from_iter([0b10010000, 0b01011001]);
        let actual = encoder.encode_u29(two_byte).unwrap();
        assert_eq!(actual.len(), 2);
        assert_eq!(actual, expected);

        let three_byte = 1_002_137;
        let expected = Bytes::from_iter([0b10111101, 0b10010101, 0b00011001]);
        let actual = encoder.encode_u29(three_byte).unwrap();
        assert_eq!(actual.len(), 3);
        assert_eq!(actual, expected);

        let four_byte = 21_372_137;
        let expected = Bytes::from_iter([0b10000101, 0b10001100, 0b10011100, 0b11101001]);
        let actual = encoder.encode_u29(four_byte).unwrap();
        assert_eq!(actual.len(), 4);
        assert_eq!(actual, expected);

        assert!(encoder.encode_u29(1 << 29).is_err());
    }

    #[test]
    fn encode_integer_test() {
        let mut encoder = Amf3EncoderState::new(BytesMut::new());
        encoder.put_integer(-2137).unwrap();
        let expected = Bytes::from_iter([INTEGER, 0b11111111, 0b11111111, 0b11110111, 0b10100111]);
        let actual = encoder.buf.freeze();
        assert_eq!(actual, expected);

        let mut encoder = Amf3EncoderState::new(BytesMut::new());
        encoder.put_integer(-(1 << 28)).unwrap();
        let expected = Bytes::from_iter([INTEGER, 0b11000000, 0b10000000, 0b10000000, 0b00000000]);
        let actual = encoder.buf.freeze();
        assert_eq!(actual, expected);
    }

    #[test]
    fn encode_out_of_range_integer_as_double_test() {
        let mut encoder = Amf3EncoderState::new(BytesMut::new());

        let too_large = (1 << 28) + 3;
        encoder.put_integer(too_large).unwrap();
        let actual = encoder.buf.freeze();

        let mut expected = vec![DOUBLE];
        expected.extend_from_slice(&(too_large as f64).to_be_bytes());
        assert_eq!(actual, Bytes::from(expected));
    }

    #[test]
    fn encode_repeated_string_as_reference_test() {
        let mut encoder = Amf3EncoderState::new(BytesMut::new());
        encoder.put_value(&AmfValue::from("abc")).unwrap();
        encoder.put_value(&AmfValue::from("abc")).unwrap();
        encoder.put_value(&AmfValue::from("")).unwrap();
        encoder.put_value(&AmfValue::from("")).unwrap();

        let expected = Bytes::from_iter([
            STRING, 0b0000_0111, b'a', b'b', b'c', // full string, length 3
            STRING, 0b0000_0000, // reference to string 0
            STRING, 0b0000_0001, // empty string, never referenced
            STRING, 0b0000_0001,
        ]);
        assert_eq!(encoder.buf.freeze(), expected);
    }

    #[test]
    fn encode_reference_out_of_bounds_test() {
        let mut encoder = Amf3EncoderState::new(BytesMut::new());
        let err = encoder.put_value(&AmfValue::Reference(0)).unwrap_err();
        assert!(err.to_string().contains("Reference 0"));
    }
}
