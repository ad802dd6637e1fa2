use bytes::Buf;
use tracing::debug;

use crate::{AliasTable, AmfDecodingError, amf3::*};

#[derive(Clone)]
enum Trait {
    Standard(Traits),
    Externalizable(String),
}

/// Reads AMF3 values from `buf`. Like the encoder, one state covers exactly
/// one reference scope.
pub(crate) struct Amf3DecoderState<'a, T> {
    buf: T,
    aliases: &'a AliasTable,
    strings: Vec<String>,
    traits: Vec<Trait>,
    complexes: Vec<u8>,
    /// `buf` ends exactly where the current value region ends, so unknown
    /// externalizable payloads can be captured as the remaining bytes.
    opaque_tail: bool,
    depth: usize,
}

impl<'a, T> Amf3DecoderState<'a, T>
where
    T: Buf,
{
    pub(crate) fn new(amf_buf: T, aliases: &'a AliasTable) -> Self {
        Self {
            buf: amf_buf,
            aliases,
            strings: vec![],
            traits: vec![],
            complexes: vec![],
            opaque_tail: false,
            depth: 0,
        }
    }

    pub(crate) fn with_opaque_tail(mut self, opaque_tail: bool) -> Self {
        self.opaque_tail = opaque_tail;
        self
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn decode_value(&mut self) -> Result<AmfValue, AmfDecodingError> {
        let marker = self.get_u8()?;

        match marker {
            UNDEFINED => Ok(AmfValue::Undefined),
            NULL => Ok(AmfValue::Null),
            FALSE => Ok(AmfValue::Boolean(false)),
            TRUE => Ok(AmfValue::Boolean(true)),
            INTEGER => Ok(AmfValue::Integer(self.decode_i29()?)),
            DOUBLE => Ok(AmfValue::Double(self.decode_f64()?)),
            STRING => Ok(AmfValue::String(self.decode_string_raw()?)),
            XML_DOC => self.decode_complex(XML_DOC, |decoder, size| {
                Ok(AmfValue::XmlDoc(decoder.decode_utf8(size)?))
            }),
            DATE => self.decode_complex(DATE, |decoder, _| Ok(AmfValue::Date(decoder.decode_f64()?))),
            ARRAY => self.decode_complex(ARRAY, Self::decode_array),
            OBJECT => self.decode_complex(OBJECT, Self::decode_object),
            XML => self.decode_complex(XML, |decoder, size| {
                Ok(AmfValue::Xml(decoder.decode_utf8(size)?))
            }),
            BYTE_ARRAY => self.decode_complex(BYTE_ARRAY, |decoder, size| {
                decoder.ensure_remaining(size)?;
                Ok(AmfValue::ByteArray(decoder.buf.copy_to_bytes(size)))
            }),
            VECTOR_INT => self.decode_complex(VECTOR_INT, Self::decode_int_vec),
            VECTOR_UINT => self.decode_complex(VECTOR_UINT, Self::decode_uint_vec),
            VECTOR_DOUBLE => self.decode_complex(VECTOR_DOUBLE, Self::decode_double_vec),
            VECTOR_OBJECT => self.decode_complex(VECTOR_OBJECT, Self::decode_object_vec),
            DICTIONARY => self.decode_complex(DICTIONARY, Self::decode_dictionary),
            _ => Err(AmfDecodingError::UnknownType(marker)),
        }
    }

    pub(super) fn get_u8(&mut self) -> Result<u8, AmfDecodingError> {
        if !self.buf.has_remaining() {
            return Err(AmfDecodingError::InsufficientData);
        }
        Ok(self.buf.get_u8())
    }

    fn ensure_remaining(&self, size: usize) -> Result<(), AmfDecodingError> {
        if self.buf.remaining() < size {
            return Err(AmfDecodingError::InsufficientData);
        }
        Ok(())
    }

    fn decode_f64(&mut self) -> Result<f64, AmfDecodingError> {
        self.ensure_remaining(8)?;
        Ok(self.buf.get_f64())
    }

    fn decode_utf8(&mut self, size: usize) -> Result<String, AmfDecodingError> {
        self.ensure_remaining(size)?;
        let utf8 = self.buf.copy_to_bytes(size);
        String::from_utf8(utf8.to_vec()).map_err(|_| AmfDecodingError::InvalidUtf8)
    }

    fn decode_array(&mut self, size: usize) -> Result<AmfValue, AmfDecodingError> {
        // Every dense item takes at least one byte.
        self.ensure_remaining(size)?;

        let associative = self.decode_pairs()?;
        let dense = (0..size)
            .map(|_| self.decode_value())
            .collect::<Result<_, _>>()?;

        Ok(AmfValue::Array { associative, dense })
    }

    fn decode_object(&mut self, u28: usize) -> Result<AmfValue, AmfDecodingError> {
        match self.decode_object_trait(u28)? {
            Trait::Standard(traits) => {
                let sealed = (0..traits.sealed_members.len())
                    .map(|_| self.decode_value())
                    .collect::<Result<_, _>>()?;
                let dynamic = match traits.dynamic {
                    true => self.decode_pairs()?,
                    false => vec![],
                };

                Ok(AmfValue::Object {
                    traits,
                    sealed,
                    dynamic,
                })
            }
            Trait::Externalizable(class_name) => {
                let body = self.decode_externalized(&class_name)?;
                Ok(AmfValue::Externalizable { class_name, body })
            }
        }
    }

    fn decode_externalized(&mut self, class_name: &str) -> Result<Externalized, AmfDecodingError> {
        let aliases = self.aliases;
        let canonical = aliases.resolve(class_name);
        match external_layout(canonical) {
            Some(ExternalLayout::Message(kind)) => {
                Ok(Externalized::Message(Box::new(self.decode_flex_message(kind)?)))
            }
            Some(ExternalLayout::Proxy) => Ok(Externalized::Proxy(Box::new(self.decode_value()?))),
            None if self.opaque_tail => {
                debug!(
                    class_name,
                    canonical,
                    len = self.buf.remaining(),
                    "Keeping externalizable payload of unknown class as opaque bytes"
                );
                let remaining = self.buf.remaining();
                Ok(Externalized::Opaque(self.buf.copy_to_bytes(remaining)))
            }
            None => Err(AmfDecodingError::UnknownExternalizable(class_name.to_string())),
        }
    }

    fn decode_vector_header(&mut self, item_count: usize, item_size: usize) -> Result<bool, AmfDecodingError> {
        let needed = item_count
            .checked_mul(item_size)
            .and_then(|size| size.checked_add(1))
            .ok_or(AmfDecodingError::InsufficientData)?;
        self.ensure_remaining(needed)?;
        Ok(self.buf.get_u8() == 0x01)
    }

    fn decode_int_vec(&mut self, item_count: usize) -> Result<AmfValue, AmfDecodingError> {
        let fixed_length = self.decode_vector_header(item_count, 4)?;
        let values = (0..item_count).map(|_| self.buf.get_i32()).collect();

        Ok(AmfValue::VectorInt {
            fixed_length,
            values,
        })
    }

    fn decode_uint_vec(&mut self, item_count: usize) -> Result<AmfValue, AmfDecodingError> {
        let fixed_length = self.decode_vector_header(item_count, 4)?;
        let values = (0..item_count).map(|_| self.buf.get_u32()).collect();

        Ok(AmfValue::VectorUInt {
            fixed_length,
            values,
        })
    }

    fn decode_double_vec(&mut self, item_count: usize) -> Result<AmfValue, AmfDecodingError> {
        let fixed_length = self.decode_vector_header(item_count, 8)?;
        let values = (0..item_count).map(|_| self.buf.get_f64()).collect();

        Ok(AmfValue::VectorDouble {
            fixed_length,
            values,
        })
    }

    fn decode_object_vec(&mut self, item_count: usize) -> Result<AmfValue, AmfDecodingError> {
        let fixed_length = self.decode_vector_header(item_count, 1)?;
        let class_name = self.decode_string_raw()?;
        let class_name = if class_name == "*" {
            None
        } else {
            Some(class_name)
        };

        let values = (0..item_count)
            .map(|_| self.decode_value())
            .collect::<Result<_, _>>()?;

        Ok(AmfValue::VectorObject {
            fixed_length,
            class_name,
            values,
        })
    }

    fn decode_dictionary(&mut self, entries_count: usize) -> Result<AmfValue, AmfDecodingError> {
        let weak_keys = self.decode_vector_header(entries_count, 2)?;

        let entries = (0..entries_count)
            .map(|_| -> Result<(AmfValue, AmfValue), AmfDecodingError> {
                let key = self.decode_value()?;
                let value = self.decode_value()?;
                Ok((key, value))
            })
            .collect::<Result<_, _>>()?;

        Ok(AmfValue::Dictionary { weak_keys, entries })
    }

    /// Handles the `U29X-ref`/`U29X-value` prefix shared by all complex types.
    /// New values take their object table slot before their children are
    /// decoded, matching the encoder.
    fn decode_complex<F>(&mut self, marker: u8, decode: F) -> Result<AmfValue, AmfDecodingError>
    where
        F: FnOnce(&mut Self, usize) -> Result<AmfValue, AmfDecodingError>,
    {
        let u29 = self.decode_u29()?;
        let has_value = (u29 & 0b1) == 1;
        let u28 = (u29 >> 1) as usize;

        match has_value {
            true => {
                if self.depth >= MAX_NESTING_DEPTH {
                    return Err(AmfDecodingError::MaxDepthExceeded(MAX_NESTING_DEPTH));
                }
                self.complexes.push(marker);
                self.depth += 1;
                let value = decode(self, u28);
                self.depth -= 1;
                value
            }
            false => {
                let referenced = *self
                    .complexes
                    .get(u28)
                    .ok_or(AmfDecodingError::OutOfBoundsReference)?;
                if referenced != marker {
                    return Err(AmfDecodingError::InvalidReferenceType);
                }
                Ok(AmfValue::Reference(u28 as u32))
            }
        }
    }

    // https://github.com/q191201771/doc/blob/master/spec-amf-file-format-spec.pdf
    // Sections 1.3.1 and 3.6 of the AMF3 format document describe this serialization
    fn decode_u29(&mut self) -> Result<u32, AmfDecodingError> {
        let mut result: u32 = 0;
        let mut bytes_used: usize = 0;

        let mut decode_byte = || {
            if !self.buf.has_remaining() {
                return Err(AmfDecodingError::InsufficientData);
            }

            let byte = self.buf.get_u8();
            bytes_used += 1;

            let (shift, value_mask) = match bytes_used {
                1..4 => (7, 0x7F),
                4 => (8, 0xFF),
                _ => unreachable!(),
            };

            result <<= shift;
            result |= (byte & value_mask) as u32;

            let next_byte_present = match bytes_used {
                1..4 => ((byte >> 7) & 0b1) == 1,
                4 => false,
                _ => unreachable!(),
            };
            Ok(next_byte_present)
        };

        while decode_byte()? {}

        Ok(result)
    }

    fn decode_i29(&mut self) -> Result<i32, AmfDecodingError> {
        let u29 = self.decode_u29()?;
        if u29 & (1 << 28) != 0 {
            Ok((u29 as i32) - (1 << 29))
        } else {
            Ok(u29 as i32)
        }
    }

    pub(super) fn decode_string_raw(&mut self) -> Result<String, AmfDecodingError> {
        let u29 = self.decode_u29()?;
        let has_value = (u29 & 0b1) == 1;
        let u28 = (u29 >> 1) as usize;

        let string = match has_value {
            true if u28 == 0 => String::new(),
            true => {
                let string = self.decode_utf8(u28)?;
                self.strings.push(string.clone());
                string
            }
            false => self
                .strings
                .get(u28)
                .ok_or(AmfDecodingError::OutOfBoundsReference)?
                .clone(),
        };
        Ok(string)
    }

    fn decode_pairs(&mut self) -> Result<Vec<(String, AmfValue)>, AmfDecodingError> {
        let mut pairs = vec![];
        loop {
            let key = self.decode_string_raw()?;
            if key.is_empty() {
                return Ok(pairs);
            }

            let value = self.decode_value()?;
            pairs.push((key, value));
        }
    }

    fn decode_object_trait(&mut self, u28: usize) -> Result<Trait, AmfDecodingError> {
        // https://github.com/q191201771/doc/blob/master/spec-amf-file-format-spec.pdf
        // Flags explained in section 3.12

        const TRAIT_HAS_VALUE_FLAG: usize = 0b01;
        const TRAIT_EXTERNALIZABLE_FLAG: usize = 0b10;
        const DYNAMIC_MEMBERS_FLAG: usize = 0b100;

        if (u28 & TRAIT_HAS_VALUE_FLAG) == 0 {
            let trait_idx = u28 >> 1;
            return self
                .traits
                .get(trait_idx)
                .cloned()
                .ok_or(AmfDecodingError::OutOfBoundsReference);
        }

        let class_name = self.decode_string_raw()?;
        let amf_trait = if (u28 & TRAIT_EXTERNALIZABLE_FLAG) != 0 {
            Trait::Externalizable(class_name)
        } else {
            let dynamic = (u28 & DYNAMIC_MEMBERS_FLAG) != 0;
            let sealed_members = u28 >> 3;
            // Every member name takes at least one byte.
            self.ensure_remaining(sealed_members)?;

            let sealed_members = (0..sealed_members)
                .map(|_| self.decode_string_raw())
                .collect::<Result<_, _>>()?;

            Trait::Standard(Traits {
                class_name: (!class_name.is_empty()).then_some(class_name),
                dynamic,
                sealed_members,
            })
        };

        self.traits.push(amf_trait.clone());
        Ok(amf_trait)
    }
}
