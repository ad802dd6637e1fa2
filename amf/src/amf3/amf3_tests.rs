use bytes::{Bytes, BytesMut};

use super::*;
use crate::amf3::{Amf3DecoderState, Amf3EncoderState};
use crate::{AliasTable, Amf3EncodingError, AmfDecodingError};

fn round_trip(value: &AmfValue) -> AmfValue {
    let encoded = encode_amf3(value).unwrap();
    decode_amf3(encoded, &AliasTable::default()).unwrap()
}

#[test]
fn test_string() {
    let mut encoder = Amf3EncoderState::new(BytesMut::new());
    let sample_string = AmfValue::String("kremówki".to_string());

    encoder.put_value(&sample_string).unwrap();
    let encoded_string = encoder.buf.freeze();

    let aliases = AliasTable::default();
    let mut decoder = Amf3DecoderState::new(encoded_string, &aliases);
    let decoded_string = decoder.decode_value().unwrap();

    assert_eq!(decoded_string, sample_string);
}

#[test]
fn test_integer() {
    let mut encoder = Amf3EncoderState::new(BytesMut::new());
    let sample_pos = AmfValue::Integer(2137);
    let sample_neg = AmfValue::Integer(-2137);

    encoder.put_value(&sample_pos).unwrap();
    encoder.put_value(&sample_neg).unwrap();
    let amf3_bytes = encoder.buf.freeze();

    let aliases = AliasTable::default();
    let mut decoder = Amf3DecoderState::new(amf3_bytes, &aliases);
    let decoded_pos = decoder.decode_value().unwrap();
    let decoded_neg = decoder.decode_value().unwrap();

    assert_eq!(decoded_pos, sample_pos);
    assert_eq!(decoded_neg, sample_neg);
}

#[test]
fn test_integer_boundaries() {
    assert_eq!(round_trip(&AmfValue::Integer(I29_MAX)), AmfValue::Integer(I29_MAX));
    assert_eq!(round_trip(&AmfValue::Integer(I29_MIN)), AmfValue::Integer(I29_MIN));
    assert_eq!(
        round_trip(&AmfValue::Integer(I29_MAX + 1)),
        AmfValue::Double((I29_MAX + 1) as f64)
    );
    assert_eq!(
        round_trip(&AmfValue::Integer(I29_MIN - 1)),
        AmfValue::Double((I29_MIN - 1) as f64)
    );
    assert_eq!(AmfValue::integer(1 << 40), AmfValue::Double((1i64 << 40) as f64));
}

#[test]
fn test_array() {
    let associative = vec![
        ("Integer".to_string(), AmfValue::Integer(2137)),
        ("String".to_string(), AmfValue::String("kremówki".to_string())),
    ];
    let dense = vec![AmfValue::Xml("Sample XML".to_string())];
    let amf_array = AmfValue::Array { associative, dense };

    assert_eq!(round_trip(&amf_array), amf_array);
}

#[test]
fn test_xml_and_xml_doc() {
    let mut encoder = Amf3EncoderState::new(BytesMut::new());
    let xml = AmfValue::Xml("Sample XML".to_string());
    let xml_doc = AmfValue::XmlDoc("Sample XML doc".to_string());

    encoder.put_value(&xml).unwrap();
    encoder.put_value(&xml_doc).unwrap();
    let amf3_values = encoder.buf.freeze();

    let aliases = AliasTable::default();
    let mut decoder = Amf3DecoderState::new(amf3_values, &aliases);
    let decoded_xml = decoder.decode_value().unwrap();
    let decoded_xml_doc = decoder.decode_value().unwrap();

    assert_eq!(decoded_xml, xml);
    assert_eq!(decoded_xml_doc, xml_doc);
}

#[test]
fn test_object() {
    let object = AmfValue::Object {
        traits: Traits::typed("com.example.Point", vec!["x".to_string(), "y".to_string()]),
        sealed: vec![AmfValue::Integer(1), AmfValue::Double(2.5)],
        dynamic: vec![],
    };
    assert_eq!(round_trip(&object), object);

    let anonymous = AmfValue::Object {
        traits: Traits::anonymous(),
        sealed: vec![],
        dynamic: vec![
            ("name".to_string(), AmfValue::from("widget")),
            ("count".to_string(), AmfValue::from(3)),
        ],
    };
    assert_eq!(round_trip(&anonymous), anonymous);
}

#[test]
fn test_traits_and_strings_are_sent_once() {
    let point = |x: i32| AmfValue::Object {
        traits: Traits::typed("Point", vec!["x".to_string()]),
        sealed: vec![AmfValue::Integer(x)],
        dynamic: vec![],
    };
    let array = AmfValue::Array {
        associative: vec![],
        dense: vec![point(1), point(2)],
    };

    let encoded = encode_amf3(&array).unwrap();
    let expected: &[u8] = &[
        ARRAY, 0x05, 0x01, // two dense items, no associative part
        OBJECT, 0x13, 0x0B, b'P', b'o', b'i', b'n', b't', 0x03, b'x', INTEGER, 0x01,
        OBJECT, 0x01, INTEGER, 0x02, // traits reference 0
    ];
    assert_eq!(encoded.as_ref(), expected);
    assert_eq!(decode_amf3(encoded, &AliasTable::default()).unwrap(), array);
}

#[test]
fn test_date_byte_array_and_vectors() {
    let values = [
        AmfValue::Date(1_700_000_000_000.0),
        AmfValue::ByteArray(Bytes::from_static(&[0, 1, 2, 0xFF])),
        AmfValue::VectorInt {
            fixed_length: false,
            values: vec![-1, 0, i32::MAX],
        },
        AmfValue::VectorUInt {
            fixed_length: true,
            values: vec![0, u32::MAX],
        },
        AmfValue::VectorDouble {
            fixed_length: false,
            values: vec![0.5, -1e300],
        },
        AmfValue::VectorObject {
            fixed_length: false,
            class_name: Some("com.example.Item".to_string()),
            values: vec![AmfValue::Null, AmfValue::from("a")],
        },
        AmfValue::VectorObject {
            fixed_length: true,
            class_name: None,
            values: vec![],
        },
        AmfValue::Dictionary {
            weak_keys: false,
            entries: vec![(AmfValue::from(1), AmfValue::from("one"))],
        },
    ];

    for value in values {
        assert_eq!(round_trip(&value), value);
    }
}

#[test]
fn test_shared_and_cyclic_references() {
    // Array containing the same object twice, then the array itself.
    let shared = AmfValue::Array {
        associative: vec![],
        dense: vec![
            AmfValue::Object {
                traits: Traits::anonymous(),
                sealed: vec![],
                dynamic: vec![("self".to_string(), AmfValue::Reference(1))],
            },
            AmfValue::Reference(1),
            AmfValue::Reference(0),
        ],
    };

    let encoded = encode_amf3(&shared).unwrap();
    assert_eq!(
        decode_amf3(encoded, &AliasTable::default()).unwrap(),
        shared
    );
}

#[test]
fn test_reference_to_unknown_slot_fails_to_encode() {
    let dangling = AmfValue::Array {
        associative: vec![],
        dense: vec![AmfValue::Reference(1)],
    };
    assert_eq!(
        encode_amf3(&dangling),
        Err(Amf3EncodingError::OutOfBoundsReference(1).into())
    );
}

#[test]
fn test_sealed_count_mismatch() {
    let object = AmfValue::Object {
        traits: Traits::typed("Point", vec!["x".to_string(), "y".to_string()]),
        sealed: vec![AmfValue::Integer(1)],
        dynamic: vec![],
    };
    assert_eq!(
        encode_amf3(&object),
        Err(Amf3EncodingError::SealedCountMismatch {
            expected: 2,
            actual: 1
        }
        .into())
    );
}

#[test]
fn test_truncated_input() {
    let encoded = encode_amf3(&AmfValue::from("some longer string")).unwrap();
    let truncated = encoded.slice(..encoded.len() - 3);
    assert_eq!(
        decode_amf3(truncated, &AliasTable::default()),
        Err(AmfDecodingError::InsufficientData)
    );
    assert_eq!(
        decode_amf3(Bytes::new(), &AliasTable::default()),
        Err(AmfDecodingError::InsufficientData)
    );
}

#[test]
fn test_command_message_through_alias() {
    let message = FlexMessage::new(FlexMessageKind::Command)
        .with_field(MessageField::MessageId, AmfValue::from("ABC-123"))
        .with_field(MessageField::Timestamp, AmfValue::Integer(0))
        .with_field(MessageField::Headers, AmfValue::Object {
            traits: Traits::anonymous(),
            sealed: vec![],
            dynamic: vec![("DSId".to_string(), AmfValue::from("nil"))],
        })
        .with_field(MessageField::ClientIdBytes, AmfValue::ByteArray(Bytes::from_static(&[7; 16])))
        .with_field(MessageField::Operation, AmfValue::Integer(5));
    let value = AmfValue::Externalizable {
        class_name: "DSC".to_string(),
        body: Externalized::Message(Box::new(message)),
    };

    let encoded = encode_amf3(&value).unwrap();
    assert_eq!(&encoded[..2], &[OBJECT, 0x07]);

    let aliases = AliasTable::with_defaults();
    assert_eq!(decode_amf3(encoded.clone(), &aliases).unwrap(), value);

    // Without the alias the layout is unknown, the payload is kept verbatim.
    let decoded = decode_amf3(encoded.clone(), &AliasTable::default()).unwrap();
    let AmfValue::Externalizable {
        class_name,
        body: Externalized::Opaque(payload),
    } = &decoded
    else {
        panic!("expected opaque externalizable, got {decoded:?}");
    };
    assert_eq!(class_name, "DSC");
    assert_eq!(encode_amf3(&decoded).unwrap(), encoded);
    assert!(!payload.is_empty());
}

#[test]
fn test_acknowledge_message_flags() {
    let message = FlexMessage::new(FlexMessageKind::Acknowledge)
        .with_field(MessageField::Body, AmfValue::Null)
        .with_field(MessageField::CorrelationId, AmfValue::from("req-1"));
    let value = AmfValue::Externalizable {
        class_name: "flex.messaging.messages.AcknowledgeMessage".to_string(),
        body: Externalized::Message(Box::new(message)),
    };

    let encoded = encode_amf3(&value).unwrap();
    let class_len = "flex.messaging.messages.AcknowledgeMessage".len();
    let body = &encoded[3 + class_len..];
    assert_eq!(
        body,
        &[
            0x01, NULL, // abstract layer: body
            0x01, STRING, 0x0B, b'r', b'e', b'q', b'-', b'1', // async layer: correlationId
            0x00, // acknowledge layer
        ]
    );
    assert_eq!(decode_amf3(encoded, &AliasTable::default()).unwrap(), value);
}

#[test]
fn test_unknown_message_flags_are_skipped() {
    let aliases = AliasTable::default();
    let class_name = b"flex.messaging.messages.AsyncMessage";
    let mut bytes = vec![OBJECT, 0x07, ((class_name.len() << 1) | 1) as u8];
    bytes.extend_from_slice(class_name);
    bytes.extend_from_slice(&[
        0x81, 0x04, // abstract layer: body, then second byte with unknown bit 2
        TRUE, // body
        STRING, 0x03, b'x', // unknown field
        0x00, // async layer
    ]);

    let decoded = decode_amf3(Bytes::from(bytes), &aliases).unwrap();
    let expected = AmfValue::Externalizable {
        class_name: String::from_utf8_lossy(class_name).to_string(),
        body: Externalized::Message(Box::new(
            FlexMessage::new(FlexMessageKind::Async)
                .with_field(MessageField::Body, AmfValue::Boolean(true)),
        )),
    };
    assert_eq!(decoded, expected);
}

#[test]
fn test_field_outside_layout_fails_to_encode() {
    let message = FlexMessage::new(FlexMessageKind::Async)
        .with_field(MessageField::Operation, AmfValue::Integer(5));
    let value = AmfValue::Externalizable {
        class_name: "DSA".to_string(),
        body: Externalized::Message(Box::new(message)),
    };
    assert_eq!(
        encode_amf3(&value),
        Err(Amf3EncodingError::MessageFieldNotInLayout {
            field: "operation",
            kind: "AsyncMessage"
        }
        .into())
    );
}

#[test]
fn test_array_collection_proxy() {
    let value = AmfValue::Externalizable {
        class_name: "flex.messaging.io.ArrayCollection".to_string(),
        body: Externalized::Proxy(Box::new(AmfValue::Array {
            associative: vec![],
            dense: vec![AmfValue::from("a"), AmfValue::from("b")],
        })),
    };
    assert_eq!(round_trip(&value), value);
}

#[test]
fn test_unknown_externalizable_inside_unbounded_stream() {
    let value = AmfValue::Externalizable {
        class_name: "com.example.Custom".to_string(),
        body: Externalized::Opaque(Bytes::from_static(&[1, 2, 3])),
    };
    let encoded = encode_amf3(&value).unwrap();

    let aliases = AliasTable::default();
    let mut decoder = Amf3DecoderState::new(encoded, &aliases);
    assert_eq!(
        decoder.decode_value(),
        Err(AmfDecodingError::UnknownExternalizable(
            "com.example.Custom".to_string()
        ))
    );
}

fn nested_arrays(depth: usize) -> AmfValue {
    (0..depth).fold(AmfValue::Null, |inner, _| AmfValue::Array {
        associative: vec![],
        dense: vec![inner],
    })
}

#[test]
fn test_nesting_depth_limit() {
    let deepest = nested_arrays(MAX_NESTING_DEPTH);
    assert_eq!(round_trip(&deepest), deepest);

    assert_eq!(
        encode_amf3(&nested_arrays(MAX_NESTING_DEPTH + 1)),
        Err(Amf3EncodingError::MaxDepthExceeded(MAX_NESTING_DEPTH).into())
    );
}

#[test]
fn test_deeply_nested_input_is_rejected() {
    // Array of one dense item, no associative part, repeated far past the limit.
    let mut encoded = [ARRAY, 0x03, 0x01].repeat(100_000);
    encoded.push(NULL);

    assert_eq!(
        decode_amf3(Bytes::from(encoded), &AliasTable::default()),
        Err(AmfDecodingError::MaxDepthExceeded(MAX_NESTING_DEPTH))
    );
}
