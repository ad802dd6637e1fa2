use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    AliasTable, AmfDecodingError, AmfValue, Externalized, FlexMessage, FlexMessageKind, Traits,
    amf3::MessageField,
};

use super::{ActionMessage, MessageBody, MessageHeader};

fn remoting_message(operation: &str) -> AmfValue {
    AmfValue::Object {
        traits: Traits::typed(
            "flex.messaging.messages.RemotingMessage",
            vec![
                "operation".to_string(),
                "destination".to_string(),
                "body".to_string(),
            ],
        ),
        sealed: vec![
            AmfValue::from(operation),
            AmfValue::from("echoService"),
            AmfValue::Array {
                associative: vec![],
                dense: vec![AmfValue::from("hello")],
            },
        ],
        dynamic: vec![],
    }
}

fn sample_message() -> ActionMessage {
    ActionMessage {
        version: 3,
        headers: vec![MessageHeader {
            name: "DSId".to_string(),
            must_understand: false,
            value: AmfValue::from("nil"),
        }],
        bodies: vec![MessageBody {
            target_uri: "null".to_string(),
            response_uri: "/1".to_string(),
            value: AmfValue::Array {
                associative: vec![],
                dense: vec![remoting_message("echo")],
            },
        }],
    }
}

#[test]
fn test_version_marker() {
    let bytes = sample_message().serialize().unwrap();
    assert_eq!(&bytes[..2], &[0x00, 0x03]);
    // Header count.
    assert_eq!(&bytes[2..4], &[0x00, 0x01]);
}

#[test]
fn test_round_trip_is_byte_identical() {
    let message = sample_message();
    let bytes = message.serialize().unwrap();

    let parsed = ActionMessage::parse(bytes.clone(), &AliasTable::with_defaults()).unwrap();
    assert_eq!(parsed, message);
    assert_eq!(parsed.serialize().unwrap(), bytes);
}

#[test]
fn test_each_value_has_own_reference_scope() {
    let mut message = sample_message();
    message.bodies.push(MessageBody {
        target_uri: "null".to_string(),
        response_uri: "/2".to_string(),
        value: remoting_message("echo"),
    });

    let bytes = message.serialize().unwrap();
    let parsed = ActionMessage::parse(bytes, &AliasTable::default()).unwrap();
    // The repeated traits and strings are written in full again in the second body.
    assert_eq!(parsed.bodies[1].value, remoting_message("echo"));
}

#[test]
fn test_unknown_alias_degrades_gracefully() {
    let command = FlexMessage::new(FlexMessageKind::Command)
        .with_field(MessageField::Operation, AmfValue::Integer(5))
        .with_field(MessageField::MessageId, AmfValue::from("id-1"));
    let unknown = AmfValue::Externalizable {
        class_name: "DSC".to_string(),
        body: Externalized::Message(Box::new(command)),
    };

    let mut message = sample_message();
    message.bodies.insert(
        0,
        MessageBody {
            target_uri: "/0/onResult".to_string(),
            response_uri: "".to_string(),
            value: unknown.clone(),
        },
    );
    let bytes = message.serialize().unwrap();

    // No aliases registered: DSC has no known layout.
    let parsed = ActionMessage::parse(bytes.clone(), &AliasTable::default()).unwrap();
    assert_eq!(parsed.bodies.len(), 2);
    assert!(matches!(
        &parsed.bodies[0].value,
        AmfValue::Externalizable {
            class_name,
            body: Externalized::Opaque(_),
        } if class_name == "DSC"
    ));
    assert_eq!(parsed.bodies[1], message.bodies[1]);
    assert_eq!(parsed.headers, message.headers);
    assert_eq!(parsed.serialize().unwrap(), bytes);

    let parsed = ActionMessage::parse(bytes, &AliasTable::with_defaults()).unwrap();
    assert_eq!(parsed.bodies[0].value, unknown);
}

fn put_utf8(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

#[test]
fn test_amf0_values_and_unknown_length() {
    let mut buf = BytesMut::new();
    buf.put_u16(0);
    buf.put_u16(2);
    buf.put_u16(1);

    put_utf8(&mut buf, "flag");
    buf.put_u8(1);
    buf.put_u32(2);
    buf.put_slice(&[0x01, 0x01]); // AMF0 boolean true

    put_utf8(&mut buf, "count");
    buf.put_u8(0);
    buf.put_u32(u32::MAX);
    buf.put_u8(0x00); // AMF0 number
    buf.put_f64(42.0);

    put_utf8(&mut buf, "/1/onResult");
    put_utf8(&mut buf, "");
    buf.put_u32(u32::MAX);
    buf.put_slice(&[0x11, 0x06, 0x05, b'o', b'k']);

    let parsed = ActionMessage::parse(buf.freeze(), &AliasTable::default()).unwrap();
    assert_eq!(parsed.version, 0);
    assert_eq!(parsed.headers[0].value, AmfValue::Boolean(true));
    assert!(parsed.headers[0].must_understand);
    assert_eq!(parsed.headers[1].value, AmfValue::Double(42.0));
    assert_eq!(parsed.bodies[0].value, AmfValue::from("ok"));
}

#[test]
fn test_amf0_object_is_rejected() {
    let mut buf = BytesMut::new();
    buf.put_u16(3);
    buf.put_u16(0);
    buf.put_u16(1);
    put_utf8(&mut buf, "null");
    put_utf8(&mut buf, "/1");
    buf.put_u32(1);
    buf.put_u8(0x03);

    assert_eq!(
        ActionMessage::parse(buf.freeze(), &AliasTable::default()),
        Err(AmfDecodingError::UnsupportedAmf0Type(0x03))
    );
}

#[test]
fn test_truncated_message() {
    let bytes = sample_message().serialize().unwrap();
    let truncated = bytes.slice(..bytes.len() - 1);
    assert_eq!(
        ActionMessage::parse(truncated, &AliasTable::default()),
        Err(AmfDecodingError::InsufficientData)
    );
    assert_eq!(
        ActionMessage::parse(Bytes::from_static(&[0x00]), &AliasTable::default()),
        Err(AmfDecodingError::InsufficientData)
    );
}

#[test]
fn test_deeply_nested_body_is_rejected() {
    let mut buf = BytesMut::new();
    buf.put_u16(3);
    buf.put_u16(0);
    buf.put_u16(1);
    put_utf8(&mut buf, "/1/onResult");
    put_utf8(&mut buf, "");
    buf.put_u32(u32::MAX);
    buf.put_u8(0x11);
    for _ in 0..100_000 {
        buf.put_slice(&[0x09, 0x03, 0x01]); // array with one dense item
    }
    buf.put_u8(0x01);

    assert_eq!(
        ActionMessage::parse(buf.freeze(), &AliasTable::default()),
        Err(AmfDecodingError::MaxDepthExceeded(crate::MAX_NESTING_DEPTH))
    );
}
