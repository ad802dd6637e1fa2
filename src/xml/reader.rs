use std::{collections::HashMap, str::FromStr};

use amf::{
    AMF3_VERSION, ActionMessage, AliasTable, AmfValue, ExternalLayout, Externalized, FlexMessage,
    MAX_NESTING_DEPTH, MessageBody, MessageField, MessageHeader, Traits, external_layout,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use tracing::warn;

use super::{
    ACTION_MESSAGE, AS_OBJECT, MESSAGE_BODY, MESSAGE_HEADER, XmlError, dom::Element, named_class,
};

/// Elements that never take an object table slot.
const SCALAR_ELEMENTS: [&str; 7] = [
    "undefined",
    "null",
    "boolean",
    "int",
    "double",
    "string",
    "reference",
];

/// Builds values from elements. Children are visited in the order their
/// values are written on the wire, so object table slots match the encoder
/// whatever order the document lists them in.
pub(super) struct XmlReader<'a> {
    aliases: &'a AliasTable,
    /// `id` labels seen in the current scope, mapped to object table slots.
    ids: HashMap<String, u32>,
    next_complex: u32,
    depth: usize,
}

impl<'a> XmlReader<'a> {
    pub fn new(aliases: &'a AliasTable) -> Self {
        Self {
            aliases,
            ids: HashMap::new(),
            next_complex: 0,
            depth: 0,
        }
    }

    pub fn read_action_message(&mut self, root: &Element) -> Result<ActionMessage, XmlError> {
        expect_element(root, ACTION_MESSAGE)?;
        let version = match root.attribute("version") {
            Some(version) => parse_text(root, version)?,
            None => AMF3_VERSION,
        };

        let mut message = ActionMessage {
            version,
            headers: vec![],
            bodies: vec![],
        };
        for child in &root.children {
            match child.name.as_str() {
                MESSAGE_HEADER => {
                    let must_understand = match child.attribute("mustUnderstand") {
                        Some(flag) => parse_bool(child, flag)?,
                        None => false,
                    };
                    message.headers.push(MessageHeader {
                        name: child.attribute("name").unwrap_or_default().to_string(),
                        must_understand,
                        value: self.read_single_child(child)?,
                    });
                }
                MESSAGE_BODY => message.bodies.push(MessageBody {
                    target_uri: child.attribute("targetUri").unwrap_or_default().to_string(),
                    response_uri: child.attribute("responseUri").unwrap_or_default().to_string(),
                    value: self.read_single_child(child)?,
                }),
                _ => {
                    return Err(XmlError::UnexpectedElement {
                        expected: MESSAGE_BODY,
                        found: child.name.clone(),
                    });
                }
            }
        }
        Ok(message)
    }

    /// Reads a value that starts a new reference scope.
    pub fn read_root_value(&mut self, element: &Element) -> Result<AmfValue, XmlError> {
        self.ids.clear();
        self.next_complex = 0;
        self.depth = 0;
        self.read_value(element)
    }

    fn read_single_child(&mut self, element: &Element) -> Result<AmfValue, XmlError> {
        match element.children.as_slice() {
            [child] => self.read_root_value(child),
            _ => Err(XmlError::MissingValue(element.name.clone())),
        }
    }

    fn read_value(&mut self, element: &Element) -> Result<AmfValue, XmlError> {
        if SCALAR_ELEMENTS.contains(&element.name.as_str()) {
            return self.read_any_value(element);
        }
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(XmlError::MaxDepthExceeded(MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        let value = self.read_any_value(element);
        self.depth -= 1;
        value
    }

    fn read_any_value(&mut self, element: &Element) -> Result<AmfValue, XmlError> {
        let text = element.text.as_str();
        let value = match element.name.as_str() {
            "undefined" => AmfValue::Undefined,
            "null" => AmfValue::Null,
            "boolean" => AmfValue::Boolean(parse_bool(element, text)?),
            "int" => AmfValue::integer(parse_text(element, text)?),
            "double" => AmfValue::Double(parse_text(element, text)?),
            "string" => AmfValue::String(text.to_string()),
            "reference" => {
                let id = required_attribute(element, "ref")?;
                let idx = self
                    .ids
                    .get(id)
                    .ok_or_else(|| XmlError::UnknownReference(id.to_string()))?;
                AmfValue::Reference(*idx)
            }
            "xml-document" => {
                self.register_complex(element);
                AmfValue::XmlDoc(text.to_string())
            }
            "xml" => {
                self.register_complex(element);
                AmfValue::Xml(text.to_string())
            }
            "date" => {
                self.register_complex(element);
                AmfValue::Date(parse_text(element, text)?)
            }
            "byte-array" => {
                self.register_complex(element);
                AmfValue::ByteArray(decode_base64(text)?)
            }
            "array" => {
                self.register_complex(element);
                // Named entries go on the wire before dense items.
                let (named, unnamed): (Vec<&Element>, Vec<&Element>) = element
                    .children
                    .iter()
                    .partition(|child| child.attribute("name").is_some());
                let associative = named
                    .into_iter()
                    .map(|child| -> Result<(String, AmfValue), XmlError> {
                        let key = required_attribute(child, "name")?.to_string();
                        Ok((key, self.read_value(child)?))
                    })
                    .collect::<Result<_, _>>()?;
                let dense = unnamed
                    .into_iter()
                    .map(|child| self.read_value(child))
                    .collect::<Result<_, _>>()?;
                AmfValue::Array { associative, dense }
            }
            "vector-int" => {
                self.register_complex(element);
                AmfValue::VectorInt {
                    fixed_length: fixed_length(element)?,
                    values: parse_items(element, "int")?,
                }
            }
            "vector-uint" => {
                self.register_complex(element);
                AmfValue::VectorUInt {
                    fixed_length: fixed_length(element)?,
                    values: parse_items(element, "uint")?,
                }
            }
            "vector-double" => {
                self.register_complex(element);
                AmfValue::VectorDouble {
                    fixed_length: fixed_length(element)?,
                    values: parse_items(element, "double")?,
                }
            }
            "vector-object" => {
                self.register_complex(element);
                let values = element
                    .children
                    .iter()
                    .map(|child| self.read_value(child))
                    .collect::<Result<_, _>>()?;
                AmfValue::VectorObject {
                    fixed_length: fixed_length(element)?,
                    class_name: element.attribute("type").map(str::to_string),
                    values,
                }
            }
            "dictionary" => {
                self.register_complex(element);
                let weak_keys = match element.attribute("weakKeys") {
                    Some(flag) => parse_bool(element, flag)?,
                    None => false,
                };
                let entries = element
                    .children
                    .iter()
                    .map(|entry| -> Result<(AmfValue, AmfValue), XmlError> {
                        expect_element(entry, "entry")?;
                        match entry.children.as_slice() {
                            [key, value] => Ok((self.read_value(key)?, self.read_value(value)?)),
                            _ => Err(XmlError::MissingValue(entry.name.clone())),
                        }
                    })
                    .collect::<Result<_, _>>()?;
                AmfValue::Dictionary { weak_keys, entries }
            }
            _ => self.read_object(element)?,
        };
        Ok(value)
    }

    fn read_object(&mut self, element: &Element) -> Result<AmfValue, XmlError> {
        let (class_name, default_externalizable) = match named_class(&element.name) {
            Some(named) => (Some(named.class_name.to_string()), named.externalizable),
            None if element.name == AS_OBJECT => {
                (element.attribute("type").map(str::to_string), false)
            }
            None => return Err(XmlError::UnknownElement(element.name.clone())),
        };
        let externalizable = match element.attribute("externalizable") {
            Some(flag) => parse_bool(element, flag)?,
            None => default_externalizable,
        };

        self.register_complex(element);
        if externalizable {
            let class_name = class_name.ok_or_else(|| XmlError::MissingAttribute {
                element: element.name.clone(),
                attribute: "type",
            })?;
            let body = self.read_externalized(element, &class_name)?;
            return Ok(AmfValue::Externalizable { class_name, body });
        }

        if element.has_text() {
            warn!(element = element.name.as_str(), "Ignoring text inside object element");
        }
        let typed = class_name.is_some();
        let members = element
            .children
            .iter()
            .map(|child| -> Result<(String, AmfValue), XmlError> {
                let name = required_attribute(child, "name")?.to_string();
                Ok((name, self.read_value(child)?))
            })
            .collect::<Result<Vec<_>, XmlError>>()?;

        let sealed_count = match element.attribute("sealed") {
            Some(count) => parse_text::<usize>(element, count)?,
            None if typed => members.len(),
            None => 0,
        };
        if sealed_count > members.len() {
            return Err(XmlError::InvalidValue {
                element: element.name.clone(),
                value: sealed_count.to_string(),
            });
        }
        let dynamic = match element.attribute("dynamic") {
            Some(flag) => parse_bool(element, flag)?,
            None => !typed,
        };

        let mut members = members.into_iter();
        let (sealed_members, sealed) = members.by_ref().take(sealed_count).unzip();
        Ok(AmfValue::Object {
            traits: Traits {
                class_name,
                dynamic,
                sealed_members,
            },
            sealed,
            dynamic: members.collect(),
        })
    }

    fn read_externalized(
        &mut self,
        element: &Element,
        class_name: &str,
    ) -> Result<Externalized, XmlError> {
        if element.children.is_empty() && element.has_text() {
            return Ok(Externalized::Opaque(decode_base64(&element.text)?));
        }

        match external_layout(self.aliases.resolve(class_name)) {
            Some(ExternalLayout::Message(kind)) => {
                let mut fields = element
                    .children
                    .iter()
                    .map(|child| message_field(child).map(|field| (field, child)))
                    .collect::<Result<Vec<_>, XmlError>>()?;
                // Wire order is `MessageField` order.
                fields.sort_by_key(|(field, _)| *field);

                let mut message = FlexMessage::new(kind);
                for (field, child) in fields {
                    if message.fields.contains_key(&field) {
                        return Err(XmlError::DuplicateMessageField(field.name().to_string()));
                    }
                    message.fields.insert(field, self.read_value(child)?);
                }
                Ok(Externalized::Message(Box::new(message)))
            }
            Some(ExternalLayout::Proxy) => match element.children.as_slice() {
                [child] => Ok(Externalized::Proxy(Box::new(self.read_value(child)?))),
                _ => Err(XmlError::MissingValue(element.name.clone())),
            },
            None if element.children.is_empty() => Ok(Externalized::Opaque(Bytes::new())),
            None => Err(XmlError::UnknownExternalizable(class_name.to_string())),
        }
    }

    fn register_complex(&mut self, element: &Element) {
        let idx = self.next_complex;
        self.next_complex += 1;
        if let Some(id) = element.attribute("id") {
            self.ids.insert(id.to_string(), idx);
        }
    }
}

fn expect_element(element: &Element, expected: &'static str) -> Result<(), XmlError> {
    if element.name != expected {
        return Err(XmlError::UnexpectedElement {
            expected,
            found: element.name.clone(),
        });
    }
    Ok(())
}

fn required_attribute<'e>(element: &'e Element, attribute: &'static str) -> Result<&'e str, XmlError> {
    element
        .attribute(attribute)
        .ok_or_else(|| XmlError::MissingAttribute {
            element: element.name.clone(),
            attribute,
        })
}

fn message_field(element: &Element) -> Result<MessageField, XmlError> {
    let name = required_attribute(element, "name")?;
    MessageField::from_name(name).ok_or_else(|| XmlError::UnknownMessageField(name.to_string()))
}

fn parse_text<T: FromStr>(element: &Element, text: &str) -> Result<T, XmlError> {
    text.trim().parse().map_err(|_| XmlError::InvalidValue {
        element: element.name.clone(),
        value: text.to_string(),
    })
}

fn parse_bool(element: &Element, text: &str) -> Result<bool, XmlError> {
    parse_text(element, text)
}

fn fixed_length(element: &Element) -> Result<bool, XmlError> {
    match element.attribute("fixed") {
        Some(flag) => parse_bool(element, flag),
        None => Ok(false),
    }
}

fn parse_items<T: FromStr>(element: &Element, item_element: &'static str) -> Result<Vec<T>, XmlError> {
    element
        .children
        .iter()
        .map(|item| -> Result<T, XmlError> {
            expect_element(item, item_element)?;
            parse_text(item, &item.text)
        })
        .collect()
}

fn decode_base64(text: &str) -> Result<Bytes, XmlError> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(Bytes::from(STANDARD.decode(cleaned)?))
}
