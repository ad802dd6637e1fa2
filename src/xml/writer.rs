use std::collections::HashSet;

use amf::{ActionMessage, AmfValue, Externalized, MAX_NESTING_DEPTH, Traits};
use base64::{Engine, engine::general_purpose::STANDARD};
use quick_xml::{
    Writer,
    events::{BytesEnd, BytesStart, BytesText, Event},
};

use super::{
    ACTION_MESSAGE, AS_OBJECT, MESSAGE_BODY, MESSAGE_HEADER, XmlError, element_for_class,
};

pub(super) struct XmlWriter {
    writer: Writer<Vec<u8>>,
    /// Object table slots targeted by a reference in the current scope.
    referenced: HashSet<u32>,
    next_complex: u32,
    depth: usize,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
            referenced: HashSet::new(),
            next_complex: 0,
            depth: 0,
        }
    }

    pub fn finish(self) -> Result<String, XmlError> {
        Ok(String::from_utf8(self.writer.into_inner())?)
    }

    pub fn write_action_message(&mut self, message: &ActionMessage) -> Result<(), XmlError> {
        let version = message.version.to_string();
        let start = BytesStart::new(ACTION_MESSAGE).with_attributes([("version", version.as_str())]);
        self.writer.write_event(Event::Start(start))?;

        for header in &message.headers {
            let start = BytesStart::new(MESSAGE_HEADER).with_attributes([
                ("name", header.name.as_str()),
                ("mustUnderstand", bool_str(header.must_understand)),
            ]);
            self.writer.write_event(Event::Start(start))?;
            self.write_root_value(&header.value)?;
            self.writer.write_event(Event::End(BytesEnd::new(MESSAGE_HEADER)))?;
        }

        for body in &message.bodies {
            let start = BytesStart::new(MESSAGE_BODY).with_attributes([
                ("targetUri", body.target_uri.as_str()),
                ("responseUri", body.response_uri.as_str()),
            ]);
            self.writer.write_event(Event::Start(start))?;
            self.write_root_value(&body.value)?;
            self.writer.write_event(Event::End(BytesEnd::new(MESSAGE_BODY)))?;
        }

        self.writer.write_event(Event::End(BytesEnd::new(ACTION_MESSAGE)))?;
        Ok(())
    }

    /// Writes a value that starts a new reference scope.
    pub fn write_root_value(&mut self, value: &AmfValue) -> Result<(), XmlError> {
        self.referenced.clear();
        collect_references(value, &mut self.referenced, 0)?;
        self.next_complex = 0;
        self.depth = 0;
        self.write_value(value, None)
    }

    fn write_value(&mut self, value: &AmfValue, name: Option<&str>) -> Result<(), XmlError> {
        if !value.is_complex() {
            return self.write_any_value(value, name);
        }
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(XmlError::MaxDepthExceeded(MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        let result = self.write_any_value(value, name);
        self.depth -= 1;
        result
    }

    fn write_any_value(&mut self, value: &AmfValue, name: Option<&str>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(element_name(value));
        if let Some(name) = name {
            start.push_attribute(("name", name));
        }
        if value.is_complex() {
            let idx = self.next_complex;
            self.next_complex += 1;
            if self.referenced.contains(&idx) {
                start.push_attribute(("id", idx.to_string().as_str()));
            }
        }

        match value {
            AmfValue::Undefined | AmfValue::Null => self.write_empty(start),
            AmfValue::Boolean(b) => self.write_text(start, bool_str(*b)),
            AmfValue::Integer(i) => self.write_text(start, &i.to_string()),
            AmfValue::Double(d) | AmfValue::Date(d) => self.write_text(start, &d.to_string()),
            AmfValue::String(s) | AmfValue::XmlDoc(s) | AmfValue::Xml(s) => {
                self.write_text(start, s)
            }
            AmfValue::ByteArray(bytes) => self.write_text(start, &STANDARD.encode(bytes)),
            AmfValue::Array { associative, dense } => {
                self.write_start(start)?;
                for (key, value) in associative {
                    self.write_value(value, Some(key))?;
                }
                for value in dense {
                    self.write_value(value, None)?;
                }
                self.write_end(value)
            }
            AmfValue::Object {
                traits,
                sealed,
                dynamic,
            } => {
                push_object_attributes(&mut start, traits, sealed.len(), dynamic.len());
                self.write_start(start)?;
                for (key, value) in traits.sealed_members.iter().zip(sealed) {
                    self.write_value(value, Some(key))?;
                }
                for (key, value) in dynamic {
                    self.write_value(value, Some(key))?;
                }
                self.write_end(value)
            }
            AmfValue::Externalizable { class_name, body } => {
                if element_for_class(class_name, true).is_none() {
                    start.push_attribute(("type", class_name.as_str()));
                    start.push_attribute(("externalizable", "true"));
                }
                match body {
                    Externalized::Message(message) => {
                        self.write_start(start)?;
                        for (field, value) in &message.fields {
                            self.write_value(value, Some(field.name()))?;
                        }
                        self.write_end(value)
                    }
                    Externalized::Proxy(inner) => {
                        self.write_start(start)?;
                        self.write_value(inner, None)?;
                        self.write_end(value)
                    }
                    Externalized::Opaque(bytes) => self.write_text(start, &STANDARD.encode(bytes)),
                }
            }
            AmfValue::VectorInt {
                fixed_length,
                values,
            } => {
                push_fixed(&mut start, *fixed_length);
                self.write_items(start, value, "int", values)
            }
            AmfValue::VectorUInt {
                fixed_length,
                values,
            } => {
                push_fixed(&mut start, *fixed_length);
                self.write_items(start, value, "uint", values)
            }
            AmfValue::VectorDouble {
                fixed_length,
                values,
            } => {
                push_fixed(&mut start, *fixed_length);
                self.write_items(start, value, "double", values)
            }
            AmfValue::VectorObject {
                fixed_length,
                class_name,
                values,
            } => {
                push_fixed(&mut start, *fixed_length);
                if let Some(class_name) = class_name {
                    start.push_attribute(("type", class_name.as_str()));
                }
                self.write_start(start)?;
                for item in values {
                    self.write_value(item, None)?;
                }
                self.write_end(value)
            }
            AmfValue::Dictionary { weak_keys, entries } => {
                if *weak_keys {
                    start.push_attribute(("weakKeys", "true"));
                }
                self.write_start(start)?;
                for (key, entry_value) in entries {
                    self.writer.write_event(Event::Start(BytesStart::new("entry")))?;
                    self.write_value(key, None)?;
                    self.write_value(entry_value, None)?;
                    self.writer.write_event(Event::End(BytesEnd::new("entry")))?;
                }
                self.write_end(value)
            }
            AmfValue::Reference(idx) => {
                start.push_attribute(("ref", idx.to_string().as_str()));
                self.write_empty(start)
            }
        }
    }

    fn write_items<I: ToString>(
        &mut self,
        start: BytesStart,
        value: &AmfValue,
        item_element: &str,
        items: &[I],
    ) -> Result<(), XmlError> {
        self.write_start(start)?;
        for item in items {
            self.write_text(BytesStart::new(item_element), &item.to_string())?;
        }
        self.write_end(value)
    }

    fn write_start(&mut self, start: BytesStart) -> Result<(), XmlError> {
        self.writer.write_event(Event::Start(start))?;
        Ok(())
    }

    fn write_end(&mut self, value: &AmfValue) -> Result<(), XmlError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(element_name(value))))?;
        Ok(())
    }

    fn write_empty(&mut self, start: BytesStart) -> Result<(), XmlError> {
        self.writer.write_event(Event::Empty(start))?;
        Ok(())
    }

    /// Empty text is written as an empty element, so no indentation ends up
    /// inside it.
    fn write_text(&mut self, start: BytesStart, text: &str) -> Result<(), XmlError> {
        if text.is_empty() {
            return self.write_empty(start);
        }
        let end = start.to_end().into_owned();
        self.writer.write_event(Event::Start(start))?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.writer.write_event(Event::End(end))?;
        Ok(())
    }
}

fn element_name(value: &AmfValue) -> &'static str {
    match value {
        AmfValue::Undefined => "undefined",
        AmfValue::Null => "null",
        AmfValue::Boolean(_) => "boolean",
        AmfValue::Integer(_) => "int",
        AmfValue::Double(_) => "double",
        AmfValue::String(_) => "string",
        AmfValue::XmlDoc(_) => "xml-document",
        AmfValue::Date(_) => "date",
        AmfValue::Array { .. } => "array",
        AmfValue::Object { traits, .. } => traits
            .class_name
            .as_deref()
            .and_then(|class_name| element_for_class(class_name, false))
            .unwrap_or(AS_OBJECT),
        AmfValue::Xml(_) => "xml",
        AmfValue::ByteArray(_) => "byte-array",
        AmfValue::VectorInt { .. } => "vector-int",
        AmfValue::VectorUInt { .. } => "vector-uint",
        AmfValue::VectorDouble { .. } => "vector-double",
        AmfValue::VectorObject { .. } => "vector-object",
        AmfValue::Dictionary { .. } => "dictionary",
        AmfValue::Externalizable { class_name, .. } => {
            element_for_class(class_name, true).unwrap_or(AS_OBJECT)
        }
        AmfValue::Reference(_) => "reference",
    }
}

/// Typed objects default to sealed members only, anonymous objects to
/// dynamic members only. Attributes are written when the object differs.
fn push_object_attributes(
    start: &mut BytesStart,
    traits: &Traits,
    sealed_count: usize,
    dynamic_count: usize,
) {
    let typed = traits.class_name.is_some();
    if let Some(class_name) = &traits.class_name {
        if element_for_class(class_name, false).is_none() {
            start.push_attribute(("type", class_name.as_str()));
        }
    }

    let default_sealed = match typed {
        true => sealed_count + dynamic_count,
        false => 0,
    };
    if sealed_count != default_sealed {
        start.push_attribute(("sealed", sealed_count.to_string().as_str()));
    }
    if traits.dynamic == typed {
        start.push_attribute(("dynamic", bool_str(traits.dynamic)));
    }
}

fn push_fixed(start: &mut BytesStart, fixed_length: bool) {
    if fixed_length {
        start.push_attribute(("fixed", "true"));
    }
}

fn bool_str(b: bool) -> &'static str {
    match b {
        true => "true",
        false => "false",
    }
}

/// Object table slots targeted by `Reference` nodes in `value`.
fn collect_references(
    value: &AmfValue,
    referenced: &mut HashSet<u32>,
    depth: usize,
) -> Result<(), XmlError> {
    let depth = match value.is_complex() {
        true if depth >= MAX_NESTING_DEPTH => {
            return Err(XmlError::MaxDepthExceeded(MAX_NESTING_DEPTH));
        }
        true => depth + 1,
        false => depth,
    };

    match value {
        AmfValue::Reference(idx) => {
            referenced.insert(*idx);
        }
        AmfValue::Array { associative, dense } => {
            for value in associative.iter().map(|(_, v)| v).chain(dense) {
                collect_references(value, referenced, depth)?;
            }
        }
        AmfValue::Object {
            sealed, dynamic, ..
        } => {
            for value in sealed.iter().chain(dynamic.iter().map(|(_, v)| v)) {
                collect_references(value, referenced, depth)?;
            }
        }
        AmfValue::VectorObject { values, .. } => {
            for value in values {
                collect_references(value, referenced, depth)?;
            }
        }
        AmfValue::Dictionary { entries, .. } => {
            for (key, value) in entries {
                collect_references(key, referenced, depth)?;
                collect_references(value, referenced, depth)?;
            }
        }
        AmfValue::Externalizable { body, .. } => match body {
            Externalized::Message(message) => {
                for value in message.fields.values() {
                    collect_references(value, referenced, depth)?;
                }
            }
            Externalized::Proxy(inner) => collect_references(inner, referenced, depth)?,
            Externalized::Opaque(_) => {}
        },
        _ => {}
    }
    Ok(())
}
