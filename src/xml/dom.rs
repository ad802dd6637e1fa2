use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

use amf::MAX_NESTING_DEPTH;

use super::XmlError;

/// Element nesting allowed in a document. A dictionary level takes two
/// elements (`dictionary` and `entry`) and a message adds two more on top.
const MAX_ELEMENT_DEPTH: usize = 2 * MAX_NESTING_DEPTH + 2;

/// Parsed element. Text and CDATA inside the element are concatenated into
/// `text`, whitespace included.
#[derive(Debug, Clone, Default)]
pub(super) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

pub(super) fn parse_document(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = vec![];
    let mut root = None;
    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if stack.len() >= MAX_ELEMENT_DEPTH {
                    return Err(XmlError::MaxDepthExceeded(MAX_NESTING_DEPTH));
                }
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => close_element(element_from_start(&start)?, &mut stack, &mut root)?,
            Event::End(_) => {
                // Mismatched end tags are rejected by the reader itself.
                let element = stack.pop().ok_or(XmlError::ContentOutsideRoot)?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::Text(text) => push_text(&text.unescape()?, &mut stack)?,
            Event::CData(cdata) => push_text(&String::from_utf8_lossy(&cdata.into_inner()), &mut stack)?,
            Event::Eof => break,
            // Declarations, comments, processing instructions.
            _ => {}
        }
    }

    if let Some(unclosed) = stack.pop() {
        return Err(XmlError::UnclosedElement(unclosed.name));
    }
    root.ok_or(XmlError::EmptyDocument)
}

fn element_from_start(start: &BytesStart) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let attributes = start
        .attributes()
        .map(|attribute| -> Result<(String, String), XmlError> {
            let attribute = attribute?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            Ok((key, value))
        })
        .collect::<Result<_, _>>()?;

    Ok(Element {
        name,
        attributes,
        ..Default::default()
    })
}

fn close_element(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmlError::ContentOutsideRoot),
    }
    Ok(())
}

fn push_text(text: &str, stack: &mut [Element]) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(element) => element.text.push_str(text),
        None if text.trim().is_empty() => {}
        None => return Err(XmlError::ContentOutsideRoot),
    }
    Ok(())
}
