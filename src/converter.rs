//! Conversions between the XML form and AMF bytes used by the sampler and the
//! response renderer.
//!
//! The plain functions never fail: a failed conversion is logged and yields
//! empty bytes or an empty string, so a codec problem never takes the sample
//! result down with it. The `try_*` variants return the error instead.

use amf::{ActionMessage, AliasTable, ClassAliasRegistry, decode_amf3, encode_amf3};
use bytes::Bytes;
use tracing::{debug, error};

use crate::{
    error::ConversionError,
    substitution::{Substitution, apply_substitutions},
    xml,
};

const SNIPPET_LEN: usize = 200;

pub fn xml_to_amf_message(xml: &str, substitutions: &[Substitution]) -> Bytes {
    try_xml_to_amf_message(xml, substitutions).unwrap_or_else(|err| {
        log_xml_failure("xml_to_amf_message", xml, err);
        Bytes::new()
    })
}

pub fn try_xml_to_amf_message(
    xml: &str,
    substitutions: &[Substitution],
) -> Result<Bytes, ConversionError> {
    let xml = apply_substitutions(xml, substitutions);
    let aliases = ClassAliasRegistry::global().snapshot();
    let message = xml::action_message_from_xml(&xml, &aliases)?;
    let amf = message.serialize()?;
    debug!(
        headers = message.headers.len(),
        bodies = message.bodies.len(),
        len = amf.len(),
        "Encoded action message"
    );
    Ok(amf)
}

pub fn amf_message_to_xml(amf: &[u8], aliases: &AliasTable) -> String {
    try_amf_message_to_xml(amf, aliases).unwrap_or_else(|err| {
        log_amf_failure("amf_message_to_xml", amf, err);
        String::new()
    })
}

pub fn try_amf_message_to_xml(amf: &[u8], aliases: &AliasTable) -> Result<String, ConversionError> {
    let message = ActionMessage::parse(Bytes::copy_from_slice(amf), aliases)?;
    Ok(xml::action_message_to_xml(&message)?)
}

/// Single AMF3 value counterpart of [`xml_to_amf_message`]. Substitutions are
/// not applied.
pub fn xml_to_amf(xml: &str) -> Bytes {
    try_xml_to_amf(xml).unwrap_or_else(|err| {
        log_xml_failure("xml_to_amf", xml, err);
        Bytes::new()
    })
}

pub fn try_xml_to_amf(xml: &str) -> Result<Bytes, ConversionError> {
    let aliases = ClassAliasRegistry::global().snapshot();
    let value = xml::value_from_xml(xml, &aliases)?;
    Ok(encode_amf3(&value)?)
}

/// Single AMF3 value counterpart of [`amf_message_to_xml`], using the global
/// alias registry.
pub fn amf_to_xml(amf: &[u8]) -> String {
    try_amf_to_xml(amf).unwrap_or_else(|err| {
        log_amf_failure("amf_to_xml", amf, err);
        String::new()
    })
}

pub fn try_amf_to_xml(amf: &[u8]) -> Result<String, ConversionError> {
    let aliases = ClassAliasRegistry::global().snapshot();
    let value = decode_amf3(Bytes::copy_from_slice(amf), &aliases)?;
    Ok(xml::value_to_xml(&value)?)
}

fn log_xml_failure(operation: &str, xml: &str, err: ConversionError) {
    let err = anyhow::Error::new(err);
    error!(
        operation,
        xml_len = xml.len(),
        snippet = snippet(xml),
        "Conversion failed: {err:#}"
    );
}

fn log_amf_failure(operation: &str, amf: &[u8], err: ConversionError) {
    let err = anyhow::Error::new(err);
    error!(operation, amf_len = amf.len(), "Conversion failed: {err:#}");
}

fn snippet(xml: &str) -> &str {
    match xml.char_indices().nth(SNIPPET_LEN) {
        Some((end, _)) => &xml[..end],
        None => xml,
    }
}
