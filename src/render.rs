use amf::AliasTable;

use crate::converter::amf_message_to_xml;

pub const AMF_CONTENT_TYPE: &str = "application/x-amf";

/// Largest response rendered as XML, in KiB.
const MAX_RESPONSE_SIZE_KB: usize = 500;

/// Text shown for an AMF response: its XML form, or a short explanation when
/// the response cannot be shown.
pub fn render_response(content_type: &str, data: &[u8], aliases: &AliasTable) -> String {
    if !is_amf_content_type(content_type) {
        return format!("Invalid content type for AMF response: {content_type}");
    }
    if data.is_empty() {
        return "Empty response".to_string();
    }
    if data.len() > MAX_RESPONSE_SIZE_KB * 1024 {
        return format!("Response size too large for display, limit is {MAX_RESPONSE_SIZE_KB}k");
    }
    amf_message_to_xml(data, aliases)
}

/// Compares the media type only, ignoring parameters and case.
pub fn is_amf_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case(AMF_CONTENT_TYPE)
}
