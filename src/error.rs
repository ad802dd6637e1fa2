use amf::{AmfDecodingError, AmfEncodingError};

use crate::xml::XmlError;

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Failed to convert XML.")]
    Xml(#[from] XmlError),

    #[error("Failed to decode AMF data.")]
    Decoding(#[from] AmfDecodingError),

    #[error("Failed to encode AMF data.")]
    Encoding(#[from] AmfEncodingError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid sampler configuration.")]
    Json(#[from] serde_json::Error),

    #[error("Object encoding {0} is not supported, only AMF3 (3) is.")]
    UnsupportedObjectEncoding(u16),
}

#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("Invalid URL {0:?}.")]
    InvalidUrl(String),

    #[error("HTTP request failed.")]
    Request(#[from] reqwest::Error),
}
