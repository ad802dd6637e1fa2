pub mod action_message;
pub mod alias;
pub mod amf3;
pub mod error;

pub use action_message::{AMF3_VERSION, ActionMessage, MessageBody, MessageHeader};
pub use alias::{AliasTable, ClassAliasRegistry};
pub use amf3::{
    AmfValue, ExternalLayout, Externalized, FlexMessage, FlexMessageKind, MAX_NESTING_DEPTH,
    MessageField, Traits, decode_amf3, encode_amf3, external_layout,
};
pub use error::{Amf3EncodingError, AmfDecodingError, AmfEncodingError};
