use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmfDecodingError {
    #[error("Unknown data type: {0}")]
    UnknownType(u8),

    #[error("Insufficient data")]
    InsufficientData,

    #[error("Invalid UTF-8 string")]
    InvalidUtf8,

    #[error("Complex type reference out of bounds")]
    OutOfBoundsReference,

    #[error("Reference points to object of different amf type than expected.")]
    InvalidReferenceType,

    #[error("No known layout for externalizable class {0:?}.")]
    UnknownExternalizable(String),

    #[error("AMF0 type {0} is not supported, only AMF3 values can be decoded.")]
    UnsupportedAmf0Type(u8),

    #[error("Values are nested deeper than {0} levels.")]
    MaxDepthExceeded(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Amf3EncodingError {
    #[error("Value does not fit in U29.")]
    OutOfRangeU29,

    #[error("String too long: {0} bytes (max {})", (1 << 28) - 1)]
    StringTooLong(usize),

    #[error("Array too long: {0} elements (max {})", (1 << 28) - 1)]
    ArrayTooLong(usize),

    #[error("Vector too long: {0} elements (max {})", (1 << 28) - 1)]
    VectorTooLong(usize),

    #[error("Dictionary too long: {0} entries (max {})", (1 << 28) - 1)]
    DictionaryTooLong(usize),

    #[error("Too many sealed members: {0} (max {})", (1 << 25) - 1)]
    SealedMembersCountTooLarge(usize),

    #[error("Traits declare {expected} sealed members but object has {actual} sealed values.")]
    SealedCountMismatch { expected: usize, actual: usize },

    #[error("Object with non-dynamic traits has {0} dynamic members.")]
    DynamicMembersOnSealedObject(usize),

    #[error("Field {field} is not part of the {kind} message layout.")]
    MessageFieldNotInLayout { field: &'static str, kind: &'static str },

    #[error("Dynamic and associative member names must not be empty.")]
    EmptyMemberName,

    #[error("Reference {0} points past the end of the object table.")]
    OutOfBoundsReference(u32),

    #[error("Values are nested deeper than {0} levels.")]
    MaxDepthExceeded(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmfEncodingError {
    #[error(transparent)]
    Amf3(#[from] Amf3EncodingError),

    #[error("String too long: {0} bytes (max {})", u16::MAX)]
    StringTooLong(usize),

    #[error("Too many headers: {0} (max {})", u16::MAX)]
    TooManyHeaders(usize),

    #[error("Too many bodies: {0} (max {})", u16::MAX)]
    TooManyBodies(usize),

    #[error("Encoded value too large: {0} bytes (max {})", u32::MAX - 1)]
    ValueTooLarge(usize),
}
