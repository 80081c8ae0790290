pub mod config;
pub mod errors;
pub mod schema;
pub mod token;

pub use errors::{ApplicationError, EngineError, InterfaceError};
pub use schema::{
    decode_response, Choice, DecodeError, FieldValue, FormField, FormValues, InputStyle,
    PromptKind, PromptSchema, PromptValue, RawResponse,
};
pub use token::{
    is_scoped_variant, CodecError, CorrelationToken, Namespace, NamespaceSet, PromptNonce,
    TokenCodec,
};
