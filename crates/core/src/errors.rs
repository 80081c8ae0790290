use thiserror::Error;

use crate::{schema::DecodeError, token::CodecError};

/// Developer-facing failures of the dialogue engine. These indicate a
/// programming or configuration mistake and are never shown to end users.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("correlation token `{token}` already has a live waiter")]
    DuplicateToken { token: String },
    #[error("chain handle for interaction `{interaction_id}` was already consumed")]
    HandleAlreadyConsumed { interaction_id: String },
    #[error("prompt in namespace `{namespace}` offers no choices")]
    NoChoices { namespace: String },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "Some of the information you entered is invalid. Check it and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The chat platform is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Decode(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Engine(error) => Self::Internal {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, EngineError, InterfaceError};
    use crate::schema::DecodeError;
    use crate::token::CodecError;

    #[test]
    fn decode_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DecodeError::RequiredFieldEmpty("Amount".to_owned()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn engine_errors_never_leak_detail_to_users() {
        let interface = ApplicationError::from(EngineError::DuplicateToken {
            token: "LCST::Fire/True@abc".to_owned(),
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
        assert!(!interface.user_message().contains("LCST::Fire"));
    }

    #[test]
    fn codec_error_converts_into_engine_error() {
        let error = EngineError::from(CodecError::MalformedToken("junk".to_owned()));
        assert_eq!(error.to_string(), "malformed correlation token `junk`");
    }

    #[test]
    fn integration_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Integration("gateway write timed out".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
        assert_eq!(
            interface.user_message(),
            "The chat platform is temporarily unavailable. Please retry shortly."
        );
    }
}
