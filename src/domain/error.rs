use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("attribute `{name}` is invalid: {reason}")]
    Attribute { name: String, reason: String },
    #[error("page scheme is malformed: {message}")]
    Scheme { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn attribute(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn scheme(message: impl Into<String>) -> Self {
        Self::Scheme {
            message: message.into(),
        }
    }
}
