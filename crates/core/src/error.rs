//! Domain error model.

use thiserror::Error;

/// Domain-level error: a value or identifier failed validation.
///
/// Storage and transport failures are modelled by the layers that own them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Empty, too long, or containing forbidden characters.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_detail() {
        assert_eq!(
            DomainError::validation("TotalAmount: must not be negative").to_string(),
            "validation failed: TotalAmount: must not be negative"
        );
        assert_eq!(
            DomainError::invalid_id("InvoiceID: must not be empty").to_string(),
            "invalid identifier: InvoiceID: must not be empty"
        );
    }
}
