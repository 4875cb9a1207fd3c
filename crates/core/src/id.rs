//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are caller-supplied strings. They are validated once at the
//! boundary and immutable afterwards.

use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DomainError;

const MAX_ID_LEN: usize = 128;

/// Identifier of an invoice (primary key of the invoice table).
///
/// Restricted to `[A-Za-z0-9._-]`, not starting with `.`, so it can be used
/// verbatim as a storage key and URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct InvoiceId(String);

/// Identifier of a customer (hash key of the customer secondary index).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CustomerId(String);

fn validate_invoice_id(s: &str) -> Result<(), DomainError> {
    if s.is_empty() {
        return Err(DomainError::invalid_id("InvoiceID: must not be empty"));
    }
    if s.len() > MAX_ID_LEN {
        return Err(DomainError::invalid_id(format!(
            "InvoiceID: longer than {MAX_ID_LEN} characters"
        )));
    }
    if s.starts_with('.') {
        return Err(DomainError::invalid_id("InvoiceID: must not start with '.'"));
    }
    if let Some(c) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(DomainError::invalid_id(format!(
            "InvoiceID: forbidden character {c:?}"
        )));
    }
    Ok(())
}

fn validate_customer_id(s: &str) -> Result<(), DomainError> {
    if s.trim().is_empty() {
        return Err(DomainError::invalid_id("CustomerID: must not be empty"));
    }
    if s.trim() != s {
        return Err(DomainError::invalid_id(
            "CustomerID: must not have leading or trailing whitespace",
        ));
    }
    if s.len() > MAX_ID_LEN {
        return Err(DomainError::invalid_id(format!(
            "CustomerID: longer than {MAX_ID_LEN} characters"
        )));
    }
    if s.chars().any(char::is_control) {
        return Err(DomainError::invalid_id("CustomerID: contains control characters"));
    }
    Ok(())
}

macro_rules! impl_string_newtype {
    ($t:ident, $validate:path) => {
        impl $t {
            /// Validate and wrap an identifier.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                $validate(&value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_string_newtype!(InvoiceId, validate_invoice_id);
impl_string_newtype!(CustomerId, validate_customer_id);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_id_accepts_key_safe_characters() {
        let id = InvoiceId::new("INV-2023_09.1").unwrap();
        assert_eq!(id.as_str(), "INV-2023_09.1");
    }

    #[test]
    fn invoice_id_rejects_path_like_values() {
        assert!(matches!(InvoiceId::new(""), Err(DomainError::InvalidId(_))));
        assert!(matches!(InvoiceId::new("../etc"), Err(DomainError::InvalidId(_))));
        assert!(matches!(InvoiceId::new("a/b"), Err(DomainError::InvalidId(_))));
        assert!(matches!(InvoiceId::new("INV 1"), Err(DomainError::InvalidId(_))));
        assert!(matches!(InvoiceId::new("x".repeat(129)), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn customer_id_rejects_surrounding_whitespace() {
        assert!(CustomerId::new(" CUST1").is_err());
        assert!(CustomerId::new("CUST1\t").is_err());
        assert_eq!(CustomerId::new("ACME Corp").unwrap().as_str(), "ACME Corp");
    }

    #[test]
    fn customer_id_rejects_blank() {
        assert!(CustomerId::new("   ").is_err());
        assert!(CustomerId::new("CUST\n1").is_err());
        assert_eq!(CustomerId::new("CUST 1").unwrap().as_str(), "CUST 1");
    }

    #[test]
    fn deserialize_validates() {
        let ok: InvoiceId = serde_json::from_str("\"INV1\"").unwrap();
        assert_eq!(ok.as_str(), "INV1");
        assert!(serde_json::from_str::<InvoiceId>("\"\"").is_err());
    }
}
