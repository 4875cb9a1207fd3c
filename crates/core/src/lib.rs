//! Domain foundation for the invoice service.
//!
//! Identifiers, money and the domain error type. No IO.

pub mod error;
pub mod id;
pub mod money;

pub use error::DomainError;
pub use id::{CustomerId, InvoiceId};
pub use money::Amount;
