//! Invoicing domain module.
//!
//! This crate contains the invoice record, its decoding from change-feed
//! images, and document rendering. Everything here is deterministic domain
//! logic (no IO, no HTTP, no storage).

pub mod invoice;
pub mod render;

pub use invoice::{DecodeError, Invoice, attributes};
pub use render::{DocumentRenderer, PdfRenderer, RenderError};
