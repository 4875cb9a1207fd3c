//! Infrastructure layer: storage adapters, the document pipeline and its
//! background worker, configuration.

pub mod artifact_store;
pub mod change_dispatcher;
pub mod config;
pub mod invoice_table;
pub mod pointer_index;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod resolver;
pub mod seed;
pub mod workers;
