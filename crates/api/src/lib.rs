//! HTTP API: router, handlers and runtime wiring.

pub mod app;
