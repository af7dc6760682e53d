//! Chat operations: the repository port, the per-call context carrying the
//! deadline and cancellation signal, and the service that ties them together.

pub mod context;
pub mod repository;
pub mod service;
