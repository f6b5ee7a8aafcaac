//! Core services: backend contract, reads, writes, forms and session state.

pub mod context;
pub mod error;
pub mod form;
pub mod gateway;
pub mod mutation;
pub mod queries;
pub mod session;
