//! Client core for the pastry shop storefront and admin panel.
//!
//! A keyed query cache with request de-duplication, a mutation coordinator that
//! uploads attachments before writing rows, and a session store fed by the
//! backend's auth events. The `patisserie` binary drives them from the shell.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
