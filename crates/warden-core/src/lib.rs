//! Core domain + application logic for the group warden bot.
//!
//! This crate is intentionally framework-agnostic. Telegram / the inference
//! backend / the durable store live behind ports (traits) implemented in
//! adapter crates.

pub mod classify;
pub mod config;
pub mod domain;
pub mod errors;
pub mod format;
pub mod locks;
pub mod logging;
pub mod messaging;
pub mod moderation;
pub mod polls;
pub mod settings;
pub mod storage;
pub mod verification;
pub mod warnings;

#[cfg(test)]
pub(crate) mod testsupport;

pub use errors::{Error, Result};
