//! Core domain + application logic for the chat roster service.
//!
//! Framework-agnostic: the messaging platform lives behind the ports in
//! [`platform`], and transports (HTTP, CLI) live in their own crates and only
//! talk to [`service::RosterService`].

pub mod aggregate;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod export;
pub mod logging;
pub mod platform;
pub mod registry;
pub mod results;
pub mod service;
pub mod streaming;
pub mod utils;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
