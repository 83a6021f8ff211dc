//! Messaging-platform capability (connect, sign in, enumerate, resolve).
//!
//! The core never talks to a network client directly; adapters implement
//! these ports.

pub mod iter;
pub mod port;
pub mod throttled;
pub mod types;
