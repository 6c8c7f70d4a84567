//! Shared types and utilities for talking to the Synapse backend.

pub mod error;
pub mod protocol;

pub use error::*;
pub use protocol::*;
