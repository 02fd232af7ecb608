//! Core types for the cloak key vault.
//!
//! This crate provides the foundational types used across all cloak crates:
//! protocol addresses, master key roles and their storage tags, and the
//! fixed-width element encoding used for persisted key buffers.

pub mod address;
pub mod constants;
pub mod encoding;

pub use address::{Address, AddressError};
pub use constants::KeyRole;
pub use encoding::{ElementKind, EncodingError};
