//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **rest**: reqwest-backed client for the media API.
//!
//! Adapters are thin translators between domain types and wire formats. They
//! contain no business logic.

pub mod rest;
