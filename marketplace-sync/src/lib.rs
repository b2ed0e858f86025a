//! Marketplace media aggregation and social-state sync.
//!
//! Joins listings from the media API with their comments and favourites,
//! resolves avatars, and keeps one in-memory catalogue consistent with
//! optimistic favourite toggles. Consumers share a single
//! [`domain::CatalogueQuery`].

pub mod config;
pub mod domain;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
