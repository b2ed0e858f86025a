//! Media API outbound adapter.
//!
//! This module provides a thin HTTP implementation of the `CatalogueSource`
//! port.

mod dto;
mod http_source;

pub use http_source::RestCatalogueSource;
