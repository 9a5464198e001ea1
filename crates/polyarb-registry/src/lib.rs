//! REST clients for the market catalog and shallow orderbooks.
//!
//! Both upstream services are read-only and paginated. Transient errors
//! back off exponentially from 1 s for up to 3 retries; a 404 from the
//! orderbook endpoint means "no book exists" and is not retried.

pub mod client;
pub mod error;

pub use client::{build_asset_map, CatalogMarket, RegistryClient, RegistryConfig, RestBook};
pub use error::{RegistryError, RegistryResult};
