//! Readings API client, wire types, and the cached fetch coordinator.

pub mod api_types;
pub mod cached_client;
pub mod client;
pub mod types;

pub use cached_client::CachedReadingsClient;
pub use client::ReadingsClient;
