//! Sports-event API: wire shapes and the HTTP client.

pub mod client;
pub mod wire;

pub use client::{EventsApi, FetchResult};
