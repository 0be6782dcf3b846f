//! Tennis match ingestion: scheduled events from the sports API, resolved into
//! a normalized store of tournaments, seasons, teams, players, matches, sets
//! and statistics.

pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod health;
pub mod matches;
pub mod model;
pub mod pipeline;
pub mod resolve;
pub mod retry;
pub mod statistics;
pub mod store;
pub mod teams;

pub use config::{Config, ReferencePolicy, RunConfig};
pub use error::{FetchError, IngestError, RunError, ShapeError};
pub use pipeline::{DaySummary, IngestSettings, Ingestor, RunSummary};
pub use store::{MemoryStore, PgStore, Store};
