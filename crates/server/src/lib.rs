//! HTTP server for DICOMweb STOW-RS ingestion.
//!
//! This crate provides the store endpoint:
//! - Multipart decomposition and part classification
//! - Bulk data spooling and reference resolution
//! - Completion and validation of metadata-described objects
//! - Per-object result aggregation in XML or JSON

pub mod error;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod registry;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use ingest::{IngestSession, InputMode, OutputFormat, ResultAggregator};
pub use registry::EntityRegistry;
pub use routes::create_router;
pub use state::AppState;
