// src/lib.rs
//
// failtrace: schema-free ingestion and reconciliation of hardware
// failure reports. Arbitrary workbooks and slide decks go in; one
// CanonicalAsset per device serial comes out, with identities found by
// scoring rather than schema, columns classified by a remote oracle
// with a deterministic local fallback, and per-device facts merged
// across sheets and files.

pub mod classify;
pub mod config;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod merge;
pub mod record;
pub mod source;

pub use config::{IngestConfig, OracleConfig};
pub use error::{IngestError, IngestResult};
pub use ingest::{IngestRun, RunSummary};
pub use merge::CanonicalAsset;
