//! Header batching and Merkle inclusion proofs for Substrate-style chains.
//!
//! New block headers arrive from a [`source::ChainClient`]. Each header's
//! canonical hash is looked up, the header is buffered, and every
//! `batch_size` headers are committed as one Merkle tree. Proofs are
//! generated and verified against the committed trees.
//!
//! # Layout
//!
//! - [`BatchBuffer`]: fixed-capacity buffer of pending headers
//! - [`TreeStore`]: append-only list of committed trees
//! - [`Batcher`]: ties the two together and answers queries
//! - [`HeaderProofService`]: shared, locked service state plus the
//!   ingestion task
//! - [`server`]: HTTP control plane

mod batcher;
mod buffer;
mod config;
mod error;
mod ingest;
mod record;
mod service;
mod store;

pub mod server;
pub mod source;
pub mod wire;

pub use batcher::{Batcher, CommitResult, IngestResult};
pub use buffer::BatchBuffer;
pub use config::{Config, DEFAULT_BATCH_SIZE};
pub use error::Error;
pub use headerproof_merkle_tree as merkle;
pub use ingest::{resolve_record, run_ingestion, IngestStats};
pub use record::HeaderRecord;
pub use service::{HeaderProofService, ServiceStatus};
pub use store::TreeStore;
