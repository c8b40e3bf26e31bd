//! Header sources.
//!
//! A [`ChainClient`] hands out a channel of header events and resolves the
//! canonical hash of a height. The ingestor pulls events from the channel
//! one at a time.

mod substrate;

use async_trait::async_trait;
use headerproof_merkle_tree::Hash;
use tokio::sync::mpsc;

pub use substrate::{parse_header_event, SubstrateClient};

use crate::Error;

/// Capacity of the header channel between a client and the ingestor.
pub const HEADER_CHANNEL_CAPACITY: usize = 256;

/// A new header announced by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEvent {
    /// Block height.
    pub number: u64,
    /// Hash the header carried itself, if the source provides one. The
    /// canonical hash is always looked up separately.
    pub reported_hash: Option<Hash>,
    /// Opaque header payload.
    pub raw_header: Vec<u8>,
}

/// Header events in arrival order. A connection error is delivered as the
/// last item before the channel closes.
pub type HeaderStream = mpsc::Receiver<Result<HeaderEvent, Error>>;

/// Access to a remote chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Subscribe to new headers.
    async fn subscribe_headers(&self) -> Result<HeaderStream, Error>;

    /// Canonical hash for `number`. Fails if the node is unreachable or
    /// does not know the height.
    async fn canonical_hash(&self, number: u64) -> Result<Hash, Error>;

    /// Human-readable endpoint, used in logs and status.
    fn endpoint(&self) -> String;
}
