//! Request and response bodies of the HeaderProof control plane.
//!
//! Hashes travel as hex strings. A `0x` prefix is optional on input and
//! always present on output.

use serde::{Deserialize, Serialize};

pub type HexHash = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectResponse {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryByNumberRequest {
    pub number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryByHashRequest {
    pub hash: HexHash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub number: u64,
    pub hash: HexHash,
    /// Hex of the opaque header payload as received from the node.
    pub raw_header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeafRequest {
    pub block_hash: HexHash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeafResponse {
    pub leaf: HexHash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateProofRequest {
    pub leaf: HexHash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofStep {
    pub sibling: HexHash,
    /// `"left"` or `"right"`: where the sibling sits.
    pub side: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proof {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<HexHash>,
    pub steps: Vec<ProofStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyProofRequest {
    pub proof: Proof,
    pub root: HexHash,
    pub leaf: HexHash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyProofResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub batch_size: usize,
    pub hash_algorithm: String,
    pub buffered: usize,
    pub trees: usize,
    pub roots: Vec<HexHash>,
    pub ingested: u64,
    pub skipped: u64,
    pub connected_to: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}
