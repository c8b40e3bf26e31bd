//! Conversions between core values and control-plane types.

use headerproof_merkle_tree::{hash_from_slice, Hash, InclusionProof, ProofStep, Side};
use headerproof_types as types;

use crate::{Error, HeaderRecord};

/// Parse a hex hash, `0x` prefix optional. Must decode to exactly 32 bytes.
pub fn parse_hash(value: &str) -> Result<Hash, String> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(digits).map_err(|e| format!("invalid hex {:?}: {}", value, e))?;
    hash_from_slice(&bytes).map_err(|e| e.to_string())
}

/// Hex with `0x` prefix.
pub fn format_hash(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parse a hash taken from a query or proof-generation request.
pub fn parse_input_hash(field: &str, value: &str) -> Result<Hash, Error> {
    parse_hash(value).map_err(|e| Error::InvalidInput(format!("{}: {}", field, e)))
}

/// Parse a hash that is part of a verification request.
pub fn parse_proof_hash(field: &str, value: &str) -> Result<Hash, Error> {
    parse_hash(value).map_err(|e| Error::MalformedProof(format!("{}: {}", field, e)))
}

pub fn header_to_wire(record: &HeaderRecord) -> types::Header {
    types::Header {
        number: record.number,
        hash: format_hash(&record.hash),
        raw_header: format!("0x{}", hex::encode(&record.raw_header)),
    }
}

pub fn proof_to_wire(proof: &InclusionProof) -> types::Proof {
    types::Proof {
        root: Some(format_hash(&proof.root)),
        steps: proof
            .steps
            .iter()
            .map(|step| types::ProofStep {
                sibling: format_hash(&step.sibling),
                side: step.side.as_str().to_string(),
            })
            .collect(),
    }
}

/// Decode the steps of a wire proof. Any bad hash or side tag makes the
/// whole proof malformed.
pub fn proof_steps_from_wire(proof: &types::Proof) -> Result<Vec<ProofStep>, Error> {
    proof
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let sibling = parse_proof_hash(&format!("steps[{}].sibling", i), &step.sibling)?;
            let side = Side::parse(&step.side)
                .map_err(|e| Error::MalformedProof(format!("steps[{}].side: {}", i, e)))?;
            Ok(ProofStep { sibling, side })
        })
        .collect()
}
