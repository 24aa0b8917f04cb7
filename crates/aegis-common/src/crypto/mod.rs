//! Cryptographic primitives for Aegis
//!
//! This module provides:
//! - Sorted-pair Merkle trees over claim leaves
//! - The claim proof oracle consumed by risk pools on redemption

pub mod merkle;

// Re-export commonly used items
pub use merkle::{claim_leaf, Hash, MerkleProofOracle, MerkleTree, ProofOracle, HASH_SIZE};
