//! Claim Merkle Trees
//!
//! Claims for an incident are published as the root of a sorted-pair BLAKE3
//! Merkle tree. The encoding is shared with off-chain proof generators and
//! must stay bit-exact:
//! - leaf: `blake3(0x00 || policy_id u64 BE || len u32 BE || account || loss u128 BE)`
//! - node: `blake3(0x01 || min(a, b) || max(a, b))`
//! - an unpaired node at the end of a level is promoted unchanged
//!
//! `account` is the insured holder's canonical string (`account:<id>`).

use crate::types::ids::Holder;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Hash size in bytes (BLAKE3 output)
pub const HASH_SIZE: usize = 32;

pub type Hash = [u8; HASH_SIZE];

const LEAF_DOMAIN: u8 = 0x00;
const NODE_DOMAIN: u8 = 0x01;

/// Hash a claim `(policy_id, account, loss)` into a leaf
pub fn claim_leaf(policy_id: u64, account: &Holder, loss: u128) -> Hash {
    let account = account.to_string();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_DOMAIN]);
    hasher.update(&policy_id.to_be_bytes());
    hasher.update(&(account.len() as u32).to_be_bytes());
    hasher.update(account.as_bytes());
    hasher.update(&loss.to_be_bytes());
    *hasher.finalize().as_bytes()
}

/// Hash two child nodes to create their parent; order independent
#[inline]
pub fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_DOMAIN]);
    hasher.update(lo);
    hasher.update(hi);
    *hasher.finalize().as_bytes()
}

/// Fold a proof path onto a leaf and compare with `root`
pub fn verify_proof(root: &Hash, leaf: &Hash, proof: &[Hash]) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |current, sibling| hash_pair(&current, sibling));
    computed == *root
}

/// Render a root for logs and configuration files
pub fn root_hex(root: &Hash) -> String {
    hex::encode(root)
}

/// Sorted-pair Merkle tree, kept level by level for proof generation
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    /// levels[0] holds the leaves, the last level holds the root
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a tree from leaf hashes in publication order
    pub fn from_leaves(leaves: Vec<Hash>) -> Self {
        if leaves.is_empty() {
            return Self::default();
        }

        let mut levels = vec![leaves];
        while let Some(level) = levels.last() {
            if level.len() <= 1 {
                break;
            }
            let next: Vec<Hash> = level
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => hash_pair(a, b),
                    // Unpaired node is promoted
                    _ => pair[0],
                })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    /// Build a tree from `(policy_id, account, loss)` claims
    pub fn from_claims<'a>(claims: impl IntoIterator<Item = (u64, &'a Holder, u128)>) -> Self {
        Self::from_leaves(
            claims
                .into_iter()
                .map(|(id, account, loss)| claim_leaf(id, account, loss))
                .collect(),
        )
    }

    /// Get the root hash, `None` for an empty tree
    pub fn root(&self) -> Option<Hash> {
        self.levels.last().and_then(|level| level.first()).copied()
    }

    /// Get number of leaves
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Sibling path for the leaf at `leaf_index`, leaf to root
    pub fn proof(&self, leaf_index: usize) -> Option<Vec<Hash>> {
        if leaf_index >= self.leaf_count() {
            return None;
        }

        let mut siblings = Vec::new();
        let mut index = leaf_index;
        for level in &self.levels[..self.levels.len() - 1] {
            if let Some(sibling) = level.get(index ^ 1) {
                siblings.push(*sibling);
            }
            index /= 2;
        }
        Some(siblings)
    }
}

/// Verifies claims submitted to `redeem`
pub trait ProofOracle: Send + Sync {
    fn verify(
        &self,
        root: &Hash,
        policy_id: u64,
        account: &Holder,
        loss: Decimal,
        proof: &[Hash],
    ) -> bool;
}

/// Oracle backed by the sorted-pair claim tree
#[derive(Debug, Default, Clone, Copy)]
pub struct MerkleProofOracle;

impl ProofOracle for MerkleProofOracle {
    fn verify(
        &self,
        root: &Hash,
        policy_id: u64,
        account: &Holder,
        loss: Decimal,
        proof: &[Hash],
    ) -> bool {
        if !loss.fract().is_zero() {
            return false;
        }
        match loss.to_u128() {
            Some(loss) => verify_proof(root, &claim_leaf(policy_id, account, loss), proof),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn claims() -> Vec<(u64, Holder, u128)> {
        vec![
            (0, Holder::account("alice"), 10_000),
            (1, Holder::account("bob"), 2_500),
            (2, Holder::account("carol"), 700),
            (3, Holder::account("dave"), 1),
            (4, Holder::account("erin"), 99),
        ]
    }

    fn tree(claims: &[(u64, Holder, u128)]) -> MerkleTree {
        MerkleTree::from_claims(claims.iter().map(|(id, h, loss)| (*id, h, *loss)))
    }

    #[test]
    fn test_hash_pair_is_sorted() {
        let left = [1u8; HASH_SIZE];
        let right = [2u8; HASH_SIZE];

        // Order does not matter
        assert_eq!(hash_pair(&left, &right), hash_pair(&right, &left));
        assert_ne!(hash_pair(&left, &right), hash_pair(&left, &left));
    }

    #[test]
    fn test_leaf_domain_separation() {
        let leaf = claim_leaf(1, &Holder::account("alice"), 5);
        assert_ne!(leaf, claim_leaf(2, &Holder::account("alice"), 5));
        assert_ne!(leaf, claim_leaf(1, &Holder::account("alicf"), 5));
        assert_ne!(leaf, claim_leaf(1, &Holder::account("alice"), 6));
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::from_leaves(Vec::new());
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.root().is_none());
        assert!(tree.proof(0).is_none());
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let holder = Holder::account("alice");
        let tree = MerkleTree::from_claims([(7, &holder, 100)]);
        let root = tree.root().unwrap();
        assert_eq!(root, claim_leaf(7, &holder, 100));
        assert!(tree.proof(0).unwrap().is_empty());
    }

    #[test]
    fn test_every_leaf_verifies_with_odd_count() {
        let claims = claims();
        let tree = tree(&claims);
        let root = tree.root().unwrap();

        for (i, (id, holder, loss)) in claims.iter().enumerate() {
            let proof = tree.proof(i).unwrap();
            assert!(verify_proof(&root, &claim_leaf(*id, holder, *loss), &proof));
        }
    }

    #[test]
    fn test_oracle_rejects_tampered_claims() {
        let claims = claims();
        let tree = tree(&claims);
        let root = tree.root().unwrap();
        let proof = tree.proof(1).unwrap();
        let oracle = MerkleProofOracle;

        assert!(oracle.verify(&root, 1, &Holder::account("bob"), dec!(2500), &proof));
        assert!(!oracle.verify(&root, 1, &Holder::account("bob"), dec!(2501), &proof));
        assert!(!oracle.verify(&root, 1, &Holder::account("mallory"), dec!(2500), &proof));
        assert!(!oracle.verify(&root, 0, &Holder::account("bob"), dec!(2500), &proof));
        assert!(!oracle.verify(&root, 1, &Holder::account("bob"), dec!(2500.5), &proof));
        assert!(!oracle.verify(&root, 1, &Holder::account("bob"), dec!(-1), &proof));
    }

    #[test]
    fn test_root_hex() {
        let root = [0xabu8; HASH_SIZE];
        assert_eq!(root_hex(&root).len(), HASH_SIZE * 2);
        assert!(root_hex(&root).starts_with("abab"));
    }
}
