//! Merkle tree over transaction hashes.
//!
//! Hashing is BLAKE3 with domain separation so a leaf can never be confused
//! with an interior node:
//! - leaf: `BLAKE3(0x00 || tx_hash)`
//! - node: `BLAKE3(0x01 || left || right)`
//!
//! A layer with an odd number of nodes pairs its last node with itself.
//! The root of an empty tree is [`Hash256::ZERO`].

use serde::{Deserialize, Serialize};

use crate::types::Hash256;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

pub fn leaf_hash(tx_hash: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(tx_hash.as_bytes());
    Hash256(hasher.finalize().into())
}

pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

fn parent_layer(layer: &[Hash256]) -> Vec<Hash256> {
    layer
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            [single] => node_hash(single, single),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Root over `tx_hashes` in order. Cheaper than building a [`MerkleTree`].
pub fn merkle_root(tx_hashes: &[Hash256]) -> Hash256 {
    let mut layer: Vec<Hash256> = tx_hashes.iter().map(leaf_hash).collect();
    if layer.is_empty() {
        return Hash256::ZERO;
    }
    while layer.len() > 1 {
        layer = parent_layer(&layer);
    }
    layer[0]
}

/// A full tree, retained so inclusion proofs can be produced.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// `layers[0]` holds leaf hashes; the last layer holds the root.
    layers: Vec<Vec<Hash256>>,
    tx_hashes: Vec<Hash256>,
}

impl MerkleTree {
    pub fn new(tx_hashes: &[Hash256]) -> Self {
        let mut layers = Vec::new();
        let mut layer: Vec<Hash256> = tx_hashes.iter().map(leaf_hash).collect();
        while layer.len() > 1 {
            let next = parent_layer(&layer);
            layers.push(layer);
            layer = next;
        }
        if !layer.is_empty() {
            layers.push(layer);
        }
        Self {
            layers,
            tx_hashes: tx_hashes.to_vec(),
        }
    }

    pub fn root(&self) -> Hash256 {
        self.layers
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(Hash256::ZERO)
    }

    pub fn len(&self) -> usize {
        self.tx_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx_hashes.is_empty()
    }

    /// Inclusion proof for the transaction at `position`, or `None` if out of range.
    pub fn proof(&self, position: usize) -> Option<MerkleProof> {
        let tx_hash = *self.tx_hashes.get(position)?;
        let mut siblings = Vec::with_capacity(self.layers.len().saturating_sub(1));
        let mut pos = position;
        for layer in &self.layers[..self.layers.len() - 1] {
            let is_left = pos % 2 == 0;
            let sibling_pos = if is_left { pos + 1 } else { pos - 1 };
            let hash = layer.get(sibling_pos).copied().unwrap_or(layer[pos]);
            let side = if is_left { Side::Right } else { Side::Left };
            siblings.push(ProofStep { hash, side });
            pos /= 2;
        }
        Some(MerkleProof {
            position,
            tx_hash,
            siblings,
        })
    }
}

/// Side on which a sibling sits relative to the running hash.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub enum Side {
    Left,
    Right,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ProofStep {
    pub hash: Hash256,
    pub side: Side,
}

/// Proof that `tx_hash` sits at `position` under some merkle root.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct MerkleProof {
    pub position: usize,
    pub tx_hash: Hash256,
    pub siblings: Vec<ProofStep>,
}

impl MerkleProof {
    /// Fold the path and compare against `root`.
    pub fn verify(&self, root: &Hash256) -> bool {
        let computed = self
            .siblings
            .iter()
            .fold(leaf_hash(&self.tx_hash), |acc, step| match step.side {
                Side::Left => node_hash(&step.hash, &acc),
                Side::Right => node_hash(&acc, &step.hash),
            });
        computed == *root
    }
}
