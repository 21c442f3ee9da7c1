//! Fixed-depth 5-ary Merkle accumulator.
//!
//! Nodes are stored densely up to the highest written leaf; every subtree to
//! the right of that is implicitly the canonical zero subtree of its level.

use halo2curves_axiom::bn256::Fr;
use maci_common::hash;
use serde::{Deserialize, Serialize};

use crate::error::TreeError;

pub const ARITY: usize = 5;

#[derive(Clone, Debug)]
pub struct QuinTree {
    depth: usize,
    /// `zeros[l]` is the root of an all-zero subtree of height `l`.
    zeros: Vec<Fr>,
    /// `levels[0]` holds leaves, `levels[depth]` at most the root.
    levels: Vec<Vec<Fr>>,
}

impl QuinTree {
    pub fn new(depth: usize, zero_leaf: Fr) -> Self {
        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(zero_leaf);
        for level in 0..depth {
            zeros.push(hash(&[zeros[level]; ARITY]));
        }
        Self {
            depth,
            zeros,
            levels: vec![Vec::new(); depth + 1],
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// `5^depth`, saturating at `u64::MAX`.
    pub fn capacity(&self) -> u64 {
        capacity_for_depth(self.depth)
    }

    pub fn zero(&self, level: usize) -> Fr {
        self.zeros[level]
    }

    /// One past the highest written leaf index.
    pub fn len(&self) -> u64 {
        self.levels[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn root(&self) -> Fr {
        self.levels[self.depth]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.depth])
    }

    pub fn leaf(&self, index: u64) -> Fr {
        self.node(0, index as usize)
    }

    /// Write a leaf at any position inside the tree's capacity.
    pub fn insert(&mut self, index: u64, leaf: Fr) -> Result<(), TreeError> {
        self.check_range(index)?;
        self.write(index as usize, leaf);
        Ok(())
    }

    /// Overwrite a leaf that has already been written.
    pub fn update(&mut self, index: u64, leaf: Fr) -> Result<(), TreeError> {
        self.check_range(index)?;
        if index >= self.len() {
            return Err(TreeError::LeafNotInserted { index });
        }
        self.write(index as usize, leaf);
        Ok(())
    }

    pub fn proof(&self, index: u64) -> Result<MerkleProof, TreeError> {
        self.check_range(index)?;
        Ok(self.path_from(0, index as usize))
    }

    /// Root of the subtree of height `level` at `position` within that level.
    pub fn subroot(&self, level: usize, position: u64) -> Result<Fr, TreeError> {
        self.check_level_range(level, position)?;
        Ok(self.node(level, position as usize))
    }

    /// Proof for a whole subtree: the path from the node at `(level,
    /// position)` up to the root.
    pub fn subtree_proof(&self, level: usize, position: u64) -> Result<MerkleProof, TreeError> {
        self.check_level_range(level, position)?;
        Ok(self.path_from(level, position as usize))
    }

    fn path_from(&self, start_level: usize, start: usize) -> MerkleProof {
        let mut position = start;
        let mut path_elements = Vec::with_capacity(self.depth - start_level);
        let mut path_indices = Vec::with_capacity(self.depth - start_level);

        for level in start_level..self.depth {
            let slot = position % ARITY;
            let first = position - slot;
            let mut siblings = [self.zeros[level]; ARITY - 1];
            let mut cursor = 0;
            for child in 0..ARITY {
                if child != slot {
                    siblings[cursor] = self.node(level, first + child);
                    cursor += 1;
                }
            }
            path_elements.push(siblings);
            path_indices.push(slot);
            position /= ARITY;
        }

        MerkleProof {
            path_elements,
            path_indices,
        }
    }

    /// Root of a tree of `depth` whose first leaves are `leaves`.
    pub fn compute_root(depth: usize, zero_leaf: Fr, leaves: &[Fr]) -> Result<Fr, TreeError> {
        let capacity = capacity_for_depth(depth);
        if leaves.len() as u64 > capacity {
            return Err(TreeError::IndexOutOfRange {
                index: leaves.len() as u64 - 1,
                capacity,
            });
        }
        let mut tree = Self::new(depth, zero_leaf);
        tree.levels[0] = leaves.to_vec();
        tree.rebuild();
        Ok(tree.root())
    }

    /// Build a tree from a leaf slice in one pass.
    pub fn from_leaves(depth: usize, zero_leaf: Fr, leaves: &[Fr]) -> Result<Self, TreeError> {
        let mut tree = Self::new(depth, zero_leaf);
        if leaves.len() as u64 > tree.capacity() {
            return Err(TreeError::IndexOutOfRange {
                index: leaves.len() as u64 - 1,
                capacity: tree.capacity(),
            });
        }
        tree.levels[0] = leaves.to_vec();
        tree.rebuild();
        Ok(tree)
    }

    fn check_range(&self, index: u64) -> Result<(), TreeError> {
        let capacity = self.capacity();
        if index >= capacity {
            return Err(TreeError::IndexOutOfRange { index, capacity });
        }
        Ok(())
    }

    fn check_level_range(&self, level: usize, position: u64) -> Result<(), TreeError> {
        let capacity = if level > self.depth {
            0
        } else {
            capacity_for_depth(self.depth - level)
        };
        if position >= capacity {
            return Err(TreeError::IndexOutOfRange {
                index: position,
                capacity,
            });
        }
        Ok(())
    }

    fn node(&self, level: usize, position: usize) -> Fr {
        self.levels[level]
            .get(position)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    fn write(&mut self, index: usize, leaf: Fr) {
        if self.levels[0].len() <= index {
            self.levels[0].resize(index + 1, self.zeros[0]);
        }
        self.levels[0][index] = leaf;

        let mut position = index;
        for level in 0..self.depth {
            let parent = position / ARITY;
            let value = self.hash_children(level, parent);
            let next = &mut self.levels[level + 1];
            if next.len() <= parent {
                next.resize(parent + 1, self.zeros[level + 1]);
            }
            next[parent] = value;
            position = parent;
        }
    }

    fn rebuild(&mut self) {
        for level in 0..self.depth {
            let width = self.levels[level].len().div_ceil(ARITY);
            let parents: Vec<Fr> = (0..width)
                .map(|parent| self.hash_children(level, parent))
                .collect();
            self.levels[level + 1] = parents;
        }
    }

    fn hash_children(&self, level: usize, parent: usize) -> Fr {
        let first = parent * ARITY;
        let mut children = [self.zeros[level]; ARITY];
        for (offset, child) in children.iter_mut().enumerate() {
            *child = self.node(level, first + offset);
        }
        hash(&children)
    }
}

pub fn capacity_for_depth(depth: usize) -> u64 {
    u32::try_from(depth)
        .ok()
        .and_then(|d| (ARITY as u64).checked_pow(d))
        .unwrap_or(u64::MAX)
}

/// Inclusion proof: four siblings and the leaf's slot per level, leaf first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    #[serde(with = "serde_path_elements")]
    pub path_elements: Vec<[Fr; ARITY - 1]>,
    pub path_indices: Vec<usize>,
}

impl MerkleProof {
    pub fn compute_root(&self, leaf: Fr) -> Fr {
        let mut current = leaf;
        for (siblings, &slot) in self.path_elements.iter().zip(self.path_indices.iter()) {
            let mut children = [current; ARITY];
            let mut remaining = siblings.iter();
            for (child_slot, child) in children.iter_mut().enumerate() {
                if child_slot != slot {
                    *child = remaining.next().copied().unwrap_or(current);
                }
            }
            current = hash(&children);
        }
        current
    }

    pub fn verify(&self, leaf: Fr, root: Fr) -> bool {
        self.path_elements.len() == self.path_indices.len()
            && self.path_indices.iter().all(|&slot| slot < ARITY)
            && self.compute_root(leaf) == root
    }
}

mod serde_path_elements {
    use super::ARITY;
    use halo2curves_axiom::bn256::Fr;
    use maci_common::{fr_from_decimal, fr_to_decimal};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[[Fr; ARITY - 1]], s: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<Vec<String>> = value
            .iter()
            .map(|row| row.iter().map(fr_to_decimal).collect())
            .collect();
        serde::Serialize::serialize(&rows, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<[Fr; ARITY - 1]>, D::Error> {
        let rows = Vec::<Vec<String>>::deserialize(d)?;
        rows.into_iter()
            .map(|row| {
                let parsed = row
                    .iter()
                    .map(|s| fr_from_decimal(s))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(D::Error::custom)?;
                <[Fr; ARITY - 1]>::try_from(parsed)
                    .map_err(|_| D::Error::custom("path level must hold four siblings"))
            })
            .collect()
    }
}
