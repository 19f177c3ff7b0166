//! Transaction merkle root of a block.
//!
//! Leaves are hashed pairwise level by level. An odd leaf at the end of a level is carried
//! up unchanged, and an empty list has the zero hash as its root.
use crate::utilities::hash::{blake2_256_concat, HashType};

pub(crate) struct Merkle;

impl Merkle {
    pub(crate) fn calculate_root(leaves: &[HashType]) -> HashType {
        if leaves.is_empty() {
            return HashType::default();
        }

        let mut level = leaves.to_vec();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => {
                        HashType::new(blake2_256_concat(&[left.as_ref(), right.as_ref()]))
                    }
                    _ => pair[0],
                })
                .collect();
        }
        level[0]
    }
}
