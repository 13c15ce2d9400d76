//! This module provides a deterministic hasher and `HashMap` and `HashSet` variants that use
//! it. The hashing data structures in the standard library are not deterministic:
//!
//! > By default, HashMap uses a hashing algorithm selected to provide
//! > resistance against HashDoS attacks. The algorithm is randomly seeded, and a
//! > reasonable best-effort is made to generate this seed from a high quality,
//! > secure source of randomness provided by the host without blocking the program.
//!
//! A simulation that wants reproducible runs cannot iterate its registries in a
//! different order from one process to the next, so all internal maps use the
//! deterministic variants re-exported here.
//!
//! The `hash_str` free function is a convenience used to derive stable subscriber
//! tokens from names (see `crate::event::SubscriberId::from_name`).

use std::hash::Hasher;

use rustc_hash::FxHasher;

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// A convenience method to compute the hash of a `&str`.
#[must_use]
pub fn hash_str(data: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(data.as_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_strings_deterministically() {
        let a = hash_str("core:new_object");
        let b = hash_str("core:new_object");
        let c = hash_str("core:remove_object");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn map_iteration_is_reproducible() {
        let build = || {
            let mut map = HashMap::default();
            for i in 0..100_i64 {
                map.insert(i, i * 2);
            }
            map.into_iter().collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }
}
