// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Order-independent identity for attribute maps.
//!
//! Resources, scopes and data point dimension sets are grouped by the
//! [`AttributeKey`] of their attributes rather than by object identity, so two
//! maps holding the same pairs in any insertion order land in the same group.

use std::hash::Hasher;

use fnv::FnvHasher;

use crate::attributes::{AttributeMap, AttributeValue};

const TAG_STR: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_BOOL: u8 = 4;

/// 64-bit FNV-1a fingerprint of a canonically encoded [`AttributeMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeKey(pub u64);

/// Computes the canonical key of `attributes`.
///
/// Keys are visited in sorted order. Every key is length-prefixed and every
/// value carries a type tag ahead of its payload, so `{"a": "1"}` and
/// `{"a": 1}` never share an encoding.
pub fn canonical_key(attributes: &AttributeMap) -> AttributeKey {
    let mut entries: Vec<(&String, &AttributeValue)> = attributes.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let mut hasher = FnvHasher::default();
    hasher.write_u64(entries.len() as u64);
    for (key, value) in entries {
        write_bytes(&mut hasher, key.as_bytes());
        write_value(&mut hasher, value);
    }
    AttributeKey(hasher.finish())
}

fn write_bytes(hasher: &mut FnvHasher, bytes: &[u8]) {
    hasher.write(&(bytes.len() as u64).to_le_bytes());
    hasher.write(bytes);
}

fn write_value(hasher: &mut FnvHasher, value: &AttributeValue) {
    match value {
        AttributeValue::Str(s) => {
            hasher.write_u8(TAG_STR);
            write_bytes(hasher, s.as_bytes());
        }
        AttributeValue::Int(i) => {
            hasher.write_u8(TAG_INT);
            hasher.write(&i.to_le_bytes());
        }
        AttributeValue::Double(d) => {
            hasher.write_u8(TAG_DOUBLE);
            hasher.write(&d.to_bits().to_le_bytes());
        }
        AttributeValue::Bool(b) => {
            hasher.write_u8(TAG_BOOL);
            hasher.write_u8(u8::from(*b));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_ignores_insertion_order() {
        let a: AttributeMap = [("a", 1_i64), ("b", 2_i64)].into_iter().collect();
        let b: AttributeMap = [("b", 2_i64), ("a", 1_i64)].into_iter().collect();
        assert_eq!(canonical_key(&a), canonical_key(&b));
    }

    #[test]
    fn test_no_collision_across_types() {
        let mut as_str = AttributeMap::new();
        as_str.insert("a", "1");
        let mut as_int = AttributeMap::new();
        as_int.insert("a", 1_i64);
        let mut as_bool = AttributeMap::new();
        as_bool.insert("a", true);
        assert_ne!(canonical_key(&as_str), canonical_key(&as_int));
        assert_ne!(canonical_key(&as_int), canonical_key(&as_bool));
    }

    #[test]
    fn test_no_collision_on_shifted_boundaries() {
        let a: AttributeMap = [("ab", "c")].into_iter().collect();
        let b: AttributeMap = [("a", "bc")].into_iter().collect();
        assert_ne!(canonical_key(&a), canonical_key(&b));
    }

    #[test]
    fn test_empty_map_is_stable() {
        assert_eq!(
            canonical_key(&AttributeMap::new()),
            canonical_key(&AttributeMap::default())
        );
    }

    proptest! {
        #[test]
        fn test_key_is_permutation_invariant(
            pairs in prop::collection::hash_map("[a-z.]{1,8}", any::<i64>(), 0..12)
        ) {
            let forward: Vec<(String, i64)> = pairs.into_iter().collect();
            let mut backward = forward.clone();
            backward.reverse();

            let a: AttributeMap = forward.into_iter().collect();
            let b: AttributeMap = backward.into_iter().collect();
            prop_assert_eq!(canonical_key(&a), canonical_key(&b));
        }

        #[test]
        fn test_different_values_give_different_keys(x in any::<i64>(), y in any::<i64>()) {
            prop_assume!(x != y);
            let a: AttributeMap = [("k", x)].into_iter().collect();
            let b: AttributeMap = [("k", y)].into_iter().collect();
            prop_assert_ne!(canonical_key(&a), canonical_key(&b));
        }
    }
}
