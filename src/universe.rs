//! Query universe builder
//!
//! Computes the cross product of product keys × location keys and
//! assigns every pair a dense, zero-based sequence index.
//!
//! Order is product-major, location-minor, following the input
//! order, so the same inputs always yield the same universe.

use std::collections::HashSet;

use thiserror::Error;

use crate::schema::{QueryUnit, UnitKey};

/// One of the inputs was empty. Callers treat this as "nothing to
/// do", not as a failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("query universe is empty ({products} products, {locations} locations)")]
pub struct EmptyUniverse {
    pub products: usize,
    pub locations: usize,
}

#[derive(Debug, Clone)]
pub struct Universe {
    units: Vec<QueryUnit>,
}

impl Universe {
    /// Builds the universe. Duplicate keys in either input are
    /// dropped, first occurrence wins.
    pub fn build(products: &[String], locations: &[String]) -> Result<Self, EmptyUniverse> {
        let products = dedup_in_order(products);
        let locations = dedup_in_order(locations);

        if products.is_empty() || locations.is_empty() {
            return Err(EmptyUniverse {
                products: products.len(),
                locations: locations.len(),
            });
        }

        let units = products
            .iter()
            .flat_map(|p| locations.iter().map(move |l| (p, l)))
            .enumerate()
            .map(|(i, (p, l))| QueryUnit {
                sequence_index: i,
                product_key: p.to_string(),
                location_key: l.to_string(),
            })
            .collect();

        Ok(Self { units })
    }

    pub fn units(&self) -> &[QueryUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Sequence index of the unit with this identity, if it is part
    /// of the current generation.
    pub fn position(&self, key: &UnitKey) -> Option<usize> {
        self.units
            .iter()
            .position(|u| u.product_key == key.product_key && u.location_key == key.location_key)
    }
}

fn dedup_in_order(keys: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    keys.iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && seen.insert(*k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cross_product_is_product_major() {
        let u = Universe::build(&keys(&["p1", "p2"]), &keys(&["a", "b", "c"])).unwrap();

        assert_eq!(u.len(), 6);
        let pairs: Vec<(usize, &str, &str)> = u
            .units()
            .iter()
            .map(|q| (q.sequence_index, q.product_key.as_str(), q.location_key.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (0, "p1", "a"),
                (1, "p1", "b"),
                (2, "p1", "c"),
                (3, "p2", "a"),
                (4, "p2", "b"),
                (5, "p2", "c"),
            ]
        );
    }

    #[test]
    fn build_is_reproducible() {
        let a = Universe::build(&keys(&["p1", "p2"]), &keys(&["x", "y"])).unwrap();
        let b = Universe::build(&keys(&["p1", "p2"]), &keys(&["x", "y"])).unwrap();
        assert_eq!(a.units(), b.units());
    }

    #[test]
    fn duplicate_inputs_are_dropped() {
        let u = Universe::build(&keys(&["p1", "p1", "p2"]), &keys(&["a", "a"])).unwrap();
        assert_eq!(u.len(), 2);
    }

    #[test]
    fn empty_inputs_mean_nothing_to_do() {
        let err = Universe::build(&[], &keys(&["a"])).unwrap_err();
        assert_eq!(err, EmptyUniverse { products: 0, locations: 1 });

        assert!(Universe::build(&keys(&["p1"]), &[]).is_err());
    }

    #[test]
    fn positions_are_found_by_identity() {
        let u = Universe::build(&keys(&["p1", "p2"]), &keys(&["a", "b"])).unwrap();
        let key = UnitKey {
            product_key: "p2".into(),
            location_key: "a".into(),
        };
        assert_eq!(u.position(&key), Some(2));

        let gone = UnitKey {
            product_key: "p9".into(),
            location_key: "a".into(),
        };
        assert_eq!(u.position(&gone), None);
    }
}
