//! Order-independent grouping keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An integer-valued composition used to deduplicate diagram builds.
///
/// Components are kept sorted by symbol and merged, so two keys built from
/// the same counts in any order compare equal and hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    components: Vec<(String, i64)>,
}

impl GroupKey {
    /// Builds a key from `(symbol, count)` pairs. Repeated symbols are summed
    /// and zero counts are dropped.
    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut components: Vec<(String, i64)> = Vec::new();
        for (symbol, count) in counts {
            let symbol = symbol.into();
            match components.iter_mut().find(|(s, _)| *s == symbol) {
                Some(existing) => existing.1 += count,
                None => components.push((symbol, count)),
            }
        }
        components.retain(|(_, count)| *count != 0);
        components.sort();
        Self { components }
    }

    /// The sorted `(symbol, count)` components.
    #[must_use]
    pub fn components(&self) -> &[(String, i64)] {
        &self.components
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.components.iter().map(|(_, count)| count).sum()
    }

    /// Each component's share of the total. Empty if the total is zero.
    #[must_use]
    pub fn fractions(&self) -> Vec<(String, f64)> {
        let total = self.total();
        if total == 0 {
            return Vec::new();
        }
        self.components
            .iter()
            .map(|(symbol, count)| (symbol.clone(), *count as f64 / total as f64))
            .collect()
    }

    /// Returns true if there are no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (symbol, count)) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{symbol}{count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_order_independent() {
        let a = GroupKey::from_counts([("Zn", 1), ("Fe", 2)]);
        let b = GroupKey::from_counts([("Fe", 2), ("Zn", 1)]);

        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_merges_and_drops_zero() {
        let key = GroupKey::from_counts([("Fe", 1), ("Zn", 0), ("Fe", 1)]);
        assert_eq!(key.components(), &[("Fe".to_string(), 2)]);
    }

    #[test]
    fn test_fractions() {
        let key = GroupKey::from_counts([("Fe", 3), ("Zn", 1)]);
        assert_eq!(key.total(), 4);
        assert_eq!(
            key.fractions(),
            vec![("Fe".to_string(), 0.75), ("Zn".to_string(), 0.25)]
        );
        assert!(GroupKey::from_counts(Vec::<(String, i64)>::new()).fractions().is_empty());
    }

    #[test]
    fn test_display() {
        let key = GroupKey::from_counts([("Zn", 1), ("Fe", 2)]);
        assert_eq!(key.to_string(), "Fe2 Zn1");
    }
}
