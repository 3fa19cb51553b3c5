//! Key ranges for cursor scans.

use std::ops::Bound;

/// A (possibly unbounded) interval of keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange<K> {
    pub lower: Bound<K>,
    pub upper: Bound<K>,
}

impl<K: Ord + Clone> KeyRange<K> {
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    pub fn only(key: K) -> Self {
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// `lower..upper`, each end optionally open (exclusive).
    pub fn bound(lower: K, upper: K, lower_open: bool, upper_open: bool) -> Self {
        Self {
            lower: bound_of(lower, lower_open),
            upper: bound_of(upper, upper_open),
        }
    }

    pub fn lower_bound(key: K, open: bool) -> Self {
        Self {
            lower: bound_of(key, open),
            upper: Bound::Unbounded,
        }
    }

    pub fn upper_bound(key: K, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: bound_of(key, open),
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// True if no key can fall inside.
    ///
    /// `BTreeMap::range` panics on such ranges, so backends check first.
    pub fn is_empty(&self) -> bool {
        is_empty_interval(&self.lower, &self.upper)
    }

    /// Narrow the scan start to `from` if that is tighter than the current
    /// start, for a scan in `forward` (ascending) or descending order.
    pub fn narrowed(&self, from: Bound<K>, forward: bool) -> Self {
        if forward {
            Self {
                lower: tighter_lower(&self.lower, from),
                upper: self.upper.clone(),
            }
        } else {
            Self {
                lower: self.lower.clone(),
                upper: tighter_upper(&self.upper, from),
            }
        }
    }

    pub fn map<J>(&self, f: impl Fn(&K) -> J) -> KeyRange<J> {
        KeyRange {
            lower: map_bound(&self.lower, &f),
            upper: map_bound(&self.upper, &f),
        }
    }
}

fn bound_of<K>(key: K, open: bool) -> Bound<K> {
    if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    }
}

fn map_bound<K, J>(bound: &Bound<K>, f: &impl Fn(&K) -> J) -> Bound<J> {
    match bound {
        Bound::Included(k) => Bound::Included(f(k)),
        Bound::Excluded(k) => Bound::Excluded(f(k)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

pub(crate) fn is_empty_interval<K: Ord>(lower: &Bound<K>, upper: &Bound<K>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}

fn tighter_lower<K: Ord + Clone>(current: &Bound<K>, candidate: Bound<K>) -> Bound<K> {
    let keep_current = match (current, &candidate) {
        (_, Bound::Unbounded) => true,
        (Bound::Unbounded, _) => false,
        (Bound::Included(c), Bound::Included(n)) => c >= n,
        (Bound::Included(c), Bound::Excluded(n)) => c > n,
        (Bound::Excluded(c), Bound::Included(n)) => c >= n,
        (Bound::Excluded(c), Bound::Excluded(n)) => c >= n,
    };
    if keep_current { current.clone() } else { candidate }
}

fn tighter_upper<K: Ord + Clone>(current: &Bound<K>, candidate: Bound<K>) -> Bound<K> {
    let keep_current = match (current, &candidate) {
        (_, Bound::Unbounded) => true,
        (Bound::Unbounded, _) => false,
        (Bound::Included(c), Bound::Included(n)) => c <= n,
        (Bound::Included(c), Bound::Excluded(n)) => c < n,
        (Bound::Excluded(c), Bound::Included(n)) => c <= n,
        (Bound::Excluded(c), Bound::Excluded(n)) => c <= n,
    };
    if keep_current { current.clone() } else { candidate }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let r = KeyRange::bound(2, 5, true, false);
        assert!(!r.contains(&2));
        assert!(r.contains(&3));
        assert!(r.contains(&5));
        assert!(!r.contains(&6));
        assert!(KeyRange::<u32>::all().contains(&0));
        assert!(KeyRange::only(4).contains(&4));
        assert!(!KeyRange::only(4).contains(&5));
    }

    #[test]
    fn test_empty_intervals() {
        assert!(KeyRange::bound(5, 2, false, false).is_empty());
        assert!(KeyRange::bound(3, 3, true, false).is_empty());
        assert!(!KeyRange::bound(3, 3, false, false).is_empty());
        assert!(!KeyRange::<u32>::all().is_empty());
    }

    #[test]
    fn test_narrowing_only_tightens() {
        let r = KeyRange::bound(2, 8, false, false);
        assert_eq!(r.narrowed(Bound::Excluded(4), true).lower, Bound::Excluded(4));
        assert_eq!(r.narrowed(Bound::Included(1), true).lower, Bound::Included(2));
        assert_eq!(r.narrowed(Bound::Excluded(6), false).upper, Bound::Excluded(6));
        assert_eq!(r.narrowed(Bound::Included(9), false).upper, Bound::Included(8));
        let past = r.narrowed(Bound::Excluded(8), true);
        assert!(past.is_empty());
    }
}
