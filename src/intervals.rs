//! Interval accumulation and depth collapse over tig coordinates.
//!
//! Used by the orphan merger (coverage of a candidate tig) and the repeat
//! splitter (aligned regions of invading reads). Intervals are half-open
//! `[lo, hi)` in tig coordinates.

/// A growable list of intervals with merge and depth operations.
#[derive(Debug, Clone, Default)]
pub struct IntervalList {
    items: Vec<(i32, i32)>,
    merged: bool,
}

impl IntervalList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, lo: i32, len: i32) {
        debug_assert!(len > 0);
        self.items.push((lo, lo + len));
        self.merged = false;
    }

    pub fn add_span(&mut self, lo: i32, hi: i32) {
        if lo < hi {
            self.add(lo, hi - lo);
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.merged = false;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn lo(&self, i: usize) -> i32 {
        self.items[i].0
    }

    #[inline]
    pub fn hi(&self, i: usize) -> i32 {
        self.items[i].1
    }

    pub fn set_lo(&mut self, i: usize, lo: i32) {
        self.items[i].0 = lo;
    }

    pub fn set_hi(&mut self, i: usize, hi: i32) {
        self.items[i].1 = hi;
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.items.iter().copied()
    }

    /// Collapse overlapping and adjacent intervals.
    pub fn merge(&mut self) {
        if self.merged || self.items.len() < 2 {
            self.merged = true;
            return;
        }

        self.items.sort_unstable();

        let mut out: Vec<(i32, i32)> = Vec::with_capacity(self.items.len());
        for &(lo, hi) in &self.items {
            match out.last_mut() {
                Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
                _ => out.push((lo, hi)),
            }
        }

        self.items = out;
        self.merged = true;
    }

    /// Total bases covered (after merging).
    pub fn spanned_bases(&mut self) -> i64 {
        self.merge();
        self.items.iter().map(|&(lo, hi)| (hi - lo) as i64).sum()
    }

    /// Collapse into constant-depth regions with a sweep over the
    /// interval endpoints. Returns (lo, hi, depth) with depth > 0,
    /// adjacent equal-depth regions merged.
    pub fn depth_regions(&self) -> Vec<(i32, i32, u32)> {
        if self.items.is_empty() {
            return Vec::new();
        }

        // +1 at starts, -1 at ends; starts sort before ends at a position.
        let mut events: Vec<(i32, i32)> = Vec::with_capacity(self.items.len() * 2);
        for &(lo, hi) in &self.items {
            events.push((lo, 1));
            events.push((hi, -1));
        }
        events.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut result: Vec<(i32, i32, u32)> = Vec::new();
        let mut depth: i32 = 0;
        let mut prev = events[0].0;

        for (pos, delta) in events {
            if pos > prev && depth > 0 {
                let d = depth as u32;
                match result.last_mut() {
                    Some(last) if last.2 == d && last.1 == prev => last.1 = pos,
                    _ => result.push((prev, pos, d)),
                }
            }
            depth += delta;
            prev = pos;
        }

        result
    }
}

/// True when `[bgn, end)` lies inside `[lo, hi)`.
#[inline]
pub fn contained_in(bgn: i32, end: i32, lo: i32, hi: i32) -> bool {
    lo <= bgn && end <= hi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let mut il = IntervalList::new();
        il.add(100, 100);
        il.add(150, 100);
        il.add(300, 100);

        il.merge();
        assert_eq!(il.len(), 2);
        assert_eq!((il.lo(0), il.hi(0)), (100, 250));
        assert_eq!((il.lo(1), il.hi(1)), (300, 400));
        assert_eq!(il.spanned_bases(), 250);
    }

    #[test]
    fn test_merge_idempotent() {
        let mut il = IntervalList::new();
        il.add(0, 10);
        il.add(5, 10);
        il.merge();
        let before: Vec<_> = il.iter().collect();
        il.merge();
        let after: Vec<_> = il.iter().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_depth_regions() {
        let mut il = IntervalList::new();
        il.add(0, 100);
        il.add(50, 100);
        il.add(50, 100);

        let depths = il.depth_regions();
        assert_eq!(depths, vec![(0, 50, 1), (50, 100, 3), (100, 150, 2)]);
    }

    #[test]
    fn test_depth_regions_gap() {
        let mut il = IntervalList::new();
        il.add(0, 10);
        il.add(100, 10);

        let depths = il.depth_regions();
        assert_eq!(depths, vec![(0, 10, 1), (100, 110, 1)]);
    }

    #[test]
    fn test_contained_in() {
        assert!(contained_in(10, 20, 10, 20));
        assert!(contained_in(12, 18, 10, 20));
        assert!(!contained_in(5, 18, 10, 20));
        assert!(!contained_in(12, 25, 10, 20));
    }
}
