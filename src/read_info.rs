//! Read metadata: lengths, deletion status, overlap span math.
//!
//! Loaded once from the sequence store and immutable for the rest of the
//! run. Reads are addressed by 1-based id; id 0 is reserved as "none".

use crate::error::Result;
use crate::stores::SeqStore;
use std::path::Path;

pub struct ReadInfo {
    lengths: Vec<u32>,
    num_bases: u64,
    num_deleted: u32,
}

impl ReadInfo {
    /// Load read lengths from a sequence store, treating reads outside
    /// the [min_len, max_len] window as deleted.
    pub fn from_store<P: AsRef<Path>>(path: P, min_len: u32, max_len: u32) -> Result<Self> {
        let store = SeqStore::open(path)?;
        let mut lengths = Vec::with_capacity(store.num_reads() as usize + 1);
        lengths.push(0); // id 0 is not a read

        let mut num_bases = 0u64;
        let mut num_deleted = 0u32;

        for id in 1..=store.num_reads() {
            let mut len = store.read_length(id);

            if len > 0 && (len < min_len || len > max_len) {
                len = 0;
            }

            if len == 0 {
                num_deleted += 1;
            } else {
                num_bases += len as u64;
            }

            lengths.push(len);
        }

        Ok(Self {
            lengths,
            num_bases,
            num_deleted,
        })
    }

    /// Build directly from lengths (index 0 must be the reserved slot).
    pub fn from_lengths(lengths: Vec<u32>) -> Self {
        assert!(!lengths.is_empty() && lengths[0] == 0, "read id 0 is reserved");
        let num_bases = lengths.iter().map(|&l| l as u64).sum();
        let num_deleted = lengths[1..].iter().filter(|&&l| l == 0).count() as u32;
        Self {
            lengths,
            num_bases,
            num_deleted,
        }
    }

    #[inline]
    pub fn num_reads(&self) -> u32 {
        self.lengths.len() as u32 - 1
    }

    #[inline]
    pub fn num_bases(&self) -> u64 {
        self.num_bases
    }

    #[inline]
    pub fn num_deleted(&self) -> u32 {
        self.num_deleted
    }

    #[inline]
    pub fn length(&self, id: u32) -> u32 {
        self.lengths[id as usize]
    }

    #[inline]
    pub fn is_deleted(&self, id: u32) -> bool {
        self.lengths[id as usize] == 0
    }

    #[inline]
    pub fn is_valid(&self, id: u32) -> bool {
        id >= 1 && id <= self.num_reads()
    }

    /// Bases covered by an overlap, given the hangs.
    ///
    /// Computes the covered span on each read and returns their mean, so
    /// that an overlap and its twin score identically.
    pub fn overlap_length(&self, a_iid: u32, b_iid: u32, a_hang: i32, b_hang: i32) -> u32 {
        let alen = self.length(a_iid) as i32;
        let blen = self.length(b_iid) as i32;

        debug_assert!(alen > 0);
        debug_assert!(blen > 0);

        let (aovl, bovl) = if a_hang < 0 {
            //  b_hang < 0   ?      ----------   :      ----
            //               ?  ----------       :  ----------
            if b_hang < 0 {
                (alen + b_hang, blen + a_hang)
            } else {
                (alen, blen + a_hang - b_hang)
            }
        } else {
            //  b_hang < 0   ?  ----------       :  ----------
            //               ?      ----         :      ----------
            if b_hang < 0 {
                (alen - a_hang + b_hang, blen)
            } else {
                (alen - a_hang, blen - b_hang)
            }
        };

        if aovl <= 0 || bovl <= 0 {
            return 0;
        }

        ((aovl + bovl) / 2) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ri() -> ReadInfo {
        ReadInfo::from_lengths(vec![0, 1000, 1000, 400, 0])
    }

    #[test]
    fn test_basics() {
        let ri = ri();
        assert_eq!(ri.num_reads(), 4);
        assert_eq!(ri.length(1), 1000);
        assert!(ri.is_deleted(4));
        assert!(!ri.is_deleted(1));
        assert_eq!(ri.num_bases(), 2400);
        assert_eq!(ri.num_deleted(), 1);
    }

    #[test]
    fn test_overlap_length_dovetail() {
        let ri = ri();
        // 3' dovetail with 500 bp hangs on two 1 kb reads: 500 bp overlap.
        assert_eq!(ri.overlap_length(1, 2, 500, 500), 500);
        // And the twin (negated hangs) has the same length.
        assert_eq!(ri.overlap_length(2, 1, -500, -500), 500);
    }

    #[test]
    fn test_overlap_length_containment() {
        let ri = ri();
        // Read 3 (400 bp) contained in read 2 at hang 300.
        assert_eq!(ri.overlap_length(2, 3, 300, -300), 400);
        assert_eq!(ri.overlap_length(3, 2, -300, 300), 400);
    }
}
