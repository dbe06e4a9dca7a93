//! Seed ordering for the greedy tig builder.
//!
//! Each read is scored by the number of bases reachable by following
//! best edges off both of its ends; the builder consumes reads in
//! decreasing score order so long chains seed before their fragments.

use crate::best_graph::BestOverlapGraph;
use crate::parallel;
use crate::read_info::ReadInfo;
use log::info;
use rustc_hash::FxHashSet;

pub struct ChunkGraph {
    /// Read ids sorted by decreasing chunk length.
    order: Vec<u32>,
    next: usize,
}

impl ChunkGraph {
    pub fn build(ri: &ReadInfo, og: &BestOverlapGraph) -> Self {
        let scores: Vec<u64> = parallel::par_map_reads(ri.num_reads(), |id| {
            if !og.is_seedable(id) || ri.is_deleted(id) {
                return 0;
            }
            let b5 = og.best_edge(id, false).is_some();
            let b3 = og.best_edge(id, true).is_some();
            if !b5 && !b3 {
                return 0;
            }

            ri.length(id) as u64 + chunk_extension(ri, og, id, false) + chunk_extension(ri, og, id, true)
        });

        let mut order: Vec<u32> = (1..=ri.num_reads()).filter(|&id| scores[id as usize] > 0).collect();
        order.sort_unstable_by(|&a, &b| {
            scores[b as usize]
                .cmp(&scores[a as usize])
                .then(a.cmp(&b))
        });

        if let Some(&first) = order.first() {
            info!(
                "ChunkGraph: {} seed candidates, longest chunk {} bases",
                order.len(),
                scores[first as usize]
            );
        } else {
            info!("ChunkGraph: no seed candidates");
        }

        Self { order, next: 0 }
    }

    /// The next unseen read by decreasing chunk length; 0 when drained.
    pub fn next_read_by_chunk_length(&mut self) -> u32 {
        match self.order.get(self.next) {
            Some(&id) => {
                self.next += 1;
                id
            }
            None => 0,
        }
    }
}

/// Bases added past the end of `start` by walking best edges off the
/// given end. Stops at a null edge, a revisited read, or a cycle back
/// toward the start; the walk never terminates on the read it began at.
fn chunk_extension(ri: &ReadInfo, og: &BestOverlapGraph, start: u32, end3p: bool) -> u64 {
    let mut seen = FxHashSet::default();
    seen.insert(start);

    let mut bases = 0u64;
    let mut read = start;
    let mut end = end3p;

    loop {
        let edge = og.best_edge(read, end);
        if !edge.is_some() || seen.contains(&edge.read) {
            break;
        }

        //  The next read extends us by its length minus the overlap.
        bases += (ri.length(edge.read) as u64).saturating_sub(edge.length as u64);

        seen.insert(edge.read);
        read = edge.read;
        //  Entering at one end, we leave from the other.
        end = !edge.end3p;
    }

    bases
}
